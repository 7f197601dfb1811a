//! Exchange of timed vectors with an external Simulink process over a stream socket.
//!
//! Every frame is big-endian:
//!
//! | field        | type          |
//! |--------------|---------------|
//! | value count  | `u32`         |
//! | write flag   | `i32`         |
//! | read flag    | `i32`         |
//! | time         | `f64`         |
//! | values       | `[f64; count]`|
//!
//! A flag of [`FLAG_CONTINUE`] keeps the exchange going, [`FLAG_TERMINATE`] ends it and a
//! negative flag reports a failure on the sending side.

use std::io::{Read, Write};

use bytes::{Buf, BufMut, BytesMut};

/// Maximum number of values in one frame.
pub const NDBLMAX: usize = 1024;

pub const FLAG_CONTINUE: i32 = 0;
pub const FLAG_TERMINATE: i32 = 1;

/// Size of the fixed part of a frame.
const HEADER_LEN: usize = 4 + 4 + 4 + 8;

#[derive(thiserror::Error, Debug)]
pub enum BridgeError {
    #[error("Vector of {len} values exceeds the maximum of {NDBLMAX}")]
    VectorTooLong { len: usize },

    #[error("The peer reported failure flag {0}")]
    PeerFailed(i32),

    #[error("The peer closed the connection")]
    Closed,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub write_flag: i32,
    pub read_flag: i32,
    /// Simulation time of the sender, in seconds
    pub time: f64,
    pub values: Vec<f64>,
}

impl Frame {
    pub fn new(time: f64, values: Vec<f64>) -> Self {
        Self {
            write_flag: FLAG_CONTINUE,
            read_flag: FLAG_CONTINUE,
            time,
            values,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.write_flag == FLAG_TERMINATE
    }

    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), BridgeError> {
        let len = self.values.len();
        if len > NDBLMAX {
            return Err(BridgeError::VectorTooLong { len });
        }
        buf.reserve(HEADER_LEN + 8 * len);
        buf.put_u32(len as u32);
        buf.put_i32(self.write_flag);
        buf.put_i32(self.read_flag);
        buf.put_f64(self.time);
        for &value in &self.values {
            buf.put_f64(value);
        }
        Ok(())
    }

    /// Decode one frame from the front of `buf`, or `None` if it is not complete yet.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Self>, BridgeError> {
        if buf.len() < 4 {
            return Ok(None);
        }
        let len = (&buf[..4]).get_u32() as usize;
        if len > NDBLMAX {
            return Err(BridgeError::VectorTooLong { len });
        }
        let frame_len = HEADER_LEN + 8 * len;
        if buf.len() < frame_len {
            buf.reserve(frame_len - buf.len());
            return Ok(None);
        }

        buf.advance(4);
        let write_flag = buf.get_i32();
        let read_flag = buf.get_i32();
        let time = buf.get_f64();
        let values = (0..len).map(|_| buf.get_f64()).collect();
        Ok(Some(Self {
            write_flag,
            read_flag,
            time,
            values,
        }))
    }
}

/// Blocking client side of the exchange, typically over a `TcpStream`.
#[derive(Debug)]
pub struct SimulinkBridge<S> {
    stream: S,
    buffer: BytesMut,
    /// Flag of the last frame received, echoed back as our read flag
    peer_flag: i32,
}

impl<S: Read + Write> SimulinkBridge<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(HEADER_LEN),
            peer_flag: FLAG_CONTINUE,
        }
    }

    pub fn send(&mut self, frame: &Frame) -> Result<(), BridgeError> {
        let mut buf = BytesMut::new();
        frame.encode(&mut buf)?;
        self.stream.write_all(&buf)?;
        self.stream.flush()?;
        Ok(())
    }

    pub fn receive(&mut self) -> Result<Frame, BridgeError> {
        let mut chunk = [0u8; 4096];
        loop {
            if let Some(frame) = Frame::decode(&mut self.buffer)? {
                self.peer_flag = frame.write_flag;
                return Ok(frame);
            }
            let n = self.stream.read(&mut chunk)?;
            if n == 0 {
                return Err(BridgeError::Closed);
            }
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }

    /// Send our values at `time` and wait for the peer's reply.
    pub fn exchange(&mut self, time: f64, values: &[f64]) -> Result<Frame, BridgeError> {
        self.send(&Frame {
            write_flag: FLAG_CONTINUE,
            read_flag: self.peer_flag,
            time,
            values: values.to_vec(),
        })?;

        let reply = self.receive()?;
        if reply.write_flag < 0 {
            return Err(BridgeError::PeerFailed(reply.write_flag));
        }
        tracing::trace!(time, peer_time = reply.time, "Exchanged {} values", values.len());
        Ok(reply)
    }

    /// Tell the peer the exchange is over.
    pub fn terminate(&mut self, time: f64, values: &[f64]) -> Result<(), BridgeError> {
        tracing::debug!(time, "Terminating the exchange");
        self.send(&Frame {
            write_flag: FLAG_TERMINATE,
            read_flag: self.peer_flag,
            time,
            values: values.to_vec(),
        })
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    /// Reads scripted replies and records everything written.
    struct Scripted {
        replies: Cursor<Vec<u8>>,
        written: Vec<u8>,
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            // Hand out a few bytes at a time to exercise partial frames.
            let n = buf.len().min(7);
            self.replies.read(&mut buf[..n])
        }
    }

    impl Write for Scripted {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.written.write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn scripted(replies: &[Frame]) -> Scripted {
        let mut buf = BytesMut::new();
        for frame in replies {
            frame.encode(&mut buf).unwrap();
        }
        Scripted {
            replies: Cursor::new(buf.to_vec()),
            written: Vec::new(),
        }
    }

    #[test]
    fn test_frame_layout() {
        let mut buf = BytesMut::new();
        Frame::new(0.5, vec![2.0]).encode(&mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_LEN + 8);
        assert_eq!(&buf[..4], &[0, 0, 0, 1]);
        assert_eq!(&buf[12..20], &0.5f64.to_be_bytes());
        assert_eq!(&buf[20..], &2.0f64.to_be_bytes());
    }

    #[test]
    fn test_partial_decode() {
        let mut buf = BytesMut::new();
        let frame = Frame::new(1.25, vec![1.0, -3.5]);
        frame.encode(&mut buf).unwrap();
        let mut partial = buf.split_to(10);
        assert!(Frame::decode(&mut partial).unwrap().is_none());
        partial.unsplit(buf);
        assert_eq!(Frame::decode(&mut partial).unwrap(), Some(frame));
        assert!(partial.is_empty());
    }

    #[test]
    fn test_vector_too_long() {
        let frame = Frame::new(0.0, vec![0.0; NDBLMAX + 1]);
        assert!(matches!(
            frame.encode(&mut BytesMut::new()),
            Err(BridgeError::VectorTooLong { len }) if len == NDBLMAX + 1
        ));

        let mut buf = BytesMut::new();
        buf.put_u32(NDBLMAX as u32 + 1);
        assert!(matches!(
            Frame::decode(&mut buf),
            Err(BridgeError::VectorTooLong { .. })
        ));
    }

    #[test]
    fn test_exchange() {
        let stream = scripted(&[
            Frame::new(0.1, vec![10.0, 20.0]),
            Frame {
                write_flag: -1,
                ..Frame::new(0.2, vec![])
            },
        ]);
        let mut bridge = SimulinkBridge::new(stream);

        let reply = bridge.exchange(0.1, &[1.0]).unwrap();
        assert_eq!(reply.values, [10.0, 20.0]);
        assert!(matches!(
            bridge.exchange(0.2, &[2.0]),
            Err(BridgeError::PeerFailed(-1))
        ));
        assert!(matches!(bridge.receive(), Err(BridgeError::Closed)));

        bridge.terminate(0.3, &[]).unwrap();
        let mut written = BytesMut::from(&bridge.into_inner().written[..]);
        let sent: Vec<_> = std::iter::from_fn(|| Frame::decode(&mut written).unwrap()).collect();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0], Frame::new(0.1, vec![1.0]));
        assert_eq!(sent[1].read_flag, FLAG_CONTINUE);
        assert!(sent[2].is_terminal());
        assert_eq!(sent[2].read_flag, -1);
    }
}
