//! Bounded single-producer, single-consumer buffers.

use std::{
    collections::VecDeque,
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
};

use super::{monitor::Monitor, ChannelError};
use crate::{keepalive, ChannelKey};

struct BufferState<T> {
    items: VecDeque<T>,
    capacity: usize,
    sender_alive: bool,
    receiver_alive: bool,
}

pub(crate) struct Buffer<T> {
    key: ChannelKey,
    name: String,
    state: Mutex<BufferState<T>>,
    /// Signalled whenever tokens, capacity, endpoints or the terminate flag change
    available: Condvar,
    monitor: Arc<Monitor>,
    terminate: keepalive::Flag,
}

/// Type-erased control over a buffer, used by the director.
pub(crate) trait ChannelControl: Send + Sync + std::fmt::Debug {
    fn key(&self) -> ChannelKey;
    fn name(&self) -> &str;
    fn capacity(&self) -> usize;
    /// Change the capacity and release a writer blocked on a full buffer.
    fn set_capacity(&self, capacity: usize);
    /// Wake every thread waiting on this buffer so it can observe the terminate flag.
    fn wake_all(&self);
}

impl<T> std::fmt::Debug for Buffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("key", &self.key)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<T> Buffer<T> {
    pub(crate) fn new(
        key: ChannelKey,
        name: String,
        capacity: usize,
        monitor: Arc<Monitor>,
        terminate: keepalive::Flag,
    ) -> Self {
        Self {
            key,
            name,
            state: Mutex::new(BufferState {
                items: VecDeque::with_capacity(capacity),
                capacity,
                sender_alive: true,
                receiver_alive: true,
            }),
            available: Condvar::new(),
            monitor,
            terminate,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BufferState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, BufferState<T>>) -> MutexGuard<'a, BufferState<T>> {
        self.available
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Send> ChannelControl for Buffer<T> {
    fn key(&self) -> ChannelKey {
        self.key
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn capacity(&self) -> usize {
        self.lock().capacity
    }

    fn set_capacity(&self, capacity: usize) {
        let mut state = self.lock();
        state.capacity = capacity;
        self.monitor.unblock_write(self.key);
        drop(state);
        self.available.notify_all();
    }

    fn wake_all(&self) {
        // Taking the lock orders the notification after any waiter's flag check.
        let _state = self.lock();
        self.available.notify_all();
    }
}

/// The writing endpoint of a channel. Dropping it closes the channel.
#[derive(Debug)]
pub struct Sender<T> {
    buffer: Arc<Buffer<T>>,
}

/// The reading endpoint of a channel.
#[derive(Debug)]
pub struct Receiver<T> {
    buffer: Arc<Buffer<T>>,
}

pub(crate) fn endpoints<T>(buffer: Arc<Buffer<T>>) -> (Sender<T>, Receiver<T>) {
    (
        Sender {
            buffer: buffer.clone(),
        },
        Receiver { buffer },
    )
}

impl<T> Sender<T> {
    /// Append a token, blocking while the buffer is full.
    ///
    /// Fails with [`ChannelError::Terminated`] once the run terminates or the receiver is gone.
    pub fn put(&self, token: T) -> Result<(), ChannelError> {
        let buffer = &*self.buffer;
        let mut state = buffer.lock();
        loop {
            if buffer.terminate.is_set() || !state.receiver_alive {
                return Err(ChannelError::Terminated);
            }
            if state.items.len() < state.capacity {
                break;
            }
            tracing::trace!(channel = %buffer.name, "Write blocked");
            buffer.monitor.block_write(buffer.key);
            state = buffer.wait(state);
        }
        state.items.push_back(token);
        buffer.monitor.unblock_read(buffer.key);
        drop(state);
        buffer.available.notify_all();
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.buffer.name
    }

    pub fn key(&self) -> ChannelKey {
        self.buffer.key
    }

    pub fn capacity(&self) -> usize {
        self.buffer.lock().capacity
    }

    /// Number of tokens currently buffered.
    pub fn len(&self) -> usize {
        self.buffer.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        let mut state = self.buffer.lock();
        state.sender_alive = false;
        self.buffer.monitor.unblock_read(self.buffer.key);
        drop(state);
        self.buffer.available.notify_all();
    }
}

impl<T> Receiver<T> {
    /// Take the oldest token, blocking while the buffer is empty.
    ///
    /// After the sender is dropped, remaining tokens are still delivered before
    /// [`ChannelError::Terminated`].
    pub fn get(&self) -> Result<T, ChannelError> {
        let buffer = &*self.buffer;
        let mut state = buffer.lock();
        loop {
            if buffer.terminate.is_set() {
                return Err(ChannelError::Terminated);
            }
            if let Some(token) = state.items.pop_front() {
                buffer.monitor.unblock_write(buffer.key);
                drop(state);
                buffer.available.notify_all();
                return Ok(token);
            }
            if !state.sender_alive {
                return Err(ChannelError::Terminated);
            }
            tracing::trace!(channel = %buffer.name, "Read blocked");
            buffer.monitor.block_read(buffer.key);
            state = buffer.wait(state);
        }
    }

    /// Iterate over tokens until the channel terminates.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        std::iter::from_fn(|| self.get().ok())
    }

    pub fn name(&self) -> &str {
        &self.buffer.name
    }

    pub fn key(&self) -> ChannelKey {
        self.buffer.key
    }

    pub fn capacity(&self) -> usize {
        self.buffer.lock().capacity
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        let mut state = self.buffer.lock();
        state.receiver_alive = false;
        self.buffer.monitor.unblock_write(self.buffer.key);
        drop(state);
        self.buffer.available.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use std::{thread, time::Duration};

    use super::*;

    fn pair(capacity: usize) -> (Sender<u32>, Receiver<u32>, Arc<Monitor>, keepalive::Trigger) {
        let monitor = Arc::new(Monitor::default());
        let (trigger, flag) = keepalive::channel();
        let buffer = Arc::new(Buffer::new(
            ChannelKey::from(0),
            "ch".to_owned(),
            capacity,
            monitor.clone(),
            flag,
        ));
        let (tx, rx) = endpoints(buffer);
        (tx, rx, monitor, trigger)
    }

    #[test]
    fn test_fifo_and_close() {
        let (tx, rx, _monitor, _trigger) = pair(4);
        for i in 0..4 {
            tx.put(i).unwrap();
        }
        assert_eq!(tx.len(), 4);
        drop(tx);
        assert_eq!(rx.iter().collect::<Vec<_>>(), vec![0, 1, 2, 3]);
        assert_eq!(rx.get(), Err(ChannelError::Terminated));
    }

    #[test]
    fn test_put_blocks_when_full() {
        let (tx, rx, monitor, _trigger) = pair(2);
        let writer = thread::spawn(move || {
            for i in 0..3 {
                tx.put(i).unwrap();
            }
        });

        // The third put cannot complete until a token is taken.
        while !monitor.lock().write_blocked.contains(&ChannelKey::from(0)) {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(rx.len(), 2);

        assert_eq!(rx.get(), Ok(0));
        writer.join().unwrap();
        assert!(monitor.lock().write_blocked.is_empty());
        assert_eq!(rx.iter().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_terminate_releases_blocked_reader() {
        let (tx, rx, monitor, trigger) = pair(1);
        let buffer = tx.buffer.clone();
        let reader = thread::spawn(move || rx.get());

        while !monitor.lock().read_blocked.contains(&ChannelKey::from(0)) {
            thread::sleep(Duration::from_millis(1));
        }
        trigger.terminate();
        buffer.wake_all();
        assert_eq!(reader.join().unwrap(), Err(ChannelError::Terminated));
        assert_eq!(tx.put(1), Err(ChannelError::Terminated));
    }

    #[test]
    fn test_dropped_receiver_fails_writer() {
        let (tx, rx, _monitor, _trigger) = pair(1);
        tx.put(1).unwrap();
        drop(rx);
        assert_eq!(tx.put(2), Err(ChannelError::Terminated));
    }
}
