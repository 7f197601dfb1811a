//! Physical time sources for the directors.
//!
//! Physical time shares its axis with model time: a clock started at origin `t0` reads `t0` at
//! the moment the director begins its run.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};

use crate::{Event, Timestamp};

/// The outcome of waiting on a [`Clock`].
#[derive(Debug, Clone, PartialEq)]
pub enum SyncStatus {
    /// The deadline has been reached.
    Synchronized,
    /// The deadline had already elapsed, lagging behind the clock by the given duration.
    OutOfSync(Duration),
    /// The wait was cut short by an asynchronous event.
    Interrupted(Event),
    /// Every asynchronous sender was dropped while waiting; the deadline has not been reached.
    Disconnected,
}

/// A physical time source a director can synchronize with.
pub trait Clock: std::fmt::Debug + Send {
    /// Align the clock so that it reads `origin` now.
    fn start(&mut self, origin: Timestamp);

    /// The current physical time.
    fn now(&self) -> Timestamp;

    /// Block until the clock reaches `deadline`, or until `wake` delivers an event.
    fn synchronize(&mut self, deadline: Timestamp, wake: Option<&Receiver<Event>>) -> SyncStatus;
}

/// A real-time [`Clock`] based on the system's monotonic clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Timestamp,
    wall_clock_ref: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Timestamp::ZERO,
            wall_clock_ref: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn start(&mut self, origin: Timestamp) {
        self.origin = origin;
        self.wall_clock_ref = Instant::now();
    }

    fn now(&self) -> Timestamp {
        self.origin.offset(self.wall_clock_ref.elapsed())
    }

    #[tracing::instrument(skip(self, wake), fields(deadline = %deadline))]
    fn synchronize(&mut self, deadline: Timestamp, wake: Option<&Receiver<Event>>) -> SyncStatus {
        let now = self.now();
        if now > deadline {
            return SyncStatus::OutOfSync(now - deadline);
        }

        let advance = deadline - now;
        tracing::debug!(advance = ?advance, "Need to sleep");
        match wake {
            Some(rx) => match rx.recv_timeout(advance) {
                Ok(event) => {
                    tracing::debug!(event = %event, "Sleep interrupted by async event");
                    SyncStatus::Interrupted(event)
                }
                Err(RecvTimeoutError::Disconnected) => SyncStatus::Disconnected,
                Err(RecvTimeoutError::Timeout) => SyncStatus::Synchronized,
            },
            None => {
                std::thread::sleep(advance);
                SyncStatus::Synchronized
            }
        }
    }
}

/// A [`Clock`] that only moves when told to.
///
/// Waiting on a `ManualClock` jumps straight to the deadline, so a run against it proceeds as fast
/// as possible while still following the physical-time rules. Clones share the same time, so a
/// test can keep a handle to inspect or advance the clock owned by a director.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<Timestamp>>,
}

impl ManualClock {
    pub fn new(now: Timestamp) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    /// Set the physical time. The clock never moves backwards.
    pub fn set(&self, time: Timestamp) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now = (*now).max(time);
    }

    pub fn advance(&self, delta: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now = now.offset(delta);
    }
}

impl Clock for ManualClock {
    fn start(&mut self, origin: Timestamp) {
        self.set(origin);
    }

    fn now(&self) -> Timestamp {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn synchronize(&mut self, deadline: Timestamp, wake: Option<&Receiver<Event>>) -> SyncStatus {
        if let Some(rx) = wake {
            match rx.try_recv() {
                Ok(event) => return SyncStatus::Interrupted(event),
                Err(TryRecvError::Disconnected) => return SyncStatus::Disconnected,
                Err(TryRecvError::Empty) => {}
            }
        }

        let now = self.now();
        if now > deadline {
            return SyncStatus::OutOfSync(now - deadline);
        }
        self.set(deadline);
        SyncStatus::Synchronized
    }
}
