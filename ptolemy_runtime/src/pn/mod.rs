//! Kahn process networks over blocking bounded buffers.
//!
//! Every process runs on its own thread and communicates only through single-producer,
//! single-consumer channels of bounded capacity. A read from an empty channel or a write to a full
//! one blocks. The [`PnDirector`] watches the number of blocked processes: once every live process
//! is blocked, the network is deadlocked. If a writer is among them and a maximum queue capacity is
//! configured, the smallest full buffer is grown and execution resumes; otherwise the run ends with
//! [`crate::RuntimeError::Deadlock`].

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{keepalive, ActorError};

mod channel;
mod director;
mod monitor;

pub use channel::{Receiver, Sender};
pub use director::PnDirector;

/// The largest capacity a buffer is grown to when resolving artificial deadlocks, unless
/// configured otherwise.
pub const DEFAULT_MAX_QUEUE_CAPACITY: usize = 65536;

/// Process-network director configuration
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Capacity used for channels created with a zero capacity
    pub default_capacity: usize,
    /// Upper bound for growing full buffers on an artificial deadlock. `None` reports every
    /// deadlock as an error.
    pub max_queue_capacity: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_capacity: 1,
            max_queue_capacity: None,
        }
    }
}

impl Config {
    pub fn with_default_capacity(mut self, default_capacity: usize) -> Self {
        self.default_capacity = default_capacity.max(1);
        self
    }

    pub fn with_max_queue_capacity(mut self, max_queue_capacity: usize) -> Self {
        self.max_queue_capacity = Some(max_queue_capacity);
        self
    }
}

/// Summary of a completed process-network run.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PnStats {
    pub processes: usize,
    /// Number of times a full buffer was grown to resolve an artificial deadlock
    pub capacity_increases: usize,
    /// `(channel name, capacity)` at the end of the run
    pub final_capacities: Vec<(String, usize)>,
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    /// The run is terminating or the peer endpoint is gone. Processes should return promptly.
    #[error("Channel terminated")]
    Terminated,
}

/// Errors returned by a process body.
#[derive(thiserror::Error, Debug)]
pub enum ProcessError {
    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Other(ActorError),
}

impl ProcessError {
    pub fn other(err: impl Into<ActorError>) -> Self {
        Self::Other(err.into())
    }
}

/// Handed to each process body when its thread starts.
#[derive(Debug, Clone)]
pub struct ProcessContext {
    pub(crate) name: String,
    pub(crate) terminate: keepalive::Flag,
}

impl ProcessContext {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `true` once the director has decided to end the run.
    pub fn is_terminated(&self) -> bool {
        self.terminate.is_set()
    }
}
