//! Runtime types and directors for actor-oriented models.
//!
//! The discrete-event [`Director`] drives actors from a [`CalendarQueue`] of timestamped
//! [`Event`]s, [`PtidesDirector`] adds the safe-to-process and deadline rules of PTIDES on top of
//! it, and [`pn::PnDirector`] runs Kahn process networks over blocking bounded buffers.
//!
//! ## Feature flags
#![doc = document_features::document_features!()]

mod actor;
pub mod calendar;
mod clock;
mod context;
mod event;
pub mod keepalive;
mod model;
pub mod pn;
mod sched;
pub mod task;
mod token;

// Re-exports
pub use actor::*;
pub use calendar::{CalendarQueue, QueueError};
pub use clock::*;
pub use context::*;
pub use event::*;
pub use model::*;
pub use sched::*;
pub use token::*;

pub use ptolemy_core::{
    keys::{ActorKey, ChannelKey, PortKey},
    time::{Tag, TimeError, Timestamp},
};

pub use std::time::Duration;

/// Errors raised by an actor or process body.
pub type ActorError = Box<dyn std::error::Error + Send + Sync>;

#[derive(thiserror::Error, Debug)]
pub enum RuntimeError {
    #[error("Invalid model time: {0}")]
    InvalidTime(#[from] TimeError),

    #[error("Event queue allocation failed: {0}")]
    QueueAllocation(#[from] QueueError),

    #[error("Deadlock detected, blocked on channels: {}", itertools::join(.channels, ", "))]
    Deadlock { channels: Vec<String> },

    #[error("Actor '{actor}' failed: {source}")]
    ActorFire {
        actor: String,
        #[source]
        source: ActorError,
    },

    #[error("Actor Key not found: {0}")]
    UnknownActor(ActorKey),

    #[error("Port {port} is not an input of {actor}")]
    UnknownPort { actor: ActorKey, port: PortKey },

    #[error("A Port named '{port}' was not found on '{actor}'.")]
    NamedPortNotFound { actor: String, port: String },

    #[error("Task not found: {0}")]
    UnknownTask(task::TaskId),

    #[error("Malformed event {event}: {reason}")]
    MalformedEvent { event: String, reason: &'static str },

    #[error("Event at {tag} is earlier than the current tag {current}")]
    CausalityViolation { tag: Tag, current: Tag },
}

impl RuntimeError {
    pub(crate) fn actor_fire(actor: impl Into<String>, source: ActorError) -> Self {
        Self::ActorFire {
            actor: actor.into(),
            source,
        }
    }
}
