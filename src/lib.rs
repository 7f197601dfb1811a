//! Discrete-event, process-network and PTIDES scheduling for actor-oriented models.
//!
//! Models are assembled with a [`builder::ModelBuilder`] and executed by one of the directors in
//! [`runtime`]:
//!
//! * [`runtime::Director`] fires actors in timestamp order from a calendar queue of events.
//! * [`runtime::PtidesDirector`] only processes an event once physical time has passed its safe
//!   time, and skips events whose deadline has been missed.
//! * [`runtime::pn::PnDirector`] runs processes on their own threads, communicating over bounded
//!   blocking channels with deadlock detection.
//!
//! ## Example
//!
//! ```rust,ignore
//! use ptolemy::prelude::*;
//!
//! let mut builder = ModelBuilder::new();
//! let ramp = builder.add_actor("ramp", Ramp::default())?;
//! let out = builder.add_output(ramp, "out")?;
//! let sink = builder.add_actor("sink", Sink::default())?;
//! let input = builder.add_input(sink, "in")?;
//! builder.connect(out, input)?;
//!
//! let parts = builder.build()?;
//! let stats = Director::new(parts.model, Config::default().with_stop_time(Timestamp::new(5, 0)))
//!     .run()?;
//! ```
//!
//! ## Feature flags
#![doc = document_features::document_features!()]

pub use ptolemy_builder as builder;
pub use ptolemy_runtime as runtime;
pub use ptolemy_util as util;

#[cfg(feature = "runner")]
pub use ptolemy_util::runner;

pub mod prelude {
    pub use crate::builder::{
        BuilderActorKey, BuilderError, BuilderPortKey, BuilderRuntimeParts, ModelBuilder,
    };
    pub use crate::runtime::{
        is_safe_to_process, Actor, ActorError, ActorKey, Config, Context, Destination, Director,
        Duration, Event, Inputs, PortKey, PtidesDirector, RunStats, RuntimeError, Tag, Timestamp,
        Token,
    };
    pub use crate::util::Timeout;
}
