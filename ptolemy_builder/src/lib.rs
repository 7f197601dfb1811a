//! Model assembly: actors, their ports and the connections between them.
//!
//! [`ModelBuilder::build`] orders the actors along zero-delay connections, assigns each its
//! topological depth and rejects causality loops.
//!
//! ## Feature flags
#![doc = document_features::document_features!()]
#![deny(unsafe_code)]

mod actor;
mod env;
mod port;

pub use actor::*;
pub use env::*;
pub use port::*;

use ptolemy_runtime as runtime;

#[derive(thiserror::Error, Debug)]
pub enum BuilderError {
    #[error("Duplicate Actor Definition: {0}")]
    DuplicateActorDefinition(String),

    #[error("Duplicate Port Definition: {}.{}", actor_name, port_name)]
    DuplicatePortDefinition {
        actor_name: String,
        port_name: String,
    },

    #[error("ActorKey not found: {0:?}")]
    ActorKeyNotFound(BuilderActorKey),

    #[error("PortKey not found: {0:?}")]
    PortKeyNotFound(BuilderPortKey),

    #[error("An Actor named '{0}' was not found.")]
    NamedActorNotFound(String),

    #[error("A Port named '{0}' was not found.")]
    NamedPortNotFound(String),

    #[error("Error binding ports ({from}->{to}): {what}")]
    PortBindError {
        from: String,
        to: String,
        what: String,
    },

    #[error("A causality loop of zero-delay connections was found through: {}", itertools::join(.actors, " -> "))]
    CausalityLoop { actors: Vec<String> },
}
