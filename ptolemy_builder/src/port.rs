use crate::{runtime, BuilderActorKey};

slotmap::new_key_type! { pub struct BuilderPortKey; }

#[derive(Debug)]
pub struct PortBuilder {
    pub(crate) name: String,
    pub(crate) actor_key: BuilderActorKey,
    pub(crate) kind: runtime::PortKind,
    /// Position within the owning actor's ports
    pub(crate) port_key: runtime::PortKey,
}

impl PortBuilder {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn actor_key(&self) -> BuilderActorKey {
        self.actor_key
    }

    pub fn kind(&self) -> runtime::PortKind {
        self.kind
    }

    /// The key this port will have at runtime, relative to its actor.
    pub fn port_key(&self) -> runtime::PortKey {
        self.port_key
    }
}

/// A connection between an output and an input port.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ConnectionBuilder {
    pub(crate) from: BuilderPortKey,
    pub(crate) to: BuilderPortKey,
    /// `Some` for a delayed connection, which adds no causality dependency
    pub(crate) delay: Option<runtime::Duration>,
}
