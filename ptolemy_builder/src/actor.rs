use crate::{runtime, BuilderPortKey};

slotmap::new_key_type! { pub struct BuilderActorKey; }

pub struct ActorBuilder {
    /// Name of the actor, unique within the model
    pub(crate) name: String,
    /// The actor body
    pub(crate) actor: Box<dyn runtime::Actor>,
    /// Ports in declaration order; the position is the runtime `PortKey`
    pub(crate) ports: Vec<BuilderPortKey>,
    /// Insertion order, used to break ties between actors of equal depth
    pub(crate) index: usize,
}

impl std::fmt::Debug for ActorBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorBuilder")
            .field("name", &self.name)
            .field("ports", &self.ports)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

impl ActorBuilder {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ports(&self) -> &[BuilderPortKey] {
        &self.ports
    }
}
