use crate::{
    port::ConnectionBuilder, runtime, ActorBuilder, BuilderActorKey, BuilderError,
    BuilderPortKey, PortBuilder,
};
use slotmap::SlotMap;

mod build;
#[cfg(test)]
mod tests;

pub use build::BuilderRuntimeParts;

mod util {
    use petgraph::visit::IntoNeighborsDirected;
    use std::{
        collections::{HashMap, VecDeque},
        hash::Hash,
    };

    /// Find a shortest cycle through `start_node` using a BFS back to the start.
    pub fn find_minimal_cycle<G>(graph: G, start_node: G::NodeId) -> Vec<G::NodeId>
    where
        G: IntoNeighborsDirected,
        G::NodeId: Hash + Eq,
    {
        let mut parents = HashMap::new();
        let mut queue = VecDeque::from([start_node]);

        while let Some(node) = queue.pop_front() {
            for next in graph.neighbors_directed(node, petgraph::Direction::Outgoing) {
                if next == start_node {
                    let mut cycle = vec![node];
                    let mut cursor = node;
                    while let Some(&parent) = parents.get(&cursor) {
                        cycle.push(parent);
                        cursor = parent;
                    }
                    cycle.reverse();
                    return cycle;
                }
                if !parents.contains_key(&next) {
                    parents.insert(next, node);
                    queue.push_back(next);
                }
            }
        }

        // A node reported by toposort is always on a cycle
        vec![start_node]
    }
}

#[derive(Debug, Default)]
pub struct ModelBuilder {
    /// Builders for Actors
    pub(super) actor_builders: SlotMap<BuilderActorKey, ActorBuilder>,
    /// Builders for Ports
    pub(super) port_builders: SlotMap<BuilderPortKey, PortBuilder>,
    /// Builders for Connections
    pub(super) connection_builders: Vec<ConnectionBuilder>,
}

impl ModelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new actor to the model. Actor names are unique.
    pub fn add_actor<A>(&mut self, name: &str, actor: A) -> Result<BuilderActorKey, BuilderError>
    where
        A: runtime::Actor + 'static,
    {
        if self.actor_builders.values().any(|a| a.name == name) {
            return Err(BuilderError::DuplicateActorDefinition(name.to_owned()));
        }
        let index = self.actor_builders.len();
        Ok(self.actor_builders.insert(ActorBuilder {
            name: name.to_owned(),
            actor: Box::new(actor),
            ports: Vec::new(),
            index,
        }))
    }

    pub fn add_input(
        &mut self,
        actor_key: BuilderActorKey,
        name: &str,
    ) -> Result<BuilderPortKey, BuilderError> {
        self.add_port(actor_key, name, runtime::PortKind::Input)
    }

    pub fn add_output(
        &mut self,
        actor_key: BuilderActorKey,
        name: &str,
    ) -> Result<BuilderPortKey, BuilderError> {
        self.add_port(actor_key, name, runtime::PortKind::Output)
    }

    fn add_port(
        &mut self,
        actor_key: BuilderActorKey,
        name: &str,
        kind: runtime::PortKind,
    ) -> Result<BuilderPortKey, BuilderError> {
        let actor = self
            .actor_builders
            .get_mut(actor_key)
            .ok_or(BuilderError::ActorKeyNotFound(actor_key))?;

        // Ensure no duplicates
        if actor
            .ports
            .iter()
            .any(|&port_key| self.port_builders[port_key].name == name)
        {
            return Err(BuilderError::DuplicatePortDefinition {
                actor_name: actor.name.clone(),
                port_name: name.to_owned(),
            });
        }

        let port_key = self.port_builders.insert(PortBuilder {
            name: name.to_owned(),
            actor_key,
            kind,
            port_key: runtime::PortKey::from(actor.ports.len()),
        });
        actor.ports.push(port_key);
        Ok(port_key)
    }

    /// Connect an output to an input. The downstream actor depends on the upstream one within
    /// the same tag.
    pub fn connect(
        &mut self,
        from: BuilderPortKey,
        to: BuilderPortKey,
    ) -> Result<(), BuilderError> {
        self.add_connection(from, to, None)
    }

    /// Connect an output to an input through a delay. Tokens arrive `delay` later, or one
    /// microstep later for a zero delay, and no causality dependency is added.
    pub fn connect_delayed(
        &mut self,
        from: BuilderPortKey,
        to: BuilderPortKey,
        delay: runtime::Duration,
    ) -> Result<(), BuilderError> {
        self.add_connection(from, to, Some(delay))
    }

    fn add_connection(
        &mut self,
        from: BuilderPortKey,
        to: BuilderPortKey,
        delay: Option<runtime::Duration>,
    ) -> Result<(), BuilderError> {
        let from_port = self.get_port(from)?;
        let to_port = self.get_port(to)?;

        let what = match (from_port.kind, to_port.kind) {
            (runtime::PortKind::Output, runtime::PortKind::Input) => None,
            (runtime::PortKind::Input, _) => Some("the source is an input port"),
            (_, runtime::PortKind::Output) => Some("the destination is an output port"),
        };
        if let Some(what) = what {
            return Err(BuilderError::PortBindError {
                from: self.port_fqn(from)?,
                to: self.port_fqn(to)?,
                what: what.to_owned(),
            });
        }

        if self
            .connection_builders
            .iter()
            .any(|c| c.from == from && c.to == to)
        {
            return Err(BuilderError::PortBindError {
                from: self.port_fqn(from)?,
                to: self.port_fqn(to)?,
                what: "the ports are already connected".to_owned(),
            });
        }

        tracing::trace!(from = ?from, to = ?to, ?delay, "Connecting");
        self.connection_builders
            .push(ConnectionBuilder { from, to, delay });
        Ok(())
    }

    pub fn get_actor(&self, actor_key: BuilderActorKey) -> Result<&ActorBuilder, BuilderError> {
        self.actor_builders
            .get(actor_key)
            .ok_or(BuilderError::ActorKeyNotFound(actor_key))
    }

    pub fn get_port(&self, port_key: BuilderPortKey) -> Result<&PortBuilder, BuilderError> {
        self.port_builders
            .get(port_key)
            .ok_or(BuilderError::PortKeyNotFound(port_key))
    }

    pub fn find_actor_by_name(&self, name: &str) -> Result<BuilderActorKey, BuilderError> {
        self.actor_builders
            .iter()
            .find(|(_, actor)| actor.name == name)
            .map(|(key, _)| key)
            .ok_or_else(|| BuilderError::NamedActorNotFound(name.to_owned()))
    }

    pub fn find_port_by_name(
        &self,
        actor_key: BuilderActorKey,
        name: &str,
    ) -> Result<BuilderPortKey, BuilderError> {
        self.get_actor(actor_key)?
            .ports
            .iter()
            .copied()
            .find(|&port_key| self.port_builders[port_key].name == name)
            .ok_or_else(|| BuilderError::NamedPortNotFound(name.to_owned()))
    }

    /// `actor.port` name of a port
    pub fn port_fqn(&self, port_key: BuilderPortKey) -> Result<String, BuilderError> {
        let port = self.get_port(port_key)?;
        let actor = self.get_actor(port.actor_key)?;
        Ok(format!("{}.{}", actor.name, port.name))
    }
}
