//! The runtime form of an assembled model.

use std::time::Duration;

use crate::{Actor, ActorKey, PortKey, RuntimeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortKind {
    Input,
    Output,
}

/// A link from an output port to an input port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    pub actor: ActorKey,
    pub port: PortKey,
    /// `Some` for a delayed connection, which breaks the zero-delay causality chain. Tokens arrive
    /// after the given delay, or one microstep later for a zero delay.
    pub delay: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct Port {
    pub name: String,
    pub kind: PortKind,
    /// Downstream inputs, only populated for outputs.
    pub connections: Vec<Connection>,
}

/// Static description of one actor: name, depth and ports.
#[derive(Debug, Clone)]
pub struct ActorInfo {
    pub name: String,
    /// Topological rank; an actor fed by a zero-delay connection has a strictly greater depth
    /// than its source.
    pub depth: usize,
    pub ports: Vec<Port>,
}

impl ActorInfo {
    pub fn port(&self, port: PortKey) -> Option<&Port> {
        self.ports.get(port.index())
    }

    pub fn find_port(&self, name: &str) -> Option<PortKey> {
        self.ports
            .iter()
            .position(|port| port.name == name)
            .map(PortKey::from)
    }
}

/// The static structure of a model, shared read-only with every firing.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    actors: Vec<ActorInfo>,
}

impl Topology {
    pub fn actor(&self, key: ActorKey) -> Result<&ActorInfo, RuntimeError> {
        self.actors
            .get(key.index())
            .ok_or(RuntimeError::UnknownActor(key))
    }

    pub fn find_actor(&self, name: &str) -> Option<ActorKey> {
        self.actors
            .iter()
            .position(|info| info.name == name)
            .map(ActorKey::from)
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ActorKey, &ActorInfo)> {
        self.actors
            .iter()
            .enumerate()
            .map(|(idx, info)| (ActorKey::from(idx), info))
    }

    /// Check that `port` is an input of `actor`.
    pub fn check_input(&self, actor: ActorKey, port: PortKey) -> Result<(), RuntimeError> {
        match self.actor(actor)?.port(port) {
            Some(Port {
                kind: PortKind::Input,
                ..
            }) => Ok(()),
            _ => Err(RuntimeError::UnknownPort { actor, port }),
        }
    }
}

/// An assembled model: actor bodies plus their [`Topology`].
///
/// Actor keys are indices into both, in the order the actors were added.
#[derive(Default)]
pub struct Model {
    pub(crate) actors: Vec<Box<dyn Actor>>,
    pub(crate) topology: Topology,
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("topology", &self.topology)
            .finish_non_exhaustive()
    }
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an actor. Depths and connections are the caller's responsibility; use the model
    /// builder to have them computed and checked.
    pub fn push_actor(&mut self, info: ActorInfo, actor: Box<dyn Actor>) -> ActorKey {
        let key = ActorKey::from(self.actors.len());
        self.actors.push(actor);
        self.topology.actors.push(info);
        key
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Actor keys sorted by depth, ties broken by key.
    pub(crate) fn topological_order(&self) -> Vec<ActorKey> {
        let mut order: Vec<ActorKey> = self.topology.iter().map(|(key, _)| key).collect();
        order.sort_by_key(|key| (self.topology.actors[key.index()].depth, *key));
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Context, Inputs};

    struct Nop;

    impl Actor for Nop {
        fn fire(&mut self, _ctx: &mut Context, _inputs: &Inputs) -> Result<(), crate::ActorError> {
            Ok(())
        }
    }

    fn info(name: &str, depth: usize) -> ActorInfo {
        ActorInfo {
            name: name.to_owned(),
            depth,
            ports: vec![
                Port {
                    name: "in".to_owned(),
                    kind: PortKind::Input,
                    connections: vec![],
                },
                Port {
                    name: "out".to_owned(),
                    kind: PortKind::Output,
                    connections: vec![],
                },
            ],
        }
    }

    #[test]
    fn test_topology_lookup() {
        let mut model = Model::new();
        let b = model.push_actor(info("b", 1), Box::new(Nop));
        let a = model.push_actor(info("a", 0), Box::new(Nop));

        assert_eq!(model.topological_order(), vec![a, b]);
        let topology = model.topology();
        assert_eq!(topology.find_actor("a"), Some(a));
        assert_eq!(topology.actor(b).unwrap().find_port("out"), Some(PortKey::from(1)));
        assert!(topology.check_input(a, PortKey::from(0)).is_ok());
        assert!(matches!(
            topology.check_input(a, PortKey::from(1)),
            Err(RuntimeError::UnknownPort { .. })
        ));
        assert!(matches!(
            topology.actor(ActorKey::from(7)),
            Err(RuntimeError::UnknownActor(_))
        ));
    }
}
