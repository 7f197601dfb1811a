use itertools::Itertools;
use petgraph::{prelude::DiGraphMap, Direction};
use slotmap::SecondaryMap;

use super::{util, ModelBuilder};
use crate::{runtime, BuilderActorKey, BuilderError, BuilderPortKey};

/// The built model together with the mapping from builder keys to runtime keys.
#[derive(Debug)]
pub struct BuilderRuntimeParts {
    pub model: runtime::Model,
    pub actor_keys: SecondaryMap<BuilderActorKey, runtime::ActorKey>,
    pub port_keys: SecondaryMap<BuilderPortKey, (runtime::ActorKey, runtime::PortKey)>,
}

impl BuilderRuntimeParts {
    pub fn actor_key(&self, actor_key: BuilderActorKey) -> Option<runtime::ActorKey> {
        self.actor_keys.get(actor_key).copied()
    }

    /// The event destination addressing an input port.
    pub fn destination(&self, port_key: BuilderPortKey) -> Option<runtime::Destination> {
        self.port_keys
            .get(port_key)
            .map(|&(actor, port)| runtime::Destination::port(actor, port))
    }
}

impl ModelBuilder {
    /// Build a graph of actors linked by zero-delay connections, upstream to downstream.
    pub fn build_actor_graph(&self) -> DiGraphMap<BuilderActorKey, ()> {
        let mut graph = DiGraphMap::new();
        for actor_key in self.actor_builders.keys() {
            graph.add_node(actor_key);
        }
        for connection in self
            .connection_builders
            .iter()
            .filter(|connection| connection.delay.is_none())
        {
            graph.add_edge(
                self.port_builders[connection.from].actor_key,
                self.port_builders[connection.to].actor_key,
                (),
            );
        }
        graph
    }

    /// Build a Mapping of `BuilderActorKey` -> depth, the length of the longest zero-delay path
    /// leading to the actor.
    pub fn build_depth_map(&self) -> Result<SecondaryMap<BuilderActorKey, usize>, BuilderError> {
        let graph = self.build_actor_graph();

        let toposort = petgraph::algo::toposort(&graph, None).map_err(|cycle_error| {
            let actors = util::find_minimal_cycle(&graph, cycle_error.node_id())
                .into_iter()
                .map(|actor_key| self.actor_builders[actor_key].name.clone())
                .collect_vec();
            BuilderError::CausalityLoop { actors }
        })?;

        let mut depths = SecondaryMap::new();
        for &actor_key in toposort.iter() {
            let depth = graph
                .neighbors_directed(actor_key, Direction::Incoming)
                .filter_map(|upstream| depths.get(upstream))
                .map(|depth: &usize| depth + 1)
                .max()
                .unwrap_or_default();
            depths.insert(actor_key, depth);
        }
        Ok(depths)
    }

    /// Assemble the runtime [`runtime::Model`].
    ///
    /// Actors are keyed in topological order, by depth and then by insertion order.
    #[tracing::instrument(skip(self))]
    pub fn build(self) -> Result<BuilderRuntimeParts, BuilderError> {
        let depths = self.build_depth_map()?;

        let order = self
            .actor_builders
            .iter()
            .sorted_by_key(|(actor_key, actor)| (depths[*actor_key], actor.index))
            .map(|(actor_key, _)| actor_key)
            .collect_vec();

        let actor_keys: SecondaryMap<_, _> = order
            .iter()
            .enumerate()
            .map(|(index, &actor_key)| (actor_key, runtime::ActorKey::from(index)))
            .collect();

        let port_keys: SecondaryMap<_, _> = self
            .port_builders
            .iter()
            .map(|(port_key, port)| (port_key, (actor_keys[port.actor_key], port.port_key)))
            .collect();

        let mut connections: SecondaryMap<BuilderPortKey, Vec<runtime::Connection>> =
            SecondaryMap::new();
        for connection in self.connection_builders.iter() {
            let (actor, port) = port_keys[connection.to];
            let runtime_connection = runtime::Connection {
                actor,
                port,
                delay: connection.delay,
            };
            match connections.get_mut(connection.from) {
                Some(list) => list.push(runtime_connection),
                None => {
                    connections.insert(connection.from, vec![runtime_connection]);
                }
            }
        }

        let ModelBuilder {
            mut actor_builders,
            port_builders,
            ..
        } = self;

        let mut model = runtime::Model::new();
        for actor_key in order {
            let actor = actor_builders
                .remove(actor_key)
                .ok_or(BuilderError::ActorKeyNotFound(actor_key))?;

            let ports = actor
                .ports
                .iter()
                .map(|&port_key| {
                    let port = &port_builders[port_key];
                    runtime::Port {
                        name: port.name.clone(),
                        kind: port.kind,
                        connections: connections.remove(port_key).unwrap_or_default(),
                    }
                })
                .collect();

            let info = runtime::ActorInfo {
                name: actor.name,
                depth: depths[actor_key],
                ports,
            };
            tracing::debug!(actor = %info.name, depth = info.depth, "Adding actor");
            model.push_actor(info, actor.actor);
        }

        tracing::info!(actors = model.topology().len(), "Model built");
        Ok(BuilderRuntimeParts {
            model,
            actor_keys,
            port_keys,
        })
    }
}
