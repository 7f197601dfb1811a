use std::time::Duration;

use crate::{
    ActorKey, Clock, Destination, Event, PortKey, PortKind, RuntimeError, Tag, Timestamp, Token,
    Topology,
};

/// Internal state for a context object
#[derive(Debug, Default)]
pub(crate) struct ContextInternal {
    /// Events scheduled during this firing, merged into the queue when it returns
    pub(crate) scheduled_events: Vec<Event>,
    /// The actor asked for the run to stop
    pub(crate) stop_requested: bool,
}

/// Director context passed into actor action methods.
///
/// Events scheduled through the context are validated immediately and merged into the event queue
/// after the action method returns.
pub struct Context<'a> {
    /// The actor being fired
    pub(crate) actor: ActorKey,
    /// Model time of the current firing
    pub(crate) tag: Tag,
    pub(crate) topology: &'a Topology,
    pub(crate) clock: &'a dyn Clock,
    pub(crate) internal: ContextInternal,
}

impl std::fmt::Debug for Context<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("actor", &self.actor)
            .field("tag", &self.tag)
            .field("internal", &self.internal)
            .finish_non_exhaustive()
    }
}

impl<'a> Context<'a> {
    pub(crate) fn new(
        actor: ActorKey,
        tag: Tag,
        topology: &'a Topology,
        clock: &'a dyn Clock,
    ) -> Self {
        Self {
            actor,
            tag,
            topology,
            clock,
            internal: ContextInternal::default(),
        }
    }

    /// The actor being fired.
    pub fn actor(&self) -> ActorKey {
        self.actor
    }

    pub fn actor_name(&self) -> &str {
        self.topology
            .actor(self.actor)
            .map(|info| info.name.as_str())
            .unwrap_or_default()
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    /// The current model time, frozen during the firing.
    pub fn model_time(&self) -> Timestamp {
        self.tag.timestamp
    }

    pub fn microstep(&self) -> usize {
        self.tag.microstep
    }

    /// The current physical time of the director's clock.
    pub fn physical_time(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn topology(&self) -> &Topology {
        self.topology
    }

    /// Look up a port of the current actor by name.
    pub fn port(&self, name: &str) -> Result<PortKey, RuntimeError> {
        let info = self.topology.actor(self.actor)?;
        info.find_port(name)
            .ok_or_else(|| RuntimeError::NamedPortNotFound {
                actor: info.name.clone(),
                port: name.to_owned(),
            })
    }

    /// Schedule an event.
    ///
    /// The event is rejected if its destination is unknown, its deadline precedes its tag, or its
    /// tag precedes the current tag.
    pub fn add_event(&mut self, event: Event) -> Result<(), RuntimeError> {
        let event = validate_event(self.topology, self.tag, event)?;
        tracing::trace!(event = %event, "Scheduling");
        self.internal.scheduled_events.push(event);
        Ok(())
    }

    /// Request a refiring of `actor` at `(time, microstep)`.
    ///
    /// A request for the current model time at or below the current microstep is moved to the
    /// next microstep. Returns the tag actually scheduled.
    pub fn fire_at(
        &mut self,
        actor: ActorKey,
        time: Timestamp,
        microstep: usize,
    ) -> Result<Tag, RuntimeError> {
        let mut tag = Tag::new(time, microstep);
        if time == self.tag.timestamp && microstep <= self.tag.microstep {
            tag = self.tag.advance_microstep();
        }
        self.add_event(Event::pure(tag, actor))?;
        Ok(tag)
    }

    /// Request a refiring of the current actor after `delay`. A zero delay refires at the next
    /// microstep.
    pub fn fire_after(&mut self, delay: Duration) -> Result<Tag, RuntimeError> {
        let tag = self.tag.delay(Some(delay));
        self.add_event(Event::pure(tag, self.actor))?;
        Ok(tag)
    }

    /// Send `token` on an output port to every connected input, at the current tag.
    pub fn send(&mut self, port: PortKey, token: impl Into<Token>) -> Result<(), RuntimeError> {
        self.send_at_offset(port, token.into(), None)
    }

    /// Send `token` on an output port, delivered `delay` after the current tag.
    pub fn send_after(
        &mut self,
        port: PortKey,
        token: impl Into<Token>,
        delay: Duration,
    ) -> Result<(), RuntimeError> {
        self.send_at_offset(port, token.into(), Some(delay))
    }

    fn send_at_offset(
        &mut self,
        port: PortKey,
        token: Token,
        delay: Option<Duration>,
    ) -> Result<(), RuntimeError> {
        let topology = self.topology;
        let output = match topology.actor(self.actor)?.port(port) {
            Some(output) if output.kind == PortKind::Output => output,
            _ => {
                return Err(RuntimeError::UnknownPort {
                    actor: self.actor,
                    port,
                })
            }
        };

        for connection in &output.connections {
            let tag = match (delay, connection.delay) {
                (None, None) => self.tag,
                (delay, link) => {
                    let total = delay
                        .unwrap_or_default()
                        .saturating_add(link.unwrap_or_default());
                    self.tag.delay(Some(total))
                }
            };
            let destination = Destination::port(connection.actor, connection.port);
            self.add_event(Event::new(tag, destination, token.clone()))?;
        }
        Ok(())
    }

    /// Ask the director to finish the current tag and wrap up.
    pub fn request_stop(&mut self) {
        tracing::debug!(actor = %self.actor, tag = %self.tag, "Stop requested");
        self.internal.stop_requested = true;
    }
}

/// Check an event against the model structure and the current tag, assigning its depth.
pub(crate) fn validate_event(
    topology: &Topology,
    current: Tag,
    mut event: Event,
) -> Result<Event, RuntimeError> {
    let Destination { actor, port } = event.destination;
    let info = topology.actor(actor)?;
    if let Some(port) = port {
        topology.check_input(actor, port)?;
    }
    if let Some(deadline) = event.deadline {
        if deadline < event.tag {
            return Err(RuntimeError::MalformedEvent {
                event: event.to_string(),
                reason: "deadline precedes the event tag",
            });
        }
    }
    if event.tag < current {
        return Err(RuntimeError::CausalityViolation {
            tag: event.tag,
            current,
        });
    }
    event.depth = info.depth;
    Ok(event)
}
