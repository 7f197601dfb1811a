use std::{fmt::Display, time::Duration};

use crate::{calendar::Prioritized, ActorKey, PortKey, Tag, Timestamp, Token};

/// Scheduling priority of an event: the [`Tag`] first, then the static depth of the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority {
    pub tag: Tag,
    /// Topological rank of the destination actor; lower depths fire first at equal tags.
    pub depth: usize,
}

impl Priority {
    pub fn new(tag: Tag, depth: usize) -> Self {
        Self { tag, depth }
    }
}

/// Where an event is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Destination {
    pub actor: ActorKey,
    /// The input port receiving the value, or `None` for a pure event (a refire request).
    pub port: Option<PortKey>,
}

impl Destination {
    pub fn port(actor: ActorKey, port: PortKey) -> Self {
        Self {
            actor,
            port: Some(port),
        }
    }

    pub fn pure(actor: ActorKey) -> Self {
        Self { actor, port: None }
    }
}

impl Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}.{}", self.actor, port),
            None => write!(f, "{}", self.actor),
        }
    }
}

/// A scheduled firing request.
///
/// Events are owned by the event queue from insertion until the director dispatches them, at which
/// point the value is moved into the destination actor's [`crate::Inputs`].
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// The [`Tag`] at which the destination should fire.
    pub(crate) tag: Tag,
    /// Static depth of the destination; assigned by the director on insertion.
    pub(crate) depth: usize,
    /// Absolute tag by which an actuation must happen.
    pub(crate) deadline: Option<Tag>,
    /// Minimum physical-time lag past the timestamp before the event is safe to process.
    pub(crate) offset_time: Duration,
    /// The value carried by this event.
    pub(crate) value: Token,
    pub(crate) destination: Destination,
}

impl Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "E[tag={},depth={},dest={},value={}",
            self.tag, self.depth, self.destination, self.value
        )?;
        if let Some(deadline) = self.deadline {
            write!(f, ",deadline={deadline}")?;
        }
        write!(f, "]")
    }
}

impl Prioritized for Event {
    fn priority(&self) -> Priority {
        Priority::new(self.tag, self.depth)
    }
}

impl Event {
    /// Create an event delivering `value` to an input port.
    pub fn new(tag: Tag, destination: Destination, value: impl Into<Token>) -> Self {
        Self {
            tag,
            depth: 0,
            deadline: None,
            offset_time: Duration::ZERO,
            value: value.into(),
            destination,
        }
    }

    /// Create a pure event that refires `actor` at `tag` without delivering a value.
    pub fn pure(tag: Tag, actor: ActorKey) -> Self {
        Self::new(tag, Destination::pure(actor), Token::Unit)
    }

    pub fn with_deadline(mut self, deadline: Tag) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_offset_time(mut self, offset_time: Duration) -> Self {
        self.offset_time = offset_time;
        self
    }

    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn deadline(&self) -> Option<Tag> {
        self.deadline
    }

    pub fn offset_time(&self) -> Duration {
        self.offset_time
    }

    pub fn value(&self) -> &Token {
        &self.value
    }

    pub fn destination(&self) -> Destination {
        self.destination
    }

    /// The earliest physical time at which this event may be processed.
    pub fn safe_time(&self) -> Timestamp {
        self.tag.timestamp.offset(self.offset_time)
    }

    /// `true` if both events share a tag and a destination actor, and so fire together.
    pub fn fires_with(&self, other: &Event) -> bool {
        self.tag == other.tag && self.destination.actor == other.destination.actor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CalendarQueue;

    fn event(secs: f64, microstep: usize) -> Event {
        Event::new(
            Tag::new(Timestamp::from_secs_f64(secs), microstep),
            Destination::port(ActorKey::from(0), PortKey::from(0)),
            Token::from(secs),
        )
    }

    #[test]
    fn test_scheduled_event_order() {
        let mut queue = CalendarQueue::new();
        queue.insert(event(1.0, 0)).unwrap();
        queue.insert(event(1.0, 1)).unwrap();
        queue.insert(event(0.5, 0)).unwrap();

        let tags: Vec<Tag> = std::iter::from_fn(|| queue.extract_min())
            .map(|event| event.tag())
            .collect();
        assert_eq!(
            tags,
            vec![
                Tag::new(Timestamp::from_secs_f64(0.5), 0),
                Tag::new(Timestamp::from_secs_f64(1.0), 0),
                Tag::new(Timestamp::from_secs_f64(1.0), 1),
            ]
        );
    }

    #[test]
    fn test_safe_time() {
        let ev = event(10.0, 0).with_offset_time(Duration::from_secs(2));
        assert_eq!(ev.safe_time(), Timestamp::from_secs_f64(12.0));
    }

    #[test]
    fn test_display() {
        let ev = Event::pure(Tag::ZERO, ActorKey::from(2));
        assert_eq!(
            ev.to_string(),
            "E[tag=[0.000000000s+0],depth=0,dest=ActorKey(2),value=()]"
        );
    }
}
