//! The discrete-event director is the core of the runtime. It owns the event queue, advances model
//! time and fires actors in tag order, and accepts asynchronous events from other threads.

use crossbeam_channel::{Receiver, Sender};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{keepalive, CalendarQueue, Clock, Event, Model, SystemClock, Tag, Timestamp};

mod common;
mod ptides;

pub use ptides::{is_safe_to_process, PtidesDirector};

/// Director configuration
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Model time of the first tag
    pub start_time: Timestamp,
    /// Events with a timestamp beyond this time are not processed
    pub stop_time: Option<Timestamp>,
    /// Maximum number of firings
    pub iterations: Option<usize>,
    /// Whether to wrap up as soon as the event queue runs dry, instead of waiting for
    /// asynchronous events
    pub stop_when_queue_is_empty: bool,
    /// Whether to skip wall-clock synchronization
    pub fast_forward: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            start_time: Timestamp::ZERO,
            stop_time: None,
            iterations: None,
            stop_when_queue_is_empty: true,
            fast_forward: true,
        }
    }
}

impl Config {
    pub fn with_start_time(mut self, start_time: Timestamp) -> Self {
        self.start_time = start_time;
        self
    }

    pub fn with_stop_time(mut self, stop_time: Timestamp) -> Self {
        self.stop_time = Some(stop_time);
        self
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = Some(iterations);
        self
    }

    pub fn with_stop_when_queue_is_empty(mut self, stop_when_queue_is_empty: bool) -> Self {
        self.stop_when_queue_is_empty = stop_when_queue_is_empty;
        self
    }

    pub fn with_fast_forward(mut self, fast_forward: bool) -> Self {
        self.fast_forward = fast_forward;
        self
    }
}

/// The phase a director is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Initialize,
    Prefire,
    Fire,
    Postfire,
    Wrapup,
    Finished,
}

/// Summary of a completed run.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Number of actor firings, counting firings skipped by `prefire`
    pub firings: usize,
    /// Number of events delivered to actors
    pub events_processed: usize,
    /// The last tag at which an actor was fired
    pub final_tag: Tag,
    /// Events dropped because their destination was disabled or they were invalid
    pub discarded_events: usize,
    /// Events skipped because their deadline had passed when they were dispatched
    pub deadline_misses: usize,
}

/// A `Send + Clone` handle for posting events to a running director from another thread.
#[derive(Debug, Clone)]
pub struct EventSender(Sender<Event>);

impl EventSender {
    /// Post an event. Events stamped earlier than the director's current tag are delivered at the
    /// next microstep of the current tag.
    pub fn send(&self, event: Event) -> Result<(), crossbeam_channel::SendError<Event>> {
        self.0.send(event)
    }
}

/// A handle for asking a running director to finish its current tag and wrap up.
#[derive(Debug, Clone)]
pub struct StopHandle(keepalive::Flag);

impl StopHandle {
    pub fn stop(&self) {
        self.0.raise();
    }
}

/// The discrete-event director.
pub struct Director {
    /// The model being executed
    pub(super) model: Model,
    /// The main event queue, sorted by `(tag, depth)`
    pub(super) queue: CalendarQueue<Event>,
    /// The tag of the current firing
    pub(super) tag: Tag,
    pub(super) phase: Phase,
    /// Physical time source
    pub(super) clock: Box<dyn Clock>,
    /// Asynchronous events sender, dropped while waiting so that disconnection is observable
    pub(super) event_tx: Option<Sender<Event>>,
    /// Asynchronous events receiver
    pub(super) event_rx: Receiver<Event>,
    /// Raised by a [`StopHandle`]
    pub(super) stop_trigger: keepalive::Trigger,
    /// Actors that returned `false` from postfire
    pub(super) disabled: Vec<bool>,
    /// Finish the events at the current tag, then wrap up
    pub(super) finishing: bool,
    pub(super) stats: RunStats,
    /// Config
    pub(super) config: Config,
}

impl std::fmt::Debug for Director {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Director")
            .field("model", &self.model)
            .field("queue_len", &self.queue.len())
            .field("tag", &self.tag)
            .field("phase", &self.phase)
            .field("clock", &self.clock)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Director {
    pub fn new(model: Model, config: Config) -> Self {
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        let (stop_trigger, _) = keepalive::channel();
        Self {
            disabled: vec![false; model.actors.len()],
            model,
            queue: CalendarQueue::new(),
            tag: Tag::new(config.start_time, 0),
            phase: Phase::Idle,
            clock: Box::new(SystemClock::new()),
            event_tx: Some(event_tx),
            event_rx,
            stop_trigger,
            finishing: false,
            stats: RunStats::default(),
            config,
        }
    }

    /// Replace the physical clock, a [`SystemClock`] by default.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// A handle for injecting events from other threads.
    pub fn event_sender(&mut self) -> EventSender {
        let tx = match &self.event_tx {
            Some(tx) => tx.clone(),
            None => {
                let (tx, rx) = crossbeam_channel::unbounded();
                self.event_rx = rx;
                self.event_tx = Some(tx.clone());
                tx
            }
        };
        EventSender(tx)
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(self.stop_trigger.flag())
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Number of pending events.
    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    /// Run the model to completion.
    #[tracing::instrument(skip(self))]
    pub fn run(&mut self) -> Result<RunStats, crate::RuntimeError> {
        self.execute(common::Dispatch::Discrete)
    }
}
