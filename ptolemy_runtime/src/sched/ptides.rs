//! PTIDES execution: events are processed once physical time guarantees no earlier event can still
//! arrive, and actuations that come too late are dropped.

use crate::{
    ActorKey, Clock, Config, Director, Event, EventSender, Model, RunStats, RuntimeError, StopHandle,
    SyncStatus, Timestamp,
};

use super::common::{Dispatch, Next};

/// `true` once physical time has passed the event's timestamp plus its offset time.
pub fn is_safe_to_process(event: &Event, physical_time: Timestamp) -> bool {
    physical_time >= event.safe_time()
}

/// A director that dispatches events by the PTIDES safe-to-process rule.
///
/// Among queued events, the first in `(tag, depth)` order that is safe to process and is the
/// earliest pending event of its actor is fired; when none is, the director waits on its clock for
/// the earliest safe time. Events beyond the stop time are never candidates. An event carrying a
/// deadline that has already passed on the physical clock is skipped and counted in
/// [`RunStats::deadline_misses`].
#[derive(Debug)]
pub struct PtidesDirector {
    inner: Director,
}

impl PtidesDirector {
    pub fn new(model: Model, config: Config) -> Self {
        Self {
            inner: Director::new(model, config),
        }
    }

    pub fn with_clock(self, clock: impl Clock + 'static) -> Self {
        Self {
            inner: self.inner.with_clock(clock),
        }
    }

    pub fn event_sender(&mut self) -> EventSender {
        self.inner.event_sender()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.inner.stop_handle()
    }

    pub fn director(&self) -> &Director {
        &self.inner
    }

    #[tracing::instrument(skip(self))]
    pub fn run(&mut self) -> Result<RunStats, RuntimeError> {
        self.inner.execute(Dispatch::Ptides)
    }
}

impl Director {
    /// Select the first safe event, or wait for one to become safe.
    pub(super) fn next_safe(&mut self) -> Result<Next, RuntimeError> {
        let Some(min_tag) = self.queue.peek_min().map(Event::tag) else {
            return self.on_empty_queue();
        };

        if self.should_stop_before(min_tag) {
            return Ok(Next::Stop);
        }

        let now = self.clock.now();
        let stop_time = self.config.stop_time;

        // An actor's events are candidates in tag order only. `pending` holds the safe time of the
        // earliest event of each actor that is still waiting.
        let mut pending: Vec<(ActorKey, Timestamp)> = Vec::new();
        let mut safe = None;
        for event in self.queue.iter_sorted() {
            if stop_time.is_some_and(|stop| event.tag.timestamp > stop) {
                break;
            }
            let actor = event.destination.actor;
            if pending.iter().any(|(blocked, _)| *blocked == actor) {
                continue;
            }
            if is_safe_to_process(event, now) {
                safe = Some((event.tag, actor));
                break;
            }
            pending.push((actor, event.safe_time()));
        }

        let Some((tag, actor)) = safe else {
            let Some(earliest) = pending.iter().map(|(_, safe_time)| *safe_time).min() else {
                return Ok(Next::Retry);
            };
            tracing::debug!(now = %now, earliest = %earliest, "No event is safe to process yet");
            match self.clock.synchronize(earliest, Some(&self.event_rx)) {
                SyncStatus::Interrupted(event) => self.accept_async(event)?,
                SyncStatus::Disconnected => {
                    self.clock.synchronize(earliest, None);
                }
                SyncStatus::OutOfSync(_) | SyncStatus::Synchronized => {}
            }
            return Ok(Next::Retry);
        };

        if self.should_stop_before(tag) {
            return Ok(Next::Stop);
        }

        let mut events = self
            .queue
            .remove_matching(|event| event.tag == tag && event.destination.actor == actor);

        let now = self.clock.now();
        let before = events.len();
        events.retain(|event| match event.deadline {
            Some(deadline) if now > deadline.timestamp => {
                tracing::warn!(event = %event, now = %now, "Deadline missed, skipping event");
                false
            }
            _ => true,
        });
        self.stats.deadline_misses += before - events.len();

        if events.is_empty() {
            return Ok(Next::Retry);
        }
        Ok(Next::Fire { tag, actor, events })
    }
}
