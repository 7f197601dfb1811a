use crate::{
    context::validate_event, Actor, ActorError, ActorKey, Context, Director, Event, Inputs, Phase,
    RunStats, RuntimeError, SyncStatus, Tag,
};

/// How the next firing group is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dispatch {
    /// Strictly in `(tag, depth)` order
    Discrete,
    /// The first event that is safe to process on the physical clock
    Ptides,
}

/// The outcome of selecting the next firing group.
pub(super) enum Next {
    Fire {
        tag: Tag,
        actor: ActorKey,
        events: Vec<Event>,
    },
    /// State changed without a firing; select again
    Retry,
    Stop,
}

/// What happened to an actor during one firing.
enum Firing {
    Skipped,
    Fired { postfire: bool },
}

fn fire_actor(
    actor: &mut dyn Actor,
    ctx: &mut Context,
    inputs: &Inputs,
    phase: &mut Phase,
) -> Result<Firing, ActorError> {
    *phase = Phase::Prefire;
    if !actor.prefire(ctx, inputs)? {
        return Ok(Firing::Skipped);
    }
    *phase = Phase::Fire;
    actor.fire(ctx, inputs)?;
    *phase = Phase::Postfire;
    let postfire = actor.postfire(ctx)?;
    Ok(Firing::Fired { postfire })
}

impl Director {
    pub(super) fn execute(&mut self, dispatch: Dispatch) -> Result<RunStats, RuntimeError> {
        self.stats = RunStats::default();
        let result = self
            .startup()
            .and_then(|()| self.event_loop(dispatch));
        let wrapup = self.shutdown();

        if let Err(err) = result {
            if let Err(wrapup_err) = wrapup {
                tracing::error!(error = %wrapup_err, "Wrapup failed after an earlier error");
            }
            return Err(err);
        }
        wrapup?;
        Ok(self.stats.clone())
    }

    /// Reset the director state and initialize every actor in topological order.
    #[tracing::instrument(skip(self))]
    fn startup(&mut self) -> Result<(), RuntimeError> {
        self.phase = Phase::Initialize;
        self.queue.clear();
        self.tag = Tag::new(self.config.start_time, 0);
        self.stats.final_tag = self.tag;
        self.clock.start(self.config.start_time);
        self.disabled = vec![false; self.model.actors.len()];
        self.finishing = false;
        tracing::info!(tag = %self.tag, actors = self.model.actors.len(), "Starting the execution.");

        for key in self.model.topological_order() {
            let name = self.model.topology.actor(key)?.name.clone();
            let mut ctx = Context::new(key, self.tag, &self.model.topology, self.clock.as_ref());
            let result = self.model.actors[key.index()].initialize(&mut ctx);
            let internal = ctx.internal;
            result.map_err(|err| RuntimeError::actor_fire(name, err))?;

            for event in internal.scheduled_events {
                self.queue.insert(event)?;
            }
            if internal.stop_requested {
                self.finishing = true;
            }
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    fn event_loop(&mut self, dispatch: Dispatch) -> Result<(), RuntimeError> {
        let mut remaining = self.config.iterations;
        loop {
            if self.stop_trigger.is_set() && !self.finishing {
                tracing::info!(tag = %self.tag, "Stop requested externally.");
                self.finishing = true;
            }
            if remaining == Some(0) {
                tracing::info!("Iteration limit reached.");
                break;
            }

            self.drain_async()?;

            let next = match dispatch {
                Dispatch::Discrete => self.next_in_order()?,
                Dispatch::Ptides => self.next_safe()?,
            };

            match next {
                Next::Fire { tag, actor, events } => {
                    if self.fire_group(tag, actor, events)? {
                        if let Some(remaining) = remaining.as_mut() {
                            *remaining -= 1;
                        }
                    }
                }
                Next::Retry => {}
                Next::Stop => break,
            }
        }
        Ok(())
    }

    /// Select the minimum event and every other event at its tag for the same actor.
    fn next_in_order(&mut self) -> Result<Next, RuntimeError> {
        let Some(next_tag) = self.queue.peek_min().map(Event::tag) else {
            return self.on_empty_queue();
        };
        if self.should_stop_before(next_tag) {
            return Ok(Next::Stop);
        }

        if !self.config.fast_forward {
            if let Some(async_event) = self.synchronize_wall_clock(next_tag) {
                // Woken up by an async event; re-select so that both are ordered.
                self.accept_async(async_event)?;
                return Ok(Next::Retry);
            }
        }

        let Some(first) = self.queue.extract_min() else {
            return Ok(Next::Retry);
        };
        Ok(self.gather(first))
    }

    /// Collect the events that fire together with `first`.
    pub(super) fn gather(&mut self, first: Event) -> Next {
        let tag = first.tag;
        let actor = first.destination.actor;
        let mut events = vec![first];
        events.extend(
            self.queue
                .remove_matching(|event| event.tag == tag && event.destination.actor == actor),
        );
        Next::Fire { tag, actor, events }
    }

    /// `true` if the event at `next_tag` must not be processed and the run should wrap up.
    pub(super) fn should_stop_before(&self, next_tag: Tag) -> bool {
        if self.finishing && next_tag > self.tag {
            tracing::debug!(tag = %self.tag, "Finished the current tag.");
            return true;
        }
        match self.config.stop_time {
            Some(stop_time) if next_tag.timestamp > stop_time => {
                tracing::info!(next = %next_tag, stop_time = %stop_time, "Next event exceeds the stop time.");
                true
            }
            _ => false,
        }
    }

    /// Decide what to do when no event is queued.
    pub(super) fn on_empty_queue(&mut self) -> Result<Next, RuntimeError> {
        if self.finishing || self.config.stop_when_queue_is_empty {
            tracing::trace!("No more events in queue. -> Terminate!");
            return Ok(Next::Stop);
        }

        // Only external senders can produce more events now.
        self.event_tx = None;
        match self.receive_event() {
            Some(event) => {
                self.accept_async(event)?;
                Ok(Next::Retry)
            }
            None => Ok(Next::Stop),
        }
    }

    /// Wait for an asynchronous event, until the stop time if there is one.
    #[tracing::instrument(skip(self))]
    fn receive_event(&mut self) -> Option<Event> {
        match self.config.stop_time {
            Some(stop_time) => {
                tracing::debug!(stop_time = %stop_time, "Waiting for async event.");
                match self.clock.synchronize(stop_time, Some(&self.event_rx)) {
                    SyncStatus::Interrupted(event) => Some(event),
                    _ => None,
                }
            }
            None => {
                tracing::debug!("Waiting indefinitely for async event.");
                self.event_rx.recv().ok()
            }
        }
    }

    /// Wait until the physical clock reaches the timestamp of `tag`.
    #[tracing::instrument(skip(self), fields(target = %target))]
    pub(super) fn synchronize_wall_clock(&mut self, target: Tag) -> Option<Event> {
        match self.clock.synchronize(target.timestamp, Some(&self.event_rx)) {
            SyncStatus::Interrupted(event) => Some(event),
            SyncStatus::Disconnected => {
                tracing::debug!("Sleep interrupted by disconnect, sleeping for remaining");
                self.clock.synchronize(target.timestamp, None);
                None
            }
            SyncStatus::OutOfSync(delay) => {
                tracing::warn!(delay = ?delay, "running late");
                None
            }
            SyncStatus::Synchronized => None,
        }
    }

    /// Push pending asynchronous events into the queue.
    pub(super) fn drain_async(&mut self) -> Result<(), RuntimeError> {
        while let Ok(event) = self.event_rx.try_recv() {
            self.accept_async(event)?;
        }
        Ok(())
    }

    pub(super) fn accept_async(&mut self, mut event: Event) -> Result<(), RuntimeError> {
        if event.tag < self.tag {
            event.tag = self.tag.advance_microstep();
        }
        match validate_event(&self.model.topology, self.tag, event) {
            Ok(event) => {
                tracing::debug!(event = %event, "Accepted async event");
                self.queue.insert(event)?;
            }
            Err(err) => {
                tracing::warn!(error = %err, "Discarding async event");
                self.stats.discarded_events += 1;
            }
        }
        Ok(())
    }

    /// Fire `actor` with the events delivered at `tag`. Returns `true` if the actor was fired.
    #[tracing::instrument(skip(self, events), fields(tag = %tag, actor = %actor, events = events.len()))]
    pub(super) fn fire_group(
        &mut self,
        tag: Tag,
        actor: ActorKey,
        events: Vec<Event>,
    ) -> Result<bool, RuntimeError> {
        self.tag = tag;
        if self.disabled[actor.index()] {
            tracing::trace!("Discarding events for a disabled actor.");
            self.stats.discarded_events += events.len();
            return Ok(false);
        }

        self.stats.events_processed += events.len();
        self.stats.final_tag = tag;
        let mut inputs = Inputs::default();
        for event in events {
            inputs.push(event.destination.port, event.value);
        }

        let name = self.model.topology.actor(actor)?.name.clone();
        tracing::trace!("    Executing {name}.");
        let mut ctx = Context::new(actor, tag, &self.model.topology, self.clock.as_ref());
        let body = self.model.actors[actor.index()].as_mut();
        let firing = fire_actor(body, &mut ctx, &inputs, &mut self.phase);
        let internal = ctx.internal;
        let firing = firing.map_err(|err| RuntimeError::actor_fire(name.as_str(), err))?;
        self.stats.firings += 1;

        for event in internal.scheduled_events {
            self.queue.insert(event)?;
        }
        if internal.stop_requested {
            self.finishing = true;
        }

        match firing {
            Firing::Skipped => tracing::trace!("Prefire returned false."),
            Firing::Fired { postfire: true } => {}
            Firing::Fired { postfire: false } => {
                self.disabled[actor.index()] = true;
                let purged = self
                    .queue
                    .remove_matching(|event| event.destination.actor == actor);
                self.stats.discarded_events += purged.len();
                self.finishing = true;
                tracing::info!(actor = %name, purged = purged.len(), "Postfire returned false, no more firings.");
            }
        }
        Ok(true)
    }

    /// Wrap up every actor in reverse topological order.
    #[tracing::instrument(skip(self))]
    fn shutdown(&mut self) -> Result<(), RuntimeError> {
        self.phase = Phase::Wrapup;
        tracing::info!(tag = %self.tag, "Shutting down.");

        // If the event queue still has events on it, report that.
        if let Some(event) = self.queue.peek_min() {
            tracing::warn!(
                "---- There are {} unprocessed future events on the event queue.",
                self.queue.len()
            );
            tracing::warn!("---- The first future event is {event}.");
        }
        self.queue.clear();

        let mut first_error = None;
        for key in self.model.topological_order().into_iter().rev() {
            let Ok(name) = self.model.topology.actor(key).map(|info| info.name.clone()) else {
                continue;
            };
            let mut ctx = Context::new(key, self.tag, &self.model.topology, self.clock.as_ref());
            if let Err(err) = self.model.actors[key.index()].wrapup(&mut ctx) {
                tracing::error!(actor = %name, error = %err, "Wrapup failed");
                if first_error.is_none() {
                    first_error = Some(RuntimeError::actor_fire(name, err));
                }
            }
        }

        tracing::info!("---- Elapsed model time: {:?}", self.tag.timestamp - self.config.start_time);
        tracing::info!("---- Physical time: {}", self.clock.now());
        tracing::info!(stats = ?self.stats, "Director has been shut down.");
        self.phase = Phase::Finished;

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
