//! Non-preemptive prioritized tasks.
//!
//! A task body is a step function. Each call runs to completion; a body that returns without
//! calling [`TaskContext::terminate_task`] yields and is queued again behind ready tasks of the
//! same priority. Terminating ends one activation, and the task runs again while activations
//! remain.

use std::{cmp::Ordering, collections::BinaryHeap};

use crate::{ActorError, RuntimeError};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(usize);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TaskId({})", self.0)
    }
}

pub type TaskBody = Box<dyn FnMut(&mut TaskContext) -> Result<(), ActorError> + Send>;

/// Passed into a running task body.
#[derive(Debug)]
pub struct TaskContext<'a> {
    id: TaskId,
    name: &'a str,
    activations: Vec<TaskId>,
    terminated: bool,
}

impl TaskContext<'_> {
    pub fn task_id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.name
    }

    /// Mark `id` ready. Takes effect once the running body returns.
    pub fn activate_task(&mut self, id: TaskId) {
        self.activations.push(id);
    }

    /// End the running activation.
    pub fn terminate_task(&mut self) {
        self.terminated = true;
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TaskStats {
    /// Body invocations
    pub steps: usize,
    /// Activations that ran to termination
    pub completed: usize,
    /// Activations refused because the task was at its activation limit
    pub rejected_activations: usize,
}

struct Task {
    name: String,
    priority: u32,
    body: TaskBody,
    /// Activations not yet terminated, including a running one
    pending: usize,
}

/// A ready queue entry: higher priority first, then first come first served.
#[derive(Debug, PartialEq, Eq)]
struct Ready {
    priority: u32,
    seq: u64,
    task: TaskId,
}

impl Ord for Ready {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Ready {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub struct TaskScheduler {
    tasks: Vec<Task>,
    ready: BinaryHeap<Ready>,
    seq: u64,
    max_activations: usize,
    stats: TaskStats,
}

impl std::fmt::Debug for TaskScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskScheduler")
            .field("tasks", &self.tasks.len())
            .field("ready", &self.ready)
            .field("max_activations", &self.max_activations)
            .field("stats", &self.stats)
            .finish()
    }
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskScheduler {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            ready: BinaryHeap::new(),
            seq: 0,
            max_activations: 1,
            stats: TaskStats::default(),
        }
    }

    /// Limit the number of outstanding activations per task. At least one is always allowed.
    pub fn with_max_activations(mut self, max_activations: usize) -> Self {
        self.max_activations = max_activations.max(1);
        self
    }

    pub fn add_task<F>(&mut self, name: &str, priority: u32, body: F) -> TaskId
    where
        F: FnMut(&mut TaskContext) -> Result<(), ActorError> + Send + 'static,
    {
        let id = TaskId(self.tasks.len());
        self.tasks.push(Task {
            name: name.to_owned(),
            priority,
            body: Box::new(body),
            pending: 0,
        });
        id
    }

    pub fn task_name(&self, id: TaskId) -> Option<&str> {
        self.tasks.get(id.0).map(|task| task.name.as_str())
    }

    pub fn stats(&self) -> &TaskStats {
        &self.stats
    }

    /// Add an activation of `id`.
    ///
    /// An activation beyond the limit is dropped with a warning and counted in
    /// [`TaskStats::rejected_activations`].
    pub fn activate(&mut self, id: TaskId) -> Result<(), RuntimeError> {
        let task = self
            .tasks
            .get_mut(id.0)
            .ok_or(RuntimeError::UnknownTask(id))?;

        if task.pending >= self.max_activations {
            tracing::warn!(task = %task.name, limit = self.max_activations, "Activation rejected");
            self.stats.rejected_activations += 1;
            return Ok(());
        }

        task.pending += 1;
        if task.pending == 1 {
            self.push_ready(id);
        }
        Ok(())
    }

    fn push_ready(&mut self, id: TaskId) {
        let priority = self.tasks[id.0].priority;
        self.ready.push(Ready {
            priority,
            seq: self.seq,
            task: id,
        });
        self.seq += 1;
    }

    /// Run ready tasks until none remain.
    #[tracing::instrument(skip(self))]
    pub fn run(&mut self) -> Result<TaskStats, RuntimeError> {
        while let Some(Ready { task: id, .. }) = self.ready.pop() {
            let Task {
                name, body, pending, ..
            } = &mut self.tasks[id.0];

            let mut ctx = TaskContext {
                id,
                name: name.as_str(),
                activations: Vec::new(),
                terminated: false,
            };
            tracing::trace!(task = %name, "Running");
            body(&mut ctx).map_err(|err| RuntimeError::actor_fire(name.clone(), err))?;
            self.stats.steps += 1;

            let TaskContext {
                activations,
                terminated,
                ..
            } = ctx;
            if terminated {
                *pending -= 1;
                self.stats.completed += 1;
            }
            let requeue = *pending > 0;

            for target in activations {
                self.activate(target)?;
            }
            if requeue {
                self.push_ready(id);
            }
        }

        tracing::info!(
            steps = self.stats.steps,
            completed = self.stats.completed,
            "No task ready"
        );
        Ok(self.stats.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    type Log = Arc<Mutex<Vec<&'static str>>>;

    /// A task that logs its name and terminates on every step.
    fn logging(log: &Log, name: &'static str) -> impl FnMut(&mut TaskContext) -> Result<(), ActorError> {
        let log = log.clone();
        move |ctx| {
            log.lock().unwrap().push(name);
            ctx.terminate_task();
            Ok(())
        }
    }

    #[test]
    fn test_priority_then_fifo() {
        let log = Log::default();
        let mut sched = TaskScheduler::new();
        let low = sched.add_task("low", 1, logging(&log, "low"));
        let first = sched.add_task("first", 5, logging(&log, "first"));
        let second = sched.add_task("second", 5, logging(&log, "second"));
        let high = sched.add_task("high", 9, logging(&log, "high"));

        for id in [low, first, second, high] {
            sched.activate(id).unwrap();
        }
        let stats = sched.run().unwrap();
        assert_eq!(*log.lock().unwrap(), ["high", "first", "second", "low"]);
        assert_eq!(stats.completed, 4);
    }

    #[test]
    fn test_non_preemptive_activation() {
        let log = Log::default();
        let mut sched = TaskScheduler::new();
        let high = sched.add_task("high", 9, logging(&log, "high"));
        let inner = log.clone();
        let low = sched.add_task("low", 1, move |ctx| {
            ctx.activate_task(high);
            inner.lock().unwrap().push("low");
            ctx.terminate_task();
            Ok(())
        });

        sched.activate(low).unwrap();
        sched.run().unwrap();
        // The higher priority task waits for the running body to return.
        assert_eq!(*log.lock().unwrap(), ["low", "high"]);
    }

    #[test]
    fn test_yield_until_terminated() {
        let log = Log::default();
        let mut sched = TaskScheduler::new();
        let mut remaining = 3;
        let inner = log.clone();
        let worker = sched.add_task("worker", 1, move |ctx| {
            inner.lock().unwrap().push("worker");
            remaining -= 1;
            if remaining == 0 {
                ctx.terminate_task();
            }
            Ok(())
        });
        let peer = sched.add_task("peer", 1, logging(&log, "peer"));

        sched.activate(worker).unwrap();
        sched.activate(peer).unwrap();
        let stats = sched.run().unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            ["worker", "peer", "worker", "worker"]
        );
        assert_eq!(stats.steps, 4);
        assert_eq!(stats.completed, 2);
    }

    #[test]
    fn test_activation_limit() {
        let log = Log::default();
        let mut sched = TaskScheduler::new().with_max_activations(2);
        let task = sched.add_task("task", 1, logging(&log, "task"));
        for _ in 0..3 {
            sched.activate(task).unwrap();
        }
        let stats = sched.run().unwrap();
        assert_eq!(log.lock().unwrap().len(), 2);
        assert_eq!(stats.rejected_activations, 1);

        assert!(matches!(
            sched.activate(TaskId(7)),
            Err(RuntimeError::UnknownTask(_))
        ));
    }

    #[test]
    fn test_body_error() {
        let mut sched = TaskScheduler::new();
        let task = sched.add_task("faulty", 1, |_ctx| Err("stack overflow".into()));
        sched.activate(task).unwrap();
        let err = sched.run().unwrap_err();
        assert_eq!(err.to_string(), "Actor 'faulty' failed: stack overflow");
    }
}
