use std::{sync::Arc, thread::JoinHandle};

use super::{
    channel::{endpoints, Buffer, ChannelControl},
    monitor::Monitor,
    ChannelError, Config, PnStats, ProcessContext, ProcessError, Receiver, Sender,
};
use crate::{keepalive, ActorError, ChannelKey, RuntimeError};

type ProcessFn = Box<dyn FnOnce(ProcessContext) -> Result<(), ProcessError> + Send>;

/// Decrements the live process count when a process thread exits, even by panicking.
struct ActiveGuard(Arc<Monitor>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.process_finished();
    }
}

/// Why the director stopped waiting on its processes.
enum Outcome {
    Completed,
    Failed,
    Deadlocked(Vec<ChannelKey>),
}

/// The process-network director.
///
/// Channels and processes are registered up front; [`PnDirector::run`] then starts one thread per
/// process and blocks until every process has returned, a process has failed, or the network is
/// deadlocked.
pub struct PnDirector {
    config: Config,
    monitor: Arc<Monitor>,
    channels: Vec<Arc<dyn ChannelControl>>,
    processes: Vec<(String, ProcessFn)>,
    terminate: keepalive::Trigger,
    stats: PnStats,
}

impl std::fmt::Debug for PnDirector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PnDirector")
            .field("config", &self.config)
            .field("channels", &self.channels)
            .field(
                "processes",
                &self.processes.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl PnDirector {
    pub fn new(config: Config) -> Self {
        let (terminate, _) = keepalive::channel();
        Self {
            config,
            monitor: Arc::new(Monitor::default()),
            channels: Vec::new(),
            processes: Vec::new(),
            terminate,
            stats: PnStats::default(),
        }
    }

    /// Create a bounded channel. A zero `capacity` uses the configured default capacity.
    pub fn channel<T: Send + 'static>(
        &mut self,
        name: impl Into<String>,
        capacity: usize,
    ) -> (Sender<T>, Receiver<T>) {
        let key = ChannelKey::from(self.channels.len());
        let capacity = match capacity {
            0 => self.config.default_capacity.max(1),
            capacity => capacity,
        };
        let buffer = Arc::new(Buffer::new(
            key,
            name.into(),
            capacity,
            self.monitor.clone(),
            self.terminate.flag(),
        ));
        tracing::debug!(channel = ?buffer, capacity, "Created channel");
        self.channels.push(buffer.clone());
        endpoints(buffer)
    }

    /// Register a process. It runs on its own thread once [`PnDirector::run`] is called.
    ///
    /// A process that returns [`ChannelError::Terminated`] ends gracefully; any other error ends
    /// the whole run.
    pub fn add_process<F>(&mut self, name: impl Into<String>, body: F)
    where
        F: FnOnce(ProcessContext) -> Result<(), ProcessError> + Send + 'static,
    {
        self.processes.push((name.into(), Box::new(body)));
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Capacities of every channel, in creation order.
    pub fn capacities(&self) -> Vec<(String, usize)> {
        self.channels
            .iter()
            .map(|channel| (channel.name().to_owned(), channel.capacity()))
            .collect()
    }

    /// Run every registered process to completion.
    #[tracing::instrument(skip(self))]
    pub fn run(&mut self) -> Result<PnStats, RuntimeError> {
        let processes = std::mem::take(&mut self.processes);
        self.stats = PnStats {
            processes: processes.len(),
            ..Default::default()
        };
        self.monitor.reset();
        self.monitor.set_active(processes.len());
        tracing::info!(processes = processes.len(), channels = self.channels.len(), "Starting the process network.");

        let mut handles = Vec::with_capacity(processes.len());
        let mut spawn_error = None;
        for (idx, (name, body)) in processes.into_iter().enumerate() {
            match self.spawn(name.clone(), body) {
                Ok(handle) => handles.push((name, handle)),
                Err(err) => {
                    // This process and every later one never start.
                    let unstarted = self.stats.processes - idx;
                    for _ in 0..unstarted {
                        self.monitor.process_finished();
                    }
                    spawn_error = Some(RuntimeError::actor_fire(name, Box::new(err)));
                    break;
                }
            }
        }

        let outcome = match spawn_error {
            Some(_) => Outcome::Failed,
            None => self.supervise(),
        };

        if !matches!(outcome, Outcome::Completed) {
            self.terminate_all();
        }
        let panicked = self.join(handles);

        self.stats.final_capacities = self.capacities();
        tracing::info!(stats = ?self.stats, "Process network has been shut down.");

        if let Some(err) = spawn_error {
            return Err(err);
        }
        let failure = self.monitor.lock().failures.drain(..).next();
        if let Some((process, source)) = failure.or(panicked) {
            return Err(RuntimeError::actor_fire(process, source));
        }
        match outcome {
            Outcome::Deadlocked(keys) => Err(RuntimeError::Deadlock {
                channels: keys
                    .into_iter()
                    .filter_map(|key| self.channels.get(key.index()))
                    .map(|channel| channel.name().to_owned())
                    .collect(),
            }),
            Outcome::Completed | Outcome::Failed => Ok(self.stats.clone()),
        }
    }

    fn spawn(&self, name: String, body: ProcessFn) -> std::io::Result<JoinHandle<()>> {
        let monitor = self.monitor.clone();
        let ctx = ProcessContext {
            name: name.clone(),
            terminate: self.terminate.flag(),
        };
        std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let _guard = ActiveGuard(monitor.clone());
                match body(ctx) {
                    Ok(()) => tracing::debug!(process = %name, "Process finished"),
                    Err(ProcessError::Channel(ChannelError::Terminated)) => {
                        tracing::debug!(process = %name, "Process terminated")
                    }
                    Err(ProcessError::Other(err)) => {
                        tracing::error!(process = %name, error = %err, "Process failed");
                        monitor.fail(name, err);
                    }
                }
            })
    }

    /// Block until every process has finished, one has failed, or a real deadlock occurs.
    fn supervise(&mut self) -> Outcome {
        loop {
            let mut state = self.monitor.lock();
            let (write_blocked, blocked) = loop {
                if !state.failures.is_empty() {
                    return Outcome::Failed;
                }
                if state.active == 0 {
                    return Outcome::Completed;
                }
                if state.is_deadlocked() {
                    break (
                        state.write_blocked.iter().copied().collect::<Vec<_>>(),
                        state.blocked_channels(),
                    );
                }
                state = self.monitor.wait(state);
            };
            // Buffers are locked before the monitor, so release it first.
            drop(state);

            if !self.resolve_artificial_deadlock(&write_blocked) {
                tracing::warn!(channels = ?blocked, "Deadlock detected");
                return Outcome::Deadlocked(blocked);
            }
        }
    }

    /// Grow the smallest full buffer a writer is blocked on. Returns `false` if that is not
    /// allowed, making the deadlock real.
    fn resolve_artificial_deadlock(&mut self, write_blocked: &[ChannelKey]) -> bool {
        let Some(max_capacity) = self.config.max_queue_capacity else {
            return false;
        };
        let smallest = write_blocked
            .iter()
            .filter_map(|key| self.channels.get(key.index()))
            .min_by_key(|channel| (channel.capacity(), channel.key()));
        let Some(channel) = smallest else {
            return false;
        };

        let capacity = channel.capacity();
        let new_capacity = capacity.saturating_mul(2);
        if new_capacity > max_capacity {
            tracing::warn!(
                channel = channel.name(),
                capacity,
                max_capacity,
                "Cannot grow the buffer beyond the maximum queue capacity"
            );
            return false;
        }

        tracing::info!(channel = channel.name(), capacity, new_capacity, "Artificial deadlock, growing buffer");
        channel.set_capacity(new_capacity);
        self.stats.capacity_increases += 1;
        true
    }

    fn terminate_all(&self) {
        self.terminate.terminate();
        for channel in &self.channels {
            channel.wake_all();
        }
    }

    /// Join every process thread, reporting the first panic.
    fn join(&self, handles: Vec<(String, JoinHandle<()>)>) -> Option<(String, ActorError)> {
        let mut panicked = None;
        for (name, handle) in handles {
            if handle.join().is_err() && panicked.is_none() {
                tracing::error!(process = %name, "Process panicked");
                panicked = Some((name, ActorError::from("process panicked")));
            }
        }
        panicked
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    };

    use super::*;

    #[test_log::test]
    fn test_pipeline_completes_in_fifo_order() {
        let mut director = PnDirector::new(Config::default());
        let (tx, rx) = director.channel::<u32>("numbers", 2);
        let received = Arc::new(Mutex::new(Vec::new()));

        director.add_process("producer", move |_| {
            for i in 0..100 {
                tx.put(i)?;
            }
            Ok(())
        });
        let sink = received.clone();
        director.add_process("consumer", move |_| {
            for value in rx.iter() {
                sink.lock().unwrap().push(value);
            }
            Ok(())
        });

        let stats = director.run().unwrap();
        assert_eq!(stats.processes, 2);
        assert_eq!(stats.capacity_increases, 0);
        assert_eq!(*received.lock().unwrap(), (0..100).collect::<Vec<_>>());
        assert_eq!(stats.final_capacities, vec![("numbers".to_owned(), 2)]);
    }

    #[test_log::test]
    fn test_producer_blocks_on_full_buffer() {
        let mut director = PnDirector::new(Config::default());
        let (tx, rx) = director.channel::<u32>("full", 3);
        let puts = Arc::new(AtomicUsize::new(0));

        let count = puts.clone();
        director.add_process("producer", move |_| {
            for i in 0..4 {
                tx.put(i)?;
                count.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        });
        // Never reads: the fourth put blocks until this process exits and closes the channel.
        director.add_process("idle", move |_| {
            while rx.len() < 3 {
                std::thread::yield_now();
            }
            Ok(())
        });

        director.run().unwrap();
        assert_eq!(puts.load(Ordering::SeqCst), 3);
    }

    fn cross_writers(director: &mut PnDirector) {
        let (ab_tx, ab_rx) = director.channel::<u32>("a_to_b", 1);
        let (ba_tx, ba_rx) = director.channel::<u32>("b_to_a", 1);
        director.add_process("a", move |_| {
            for i in 0..3 {
                ab_tx.put(i)?;
            }
            for _ in 0..3 {
                ba_rx.get()?;
            }
            Ok(())
        });
        director.add_process("b", move |_| {
            for i in 0..3 {
                ba_tx.put(i)?;
            }
            for _ in 0..3 {
                ab_rx.get()?;
            }
            Ok(())
        });
    }

    #[test_log::test]
    fn test_full_buffer_deadlock() {
        let mut director = PnDirector::new(Config::default());
        cross_writers(&mut director);

        match director.run() {
            Err(RuntimeError::Deadlock { channels }) => {
                assert_eq!(channels, vec!["a_to_b".to_owned(), "b_to_a".to_owned()]);
            }
            other => panic!("expected a deadlock, got {other:?}"),
        }
    }

    #[test_log::test]
    fn test_artificial_deadlock_grows_buffers() {
        let mut director = PnDirector::new(Config::default().with_max_queue_capacity(4));
        cross_writers(&mut director);

        let stats = director.run().unwrap();
        assert!(stats.capacity_increases >= 2);
        assert!(stats
            .final_capacities
            .iter()
            .all(|(_, capacity)| *capacity <= 4));
    }

    #[test_log::test]
    fn test_read_deadlock() {
        let mut director = PnDirector::new(Config::default().with_max_queue_capacity(64));
        let (ab_tx, ab_rx) = director.channel::<u32>("a_to_b", 1);
        let (ba_tx, ba_rx) = director.channel::<u32>("b_to_a", 1);
        director.add_process("a", move |_| {
            let value = ba_rx.get()?;
            ab_tx.put(value)?;
            Ok(())
        });
        director.add_process("b", move |_| {
            let value = ab_rx.get()?;
            ba_tx.put(value)?;
            Ok(())
        });

        assert!(matches!(
            director.run(),
            Err(RuntimeError::Deadlock { .. })
        ));
    }

    #[test_log::test]
    fn test_process_error_terminates_run() {
        let mut director = PnDirector::new(Config::default());
        let (tx, rx) = director.channel::<u32>("ch", 1);
        director.add_process("reader", move |_| {
            while rx.get().is_ok() {}
            Ok(())
        });
        director.add_process("broken", move |ctx| {
            tx.put(1)?;
            assert_eq!(ctx.name(), "broken");
            Err(ProcessError::other("sensor unplugged"))
        });

        match director.run() {
            Err(RuntimeError::ActorFire { actor, source }) => {
                assert_eq!(actor, "broken");
                assert_eq!(source.to_string(), "sensor unplugged");
            }
            other => panic!("expected a failure, got {other:?}"),
        }
    }
}
