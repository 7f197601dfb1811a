use std::{
    collections::BTreeSet,
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
};

use crate::{ActorError, ChannelKey};

/// Shared bookkeeping of live and blocked processes.
///
/// Lock order: a buffer mutex may be held while taking the monitor mutex, never the reverse.
#[derive(Debug, Default)]
pub(crate) struct MonitorState {
    pub(crate) active: usize,
    pub(crate) read_blocked: BTreeSet<ChannelKey>,
    pub(crate) write_blocked: BTreeSet<ChannelKey>,
    pub(crate) failures: Vec<(String, ActorError)>,
}

impl MonitorState {
    pub(crate) fn blocked(&self) -> usize {
        self.read_blocked.len() + self.write_blocked.len()
    }

    /// Every live process is blocked on a channel.
    pub(crate) fn is_deadlocked(&self) -> bool {
        self.active > 0 && self.blocked() >= self.active
    }

    /// Blocked channels in key order, readers first.
    pub(crate) fn blocked_channels(&self) -> Vec<ChannelKey> {
        let mut keys: Vec<ChannelKey> = self
            .read_blocked
            .iter()
            .chain(self.write_blocked.iter())
            .copied()
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }
}

#[derive(Debug, Default)]
pub(crate) struct Monitor {
    state: Mutex<MonitorState>,
    changed: Condvar,
}

impl Monitor {
    pub(crate) fn lock(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for a change that may concern the director.
    pub(crate) fn wait<'a>(&self, guard: MutexGuard<'a, MonitorState>) -> MutexGuard<'a, MonitorState> {
        self.changed
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn block_read(&self, key: ChannelKey) {
        if self.lock().read_blocked.insert(key) {
            self.changed.notify_all();
        }
    }

    pub(crate) fn block_write(&self, key: ChannelKey) {
        if self.lock().write_blocked.insert(key) {
            self.changed.notify_all();
        }
    }

    pub(crate) fn unblock_read(&self, key: ChannelKey) {
        self.lock().read_blocked.remove(&key);
    }

    pub(crate) fn unblock_write(&self, key: ChannelKey) {
        self.lock().write_blocked.remove(&key);
    }

    pub(crate) fn set_active(&self, active: usize) {
        self.lock().active = active;
    }

    pub(crate) fn process_finished(&self) {
        let mut state = self.lock();
        state.active = state.active.saturating_sub(1);
        drop(state);
        self.changed.notify_all();
    }

    pub(crate) fn fail(&self, process: String, err: ActorError) {
        self.lock().failures.push((process, err));
        self.changed.notify_all();
    }

    /// Forget blocked marks and failures left over from a previous run.
    pub(crate) fn reset(&self) {
        let mut state = self.lock();
        state.read_blocked.clear();
        state.write_blocked.clear();
        state.failures.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadlock_condition() {
        let monitor = Monitor::default();
        monitor.set_active(2);
        monitor.block_read(ChannelKey::from(0));
        assert!(!monitor.lock().is_deadlocked());

        monitor.block_write(ChannelKey::from(1));
        monitor.block_write(ChannelKey::from(1));
        {
            let state = monitor.lock();
            assert_eq!(state.blocked(), 2);
            assert!(state.is_deadlocked());
            assert_eq!(
                state.blocked_channels(),
                vec![ChannelKey::from(0), ChannelKey::from(1)]
            );
        }

        monitor.unblock_write(ChannelKey::from(1));
        assert!(!monitor.lock().is_deadlocked());

        monitor.process_finished();
        monitor.process_finished();
        assert!(!monitor.lock().is_deadlocked(), "no live process");
    }
}
