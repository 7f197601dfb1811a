//! A shared flag for signalling termination to a running director and its threads.
//!
//! The [`Trigger`] is owned by whoever may stop the run; any number of [`Flag`]s observe it.
//! Dropping the trigger raises the flag.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

#[derive(Debug)]
pub struct Trigger(Arc<AtomicBool>);

#[derive(Clone, Debug)]
pub struct Flag(Arc<AtomicBool>);

#[inline]
pub fn channel() -> (Trigger, Flag) {
    let arc1 = Arc::new(AtomicBool::new(false));
    let arc2 = arc1.clone();
    (Trigger(arc1), Flag(arc2))
}

impl Trigger {
    #[inline]
    pub fn terminate(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[inline]
    pub fn flag(&self) -> Flag {
        Flag(self.0.clone())
    }

    #[inline]
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Drop for Trigger {
    fn drop(&mut self) {
        self.terminate();
    }
}

impl Flag {
    #[inline]
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Raise the flag from an observer, e.g. a stop handle held by another thread.
    #[inline]
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}
