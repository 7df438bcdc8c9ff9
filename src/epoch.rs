//! The epoch coordinator: four monotonic counters under one mutex/condvar
//! pair, coalescing any number of concurrent GC requests into the next
//! available cycle.
//!
//! This is the chosen resolution of this crate's one open design question
//! (see `DESIGN.md`): rather than the five-state `GCState` state machine
//! the collector this protocol is modeled on used historically, every
//! waiter blocks on a `>=` comparison against one of four `i64` counters,
//! and `schedule()` is naturally idempotent under concurrent callers.

use std::sync::{Condvar, Mutex};

use crate::fatal;

pub type Epoch = i64;

/// Sentinel epoch meaning "the collector is shutting down"; `started`,
/// `finished`, and `finalized` are driven up to this value in turn as the
/// GC thread and finalizer thread wind down.
pub const SHUTDOWN_EPOCH: Epoch = i64::MAX;

struct Counters {
    scheduled: Epoch,
    started: Epoch,
    finished: Epoch,
    finalized: Epoch,
}

/// A snapshot of all four counters, useful for tests and diagnostics.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct EpochSnapshot {
    pub scheduled: Epoch,
    pub started: Epoch,
    pub finished: Epoch,
    pub finalized: Epoch,
}

pub struct EpochCoordinator {
    counters: Mutex<Counters>,
    cv: Condvar,
}

impl EpochCoordinator {
    pub fn new() -> Self {
        EpochCoordinator {
            counters: Mutex::new(Counters { scheduled: 0, started: 0, finished: 0, finalized: 0 }),
            cv: Condvar::new(),
        }
    }

    /// Requests a full GC cycle, coalescing with any cycle already
    /// scheduled-but-not-yet-started. Returns the epoch the caller's
    /// request will be satisfied by.
    pub fn schedule(&self) -> Epoch {
        let mut c = self.counters.lock().unwrap();
        if c.scheduled <= c.started {
            c.scheduled = c.started + 1;
        }
        let e = c.scheduled;
        drop(c);
        self.cv.notify_all();
        e
    }

    /// Drives every counter to [`SHUTDOWN_EPOCH`] and wakes every waiter.
    /// Idempotent.
    pub fn shutdown(&self) {
        let mut c = self.counters.lock().unwrap();
        c.scheduled = SHUTDOWN_EPOCH;
        drop(c);
        self.cv.notify_all();
    }

    pub fn start(&self, epoch: Epoch) {
        let mut c = self.counters.lock().unwrap();
        check_monotonic("started", c.started, epoch);
        c.started = epoch;
        drop(c);
        self.cv.notify_all();
    }

    pub fn finish(&self, epoch: Epoch) {
        let mut c = self.counters.lock().unwrap();
        check_monotonic("finished", c.finished, epoch);
        c.finished = epoch;
        drop(c);
        self.cv.notify_all();
    }

    pub fn finalized(&self, epoch: Epoch) {
        let mut c = self.counters.lock().unwrap();
        check_monotonic("finalized", c.finalized, epoch);
        c.finalized = epoch;
        drop(c);
        self.cv.notify_all();
    }

    /// Blocks the GC thread until a cycle has been requested. Returns
    /// [`SHUTDOWN_EPOCH`] when it's time to wind down.
    pub fn wait_scheduled(&self) -> Epoch {
        let c = self.counters.lock().unwrap();
        let c = self.cv.wait_while(c, |c| c.scheduled <= c.finished).unwrap();
        c.scheduled
    }

    /// Blocks the finalizer thread until a batch of finalizers is due.
    /// Returns [`SHUTDOWN_EPOCH`] when it's time to wind down.
    pub fn wait_finalizers_required(&self) -> Epoch {
        let c = self.counters.lock().unwrap();
        let c = self.cv.wait_while(c, |c| c.finished <= c.finalized).unwrap();
        c.finished
    }

    /// Blocks until the cycle `epoch` has swept every unreachable object
    /// (but possibly before its finalizers have run).
    pub fn wait_epoch_finished(&self, epoch: Epoch) {
        let c = self.counters.lock().unwrap();
        let _c = self.cv.wait_while(c, |c| c.finished < epoch).unwrap();
    }

    /// Blocks until the cycle `epoch` has both swept and finalized.
    pub fn wait_epoch_finalized(&self, epoch: Epoch) {
        let c = self.counters.lock().unwrap();
        let _c = self.cv.wait_while(c, |c| c.finalized < epoch).unwrap();
    }

    /// Snapshots `started` and blocks until that same cycle has finished;
    /// returns the epoch that finished. Used by callers (and the test-only
    /// finalizer-thread stop) that want "whatever is currently running" to
    /// drain rather than requesting a fresh cycle.
    pub fn wait_current_finished(&self) -> Epoch {
        let c = self.counters.lock().unwrap();
        let target = c.started;
        let c = self.cv.wait_while(c, |c| c.finished < target).unwrap();
        debug_assert!(c.finished >= target);
        target
    }

    pub fn snapshot(&self) -> EpochSnapshot {
        let c = self.counters.lock().unwrap();
        EpochSnapshot { scheduled: c.scheduled, started: c.started, finished: c.finished, finalized: c.finalized }
    }
}

impl Default for EpochCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

fn check_monotonic(field: &str, old: Epoch, new: Epoch) {
    if cfg!(debug_assertions) && new < old && old != SHUTDOWN_EPOCH {
        fatal!("epoch coordinator: `{}` regressed from {} to {}", field, old, new);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn schedule_coalesces_concurrent_requests() {
        let coord = EpochCoordinator::new();
        let e1 = coord.schedule();
        let e2 = coord.schedule();
        assert_eq!(e1, e2);
        coord.start(e1);
        coord.finish(e1);
        let e3 = coord.schedule();
        assert!(e3 > e1);
    }

    #[test]
    fn wait_epoch_finished_unblocks_after_finish() {
        let coord = Arc::new(EpochCoordinator::new());
        let e = coord.schedule();
        let waiter = {
            let coord = coord.clone();
            thread::spawn(move || coord.wait_epoch_finished(e))
        };
        thread::sleep(std::time::Duration::from_millis(20));
        coord.start(e);
        coord.finish(e);
        waiter.join().unwrap();
    }

    #[test]
    fn wait_scheduled_returns_shutdown_sentinel() {
        let coord = Arc::new(EpochCoordinator::new());
        let waiter = {
            let coord = coord.clone();
            thread::spawn(move || coord.wait_scheduled())
        };
        thread::sleep(std::time::Duration::from_millis(20));
        coord.shutdown();
        assert_eq!(waiter.join().unwrap(), SHUTDOWN_EPOCH);
    }

    #[test]
    fn wait_epoch_finalized_requires_both_sweep_and_finalize() {
        let coord = Arc::new(EpochCoordinator::new());
        let e = coord.schedule();
        coord.start(e);
        coord.finish(e);
        let waiter = {
            let coord = coord.clone();
            thread::spawn(move || coord.wait_epoch_finalized(e))
        };
        thread::sleep(std::time::Duration::from_millis(20));
        coord.finalized(e);
        waiter.join().unwrap();
    }
}
