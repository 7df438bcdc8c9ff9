//! The safepoint fast path: a single process-wide flag every mutator
//! checks on every safepoint, kept on the hot path as cheap as a relaxed
//! load, backed by per-thread counters that decide when it's worth
//! consulting the scheduler policy at all.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::collector::Collector;
use crate::fatal;
use crate::scheduler::{self, ThreadCounters};
use crate::vm::{GcBinding, ThreadSuspension};

/// Set before the world is stopped and cleared after it's resumed. Every
/// mutator safepoint does one relaxed load of this flag; anything more
/// would defeat the point of a fast path.
pub(crate) static NEED_SAFEPOINT_SLOWPATH: AtomicBool = AtomicBool::new(false);

pub(crate) fn request_slowpath() {
    if NEED_SAFEPOINT_SLOWPATH.swap(true, Ordering::SeqCst) {
        fatal!("safepoint slow path requested while already requested");
    }
}

pub(crate) fn clear_slowpath() {
    if !NEED_SAFEPOINT_SLOWPATH.swap(false, Ordering::SeqCst) {
        fatal!("safepoint slow path cleared while not requested");
    }
}

/// Per-mutator-thread state. A binding constructs one of these per
/// registered thread and routes its safepoint entry points here.
pub struct ThreadData<B: GcBinding> {
    collector: Arc<Collector<B>>,
    counters: ThreadCounters,
}

impl<B: GcBinding> ThreadData<B> {
    pub fn new(collector: Arc<Collector<B>>) -> Self {
        let kind = collector.scheduler_kind();
        let counters = ThreadCounters::new(kind, collector.scheduler_config());
        ThreadData { collector, counters }
    }

    /// Safepoint at a function prologue.
    #[inline(always)]
    pub fn safepoint_function_prologue(&mut self) {
        self.safepoint_regular(scheduler::FUNCTION_PROLOGUE_WEIGHT);
    }

    /// Safepoint at a loop back-edge.
    #[inline(always)]
    pub fn safepoint_loop_body(&mut self) {
        self.safepoint_regular(scheduler::LOOP_BODY_WEIGHT);
    }

    /// Safepoint while unwinding for an exception. Never counted toward
    /// the regular-safepoint threshold, but still checks the fast-path
    /// flag: a thread unwinding through a suspension request still must
    /// stop.
    #[inline(always)]
    pub fn safepoint_exception_unwind(&mut self) {
        self.check_slowpath();
    }

    /// Safepoint after an allocation of `size` bytes.
    #[inline(always)]
    pub fn safepoint_allocation(&mut self, size: usize) {
        if self.counters.on_allocation(size) {
            self.on_threshold_crossed();
        }
        self.check_slowpath();
    }

    #[inline(always)]
    fn safepoint_regular(&mut self, weight: usize) {
        if self.counters.on_regular(weight) {
            self.on_threshold_crossed();
        }
        self.check_slowpath();
    }

    #[cold]
    fn on_threshold_crossed(&mut self) {
        self.collector.policy().on_safepoint(self.counters.allocated_bytes());
        self.counters.reset(self.collector.scheduler_config());
    }

    #[inline(always)]
    fn check_slowpath(&self) {
        if NEED_SAFEPOINT_SLOWPATH.load(Ordering::Relaxed) {
            self.slowpath();
        }
    }

    #[cold]
    fn slowpath(&self) {
        self.collector.binding().suspension().suspend_if_requested();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn slowpath_flag_toggles_and_detects_double_set() {
        assert!(!NEED_SAFEPOINT_SLOWPATH.load(Ordering::SeqCst));
        request_slowpath();
        assert!(NEED_SAFEPOINT_SLOWPATH.load(Ordering::SeqCst));
        clear_slowpath();
        assert!(!NEED_SAFEPOINT_SLOWPATH.load(Ordering::SeqCst));
    }
}
