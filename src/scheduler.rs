//! The scheduler policy: the closed set of strategies deciding when
//! a GC cycle gets requested, grounded on `GCScheduler`/`GCSchedulerData`
//! from the runtime this protocol is modeled on.
//!
//! Every policy is handed a `schedule_gc` callback at construction time
//! rather than a reference to the collector, which is what breaks the
//! otherwise-cyclic dependency between "the collector owns a policy" and
//! "the policy needs to ask the collector to run a cycle".

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use atomic::Atomic;

use crate::clock::Clock;
use crate::timer::RepeatedTimer;

/// Per-thread safepoint weight for a function prologue.
pub const FUNCTION_PROLOGUE_WEIGHT: usize = 1;
/// Per-thread safepoint weight for a loop body back-edge.
pub const LOOP_BODY_WEIGHT: usize = 1;

/// Which policy a binding wants. Chosen once at
/// [`crate::collector::Collector::new`] via
/// [`crate::vm::GcBinding::scheduler_kind`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SchedulerKind {
    /// Never request a GC on its own; only explicit `perform_full_gc` calls
    /// run a cycle.
    Disabled,
    /// A background timer checks heap growth on a fixed interval; mutator
    /// safepoints never drive scheduling directly.
    WithTimer,
    /// No timer thread; heap growth is checked only from mutator
    /// safepoints crossing their per-thread allocation threshold.
    OnSafepoints,
    /// Every safepoint unconditionally requests a cycle — stress-test
    /// configuration, not meant for production use.
    Aggressive,
}

/// Tunable knobs shared by every policy. All-atomic so a binding can adjust
/// them concurrently with GC cycles in flight.
pub struct GcSchedulerConfig {
    /// Weighted safepoint count a mutator accumulates before the
    /// `OnSafepoints`/`Aggressive` policies re-check heap growth.
    pub threshold: AtomicUsize,
    /// Bytes a mutator allocates before any policy re-checks heap growth.
    pub thread_allocation_threshold_bytes: AtomicUsize,
    /// Whether [`GcSchedulerConfig::tune_target_heap_bytes`] is allowed to
    /// move `target_heap_bytes`.
    pub auto_tune: AtomicBool,
    /// How often the `WithTimer` policy's background timer fires, in
    /// microseconds.
    pub regular_gc_interval_us: AtomicU64,
    /// The heap size (bytes) a cycle is requested at.
    pub target_heap_bytes: AtomicUsize,
    /// Fraction of `target_heap_bytes` the last cycle's alive set should
    /// occupy; used by the auto-tuner.
    pub target_heap_utilization: Atomic<f64>,
    pub min_heap_bytes: AtomicUsize,
    pub max_heap_bytes: AtomicUsize,
}

impl GcSchedulerConfig {
    pub fn new() -> Self {
        GcSchedulerConfig {
            threshold: AtomicUsize::new(100_000),
            thread_allocation_threshold_bytes: AtomicUsize::new(10 * 1024),
            auto_tune: AtomicBool::new(true),
            regular_gc_interval_us: AtomicU64::new(10_000_000),
            target_heap_bytes: AtomicUsize::new(10 * 1024 * 1024),
            target_heap_utilization: Atomic::new(0.5),
            min_heap_bytes: AtomicUsize::new(1024 * 1024),
            max_heap_bytes: AtomicUsize::new(usize::MAX),
        }
    }

    /// `target_heap_bytes := clamp(alive_bytes / target_heap_utilization, [min, max])`.
    /// No-op unless `auto_tune` is set.
    pub fn tune_target_heap_bytes(&self, alive_bytes: usize) {
        if !self.auto_tune.load(Ordering::Relaxed) {
            return;
        }
        let utilization = self.target_heap_utilization.load(Ordering::Relaxed);
        let raw = (alive_bytes as f64 / utilization).max(0.0) as usize;
        let min = self.min_heap_bytes.load(Ordering::Relaxed);
        let max = self.max_heap_bytes.load(Ordering::Relaxed);
        self.target_heap_bytes.store(raw.clamp(min, max), Ordering::Relaxed);
    }
}

impl Default for GcSchedulerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-mutator-thread accumulators feeding the `OnSafepoints`/`Aggressive`
/// policies. Lives in [`crate::safepoint::ThreadData`]; never shared
/// across threads.
pub struct ThreadCounters {
    kind: SchedulerKind,
    allocated_bytes: usize,
    allocated_bytes_threshold: usize,
    safepoints: usize,
    safepoints_threshold: usize,
}

impl ThreadCounters {
    pub fn new(kind: SchedulerKind, config: &GcSchedulerConfig) -> Self {
        let mut counters = ThreadCounters {
            kind,
            allocated_bytes: 0,
            allocated_bytes_threshold: 0,
            safepoints: 0,
            safepoints_threshold: 0,
        };
        counters.reset(config);
        counters
    }

    pub fn allocated_bytes(&self) -> usize {
        self.allocated_bytes
    }

    /// A regular (non-allocation) safepoint. Only `OnSafepoints` and
    /// `Aggressive` count these; other policies return `false`
    /// unconditionally, matching the upstream scheduler's early return.
    pub fn on_regular(&mut self, weight: usize) -> bool {
        match self.kind {
            SchedulerKind::OnSafepoints | SchedulerKind::Aggressive => {
                self.safepoints += weight;
                self.safepoints >= self.safepoints_threshold
            }
            SchedulerKind::Disabled | SchedulerKind::WithTimer => false,
        }
    }

    /// An allocation safepoint. Every policy counts these.
    pub fn on_allocation(&mut self, size: usize) -> bool {
        self.allocated_bytes += size;
        self.allocated_bytes >= self.allocated_bytes_threshold
    }

    pub fn reset(&mut self, config: &GcSchedulerConfig) {
        self.allocated_bytes = 0;
        self.safepoints = 0;
        self.allocated_bytes_threshold = config.thread_allocation_threshold_bytes.load(Ordering::Relaxed);
        self.safepoints_threshold = config.threshold.load(Ordering::Relaxed);
    }
}

/// The hooks the safepoint fast path and the GC thread drive a policy
/// through.
pub trait SchedulerPolicy: Send + Sync {
    /// Called when a mutator thread's [`ThreadCounters`] cross threshold.
    fn on_safepoint(&self, allocated_bytes: usize);
    /// Called by the GC thread at the start of a cycle.
    fn on_perform_full_gc(&self);
    /// Called by the GC thread once a cycle's alive set is known.
    fn update_alive_set_bytes(&self, bytes: usize);
}

/// `Disabled`: never requests anything on its own.
pub struct DisabledPolicy;

impl SchedulerPolicy for DisabledPolicy {
    fn on_safepoint(&self, _allocated_bytes: usize) {}
    fn on_perform_full_gc(&self) {}
    fn update_alive_set_bytes(&self, _bytes: usize) {}
}

struct TimerDrivenState {
    config: Arc<GcSchedulerConfig>,
    allocated_bytes: AtomicUsize,
    last_alive_set_bytes: AtomicUsize,
    gc_requested: AtomicBool,
    schedule_gc: Box<dyn Fn() + Send + Sync>,
}

impl TimerDrivenState {
    fn check_and_schedule(&self) {
        let projected = self.allocated_bytes.load(Ordering::Relaxed) + self.last_alive_set_bytes.load(Ordering::Relaxed);
        if projected < self.config.target_heap_bytes.load(Ordering::Relaxed) {
            return;
        }
        if self.gc_requested.compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed).is_ok() {
            (self.schedule_gc)();
        }
    }
}

/// Backs both `WithTimer` and `OnSafepoints`: the only difference is
/// whether a [`RepeatedTimer`] is running alongside safepoint checks.
pub struct TimerDrivenPolicy {
    state: Arc<TimerDrivenState>,
    _timer: Option<RepeatedTimer>,
}

impl TimerDrivenPolicy {
    pub fn new(
        config: Arc<GcSchedulerConfig>,
        clock: Arc<dyn Clock>,
        with_timer: bool,
        schedule_gc: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        let state = Arc::new(TimerDrivenState {
            config: config.clone(),
            allocated_bytes: AtomicUsize::new(0),
            last_alive_set_bytes: AtomicUsize::new(0),
            gc_requested: AtomicBool::new(false),
            schedule_gc: Box::new(schedule_gc),
        });

        let timer = if with_timer {
            let state_for_timer = state.clone();
            let config_for_timer = config;
            Some(RepeatedTimer::new(
                clock,
                config_for_timer.regular_gc_interval_us.load(Ordering::Relaxed) * 1_000,
                move || {
                    state_for_timer.check_and_schedule();
                    config_for_timer.regular_gc_interval_us.load(Ordering::Relaxed) * 1_000
                },
            ))
        } else {
            None
        };

        TimerDrivenPolicy { state, _timer: timer }
    }
}

impl SchedulerPolicy for TimerDrivenPolicy {
    fn on_safepoint(&self, allocated_bytes: usize) {
        self.state.allocated_bytes.fetch_add(allocated_bytes, Ordering::Relaxed);
        self.state.check_and_schedule();
    }

    fn on_perform_full_gc(&self) {
        self.state.allocated_bytes.store(0, Ordering::Relaxed);
        self.state.gc_requested.store(false, Ordering::Relaxed);
    }

    fn update_alive_set_bytes(&self, bytes: usize) {
        self.state.last_alive_set_bytes.store(bytes, Ordering::Relaxed);
        self.state.config.tune_target_heap_bytes(bytes);
    }
}

/// `Aggressive`: schedules unconditionally on every safepoint. Also drives
/// `threshold`/`thread_allocation_threshold_bytes` down so regular
/// safepoints fire often, matching the upstream scheduler's aggressive
/// defaults.
pub struct AggressivePolicy {
    schedule_gc: Box<dyn Fn() + Send + Sync>,
}

impl AggressivePolicy {
    pub fn new(config: &GcSchedulerConfig, schedule_gc: impl Fn() + Send + Sync + 'static) -> Self {
        config.threshold.store(1, Ordering::Relaxed);
        config.thread_allocation_threshold_bytes.store(1, Ordering::Relaxed);
        AggressivePolicy { schedule_gc: Box::new(schedule_gc) }
    }
}

impl SchedulerPolicy for AggressivePolicy {
    fn on_safepoint(&self, _allocated_bytes: usize) {
        (self.schedule_gc)();
    }
    fn on_perform_full_gc(&self) {}
    fn update_alive_set_bytes(&self, _bytes: usize) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize as StdAtomicUsize;

    #[test]
    fn tune_target_heap_bytes_clamps() {
        let config = GcSchedulerConfig::new();
        config.min_heap_bytes.store(1000, Ordering::Relaxed);
        config.max_heap_bytes.store(2000, Ordering::Relaxed);
        config.target_heap_utilization.store(0.5, Ordering::Relaxed);

        config.tune_target_heap_bytes(100); // 200 < min
        assert_eq!(config.target_heap_bytes.load(Ordering::Relaxed), 1000);

        config.tune_target_heap_bytes(10_000); // 20000 > max
        assert_eq!(config.target_heap_bytes.load(Ordering::Relaxed), 2000);

        config.tune_target_heap_bytes(1500); // 3000 -> clamped to max
        assert_eq!(config.target_heap_bytes.load(Ordering::Relaxed), 2000);
    }

    #[test]
    fn tune_target_heap_bytes_noop_without_auto_tune() {
        let config = GcSchedulerConfig::new();
        config.auto_tune.store(false, Ordering::Relaxed);
        config.target_heap_bytes.store(42, Ordering::Relaxed);
        config.tune_target_heap_bytes(999_999);
        assert_eq!(config.target_heap_bytes.load(Ordering::Relaxed), 42);
    }

    #[test]
    fn on_regular_only_counts_for_safepoint_driven_kinds() {
        let config = GcSchedulerConfig::new();
        config.threshold.store(2, Ordering::Relaxed);

        let mut disabled = ThreadCounters::new(SchedulerKind::Disabled, &config);
        assert!(!disabled.on_regular(10));

        let mut on_safepoints = ThreadCounters::new(SchedulerKind::OnSafepoints, &config);
        assert!(!on_safepoints.on_regular(1));
        assert!(on_safepoints.on_regular(1));
    }

    #[test]
    fn on_allocation_counts_regardless_of_kind() {
        let config = GcSchedulerConfig::new();
        config.thread_allocation_threshold_bytes.store(100, Ordering::Relaxed);
        let mut counters = ThreadCounters::new(SchedulerKind::WithTimer, &config);
        assert!(!counters.on_allocation(50));
        assert!(counters.on_allocation(50));
        assert_eq!(counters.allocated_bytes(), 100);
    }

    #[test]
    fn aggressive_policy_schedules_on_every_safepoint() {
        let config = GcSchedulerConfig::new();
        let calls = Arc::new(StdAtomicUsize::new(0));
        let calls_for_closure = calls.clone();
        let policy = AggressivePolicy::new(&config, move || {
            calls_for_closure.fetch_add(1, Ordering::SeqCst);
        });
        policy.on_safepoint(0);
        policy.on_safepoint(0);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
