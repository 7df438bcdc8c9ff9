//! Monotonic time and the telemetry sink GC cycles post samples to.
//!
//! Object-safe by design: both traits are stored as `Arc<dyn ...>` inside a
//! [`crate::vm::GcBinding`] rather than as associated types, since neither
//! sits on a hot path and a binding may reasonably want to share one clock
//! or sink across several collectors.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// A source of monotonically nondecreasing time. Collector code only ever
/// reads elapsed durations from it, never wall-clock/calendar time.
pub trait Clock: Send + Sync + 'static {
    fn now_nanos(&self) -> u64;

    fn now_micros(&self) -> u64 {
        self.now_nanos() / 1_000
    }
}

/// An append-only sink for named integer samples (pause times, object
/// counts, epoch numbers). The collector never reads back what it posts;
/// this is strictly an outbound telemetry channel.
pub trait MetricSink: Send + Sync + 'static {
    fn post(&self, name: &'static str, value: i64);
}

/// A [`Clock`] backed by `std::time::Instant`, pinned to an arbitrary but
/// fixed epoch (the instant of construction) so `now_nanos` never panics on
/// platforms where `Instant` can't be compared to `UNIX_EPOCH`.
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock { start: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_nanos(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }
}

/// A [`Clock`] a test drives by hand: `now_nanos` returns whatever was last
/// stored with [`ManualClock::set`], never advancing on its own.
#[derive(Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    pub fn new(start_nanos: u64) -> Self {
        ManualClock { nanos: AtomicU64::new(start_nanos) }
    }

    pub fn set(&self, nanos: u64) {
        self.nanos.store(nanos, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_nanos: u64) {
        self.nanos.fetch_add(delta_nanos, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_nanos(&self) -> u64 {
        self.nanos.load(Ordering::SeqCst)
    }
}

/// A [`MetricSink`] that discards every sample. The default for bindings
/// that have nowhere to route telemetry yet.
#[derive(Default)]
pub struct NullSink;

impl MetricSink for NullSink {
    fn post(&self, _name: &'static str, _value: i64) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_only_moves_when_told() {
        let clock = ManualClock::new(10);
        assert_eq!(clock.now_nanos(), 10);
        clock.advance(5);
        assert_eq!(clock.now_nanos(), 15);
        clock.set(100);
        assert_eq!(clock.now_nanos(), 100);
    }

    #[test]
    fn null_sink_accepts_anything() {
        let sink = NullSink;
        sink.post("gc.epoch", 42);
    }
}
