//! End-to-end scenarios run against [`epochgc::testing::MockBinding`].
//!
//! Run with `cargo test --features mock` — the `testing` module is gated
//! behind that feature for integration tests, the same way `mmtk-core`
//! gates its own mock-VM test support.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use epochgc::clock::ManualClock;
use epochgc::scheduler::SchedulerKind;
use epochgc::testing::MockBinding;
use epochgc::{Collector, CollectorOptions, ThreadData};

fn collector_with(kind: SchedulerKind) -> Arc<Collector<MockBinding>> {
    Collector::new(MockBinding::new(kind), CollectorOptions::new())
}

#[test]
fn single_threaded_collect_unreachable() {
    let collector = collector_with(SchedulerKind::Disabled);
    let binding = collector.binding();

    let reachable_leaf = binding.heap_ref().alloc(vec![], false);
    let root = binding.heap_ref().alloc(vec![reachable_leaf], false);
    let garbage = binding.heap_ref().alloc(vec![], false);
    binding.set_roots(vec![root]);

    collector.schedule_and_wait_full_gc();

    assert!(binding.heap_ref().contains(root));
    assert!(binding.heap_ref().contains(reachable_leaf));
    assert!(!binding.heap_ref().contains(garbage));

    collector.shutdown();
}

#[test]
fn concurrent_requests_coalesce_into_one_cycle() {
    let collector = collector_with(SchedulerKind::Disabled);
    let binding = collector.binding();
    let root = binding.heap_ref().alloc(vec![], false);
    binding.set_roots(vec![root]);

    let mut joins = Vec::new();
    for _ in 0..8 {
        let collector = collector.clone();
        joins.push(thread::spawn(move || {
            collector.schedule_and_wait_full_gc();
        }));
    }
    for j in joins {
        j.join().expect("collector thread panicked");
    }

    assert!(binding.heap_ref().contains(root));
    collector.shutdown();
}

#[test]
fn finalizers_run_and_object_is_reclaimed() {
    let collector = collector_with(SchedulerKind::Disabled);
    let binding = collector.binding();

    let finalizable = binding.heap_ref().alloc(vec![], true);
    binding.set_roots(vec![]);

    collector.schedule_and_wait_full_gc_with_finalizers();

    assert!(!binding.heap_ref().contains(finalizable));
    assert_eq!(binding.finalized_objects(), vec![finalizable]);

    collector.shutdown();
}

#[test]
fn auto_tune_moves_target_heap_with_alive_bytes() {
    let collector = collector_with(SchedulerKind::Disabled);
    let binding = collector.binding();
    collector.scheduler_config().min_heap_bytes.store(1, Ordering::Relaxed);
    collector.scheduler_config().max_heap_bytes.store(usize::MAX, Ordering::Relaxed);
    collector.scheduler_config().target_heap_utilization.store(0.5, Ordering::Relaxed);

    let mut roots = Vec::new();
    for _ in 0..10 {
        roots.push(binding.heap_ref().alloc(vec![], false));
    }
    binding.set_roots(roots);

    collector.schedule_and_wait_full_gc();

    let alive_bytes = binding.heap_ref().len() * binding.heap_ref().object_size_bytes;
    let expected = (alive_bytes as f64 / 0.5) as usize;
    assert_eq!(collector.scheduler_config().target_heap_bytes.load(Ordering::Relaxed), expected);

    collector.shutdown();
}

#[test]
fn aggressive_policy_schedules_a_cycle_on_every_safepoint() {
    let collector = collector_with(SchedulerKind::Aggressive);
    let binding = collector.binding();
    let root = binding.heap_ref().alloc(vec![], false);
    binding.set_roots(vec![root]);

    let before = collector.epoch_snapshot();
    let mut thread_data = ThreadData::new(collector.clone());
    thread_data.safepoint_function_prologue();

    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    loop {
        if collector.epoch_snapshot().scheduled > before.scheduled {
            break;
        }
        assert!(std::time::Instant::now() < deadline, "aggressive policy never scheduled a cycle");
        thread::sleep(Duration::from_millis(5));
    }

    collector.shutdown();
}

#[test]
fn timer_only_scheduler_progresses_without_any_safepoint() {
    let clock = Arc::new(ManualClock::new(0));
    let binding = MockBinding::new(SchedulerKind::WithTimer).with_clock(clock.clone());
    let config = epochgc::GcSchedulerConfig::new();
    config.regular_gc_interval_us.store(0, Ordering::Relaxed);
    config.target_heap_bytes.store(0, Ordering::Relaxed);
    let collector = Collector::new(binding, CollectorOptions::new().with_scheduler_config(config));
    let binding = collector.binding();

    let root = binding.heap_ref().alloc(vec![], false);
    binding.set_roots(vec![root]);

    let before = collector.epoch_snapshot();
    clock.advance(2);

    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    loop {
        if collector.epoch_snapshot().scheduled > before.scheduled {
            break;
        }
        assert!(std::time::Instant::now() < deadline, "timer never scheduled a cycle");
        thread::sleep(Duration::from_millis(5));
    }

    collector.shutdown();
}

#[test]
fn shutdown_while_idle_does_not_hang() {
    let collector = collector_with(SchedulerKind::Disabled);
    collector.shutdown();
    // A second call must be a harmless no-op.
    collector.shutdown();
}
