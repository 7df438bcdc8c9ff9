//! Property-based tests: random sequences of schedule/allocate/drop-root
//! operations must never violate epoch monotonicity, sweep completeness,
//! or mark reset.
//!
//! Run with `cargo test --features mock`.

use proptest::prelude::*;

use epochgc::scheduler::SchedulerKind;
use epochgc::testing::MockBinding;
use epochgc::{Collector, CollectorOptions};

#[derive(Clone, Debug)]
enum Op {
    Allocate,
    DropRoot(usize),
    Gc,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Allocate),
        2 => (0usize..8).prop_map(Op::DropRoot),
        2 => Just(Op::Gc),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn epoch_and_sweep_invariants_hold_under_random_sequences(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let collector = Collector::new(MockBinding::new(SchedulerKind::Disabled), CollectorOptions::new());
        let binding = collector.binding();

        let mut roots: Vec<epochgc::ObjectRef> = Vec::new();
        let mut last_snapshot = collector.epoch_snapshot();

        for op in ops {
            match op {
                Op::Allocate => {
                    let obj = binding.heap_ref().alloc(vec![], false);
                    roots.push(obj);
                    binding.set_roots(roots.clone());
                }
                Op::DropRoot(idx) => {
                    if !roots.is_empty() {
                        roots.remove(idx % roots.len());
                        binding.set_roots(roots.clone());
                    }
                }
                Op::Gc => {
                    collector.schedule_and_wait_full_gc();

                    // I1: epochs only move forward.
                    let snapshot = collector.epoch_snapshot();
                    prop_assert!(snapshot.finalized <= snapshot.finished);
                    prop_assert!(snapshot.finished <= snapshot.started);
                    prop_assert!(snapshot.started <= snapshot.scheduled);
                    prop_assert!(snapshot.finished >= last_snapshot.finished);
                    last_snapshot = snapshot;

                    // I3: every retained root is still present, nothing else
                    // survives (no finalizers in play here, so "destroyed or
                    // queued" collapses to "destroyed").
                    for root in &roots {
                        prop_assert!(binding.heap_ref().contains(*root));
                    }
                    prop_assert_eq!(binding.heap_ref().len(), roots.len());

                    // I4: every surviving object is WHITE again.
                    for root in &roots {
                        use epochgc::vm::HeapObjects;
                        use epochgc::Color;
                        let header = HeapObjects::<MockBinding>::header_of(binding.heap_ref(), *root);
                        prop_assert_eq!(header.color(), Color::White);
                    }
                }
            }
        }

        collector.shutdown();
    }
}
