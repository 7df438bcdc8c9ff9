//! The mark/sweep algorithm, expressed purely in terms of
//! closures rather than the heap traits directly: the core supplies
//! `try_mark`/`referents_of`/`try_reset_mark`/`needs_finalization` as
//! instantiated trait methods, and the traversal itself is a small, heap-
//! agnostic worklist walk any binding's object model can drive.

use crate::object::{Color, ObjectHeader, ObjectRef};
use crate::vm::{ExtraObjectIter, HeapIter};

/// Whether `header` is currently BLACK (reachable from the last mark).
pub fn is_marked(header: &ObjectHeader) -> bool {
    header.color() == Color::Black
}

/// Drains `gray_set`, atomically marking each object it can reach and
/// pushing that object's referents onto the worklist the first time it's
/// marked. `try_mark` and `referents_of` are the two methods
/// [`crate::vm::HeapObjects`] asks the binding for; this function is the
/// shared utility that drives them.
pub fn mark<M, R>(gray_set: Vec<ObjectRef>, mut try_mark: M, mut referents_of: R)
where
    M: FnMut(ObjectRef) -> bool,
    R: FnMut(ObjectRef) -> Vec<ObjectRef>,
{
    let mut worklist = gray_set;
    while let Some(obj) = worklist.pop() {
        if try_mark(obj) {
            worklist.extend(referents_of(obj));
        }
    }
}

/// Sweeps the extra-object-data side table: an entry survives iff its base
/// object is marked, or has no base object at all (already off-heap,
/// treated as implicitly marked).
pub fn sweep_extra_objects<I, M>(mut iter: I, mut is_marked_by_extra_object: M)
where
    I: ExtraObjectIter,
    M: FnMut(Option<ObjectRef>) -> bool,
{
    while let Some(entry) = iter.next() {
        if !is_marked_by_extra_object(entry.base_object) {
            iter.destroy_current();
        }
    }
}

/// Sweeps the object factory: every object still WHITE is garbage and gets
/// unlinked; every BLACK object is reset back to WHITE for the next cycle.
/// Garbage objects with a pending finalizer are collected into the
/// returned queue instead of being destroyed immediately.
pub fn sweep_objects<I, M, N>(mut iter: I, mut try_reset_mark: M, mut needs_finalization: N) -> Vec<ObjectRef>
where
    I: HeapIter,
    M: FnMut(ObjectRef) -> bool,
    N: FnMut(ObjectRef) -> bool,
{
    let mut finalizer_queue = Vec::new();
    while let Some(obj) = iter.next() {
        if try_reset_mark(obj) {
            continue;
        }
        if needs_finalization(obj) {
            finalizer_queue.push(obj);
        }
        iter.remove_current();
    }
    finalizer_queue
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn obj(n: usize) -> ObjectRef {
        ObjectRef::from_raw(n).unwrap()
    }

    struct FakeGraph {
        edges: HashMap<ObjectRef, Vec<ObjectRef>>,
        marked: HashMap<ObjectRef, bool>,
    }

    #[test]
    fn mark_reaches_transitive_closure_once_each() {
        // 1 -> 2 -> 3, 4 is unreachable.
        let mut graph = FakeGraph { edges: HashMap::new(), marked: HashMap::new() };
        graph.edges.insert(obj(1), vec![obj(2)]);
        graph.edges.insert(obj(2), vec![obj(3)]);
        graph.edges.insert(obj(3), vec![]);
        graph.edges.insert(obj(4), vec![]);
        for o in [obj(1), obj(2), obj(3), obj(4)] {
            graph.marked.insert(o, false);
        }

        let mut visits: HashMap<ObjectRef, usize> = HashMap::new();
        let edges = graph.edges.clone_for_test();
        let marked = std::cell::RefCell::new(graph.marked);
        mark(
            vec![obj(1)],
            |o| {
                *visits.entry(o).or_insert(0) += 1;
                let mut m = marked.borrow_mut();
                let was_marked = *m.get(&o).unwrap();
                m.insert(o, true);
                !was_marked
            },
            |o| edges.get(&o).cloned().unwrap_or_default(),
        );

        let marked = marked.into_inner();
        assert!(marked[&obj(1)]);
        assert!(marked[&obj(2)]);
        assert!(marked[&obj(3)]);
        assert!(!marked[&obj(4)]);
        assert_eq!(visits[&obj(1)], 1);
        assert_eq!(visits[&obj(2)], 1);
        assert_eq!(visits[&obj(3)], 1);
    }

    impl FakeGraph {
        fn clone_for_test(&self) -> HashMap<ObjectRef, Vec<ObjectRef>> {
            self.edges.clone()
        }
    }

    #[test]
    fn sweep_objects_collects_finalizable_garbage_and_keeps_marked() {
        struct VecIter {
            items: Vec<ObjectRef>,
            pos: usize,
            removed: Vec<ObjectRef>,
        }
        impl HeapIter for VecIter {
            fn next(&mut self) -> Option<ObjectRef> {
                let item = self.items.get(self.pos).copied();
                if item.is_some() {
                    self.pos += 1;
                }
                item
            }
            fn remove_current(&mut self) {
                self.removed.push(self.items[self.pos - 1]);
            }
        }

        let iter = VecIter { items: vec![obj(1), obj(2), obj(3)], pos: 0, removed: Vec::new() };
        let marked = [obj(2)];
        let finalizable = [obj(1)];

        let mut seen_for_reset = Vec::new();
        let fq = sweep_objects(
            iter,
            |o| {
                seen_for_reset.push(o);
                marked.contains(&o)
            },
            |o| finalizable.contains(&o),
        );

        assert_eq!(fq, vec![obj(1)]);
        assert_eq!(seen_for_reset, vec![obj(1), obj(2), obj(3)]);
    }
}
