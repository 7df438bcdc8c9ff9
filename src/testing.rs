//! An in-process [`GcBinding`], grounded on the `MockVM`/`dummyvm` pattern
//! used to unit- and integration-test `mmtk-core` without a real language
//! runtime attached. Gated behind `cfg(test)` (for this crate's own tests)
//! and the `mock` feature (for a binding author sanity-checking their own
//! trait implementation against a known-good reference).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, ThreadId};

use crate::clock::{Clock, ManualClock, MetricSink, NullSink};
use crate::object::{ObjectHeader, ObjectRef};
use crate::scheduler::SchedulerKind;
use crate::vm::{ExtraObjectEntry, ExtraObjectIter, ExtraObjectTable, GcBinding, HeapIter, HeapObjects, ThreadSuspension};

struct MockObject {
    header: ObjectHeader,
    referents: Vec<ObjectRef>,
    needs_finalization: bool,
}

/// A heap of objects identified by sequentially-assigned addresses, with
/// caller-supplied outgoing edges and finalizer flags.
pub struct MockHeap {
    objects: Mutex<HashMap<ObjectRef, Box<MockObject>>>,
    next_id: AtomicUsize,
    /// Nominal per-object size used for `size_bytes_unsafe`.
    pub object_size_bytes: usize,
}

impl MockHeap {
    pub fn new() -> Self {
        MockHeap { objects: Mutex::new(HashMap::new()), next_id: AtomicUsize::new(1), object_size_bytes: 64 }
    }

    /// Allocates a new object with the given outgoing edges, returning a
    /// handle a test can put in a root set or another object's edge list.
    pub fn alloc(&self, referents: Vec<ObjectRef>, needs_finalization: bool) -> ObjectRef {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let obj = ObjectRef::from_raw(id).expect("MockHeap ids start at 1");
        self.objects
            .lock()
            .unwrap()
            .insert(obj, Box::new(MockObject { header: ObjectHeader::new(), referents, needs_finalization }));
        obj
    }

    pub fn contains(&self, obj: ObjectRef) -> bool {
        self.objects.lock().unwrap().contains_key(&obj)
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MockHeap {
    fn default() -> Self {
        Self::new()
    }
}

pub struct MockHeapIter<'a> {
    heap: &'a MockHeap,
    keys: Vec<ObjectRef>,
    pos: usize,
}

impl<'a> HeapIter for MockHeapIter<'a> {
    fn next(&mut self) -> Option<ObjectRef> {
        let item = self.keys.get(self.pos).copied();
        if item.is_some() {
            self.pos += 1;
        }
        item
    }

    fn remove_current(&mut self) {
        let key = self.keys[self.pos - 1];
        self.heap.objects.lock().unwrap().remove(&key);
    }
}

impl<B: GcBinding> HeapObjects<B> for MockHeap {
    type IterGuard<'a>
        = MockHeapIter<'a>
    where
        Self: 'a;

    fn lock_for_iter(&self) -> Self::IterGuard<'_> {
        let keys = self.objects.lock().unwrap().keys().copied().collect();
        MockHeapIter { heap: self, keys, pos: 0 }
    }

    fn size_unsafe(&self) -> usize {
        self.len()
    }

    fn size_bytes_unsafe(&self) -> usize {
        self.len() * self.object_size_bytes
    }

    fn header_of(&self, obj: ObjectRef) -> &ObjectHeader {
        let objects = self.objects.lock().unwrap();
        let mock_obj = objects.get(&obj).expect("header_of: unknown ObjectRef");
        let header_ptr: *const ObjectHeader = &mock_obj.header;
        // Safety: `mock_obj` is heap-allocated via `Box` and is not moved
        // or dropped while `obj` remains a key in `objects`; callers in
        // this crate never remove an object mid-mark.
        unsafe { &*header_ptr }
    }

    fn referents_of(&self, obj: ObjectRef) -> Vec<ObjectRef> {
        self.objects.lock().unwrap().get(&obj).map(|o| o.referents.clone()).unwrap_or_default()
    }

    fn needs_finalization(&self, obj: ObjectRef) -> bool {
        self.objects.lock().unwrap().get(&obj).map(|o| o.needs_finalization).unwrap_or(false)
    }
}

/// The extra-object-data side table: a flat list of optional base-object
/// links a test populates directly.
pub struct MockExtraObjects {
    entries: Mutex<Vec<Option<ObjectRef>>>,
}

impl MockExtraObjects {
    pub fn new() -> Self {
        MockExtraObjects { entries: Mutex::new(Vec::new()) }
    }

    pub fn register(&self, base_object: Option<ObjectRef>) {
        self.entries.lock().unwrap().push(base_object);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MockExtraObjects {
    fn default() -> Self {
        Self::new()
    }
}

pub struct MockExtraObjectIter<'a> {
    table: &'a MockExtraObjects,
    idx: usize,
}

impl<'a> ExtraObjectIter for MockExtraObjectIter<'a> {
    fn next(&mut self) -> Option<ExtraObjectEntry> {
        let entries = self.table.entries.lock().unwrap();
        let item = entries.get(self.idx).copied();
        item.map(|base_object| {
            self.idx += 1;
            ExtraObjectEntry { base_object }
        })
    }

    fn destroy_current(&mut self) {
        let mut entries = self.table.entries.lock().unwrap();
        entries.remove(self.idx - 1);
        self.idx -= 1;
    }
}

impl<B: GcBinding> ExtraObjectTable<B> for MockExtraObjects {
    type IterGuard<'a>
        = MockExtraObjectIter<'a>
    where
        Self: 'a;

    fn lock_for_iter(&self) -> Self::IterGuard<'_> {
        MockExtraObjectIter { table: self, idx: 0 }
    }

    fn size_unsafe(&self) -> usize {
        self.len()
    }
}

/// A suspension mechanism over real OS threads that park on a condvar,
/// standing in for the compiler-inserted safepoint poll a real mutator
/// would have.
pub struct MockSuspension {
    registered: Mutex<std::collections::HashSet<ThreadId>>,
    requested: AtomicBool,
    parked: Mutex<std::collections::HashSet<ThreadId>>,
    cv: Condvar,
}

impl MockSuspension {
    pub fn new() -> Self {
        MockSuspension {
            registered: Mutex::new(std::collections::HashSet::new()),
            requested: AtomicBool::new(false),
            parked: Mutex::new(std::collections::HashSet::new()),
            cv: Condvar::new(),
        }
    }

    pub fn register_current_thread(&self) {
        self.registered.lock().unwrap().insert(thread::current().id());
    }

    pub fn unregister_current_thread(&self) {
        let id = thread::current().id();
        self.registered.lock().unwrap().remove(&id);
        self.parked.lock().unwrap().remove(&id);
        self.cv.notify_all();
    }
}

impl Default for MockSuspension {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadSuspension for MockSuspension {
    fn request_suspension(&self) -> bool {
        !self.requested.swap(true, Ordering::SeqCst)
    }

    fn wait_for_suspension(&self) {
        let registered = self.registered.lock().unwrap().clone();
        let parked = self.parked.lock().unwrap();
        let _parked = self.cv.wait_while(parked, |p| !registered.is_subset(p)).unwrap();
    }

    fn resume_threads(&self) {
        self.requested.store(false, Ordering::SeqCst);
        self.parked.lock().unwrap().clear();
        self.cv.notify_all();
    }

    fn is_current_thread_registered(&self) -> bool {
        self.registered.lock().unwrap().contains(&thread::current().id())
    }

    fn suspend_if_requested(&self) {
        if !self.requested.load(Ordering::SeqCst) {
            return;
        }
        let mut parked = self.parked.lock().unwrap();
        parked.insert(thread::current().id());
        self.cv.notify_all();
        let _parked = self.cv.wait_while(parked, |_| self.requested.load(Ordering::SeqCst)).unwrap();
    }

    fn with_native_state<R>(&self, f: impl FnOnce() -> R) -> R {
        let id = thread::current().id();
        {
            self.parked.lock().unwrap().insert(id);
            self.cv.notify_all();
        }
        let result = f();
        {
            self.parked.lock().unwrap().remove(&id);
        }
        result
    }

    fn with_runnable_state<R>(&self, f: impl FnOnce() -> R) -> R {
        f()
    }
}

/// An in-process binding exercising every collaborator a real runtime
/// would implement. Roots are whatever the test last passed to
/// [`MockBinding::set_roots`]; finalized objects are recorded for
/// inspection via [`MockBinding::finalized_objects`].
pub struct MockBinding {
    heap: MockHeap,
    extra_objects: MockExtraObjects,
    suspension: MockSuspension,
    clock: Arc<dyn Clock>,
    metrics: Arc<dyn MetricSink>,
    roots: Mutex<Vec<ObjectRef>>,
    finalized_log: Mutex<Vec<ObjectRef>>,
    scheduler_kind: SchedulerKind,
}

impl MockBinding {
    pub fn new(scheduler_kind: SchedulerKind) -> Self {
        MockBinding {
            heap: MockHeap::new(),
            extra_objects: MockExtraObjects::new(),
            suspension: MockSuspension::new(),
            clock: Arc::new(ManualClock::new(0)),
            metrics: Arc::new(NullSink),
            roots: Mutex::new(Vec::new()),
            finalized_log: Mutex::new(Vec::new()),
            scheduler_kind,
        }
    }

    pub fn heap_ref(&self) -> &MockHeap {
        &self.heap
    }

    pub fn extra_objects_ref(&self) -> &MockExtraObjects {
        &self.extra_objects
    }

    pub fn set_roots(&self, roots: Vec<ObjectRef>) {
        *self.roots.lock().unwrap() = roots;
    }

    pub fn finalized_objects(&self) -> Vec<ObjectRef> {
        self.finalized_log.lock().unwrap().clone()
    }

    /// Swaps in a caller-supplied clock, e.g. a shared [`ManualClock`] a
    /// timer-driven test wants to advance by hand.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl Default for MockBinding {
    fn default() -> Self {
        Self::new(SchedulerKind::Disabled)
    }
}

impl GcBinding for MockBinding {
    type Heap = MockHeap;
    type ExtraObjects = MockExtraObjects;
    type Suspension = MockSuspension;

    fn heap(&self) -> &Self::Heap {
        &self.heap
    }

    fn extra_objects(&self) -> &Self::ExtraObjects {
        &self.extra_objects
    }

    fn suspension(&self) -> &Self::Suspension {
        &self.suspension
    }

    fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn metrics(&self) -> &Arc<dyn MetricSink> {
        &self.metrics
    }

    fn collect_root_set(&self) -> Vec<ObjectRef> {
        self.roots.lock().unwrap().clone()
    }

    fn finalize(&self, queue: Vec<ObjectRef>) {
        self.finalized_log.lock().unwrap().extend(queue);
    }

    fn scheduler_kind(&self) -> SchedulerKind {
        self.scheduler_kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_heap_alloc_and_remove() {
        let heap = MockHeap::new();
        let a = heap.alloc(vec![], false);
        let b = heap.alloc(vec![a], false);
        assert!(heap.contains(a));
        assert!(heap.contains(b));
        assert_eq!(heap.len(), 2);
    }

    #[test]
    fn mock_suspension_round_trip() {
        let suspension = MockSuspension::new();
        suspension.register_current_thread();
        assert!(suspension.is_current_thread_registered());
        assert!(suspension.request_suspension());
        assert!(!suspension.request_suspension());
        suspension.resume_threads();
        assert!(suspension.request_suspension());
    }
}
