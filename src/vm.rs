//! The binding surface: everything a managed-language runtime supplies so
//! this crate's collector can operate over its object graph without
//! knowing a single thing about that graph's layout.
//!
//! Modeled directly on `mmtk-core`'s `VMBinding`: one aggregate trait
//! bundling the external collaborators, each expressed as an associated
//! type (or, for the two that never sit on a hot path, a shared trait
//! object) rather than a hand-rolled vtable.

use std::sync::Arc;

use crate::clock::{Clock, MetricSink};
use crate::object::ObjectHeader;
use crate::object::ObjectRef;
use crate::scheduler::SchedulerKind;

/// An iterator over every object the heap currently owns, taken under
/// whatever lock makes mutation-during-iteration safe. Yielded by
/// [`HeapObjects::lock_for_iter`] and held across thread resumption so the
/// concurrent sweep phase can still walk it safely.
pub trait HeapIter {
    /// Advances to the next object, or `None` once exhausted.
    fn next(&mut self) -> Option<ObjectRef>;

    /// Unlinks the object most recently returned by `next` from the heap.
    /// Only valid to call once per `next()` call, and only before calling
    /// `next()` again.
    fn remove_current(&mut self);
}

/// The object factory/heap collaborator.
pub trait HeapObjects<B: GcBinding>: Send + Sync + 'static {
    type IterGuard<'a>: HeapIter
    where
        Self: 'a;

    /// Takes whatever lock makes it safe to iterate and mutate the heap at
    /// once. Held for the duration of the sweep phase.
    fn lock_for_iter(&self) -> Self::IterGuard<'_>;

    /// Number of live objects. Only meaningful with the world stopped.
    fn size_unsafe(&self) -> usize;

    /// Total bytes of live objects. Only meaningful with the world
    /// stopped.
    fn size_bytes_unsafe(&self) -> usize;

    /// The GC-owned header embedded in `obj`.
    fn header_of(&self, obj: ObjectRef) -> &ObjectHeader;

    /// `obj`'s outgoing strong references — the scan function the shared
    /// mark utility traverses through.
    fn referents_of(&self, obj: ObjectRef) -> Vec<ObjectRef>;

    /// Whether `obj` has a pending finalizer that must run if it turns out
    /// to be garbage.
    fn needs_finalization(&self, obj: ObjectRef) -> bool;
}

/// One entry in the extra-object-data side table (weak refs, finalizer
/// bookkeeping) — data that is swept alongside, but independently of, the
/// main object factory.
pub struct ExtraObjectEntry {
    /// The object this entry's extra data is attached to. `None` means the
    /// base object already left the GC heap by some other route, in which
    /// case the sweep treats the entry as implicitly marked.
    pub base_object: Option<ObjectRef>,
}

pub trait ExtraObjectIter {
    fn next(&mut self) -> Option<ExtraObjectEntry>;
    /// Unlinks the entry most recently returned by `next`.
    fn destroy_current(&mut self);
}

pub trait ExtraObjectTable<B: GcBinding>: Send + Sync + 'static {
    type IterGuard<'a>: ExtraObjectIter
    where
        Self: 'a;

    fn lock_for_iter(&self) -> Self::IterGuard<'_>;

    /// Number of entries. Only meaningful with the world stopped.
    fn size_unsafe(&self) -> usize;
}

/// Stop-the-world thread suspension. One instance speaks for every
/// registered mutator thread; safepoints call back into it from whichever
/// thread hit the safepoint.
pub trait ThreadSuspension: Send + Sync + 'static {
    /// Requests every registered mutator suspend at its next safepoint.
    /// Returns `false` if suspension was already requested by someone
    /// else — a broken invariant for this crate's single-GC-thread model.
    fn request_suspension(&self) -> bool;

    /// Blocks until every registered mutator has reported itself
    /// suspended.
    fn wait_for_suspension(&self);

    /// Clears the suspension request and wakes every parked mutator.
    fn resume_threads(&self);

    /// Whether the calling thread is itself a registered mutator. The GC
    /// thread must never answer `true`.
    fn is_current_thread_registered(&self) -> bool;

    /// Called by a mutator at its slow-path safepoint: blocks the caller
    /// until the current suspension request is cleared.
    fn suspend_if_requested(&self);

    /// Marks the calling thread NATIVE (not executing managed code) for
    /// the duration of `f`, so `wait_for_suspension` does not wait on it.
    /// Used while a mutator blocks on [`crate::collector::Collector::on_oom`]
    /// or an explicit full-GC request.
    fn with_native_state<R>(&self, f: impl FnOnce() -> R) -> R;

    /// Marks the calling thread RUNNABLE for the duration of `f`. Used by
    /// the finalizer thread while it's actually invoking finalizers, since
    /// those may touch managed objects.
    fn with_runnable_state<R>(&self, f: impl FnOnce() -> R) -> R;
}

/// The aggregate binding a managed-language runtime implements once. A
/// [`crate::collector::Collector`] is generic over exactly one binding.
pub trait GcBinding: Sized + Send + Sync + 'static {
    type Heap: HeapObjects<Self>;
    type ExtraObjects: ExtraObjectTable<Self>;
    type Suspension: ThreadSuspension;

    fn heap(&self) -> &Self::Heap;
    fn extra_objects(&self) -> &Self::ExtraObjects;
    fn suspension(&self) -> &Self::Suspension;
    fn clock(&self) -> &Arc<dyn Clock>;
    fn metrics(&self) -> &Arc<dyn MetricSink>;

    /// Enumerates the gray set: stack/register roots of every suspended
    /// mutator plus any global/thread-local roots. Only valid with the
    /// world stopped.
    fn collect_root_set(&self) -> Vec<ObjectRef>;

    /// Called once at GC thread invocation that runs finalizers, before
    /// the first batch. Default no-op; a binding that needs to register
    /// the finalizer thread as a managed thread overrides this.
    fn init_finalizer_thread(&self) {}

    /// Finalizes every object in `queue`. Called with the finalizer
    /// thread's state marked RUNNABLE.
    fn finalize(&self, queue: Vec<ObjectRef>);

    /// Which scheduler policy this binding wants. Defaults to
    /// `WithTimer`, the common case for a production embedding.
    fn scheduler_kind(&self) -> SchedulerKind {
        SchedulerKind::WithTimer
    }
}
