//! The GC service thread and the finalizer thread: the two background
//! threads that turn everything in `epoch`, `safepoint`, `suspension`,
//! `mark_sweep`, and `scheduler` into a running collector.

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam::queue::SegQueue;
use log::{debug, info, warn};

use crate::clock::{Clock, MetricSink};
use crate::epoch::{Epoch, EpochCoordinator, SHUTDOWN_EPOCH};
use crate::fatal;
use crate::mark_sweep;
use crate::object::ObjectRef;
use crate::options::CollectorOptions;
use crate::safepoint;
use crate::scheduler::{AggressivePolicy, DisabledPolicy, GcSchedulerConfig, SchedulerKind, SchedulerPolicy, TimerDrivenPolicy};
use crate::vm::{ExtraObjectTable, GcBinding, HeapObjects, ThreadSuspension};

/// The finalizer queue: objects a sweep pass found unreachable but that
/// still need a finalizer run. The GC thread merges a batch in after each
/// sweep; the finalizer thread drains whatever has accumulated whenever
/// the epoch coordinator wakes it. Plain lock-free queue — the wakeup
/// itself is [`EpochCoordinator::wait_finalizers_required`]'s job, not
/// this type's.
struct FinalizerChannel {
    queue: SegQueue<ObjectRef>,
}

impl FinalizerChannel {
    fn new() -> Self {
        FinalizerChannel { queue: SegQueue::new() }
    }

    fn merge(&self, objects: Vec<ObjectRef>) {
        for obj in objects {
            self.queue.push(obj);
        }
    }

    fn take(&self) -> Vec<ObjectRef> {
        let mut drained = Vec::new();
        while let Some(obj) = self.queue.pop() {
            drained.push(obj);
        }
        drained
    }

    fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// The collector itself: one GC thread, a lazily-started finalizer thread,
/// and every piece of shared state they coordinate through.
pub struct Collector<B: GcBinding> {
    binding: B,
    epoch: Arc<EpochCoordinator>,
    scheduler_config: Arc<GcSchedulerConfig>,
    policy: Box<dyn SchedulerPolicy>,
    scheduler_kind: SchedulerKind,
    gc_thread_name: String,
    finalizer_thread_name: String,
    gc_thread: Mutex<Option<JoinHandle<()>>>,
    finalizer_thread: Mutex<Option<JoinHandle<()>>>,
    finalizer_channel: FinalizerChannel,
}

impl<B: GcBinding> Collector<B> {
    /// Builds the collector and starts its GC thread. The finalizer thread
    /// is started lazily, on the first GC cycle the GC thread runs, and
    /// then stays alive — listening for every later cycle, empty or not —
    /// until shutdown.
    pub fn new(binding: B, options: CollectorOptions) -> Arc<Self> {
        let kind = binding.scheduler_kind();
        let clock = binding.clock().clone();
        let scheduler_config = Arc::new(options.scheduler_config);
        let epoch = Arc::new(EpochCoordinator::new());

        let schedule_gc = {
            let epoch = epoch.clone();
            move || {
                epoch.schedule();
            }
        };

        let policy: Box<dyn SchedulerPolicy> = match kind {
            SchedulerKind::Disabled => Box::new(DisabledPolicy),
            SchedulerKind::WithTimer => Box::new(TimerDrivenPolicy::new(scheduler_config.clone(), clock, true, schedule_gc)),
            SchedulerKind::OnSafepoints => Box::new(TimerDrivenPolicy::new(scheduler_config.clone(), clock, false, schedule_gc)),
            SchedulerKind::Aggressive => Box::new(AggressivePolicy::new(&scheduler_config, schedule_gc)),
        };

        let this = Arc::new(Collector {
            binding,
            epoch,
            scheduler_config,
            policy,
            scheduler_kind: kind,
            gc_thread_name: options.gc_thread_name,
            finalizer_thread_name: options.finalizer_thread_name,
            gc_thread: Mutex::new(None),
            finalizer_thread: Mutex::new(None),
            finalizer_channel: FinalizerChannel::new(),
        });

        let handle = {
            let this = this.clone();
            thread::Builder::new()
                .name(this.gc_thread_name.clone())
                .spawn(move || this.gc_thread_main())
                .expect("epochgc: failed to spawn GC thread")
        };
        *this.gc_thread.lock().unwrap() = Some(handle);
        this
    }

    pub fn binding(&self) -> &B {
        &self.binding
    }

    pub fn scheduler_config(&self) -> &GcSchedulerConfig {
        &self.scheduler_config
    }

    pub fn scheduler_kind(&self) -> SchedulerKind {
        self.scheduler_kind
    }

    /// A point-in-time read of the epoch coordinator's four counters.
    /// Mainly useful for tests and diagnostics.
    pub fn epoch_snapshot(&self) -> crate::epoch::EpochSnapshot {
        self.epoch.snapshot()
    }

    pub(crate) fn policy(&self) -> &dyn SchedulerPolicy {
        self.policy.as_ref()
    }

    /// Requests a full GC cycle without waiting for it to complete.
    pub fn request_gc(&self) -> Epoch {
        self.epoch.schedule()
    }

    /// Requests a full GC cycle and blocks until its sweep has completed.
    pub fn schedule_and_wait_full_gc(self: &Arc<Self>) {
        self.binding.suspension().with_native_state(|| {
            let e = self.epoch.schedule();
            self.epoch.wait_epoch_finished(e);
        });
    }

    /// Requests a full GC cycle and blocks until its sweep and finalizers
    /// have both completed.
    pub fn schedule_and_wait_full_gc_with_finalizers(self: &Arc<Self>) {
        self.binding.suspension().with_native_state(|| {
            let e = self.epoch.schedule();
            self.epoch.wait_epoch_finalized(e);
        });
    }

    /// Called from an allocation path that just failed. Requests a
    /// synchronous collection in the hope it frees enough heap to retry.
    pub fn on_oom(self: &Arc<Self>, requested_bytes: usize) {
        debug!("epochgc: attempting collection on allocation failure of {} bytes", requested_bytes);
        self.schedule_and_wait_full_gc();
    }

    /// As [`Collector::on_oom`], but also waits for finalizers — for a
    /// binding whose failed allocation might be satisfied by objects a
    /// finalizer releases.
    pub fn on_oom_with_finalizers(self: &Arc<Self>, requested_bytes: usize) {
        debug!("epochgc: attempting collection with finalizers on allocation failure of {} bytes", requested_bytes);
        self.schedule_and_wait_full_gc_with_finalizers();
    }

    /// Requests shutdown and joins both background threads. Safe to call
    /// more than once.
    pub fn shutdown(&self) {
        self.epoch.shutdown();
        if let Some(handle) = self.gc_thread.lock().unwrap().take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.finalizer_thread.lock().unwrap().take() {
            let _ = handle.join();
        }
    }

    /// Test-only: drains whatever cycle is currently in flight, stops the
    /// finalizer thread, and asserts its queue is empty before returning.
    /// Does not affect the GC thread.
    pub fn stop_finalizer_thread_for_tests(self: &Arc<Self>) {
        let e = self.epoch.wait_current_finished();
        let handle = self.finalizer_thread.lock().unwrap().take();
        if let Some(handle) = handle {
            // The finalizer thread may be parked in `wait_finalizers_required`
            // with nothing new to do; reuse the shutdown sentinel to wake it
            // without touching the GC thread or the scheduled/started
            // counters. `finish` back down to `e` below restores the real
            // value once the thread has exited.
            self.epoch.finish(SHUTDOWN_EPOCH);
            handle.join().expect("epochgc: finalizer thread panicked");
        }
        if !self.finalizer_channel.is_empty() {
            fatal!("finalizer queue not drained before test-only stop");
        }
        self.epoch.finish(e);
        self.epoch.finalized(e);
    }

    fn ensure_finalizer_thread(self: &Arc<Self>) {
        let mut guard = self.finalizer_thread.lock().unwrap();
        if guard.is_some() {
            return;
        }
        let this = self.clone();
        let handle = thread::Builder::new()
            .name(self.finalizer_thread_name.clone())
            .spawn(move || this.finalizer_thread_main())
            .expect("epochgc: failed to spawn finalizer thread");
        *guard = Some(handle);
    }

    fn gc_thread_main(self: Arc<Self>) {
        loop {
            let e = self.epoch.wait_scheduled();
            if e == SHUTDOWN_EPOCH {
                self.epoch.start(e);
                self.epoch.finish(e);
                break;
            }
            self.perform_full_gc(e);
        }
        info!("epochgc: GC thread exiting");
    }

    fn perform_full_gc(self: &Arc<Self>, epoch: Epoch) {
        let start_us = self.binding.clock().now_micros();
        self.policy.on_perform_full_gc();
        self.epoch.start(epoch);

        if self.binding.suspension().is_current_thread_registered() {
            fatal!("GC thread must not be a registered mutator");
        }

        // Set the slowpath flag, request suspension, wait for every mutator
        // to park, do the stop-the-world work, then resume and clear the
        // flag again.
        safepoint::request_slowpath();
        if !self.binding.suspension().request_suspension() {
            fatal!("GC thread failed to request thread suspension; it must be the sole requester");
        }
        self.binding.suspension().wait_for_suspension();

        let objects_before = self.binding.heap().size_unsafe();
        let gray_set = self.binding.collect_root_set();
        let heap = self.binding.heap();
        mark_sweep::mark(gray_set, |o| heap.header_of(o).try_mark(), |o| heap.referents_of(o));

        let extra_iter = self.binding.extra_objects().lock_for_iter();
        mark_sweep::sweep_extra_objects(extra_iter, |base| match base {
            None => true,
            Some(obj) => mark_sweep::is_marked(heap.header_of(obj)),
        });

        let heap_iter = self.binding.heap().lock_for_iter();

        self.binding.suspension().resume_threads();
        safepoint::clear_slowpath();

        let finalizer_queue = mark_sweep::sweep_objects(heap_iter, |o| heap.header_of(o).try_reset_mark(), |o| heap.needs_finalization(o));

        let objects_after = self.binding.heap().size_unsafe();
        let bytes_after = self.binding.heap().size_bytes_unsafe();
        let collected = objects_before.saturating_sub(objects_after).saturating_sub(finalizer_queue.len());
        let finalizers_queued = finalizer_queue.len();

        // Ensured every cycle (not just nonempty ones): once the finalizer
        // thread exists, it alone is responsible for calling `finalized`
        // for every later epoch via `wait_finalizers_required`, including
        // epochs whose queue turns out empty.
        self.ensure_finalizer_thread();
        if !finalizer_queue.is_empty() {
            self.finalizer_channel.merge(finalizer_queue);
        }

        self.epoch.finish(epoch);

        self.policy.update_alive_set_bytes(bytes_after);

        let end_us = self.binding.clock().now_micros();
        let pause_us = end_us.saturating_sub(start_us);
        self.binding.metrics().post("gc.epoch", epoch);
        self.binding.metrics().post("gc.collected_objects", collected as i64);
        self.binding.metrics().post("gc.finalizers_queued", finalizers_queued as i64);
        self.binding.metrics().post("gc.pause_us", pause_us as i64);

        if finalizers_queued > 0 {
            debug!("epochgc: epoch {} collected {} objects, queued {} finalizers, paused {}us", epoch, collected, finalizers_queued, pause_us);
        } else {
            debug!("epochgc: epoch {} collected {} objects, paused {}us", epoch, collected, pause_us);
        }
    }

    fn finalizer_thread_main(self: Arc<Self>) {
        self.binding.init_finalizer_thread();
        loop {
            let epoch = self.epoch.wait_finalizers_required();
            if epoch == SHUTDOWN_EPOCH {
                break;
            }
            let queue = self.finalizer_channel.take();
            if !queue.is_empty() {
                let binding = &self.binding;
                binding.suspension().with_runnable_state(|| binding.finalize(queue));
            }
            self.epoch.finalized(epoch);
        }
        info!("epochgc: finalizer thread exiting");
    }
}

impl<B: GcBinding> Drop for Collector<B> {
    fn drop(&mut self) {
        self.epoch.shutdown();
        if let Some(handle) = self.gc_thread.lock().unwrap().take() {
            if let Err(e) = handle.join() {
                warn!("epochgc: GC thread panicked during shutdown: {:?}", e);
            }
        }
        if let Some(handle) = self.finalizer_thread.lock().unwrap().take() {
            if let Err(e) = handle.join() {
                warn!("epochgc: finalizer thread panicked during shutdown: {:?}", e);
            }
        }
    }
}
