//! Core of an epoch-scheduled, stop-the-world mark-and-sweep garbage
//! collector for managed-language runtimes with native-compiled mutator
//! threads.
//!
//! A runtime embeds this crate by implementing [`vm::GcBinding`] and
//! handing it to [`collector::Collector::new`]. Everything else —
//! deciding when to collect ([`scheduler`]), stopping mutators at a
//! safepoint ([`safepoint`]), coordinating the GC and finalizer threads
//! ([`epoch`], [`collector`]), and the mark/sweep traversal itself
//! ([`mark_sweep`]) — is provided.
//!
//! # Logging
//!
//! This crate logs through the [`log`] facade at levels matching severity:
//! `error!` precedes every [`fatal`] abort, `warn!` for a background
//! thread panicking during shutdown, `info!` for thread lifecycle, and
//! `debug!` for per-cycle statistics. Enable the `builtin_env_logger`
//! feature (on by default) to get a usable subscriber without installing
//! your own, or disable it and install your own `log` consumer before
//! constructing a [`collector::Collector`].

pub mod clock;
pub mod collector;
pub mod epoch;
mod error;
pub mod mark_sweep;
pub mod object;
pub mod options;
pub mod safepoint;
pub mod scheduler;
pub mod timer;
pub mod vm;

#[cfg(any(test, feature = "mock"))]
pub mod testing;

pub use clock::{Clock, ManualClock, MetricSink, NullSink, SystemClock};
pub use collector::Collector;
pub use epoch::{Epoch, EpochCoordinator, EpochSnapshot, SHUTDOWN_EPOCH};
pub use object::{Color, ObjectHeader, ObjectRef};
pub use options::CollectorOptions;
pub use safepoint::ThreadData;
pub use scheduler::{GcSchedulerConfig, SchedulerKind, SchedulerPolicy};
pub use vm::{ExtraObjectEntry, ExtraObjectIter, ExtraObjectTable, GcBinding, HeapIter, HeapObjects, ThreadSuspension};
