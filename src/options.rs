//! Construction-time configuration for a [`crate::collector::Collector`].

use crate::scheduler::GcSchedulerConfig;

/// Knobs a binding can set before handing control to the collector. Once a
/// [`crate::collector::Collector`] exists, the live tunables on
/// [`GcSchedulerConfig`] are reached through
/// [`crate::collector::Collector::scheduler_config`] instead.
pub struct CollectorOptions {
    pub scheduler_config: GcSchedulerConfig,
    pub gc_thread_name: String,
    pub finalizer_thread_name: String,
}

impl Default for CollectorOptions {
    fn default() -> Self {
        CollectorOptions {
            scheduler_config: GcSchedulerConfig::new(),
            gc_thread_name: "epochgc-collector".to_owned(),
            finalizer_thread_name: "epochgc-finalizer".to_owned(),
        }
    }
}

impl CollectorOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scheduler_config(mut self, config: GcSchedulerConfig) -> Self {
        self.scheduler_config = config;
        self
    }

    pub fn with_gc_thread_name(mut self, name: impl Into<String>) -> Self {
        self.gc_thread_name = name.into();
        self
    }

    pub fn with_finalizer_thread_name(mut self, name: impl Into<String>) -> Self {
        self.finalizer_thread_name = name.into();
        self
    }
}
