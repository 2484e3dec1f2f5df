//! Shared application state.

use crate::metrics::Metrics;
use crate::reload::Generation;
use crate::util::ShutdownSignal;
use arc_swap::ArcSwap;
use std::sync::Arc;

/// State shared by the listener, the config watcher, and shutdown
/// handling. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Current routing generation, swapped atomically on reload.
    generation: Arc<ArcSwap<Generation>>,

    /// Process-wide metrics registry.
    metrics: Metrics,

    /// Process shutdown signal.
    shutdown: ShutdownSignal,
}

impl AppState {
    pub fn new(generation: Generation, metrics: Metrics) -> Self {
        Self {
            generation: Arc::new(ArcSwap::from_pointee(generation)),
            metrics,
            shutdown: ShutdownSignal::new(),
        }
    }

    /// The current generation. A request dispatches against the loaded
    /// value; a concurrent swap does not affect it.
    pub fn generation(&self) -> arc_swap::Guard<Arc<Generation>> {
        self.generation.load()
    }

    /// Swap in a new generation and retire the old one.
    pub fn swap_generation(&self, next: Generation) {
        let old = self.generation.swap(Arc::new(next));
        old.retire();
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn shutdown(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    pub fn trigger_shutdown(&self) {
        self.shutdown.shutdown();
    }
}
