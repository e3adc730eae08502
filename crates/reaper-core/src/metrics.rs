//! Global atomic counters for controller observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. when a controller stops).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    events_admitted: AtomicU64,
    events_dropped: AtomicU64,
    resources_deleted: AtomicU64,
    requeues_scheduled: AtomicU64,
    reconcile_errors: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            events_admitted: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            resources_deleted: AtomicU64::new(0),
            requeues_scheduled: AtomicU64::new(0),
            reconcile_errors: AtomicU64::new(0),
        }
    }

    pub fn inc_events_admitted(&self) {
        self.events_admitted.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "events_admitted", "counter incremented");
    }

    pub fn inc_events_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_resources_deleted(&self) {
        self.resources_deleted.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "resources_deleted", "counter incremented");
    }

    pub fn inc_requeues(&self) {
        self.requeues_scheduled.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "requeues_scheduled", "counter incremented");
    }

    pub fn inc_reconcile_errors(&self) {
        self.reconcile_errors.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "reconcile_errors", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            events_admitted = self.events_admitted(),
            events_dropped = self.events_dropped(),
            resources_deleted = self.resources_deleted(),
            requeues_scheduled = self.requeues_scheduled(),
            reconcile_errors = self.reconcile_errors(),
        );
    }

    pub fn events_admitted(&self) -> u64 {
        self.events_admitted.load(Ordering::Relaxed)
    }

    pub fn events_dropped(&self) -> u64 {
        self.events_dropped.load(Ordering::Relaxed)
    }

    pub fn resources_deleted(&self) -> u64 {
        self.resources_deleted.load(Ordering::Relaxed)
    }

    pub fn requeues_scheduled(&self) -> u64 {
        self.requeues_scheduled.load(Ordering::Relaxed)
    }

    pub fn reconcile_errors(&self) -> u64 {
        self.reconcile_errors.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.events_admitted.store(0, Ordering::Relaxed);
        self.events_dropped.store(0, Ordering::Relaxed);
        self.resources_deleted.store(0, Ordering::Relaxed);
        self.requeues_scheduled.store(0, Ordering::Relaxed);
        self.reconcile_errors.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        m.inc_events_admitted();
        m.inc_events_admitted();
        m.inc_events_dropped();
        m.inc_resources_deleted();
        m.inc_requeues();
        m.inc_requeues();
        m.inc_requeues();
        m.inc_reconcile_errors();

        assert_eq!(m.events_admitted(), 2);
        assert_eq!(m.events_dropped(), 1);
        assert_eq!(m.resources_deleted(), 1);
        assert_eq!(m.requeues_scheduled(), 3);
        assert_eq!(m.reconcile_errors(), 1);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_events_admitted();
        m.inc_resources_deleted();
        m.inc_reconcile_errors();
        m.reset();
        assert_eq!(m.events_admitted(), 0);
        assert_eq!(m.resources_deleted(), 0);
        assert_eq!(m.reconcile_errors(), 0);
    }
}
