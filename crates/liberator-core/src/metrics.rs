//! Process-wide atomic counters.
//!
//! Incremented silently where the work happens; [`Metrics::flush`] logs all
//! of them as one `info!` event at the end of a pipeline run.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    files_cleaned: AtomicU64,
    files_removed: AtomicU64,
    statements_executed: AtomicU64,
    statements_ignored: AtomicU64,
    rollbacks_performed: AtomicU64,
    cleanups_scheduled: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            files_cleaned: AtomicU64::new(0),
            files_removed: AtomicU64::new(0),
            statements_executed: AtomicU64::new(0),
            statements_ignored: AtomicU64::new(0),
            rollbacks_performed: AtomicU64::new(0),
            cleanups_scheduled: AtomicU64::new(0),
        }
    }

    /// Files whose published content differs from the original.
    pub fn add_files_cleaned(&self, n: u64) {
        self.files_cleaned.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_files_removed(&self, n: u64) {
        self.files_removed.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_statements(&self, executed: u64, ignored: u64) {
        self.statements_executed.fetch_add(executed, Ordering::Relaxed);
        self.statements_ignored.fetch_add(ignored, Ordering::Relaxed);
    }

    pub fn inc_rollbacks(&self) {
        self.rollbacks_performed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "rollbacks_performed", "counter incremented");
    }

    pub fn inc_cleanups_scheduled(&self) {
        self.cleanups_scheduled.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "cleanups_scheduled", "counter incremented");
    }

    /// Emit all counters as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            files_cleaned = self.files_cleaned(),
            files_removed = self.files_removed(),
            statements_executed = self.statements_executed(),
            statements_ignored = self.statements_ignored(),
            rollbacks_performed = self.rollbacks_performed(),
            cleanups_scheduled = self.cleanups_scheduled(),
        );
    }

    pub fn files_cleaned(&self) -> u64 {
        self.files_cleaned.load(Ordering::Relaxed)
    }

    pub fn files_removed(&self) -> u64 {
        self.files_removed.load(Ordering::Relaxed)
    }

    pub fn statements_executed(&self) -> u64 {
        self.statements_executed.load(Ordering::Relaxed)
    }

    pub fn statements_ignored(&self) -> u64 {
        self.statements_ignored.load(Ordering::Relaxed)
    }

    pub fn rollbacks_performed(&self) -> u64 {
        self.rollbacks_performed.load(Ordering::Relaxed)
    }

    pub fn cleanups_scheduled(&self) -> u64 {
        self.cleanups_scheduled.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.files_cleaned.store(0, Ordering::Relaxed);
        self.files_removed.store(0, Ordering::Relaxed);
        self.statements_executed.store(0, Ordering::Relaxed);
        self.statements_ignored.store(0, Ordering::Relaxed);
        self.rollbacks_performed.store(0, Ordering::Relaxed);
        self.cleanups_scheduled.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        m.add_files_cleaned(3);
        m.add_files_removed(1);
        m.add_statements(5, 2);
        m.inc_rollbacks();
        m.inc_cleanups_scheduled();
        m.inc_cleanups_scheduled();
        assert_eq!(m.files_cleaned(), 3);
        assert_eq!(m.files_removed(), 1);
        assert_eq!(m.statements_executed(), 5);
        assert_eq!(m.statements_ignored(), 2);
        assert_eq!(m.rollbacks_performed(), 1);
        assert_eq!(m.cleanups_scheduled(), 2);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.add_files_cleaned(1);
        m.inc_rollbacks();
        m.reset();
        assert_eq!(m.files_cleaned(), 0);
        assert_eq!(m.rollbacks_performed(), 0);
    }
}
