//! Process-wide atomic counters for pipeline observability.
//!
//! Counters are bumped at the call site. Call [`Metrics::flush`] to emit the
//! current values as one `tracing::info!` event, e.g. at the end of a
//! training run or on daemon shutdown.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters, no allocation or locking.
pub struct Metrics {
    rows_accepted: AtomicU64,
    rows_rejected: AtomicU64,
    join_gaps: AtomicU64,
    unknown_categories: AtomicU64,
    predictions_served: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            rows_accepted: AtomicU64::new(0),
            rows_rejected: AtomicU64::new(0),
            join_gaps: AtomicU64::new(0),
            unknown_categories: AtomicU64::new(0),
            predictions_served: AtomicU64::new(0),
        }
    }

    pub fn add_rows_accepted(&self, n: u64) {
        self.rows_accepted.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_rows_rejected(&self, n: u64) {
        self.rows_rejected.fetch_add(n, Ordering::Relaxed);
    }

    /// Runs joined without a usable weather observation.
    pub fn add_join_gaps(&self, n: u64) {
        self.join_gaps.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_unknown_categories(&self, n: u64) {
        self.unknown_categories.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_predictions_served(&self) {
        self.predictions_served.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "predictions_served", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            rows_accepted = self.rows_accepted(),
            rows_rejected = self.rows_rejected(),
            join_gaps = self.join_gaps(),
            unknown_categories = self.unknown_categories(),
            predictions_served = self.predictions_served(),
        );
    }

    pub fn rows_accepted(&self) -> u64 {
        self.rows_accepted.load(Ordering::Relaxed)
    }

    pub fn rows_rejected(&self) -> u64 {
        self.rows_rejected.load(Ordering::Relaxed)
    }

    pub fn join_gaps(&self) -> u64 {
        self.join_gaps.load(Ordering::Relaxed)
    }

    pub fn unknown_categories(&self) -> u64 {
        self.unknown_categories.load(Ordering::Relaxed)
    }

    pub fn predictions_served(&self) -> u64 {
        self.predictions_served.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.rows_accepted.store(0, Ordering::Relaxed);
        self.rows_rejected.store(0, Ordering::Relaxed);
        self.join_gaps.store(0, Ordering::Relaxed);
        self.unknown_categories.store(0, Ordering::Relaxed);
        self.predictions_served.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let m = Metrics::new();
        m.add_rows_accepted(10);
        m.add_rows_accepted(5);
        m.add_rows_rejected(2);
        m.add_join_gaps(3);
        m.inc_predictions_served();
        assert_eq!(m.rows_accepted(), 15);
        assert_eq!(m.rows_rejected(), 2);
        assert_eq!(m.join_gaps(), 3);
        assert_eq!(m.predictions_served(), 1);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.add_rows_accepted(1);
        m.add_unknown_categories(4);
        m.inc_predictions_served();
        m.reset();
        assert_eq!(m.rows_accepted(), 0);
        assert_eq!(m.unknown_categories(), 0);
        assert_eq!(m.predictions_served(), 0);
    }
}
