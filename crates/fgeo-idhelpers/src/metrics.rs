//! Identifier-helper observability counters.
//!
//! Counters are per helper instance so that tests with several independent
//! dictionaries observe only their own helper.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of one helper's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IdHelperMetricsSnapshot {
    /// Identifiers that failed the dictionary range check.
    pub range_check_failures: u64,
    /// Hash lookups for identifiers not present at the requested level.
    pub hash_misses: u64,
    /// Completed (non-idempotent) initialisations.
    pub initializations: u64,
}

#[derive(Debug, Default)]
pub struct IdHelperMetrics {
    range_check_failures: AtomicU64,
    hash_misses: AtomicU64,
    initializations: AtomicU64,
}

impl IdHelperMetrics {
    pub(crate) fn record_range_check_failure(&self) {
        self.range_check_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_hash_miss(&self) {
        self.hash_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_initialization(&self) {
        self.initializations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn range_check_failures(&self) -> u64 {
        self.range_check_failures.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn snapshot(&self) -> IdHelperMetricsSnapshot {
        IdHelperMetricsSnapshot {
            range_check_failures: self.range_check_failures.load(Ordering::Relaxed),
            hash_misses: self.hash_misses.load(Ordering::Relaxed),
            initializations: self.initializations.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.range_check_failures.store(0, Ordering::Relaxed);
        self.hash_misses.store(0, Ordering::Relaxed);
        self.initializations.store(0, Ordering::Relaxed);
    }
}
