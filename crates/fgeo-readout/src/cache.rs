//! Compute-once-under-lock cell for lazily derived element geometry.

use std::sync::atomic::{AtomicU64, Ordering};

use fgeo_error::Result;
use parking_lot::{RwLock, RwLockUpgradableReadGuard};

/// Lazily computed value with lock-free invalidation.
///
/// Every [`invalidate`](Self::invalidate) bumps a generation counter; a
/// stored value is current only while its generation matches. Readers take
/// the shared lock on the fast path. On a miss one reader holds the
/// upgradable lock, re-checks, then computes under the write lock, so no
/// reader ever sees a partially updated value.
#[derive(Debug)]
pub struct CacheCell<T> {
    generation: AtomicU64,
    value: RwLock<Option<(u64, T)>>,
    recomputes: AtomicU64,
}

impl<T: Clone> Default for CacheCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> CacheCell<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            generation: AtomicU64::new(0),
            value: RwLock::new(None),
            recomputes: AtomicU64::new(0),
        }
    }

    /// The cached value, computing it with `compute` when stale.
    ///
    /// A failed computation leaves the cell stale.
    pub fn get_or_compute(&self, compute: impl FnOnce() -> Result<T>) -> Result<T> {
        let generation = self.generation.load(Ordering::Acquire);
        if let Some((stored, value)) = self.value.read().as_ref() {
            if *stored == generation {
                return Ok(value.clone());
            }
        }

        let guard = self.value.upgradable_read();
        let generation = self.generation.load(Ordering::Acquire);
        if let Some((stored, value)) = guard.as_ref() {
            if *stored == generation {
                return Ok(value.clone());
            }
        }
        let mut guard = RwLockUpgradableReadGuard::upgrade(guard);
        let value = compute()?;
        *guard = Some((generation, value.clone()));
        self.recomputes.fetch_add(1, Ordering::Relaxed);
        Ok(value)
    }

    /// Mark the value stale. Never blocks.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    pub fn is_valid(&self) -> bool {
        let generation = self.generation.load(Ordering::Acquire);
        self.value
            .read()
            .as_ref()
            .is_some_and(|(stored, _)| *stored == generation)
    }

    /// Number of completed computations.
    pub fn recompute_count(&self) -> u64 {
        self.recomputes.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use fgeo_error::GeoError;

    use super::*;

    #[test]
    fn computes_once_until_invalidated() {
        let cell = CacheCell::new();
        assert!(!cell.is_valid());
        assert_eq!(cell.get_or_compute(|| Ok(7)).expect("compute"), 7);
        assert_eq!(cell.get_or_compute(|| Ok(8)).expect("cached"), 7);
        assert_eq!(cell.recompute_count(), 1);
        assert!(cell.is_valid());

        cell.invalidate();
        assert!(!cell.is_valid());
        assert_eq!(cell.get_or_compute(|| Ok(9)).expect("recompute"), 9);
        assert_eq!(cell.recompute_count(), 2);
    }

    #[test]
    fn failed_compute_leaves_cell_stale() {
        let cell: CacheCell<u32> = CacheCell::new();
        assert!(cell.get_or_compute(|| Err(GeoError::internal("boom"))).is_err());
        assert!(!cell.is_valid());
        assert_eq!(cell.recompute_count(), 0);
        assert_eq!(cell.get_or_compute(|| Ok(1)).expect("compute"), 1);
    }

    #[test]
    fn concurrent_readers_compute_once() {
        let cell = Arc::new(CacheCell::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cell = Arc::clone(&cell);
                thread::spawn(move || cell.get_or_compute(|| Ok(42_u64)).expect("compute"))
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().expect("join"), 42);
        }
        assert_eq!(cell.recompute_count(), 1, "case=single_recompute");
    }
}
