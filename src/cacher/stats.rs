//! Coalescing statistics for the tile cacher.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters maintained by the cacher.
#[derive(Debug, Default)]
pub(crate) struct CacherCounters {
    pub(crate) hot_hits: AtomicU64,
    pub(crate) coalesced: AtomicU64,
    pub(crate) fetches: AtomicU64,
    pub(crate) locks: AtomicU64,
    pub(crate) cancelled_waiters: AtomicU64,
}

impl CacherCounters {
    pub(crate) fn snapshot(&self) -> CacherStats {
        CacherStats {
            hot_hits: self.hot_hits.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            fetches: self.fetches.load(Ordering::Relaxed),
            locks: self.locks.load(Ordering::Relaxed),
            cancelled_waiters: self.cancelled_waiters.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Snapshot of the cacher's coalescing effectiveness.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacherStats {
    /// Gets answered from the hot tier.
    pub hot_hits: u64,
    /// Gets that joined an in-flight fetch or a producer lock.
    pub coalesced: u64,
    /// Backend fetches dispatched (first miss per cold key).
    pub fetches: u64,
    /// Lock-until-set acquisitions granted.
    pub locks: u64,
    /// Waiters failed because a producer unlocked without publishing.
    pub cancelled_waiters: u64,
}

impl CacherStats {
    /// Fraction of non-hit gets that were coalesced instead of fetching.
    pub fn coalescing_ratio(&self) -> f64 {
        let total = self.coalesced + self.fetches;
        if total == 0 {
            0.0
        } else {
            self.coalesced as f64 / total as f64
        }
    }
}
