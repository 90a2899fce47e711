//! Diagnostic gauges for pool backing memory.
//!
//! All counters use `Relaxed` ordering.  Individual values are eventually
//! consistent and cross-counter snapshots may transiently disagree.  This is
//! acceptable for diagnostic display.  Do NOT use these values for
//! allocation decisions.

use crate::sync::atomic::{AtomicIsize, Ordering};

/// Diagnostic-only gauge counter.
///
/// Under contention, subtract-before-add races are tolerated and the raw
/// value may transiently dip below zero.  Readers should always use
/// `load()`/`get()`, which clamp negative values to zero.
pub(crate) struct Counter(AtomicIsize);

impl Counter {
    #[cfg(not(loom))]
    pub(crate) const fn new() -> Self {
        Self(AtomicIsize::new(0))
    }

    #[cfg(loom)]
    pub(crate) fn new() -> Self {
        Self(AtomicIsize::new(0))
    }

    #[inline]
    fn delta(val: usize) -> isize {
        // Diagnostic counters only: clamp absurd deltas instead of panicking.
        std::cmp::min(val, isize::MAX as usize).cast_signed()
    }

    #[inline]
    pub(crate) fn add(&self, val: usize) {
        self.0.fetch_add(Self::delta(val), Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn sub(&self, val: usize) {
        self.0.fetch_sub(Self::delta(val), Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn get(&self) -> usize {
        self.0.load(Ordering::Relaxed).max(0).cast_unsigned()
    }
}

// Bytes currently held by anonymously mapped pool buffers.
crate::sync::static_atomic! {
    pub static MAPPED_BYTES: Counter = Counter::new();
}
// Bytes currently held by heap-backed pool buffers.
crate::sync::static_atomic! {
    pub static HEAP_BYTES: Counter = Counter::new();
}
// Number of live pools.
crate::sync::static_atomic! {
    pub static POOLS_LIVE: Counter = Counter::new();
}

/// Point-in-time view of the global pool gauges.
#[derive(Debug, Clone, Copy)]
pub struct PoolStats {
    pub pools_live: usize,
    pub mapped_bytes: usize,
    pub heap_bytes: usize,
}

/// Snapshot the global gauges.
#[must_use]
pub fn pool_stats() -> PoolStats {
    PoolStats {
        pools_live: POOLS_LIVE.get(),
        mapped_bytes: MAPPED_BYTES.get(),
        heap_bytes: HEAP_BYTES.get(),
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;

    #[test]
    fn test_counter_add_sub() {
        let c = Counter::new();
        c.add(10);
        c.add(5);
        c.sub(3);
        assert_eq!(c.get(), 12);
    }

    #[test]
    fn test_counter_clamps_negative_transients() {
        let c = Counter::new();
        c.sub(5);
        assert_eq!(c.get(), 0);
        c.add(3);
        // Raw value is -2; reads clamp.
        assert_eq!(c.get(), 0);
        c.add(10);
        assert_eq!(c.get(), 8);
    }

    #[test]
    fn test_counter_clamps_absurd_delta() {
        let c = Counter::new();
        c.add(usize::MAX);
        assert_eq!(c.get(), isize::MAX.cast_unsigned());
    }

    #[test]
    fn test_snapshot_tracks_pool_lifecycle() {
        let _guard = crate::pool::TEST_MUTEX.write().unwrap();
        let before = pool_stats();

        let pool = crate::pool::arena::MemoryPool::new(1024).unwrap();
        let during = pool_stats();
        assert_eq!(during.pools_live, before.pools_live + 1);
        assert!(during.mapped_bytes + during.heap_bytes
            >= before.mapped_bytes + before.heap_bytes + 1024);

        drop(pool);
        let after = pool_stats();
        assert_eq!(after.pools_live, before.pools_live);
        assert_eq!(after.mapped_bytes, before.mapped_bytes);
        assert_eq!(after.heap_bytes, before.heap_bytes);
    }
}
