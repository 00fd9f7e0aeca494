use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-worker interception counters.
#[derive(Debug, Default)]
pub struct InterceptStats {
    hits: AtomicU64,
    misses: AtomicU64,
    network_failures: AtomicU64,
    offline_fallbacks: AtomicU64,
    passthroughs: AtomicU64,
    write_back_failures: AtomicU64,
}

/// Point-in-time copy of [`InterceptStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub network_failures: u64,
    pub offline_fallbacks: u64,
    pub passthroughs: u64,
    pub write_back_failures: u64,
}

impl InterceptStats {
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_network_failure(&self) {
        self.network_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_offline_fallback(&self) {
        self.offline_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_passthrough(&self) {
        self.passthroughs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write_back_failure(&self) {
        self.write_back_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            network_failures: self.network_failures.load(Ordering::Relaxed),
            offline_fallbacks: self.offline_fallbacks.load(Ordering::Relaxed),
            passthroughs: self.passthroughs.load(Ordering::Relaxed),
            write_back_failures: self.write_back_failures.load(Ordering::Relaxed),
        }
    }
}

impl StatsSnapshot {
    /// Share of intercepted lookups answered from cache.
    pub fn hit_ratio(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_and_ratio() {
        let stats = InterceptStats::default();
        assert_eq!(stats.snapshot().hit_ratio(), 0.0);

        stats.record_hit();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        stats.record_passthrough();

        let snap = stats.snapshot();
        assert_eq!(snap.hits, 3);
        assert_eq!(snap.misses, 1);
        assert_eq!(snap.passthroughs, 1);
        assert_eq!(snap.hit_ratio(), 0.75);
    }
}
