//! Atomic counters recording engine activity.

use std::sync::atomic::{AtomicU64, Ordering};

use super::snapshot::TelemetrySnapshot;

/// Lock-free counters shared between the layer thread, loaders, and viewers.
///
/// Counters are cumulative since engine start; the `tiles_active` and
/// `tiles_loading` fields are gauges overwritten each tick.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    ticks: AtomicU64,
    fetches_started: AtomicU64,
    fetches_completed: AtomicU64,
    fetches_failed: AtomicU64,
    stale_results_dropped: AtomicU64,
    builds_completed: AtomicU64,
    builds_failed: AtomicU64,
    changes_applied: AtomicU64,
    changes_rejected: AtomicU64,
    evictions: AtomicU64,
    bytes_fetched: AtomicU64,
    tiles_active: AtomicU64,
    tiles_loading: AtomicU64,
}

impl EngineMetrics {
    /// Creates a zeroed metrics block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one controller tick.
    pub fn tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a fetch being issued.
    pub fn fetch_started(&self) {
        self.fetches_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a successful fetch of `bytes` payload bytes.
    pub fn fetch_completed(&self, bytes: u64) {
        self.fetches_completed.fetch_add(1, Ordering::Relaxed);
        self.bytes_fetched.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Records a failed fetch.
    pub fn fetch_failed(&self) {
        self.fetches_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an async result discarded by the generation check.
    pub fn stale_result_dropped(&self) {
        self.stale_results_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a successful tile build.
    pub fn build_completed(&self) {
        self.builds_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a failed tile build.
    pub fn build_failed(&self) {
        self.builds_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records the outcome of a change-queue drain.
    pub fn changes_drained(&self, applied: u64, rejected: u64) {
        self.changes_applied.fetch_add(applied, Ordering::Relaxed);
        self.changes_rejected.fetch_add(rejected, Ordering::Relaxed);
    }

    /// Records one node evicted under memory pressure.
    pub fn eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    /// Overwrites the active-tiles gauge.
    pub fn set_tiles_active(&self, count: u64) {
        self.tiles_active.store(count, Ordering::Relaxed);
    }

    /// Overwrites the loading-tiles gauge.
    pub fn set_tiles_loading(&self, count: u64) {
        self.tiles_loading.store(count, Ordering::Relaxed);
    }

    /// Takes a point-in-time copy of every counter.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            fetches_started: self.fetches_started.load(Ordering::Relaxed),
            fetches_completed: self.fetches_completed.load(Ordering::Relaxed),
            fetches_failed: self.fetches_failed.load(Ordering::Relaxed),
            stale_results_dropped: self.stale_results_dropped.load(Ordering::Relaxed),
            builds_completed: self.builds_completed.load(Ordering::Relaxed),
            builds_failed: self.builds_failed.load(Ordering::Relaxed),
            changes_applied: self.changes_applied.load(Ordering::Relaxed),
            changes_rejected: self.changes_rejected.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            bytes_fetched: self.bytes_fetched.load(Ordering::Relaxed),
            tiles_active: self.tiles_active.load(Ordering::Relaxed),
            tiles_loading: self.tiles_loading.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = EngineMetrics::new();
        metrics.fetch_started();
        metrics.fetch_started();
        metrics.fetch_completed(100);
        metrics.fetch_failed();
        metrics.stale_result_dropped();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.fetches_started, 2);
        assert_eq!(snapshot.fetches_completed, 1);
        assert_eq!(snapshot.fetches_failed, 1);
        assert_eq!(snapshot.stale_results_dropped, 1);
        assert_eq!(snapshot.bytes_fetched, 100);
    }

    #[test]
    fn test_gauges_overwrite() {
        let metrics = EngineMetrics::new();
        metrics.set_tiles_active(10);
        metrics.set_tiles_active(3);
        assert_eq!(metrics.snapshot().tiles_active, 3);
    }

    #[test]
    fn test_snapshot_is_independent_copy() {
        let metrics = EngineMetrics::new();
        metrics.tick();
        let before = metrics.snapshot();
        metrics.tick();
        assert_eq!(before.ticks, 1);
        assert_eq!(metrics.snapshot().ticks, 2);
    }

    #[test]
    fn test_concurrent_updates() {
        use std::sync::Arc;
        let metrics = Arc::new(EngineMetrics::new());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let metrics = Arc::clone(&metrics);
            handles.push(std::thread::spawn(move || {
                for _ in 0..1000 {
                    metrics.fetch_started();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(metrics.snapshot().fetches_started, 4000);
    }
}
