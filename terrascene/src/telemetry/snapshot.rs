//! Point-in-time copy of engine metrics.

use std::fmt;

/// A consistent-enough copy of every counter, safe to hold and display
/// while the engine keeps running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    /// Controller ticks since start.
    pub ticks: u64,
    /// Fetches issued.
    pub fetches_started: u64,
    /// Fetches that returned payload bytes.
    pub fetches_completed: u64,
    /// Fetches that errored.
    pub fetches_failed: u64,
    /// Async results discarded by the generation check.
    pub stale_results_dropped: u64,
    /// Tile builds that produced resources.
    pub builds_completed: u64,
    /// Tile builds that errored.
    pub builds_failed: u64,
    /// Change requests applied by the store.
    pub changes_applied: u64,
    /// Change requests the store rejected.
    pub changes_rejected: u64,
    /// Nodes evicted under memory pressure.
    pub evictions: u64,
    /// Total payload bytes fetched.
    pub bytes_fetched: u64,
    /// Tiles currently contributing to the frame (gauge).
    pub tiles_active: u64,
    /// Tiles currently loading (gauge).
    pub tiles_loading: u64,
}

impl TelemetrySnapshot {
    /// Fetches still unresolved (issued minus completed minus failed).
    pub fn fetches_in_flight(&self) -> u64 {
        self.fetches_started
            .saturating_sub(self.fetches_completed)
            .saturating_sub(self.fetches_failed)
    }
}

impl fmt::Display for TelemetrySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ticks={} active={} loading={} fetches={}/{} failed={} stale={} builds={}/{} changes={} rejected={} evicted={} fetched={:.1}MB",
            self.ticks,
            self.tiles_active,
            self.tiles_loading,
            self.fetches_completed,
            self.fetches_started,
            self.fetches_failed,
            self.stale_results_dropped,
            self.builds_completed,
            self.builds_completed + self.builds_failed,
            self.changes_applied,
            self.changes_rejected,
            self.evictions,
            self.bytes_fetched as f64 / 1_000_000.0,
        )
    }
}
