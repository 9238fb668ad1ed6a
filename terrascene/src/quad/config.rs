//! Tuning knobs for the quad display controller.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default cap on simultaneously in-flight fetches.
pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 8;

/// Default cap on node state transitions per tick.
pub const DEFAULT_MAX_TILE_CHURN_PER_TICK: usize = 32;

/// Default bound on load attempts before a tile is parked.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default cooldown before a failed tile is eligible again.
pub const DEFAULT_RETRY_COOLDOWN: Duration = Duration::from_secs(2);

/// Configuration for [`QuadDisplayController`](crate::quad::QuadDisplayController).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Maximum tiles in the `Loading` state at any instant.
    pub max_concurrent_fetches: usize,

    /// Maximum node state transitions per tick, bounding per-frame work.
    pub max_tile_churn_per_tick: usize,

    /// Load attempts before a tile is parked as permanently failed.
    pub max_retries: u32,

    /// Wait before a failed tile may be retried.
    pub retry_cooldown: Duration,

    /// When set, a tile only activates once all of its siblings under the
    /// same parent are loaded, avoiding visible seams. Clearing it trades
    /// seams for lower latency.
    pub require_sibling_coverage: bool,

    /// Watchdog: re-fail a fetch still unresolved after this long.
    /// `None` disables the watchdog.
    pub fetch_timeout: Option<Duration>,

    /// Delay applied to removal requests so a departing tile can fade out.
    /// `None` removes immediately.
    pub fade_out: Option<Duration>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
            max_tile_churn_per_tick: DEFAULT_MAX_TILE_CHURN_PER_TICK,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_cooldown: DEFAULT_RETRY_COOLDOWN,
            require_sibling_coverage: true,
            fetch_timeout: None,
            fade_out: None,
        }
    }
}
