//! The quad-tree tile scheduler.
//!
//! [`QuadDisplayController`] decides, once per tick, which tiles of the
//! world to load, keep, and retire for the current view; [`TileNode`] and
//! [`TileState`] carry the per-tile state machine; [`ControllerConfig`]
//! holds the budgets and policy knobs.

mod config;
mod controller;
mod node;

pub use config::{
    ControllerConfig, DEFAULT_MAX_CONCURRENT_FETCHES, DEFAULT_MAX_RETRIES,
    DEFAULT_MAX_TILE_CHURN_PER_TICK, DEFAULT_RETRY_COOLDOWN,
};
pub use controller::{BuildRequest, BuildResult, QuadDisplayController};
pub use node::{TileNode, TileState};
