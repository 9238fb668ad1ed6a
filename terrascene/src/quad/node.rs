//! Per-tile scheduler state.

use std::time::Instant;

use crate::coord::TileAddress;
use crate::scene::ComponentObject;

/// Lifecycle state of one tile node.
///
/// ```text
/// Unknown ──► Loading ──► Loaded ──► Active ──► Unloading ──► Gone
///    ▲           │           │          │            │
///    └───────────┴───────────┴──────────┴── (failure, eviction, refresh)
/// ```
///
/// Transitions are driven once per controller tick and by generation-checked
/// asynchronous completions; see
/// [`QuadDisplayController`](crate::quad::QuadDisplayController).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileState {
    /// Identified as possibly relevant; nothing requested yet.
    Unknown,
    /// A fetch is in flight under the node's current generation.
    Loading,
    /// Resources built and registered; eligible to be shown.
    Loaded,
    /// Contributing to the displayed scene.
    Active,
    /// Removal requests queued, not yet confirmed applied.
    Unloading,
    /// Resources fully released; the node is leaving the live set.
    Gone,
}

impl TileState {
    /// True if the node owns registered scene resources.
    pub fn is_resident(&self) -> bool {
        matches!(self, TileState::Loaded | TileState::Active | TileState::Unloading)
    }

    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            TileState::Unknown => "unknown",
            TileState::Loading => "loading",
            TileState::Loaded => "loaded",
            TileState::Active => "active",
            TileState::Unloading => "unloading",
            TileState::Gone => "gone",
        }
    }
}

/// The scheduler's per-address state.
///
/// Nodes never hold references to other nodes; parent/child relationships
/// are derived from the address and resolved through the controller's node
/// map, so a destroyed-and-recreated neighbor can never dangle.
#[derive(Debug)]
pub struct TileNode {
    pub(crate) address: TileAddress,
    pub(crate) state: TileState,
    /// Bumped on every unload/refresh/failure; async results carrying an
    /// older value are discarded on arrival.
    pub(crate) generation: u64,
    pub(crate) importance: f64,
    /// Scene resources owned by this node once loaded.
    pub(crate) component: ComponentObject,
    pub(crate) failures: u32,
    pub(crate) cooldown_until: Option<Instant>,
    pub(crate) loading_since: Option<Instant>,
    /// Exceeded the retry budget; never fetched again until a refresh.
    pub(crate) parked: bool,
}

impl TileNode {
    /// Creates a fresh node in the `Unknown` state.
    pub fn new(address: TileAddress) -> Self {
        Self {
            address,
            state: TileState::Unknown,
            generation: 0,
            importance: 0.0,
            component: ComponentObject::default(),
            failures: 0,
            cooldown_until: None,
            loading_since: None,
            parked: false,
        }
    }

    /// The node's tile address.
    pub fn address(&self) -> TileAddress {
        self.address
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TileState {
        self.state
    }

    /// Current generation counter.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Importance score from the latest tick.
    pub fn importance(&self) -> f64 {
        self.importance
    }

    /// Scene resources owned by this node.
    pub fn component(&self) -> &ComponentObject {
        &self.component
    }

    /// True if the node is parked after exhausting its retries.
    pub fn is_parked(&self) -> bool {
        self.parked
    }

    /// True while the failure cooldown is still running.
    pub fn in_cooldown(&self, now: Instant) -> bool {
        self.cooldown_until.is_some_and(|until| until > now)
    }

    /// Invalidates every in-flight result for this node.
    pub(crate) fn bump_generation(&mut self) {
        self.generation += 1;
    }
}
