//! View state and the tile importance model.
//!
//! Given a camera [`ViewState`], an [`ImportanceModel`] answers the one
//! question the display controller asks every tick: which tile addresses
//! overlap the view, and how much does each matter? The exact scoring
//! formula is deployment-specific, so the model is a pluggable strategy
//! selected at bootstrap; [`ScreenAreaImportance`] is the shipped default.

use crate::coord::{self, GeoBounds, TileAddress, MAX_LAT, MAX_LON, MIN_LAT, MIN_LON};

/// Upper bound on candidates returned by one importance scan.
///
/// If the view span at the requested level would produce more tiles than
/// this, the scan drops to coarser levels until it fits. Keeps a zoomed-out
/// camera from requesting the whole world at street-level detail.
pub const MAX_CANDIDATES: usize = 4096;

/// Camera state as the scheduler sees it.
///
/// Plain data, produced by the platform layer once per frame. The view
/// rectangle is centered on (`center_lat`, `center_lon`) and spans
/// `span_lat` x `span_lon` degrees; `target_level` is the detail level the
/// camera altitude asks for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewState {
    /// Latitude of the view center in degrees.
    pub center_lat: f64,
    /// Longitude of the view center in degrees.
    pub center_lon: f64,
    /// Latitude span of the view in degrees.
    pub span_lat: f64,
    /// Longitude span of the view in degrees.
    pub span_lon: f64,
    /// Detail level the camera altitude asks for.
    pub target_level: u8,
}

impl ViewState {
    /// Creates a view centered on the given point.
    pub fn new(center_lat: f64, center_lon: f64, span_lat: f64, span_lon: f64, target_level: u8) -> Self {
        Self { center_lat, center_lon, span_lat, span_lon, target_level }
    }

    /// The view rectangle, clamped to the Web Mercator world.
    pub fn bounds(&self) -> GeoBounds {
        GeoBounds {
            west: (self.center_lon - self.span_lon / 2.0).max(MIN_LON),
            east: (self.center_lon + self.span_lon / 2.0).min(MAX_LON),
            south: (self.center_lat - self.span_lat / 2.0).max(MIN_LAT),
            north: (self.center_lat + self.span_lat / 2.0).min(MAX_LAT),
        }
    }
}

/// A candidate tile with its priority score (larger = more important).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredTile {
    /// The candidate address.
    pub address: TileAddress,
    /// Priority score; larger values load first.
    pub importance: f64,
}

/// Strategy that maps a view to scored tile candidates.
///
/// Implementations must be pure with respect to engine state: same view in,
/// same candidates out. The controller calls this once per tick from the
/// layer thread.
pub trait ImportanceModel: Send + Sync + 'static {
    /// Returns the tiles overlapping the view at appropriate detail, each
    /// with an importance score.
    fn tiles_for_view(&self, view: &ViewState) -> Vec<ScoredTile>;

    /// Geographic bounds of a tile. Default: Web Mercator tile bounds.
    fn geo_bounds_for(&self, address: &TileAddress) -> GeoBounds {
        coord::geo_bounds(address)
    }
}

/// Default importance model: projected screen-space area with a falloff by
/// distance from the view center.
///
/// Candidates are the tiles overlapping the view rectangle at the clamped
/// target level. Each scores the fraction of the view it covers, scaled
/// down the further its center sits from the view center, so the scheduler
/// fills the middle of the screen first.
#[derive(Debug, Clone)]
pub struct ScreenAreaImportance {
    min_level: u8,
    max_level: u8,
}

impl ScreenAreaImportance {
    /// Creates a model that clamps candidate levels to `[min_level, max_level]`.
    pub fn new(min_level: u8, max_level: u8) -> Self {
        debug_assert!(min_level <= max_level);
        Self { min_level, max_level }
    }

    /// Picks the scan level: the clamped target, coarsened until the
    /// candidate count fits [`MAX_CANDIDATES`].
    fn scan_level(&self, view: &ViewState) -> u8 {
        let mut level = view.target_level.clamp(self.min_level, self.max_level);
        let bounds = view.bounds();
        loop {
            let n = TileAddress::tiles_across(level) as f64;
            let tiles_x = (bounds.width() / 360.0 * n).ceil() + 1.0;
            // Latitude rows are non-uniform under Mercator; the linear
            // estimate errs high which is the safe direction here.
            let tiles_y = (bounds.height() / 170.0 * n).ceil() + 1.0;
            if (tiles_x * tiles_y) as usize <= MAX_CANDIDATES || level == self.min_level {
                return level;
            }
            level -= 1;
        }
    }
}

impl Default for ScreenAreaImportance {
    fn default() -> Self {
        Self::new(0, 19)
    }
}

impl ImportanceModel for ScreenAreaImportance {
    fn tiles_for_view(&self, view: &ViewState) -> Vec<ScoredTile> {
        let level = self.scan_level(view);
        let bounds = view.bounds();
        let view_area = (bounds.width() * bounds.height()).max(f64::EPSILON);

        // Corner tiles bracket the candidate range at this level.
        let nw = match coord::address_at(bounds.north, bounds.west, level) {
            Ok(a) => a,
            Err(_) => return Vec::new(),
        };
        let se = match coord::address_at(bounds.south, bounds.east, level) {
            Ok(a) => a,
            Err(_) => return Vec::new(),
        };

        let mut scored = Vec::new();
        for x in nw.x..=se.x {
            for y in nw.y..=se.y {
                let address = TileAddress { level, x, y };
                let tile_bounds = coord::geo_bounds(&address);
                let overlap = tile_bounds.intersection_area(&bounds);
                if overlap <= 0.0 {
                    continue;
                }

                let (tile_lat, tile_lon) = tile_bounds.center();
                let dx = (tile_lon - view.center_lon) / bounds.width().max(f64::EPSILON);
                let dy = (tile_lat - view.center_lat) / bounds.height().max(f64::EPSILON);
                let falloff = 1.0 / (1.0 + dx * dx + dy * dy);

                scored.push(ScoredTile {
                    address,
                    importance: overlap / view_area * falloff,
                });
                if scored.len() >= MAX_CANDIDATES {
                    return scored;
                }
            }
        }
        scored
    }
}
