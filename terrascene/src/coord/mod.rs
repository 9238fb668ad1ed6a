//! Quad-tree tile address space and geographic conversions.
//!
//! Provides the [`TileAddress`] identifier type used throughout the scheduler
//! and the conversions between geographic coordinates (latitude/longitude)
//! and Web Mercator tile addresses.

mod types;

pub use types::{
    AddressError, GeoBounds, TileAddress, MAX_LAT, MAX_LEVEL, MAX_LON, MIN_LAT, MIN_LON,
};

use std::f64::consts::PI;

/// Converts geographic coordinates to the containing tile address.
///
/// # Arguments
///
/// * `lat` - Latitude in degrees (-85.05112878 to 85.05112878)
/// * `lon` - Longitude in degrees (-180.0 to 180.0)
/// * `level` - Subdivision level (0 to 24)
///
/// # Returns
///
/// A `Result` containing the tile address or an error if inputs are invalid.
#[inline]
pub fn address_at(lat: f64, lon: f64, level: u8) -> Result<TileAddress, AddressError> {
    if !(MIN_LAT..=MAX_LAT).contains(&lat) {
        return Err(AddressError::InvalidLatitude(lat));
    }
    if !(MIN_LON..=MAX_LON).contains(&lon) {
        return Err(AddressError::InvalidLongitude(lon));
    }
    if level > MAX_LEVEL {
        return Err(AddressError::InvalidLevel(level));
    }

    let n = TileAddress::tiles_across(level);

    // Longitude maps linearly onto columns.
    let x = (((lon + 180.0) / 360.0 * n as f64) as u32).min(n - 1);

    // Latitude maps through the Web Mercator projection onto rows.
    let lat_rad = lat * PI / 180.0;
    let y = ((((1.0 - lat_rad.tan().asinh() / PI) / 2.0) * n as f64) as u32).min(n - 1);

    Ok(TileAddress { level, x, y })
}

/// Returns the geographic bounding box of a tile.
///
/// The northern/western edges come from the tile's own corner; the
/// southern/eastern edges from the next tile over, so adjacent tiles share
/// edges exactly.
#[inline]
pub fn geo_bounds(address: &TileAddress) -> GeoBounds {
    let n = TileAddress::tiles_across(address.level) as f64;

    let west = address.x as f64 / n * 360.0 - 180.0;
    let east = (address.x + 1) as f64 / n * 360.0 - 180.0;

    let north = mercator_row_to_lat(address.y as f64 / n);
    let south = mercator_row_to_lat((address.y + 1) as f64 / n);

    GeoBounds { west, south, east, north }
}

/// Inverse Web Mercator: fractional row position (0 = north edge) to
/// latitude in degrees.
#[inline]
fn mercator_row_to_lat(y: f64) -> f64 {
    let lat_rad = (PI * (1.0 - 2.0 * y)).sinh().atan();
    lat_rad * 180.0 / PI
}
