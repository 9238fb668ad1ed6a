//! The `probe` command: tile math for a geographic point.

use std::error::Error;

use clap::Args;

use terrascene::coord::{self, TileAddress};

/// Arguments for the `probe` command.
#[derive(Debug, Args)]
pub struct ProbeArgs {
    /// Latitude in degrees.
    #[arg(allow_hyphen_values = true)]
    pub lat: f64,

    /// Longitude in degrees.
    #[arg(allow_hyphen_values = true)]
    pub lon: f64,

    /// Detail level.
    #[arg(default_value_t = 12)]
    pub level: u8,
}

/// Prints the tile containing the point, its bounds, and its neighbors in
/// the tree.
pub fn run(args: ProbeArgs) -> Result<(), Box<dyn Error>> {
    let address = coord::address_at(args.lat, args.lon, args.level)?;
    let bounds = coord::geo_bounds(&address);

    println!("point:    {:.6}, {:.6}", args.lat, args.lon);
    println!("tile:     {}", address);
    println!(
        "bounds:   {:.6}..{:.6} lon, {:.6}..{:.6} lat",
        bounds.west, bounds.east, bounds.south, bounds.north
    );
    println!(
        "size:     {:.6} x {:.6} degrees",
        bounds.width(),
        bounds.height()
    );

    match address.parent() {
        Some(parent) => println!("parent:   {}", parent),
        None => println!("parent:   (root)"),
    }
    if address.level < coord::MAX_LEVEL {
        let children = address.children();
        println!(
            "children: {} {} {} {}",
            children[0], children[1], children[2], children[3]
        );
    }

    let across = TileAddress::tiles_across(args.level);
    println!("grid:     {}x{} tiles at level {}", across, across, args.level);

    Ok(())
}
