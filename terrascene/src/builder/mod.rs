//! Conversion of raw tile payloads into scene resources.
//!
//! A [`TileBuilder`] is a pure function from the scheduler's perspective: it
//! takes a tile address and the fetched payload bytes and produces a
//! [`BuiltTile`]: the drawables and textures representing that tile plus
//! the add change requests that register them. Builders run on blocking
//! worker threads and never touch the scene store; only the controller
//! enqueues the produced requests, which is what makes a stale build result
//! safe to drop on the floor.

mod image;

pub use self::image::{ImageTileBuilder, ImageTileBuilderConfig};

use bytes::Bytes;
use thiserror::Error;

use crate::coord::TileAddress;
use crate::scene::{ChangeRequest, ComponentObject};

/// Errors from converting a tile payload into resources.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The payload was not a decodable image.
    #[error("Failed to decode payload for {address}: {reason}")]
    Decode {
        /// Tile whose payload was rejected.
        address: TileAddress,
        /// Decoder error description.
        reason: String,
    },

    /// The payload was empty.
    #[error("Empty payload for {0}")]
    EmptyPayload(TileAddress),
}

/// The renderable output of one tile build.
///
/// `component` records the produced resource identifiers for later bulk
/// removal; `changes` contains the add requests, in registration order
/// (textures before the drawables that sample them). Nothing here has
/// touched the scene yet.
pub struct BuiltTile {
    /// Identifiers of everything this build produced.
    pub component: ComponentObject,
    /// Add requests, in safe registration order.
    pub changes: Vec<ChangeRequest>,
}

impl std::fmt::Debug for BuiltTile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltTile")
            .field("drawables", &self.component.drawables().len())
            .field("textures", &self.component.textures().len())
            .field("changes", &self.changes.len())
            .finish()
    }
}

/// Capability for turning payload bytes into scene resources.
///
/// Implementations must be safe to call concurrently from worker threads
/// and must not hold mutable state beyond read-only style/configuration.
pub trait TileBuilder: Send + Sync + 'static {
    /// Builds the resources representing one tile.
    fn build(&self, address: TileAddress, data: Bytes) -> Result<BuiltTile, BuildError>;
}
