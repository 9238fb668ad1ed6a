//! Raster imagery builder: payload bytes to a textured quad.

use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};

use super::{BuildError, BuiltTile, TileBuilder};
use crate::coord::{self, TileAddress};
use crate::ident::IdentifierAllocator;
use crate::scene::{ChangeOp, ChangeRequest, ComponentObject, Drawable, Texture};

/// Vertex layout: position (lon, lat) + texture coordinate (u, v), f32 LE.
pub const FLOATS_PER_VERTEX: usize = 4;

/// Configuration for [`ImageTileBuilder`].
#[derive(Debug, Clone)]
pub struct ImageTileBuilderConfig {
    /// Base draw priority; the tile level is added so finer tiles draw on
    /// top of their ancestors.
    pub draw_priority_base: i32,
}

impl Default for ImageTileBuilderConfig {
    fn default() -> Self {
        Self { draw_priority_base: 0 }
    }
}

/// Builds one textured quad per tile from PNG/JPEG payload bytes.
///
/// The quad covers the tile's geographic bounds; the decoded RGBA image
/// becomes a texture shared with the drawable by identifier. Identifiers
/// are pre-allocated here so the controller can track the resources before
/// the change requests have drained.
pub struct ImageTileBuilder {
    allocator: Arc<IdentifierAllocator>,
    config: ImageTileBuilderConfig,
}

impl ImageTileBuilder {
    /// Creates a builder drawing identifiers from `allocator`.
    pub fn new(allocator: Arc<IdentifierAllocator>) -> Self {
        Self::with_config(allocator, ImageTileBuilderConfig::default())
    }

    /// Creates a builder with explicit configuration.
    pub fn with_config(allocator: Arc<IdentifierAllocator>, config: ImageTileBuilderConfig) -> Self {
        Self { allocator, config }
    }

    /// Packs the four corner vertices of a tile quad.
    ///
    /// Corner order is NW, NE, SW, SE (triangle-strip order); positions are
    /// degrees, texture coordinates put v=0 at the tile's north edge.
    fn pack_quad(address: &TileAddress) -> Bytes {
        let bounds = coord::geo_bounds(address);
        let corners: [(f64, f64, f32, f32); 4] = [
            (bounds.west, bounds.north, 0.0, 0.0),
            (bounds.east, bounds.north, 1.0, 0.0),
            (bounds.west, bounds.south, 0.0, 1.0),
            (bounds.east, bounds.south, 1.0, 1.0),
        ];

        let mut buf = BytesMut::with_capacity(corners.len() * FLOATS_PER_VERTEX * 4);
        for (lon, lat, u, v) in corners {
            buf.put_f32_le(lon as f32);
            buf.put_f32_le(lat as f32);
            buf.put_f32_le(u);
            buf.put_f32_le(v);
        }
        buf.freeze()
    }
}

impl TileBuilder for ImageTileBuilder {
    fn build(&self, address: TileAddress, data: Bytes) -> Result<BuiltTile, BuildError> {
        if data.is_empty() {
            return Err(BuildError::EmptyPayload(address));
        }

        let decoded = image::load_from_memory(&data).map_err(|e| BuildError::Decode {
            address,
            reason: e.to_string(),
        })?;
        let rgba = decoded.to_rgba8();
        let (width, height) = rgba.dimensions();

        let texture = Texture::new(
            self.allocator.allocate(),
            width,
            height,
            Bytes::from(rgba.into_raw()),
        );
        let drawable = Drawable::new(self.allocator.allocate(), Self::pack_quad(&address), 4)
            .with_texture(texture.id())
            .with_draw_priority(self.config.draw_priority_base + i32::from(address.level))
            .with_level_range(address.level, crate::coord::MAX_LEVEL);

        let mut component = ComponentObject::new(self.allocator.allocate());
        component.add_texture(texture.id());
        component.add_drawable(drawable.id());

        // Texture registers first so the drawable's reference resolves.
        let changes = vec![
            ChangeRequest::new(ChangeOp::AddTexture(texture)),
            ChangeRequest::new(ChangeOp::AddDrawable(drawable)),
        ];

        Ok(BuiltTile { component, changes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::SyntheticFetcher;
    use crate::scene::{ChangeQueue, SceneStore};

    fn builder() -> ImageTileBuilder {
        ImageTileBuilder::new(Arc::new(IdentifierAllocator::new()))
    }

    fn png_payload(address: &TileAddress) -> Bytes {
        SyntheticFetcher::generate(address, 8)
    }

    #[test]
    fn test_build_produces_texture_and_drawable() {
        let address = TileAddress::new(5, 3, 7).unwrap();
        let built = builder().build(address, png_payload(&address)).unwrap();

        assert_eq!(built.component.textures().len(), 1);
        assert_eq!(built.component.drawables().len(), 1);
        assert_eq!(built.changes.len(), 2);
        assert!(matches!(built.changes[0].op(), ChangeOp::AddTexture(_)));
        assert!(matches!(built.changes[1].op(), ChangeOp::AddDrawable(_)));
    }

    #[test]
    fn test_built_changes_apply_cleanly() {
        let address = TileAddress::new(3, 1, 2).unwrap();
        let built = builder().build(address, png_payload(&address)).unwrap();

        let queue = ChangeQueue::new();
        let mut store = SceneStore::new();
        queue.enqueue_all(built.changes);
        let report = queue.drain(&mut store, std::time::Instant::now());

        assert_eq!(report.applied, 2);
        assert!(report.failed.is_empty());
        assert_eq!(store.drawable_count(), 1);
        assert_eq!(store.texture_count(), 1);
    }

    #[test]
    fn test_quad_has_four_vertices() {
        let address = TileAddress::new(2, 1, 1).unwrap();
        let built = builder().build(address, png_payload(&address)).unwrap();

        let ChangeOp::AddDrawable(drawable) = built.changes[1].op() else {
            panic!("expected AddDrawable");
        };
        assert_eq!(drawable.vertex_count(), 4);
        assert_eq!(
            drawable.vertex_data().len(),
            4 * FLOATS_PER_VERTEX * std::mem::size_of::<f32>()
        );
    }

    #[test]
    fn test_draw_priority_tracks_level() {
        let b = builder();
        let coarse_addr = TileAddress::new(2, 0, 0).unwrap();
        let fine_addr = TileAddress::new(9, 0, 0).unwrap();
        let coarse = b.build(coarse_addr, png_payload(&coarse_addr)).unwrap();
        let fine = b.build(fine_addr, png_payload(&fine_addr)).unwrap();

        let priority = |built: &BuiltTile| {
            let ChangeOp::AddDrawable(d) = built.changes[1].op() else {
                panic!("expected AddDrawable");
            };
            d.draw_priority()
        };
        // Finer tiles draw on top of their ancestors.
        assert!(priority(&fine) > priority(&coarse));
    }

    #[test]
    fn test_drawable_hidden_below_own_level() {
        let address = TileAddress::new(6, 10, 10).unwrap();
        let built = builder().build(address, png_payload(&address)).unwrap();

        let ChangeOp::AddDrawable(d) = built.changes[1].op() else {
            panic!("expected AddDrawable");
        };
        assert!(!d.visible_at(5));
        assert!(d.visible_at(6));
        assert!(d.visible_at(12));
    }

    #[test]
    fn test_garbage_payload_is_decode_error() {
        let address = TileAddress::new(4, 2, 2).unwrap();
        let result = builder().build(address, Bytes::from_static(b"not an image"));
        assert!(matches!(result.unwrap_err(), BuildError::Decode { .. }));
    }

    #[test]
    fn test_empty_payload_is_rejected() {
        let address = TileAddress::new(4, 2, 2).unwrap();
        let result = builder().build(address, Bytes::new());
        assert!(matches!(result.unwrap_err(), BuildError::EmptyPayload(_)));
    }

    #[test]
    fn test_texture_dimensions_match_source() {
        let address = TileAddress::new(1, 0, 0).unwrap();
        let built = builder().build(address, png_payload(&address)).unwrap();

        let ChangeOp::AddTexture(texture) = built.changes[0].op() else {
            panic!("expected AddTexture");
        };
        assert_eq!(texture.width(), 8);
        assert_eq!(texture.height(), 8);
        assert_eq!(texture.size_bytes(), 8 * 8 * 4);
    }
}
