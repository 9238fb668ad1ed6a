//! GPU-facing resource types: drawables and textures.
//!
//! A [`Drawable`] is a renderable geometry bundle; a [`Texture`] is an image
//! resource shared between drawables. Both are owned exclusively by the
//! [`SceneStore`](crate::scene::SceneStore) once registered and are referred
//! to from outside only by [`Identifier`]. Destruction is always deferred
//! through a remove change request, never a direct delete, so GPU resources
//! are freed only at a safe synchronization point.

use bytes::Bytes;

use crate::coord::MAX_LEVEL;
use crate::ident::Identifier;

/// A renderable geometry bundle.
///
/// Drawables register disabled; the display controller switches them on with
/// an enable change request once their tile becomes active. This keeps a
/// freshly built tile invisible until the scheduler decides it should
/// contribute to the frame.
#[derive(Debug, Clone)]
pub struct Drawable {
    id: Identifier,
    vertex_data: Bytes,
    vertex_count: u32,
    draw_priority: i32,
    min_level: u8,
    max_level: u8,
    texture: Identifier,
    enabled: bool,
}

impl Drawable {
    /// Creates a drawable with the given identity and geometry.
    ///
    /// The drawable starts disabled, untextured, at priority 0, visible at
    /// every level.
    pub fn new(id: Identifier, vertex_data: Bytes, vertex_count: u32) -> Self {
        Self {
            id,
            vertex_data,
            vertex_count,
            draw_priority: 0,
            min_level: 0,
            max_level: MAX_LEVEL,
            texture: Identifier::EMPTY,
            enabled: false,
        }
    }

    /// Sets the texture this drawable samples from.
    pub fn with_texture(mut self, texture: Identifier) -> Self {
        self.texture = texture;
        self
    }

    /// Sets the draw priority (higher draws later, on top).
    pub fn with_draw_priority(mut self, priority: i32) -> Self {
        self.draw_priority = priority;
        self
    }

    /// Restricts the detail levels at which this drawable is visible.
    pub fn with_level_range(mut self, min_level: u8, max_level: u8) -> Self {
        self.min_level = min_level;
        self.max_level = max_level;
        self
    }

    /// The drawable's identifier.
    pub fn id(&self) -> Identifier {
        self.id
    }

    /// Raw vertex payload.
    pub fn vertex_data(&self) -> &Bytes {
        &self.vertex_data
    }

    /// Number of vertices in the payload.
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// Current draw priority.
    pub fn draw_priority(&self) -> i32 {
        self.draw_priority
    }

    /// Texture reference, [`Identifier::EMPTY`] if untextured.
    pub fn texture(&self) -> Identifier {
        self.texture
    }

    /// Whether the drawable currently contributes to the frame.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether the drawable is visible at the given detail level.
    pub fn visible_at(&self, level: u8) -> bool {
        level >= self.min_level && level <= self.max_level
    }

    /// Approximate resident size in bytes.
    pub fn size_bytes(&self) -> u64 {
        self.vertex_data.len() as u64
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub(crate) fn set_draw_priority(&mut self, priority: i32) {
        self.draw_priority = priority;
    }
}

/// An image resource shared between drawables.
///
/// The scene store reference-counts textures against the drawables that
/// sample them; a texture asked to go away while still referenced is retired
/// and freed when the last referencing drawable is removed.
#[derive(Debug, Clone)]
pub struct Texture {
    id: Identifier,
    width: u32,
    height: u32,
    data: Bytes,
}

impl Texture {
    /// Creates a texture from tightly packed RGBA8 data.
    pub fn new(id: Identifier, width: u32, height: u32, data: Bytes) -> Self {
        debug_assert_eq!(
            data.len() as u64,
            width as u64 * height as u64 * 4,
            "texture data must be tightly packed RGBA8"
        );
        Self { id, width, height, data }
    }

    /// The texture's identifier.
    pub fn id(&self) -> Identifier {
        self.id
    }

    /// Width in texels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in texels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw RGBA8 payload.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Resident size in bytes.
    pub fn size_bytes(&self) -> u64 {
        self.data.len() as u64
    }
}
