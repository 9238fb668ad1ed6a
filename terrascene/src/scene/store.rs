//! The authoritative registry of GPU-resident resources.
//!
//! The [`SceneStore`] owns every drawable and texture currently on the GPU.
//! It is mutated only by draining the [`ChangeQueue`](crate::scene::ChangeQueue)
//! on the layer thread; everything else reads it through immutable accessors.
//! Texture lifetimes are reference-counted against the drawables that sample
//! them, and total resident bytes are tracked against an optional memory
//! budget.

use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, trace};

use crate::ident::Identifier;
use crate::scene::changes::ChangeOp;
use crate::scene::drawable::{Drawable, Texture};

/// Errors raised while applying a change request.
///
/// `UnknownDrawable`/`UnknownTexture`/duplicate variants are the
/// invariant-violation class: they indicate a producer bug (double-free or
/// use of a never-registered identifier) and debug-assert in test builds.
/// `ResourceExhaustion` is an operational condition the controller recovers
/// from by evicting low-importance tiles.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SceneError {
    /// Admitting the resource would exceed the memory budget.
    #[error("Scene memory budget exceeded: need {needed} bytes, {available} available")]
    ResourceExhaustion {
        /// Bytes the rejected resource needs.
        needed: u64,
        /// Bytes left under the budget.
        available: u64,
    },

    /// Operation targeted a drawable that is not registered.
    #[error("Unknown drawable: {0}")]
    UnknownDrawable(Identifier),

    /// Operation targeted a texture that is not registered.
    #[error("Unknown texture: {0}")]
    UnknownTexture(Identifier),

    /// A drawable with this identifier is already registered.
    #[error("Duplicate drawable: {0}")]
    DuplicateDrawable(Identifier),

    /// A texture with this identifier is already registered.
    #[error("Duplicate texture: {0}")]
    DuplicateTexture(Identifier),
}

impl SceneError {
    /// True for the recoverable out-of-memory condition.
    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(self, SceneError::ResourceExhaustion { .. })
    }
}

struct TextureEntry {
    texture: Texture,
    /// Number of registered drawables sampling this texture.
    refs: usize,
    /// A remove request arrived while still referenced; free on last unref.
    retired: bool,
}

/// The GPU-facing resource registry.
///
/// # Thread model
///
/// Touched only from the layer thread (or the render thread during the
/// change-queue handoff); needs no internal locking.
pub struct SceneStore {
    drawables: HashMap<Identifier, Drawable>,
    textures: HashMap<Identifier, TextureEntry>,
    resident_bytes: u64,
    memory_budget: Option<u64>,
}

impl SceneStore {
    /// Creates a store with no memory budget.
    pub fn new() -> Self {
        Self {
            drawables: HashMap::new(),
            textures: HashMap::new(),
            resident_bytes: 0,
            memory_budget: None,
        }
    }

    /// Creates a store that rejects additions beyond `budget_bytes`.
    pub fn with_memory_budget(budget_bytes: u64) -> Self {
        Self {
            memory_budget: Some(budget_bytes),
            ..Self::new()
        }
    }

    /// Applies one operation. On failure the operation is handed back so the
    /// caller can recover (evict and retry).
    pub(crate) fn apply(&mut self, op: ChangeOp) -> Result<(), (ChangeOp, SceneError)> {
        match op {
            ChangeOp::AddDrawable(drawable) => self.add_drawable(drawable),
            ChangeOp::RemoveDrawable(id) => {
                self.remove_drawable(id).map_err(|e| (ChangeOp::RemoveDrawable(id), e))
            }
            ChangeOp::EnableDrawable { id, enabled } => match self.drawables.get_mut(&id) {
                Some(d) => {
                    d.set_enabled(enabled);
                    Ok(())
                }
                None => {
                    debug_assert!(false, "enable of unknown drawable {id}");
                    Err((
                        ChangeOp::EnableDrawable { id, enabled },
                        SceneError::UnknownDrawable(id),
                    ))
                }
            },
            ChangeOp::SetDrawPriority { id, priority } => match self.drawables.get_mut(&id) {
                Some(d) => {
                    d.set_draw_priority(priority);
                    Ok(())
                }
                None => Err((
                    ChangeOp::SetDrawPriority { id, priority },
                    SceneError::UnknownDrawable(id),
                )),
            },
            ChangeOp::AddTexture(texture) => self.add_texture(texture),
            ChangeOp::RemoveTexture(id) => {
                self.remove_texture(id).map_err(|e| (ChangeOp::RemoveTexture(id), e))
            }
        }
    }

    fn add_drawable(&mut self, drawable: Drawable) -> Result<(), (ChangeOp, SceneError)> {
        let id = drawable.id();
        if self.drawables.contains_key(&id) {
            debug_assert!(false, "duplicate drawable {id}");
            return Err((
                ChangeOp::AddDrawable(drawable),
                SceneError::DuplicateDrawable(id),
            ));
        }
        if let Err(e) = self.check_budget(drawable.size_bytes()) {
            return Err((ChangeOp::AddDrawable(drawable), e));
        }
        let texture = drawable.texture();
        if !texture.is_empty() {
            match self.textures.get_mut(&texture) {
                Some(entry) => entry.refs += 1,
                None => {
                    return Err((
                        ChangeOp::AddDrawable(drawable),
                        SceneError::UnknownTexture(texture),
                    ))
                }
            }
        }
        self.resident_bytes += drawable.size_bytes();
        trace!(drawable = %id, bytes = drawable.size_bytes(), "Drawable registered");
        self.drawables.insert(id, drawable);
        Ok(())
    }

    fn remove_drawable(&mut self, id: Identifier) -> Result<(), SceneError> {
        let drawable = match self.drawables.remove(&id) {
            Some(d) => d,
            None => {
                debug_assert!(false, "remove of unknown drawable {id}");
                return Err(SceneError::UnknownDrawable(id));
            }
        };
        self.resident_bytes = self.resident_bytes.saturating_sub(drawable.size_bytes());

        let texture = drawable.texture();
        if !texture.is_empty() {
            let free_now = match self.textures.get_mut(&texture) {
                Some(entry) => {
                    entry.refs = entry.refs.saturating_sub(1);
                    entry.retired && entry.refs == 0
                }
                None => false,
            };
            if free_now {
                if let Some(entry) = self.textures.remove(&texture) {
                    self.resident_bytes = self
                        .resident_bytes
                        .saturating_sub(entry.texture.size_bytes());
                    debug!(texture = %texture, "Retired texture freed on last unref");
                }
            }
        }
        trace!(drawable = %id, "Drawable removed");
        Ok(())
    }

    fn add_texture(&mut self, texture: Texture) -> Result<(), (ChangeOp, SceneError)> {
        let id = texture.id();
        if self.textures.contains_key(&id) {
            debug_assert!(false, "duplicate texture {id}");
            return Err((
                ChangeOp::AddTexture(texture),
                SceneError::DuplicateTexture(id),
            ));
        }
        if let Err(e) = self.check_budget(texture.size_bytes()) {
            return Err((ChangeOp::AddTexture(texture), e));
        }
        self.resident_bytes += texture.size_bytes();
        trace!(texture = %id, bytes = texture.size_bytes(), "Texture registered");
        self.textures.insert(
            id,
            TextureEntry { texture, refs: 0, retired: false },
        );
        Ok(())
    }

    fn remove_texture(&mut self, id: Identifier) -> Result<(), SceneError> {
        let refs = match self.textures.get(&id) {
            Some(e) => e.refs,
            None => {
                debug_assert!(false, "remove of unknown texture {id}");
                return Err(SceneError::UnknownTexture(id));
            }
        };
        if refs == 0 {
            if let Some(entry) = self.textures.remove(&id) {
                self.resident_bytes = self
                    .resident_bytes
                    .saturating_sub(entry.texture.size_bytes());
                trace!(texture = %id, "Texture removed");
            }
        } else if let Some(entry) = self.textures.get_mut(&id) {
            // Still sampled by live drawables; free when the last goes away.
            entry.retired = true;
            debug!(texture = %id, refs, "Texture retired, free deferred");
        }
        Ok(())
    }

    fn check_budget(&self, needed: u64) -> Result<(), SceneError> {
        if let Some(budget) = self.memory_budget {
            let available = budget.saturating_sub(self.resident_bytes);
            if needed > available {
                return Err(SceneError::ResourceExhaustion { needed, available });
            }
        }
        Ok(())
    }

    /// Looks up a drawable by identifier.
    pub fn drawable(&self, id: Identifier) -> Option<&Drawable> {
        self.drawables.get(&id)
    }

    /// Looks up a texture by identifier.
    pub fn texture(&self, id: Identifier) -> Option<&Texture> {
        self.textures.get(&id).map(|e| &e.texture)
    }

    /// True if the drawable is registered.
    pub fn contains_drawable(&self, id: Identifier) -> bool {
        self.drawables.contains_key(&id)
    }

    /// True if the texture is registered (including retired-but-referenced).
    pub fn contains_texture(&self, id: Identifier) -> bool {
        self.textures.contains_key(&id)
    }

    /// Number of registered drawables.
    pub fn drawable_count(&self) -> usize {
        self.drawables.len()
    }

    /// Number of registered textures.
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Total bytes of resident vertex and texel data.
    pub fn resident_bytes(&self) -> u64 {
        self.resident_bytes
    }

    /// The configured memory budget, if any.
    pub fn memory_budget(&self) -> Option<u64> {
        self.memory_budget
    }

    /// The renderer's view of the scene: enabled drawables visible at the
    /// given detail level, sorted by draw priority then identifier.
    pub fn draw_list(&self, level: u8) -> Vec<&Drawable> {
        let mut list: Vec<&Drawable> = self
            .drawables
            .values()
            .filter(|d| d.is_enabled() && d.visible_at(level))
            .collect();
        list.sort_by_key(|d| (d.draw_priority(), d.id()));
        list
    }
}

impl Default for SceneStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SceneStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneStore")
            .field("drawables", &self.drawables.len())
            .field("textures", &self.textures.len())
            .field("resident_bytes", &self.resident_bytes)
            .field("memory_budget", &self.memory_budget)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::IdentifierAllocator;
    use bytes::Bytes;

    fn make_texture(alloc: &IdentifierAllocator) -> Texture {
        Texture::new(alloc.allocate(), 2, 2, Bytes::from(vec![0u8; 16]))
    }

    fn make_drawable(alloc: &IdentifierAllocator, texture: Identifier) -> Drawable {
        Drawable::new(alloc.allocate(), Bytes::from_static(&[0u8; 64]), 4).with_texture(texture)
    }

    #[test]
    fn test_add_and_remove_drawable() {
        let alloc = IdentifierAllocator::new();
        let mut store = SceneStore::new();

        let d = Drawable::new(alloc.allocate(), Bytes::from_static(&[0u8; 64]), 4);
        let id = d.id();

        store.apply(ChangeOp::AddDrawable(d)).unwrap();
        assert!(store.contains_drawable(id));
        assert_eq!(store.resident_bytes(), 64);

        store.apply(ChangeOp::RemoveDrawable(id)).unwrap();
        assert!(!store.contains_drawable(id));
        assert_eq!(store.resident_bytes(), 0);
    }

    #[test]
    fn test_drawable_referencing_missing_texture_is_rejected() {
        let alloc = IdentifierAllocator::new();
        let mut store = SceneStore::new();

        let d = make_drawable(&alloc, alloc.allocate());
        let (_, error) = store.apply(ChangeOp::AddDrawable(d)).unwrap_err();
        assert!(matches!(error, SceneError::UnknownTexture(_)));
    }

    #[test]
    fn test_texture_refcounting_defers_free() {
        let alloc = IdentifierAllocator::new();
        let mut store = SceneStore::new();

        let t = make_texture(&alloc);
        let tex_id = t.id();
        store.apply(ChangeOp::AddTexture(t)).unwrap();

        let d1 = make_drawable(&alloc, tex_id);
        let d2 = make_drawable(&alloc, tex_id);
        let (id1, id2) = (d1.id(), d2.id());
        store.apply(ChangeOp::AddDrawable(d1)).unwrap();
        store.apply(ChangeOp::AddDrawable(d2)).unwrap();

        // Remove request while two drawables still sample it: deferred.
        store.apply(ChangeOp::RemoveTexture(tex_id)).unwrap();
        assert!(store.contains_texture(tex_id));

        store.apply(ChangeOp::RemoveDrawable(id1)).unwrap();
        assert!(store.contains_texture(tex_id));

        // Last unref frees the retired texture.
        store.apply(ChangeOp::RemoveDrawable(id2)).unwrap();
        assert!(!store.contains_texture(tex_id));
        assert_eq!(store.resident_bytes(), 0);
    }

    #[test]
    fn test_unreferenced_texture_removes_immediately() {
        let alloc = IdentifierAllocator::new();
        let mut store = SceneStore::new();

        let t = make_texture(&alloc);
        let id = t.id();
        store.apply(ChangeOp::AddTexture(t)).unwrap();
        store.apply(ChangeOp::RemoveTexture(id)).unwrap();
        assert!(!store.contains_texture(id));
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "unknown drawable"))]
    fn test_remove_unknown_drawable_is_invariant_violation() {
        let alloc = IdentifierAllocator::new();
        let mut store = SceneStore::new();
        let result = store.apply(ChangeOp::RemoveDrawable(alloc.allocate()));
        // In release builds the error is reported instead of asserting.
        assert!(matches!(
            result.unwrap_err().1,
            SceneError::UnknownDrawable(_)
        ));
    }

    #[test]
    fn test_memory_budget_rejects_oversized_add() {
        let alloc = IdentifierAllocator::new();
        let mut store = SceneStore::with_memory_budget(100);

        let small = Drawable::new(alloc.allocate(), Bytes::from_static(&[0u8; 64]), 4);
        store.apply(ChangeOp::AddDrawable(small)).unwrap();

        let big = Drawable::new(alloc.allocate(), Bytes::from_static(&[0u8; 64]), 4);
        let (_, error) = store.apply(ChangeOp::AddDrawable(big)).unwrap_err();
        assert_eq!(
            error,
            SceneError::ResourceExhaustion { needed: 64, available: 36 }
        );
        assert!(error.is_resource_exhaustion());
    }

    #[test]
    fn test_budget_frees_on_removal() {
        let alloc = IdentifierAllocator::new();
        let mut store = SceneStore::with_memory_budget(64);

        let d = Drawable::new(alloc.allocate(), Bytes::from_static(&[0u8; 64]), 4);
        let id = d.id();
        store.apply(ChangeOp::AddDrawable(d)).unwrap();

        let d2 = Drawable::new(alloc.allocate(), Bytes::from_static(&[0u8; 64]), 4);
        assert!(store.apply(ChangeOp::AddDrawable(d2)).is_err());

        store.apply(ChangeOp::RemoveDrawable(id)).unwrap();
        let d3 = Drawable::new(alloc.allocate(), Bytes::from_static(&[0u8; 64]), 4);
        store.apply(ChangeOp::AddDrawable(d3)).unwrap();
    }

    #[test]
    fn test_draw_list_filters_and_sorts() {
        let alloc = IdentifierAllocator::new();
        let mut store = SceneStore::new();

        let back = Drawable::new(alloc.allocate(), Bytes::from_static(&[0u8; 16]), 1)
            .with_draw_priority(0);
        let front = Drawable::new(alloc.allocate(), Bytes::from_static(&[0u8; 16]), 1)
            .with_draw_priority(10);
        let hidden = Drawable::new(alloc.allocate(), Bytes::from_static(&[0u8; 16]), 1)
            .with_level_range(5, 8);

        let (back_id, front_id, hidden_id) = (back.id(), front.id(), hidden.id());
        store.apply(ChangeOp::AddDrawable(front)).unwrap();
        store.apply(ChangeOp::AddDrawable(back)).unwrap();
        store.apply(ChangeOp::AddDrawable(hidden)).unwrap();
        for id in [back_id, front_id, hidden_id] {
            store
                .apply(ChangeOp::EnableDrawable { id, enabled: true })
                .unwrap();
        }

        let list = store.draw_list(3);
        let ids: Vec<_> = list.iter().map(|d| d.id()).collect();
        // Level 3 excludes the 5..=8 drawable; priority sorts back before front.
        assert_eq!(ids, vec![back_id, front_id]);

        let list = store.draw_list(6);
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn test_set_draw_priority_reorders_draw_list() {
        let alloc = IdentifierAllocator::new();
        let mut store = SceneStore::new();

        let a = Drawable::new(alloc.allocate(), Bytes::from_static(&[0u8; 16]), 1)
            .with_draw_priority(1);
        let b = Drawable::new(alloc.allocate(), Bytes::from_static(&[0u8; 16]), 1)
            .with_draw_priority(2);
        let (a_id, b_id) = (a.id(), b.id());
        store.apply(ChangeOp::AddDrawable(a)).unwrap();
        store.apply(ChangeOp::AddDrawable(b)).unwrap();
        for id in [a_id, b_id] {
            store
                .apply(ChangeOp::EnableDrawable { id, enabled: true })
                .unwrap();
        }

        store
            .apply(ChangeOp::SetDrawPriority { id: a_id, priority: 5 })
            .unwrap();
        let ids: Vec<_> = store.draw_list(0).iter().map(|d| d.id()).collect();
        assert_eq!(ids, vec![b_id, a_id]);
    }

    #[test]
    fn test_disabled_drawables_not_in_draw_list() {
        let alloc = IdentifierAllocator::new();
        let mut store = SceneStore::new();

        let d = Drawable::new(alloc.allocate(), Bytes::from_static(&[0u8; 16]), 1);
        store.apply(ChangeOp::AddDrawable(d)).unwrap();
        assert!(store.draw_list(0).is_empty());
    }
}
