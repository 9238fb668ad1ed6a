//! Component objects: resource bundles for coordinated removal.
//!
//! A [`ComponentObject`] groups the drawable and texture identifiers created
//! to represent one user-visible thing (one tile's contents, one overlay
//! layer). It holds identifiers only, never resources; its single job is to
//! produce the remove change requests that take the whole bundle out of the
//! scene in the right order.

use std::time::Instant;

use crate::ident::Identifier;
use crate::scene::changes::{ChangeOp, ChangeRequest};

/// A bundle of scene resource identifiers owned by one subsystem.
#[derive(Debug, Clone, Default)]
pub struct ComponentObject {
    id: Identifier,
    drawables: Vec<Identifier>,
    textures: Vec<Identifier>,
}

impl ComponentObject {
    /// Creates an empty component with the given identity.
    pub fn new(id: Identifier) -> Self {
        Self {
            id,
            drawables: Vec::new(),
            textures: Vec::new(),
        }
    }

    /// The component's identifier.
    pub fn id(&self) -> Identifier {
        self.id
    }

    /// Records a drawable as part of this component.
    pub fn add_drawable(&mut self, id: Identifier) {
        self.drawables.push(id);
    }

    /// Records a texture as part of this component.
    pub fn add_texture(&mut self, id: Identifier) {
        self.textures.push(id);
    }

    /// Drawable identifiers in this component.
    pub fn drawables(&self) -> &[Identifier] {
        &self.drawables
    }

    /// Texture identifiers in this component.
    pub fn textures(&self) -> &[Identifier] {
        &self.textures
    }

    /// True if the component references no resources.
    pub fn is_empty(&self) -> bool {
        self.drawables.is_empty() && self.textures.is_empty()
    }

    /// Requests that enable or disable every drawable in the component.
    pub fn enable_requests(&self, enabled: bool) -> Vec<ChangeRequest> {
        self.drawables
            .iter()
            .map(|&id| ChangeRequest::new(ChangeOp::EnableDrawable { id, enabled }))
            .collect()
    }

    /// Requests that remove every resource in the component.
    ///
    /// Drawables are removed before textures so texture refcounts reach zero
    /// by the time the texture removals apply. With `when` set, the whole
    /// bundle is held back until that time (fade-out before removal).
    pub fn removal_requests(&self, when: Option<Instant>) -> Vec<ChangeRequest> {
        let make = |op: ChangeOp| match when {
            Some(when) => ChangeRequest::at(op, when),
            None => ChangeRequest::new(op),
        };
        self.drawables
            .iter()
            .map(|&id| make(ChangeOp::RemoveDrawable(id)))
            .chain(self.textures.iter().map(|&id| make(ChangeOp::RemoveTexture(id))))
            .collect()
    }
}
