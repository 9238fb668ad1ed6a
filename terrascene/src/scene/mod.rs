//! The GPU-facing scene: resources, change requests, and the store.
//!
//! This module implements the ownership and transfer protocol for GPU
//! resources. Background work (tile builders, the display controller) never
//! touches the [`SceneStore`] directly; it produces [`ChangeRequest`]s on
//! the [`ChangeQueue`], which the layer thread drains at a frame boundary.
//! That drain is the only place resource lifetime changes, so an identifier
//! can never dangle: once a remove request has been applied, nothing in the
//! scheduler still holds that identifier.

mod changes;
mod component;
mod drawable;
mod store;

pub use changes::{
    ChangeOp, ChangeQueue, ChangeRequest, DrainReport, FailedChange, PreExecuteHook,
};
pub use component::ComponentObject;
pub use drawable::{Drawable, Texture};
pub use store::{SceneError, SceneStore};
