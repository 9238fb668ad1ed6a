//! Advisory per-tile lifecycle events.
//!
//! The display controller reports tile lifecycle transitions over a channel
//! for UI-layer consumption (progress indicators, diagnostics overlays).
//! Events are emitted from the layer thread and are purely advisory: a slow
//! or dropped subscriber never blocks or fails the engine.
//!
//! # Example
//!
//! ```
//! use terrascene::events::{event_channel, TileEvent};
//! use terrascene::coord::TileAddress;
//!
//! let (sender, mut receiver) = event_channel();
//! sender.emit(TileEvent::LoadStarted { address: TileAddress::root() });
//! assert!(matches!(receiver.try_recv(), Ok(TileEvent::LoadStarted { .. })));
//! ```

use tokio::sync::mpsc;

use crate::coord::TileAddress;

/// A tile lifecycle notification.
#[derive(Debug, Clone, PartialEq)]
pub enum TileEvent {
    /// A fetch was issued for the tile.
    LoadStarted {
        /// The tile being loaded.
        address: TileAddress,
    },
    /// The tile's resources were built and registered.
    LoadCompleted {
        /// The tile that finished loading.
        address: TileAddress,
    },
    /// A fetch or build failed; the tile will be retried or parked.
    LoadFailed {
        /// The tile that failed.
        address: TileAddress,
        /// Human-readable failure description.
        error: String,
    },
    /// The tile's resources were released.
    Unloaded {
        /// The tile that went away.
        address: TileAddress,
    },
    /// A full reset was requested; every tile reloads.
    Refreshed,
}

/// Sending half of the event stream.
///
/// Cheap to clone; emitting to a closed or absent channel is a silent no-op.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: Option<mpsc::UnboundedSender<TileEvent>>,
}

impl EventSender {
    /// A sender with no subscriber; every emit is dropped.
    pub fn disconnected() -> Self {
        Self { tx: None }
    }

    /// Emits an event, ignoring a closed or absent subscriber.
    pub fn emit(&self, event: TileEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

/// Creates a connected event channel.
pub fn event_channel() -> (EventSender, mpsc::UnboundedReceiver<TileEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx: Some(tx) }, rx)
}
