//! Terrascene - quad-tree tile streaming for interactive globe rendering.
//!
//! This library implements the scheduling core of a streaming map/globe
//! engine: given a camera view it decides which tiles of the world are
//! needed, fetches and builds them asynchronously, turns them into
//! GPU-facing resources, and retires them when the view moves on, all
//! while confining scene mutation to a single layer thread that applies
//! queued changes at frame boundaries.
//!
//! # Architecture
//!
//! ```text
//! camera ──► LayerThread ──► QuadDisplayController ──► TileFetcher (async)
//!                │                    ▲                      │
//!                │                    │ generation-checked   ▼
//!                │                    └─────────────── TileBuilder (worker)
//!                ▼                                           │
//!            SceneStore ◄──── ChangeQueue ◄──────────────────┘
//!            (drain at frame boundary)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use terrascene::app::{EngineConfig, GlobeEngine};
//! use terrascene::builder::ImageTileBuilder;
//! use terrascene::ident::IdentifierAllocator;
//! use terrascene::loader::SyntheticFetcher;
//! use terrascene::view::ViewState;
//!
//! let fetcher = Arc::new(SyntheticFetcher::new());
//! let builder = Arc::new(ImageTileBuilder::new(Arc::new(IdentifierAllocator::new())));
//! let engine = GlobeEngine::start(EngineConfig::default(), fetcher, builder)?;
//!
//! // Once per frame:
//! engine.layer.tick(ViewState::new(40.7, -74.0, 0.5, 0.8, 12));
//! ```

pub mod app;
pub mod builder;
pub mod coord;
pub mod events;
pub mod ident;
pub mod layer;
pub mod loader;
pub mod quad;
pub mod scene;
pub mod telemetry;
pub mod view;
