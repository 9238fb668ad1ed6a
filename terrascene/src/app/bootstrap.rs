//! Engine assembly and lifecycle.
//!
//! [`GlobeEngine::start`] wires the identifier allocator, scene store,
//! change queue, display controller, and layer thread together from an
//! [`EngineConfig`] and the injected capability objects (fetcher, builder,
//! optionally a custom importance model), and returns an [`EngineHandle`]
//! the platform layer drives.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::app::config::EngineConfig;
use crate::app::error::EngineError;
use crate::builder::TileBuilder;
use crate::events::{event_channel, TileEvent};
use crate::layer::{LayerHandle, LayerThread};
use crate::loader::{completion_channel, TileFetcher};
use crate::quad::QuadDisplayController;
use crate::scene::{ChangeQueue, SceneStore};
use crate::telemetry::{EngineMetrics, TelemetrySnapshot};
use crate::view::{ImportanceModel, ScreenAreaImportance};

/// A running engine.
///
/// Dropping the handle does not stop the engine; call
/// [`EngineHandle::shutdown`] for an orderly stop.
pub struct EngineHandle {
    /// Message surface of the layer thread.
    pub layer: LayerHandle,
    /// Advisory per-tile lifecycle events.
    pub events: mpsc::UnboundedReceiver<TileEvent>,
    /// Shared engine counters.
    pub metrics: Arc<EngineMetrics>,
    join: JoinHandle<()>,
}

impl EngineHandle {
    /// Convenience accessor for a telemetry snapshot.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.metrics.snapshot()
    }

    /// Stops the layer thread and waits for it to finish.
    pub async fn shutdown(self) {
        self.layer.shutdown();
        let _ = self.join.await;
    }
}

/// Entry point for assembling a running engine.
pub struct GlobeEngine;

impl GlobeEngine {
    /// Starts the engine with the default screen-area importance model.
    ///
    /// Must be called from within a Tokio runtime; the layer thread and all
    /// fetch/build work are spawned onto it.
    pub fn start(
        config: EngineConfig,
        fetcher: Arc<dyn TileFetcher>,
        builder: Arc<dyn TileBuilder>,
    ) -> Result<EngineHandle, EngineError> {
        let model = Arc::new(ScreenAreaImportance::new(
            config.importance.min_level,
            config.importance.max_level,
        ));
        Self::start_with_model(config, fetcher, builder, model)
    }

    /// Starts the engine with a custom importance model.
    pub fn start_with_model(
        config: EngineConfig,
        fetcher: Arc<dyn TileFetcher>,
        builder: Arc<dyn TileBuilder>,
        model: Arc<dyn ImportanceModel>,
    ) -> Result<EngineHandle, EngineError> {
        config.validate()?;

        let queue = Arc::new(ChangeQueue::new());
        let metrics = Arc::new(EngineMetrics::new());
        let (events_tx, events_rx) = event_channel();
        let (completions, completion_rx) = completion_channel();

        let store = match config.scene.memory_budget_bytes {
            Some(budget) => SceneStore::with_memory_budget(budget),
            None => SceneStore::new(),
        };

        let fetcher_name = fetcher.name().to_string();
        let controller = QuadDisplayController::new(
            config.controller.clone(),
            model,
            fetcher,
            Arc::clone(&queue),
            events_tx,
            Arc::clone(&metrics),
            completions,
        );

        let (layer, handle) =
            LayerThread::new(controller, store, queue, builder, Arc::clone(&metrics), completion_rx);
        let shutdown = handle.shutdown_token();
        let join = tokio::spawn(layer.run(shutdown));

        info!(
            fetcher = %fetcher_name,
            max_concurrent_fetches = config.controller.max_concurrent_fetches,
            "Engine started"
        );

        Ok(EngineHandle {
            layer: handle,
            events: events_rx,
            metrics,
            join,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::config::ImportanceConfig;
    use crate::builder::ImageTileBuilder;
    use crate::ident::IdentifierAllocator;
    use crate::loader::{SyntheticFetcher, SyntheticFetcherConfig};
    use crate::view::ViewState;
    use std::time::Duration;

    fn start_synthetic_engine() -> EngineHandle {
        let fetcher = Arc::new(SyntheticFetcher::with_config(SyntheticFetcherConfig {
            latency: Duration::ZERO,
            tile_size: 8,
        }));
        let builder = Arc::new(ImageTileBuilder::new(Arc::new(IdentifierAllocator::new())));
        GlobeEngine::start(EngineConfig::default(), fetcher, builder).unwrap()
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let engine = start_synthetic_engine();
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let fetcher = Arc::new(SyntheticFetcher::new());
        let builder = Arc::new(ImageTileBuilder::new(Arc::new(IdentifierAllocator::new())));
        let config = EngineConfig {
            importance: ImportanceConfig { min_level: 9, max_level: 3 },
            ..Default::default()
        };
        assert!(GlobeEngine::start(config, fetcher, builder).is_err());
    }

    #[tokio::test]
    async fn test_engine_emits_lifecycle_events() {
        let mut engine = start_synthetic_engine();
        let view = ViewState::new(0.0, 0.0, 120.0, 240.0, 0);

        for _ in 0..50 {
            engine.layer.tick(view);
            tokio::time::sleep(Duration::from_millis(10)).await;
            if engine.snapshot().tiles_active == 1 {
                break;
            }
        }

        let mut saw_started = false;
        let mut saw_completed = false;
        while let Ok(event) = engine.events.try_recv() {
            match event {
                TileEvent::LoadStarted { .. } => saw_started = true,
                TileEvent::LoadCompleted { .. } => saw_completed = true,
                _ => {}
            }
        }
        assert!(saw_started);
        assert!(saw_completed);

        engine.shutdown().await;
    }
}
