//! The layer thread: the single owner of scheduler and scene mutation.
//!
//! Every mutation of the [`QuadDisplayController`] and [`SceneStore`] happens
//! inside one long-running task that processes messages strictly
//! sequentially. Camera ticks, fetch completions, build results, and posted
//! closures all arrive as messages; at the end of every tick the change
//! queue is drained into the store; that drain is the frame boundary, and
//! the only place GPU resource lifetime changes.
//!
//! # Architecture
//!
//! ```text
//!  camera ──Tick──────────────┐
//!  fetch workers ─completions─┤   ┌──────────────┐     ┌────────────┐
//!  build workers ─BuildComplete──►│ LayerThread  ├────►│ SceneStore │
//!  UI ──Refresh / Post────────┘   │ (sequential) │     │  (drain)   │
//!                                 └──────────────┘     └────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use terrascene::layer::LayerThread;
//!
//! let (layer, handle) = LayerThread::new(controller, store, queue, builder, metrics, completion_rx);
//! tokio::spawn(layer.run(shutdown.clone()));
//!
//! handle.tick(view);
//! ```

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::builder::TileBuilder;
use crate::loader::FetchCompletion;
use crate::quad::{BuildResult, QuadDisplayController};
use crate::scene::{ChangeQueue, SceneStore};
use crate::telemetry::EngineMetrics;
use crate::view::ViewState;

/// A closure run on the layer thread with exclusive engine access.
pub type LayerTask = Box<dyn FnOnce(&mut QuadDisplayController, &mut SceneStore) + Send>;

/// Messages processed sequentially by the layer thread.
pub enum LayerMessage {
    /// Run one scheduling pass for this view, then drain the change queue.
    Tick(ViewState),
    /// A worker-thread build finished.
    BuildComplete(BuildResult),
    /// Force every tile back to `Unknown` and reload.
    Refresh,
    /// Run an arbitrary closure with exclusive engine access.
    Post(LayerTask),
}

impl std::fmt::Debug for LayerMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LayerMessage::Tick(view) => f.debug_tuple("Tick").field(view).finish(),
            LayerMessage::BuildComplete(result) => {
                f.debug_tuple("BuildComplete").field(&result.address).finish()
            }
            LayerMessage::Refresh => write!(f, "Refresh"),
            LayerMessage::Post(_) => write!(f, "Post(..)"),
        }
    }
}

/// Cloneable handle for talking to the layer thread from anywhere.
#[derive(Clone)]
pub struct LayerHandle {
    tx: mpsc::UnboundedSender<LayerMessage>,
    shutdown: CancellationToken,
}

impl LayerHandle {
    /// Requests one scheduling pass. Returns false if the engine is gone.
    pub fn tick(&self, view: ViewState) -> bool {
        self.tx.send(LayerMessage::Tick(view)).is_ok()
    }

    /// Requests a full refresh.
    pub fn refresh(&self) -> bool {
        self.tx.send(LayerMessage::Refresh).is_ok()
    }

    /// Runs a closure on the layer thread with exclusive engine access.
    ///
    /// The only supported way to inspect or adjust engine state from
    /// outside.
    pub fn post(
        &self,
        task: impl FnOnce(&mut QuadDisplayController, &mut SceneStore) + Send + 'static,
    ) -> bool {
        self.tx.send(LayerMessage::Post(Box::new(task))).is_ok()
    }

    /// Signals the layer thread to stop after the message in progress.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// The token observed by the layer thread's run loop.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

/// The single-threaded executor owning all engine state.
pub struct LayerThread {
    controller: QuadDisplayController,
    store: SceneStore,
    queue: Arc<ChangeQueue>,
    builder: Arc<dyn TileBuilder>,
    metrics: Arc<EngineMetrics>,
    message_rx: mpsc::UnboundedReceiver<LayerMessage>,
    message_tx: mpsc::UnboundedSender<LayerMessage>,
    completion_rx: mpsc::UnboundedReceiver<FetchCompletion>,
}

impl LayerThread {
    /// Creates the layer thread and its handle.
    ///
    /// `completion_rx` is the receiving half of the channel whose sink was
    /// given to the controller's fetchers.
    pub fn new(
        controller: QuadDisplayController,
        store: SceneStore,
        queue: Arc<ChangeQueue>,
        builder: Arc<dyn TileBuilder>,
        metrics: Arc<EngineMetrics>,
        completion_rx: mpsc::UnboundedReceiver<FetchCompletion>,
    ) -> (Self, LayerHandle) {
        let (message_tx, message_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let handle = LayerHandle {
            tx: message_tx.clone(),
            shutdown,
        };
        let layer = Self {
            controller,
            store,
            queue,
            builder,
            metrics,
            message_rx,
            message_tx,
            completion_rx,
        };
        (layer, handle)
    }

    /// Runs until `shutdown` is cancelled, processing messages sequentially.
    ///
    /// Fetch completions are given priority over ordinary messages so a
    /// burst of ticks cannot starve the pipeline's downstream half.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("Layer thread starting");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Layer thread shutting down");
                    break;
                }

                Some(completion) = self.completion_rx.recv() => {
                    self.on_fetch_completion(completion);
                }

                Some(message) = self.message_rx.recv() => {
                    self.on_message(message);
                }
            }
        }

        info!("Layer thread stopped");
    }

    fn on_message(&mut self, message: LayerMessage) {
        match message {
            LayerMessage::Tick(view) => self.on_tick(view),
            LayerMessage::BuildComplete(result) => {
                self.controller.handle_build_result(result, Instant::now());
            }
            LayerMessage::Refresh => self.controller.refresh(),
            LayerMessage::Post(task) => task(&mut self.controller, &mut self.store),
        }
    }

    /// One frame: schedule, then drain at the frame boundary.
    fn on_tick(&mut self, view: ViewState) {
        let now = Instant::now();
        self.controller.tick(&view, now);

        let report = self.queue.drain(&mut self.store, now);
        self.metrics
            .changes_drained(report.applied as u64, report.failed.len() as u64);

        if !report.failed.is_empty() && self.controller.recover_memory(report.failed, &self.store, now)
        {
            // Evictions freed memory; drain them out within the same frame.
            let report = self.queue.drain(&mut self.store, now);
            self.metrics
                .changes_drained(report.applied as u64, report.failed.len() as u64);
        }

        self.controller.reap(&self.store);
    }

    /// Validates a fetch result and dispatches the build to a worker thread.
    fn on_fetch_completion(&mut self, completion: FetchCompletion) {
        let Some(request) = self
            .controller
            .handle_fetch_completion(completion, Instant::now())
        else {
            return;
        };

        let builder = Arc::clone(&self.builder);
        let tx = self.message_tx.clone();
        tokio::task::spawn_blocking(move || {
            debug!(tile = %request.address, bytes = request.data.len(), "Building tile");
            let result = builder.build(request.address, request.data);
            let _ = tx.send(LayerMessage::BuildComplete(BuildResult {
                address: request.address,
                generation: request.generation,
                result,
            }));
        });
    }
}
