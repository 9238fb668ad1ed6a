//! Engine telemetry for observability and user feedback.
//!
//! Lock-free atomic counters record what the scheduler and scene are doing;
//! a point-in-time [`TelemetrySnapshot`] is taken for display without
//! stopping the engine.
//!
//! # Architecture
//!
//! ```text
//! Controller / Loaders ────► EngineMetrics ────► TelemetrySnapshot ────► Views
//!                            (atomic counters)   (point-in-time copy)    (CLI, etc.)
//! ```
//!
//! # Example
//!
//! ```
//! use terrascene::telemetry::EngineMetrics;
//!
//! let metrics = EngineMetrics::new();
//! metrics.fetch_started();
//! metrics.fetch_completed(16_384);
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.fetches_completed, 1);
//! assert_eq!(snapshot.bytes_fetched, 16_384);
//! ```

mod metrics;
mod snapshot;

pub use metrics::EngineMetrics;
pub use snapshot::TelemetrySnapshot;
