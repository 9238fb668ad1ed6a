//! Top-level engine error types.

use std::fmt;

use crate::builder::BuildError;
use crate::loader::FetchError;
use crate::scene::SceneError;

/// Errors that can occur during engine lifecycle.
///
/// Note that stale asynchronous results are not an error anywhere in the
/// engine: they are expected, frequent, and silently discarded by the
/// generation check (visible only as a telemetry counter).
#[derive(Debug)]
pub enum EngineError {
    /// Configuration error.
    Config(String),

    /// Tile data acquisition failed.
    Fetch(FetchError),

    /// Tile payload conversion failed.
    Build(BuildError),

    /// The scene store rejected an operation.
    Scene(SceneError),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Config(msg) => {
                write!(f, "Configuration error: {}", msg)
            }
            EngineError::Fetch(e) => {
                write!(f, "Fetch failed: {}", e)
            }
            EngineError::Build(e) => {
                write!(f, "Build failed: {}", e)
            }
            EngineError::Scene(e) => {
                write!(f, "Scene error: {}", e)
            }
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Config(_) => None,
            EngineError::Fetch(e) => Some(e),
            EngineError::Build(e) => Some(e),
            EngineError::Scene(e) => Some(e),
        }
    }
}

impl From<FetchError> for EngineError {
    fn from(e: FetchError) -> Self {
        EngineError::Fetch(e)
    }
}

impl From<BuildError> for EngineError {
    fn from(e: BuildError) -> Self {
        EngineError::Build(e)
    }
}

impl From<SceneError> for EngineError {
    fn from(e: SceneError) -> Self {
        EngineError::Scene(e)
    }
}
