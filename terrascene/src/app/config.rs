//! Engine configuration.
//!
//! [`EngineConfig`] combines every component's configuration into the single
//! value passed to [`GlobeEngine::start`](crate::app::GlobeEngine::start).
//! All fields are serde-enabled so a deployment can keep its tuning in a
//! JSON file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::app::error::EngineError;
use crate::quad::ControllerConfig;

/// Default coarsest candidate level.
pub const DEFAULT_MIN_LEVEL: u8 = 0;

/// Default finest candidate level.
pub const DEFAULT_MAX_LEVEL: u8 = 19;

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Scheduler budgets and policy knobs.
    #[serde(default)]
    pub controller: ControllerConfig,

    /// Importance model level clamps.
    #[serde(default)]
    pub importance: ImportanceConfig,

    /// Scene store limits.
    #[serde(default)]
    pub scene: SceneConfig,
}

impl EngineConfig {
    /// Loads configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("failed to read {}: {}", path.display(), e)))?;
        serde_json::from_str(&text)
            .map_err(|e| EngineError::Config(format!("failed to parse {}: {}", path.display(), e)))
    }

    /// Rejects configurations that cannot work.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.importance.min_level > self.importance.max_level {
            return Err(EngineError::Config(format!(
                "min_level {} exceeds max_level {}",
                self.importance.min_level, self.importance.max_level
            )));
        }
        if self.controller.max_concurrent_fetches == 0 {
            return Err(EngineError::Config(
                "max_concurrent_fetches must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Level clamps for the default importance model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportanceConfig {
    /// Coarsest level candidates may come from.
    pub min_level: u8,
    /// Finest level candidates may come from.
    pub max_level: u8,
}

impl Default for ImportanceConfig {
    fn default() -> Self {
        Self {
            min_level: DEFAULT_MIN_LEVEL,
            max_level: DEFAULT_MAX_LEVEL,
        }
    }
}

/// Scene store limits.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SceneConfig {
    /// Total resident byte budget; `None` is unlimited.
    #[serde(default)]
    pub memory_budget_bytes: Option<u64>,
}
