//! Engine assembly: configuration, bootstrap, errors, logging.

mod bootstrap;
mod config;
mod error;
mod logging;

pub use bootstrap::{EngineHandle, GlobeEngine};
pub use config::{
    EngineConfig, ImportanceConfig, SceneConfig, DEFAULT_MAX_LEVEL, DEFAULT_MIN_LEVEL,
};
pub use error::EngineError;
pub use logging::init_logging;
