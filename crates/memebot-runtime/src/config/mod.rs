//! Configuration module for the memebot runtime.
//!
//! Layered loading with figment, the [`BotConfig`] schema, and validation of
//! the settings the dispatch loop cannot run without.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile};
pub use schema::{
    BotConfig, DispatchConfig, LogFormat, LogLevel, LogOutput, LoggingConfig, PipelineConfig,
    SpanEventConfig,
};
pub use validation::validate_config;
