//! memebot runtime: process orchestration for the bot.
//!
//! This crate provides:
//! - Layered configuration (`BotConfig`, `ConfigLoader`)
//! - Logging setup driven by the `logging` section
//! - The update stream with source backoff and marker tracking
//! - The dispatch loop with bounded concurrency and graceful drain (`BotRuntime`)
//!
//! ```ignore
//! use memebot_runtime::{BotRuntime, ConfigLoader, LoggingBuilder};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigLoader::new().with_current_dir().load()?;
//!     LoggingBuilder::from_config(&config.logging).init();
//!
//!     let runtime = BotRuntime::builder(registry, delivery)
//!         .config(&config)
//!         .build();
//!
//!     // Run until Ctrl+C or SIGTERM
//!     runtime.run(source).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod stream;

// Re-exports
pub use config::{
    BotConfig, ConfigError, ConfigLoader, ConfigResult, DispatchConfig, PipelineConfig, Profile,
    validate_config,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::LoggingBuilder;
pub use runtime::{BotRuntime, RuntimeBuilder, RuntimeStats};
pub use stream::update_stream;

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// This provides all the commonly used logging macros:
/// - `trace!`, `debug!`, `info!`, `warn!`, `error!`
/// - `span`, `event`
/// - `instrument` attribute
/// - `Level` for span creation
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
