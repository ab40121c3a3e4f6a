//! Runtime error types.

use thiserror::Error;

use crate::config::ConfigError;

/// Errors that stop the runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The dispatch pool was shut down underneath the loop.
    #[error("Dispatch pool closed")]
    PoolClosed,
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
