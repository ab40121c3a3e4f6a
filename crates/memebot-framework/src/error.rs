//! Error types for the memebot framework.

use memebot_core::{AdapterError, ConfigError};
use thiserror::Error;

// =============================================================================
// Handler Errors
// =============================================================================

/// Failure returned by a handler.
///
/// The dispatcher turns every variant into a user-safe message; only
/// [`HandlerError::Validation`] text is shown to the user verbatim.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Malformed user input.
    #[error("{0}")]
    Validation(String),

    /// A pipeline stage failed or the pipeline was cancelled.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// A direct adapter call failed.
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    /// The handler is missing configuration it needs.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The deadline passed or the bot is shutting down.
    #[error("handler cancelled")]
    Cancelled,

    /// Anything else.
    #[error("internal error: {0}")]
    Internal(String),
}

impl HandlerError {
    /// Creates a validation error shown to the user as-is.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Short classification used in logs and dispatch outcomes.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Pipeline(PipelineError::Cancelled { .. }) | Self::Cancelled => "cancelled",
            Self::Pipeline(_) => "pipeline",
            Self::Adapter(_) => "adapter",
            Self::Config(_) => "config",
            Self::Internal(_) => "internal",
        }
    }
}

/// Result type for handler execution.
pub type HandlerResult<T> = Result<T, HandlerError>;

// =============================================================================
// Registry Errors
// =============================================================================

/// Errors raised while populating the handler registry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The token already has a handler.
    #[error("command token '{0}' is already registered")]
    DuplicateToken(String),

    /// The token is empty or contains characters a command cannot have.
    #[error("invalid command token '{0}'")]
    InvalidToken(String),
}

/// Errors raised when resolving a token.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    /// No handler is registered for the token.
    #[error("unknown command '{token}'")]
    NotFound { token: String },

    /// The handler could not be built at startup.
    #[error("command '{token}' is unavailable: {reason}")]
    Unavailable { token: String, reason: ConfigError },
}

// =============================================================================
// Pipeline Errors
// =============================================================================

/// Failure of one stage attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StageError {
    /// The adapter the stage called failed.
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    /// The stage cannot work with its input. Never retried.
    #[error("invalid stage input: {0}")]
    Invalid(String),
}

impl StageError {
    /// Creates an invalid-input error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }

    /// Returns `true` if another attempt may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Adapter(err) if err.is_transient())
    }
}

/// Terminal failure of a pipeline run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    /// A stage failed permanently or ran out of attempts.
    #[error("stage '{stage}' failed after {attempts} attempt(s)")]
    StageFailed {
        stage: String,
        attempts: u32,
        #[source]
        source: StageError,
    },

    /// Cancellation was observed before `stage` could complete.
    #[error("pipeline cancelled at stage '{stage}' after {completed} completed stage(s)")]
    Cancelled { stage: String, completed: usize },
}

impl PipelineError {
    /// Name of the stage the run stopped at.
    pub fn stage(&self) -> &str {
        match self {
            Self::StageFailed { stage, .. } | Self::Cancelled { stage, .. } => stage,
        }
    }
}
