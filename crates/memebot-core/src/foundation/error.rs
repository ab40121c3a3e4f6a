//! Unified error types for the memebot core.
//!
//! This module provides the error types shared by sources, delivery and external
//! adapters. Framework-level errors (handler, registry, pipeline) are defined in
//! memebot-framework.

use thiserror::Error;

/// HTTP statuses an external service returns for conditions worth retrying.
pub const TRANSIENT_STATUS: [u16; 8] = [408, 409, 425, 429, 500, 502, 503, 504];

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors raised while pulling updates or delivering responses.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {url} - {reason}")]
    ConnectionFailed {
        /// The URL that failed to connect.
        url: String,
        /// Reason for failure.
        reason: String,
    },

    /// The remote API answered but rejected the call.
    #[error("api call '{method}' rejected ({code:?}): {description}")]
    Api {
        /// API method that was called.
        method: String,
        /// Status or error code reported by the remote side.
        code: Option<u16>,
        /// Human-readable description from the remote side.
        description: String,
    },

    /// The response body could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// Message send failed before reaching the remote side.
    #[error("failed to send message: {0}")]
    SendFailed(String),

    /// The source has no more updates and will never produce any.
    #[error("update source closed")]
    Closed,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl TransportError {
    /// Returns `true` if polling again later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ConnectionFailed { .. } | Self::Io(_) | Self::SendFailed(_) => true,
            Self::Api { code, .. } => code.is_some_and(|c| TRANSIENT_STATUS.contains(&c)),
            Self::Decode(_) | Self::Closed => false,
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

// =============================================================================
// Adapter Errors
// =============================================================================

/// Failure of an external adapter call.
///
/// The tag decides whether the pipeline engine retries: only
/// [`AdapterError::Transient`] is retried, [`AdapterError::Permanent`] fails the
/// stage immediately.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdapterError {
    /// Network blip, rate limit, or a server-side failure.
    #[error("{adapter}: transient failure: {reason}")]
    Transient {
        /// Name of the adapter that failed.
        adapter: String,
        /// Reason for failure.
        reason: String,
    },

    /// Malformed request, rejected credentials, or unsupported input.
    #[error("{adapter}: permanent failure: {reason}")]
    Permanent {
        /// Name of the adapter that failed.
        adapter: String,
        /// Reason for failure.
        reason: String,
    },
}

impl AdapterError {
    /// Creates a retry-eligible error.
    pub fn transient(adapter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transient {
            adapter: adapter.into(),
            reason: reason.into(),
        }
    }

    /// Creates an immediately terminal error.
    pub fn permanent(adapter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Permanent {
            adapter: adapter.into(),
            reason: reason.into(),
        }
    }

    /// Classifies a non-success HTTP status.
    pub fn from_status(adapter: impl Into<String>, status: u16, body: impl AsRef<str>) -> Self {
        let reason = format!("HTTP {status}: {}", truncate(body.as_ref(), 300));
        if TRANSIENT_STATUS.contains(&status) {
            Self::transient(adapter, reason)
        } else {
            Self::permanent(adapter, reason)
        }
    }

    /// Returns `true` for errors the pipeline engine may retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Name of the adapter that produced this error.
    pub fn adapter(&self) -> &str {
        match self {
            Self::Transient { adapter, .. } | Self::Permanent { adapter, .. } => adapter,
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

// =============================================================================
// Component Configuration Errors
// =============================================================================

/// Invalid configuration for a single component.
///
/// Raised while constructing an adapter or handler. It disables only the
/// component it names; the rest of the bot keeps serving.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid configuration for {component}: {reason}")]
pub struct ConfigError {
    /// The component that could not be built.
    pub component: String,
    /// Why the configuration was rejected.
    pub reason: String,
}

impl ConfigError {
    /// Creates a configuration error for `component`.
    pub fn new(component: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            reason: reason.into(),
        }
    }

    /// Creates an error for a required field that was left empty.
    pub fn missing(component: impl Into<String>, field: &str) -> Self {
        Self::new(component, format!("missing required field `{field}`"))
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;
