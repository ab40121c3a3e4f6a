//! Configuration schema definitions.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;

use figment::value::Value;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use memebot_framework::{DispatcherSettings, RetryPolicy};

use super::error::{ConfigError, ConfigResult};

/// Root configuration structure.
///
/// The dispatch loop's own settings are typed here. Component sections
/// (`telegram`, `storage`, `image_api`, `fortune`, `meme`, …) are kept as raw
/// values and read by the crate that owns them through [`BotConfig::section`],
/// so a broken component section only disables that component.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BotConfig {
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Dispatcher and dispatch loop settings.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Default retry shape for pipeline stages.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Component sections, keyed by name.
    #[serde(flatten)]
    pub sections: BTreeMap<String, Value>,
}

impl BotConfig {
    /// Deserializes the component section `name`.
    ///
    /// An absent section yields `T::default()`.
    pub fn section<T>(&self, name: &str) -> ConfigResult<T>
    where
        T: DeserializeOwned + Default,
    {
        match self.sections.get(name) {
            Some(value) => value
                .deserialize()
                .map_err(|e| ConfigError::section(name, e.to_string())),
            None => Ok(T::default()),
        }
    }

    /// Returns `true` if the section `name` was supplied by any source.
    pub fn has_section(&self, name: &str) -> bool {
        self.sections.contains_key(name)
    }
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature; falls back to compact otherwise.
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Base level; `RUST_LOG` takes precedence when set.
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    /// Log file for `output = "file"`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Include thread ids.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include file names and line numbers.
    #[serde(default)]
    pub file_location: bool,

    /// Per-module levels, e.g. `memebot_transport = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}

// =============================================================================
// Dispatch
// =============================================================================

/// Dispatcher and dispatch loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Maximum number of dispatches running at once.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Deadline for handlers that do not declare their own, in milliseconds.
    #[serde(default = "default_deadline_ms")]
    pub default_deadline_ms: u64,

    /// Sequence markers remembered for duplicate suppression.
    #[serde(default = "default_dedup_window")]
    pub dedup_window: usize,

    /// Idle expiry of a held conversation, in seconds.
    #[serde(default = "default_conversation_ttl_secs")]
    pub conversation_ttl_secs: u64,

    /// How long shutdown waits for in-flight dispatches before cancelling
    /// them, in milliseconds.
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,

    /// First delay after the update source fails, in milliseconds.
    #[serde(default = "default_source_backoff_base_ms")]
    pub source_backoff_base_ms: u64,

    /// Longest delay between source retries, in milliseconds.
    #[serde(default = "default_source_backoff_cap_ms")]
    pub source_backoff_cap_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            default_deadline_ms: default_deadline_ms(),
            dedup_window: default_dedup_window(),
            conversation_ttl_secs: default_conversation_ttl_secs(),
            drain_timeout_ms: default_drain_timeout_ms(),
            source_backoff_base_ms: default_source_backoff_base_ms(),
            source_backoff_cap_ms: default_source_backoff_cap_ms(),
        }
    }
}

impl DispatchConfig {
    /// Converts to dispatcher settings.
    pub fn to_settings(&self) -> DispatcherSettings {
        DispatcherSettings {
            default_deadline: Duration::from_millis(self.default_deadline_ms),
            dedup_window: self.dedup_window,
            conversation_ttl: Duration::from_secs(self.conversation_ttl_secs),
        }
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    /// Backoff between update source retries. The attempt count is unused.
    pub fn source_backoff(&self) -> RetryPolicy {
        RetryPolicy::new(
            u32::MAX,
            Duration::from_millis(self.source_backoff_base_ms),
            Duration::from_millis(self.source_backoff_cap_ms),
        )
    }
}

fn default_max_concurrency() -> usize {
    8
}

fn default_deadline_ms() -> u64 {
    180_000
}

fn default_dedup_window() -> usize {
    memebot_framework::DEFAULT_DEDUP_WINDOW
}

fn default_conversation_ttl_secs() -> u64 {
    600
}

fn default_drain_timeout_ms() -> u64 {
    30_000
}

fn default_source_backoff_base_ms() -> u64 {
    1_000
}

fn default_source_backoff_cap_ms() -> u64 {
    60_000
}

// =============================================================================
// Pipeline
// =============================================================================

/// Default retry shape for pipeline stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Attempts per stage, including the first.
    #[serde(default = "default_stage_max_attempts")]
    pub stage_max_attempts: u32,

    /// Delay after the first failed attempt, in milliseconds.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Upper bound for any single delay, in milliseconds.
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stage_max_attempts: default_stage_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
        }
    }
}

impl PipelineConfig {
    /// Converts to the pipeline engine's retry policy.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.stage_max_attempts,
            Duration::from_millis(self.backoff_base_ms),
            Duration::from_millis(self.backoff_cap_ms),
        )
    }
}

fn default_stage_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_backoff_cap_ms() -> u64 {
    8_000
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Figment;
    use figment::providers::Serialized;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct Fortune {
        #[serde(default)]
        max_attempts: u32,
    }

    #[test]
    fn test_defaults_map_to_engine_types() {
        let config = BotConfig::default();
        let policy = config.pipeline.retry_policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(500));

        let settings = config.dispatch.to_settings();
        assert_eq!(settings.default_deadline, Duration::from_secs(180));
        assert_eq!(settings.dedup_window, 4096);
    }

    #[test]
    fn test_section_lookup() {
        let figment = Figment::from(Serialized::defaults(BotConfig::default()))
            .merge(Serialized::default("fortune.max_attempts", 2));
        let config: BotConfig = figment.extract().unwrap();

        assert!(config.has_section("fortune"));
        assert_eq!(config.section::<Fortune>("fortune").unwrap(), Fortune { max_attempts: 2 });
        assert_eq!(config.section::<Fortune>("meme").unwrap(), Fortune::default());
    }

    #[test]
    fn test_broken_section_is_reported_by_name() {
        let figment = Figment::from(Serialized::defaults(BotConfig::default()))
            .merge(Serialized::default("fortune.max_attempts", "many"));
        let config: BotConfig = figment.extract().unwrap();

        let err = config.section::<Fortune>("fortune").unwrap_err();
        assert!(matches!(err, ConfigError::Section { ref section, .. } if section == "fortune"));
    }
}
