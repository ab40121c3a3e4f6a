//! Logging for memebot.
//!
//! The `logging` section drives one `tracing-subscriber` registry: an
//! [`EnvFilter`] plus a single fmt layer. `RUST_LOG`, when set, replaces the
//! configured base level; the per-module `filters` are added on top of either.
//!
//! ```rust,ignore
//! let config = ConfigLoader::new().with_current_dir().load()?;
//! LoggingBuilder::from_config(&config.logging).init();
//! ```
//!
//! ```toml
//! [logging]
//! level = "info"
//! format = "compact"        # full, pretty, json (needs `json-log`)
//! output = "file"
//! file_path = "logs/memebot.log"
//! span_events = { new = true, close = true }   # dispatch span timings
//!
//! [logging.filters]
//! memebot_transport = "debug"
//! ```

use std::path::{Path, PathBuf};

use tracing::warn;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::Registry;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::config::{LogFormat, LogOutput, LoggingConfig, SpanEventConfig};

const DEFAULT_LOG_FILE: &str = "memebot.log";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Where log lines go.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Sink {
    Stdout,
    Stderr,
    File(PathBuf),
}

/// Subscriber settings resolved from a [`LoggingConfig`].
#[derive(Debug, Clone)]
pub struct LoggingBuilder {
    level: tracing::Level,
    directives: Vec<String>,
    format: LogFormat,
    sink: Sink,
    /// `output = "file"` was requested without a `file_path`.
    missing_file_path: bool,
    span_events: FmtSpan,
    thread_ids: bool,
    file_location: bool,
}

impl LoggingBuilder {
    pub fn from_config(config: &LoggingConfig) -> Self {
        let (sink, missing_file_path) = match (config.output, &config.file_path) {
            (LogOutput::Stdout, _) => (Sink::Stdout, false),
            (LogOutput::Stderr, _) => (Sink::Stderr, false),
            (LogOutput::File, Some(path)) => (Sink::File(path.clone()), false),
            (LogOutput::File, None) => (Sink::Stdout, true),
        };

        // Sorted so the resulting filter does not depend on map order.
        let mut directives: Vec<String> = config
            .filters
            .iter()
            .map(|(module, level)| format!("{module}={}", level.as_str()))
            .collect();
        directives.sort();

        Self {
            level: config.level.to_tracing_level(),
            directives,
            format: config.format,
            sink,
            missing_file_path,
            span_events: span_events(&config.span_events),
            thread_ids: config.thread_ids,
            file_location: config.file_location,
        }
    }

    /// Adds a filter directive such as `"memebot_framework=trace"`.
    pub fn directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    fn filter(&self) -> EnvFilter {
        let base = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level.as_str().to_lowercase()));
        self.directives
            .iter()
            .filter_map(|directive| match directive.parse::<Directive>() {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    eprintln!("ignoring log filter {directive:?}: {e}");
                    None
                }
            })
            .fold(base, EnvFilter::add_directive)
    }

    fn writer(&self) -> BoxMakeWriter {
        match &self.sink {
            Sink::Stdout => BoxMakeWriter::new(std::io::stdout),
            Sink::Stderr => BoxMakeWriter::new(std::io::stderr),
            Sink::File(path) => {
                let directory = path.parent().unwrap_or_else(|| Path::new("."));
                let file_name = path
                    .file_name()
                    .map_or_else(|| DEFAULT_LOG_FILE.into(), |name| name.to_os_string());
                BoxMakeWriter::new(tracing_appender::rolling::never(directory, file_name))
            }
        }
    }

    fn layer(&self) -> BoxedLayer {
        let base = fmt::layer()
            .with_writer(self.writer())
            .with_span_events(self.span_events.clone())
            .with_thread_ids(self.thread_ids)
            .with_file(self.file_location)
            .with_line_number(self.file_location);

        match self.format {
            LogFormat::Full => base.boxed(),
            LogFormat::Pretty => base.pretty().boxed(),
            #[cfg(feature = "json-log")]
            LogFormat::Json => base.json().boxed(),
            #[cfg(not(feature = "json-log"))]
            LogFormat::Json => {
                eprintln!("JSON logs need the `json-log` feature, using the compact format");
                base.compact().boxed()
            }
            LogFormat::Compact => base.compact().boxed(),
        }
    }

    /// Installs the global subscriber; does nothing if one is already set.
    pub fn init(self) {
        let _ = self.try_init();
    }

    pub fn try_init(self) -> Result<(), TryInitError> {
        tracing_subscriber::registry()
            .with(self.layer())
            .with(self.filter())
            .try_init()?;
        if self.missing_file_path {
            warn!("File output requested but no file_path configured, logging to stdout");
        }
        Ok(())
    }
}

fn span_events(config: &SpanEventConfig) -> FmtSpan {
    [
        (config.new, FmtSpan::NEW),
        (config.enter, FmtSpan::ENTER),
        (config.exit, FmtSpan::EXIT),
        (config.close, FmtSpan::CLOSE),
    ]
    .into_iter()
    .filter(|(enabled, _)| *enabled)
    .fold(FmtSpan::NONE, |events, (_, flag)| events | flag)
}
