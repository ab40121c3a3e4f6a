//! Configuration validation utilities.
//!
//! Only the settings the dispatch loop cannot run without are checked here;
//! a failure is fatal for the whole process. Component sections validate
//! themselves when their component is built.

use super::error::{ConfigError, ConfigResult};
use super::schema::{BotConfig, DispatchConfig, LogOutput, LoggingConfig, PipelineConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &BotConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_dispatch_config(&config.dispatch)?;
    validate_pipeline_config(&config.pipeline)?;
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }
    if let Some(module) = logging.filters.keys().find(|m| m.trim().is_empty()) {
        return Err(ConfigError::validation(format!(
            "Invalid log filter module: '{module}'"
        )));
    }
    Ok(())
}

fn validate_dispatch_config(dispatch: &DispatchConfig) -> ConfigResult<()> {
    if dispatch.max_concurrency == 0 {
        return Err(ConfigError::validation(
            "dispatch.max_concurrency must be greater than 0",
        ));
    }

    if dispatch.default_deadline_ms == 0 {
        return Err(ConfigError::validation(
            "dispatch.default_deadline_ms must be greater than 0",
        ));
    }

    if dispatch.dedup_window == 0 {
        return Err(ConfigError::validation(
            "dispatch.dedup_window must be greater than 0",
        ));
    }

    if dispatch.source_backoff_cap_ms < dispatch.source_backoff_base_ms {
        return Err(ConfigError::validation(
            "dispatch.source_backoff_cap_ms must be greater than or equal to source_backoff_base_ms",
        ));
    }

    Ok(())
}

fn validate_pipeline_config(pipeline: &PipelineConfig) -> ConfigResult<()> {
    if pipeline.stage_max_attempts == 0 {
        return Err(ConfigError::validation(
            "pipeline.stage_max_attempts must be at least 1",
        ));
    }

    if pipeline.backoff_base_ms == 0 {
        return Err(ConfigError::validation(
            "pipeline.backoff_base_ms must be greater than 0",
        ));
    }

    if pipeline.backoff_cap_ms < pipeline.backoff_base_ms {
        return Err(ConfigError::validation(
            "pipeline.backoff_cap_ms must be greater than or equal to backoff_base_ms",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&BotConfig::default()).is_ok());
    }

    #[test]
    fn test_validate_zero_concurrency() {
        let mut config = BotConfig::default();
        config.dispatch.max_concurrency = 0;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError { .. })
        ));
    }

    #[test]
    fn test_validate_pipeline_backoff() {
        let mut config = BotConfig::default();
        config.pipeline.stage_max_attempts = 0;
        assert!(validate_config(&config).is_err());

        let mut config = BotConfig::default();
        config.pipeline.backoff_base_ms = 2_000;
        config.pipeline.backoff_cap_ms = 1_000;
        assert!(validate_config(&config).is_err());

        let mut config = BotConfig::default();
        config.pipeline.backoff_base_ms = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_file_output_needs_path() {
        let mut config = BotConfig::default();
        config.logging.output = LogOutput::File;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { .. })
        ));
    }
}
