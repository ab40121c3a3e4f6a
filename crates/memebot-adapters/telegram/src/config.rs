//! The `telegram` config section.
//!
//! ```toml
//! [telegram]
//! token = "123456:ABC..."        # or TG_BOT_TOKEN / BOT_TOKEN
//! username = "memebot"           # accepts /cmd@memebot in groups
//! poll_timeout_secs = 30
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use memebot_core::ConfigError;

const COMPONENT: &str = "telegram";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token issued by BotFather.
    pub token: String,
    pub api_base: String,
    /// Long-poll timeout passed to `getUpdates`.
    pub poll_timeout_secs: u64,
    /// Timeout for every other API call.
    pub request_timeout_secs: u64,
    /// The bot's username, without `@`.
    pub username: Option<String>,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_base: "https://api.telegram.org".to_string(),
            poll_timeout_secs: 30,
            request_timeout_secs: 45,
            username: None,
        }
    }
}

impl TelegramConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token.trim().is_empty() {
            return Err(ConfigError::missing(COMPONENT, "telegram.token"));
        }
        if self.api_base.trim().is_empty() {
            return Err(ConfigError::missing(COMPONENT, "telegram.api_base"));
        }
        if self.request_timeout_secs <= self.poll_timeout_secs {
            return Err(ConfigError::new(
                COMPONENT,
                "request_timeout_secs must be longer than poll_timeout_secs",
            ));
        }
        Ok(())
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_token() {
        let err = TelegramConfig::default().validate().unwrap_err();
        assert_eq!(err.component, "telegram");
        assert!(err.reason.contains("telegram.token"));
    }

    #[test]
    fn test_timeouts_checked() {
        let config = TelegramConfig {
            token: "t".into(),
            request_timeout_secs: 10,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = TelegramConfig {
            token: "t".into(),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }
}
