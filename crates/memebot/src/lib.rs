//! # memebot
//!
//! A personal Telegram bot: daily fortunes with a one-time reroll button, a
//! two-photo "董卓" meme pipeline and a text-only three-panel comic.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────┐     ┌────────────┐     ┌─────────────────────────────┐
//! │ TelegramSource │────▶│ BotRuntime │────▶│ Dispatcher                  │
//! │ (getUpdates)   │     │ (permits)  │     │ parse → resolve → execute   │
//! └────────────────┘     └────────────┘     └──────────────┬──────────────┘
//!                                                          │
//!                        ┌─────────────────────────────────┼──────────────┐
//!                        ▼                                 ▼              ▼
//!                   /fortune, /reroll              /dongzhuo pipeline   /dokaku
//!                   (FortuneStore)                 fetch → upload →     (generator
//!                                                  generate → compose)   with retry)
//! ```
//!
//! This crate re-exports the workspace crates and wires them from one
//! [`BotConfig`]; the `memebot` binary is a thin wrapper around
//! [`build_registry`] and [`BotRuntime`](runtime::BotRuntime).

use std::sync::Arc;

use tracing::{info, warn};

use memebot_core::{BoxedFetcher, BoxedImageGenerator, ConfigError};
use memebot_framework::{HandlerRegistry, RegistryBuilder};

pub use memebot_adapter_telegram as telegram;
pub use memebot_commands as commands;
pub use memebot_core as core;
pub use memebot_framework as framework;
pub use memebot_runtime as runtime;
pub use memebot_transport as transport;

use memebot_commands::{
    CommandsConfig, MemoryFortuneStore, ObjectStorage, RandomScores, Services, install,
};
use memebot_runtime::BotConfig;
use memebot_transport::{HttpObjectStore, ImageApiConfig, ImageGenerationClient, StorageConfig};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use memebot_adapter_telegram::{TelegramClient, TelegramConfig, TelegramSource};
    pub use memebot_runtime::{BotConfig, BotRuntime, ConfigLoader, LoggingBuilder, RuntimeBuilder};
}

/// Builds the object store from the `storage` section.
pub fn object_storage(config: &BotConfig) -> Result<ObjectStorage, ConfigError> {
    let section: StorageConfig = config.section("storage")?;
    let key_prefix = section.prefix.clone();
    let store = HttpObjectStore::from_config(section)?;
    Ok(ObjectStorage {
        store: Arc::new(store),
        key_prefix,
    })
}

/// Builds the image generator from the `image_api` section.
pub fn image_generator(config: &BotConfig) -> Result<BoxedImageGenerator, ConfigError> {
    let section: ImageApiConfig = config.section("image_api")?;
    Ok(Arc::new(ImageGenerationClient::from_config(section)?))
}

/// Reads the `fortune` and `meme` sections and the pipeline defaults.
pub fn commands_config(config: &BotConfig) -> anyhow::Result<CommandsConfig> {
    Ok(CommandsConfig {
        fortune: config.section("fortune")?,
        meme: config.section("meme")?,
        pipeline: config.pipeline.retry_policy(),
    })
}

/// Builds every command from `config`.
///
/// Storage or image API sections that are missing or invalid leave the
/// commands depending on them unavailable; the registry is still built.
pub fn build_registry(config: &BotConfig, fetcher: BoxedFetcher) -> anyhow::Result<HandlerRegistry> {
    let storage = object_storage(config);
    let generator = image_generator(config);
    for (component, result) in [
        ("storage", storage.as_ref().err()),
        ("image_api", generator.as_ref().err()),
    ] {
        if let Some(e) = result {
            warn!(component, reason = %e, "Adapter not configured");
        }
    }

    let services = Services {
        fetcher,
        storage,
        generator,
        fortunes: Arc::new(MemoryFortuneStore::new()),
        scores: Arc::new(RandomScores::from_entropy()),
    };

    let mut builder = RegistryBuilder::new();
    install(&mut builder, services, &commands_config(config)?)?;
    let registry = builder.build();
    info!(commands = registry.len(), "Commands installed");
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use memebot_adapter_telegram::{TelegramClient, TelegramConfig};
    use memebot_runtime::ConfigLoader;

    fn fetcher() -> BoxedFetcher {
        let config = TelegramConfig {
            token: "1:test".into(),
            ..Default::default()
        };
        Arc::new(TelegramClient::from_config(config).unwrap())
    }

    #[test]
    fn test_unconfigured_adapters_leave_commands_unavailable() {
        let registry = build_registry(&BotConfig::default(), fetcher()).unwrap();

        assert!(registry.resolve("fortune").is_ok());
        assert!(registry.resolve("help").is_ok());
        assert!(registry.resolve("dongzhuo").is_err());
        assert!(registry.resolve("dokaku").is_err());
        let unavailable: Vec<_> = registry
            .commands()
            .into_iter()
            .filter(|c| !c.available)
            .map(|c| c.token)
            .collect();
        assert_eq!(unavailable, ["dongzhuo", "dokaku"]);
    }

    #[test]
    fn test_configured_adapters_enable_meme_commands() {
        let config = ConfigLoader::new()
            .without_env()
            .set("storage.endpoint", "https://tos.example")
            .set("storage.bucket", "memes")
            .set("image_api.api_key", "key")
            .load()
            .unwrap();

        let storage = object_storage(&config).unwrap();
        assert_eq!(storage.key_prefix, "dongzhuo");

        let registry = build_registry(&config, fetcher()).unwrap();
        assert!(registry.resolve("dongzhuo").is_ok());
        assert!(registry.resolve("dokaku").is_ok());
    }

    #[test]
    fn test_broken_fortune_section_is_rejected() {
        let config = ConfigLoader::new()
            .without_env()
            .set("fortune.utc_offset_hours", "east")
            .load()
            .unwrap();
        assert!(commands_config(&config).is_err());
    }
}
