//! # memebot commands
//!
//! The commands the bot ships with:
//!
//! | token | handler |
//! |---|---|
//! | `start` | greeting |
//! | `fortune` | [`FortuneHandler`], one fortune per user and day |
//! | `reroll` | [`RerollHandler`], the button under a low fortune |
//! | `dongzhuo` | [`MemeHandler`], the two-photo meme pipeline |
//! | `dokaku` | [`PanelsHandler`], three text-only panels |
//! | `cancel` | releases a held conversation |
//! | `help` | lists everything above |
//!
//! [`install`] registers all of them. A command whose collaborators could not
//! be built is registered as unavailable instead, so the rest of the bot
//! keeps working.
//!
//! ```rust,ignore
//! let mut builder = RegistryBuilder::new();
//! memebot_commands::install(&mut builder, services, &config)?;
//! let registry = builder.build();
//! ```

pub mod basic;
pub mod compose;
pub mod fortune;
pub mod meme;
pub mod panels;
pub mod template;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use memebot_core::{BoxedFetcher, BoxedImageGenerator, ConfigError};
use memebot_framework::{RegistryBuilder, RegistryError, RetryPolicy};

pub use basic::{CancelHandler, HelpHandler};
pub use fortune::{
    FortuneConfig, FortuneHandler, FortuneStore, FortuneTeller, MemoryFortuneStore, RandomScores,
    RerollHandler, ScoreSource,
};
pub use meme::{MemeConfig, MemeHandler, ObjectStorage};
pub use panels::PanelsHandler;

/// Collaborators the commands are built from.
///
/// Adapters that failed to build are passed as their [`ConfigError`]; the
/// commands needing them are registered as unavailable.
pub struct Services {
    pub fetcher: BoxedFetcher,
    pub storage: Result<ObjectStorage, ConfigError>,
    pub generator: Result<BoxedImageGenerator, ConfigError>,
    pub fortunes: Arc<dyn FortuneStore>,
    pub scores: Arc<dyn ScoreSource>,
}

/// Command settings read from the `fortune`, `meme` and `pipeline` sections.
#[derive(Debug, Clone, Default)]
pub struct CommandsConfig {
    pub fortune: FortuneConfig,
    pub meme: MemeConfig,
    /// Default retry shape for pipeline stages and panel redraws.
    pub pipeline: RetryPolicy,
}

/// Registers every command on `builder`, `help` last.
pub fn install(
    builder: &mut RegistryBuilder,
    services: Services,
    config: &CommandsConfig,
) -> Result<(), RegistryError> {
    builder.register("start", basic::start())?;

    match FortuneTeller::new(config.fortune.clone(), services.fortunes, services.scores) {
        Ok(teller) => {
            builder.register("fortune", FortuneHandler::new(Arc::clone(&teller)))?;
            builder.register("reroll", RerollHandler::new(teller))?;
        }
        Err(e) => {
            builder.register_unavailable("fortune", "抽今日运势", e.clone())?;
            builder.register_unavailable("reroll", "重抽今日运势（按钮）", e)?;
        }
    }

    let meme = services.storage.and_then(|storage| {
        let generator = services.generator.clone()?;
        MemeHandler::new(
            Arc::clone(&services.fetcher),
            storage,
            generator,
            &config.meme,
            config.pipeline,
        )
    });
    match meme {
        Ok(handler) => builder.register("dongzhuo", handler)?,
        Err(e) => builder.register_unavailable("dongzhuo", meme::DESCRIPTION, e)?,
    }

    let panels = services
        .generator
        .and_then(|generator| PanelsHandler::new(generator, &config.meme, config.pipeline));
    match panels {
        Ok(handler) => builder.register("dokaku", handler)?,
        Err(e) => builder.register_unavailable("dokaku", panels::DESCRIPTION, e)?,
    }

    builder.register("cancel", CancelHandler)?;
    let help = HelpHandler::new(&builder.commands());
    builder.register("help", help)
}

#[cfg(test)]
mod tests {
    use super::*;
    use memebot_framework::ResolveError;

    use crate::testing::{FakeFetcher, FakeGenerator};

    fn services(storage: Result<ObjectStorage, ConfigError>) -> Services {
        Services {
            fetcher: Arc::new(FakeFetcher),
            storage,
            generator: Ok(Arc::new(FakeGenerator::new())),
            fortunes: Arc::new(MemoryFortuneStore::new()),
            scores: Arc::new(RandomScores::seeded(1)),
        }
    }

    #[test]
    fn test_missing_storage_disables_only_dongzhuo() {
        let mut builder = RegistryBuilder::new();
        let missing = ConfigError::missing("storage", "storage.bucket");
        install(&mut builder, services(Err(missing)), &CommandsConfig::default()).unwrap();
        let registry = builder.build();

        assert!(matches!(
            registry.resolve("dongzhuo"),
            Err(ResolveError::Unavailable { .. })
        ));
        for token in ["start", "fortune", "reroll", "dokaku", "cancel", "help"] {
            assert!(registry.resolve(token).is_ok(), "{token} should be available");
        }
        let tokens: Vec<_> = registry.commands().into_iter().map(|c| c.token).collect();
        assert_eq!(tokens.last().map(String::as_str), Some("help"));
    }

    #[test]
    fn test_invalid_fortune_config_disables_fortune() {
        let mut builder = RegistryBuilder::new();
        let config = CommandsConfig {
            fortune: FortuneConfig {
                max_attempts: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        let storage = ObjectStorage {
            store: Arc::new(crate::testing::FakeStore::new()),
            key_prefix: "dongzhuo".into(),
        };
        install(&mut builder, services(Ok(storage)), &config).unwrap();
        let registry = builder.build();

        assert!(registry.resolve("fortune").is_err());
        assert!(registry.resolve("reroll").is_err());
        assert!(registry.resolve("dongzhuo").is_ok());
    }
}
