//! The memebot binary.
//!
//! ```bash
//! TG_BOT_TOKEN=... ARK_API_KEY=... memebot --config memebot.toml --profile prod
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use memebot::build_registry;
use memebot::framework::CommandParser;
use memebot::prelude::*;

#[derive(Debug, Parser)]
#[command(name = "memebot", version, about = "Fortunes and AI meme pages for Telegram")]
struct Cli {
    /// Config file; `memebot.toml` in the working directory when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Config profile, e.g. `dev` or `prod`. Defaults to `MEMEBOT_PROFILE`.
    #[arg(short, long)]
    profile: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut loader = ConfigLoader::new().with_current_dir().with_user_config_dir();
    if let Some(profile) = &cli.profile {
        loader = loader.profile(profile);
    }
    if let Some(path) = &cli.config {
        loader = loader.file(path);
    }
    let config = loader.load().context("failed to load configuration")?;
    LoggingBuilder::from_config(&config.logging).init();

    let telegram: TelegramConfig = config.section("telegram")?;
    let client = TelegramClient::from_config(telegram).context("telegram is required")?;

    let registry = build_registry(&config, Arc::new(client.clone()))?;

    let mut parser = CommandParser::new();
    if let Some(username) = &client.config().username {
        parser = parser.with_bot_username(username);
    }

    let runtime = BotRuntime::builder(registry, Arc::new(client.clone()))
        .config(&config)
        .parser(parser)
        .build();
    runtime.run(TelegramSource::new(client)).await?;

    let stats = runtime.stats();
    info!(
        received = stats.received,
        completed = stats.completed,
        failed = stats.failed,
        "memebot stopped"
    );
    Ok(())
}
