//! # memebot adapter for the Telegram Bot API
//!
//! Connects memebot to Telegram over plain HTTPS long polling.
//!
//! - [`TelegramSource`]: an [`UpdateSource`](memebot_core::UpdateSource) over
//!   `getUpdates`; the `update_id` is the sequence marker
//! - [`TelegramClient`]: [`Delivery`](memebot_core::Delivery) through
//!   `sendMessage`, `sendPhoto`, `editMessageText` and `answerCallbackQuery`,
//!   plus [`AttachmentFetcher`](memebot_core::AttachmentFetcher) through
//!   `getFile`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use memebot_adapter_telegram::{TelegramClient, TelegramConfig, TelegramSource};
//!
//! let config: TelegramConfig = bot_config.section("telegram")?;
//! let client = TelegramClient::from_config(config)?;
//! let delivery: BoxedDelivery = Arc::new(client.clone());
//!
//! runtime.run(TelegramSource::new(client)).await?;
//! ```
//!
//! ## Update Conversion
//!
//! ```text
//! getUpdates entry
//! ├── message        → text or caption, largest photo, image documents
//! ├── callback_query → CallbackAction { id, data, message_id }
//! └── anything else  → skipped (still acknowledged)
//! ```

pub mod client;
pub mod config;
pub mod convert;
pub mod model;
pub mod source;

pub use client::TelegramClient;
pub use config::TelegramConfig;
pub use convert::to_update;
pub use source::TelegramSource;
