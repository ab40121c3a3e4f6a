//! # memebot transport
//!
//! reqwest-based [`ExternalAdapter`](memebot_core::ExternalAdapter)
//! implementations for the vendor services behind the meme commands.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │  Pipeline stages     │  (memebot-commands)
//! ├──────────────────────┤
//! │  memebot-core        │  ExternalAdapter, StoreRequest, GenerationRequest
//! ├──────────────────────┤
//! │  memebot-transport   │  <- This crate (HTTP implementations)
//! ├──────────────────────┤
//! │  Network (HTTPS)     │
//! └──────────────────────┘
//! ```
//!
//! | Adapter | Request | Response |
//! |---------|---------|----------|
//! | [`HttpObjectStore`] | `StoreRequest::{Put, Delete}` | `StoreResponse::{Stored, Deleted}` |
//! | [`ImageGenerationClient`] | `GenerationRequest` | `GeneratedImage` |
//!
//! Both are built from their config section and fail with a component
//! `ConfigError` when it is incomplete:
//!
//! ```rust,ignore
//! let storage: StorageConfig = config.section("storage")?;
//! let store: BoxedObjectStore = Arc::new(HttpObjectStore::from_config(storage)?);
//! ```

pub mod http;
pub mod imagegen;
pub mod storage;

pub use imagegen::{ImageApiConfig, ImageGenerationClient, coerce_size};
pub use storage::{HttpObjectStore, StorageConfig, new_key};
