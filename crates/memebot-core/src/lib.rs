//! # memebot core
//!
//! The data model and collaborator interfaces shared by every memebot crate.
//!
//! ## Architecture Layers
//!
//! ### Foundation Layer
//!
//! Values that flow through the bot:
//! - **Updates**: inbound events with sender, chat, payload and sequence marker ([`Update`])
//! - **Responses**: what a handler wants sent back ([`Response`], [`Reply`])
//! - **Errors**: [`AdapterError`] (transient or permanent), [`TransportError`], [`ConfigError`]
//!
//! ### Integration Layer
//!
//! Boundaries to the outside world:
//! - **Update sources**: long-poll producers of updates ([`UpdateSource`])
//! - **Delivery**: sending responses and downloading attachments ([`Delivery`], [`AttachmentFetcher`])
//! - **External adapters**: one narrow capability per vendor service ([`ExternalAdapter`])
//!
//! ## Flow
//!
//! ```text
//! ┌──────────────┐     ┌────────────┐     ┌─────────┐     ┌──────────────────┐
//! │ UpdateSource │────▶│ Dispatcher │────▶│ Handler │────▶│ ExternalAdapter  │
//! └──────────────┘     └────────────┘     └─────────┘     └──────────────────┘
//!                            │
//!                            ▼
//!                      ┌──────────┐
//!                      │ Delivery │
//!                      └──────────┘
//! ```

// Architectural layers
pub mod foundation;
pub mod integration;

// Re-export foundation types
pub use foundation::{
    AdapterError, AdapterResult, Attachment, AttachmentKind, Button, CallbackAck, CallbackAction,
    ChatId, ConfigError, Payload, Photo, Reply, Response, Sender, SequenceMarker,
    TRANSIENT_STATUS, TransportError, TransportResult, Update, UserId,
};

// Re-export integration types
pub use integration::{
    AttachmentFetcher, BoxedDelivery, BoxedFetcher, BoxedImageGenerator, BoxedObjectStore,
    ChannelSource, Delivery, ExternalAdapter, GeneratedImage, GenerationRequest, ObjectRef,
    RecordingDelivery, StoreRequest, StoreResponse, UpdateSender, UpdateSource,
};

/// Prelude for common imports.
pub mod prelude {
    pub use super::foundation::*;
    pub use super::integration::{
        AttachmentFetcher, Delivery, ExternalAdapter, UpdateSource,
    };
}
