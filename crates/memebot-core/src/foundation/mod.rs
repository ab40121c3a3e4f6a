//! Foundation layer - the values that flow through the bot.
//!
//! - Inbound [`Update`]s produced by an update source
//! - Outbound [`Response`]s handed to delivery
//! - The error taxonomy shared by every collaborator

pub mod error;
pub mod response;
pub mod update;

pub use error::{
    AdapterError, AdapterResult, ConfigError, TRANSIENT_STATUS, TransportError, TransportResult,
};
pub use response::{Button, CallbackAck, Photo, Reply, Response};
pub use update::{
    Attachment, AttachmentKind, CallbackAction, ChatId, Payload, Sender, SequenceMarker, Update,
    UserId,
};
