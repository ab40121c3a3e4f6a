//! Integration layer - interfaces to collaborators outside the core.
//!
//! - [`UpdateSource`]: where updates come from
//! - [`Delivery`] and [`AttachmentFetcher`]: how responses leave and attachments arrive
//! - [`ExternalAdapter`]: one narrow capability per vendor service

pub mod adapter;
pub mod delivery;
pub mod source;

pub use adapter::{
    BoxedImageGenerator, BoxedObjectStore, ExternalAdapter, GeneratedImage, GenerationRequest,
    ObjectRef, StoreRequest, StoreResponse,
};
pub use delivery::{AttachmentFetcher, BoxedDelivery, BoxedFetcher, Delivery, RecordingDelivery};
pub use source::{ChannelSource, UpdateSender, UpdateSource};
