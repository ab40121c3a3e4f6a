//! Outbound delivery and attachment download.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::foundation::error::{AdapterResult, TransportResult};
use crate::foundation::response::Response;
use crate::foundation::update::{Attachment, ChatId};

/// Sends a handler's response back to a chat.
///
/// Delivery failures are logged by the caller and never re-trigger the handler.
#[async_trait]
pub trait Delivery: Send + Sync {
    async fn deliver(&self, chat: ChatId, response: &Response) -> TransportResult<()>;
}

/// Downloads the bytes behind an attachment reference.
#[async_trait]
pub trait AttachmentFetcher: Send + Sync {
    async fn fetch(&self, attachment: &Attachment) -> AdapterResult<Bytes>;
}

/// Shared delivery handle.
pub type BoxedDelivery = Arc<dyn Delivery>;

/// Shared attachment fetcher handle.
pub type BoxedFetcher = Arc<dyn AttachmentFetcher>;

/// Delivery that keeps every response in memory.
///
/// Used for dry runs and by tests across the workspace.
#[derive(Debug, Default)]
pub struct RecordingDelivery {
    sent: Mutex<Vec<(ChatId, Response)>>,
}

impl RecordingDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything delivered so far, in delivery order.
    pub fn sent(&self) -> Vec<(ChatId, Response)> {
        self.sent.lock().clone()
    }

    /// All delivered texts for `chat`, flattened in order.
    pub fn texts_for(&self, chat: ChatId) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter(|(c, _)| *c == chat)
            .flat_map(|(_, r)| r.texts().map(str::to_owned).collect::<Vec<_>>())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.lock().is_empty()
    }
}

#[async_trait]
impl Delivery for RecordingDelivery {
    async fn deliver(&self, chat: ChatId, response: &Response) -> TransportResult<()> {
        self.sent.lock().push((chat, response.clone()));
        Ok(())
    }
}
