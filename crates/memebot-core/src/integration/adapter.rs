//! External adapter interface.
//!
//! Every vendor service the bot talks to sits behind an [`ExternalAdapter`]: a
//! single `invoke` call with typed request and response values. Wire details
//! (HTTP, JSON, multipart, auth headers) stay inside the implementation.
//!
//! Adapters are built once at startup and shared by every in-flight pipeline,
//! so implementations must not keep per-call mutable state.
//!
//! ```rust,ignore
//! let store: BoxedObjectStore = Arc::new(HttpObjectStore::from_config(config)?);
//! let stored = store
//!     .invoke(StoreRequest::Put { key, data, content_type: "image/jpeg".into() })
//!     .await?;
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::foundation::error::AdapterResult;

/// Capability interface around one external service.
#[async_trait]
pub trait ExternalAdapter: Send + Sync {
    /// Request accepted by the service.
    type Request: Send + 'static;
    /// Response produced by the service.
    type Response: Send + 'static;

    /// Short name used in logs and error messages.
    fn name(&self) -> &str;

    /// Performs one call.
    ///
    /// Errors must be tagged transient or permanent so callers can decide
    /// whether to retry.
    async fn invoke(&self, request: Self::Request) -> AdapterResult<Self::Response>;
}

// =============================================================================
// Object Storage
// =============================================================================

/// Request to an object store.
#[derive(Debug, Clone)]
pub enum StoreRequest {
    /// Upload `data` under `key`.
    Put {
        key: String,
        data: Bytes,
        content_type: String,
    },
    /// Remove the object stored under `key`.
    Delete { key: String },
}

/// A stored object and the public URL it can be fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub key: String,
    pub url: String,
}

/// Response from an object store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreResponse {
    Stored(ObjectRef),
    Deleted,
}

/// Shared object store handle.
pub type BoxedObjectStore =
    Arc<dyn ExternalAdapter<Request = StoreRequest, Response = StoreResponse>>;

// =============================================================================
// Image Generation
// =============================================================================

/// Request to an image generation service.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub negative_prompt: Option<String>,
    /// Publicly reachable reference images, in character order.
    pub reference_urls: Vec<String>,
    /// Output size, either a preset such as `2K` or `WIDTHxHEIGHT`.
    pub size: String,
    pub seed: Option<i64>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, size: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            size: size.into(),
            ..Default::default()
        }
    }

    pub fn with_negative_prompt(mut self, negative: impl Into<String>) -> Self {
        self.negative_prompt = Some(negative.into());
        self
    }

    pub fn with_references(mut self, urls: Vec<String>) -> Self {
        self.reference_urls = urls;
        self
    }
}

/// Encoded bytes of a generated image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub data: Bytes,
    /// Where the image was downloaded from, when the service returned a URL.
    pub source_url: Option<String>,
}

/// Shared image generator handle.
pub type BoxedImageGenerator =
    Arc<dyn ExternalAdapter<Request = GenerationRequest, Response = GeneratedImage>>;
