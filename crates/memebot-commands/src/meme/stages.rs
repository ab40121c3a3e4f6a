//! Stages of the `/dongzhuo` pipeline.
//!
//! ```text
//! fetch ──▶ upload ──▶ generate ──▶ compose ──▶ cleanup (best effort)
//!             │
//!             └── compensation: delete uploaded references
//! ```
//!
//! Every stage takes the [`MemeJob`] produced by the one before it and
//! returns an enriched copy, so a retried stage always starts from the same
//! input.

use std::sync::Arc;

use ab_glyph::FontArc;
use bytes::Bytes;
use tracing::{debug, warn};

use memebot_core::{
    Attachment, BoxedFetcher, BoxedImageGenerator, BoxedObjectStore, GenerationRequest, ObjectRef,
    StoreRequest, StoreResponse,
};
use memebot_framework::{FnStage, Pipeline, RetryPolicy, StageError};
use memebot_transport::new_key;

use crate::compose::render_meme;
use crate::template::{DONGZHUO_BUBBLES, DONGZHUO_PROMPT, NEGATIVE_PROMPT, PanelLayout};

/// Carrier threaded through the pipeline.
#[derive(Debug, Clone, Default)]
pub struct MemeJob {
    /// Character photos, A first.
    pub sources: Vec<Attachment>,
    pub images: Vec<Bytes>,
    pub uploaded: Vec<ObjectRef>,
    pub generated: Option<Bytes>,
    /// The finished JPEG.
    pub rendered: Option<Bytes>,
}

impl MemeJob {
    pub fn new(sources: Vec<Attachment>) -> Self {
        Self {
            sources,
            ..Default::default()
        }
    }
}

/// Object store plus the key prefix uploads go under.
#[derive(Clone)]
pub struct ObjectStorage {
    pub store: BoxedObjectStore,
    pub key_prefix: String,
}

impl std::fmt::Debug for ObjectStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStorage")
            .field("adapter", &self.store.name())
            .field("key_prefix", &self.key_prefix)
            .finish()
    }
}

/// Builds the pipeline. `size` empty means the generator's default size;
/// without a `font` the bubbles are left blank.
pub fn meme_pipeline(
    fetcher: BoxedFetcher,
    storage: ObjectStorage,
    generator: BoxedImageGenerator,
    size: String,
    font: Option<FontArc>,
    policy: RetryPolicy,
) -> Pipeline<MemeJob> {
    Pipeline::new("dongzhuo")
        .with_default_policy(policy)
        .stage(fetch(fetcher))
        .stage(upload(storage.clone()))
        .stage(generate(generator, size))
        .stage(compose(font))
        .stage(cleanup(storage.store))
}

fn fetch(fetcher: BoxedFetcher) -> FnStage<MemeJob> {
    FnStage::new("fetch", move |mut job: MemeJob| {
        let fetcher = Arc::clone(&fetcher);
        async move {
            let mut images = Vec::with_capacity(job.sources.len());
            for attachment in &job.sources {
                images.push(fetcher.fetch(attachment).await?);
            }
            job.images = images;
            Ok::<_, StageError>(job)
        }
    })
}

fn upload(storage: ObjectStorage) -> FnStage<MemeJob> {
    let store = Arc::clone(&storage.store);
    FnStage::new("upload", move |mut job: MemeJob| {
        let storage = storage.clone();
        async move {
            let mut uploaded = Vec::with_capacity(job.images.len());
            for (attachment, data) in job.sources.iter().zip(&job.images) {
                let suffix = attachment.suffix();
                let request = StoreRequest::Put {
                    key: new_key(&storage.key_prefix, &suffix),
                    data: data.clone(),
                    content_type: content_type(&suffix).to_string(),
                };
                let error = match storage.store.invoke(request).await {
                    Ok(StoreResponse::Stored(object)) => {
                        debug!(key = %object.key, "Reference uploaded");
                        uploaded.push(object);
                        continue;
                    }
                    Ok(StoreResponse::Deleted) => {
                        StageError::invalid("object store answered an upload with a delete")
                    }
                    Err(e) => e.into(),
                };
                // This attempt failed; what it already uploaded is not
                // covered by compensation.
                let _ = delete_all(&storage.store, &uploaded).await;
                return Err(error);
            }
            job.uploaded = uploaded;
            Ok::<_, StageError>(job)
        }
    })
    .with_compensation(move |job: MemeJob| {
        let store = Arc::clone(&store);
        async move { delete_all(&store, &job.uploaded).await }
    })
}

fn generate(generator: BoxedImageGenerator, size: String) -> FnStage<MemeJob> {
    FnStage::new("generate", move |mut job: MemeJob| {
        let generator = Arc::clone(&generator);
        let size = size.clone();
        async move {
            if job.uploaded.len() < 2 {
                return Err(StageError::invalid("both character references are required"));
            }
            let references = job.uploaded.iter().map(|o| o.url.clone()).collect();
            let request = GenerationRequest::new(DONGZHUO_PROMPT, size)
                .with_negative_prompt(NEGATIVE_PROMPT)
                .with_references(references);
            let image = generator.invoke(request).await?;
            job.generated = Some(image.data);
            Ok::<_, StageError>(job)
        }
    })
}

fn compose(font: Option<FontArc>) -> FnStage<MemeJob> {
    FnStage::new("compose", move |mut job: MemeJob| {
        let font = font.clone();
        async move {
            let generated = job
                .generated
                .clone()
                .ok_or_else(|| StageError::invalid("nothing was generated"))?;
            let rendered = tokio::task::spawn_blocking(move || {
                render_meme(
                    &generated,
                    &PanelLayout::DONGZHUO,
                    &DONGZHUO_BUBBLES,
                    font.as_ref(),
                )
            })
            .await
            .map_err(|e| StageError::invalid(format!("compose task failed: {e}")))?
            .map_err(|e| StageError::invalid(e.to_string()))?;
            job.rendered = Some(Bytes::from(rendered));
            Ok::<_, StageError>(job)
        }
    })
    .with_retry_policy(RetryPolicy::no_retry())
}

fn cleanup(store: BoxedObjectStore) -> FnStage<MemeJob> {
    FnStage::new("cleanup", move |mut job: MemeJob| {
        let store = Arc::clone(&store);
        async move {
            delete_all(&store, &job.uploaded).await?;
            job.uploaded.clear();
            Ok::<_, StageError>(job)
        }
    })
    .with_retry_policy(RetryPolicy::no_retry())
    .optional()
}

/// Deletes every object, continuing past failures. Returns the last failure.
async fn delete_all(store: &BoxedObjectStore, objects: &[ObjectRef]) -> Result<(), StageError> {
    let mut result = Ok(());
    for object in objects {
        let request = StoreRequest::Delete {
            key: object.key.clone(),
        };
        if let Err(e) = store.invoke(request).await {
            warn!(key = %object.key, error = %e, "Failed to delete uploaded reference");
            result = Err(e.into());
        }
    }
    result
}

fn content_type(suffix: &str) -> &'static str {
    match suffix {
        ".png" => "image/png",
        ".webp" => "image/webp",
        _ => "image/jpeg",
    }
}
