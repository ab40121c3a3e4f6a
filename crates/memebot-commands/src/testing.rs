//! In-memory collaborators for command tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use image::{GrayImage, Luma};
use parking_lot::Mutex;

use memebot_core::{
    AdapterError, AdapterResult, Attachment, AttachmentFetcher, ExternalAdapter, GeneratedImage,
    GenerationRequest, ObjectRef, StoreRequest, StoreResponse,
};

use crate::compose::encode_jpeg;

pub fn sample_jpeg(width: u32, height: u32) -> Bytes {
    let image = GrayImage::from_pixel(width, height, Luma([100]));
    Bytes::from(encode_jpeg(&image, 90).unwrap())
}

/// Returns the file id as the photo's bytes.
pub struct FakeFetcher;

#[async_trait]
impl AttachmentFetcher for FakeFetcher {
    async fn fetch(&self, attachment: &Attachment) -> AdapterResult<Bytes> {
        Ok(Bytes::from(attachment.file_id.clone()))
    }
}

/// Records successful puts and all deletes by key.
#[derive(Default)]
pub struct FakeStore {
    puts: Mutex<Vec<String>>,
    bodies: Mutex<Vec<Bytes>>,
    deletes: Mutex<Vec<String>>,
    put_calls: AtomicUsize,
    /// Only this many put calls succeed.
    put_budget: Option<usize>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_after(successful_puts: usize) -> Self {
        Self {
            put_budget: Some(successful_puts),
            ..Self::default()
        }
    }

    pub fn puts(&self) -> Vec<String> {
        self.puts.lock().clone()
    }

    /// Bodies of the successful puts, in upload order.
    pub fn bodies(&self) -> Vec<Bytes> {
        self.bodies.lock().clone()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.deletes.lock().clone()
    }
}

#[async_trait]
impl ExternalAdapter for FakeStore {
    type Request = StoreRequest;
    type Response = StoreResponse;

    fn name(&self) -> &str {
        "storage"
    }

    async fn invoke(&self, request: StoreRequest) -> AdapterResult<StoreResponse> {
        match request {
            StoreRequest::Put { key, data, .. } => {
                let call = self.put_calls.fetch_add(1, Ordering::SeqCst);
                if self.put_budget.is_some_and(|budget| call >= budget) {
                    return Err(AdapterError::transient("storage", "HTTP 503"));
                }
                self.puts.lock().push(key.clone());
                self.bodies.lock().push(data);
                Ok(StoreResponse::Stored(ObjectRef {
                    url: format!("https://bucket.example/{key}"),
                    key,
                }))
            }
            StoreRequest::Delete { key } => {
                self.deletes.lock().push(key);
                Ok(StoreResponse::Deleted)
            }
        }
    }
}

enum Behaviour {
    Succeed,
    FailPermanently,
    /// Fails transiently this many times, then succeeds.
    FailTransiently(usize),
    /// Returns undecodable bytes this many times, then a real image.
    Garbage(usize),
}

/// Returns a small grayscale JPEG and records every request.
pub struct FakeGenerator {
    behaviour: Behaviour,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl FakeGenerator {
    fn with(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn new() -> Self {
        Self::with(Behaviour::Succeed)
    }

    pub fn failing_permanently() -> Self {
        Self::with(Behaviour::FailPermanently)
    }

    pub fn failing_transiently(times: usize) -> Self {
        Self::with(Behaviour::FailTransiently(times))
    }

    pub fn garbage(times: usize) -> Self {
        Self::with(Behaviour::Garbage(times))
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ExternalAdapter for FakeGenerator {
    type Request = GenerationRequest;
    type Response = GeneratedImage;

    fn name(&self) -> &str {
        "image_api"
    }

    async fn invoke(&self, request: GenerationRequest) -> AdapterResult<GeneratedImage> {
        let call = {
            let mut requests = self.requests.lock();
            requests.push(request);
            requests.len()
        };
        let image = |data: Bytes| GeneratedImage {
            data,
            source_url: None,
        };
        match self.behaviour {
            Behaviour::Succeed => Ok(image(sample_jpeg(518, 518))),
            Behaviour::FailPermanently => Err(AdapterError::permanent("image_api", "HTTP 400")),
            Behaviour::FailTransiently(times) if call <= times => {
                Err(AdapterError::transient("image_api", "HTTP 503"))
            }
            Behaviour::Garbage(times) if call <= times => Ok(image(Bytes::from_static(b"not a jpeg"))),
            Behaviour::FailTransiently(_) | Behaviour::Garbage(_) => Ok(image(sample_jpeg(518, 518))),
        }
    }
}
