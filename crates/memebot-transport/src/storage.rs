//! Object storage adapter.
//!
//! Uploads user photos so the image generation service can fetch them by URL,
//! and deletes them again once a meme is done. Objects are written path-style
//! (`{endpoint}/{bucket}/{key}`) and handed out virtual-host style
//! (`https://{bucket}.{endpoint-host}/{key}`) unless `public_base_url` is set.
//!
//! ```toml
//! [storage]
//! endpoint = "https://tos-cn-beijing.volces.com"
//! bucket = "fortune-bot-media"
//! access_token = "..."
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use memebot_core::{
    AdapterResult, ConfigError, ExternalAdapter, ObjectRef, StoreRequest, StoreResponse,
};

use crate::http::{build_client, check_status, classify};

const ADAPTER: &str = "storage";

/// The `storage` config section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Service endpoint, e.g. `https://tos-cn-beijing.volces.com`.
    pub endpoint: String,
    pub bucket: String,
    /// Key prefix for every uploaded object.
    pub prefix: String,
    /// Bearer token sent with every request.
    pub access_token: Option<String>,
    /// Overrides the public URL derived from bucket and endpoint.
    pub public_base_url: Option<String>,
    pub timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            bucket: String::new(),
            prefix: "dongzhuo".to_string(),
            access_token: None,
            public_base_url: None,
            timeout_ms: 30_000,
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::missing(ADAPTER, "storage.endpoint"));
        }
        if self.bucket.trim().is_empty() {
            return Err(ConfigError::missing(ADAPTER, "storage.bucket"));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::new(ADAPTER, "timeout_ms must be greater than 0"));
        }
        Ok(())
    }
}

/// [`ExternalAdapter`] over an S3-like HTTP object store.
pub struct HttpObjectStore {
    client: Client,
    config: StorageConfig,
    endpoint: Url,
    public_base: String,
}

impl HttpObjectStore {
    /// Validates `config` and builds the client.
    pub fn from_config(config: StorageConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let endpoint = Url::parse(config.endpoint.trim_end_matches('/'))
            .map_err(|e| ConfigError::new(ADAPTER, format!("invalid endpoint: {e}")))?;
        let public_base = match &config.public_base_url {
            Some(base) => base.trim_end_matches('/').to_string(),
            None => {
                let host = endpoint
                    .host_str()
                    .ok_or_else(|| ConfigError::new(ADAPTER, "endpoint has no host"))?;
                let host = match endpoint.port() {
                    Some(port) => format!("{host}:{port}"),
                    None => host.to_string(),
                };
                format!("https://{}.{host}", config.bucket)
            }
        };
        let client = build_client(ADAPTER, Duration::from_millis(config.timeout_ms))?;

        info!(
            endpoint = %endpoint,
            bucket = %config.bucket,
            prefix = %config.prefix,
            "Object store ready"
        );

        Ok(Self {
            client,
            config,
            endpoint,
            public_base,
        })
    }

    /// A fresh key under the configured prefix, e.g. `dongzhuo/3f2a….jpg`.
    ///
    /// `suffix` gets a leading dot if it lacks one.
    pub fn new_key(&self, suffix: &str) -> String {
        new_key(&self.config.prefix, suffix)
    }

    /// Where clients can download `key` from.
    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base, key)
    }

    fn object_url(&self, key: &str) -> String {
        format!(
            "{}/{}/{}",
            self.endpoint.as_str().trim_end_matches('/'),
            self.config.bucket,
            key
        )
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.access_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn put(
        &self,
        key: String,
        data: bytes::Bytes,
        content_type: String,
    ) -> AdapterResult<ObjectRef> {
        let size = data.len();
        let req = self
            .client
            .put(self.object_url(&key))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(data);
        let resp = self
            .authorize(req)
            .send()
            .await
            .map_err(|e| classify(ADAPTER, e))?;
        check_status(ADAPTER, resp).await?;

        debug!(key = %key, bytes = size, "Object stored");
        Ok(ObjectRef {
            url: self.public_url(&key),
            key,
        })
    }

    async fn delete(&self, key: String) -> AdapterResult<()> {
        let req = self.client.delete(self.object_url(&key));
        let resp = self
            .authorize(req)
            .send()
            .await
            .map_err(|e| classify(ADAPTER, e))?;
        // Already gone counts as deleted.
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            debug!(key = %key, "Object already absent");
            return Ok(());
        }
        check_status(ADAPTER, resp).await?;
        debug!(key = %key, "Object deleted");
        Ok(())
    }
}

#[async_trait]
impl ExternalAdapter for HttpObjectStore {
    type Request = StoreRequest;
    type Response = StoreResponse;

    fn name(&self) -> &str {
        ADAPTER
    }

    async fn invoke(&self, request: StoreRequest) -> AdapterResult<StoreResponse> {
        match request {
            StoreRequest::Put {
                key,
                data,
                content_type,
            } => self
                .put(key, data, content_type)
                .await
                .map(StoreResponse::Stored),
            StoreRequest::Delete { key } => {
                self.delete(key).await.map(|()| StoreResponse::Deleted)
            }
        }
    }
}

impl std::fmt::Debug for HttpObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpObjectStore")
            .field("endpoint", &self.endpoint.as_str())
            .field("bucket", &self.config.bucket)
            .field("public_base", &self.public_base)
            .finish_non_exhaustive()
    }
}

/// `{prefix}/{uuid}{suffix}` with the prefix stripped of slashes.
pub fn new_key(prefix: &str, suffix: &str) -> String {
    let prefix = prefix.trim_matches('/');
    let id = uuid::Uuid::new_v4().simple();
    let dot = if suffix.is_empty() || suffix.starts_with('.') {
        ""
    } else {
        "."
    };
    if prefix.is_empty() {
        format!("{id}{dot}{suffix}")
    } else {
        format!("{prefix}/{id}{dot}{suffix}")
    }
}
