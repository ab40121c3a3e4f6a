//! Image generation adapter for Ark-style `images/generations` endpoints.
//!
//! One call posts the prompt together with the reference image URLs and
//! returns the encoded bytes of the first generated image. The service either
//! answers with a URL, which is downloaded, or with inline base64.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info};

use memebot_core::{
    AdapterError, AdapterResult, ConfigError, ExternalAdapter, GeneratedImage, GenerationRequest,
};

use crate::http::{build_client, check_status, classify};

const ADAPTER: &str = "image_api";

/// Inline image fields, in the order they are tried.
const BASE64_FIELDS: [&str; 3] = ["b64_json", "b64_image", "image_base64"];

/// The `image_api` config section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageApiConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    /// Size preset used when a request does not name one.
    pub size: String,
    pub timeout_ms: u64,
    pub watermark: bool,
}

impl Default for ImageApiConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://ark.cn-beijing.volces.com/api/v3/images/generations".to_string(),
            api_key: String::new(),
            model: "doubao-seedream-4-0-250828".to_string(),
            size: "2K".to_string(),
            timeout_ms: 120_000,
            watermark: false,
        }
    }
}

impl ImageApiConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::missing(ADAPTER, "image_api.endpoint"));
        }
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::missing(ADAPTER, "image_api.api_key"));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::missing(ADAPTER, "image_api.model"));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::new(ADAPTER, "timeout_ms must be greater than 0"));
        }
        Ok(())
    }
}

/// The service only takes presets; an explicit `WxH` becomes `2K`.
pub fn coerce_size(size: &str) -> &str {
    let size = size.trim();
    if size.is_empty() || size.to_ascii_lowercase().contains('x') {
        "2K"
    } else {
        size
    }
}

/// [`ExternalAdapter`] for the image generation API.
pub struct ImageGenerationClient {
    client: Client,
    config: ImageApiConfig,
}

impl ImageGenerationClient {
    /// Validates `config` and builds the client.
    pub fn from_config(config: ImageApiConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let client = build_client(ADAPTER, Duration::from_millis(config.timeout_ms))?;
        info!(endpoint = %config.endpoint, model = %config.model, "Image generation client ready");
        Ok(Self { client, config })
    }

    fn payload(&self, request: &GenerationRequest) -> Value {
        let size = if request.size.is_empty() {
            &self.config.size
        } else {
            &request.size
        };
        let mut body = json!({
            "model": self.config.model,
            "prompt": request.prompt,
            "size": coerce_size(size),
            "sequential_image_generation": "disabled",
            "response_format": "url",
            "watermark": self.config.watermark,
        });
        if !request.reference_urls.is_empty() {
            body["image"] = json!(request.reference_urls);
        }
        if let Some(negative) = &request.negative_prompt {
            body["negative_prompt"] = json!(negative);
        }
        if let Some(seed) = request.seed {
            body["seed"] = json!(seed);
        }
        body
    }

    async fn download(&self, url: &str) -> AdapterResult<Bytes> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify(ADAPTER, e))?;
        let resp = check_status(ADAPTER, resp).await?;
        let data = resp.bytes().await.map_err(|e| classify(ADAPTER, e))?;
        if data.is_empty() {
            return Err(AdapterError::transient(ADAPTER, "downloaded image is empty"));
        }
        Ok(data)
    }
}

#[async_trait]
impl ExternalAdapter for ImageGenerationClient {
    type Request = GenerationRequest;
    type Response = GeneratedImage;

    fn name(&self) -> &str {
        ADAPTER
    }

    async fn invoke(&self, request: GenerationRequest) -> AdapterResult<GeneratedImage> {
        let body = self.payload(&request);
        debug!(
            references = request.reference_urls.len(),
            size = %body["size"],
            "Requesting image generation"
        );

        let resp = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify(ADAPTER, e))?;
        let resp = check_status(ADAPTER, resp).await?;
        let js: Value = resp
            .json()
            .await
            .map_err(|e| AdapterError::permanent(ADAPTER, format!("response is not JSON: {e}")))?;

        let image = match extract(&js)? {
            Extracted::Url(url) => GeneratedImage {
                data: self.download(&url).await?,
                source_url: Some(url),
            },
            Extracted::Inline(data) => GeneratedImage {
                data,
                source_url: None,
            },
        };
        info!(bytes = image.data.len(), model = %self.config.model, "Image generated");
        Ok(image)
    }
}

impl std::fmt::Debug for ImageGenerationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageGenerationClient")
            .field("endpoint", &self.config.endpoint)
            .field("model", &self.config.model)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Extracted {
    Url(String),
    Inline(Bytes),
}

/// Finds the first image in a generation response.
fn extract(js: &Value) -> AdapterResult<Extracted> {
    let item = js
        .get("data")
        .and_then(Value::as_array)
        .and_then(|items| items.first())
        .ok_or_else(|| missing_image(js))?;

    if let Some(url) = item.get("url").and_then(Value::as_str) {
        return Ok(Extracted::Url(url.to_string()));
    }
    for field in BASE64_FIELDS {
        if let Some(encoded) = item.get(field).and_then(Value::as_str) {
            return decode_base64(encoded).map(Extracted::Inline);
        }
    }
    Err(missing_image(js))
}

fn missing_image(js: &Value) -> AdapterError {
    let mut snippet = js.to_string();
    if let Some((idx, _)) = snippet.char_indices().nth(300) {
        snippet.truncate(idx);
    }
    AdapterError::permanent(ADAPTER, format!("no image in response: {snippet}"))
}

/// Accepts plain base64 and `data:` URLs.
fn decode_base64(encoded: &str) -> AdapterResult<Bytes> {
    let raw = match encoded.split_once(";base64,") {
        Some((_, rest)) => rest,
        None => encoded,
    };
    STANDARD
        .decode(raw.trim())
        .map(Bytes::from)
        .map_err(|e| AdapterError::permanent(ADAPTER, format!("invalid base64 image: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> ImageGenerationClient {
        ImageGenerationClient::from_config(ImageApiConfig {
            endpoint: format!("{}/api/v3/images/generations", server.uri()),
            api_key: "ark-key".into(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_coerce_size() {
        assert_eq!(coerce_size("2048x1024"), "2K");
        assert_eq!(coerce_size("1024X1024"), "2K");
        assert_eq!(coerce_size(""), "2K");
        assert_eq!(coerce_size("4K"), "4K");
    }

    #[test]
    fn test_missing_api_key() {
        let err = ImageGenerationClient::from_config(ImageApiConfig::default()).unwrap_err();
        assert_eq!(err.component, "image_api");
        assert!(err.reason.contains("api_key"));
    }

    #[test]
    fn test_extract_variants() {
        let js = json!({"data": [{"url": "https://x/y.jpeg"}]});
        assert_eq!(extract(&js).unwrap(), Extracted::Url("https://x/y.jpeg".into()));

        let js = json!({"data": [{"b64_json": STANDARD.encode(b"png!")}]});
        assert_eq!(
            extract(&js).unwrap(),
            Extracted::Inline(Bytes::from_static(b"png!"))
        );

        let js = json!({"data": [{"image_base64": format!("data:image/png;base64,{}", STANDARD.encode(b"abc"))}]});
        assert_eq!(
            extract(&js).unwrap(),
            Extracted::Inline(Bytes::from_static(b"abc"))
        );

        let err = extract(&json!({"data": []})).unwrap_err();
        assert!(!err.is_transient());
        assert!(extract(&json!({"data": [{"b64_image": "%%%"}]})).is_err());
    }

    #[tokio::test]
    async fn test_generates_and_downloads() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v3/images/generations"))
            .and(header("authorization", "Bearer ark-key"))
            .and(body_partial_json(json!({
                "model": "doubao-seedream-4-0-250828",
                "prompt": "three panels",
                "image": ["https://media/a.jpg", "https://media/b.jpg"],
                "size": "2K",
                "sequential_image_generation": "disabled",
                "response_format": "url",
                "watermark": false,
                "negative_prompt": "four panels",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"url": format!("{}/out/1.jpeg", server.uri())}]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/out/1.jpeg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jpeg".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let request = GenerationRequest::new("three panels", "2048x1024")
            .with_negative_prompt("four panels")
            .with_references(vec!["https://media/a.jpg".into(), "https://media/b.jpg".into()]);
        let image = client(&server).invoke(request).await.unwrap();

        assert_eq!(image.data, Bytes::from_static(b"jpeg"));
        assert!(image.source_url.unwrap().ends_with("/out/1.jpeg"));
    }

    #[test]
    fn test_payload_omits_empty_references() {
        let client = ImageGenerationClient::from_config(ImageApiConfig {
            api_key: "k".into(),
            ..Default::default()
        })
        .unwrap();
        let body = client.payload(&GenerationRequest::new("a cat", ""));
        assert!(body.get("image").is_none());
        assert!(body.get("negative_prompt").is_none());
        assert_eq!(body["size"], "2K");
    }

    #[tokio::test]
    async fn test_status_classification() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("InvalidParameter"))
            .mount(&server)
            .await;

        let client = client(&server);
        let first = client
            .invoke(GenerationRequest::new("p", "2K"))
            .await
            .unwrap_err();
        assert!(first.is_transient());

        let second = client
            .invoke(GenerationRequest::new("p", "2K"))
            .await
            .unwrap_err();
        assert!(!second.is_transient());
        assert!(second.to_string().contains("InvalidParameter"));
    }
}
