//! Raw HTTP calls to the Telegram Bot API.
//!
//! [`TelegramClient`] wraps reqwest for the handful of methods the bot uses
//! and implements [`Delivery`] and [`AttachmentFetcher`] on top of them.
//! Every failure becomes a [`TransportError`]; the bot token never appears in
//! an error message or a log line.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, warn};

use memebot_core::{
    AdapterError, AdapterResult, Attachment, AttachmentFetcher, Button, ChatId, ConfigError,
    Delivery, Photo, Reply, Response, TransportError, TransportResult,
};

use crate::config::TelegramConfig;
use crate::model::{
    ApiResponse, File, InlineKeyboardButton, InlineKeyboardMarkup, SentMessage, Update,
};

/// Low-level Telegram Bot API client.
#[derive(Clone)]
pub struct TelegramClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    client: Client,
    /// `{api_base}/bot{token}`
    method_base: String,
    /// `{api_base}/file/bot{token}`
    file_base: String,
    config: TelegramConfig,
}

impl TelegramClient {
    /// Validates `config` and builds the client.
    pub fn from_config(config: TelegramConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| {
                ConfigError::new("telegram", format!("failed to build HTTP client: {e}"))
            })?;
        let api_base = config.api_base.trim_end_matches('/');
        let method_base = format!("{api_base}/bot{}", config.token);
        let file_base = format!("{api_base}/file/bot{}", config.token);

        Ok(Self {
            inner: Arc::new(ClientInner {
                client,
                method_base,
                file_base,
                config,
            }),
        })
    }

    pub fn config(&self) -> &TelegramConfig {
        &self.inner.config
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: Value) -> TransportResult<T> {
        debug!(method, "Calling Bot API");
        let resp = self
            .inner
            .client
            .post(format!("{}/{method}", self.inner.method_base))
            .json(&body)
            .send()
            .await
            .map_err(|e| request_error(method, e))?;
        self.unwrap_envelope(method, resp).await
    }

    async fn unwrap_envelope<T: DeserializeOwned>(
        &self,
        method: &str,
        resp: reqwest::Response,
    ) -> TransportResult<T> {
        let status = resp.status().as_u16();
        let envelope: ApiResponse<T> = resp.json().await.map_err(|e| {
            if (200..300).contains(&status) {
                TransportError::Decode(e.without_url().to_string())
            } else {
                TransportError::Api {
                    method: method.to_string(),
                    code: Some(status),
                    description: "non-JSON error body".to_string(),
                }
            }
        })?;

        if !envelope.ok {
            let description = envelope.description.unwrap_or_default();
            let retry_after = envelope.parameters.and_then(|p| p.retry_after);
            warn!(
                method,
                code = ?envelope.error_code,
                retry_after,
                description = %description,
                "Bot API call rejected"
            );
            return Err(TransportError::Api {
                method: method.to_string(),
                code: envelope.error_code.or(Some(status)),
                description,
            });
        }
        envelope
            .result
            .ok_or_else(|| TransportError::Decode(format!("{method}: ok response without result")))
    }

    /// Long-polls for updates after `offset - 1`.
    pub async fn get_updates(&self, offset: Option<i64>) -> TransportResult<Vec<Update>> {
        let mut body = json!({
            "timeout": self.inner.config.poll_timeout_secs,
            "allowed_updates": ["message", "callback_query"],
        });
        if let Some(offset) = offset {
            body["offset"] = json!(offset);
        }
        self.call("getUpdates", body).await
    }

    /// Sends a text message, optionally with one row of inline buttons.
    pub async fn send_message(
        &self,
        chat: ChatId,
        text: &str,
        buttons: &[Button],
    ) -> TransportResult<i64> {
        let mut body = json!({
            "chat_id": chat.0,
            "text": text,
        });
        if !buttons.is_empty() {
            body["reply_markup"] = keyboard(buttons);
        }
        let sent: SentMessage = self.call("sendMessage", body).await?;
        Ok(sent.message_id)
    }

    /// Uploads a photo as multipart form data.
    pub async fn send_photo(&self, chat: ChatId, photo: &Photo) -> TransportResult<i64> {
        let method = "sendPhoto";
        let part = Part::bytes(photo.data.to_vec())
            .file_name(photo.file_name.clone())
            .mime_str(mime_for(&photo.file_name))
            .map_err(|e| TransportError::SendFailed(e.without_url().to_string()))?;
        let mut form = Form::new()
            .text("chat_id", chat.0.to_string())
            .part("photo", part);
        if let Some(caption) = &photo.caption {
            form = form.text("caption", caption.clone());
        }

        debug!(method, bytes = photo.data.len(), "Calling Bot API");
        let resp = self
            .inner
            .client
            .post(format!("{}/{method}", self.inner.method_base))
            .multipart(form)
            .send()
            .await
            .map_err(|e| request_error(method, e))?;
        let sent: SentMessage = self.unwrap_envelope(method, resp).await?;
        Ok(sent.message_id)
    }

    /// Replaces the text of an earlier message. Its keyboard is removed.
    pub async fn edit_message_text(
        &self,
        chat: ChatId,
        message_id: i64,
        text: &str,
    ) -> TransportResult<()> {
        let body = json!({
            "chat_id": chat.0,
            "message_id": message_id,
            "text": text,
        });
        // Returns the edited Message, or `true` for inline messages.
        let _: Value = self.call("editMessageText", body).await?;
        Ok(())
    }

    /// Dismisses the loading indicator on a pressed button.
    pub async fn answer_callback_query(
        &self,
        callback_id: &str,
        text: Option<&str>,
    ) -> TransportResult<()> {
        let mut body = json!({ "callback_query_id": callback_id });
        if let Some(text) = text {
            body["text"] = json!(text);
        }
        let _: bool = self.call("answerCallbackQuery", body).await?;
        Ok(())
    }

    /// Resolves a file id to a downloadable path.
    pub async fn get_file(&self, file_id: &str) -> TransportResult<File> {
        self.call("getFile", json!({ "file_id": file_id })).await
    }

    /// Downloads a file by the path `getFile` returned.
    pub async fn download_file(&self, file_path: &str) -> TransportResult<Bytes> {
        let method = "downloadFile";
        let resp = self
            .inner
            .client
            .get(format!("{}/{file_path}", self.inner.file_base))
            .send()
            .await
            .map_err(|e| request_error(method, e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::Api {
                method: method.to_string(),
                code: Some(status.as_u16()),
                description: format!("download of {file_path} failed"),
            });
        }
        resp.bytes()
            .await
            .map_err(|e| request_error(method, e))
    }
}

impl std::fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramClient")
            .field("api_base", &self.inner.config.api_base)
            .field("username", &self.inner.config.username)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Delivery for TelegramClient {
    async fn deliver(&self, chat: ChatId, response: &Response) -> TransportResult<()> {
        // Acknowledge first so the button stops spinning while photos upload.
        if let Some(ack) = &response.callback_ack
            && let Err(e) = self
                .answer_callback_query(&ack.callback_id, ack.text.as_deref())
                .await
        {
            // Telegram rejects answers to queries older than a few seconds.
            debug!(error = %e, "Callback acknowledgement failed");
        }

        for reply in &response.replies {
            match reply {
                Reply::Text { text, buttons } => {
                    self.send_message(chat, text, buttons).await?;
                }
                Reply::Photo(photo) => {
                    self.send_photo(chat, photo).await?;
                }
                Reply::Edit { message_id, text } => {
                    self.edit_message_text(chat, *message_id, text).await?;
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl AttachmentFetcher for TelegramClient {
    async fn fetch(&self, attachment: &Attachment) -> AdapterResult<Bytes> {
        let file = self
            .get_file(&attachment.file_id)
            .await
            .map_err(to_adapter_error)?;
        let path = file.file_path.ok_or_else(|| {
            AdapterError::permanent("telegram", "file is too big to download through the Bot API")
        })?;
        let data = self.download_file(&path).await.map_err(to_adapter_error)?;
        debug!(file_id = %attachment.file_id, bytes = data.len(), "Attachment downloaded");
        Ok(data)
    }
}

fn keyboard(buttons: &[Button]) -> Value {
    let markup = InlineKeyboardMarkup {
        inline_keyboard: vec![
            buttons
                .iter()
                .map(|b| InlineKeyboardButton {
                    text: b.label.clone(),
                    callback_data: b.data.clone(),
                })
                .collect(),
        ],
    };
    json!(markup)
}

fn mime_for(file_name: &str) -> &'static str {
    let lower = file_name.to_ascii_lowercase();
    if lower.ends_with(".png") {
        "image/png"
    } else if lower.ends_with(".webp") {
        "image/webp"
    } else {
        "image/jpeg"
    }
}

fn request_error(method: &str, err: reqwest::Error) -> TransportError {
    let err = err.without_url();
    if err.is_timeout() || err.is_connect() {
        TransportError::ConnectionFailed {
            url: method.to_string(),
            reason: err.to_string(),
        }
    } else if err.is_decode() {
        TransportError::Decode(err.to_string())
    } else {
        TransportError::SendFailed(err.to_string())
    }
}

fn to_adapter_error(err: TransportError) -> AdapterError {
    if err.is_retryable() {
        AdapterError::transient("telegram", err.to_string())
    } else {
        AdapterError::permanent("telegram", err.to_string())
    }
}
