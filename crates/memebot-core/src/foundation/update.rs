//! Inbound update model.
//!
//! An [`Update`] is one event pulled from the chat transport: a text message, a
//! message carrying image attachments, or a callback from an inline button.
//! Updates are created by an update source and are read-only afterwards; the
//! dispatcher shares them behind an `Arc` for the duration of one dispatch.
//!
//! ```rust,ignore
//! let update = Update::new(SequenceMarker(42), ChatId(7), Sender::new(UserId(1), "alice"))
//!     .with_text("/fortune");
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of the chat an update arrived in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the user who sent an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic position of an update in its source.
///
/// Sources resume after the last acknowledged marker; the dispatcher uses it to
/// recognise redelivered updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SequenceMarker(pub u64);

impl SequenceMarker {
    /// The marker immediately after this one.
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for SequenceMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The user behind an update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    pub id: UserId,
    pub display_name: String,
    #[serde(default)]
    pub username: Option<String>,
}

impl Sender {
    pub fn new(id: UserId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            username: None,
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }
}

/// What kind of file an attachment refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    /// A compressed photo.
    Photo,
    /// A file sent as a document (only image documents are surfaced).
    Document,
}

/// Opaque reference to a binary attachment held by the transport.
///
/// The bytes are not part of the update; they are fetched on demand through an
/// [`AttachmentFetcher`](crate::AttachmentFetcher).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub file_id: String,
    pub kind: AttachmentKind,
    #[serde(default)]
    pub unique_id: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
}

impl Attachment {
    /// A photo attachment with only its file id known.
    pub fn photo(file_id: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            kind: AttachmentKind::Photo,
            unique_id: None,
            mime_type: None,
            file_name: None,
        }
    }

    /// File suffix (with the leading dot) used when storing the attachment.
    ///
    /// Taken from the file name when there is one, then from the MIME type,
    /// falling back to `.jpg` which is what photo transports hand out.
    pub fn suffix(&self) -> String {
        if let Some(name) = &self.file_name
            && let Some(dot) = name.rfind('.')
            && dot + 1 < name.len()
        {
            return name[dot..].to_ascii_lowercase();
        }
        match self.mime_type.as_deref() {
            Some("image/png") => ".png".into(),
            Some("image/webp") => ".webp".into(),
            _ => ".jpg".into(),
        }
    }
}

/// A press on an inline keyboard button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackAction {
    /// Transport id used to acknowledge the press.
    pub id: String,
    /// The data string attached to the button.
    pub data: String,
    /// The message carrying the keyboard, if still accessible.
    #[serde(default)]
    pub message_id: Option<i64>,
}

/// Raw content of an update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub callback: Option<CallbackAction>,
}

/// One inbound event from the chat transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
    pub sequence: SequenceMarker,
    pub chat: ChatId,
    pub sender: Sender,
    /// Id of the message this update carries, used for replies and edits.
    #[serde(default)]
    pub message_id: Option<i64>,
    #[serde(default)]
    pub payload: Payload,
}

impl Update {
    /// Creates an update with an empty payload.
    pub fn new(sequence: SequenceMarker, chat: ChatId, sender: Sender) -> Self {
        Self {
            sequence,
            chat,
            sender,
            message_id: None,
            payload: Payload::default(),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.payload.text = Some(text.into());
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.payload.attachments.push(attachment);
        self
    }

    pub fn with_callback(mut self, callback: CallbackAction) -> Self {
        self.payload.callback = Some(callback);
        self
    }

    pub fn with_message_id(mut self, message_id: i64) -> Self {
        self.message_id = Some(message_id);
        self
    }

    /// Text or caption of the update.
    pub fn text(&self) -> Option<&str> {
        self.payload.text.as_deref()
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.payload.attachments
    }

    pub fn callback(&self) -> Option<&CallbackAction> {
        self.payload.callback.as_ref()
    }

    /// Returns `true` if the update carries nothing a handler could act on.
    pub fn is_empty(&self) -> bool {
        self.payload.text.as_deref().is_none_or(|t| t.trim().is_empty())
            && self.payload.attachments.is_empty()
            && self.payload.callback.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender() -> Sender {
        Sender::new(UserId(1), "alice")
    }

    #[test]
    fn test_builder_and_accessors() {
        let update = Update::new(SequenceMarker(5), ChatId(10), sender())
            .with_text("/dongzhuo")
            .with_attachment(Attachment::photo("AgAD"))
            .with_message_id(99);

        assert_eq!(update.text(), Some("/dongzhuo"));
        assert_eq!(update.attachments().len(), 1);
        assert_eq!(update.message_id, Some(99));
        assert!(!update.is_empty());
    }

    #[test]
    fn test_empty_update() {
        let update = Update::new(SequenceMarker(1), ChatId(1), sender()).with_text("   ");
        assert!(update.is_empty());
    }

    #[test]
    fn test_attachment_suffix() {
        assert_eq!(Attachment::photo("x").suffix(), ".jpg");

        let mut doc = Attachment::photo("y");
        doc.kind = AttachmentKind::Document;
        doc.file_name = Some("Portrait.PNG".into());
        assert_eq!(doc.suffix(), ".png");

        doc.file_name = Some("noext".into());
        doc.mime_type = Some("image/webp".into());
        assert_eq!(doc.suffix(), ".webp");
    }

    #[test]
    fn test_update_serde_shape() {
        let json = r#"{"sequence":3,"chat":-100,"sender":{"id":8,"display_name":"bob"},"payload":{"text":"/start"}}"#;
        let update: Update = serde_json::from_str(json).unwrap();
        assert_eq!(update.sequence, SequenceMarker(3));
        assert_eq!(update.chat, ChatId(-100));
        assert_eq!(update.text(), Some("/start"));
        assert!(update.callback().is_none());
    }
}
