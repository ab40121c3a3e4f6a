//! Outbound response model.
//!
//! A handler returns one [`Response`], which may carry several replies (text,
//! photo, an edit of an earlier message) and an acknowledgement for the
//! callback that triggered it. Delivery sends the replies in order.

use bytes::Bytes;

/// Inline keyboard button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    /// Data delivered back as a callback when pressed.
    pub data: String,
}

impl Button {
    pub fn new(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            data: data.into(),
        }
    }
}

/// An encoded image to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Photo {
    pub data: Bytes,
    pub file_name: String,
    pub caption: Option<String>,
}

/// A single outbound action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Plain text, optionally with one row of inline buttons.
    Text { text: String, buttons: Vec<Button> },
    /// An image with an optional caption.
    Photo(Photo),
    /// Replace the text of a message sent earlier.
    Edit { message_id: i64, text: String },
}

/// Acknowledgement of an inline button press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackAck {
    pub callback_id: String,
    /// Short notice shown to the presser.
    pub text: Option<String>,
}

/// Everything a handler wants delivered back to the chat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    pub replies: Vec<Reply>,
    pub callback_ack: Option<CallbackAck>,
}

impl Response {
    /// A response that delivers nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A single text reply.
    pub fn text(text: impl Into<String>) -> Self {
        Self::empty().with_text(text)
    }

    /// A single photo reply.
    pub fn photo(data: impl Into<Bytes>, file_name: impl Into<String>) -> Self {
        Self::empty().with_photo(data, file_name)
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.replies.push(Reply::Text {
            text: text.into(),
            buttons: Vec::new(),
        });
        self
    }

    pub fn with_photo(mut self, data: impl Into<Bytes>, file_name: impl Into<String>) -> Self {
        self.replies.push(Reply::Photo(Photo {
            data: data.into(),
            file_name: file_name.into(),
            caption: None,
        }));
        self
    }

    /// Attaches a button to the last text reply.
    pub fn with_button(mut self, button: Button) -> Self {
        if let Some(Reply::Text { buttons, .. }) = self.replies.last_mut() {
            buttons.push(button);
        }
        self
    }

    /// Sets the caption of the last photo reply.
    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        if let Some(Reply::Photo(photo)) = self.replies.last_mut() {
            photo.caption = Some(caption.into());
        }
        self
    }

    pub fn with_edit(mut self, message_id: i64, text: impl Into<String>) -> Self {
        self.replies.push(Reply::Edit {
            message_id,
            text: text.into(),
        });
        self
    }

    pub fn with_callback_ack(
        mut self,
        callback_id: impl Into<String>,
        text: Option<String>,
    ) -> Self {
        self.callback_ack = Some(CallbackAck {
            callback_id: callback_id.into(),
            text,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.replies.is_empty() && self.callback_ack.is_none()
    }

    /// Texts of all text and edit replies, in order.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.replies.iter().filter_map(|reply| match reply {
            Reply::Text { text, .. } | Reply::Edit { text, .. } => Some(text.as_str()),
            Reply::Photo(_) => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buttons_attach_to_last_text() {
        let response = Response::text("first")
            .with_text("second")
            .with_button(Button::new("again", "REROLL:1:2024-01-01"));

        match &response.replies[1] {
            Reply::Text { buttons, .. } => assert_eq!(buttons.len(), 1),
            other => panic!("unexpected reply: {other:?}"),
        }
        match &response.replies[0] {
            Reply::Text { buttons, .. } => assert!(buttons.is_empty()),
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[test]
    fn test_caption_needs_photo() {
        let response = Response::text("no photo").with_caption("ignored");
        assert_eq!(response.texts().collect::<Vec<_>>(), vec!["no photo"]);

        let response = Response::photo(vec![1u8, 2, 3], "a.jpg").with_caption("hello");
        match &response.replies[0] {
            Reply::Photo(photo) => assert_eq!(photo.caption.as_deref(), Some("hello")),
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[test]
    fn test_empty() {
        assert!(Response::empty().is_empty());
        assert!(!Response::empty().with_callback_ack("cb", None).is_empty());
    }
}
