//! Per-invocation handler context.
//!
//! A [`HandlerContext`] is created by the dispatcher for exactly one handler
//! invocation and dropped when the invocation returns. It carries:
//!
//! - the originating [`Update`]
//! - a cancellation token, fired when the deadline passes or the bot shuts down
//! - the dispatch span, so work spawned by the handler logs under it
//! - a delivery handle for interim messages ("rendering…")
//! - the chat's conversation holds

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Span, warn};

use memebot_core::{Attachment, BoxedDelivery, ChatId, Response, Sender, Update};

use crate::conversation::{ConversationBusy, Conversations};

/// Scoped state handed to a handler by reference.
pub struct HandlerContext {
    update: Arc<Update>,
    token: String,
    cancel: CancellationToken,
    deadline: Instant,
    span: Span,
    delivery: BoxedDelivery,
    conversations: Conversations,
}

impl HandlerContext {
    /// Creates a context whose deadline is `timeout` from now.
    pub fn new(
        update: Arc<Update>,
        token: impl Into<String>,
        timeout: Duration,
        delivery: BoxedDelivery,
        conversations: Conversations,
    ) -> Self {
        Self {
            update,
            token: token.into(),
            cancel: CancellationToken::new(),
            deadline: Instant::now() + timeout,
            span: Span::current(),
            delivery,
            conversations,
        }
    }

    /// Uses `cancel` instead of a fresh token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn update(&self) -> &Update {
        &self.update
    }

    pub fn update_arc(&self) -> Arc<Update> {
        Arc::clone(&self.update)
    }

    pub fn chat(&self) -> ChatId {
        self.update.chat
    }

    pub fn sender(&self) -> &Sender {
        &self.update.sender
    }

    /// The command token this invocation was resolved from.
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before the deadline.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Sends an interim message to the chat.
    ///
    /// Best effort: a delivery failure is logged and otherwise ignored.
    pub async fn notify(&self, text: impl Into<String>) {
        let response = Response::text(text);
        if let Err(e) = self.delivery.deliver(self.chat(), &response).await {
            warn!(parent: &self.span, error = %e, "Interim message not delivered");
        }
    }

    /// Holds the chat for this command and its sender.
    pub fn begin_conversation(&self, attachments: Vec<Attachment>) -> Result<(), ConversationBusy> {
        self.conversations
            .begin(self.chat(), self.sender().id, &self.token, attachments)
    }

    /// Releases this chat's conversation. Returns `true` if one was held.
    pub fn end_conversation(&self) -> bool {
        self.conversations.end(self.chat()).is_some()
    }

    pub fn conversations(&self) -> &Conversations {
        &self.conversations
    }
}

impl std::fmt::Debug for HandlerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerContext")
            .field("token", &self.token)
            .field("chat", &self.update.chat)
            .field("sequence", &self.update.sequence)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}
