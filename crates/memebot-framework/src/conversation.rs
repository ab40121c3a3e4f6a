//! Multi-message conversations.
//!
//! Some commands need more than one message: `/dongzhuo` asks for two photos
//! in turn. A handler holds the chat with [`Conversations::begin`]; bare
//! attachments and plain text from the same user are then routed back to that
//! handler with everything collected so far. A hold expires after a period of inactivity so
//! an abandoned conversation never blocks the chat.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::time::Instant;

use memebot_core::{Attachment, ChatId, UserId};

use crate::command::ParsedCommand;

/// Idle time after which a held conversation is dropped.
pub const DEFAULT_CONVERSATION_TTL: Duration = Duration::from_secs(10 * 60);

/// A chat held by one user for one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub token: String,
    pub owner: UserId,
    pub attachments: Vec<Attachment>,
}

/// Another user already holds the chat.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("chat is busy with /{token}")]
pub struct ConversationBusy {
    pub token: String,
}

#[derive(Debug)]
struct Held {
    conversation: Conversation,
    touched: Instant,
}

/// Per-chat conversation holds, shared by the dispatcher and handlers.
#[derive(Debug, Clone)]
pub struct Conversations {
    held: Arc<Mutex<HashMap<ChatId, Held>>>,
    ttl: Duration,
}

impl Default for Conversations {
    fn default() -> Self {
        Self::new(DEFAULT_CONVERSATION_TTL)
    }
}

impl Conversations {
    pub fn new(ttl: Duration) -> Self {
        Self {
            held: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    /// Holds `chat` for `owner` running `token`, starting from `attachments`.
    ///
    /// The owner restarting replaces their previous hold. Fails if a different
    /// user holds a live conversation in the chat.
    pub fn begin(
        &self,
        chat: ChatId,
        owner: UserId,
        token: &str,
        attachments: Vec<Attachment>,
    ) -> Result<(), ConversationBusy> {
        let mut held = self.held.lock();
        if let Some(existing) = held.get(&chat)
            && existing.conversation.owner != owner
            && existing.touched.elapsed() < self.ttl
        {
            return Err(ConversationBusy {
                token: existing.conversation.token.clone(),
            });
        }

        held.insert(
            chat,
            Held {
                conversation: Conversation {
                    token: token.to_string(),
                    owner,
                    attachments,
                },
                touched: Instant::now(),
            },
        );
        Ok(())
    }

    /// Token of the live conversation `sender` holds in `chat`.
    ///
    /// Read-only; use [`continue_with`](Self::continue_with) to append.
    pub fn held_by(&self, chat: ChatId, sender: UserId) -> Option<String> {
        let held = self.held.lock();
        held.get(&chat)
            .filter(|h| h.touched.elapsed() < self.ttl && h.conversation.owner == sender)
            .map(|h| h.conversation.token.clone())
    }

    /// Appends `attachments` to the conversation `sender` holds in `chat`.
    ///
    /// Returns the command to dispatch, carrying every attachment collected so
    /// far, or `None` if the sender holds nothing here.
    pub fn continue_with(
        &self,
        chat: ChatId,
        sender: UserId,
        attachments: &[Attachment],
    ) -> Option<ParsedCommand> {
        let mut held = self.held.lock();
        let entry = held.get_mut(&chat)?;

        if entry.touched.elapsed() >= self.ttl {
            held.remove(&chat);
            return None;
        }
        if entry.conversation.owner != sender {
            return None;
        }

        entry.conversation.attachments.extend_from_slice(attachments);
        entry.touched = Instant::now();
        Some(
            ParsedCommand::new(entry.conversation.token.clone())
                .with_attachments(entry.conversation.attachments.clone()),
        )
    }

    /// Releases the hold on `chat`, returning what it held.
    pub fn end(&self, chat: ChatId) -> Option<Conversation> {
        self.held.lock().remove(&chat).map(|h| h.conversation)
    }

    /// The live conversation in `chat`, if any.
    pub fn get(&self, chat: ChatId) -> Option<Conversation> {
        let held = self.held.lock();
        held.get(&chat)
            .filter(|h| h.touched.elapsed() < self.ttl)
            .map(|h| h.conversation.clone())
    }
}
