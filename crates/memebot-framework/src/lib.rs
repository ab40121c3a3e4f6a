//! # memebot framework
//!
//! Command dispatch and multi-stage pipelines.
//!
//! This layer provides:
//! - Command parsing for text commands, button presses and bare photos
//! - The [`Handler`] trait and a startup-only [`HandlerRegistry`]
//! - The [`Dispatcher`], which wraps every invocation with a deadline, panic
//!   containment, user-safe apologies and one completion log event
//! - Per-chat FIFO locks, duplicate suppression and held conversations
//! - The [`Pipeline`] engine with per-stage retry and reverse compensation
//! - The bounded-retry generator ([`generate`])

pub mod command;
pub mod context;
pub mod conversation;
pub mod dedup;
pub mod dispatcher;
pub mod error;
pub mod generator;
pub mod handler;
pub mod lanes;
pub mod pipeline;
pub mod registry;

pub use command::{CommandParser, Parsed, ParsedCommand, shell_split};
pub use context::HandlerContext;
pub use conversation::{Conversation, ConversationBusy, Conversations, DEFAULT_CONVERSATION_TTL};
pub use dedup::{DEFAULT_DEDUP_WINDOW, SeenMarkers};
pub use dispatcher::{DispatchOutcome, Dispatcher, DispatcherBuilder, DispatcherSettings};
pub use error::{
    HandlerError, HandlerResult, PipelineError, RegistryError, ResolveError, StageError,
};
pub use generator::{
    GenerationAttempt, GenerationOutcome, generate, generate_async, generate_recorded,
};
pub use handler::{BoxedHandler, FnHandler, Handler, HandlerOptions, handler_fn};
pub use lanes::{ChatGuard, ChatLocks, Ticket};
pub use pipeline::{FnStage, Pipeline, RetryPolicy, Stage};
pub use registry::{CommandInfo, HandlerRegistry, RegistryBuilder};

// Used by handler implementations across the workspace.
pub use async_trait::async_trait;
pub use tokio_util::sync::CancellationToken;
