//! Handler trait and function handlers.
//!
//! A handler owns one command token. It receives the per-invocation
//! [`HandlerContext`] by reference and the [`ParsedCommand`] by value, and
//! returns the [`Response`] to deliver.
//!
//! Simple stateless handlers can be written as closures:
//!
//! ```rust,ignore
//! let start = handler_fn("show the greeting", |_update, _cmd| async {
//!     Ok(Response::text("hello"))
//! });
//! builder.register("start", start)?;
//! ```
//!
//! Handlers with state or several steps implement [`Handler`] directly and
//! declare their dispatch requirements through [`HandlerOptions`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use memebot_core::{Response, Update};

use crate::command::ParsedCommand;
use crate::context::HandlerContext;
use crate::error::{HandlerError, HandlerResult};

/// How the dispatcher must run a handler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandlerOptions {
    /// Invocations in the same chat run one at a time, in arrival order.
    pub serialize_per_chat: bool,
    /// A redelivered update (same sequence marker) is not executed again.
    pub suppress_duplicates: bool,
    /// Overrides the dispatcher's default deadline.
    pub deadline: Option<Duration>,
}

impl HandlerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serialized(mut self) -> Self {
        self.serialize_per_chat = true;
        self
    }

    pub fn idempotent(mut self) -> Self {
        self.suppress_duplicates = true;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Unit of logic bound to one command token.
#[async_trait]
pub trait Handler: Send + Sync {
    /// One-line description shown by `/help`.
    fn description(&self) -> &str {
        ""
    }

    fn options(&self) -> HandlerOptions {
        HandlerOptions::default()
    }

    async fn execute(&self, ctx: &HandlerContext, command: ParsedCommand)
    -> HandlerResult<Response>;

    /// User-facing text for a failure of this handler.
    ///
    /// `None` falls back to the dispatcher's generic message for the error kind.
    fn apology(&self, _error: &HandlerError) -> Option<String> {
        None
    }
}

/// Shared handler handle.
pub type BoxedHandler = Arc<dyn Handler>;

/// A stateless handler built from a closure.
pub struct FnHandler<F> {
    f: F,
    description: String,
    options: HandlerOptions,
}

/// Wraps `f` as a [`Handler`].
pub fn handler_fn<F, Fut>(description: impl Into<String>, f: F) -> FnHandler<F>
where
    F: Fn(Arc<Update>, ParsedCommand) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult<Response>> + Send,
{
    FnHandler {
        f,
        description: description.into(),
        options: HandlerOptions::default(),
    }
}

impl<F> FnHandler<F> {
    pub fn with_options(mut self, options: HandlerOptions) -> Self {
        self.options = options;
        self
    }
}

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Arc<Update>, ParsedCommand) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult<Response>> + Send,
{
    fn description(&self) -> &str {
        &self.description
    }

    fn options(&self) -> HandlerOptions {
        self.options
    }

    async fn execute(
        &self,
        ctx: &HandlerContext,
        command: ParsedCommand,
    ) -> HandlerResult<Response> {
        (self.f)(ctx.update_arc(), command).await
    }
}

impl<F> std::fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnHandler")
            .field("description", &self.description)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
