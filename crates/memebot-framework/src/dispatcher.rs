//! Update dispatcher.
//!
//! The [`Dispatcher`] is the routing core. For every update it:
//!
//! 1. parses the command (or routes bare attachments and plain text to a held
//!    conversation)
//! 2. resolves the handler in the [`HandlerRegistry`]
//! 3. suppresses redelivered updates for handlers that ask for it, before a
//!    held conversation is advanced
//! 4. takes the chat's FIFO ticket for handlers that serialize per chat
//! 5. runs the handler under a deadline, with panics caught
//! 6. turns any failure into a user-safe apology and delivers the response
//!
//! Steps 1 to 4 run synchronously inside [`Dispatcher::dispatch`], so the
//! order in which updates are handed to `dispatch` is the order in which
//! serialized handlers run, however the returned futures are scheduled.
//!
//! ```rust,ignore
//! let dispatcher = Dispatcher::builder(registry, delivery)
//!     .with_settings(settings)
//!     .with_shutdown(shutdown.clone())
//!     .build();
//!
//! while let Some(update) = updates.next().await {
//!     tokio::spawn(dispatcher.dispatch(update));
//! }
//! ```

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, field, info, info_span, warn};

use memebot_core::{Attachment, BoxedDelivery, Response, Update};

use crate::command::{CommandParser, Parsed, ParsedCommand};
use crate::context::HandlerContext;
use crate::conversation::{Conversations, DEFAULT_CONVERSATION_TTL};
use crate::dedup::{DEFAULT_DEDUP_WINDOW, SeenMarkers};
use crate::error::{HandlerError, PipelineError, ResolveError};
use crate::handler::BoxedHandler;
use crate::lanes::{ChatLocks, Ticket};
use crate::registry::HandlerRegistry;

const APOLOGY_EXTERNAL: &str = "外部服务暂时不可用，请稍后再试。";
const APOLOGY_TIMEOUT: &str = "处理超时，已取消。";
const APOLOGY_INTERNAL: &str = "出了点问题，请稍后再试。";

/// Tunables for the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherSettings {
    /// Deadline for handlers that do not declare their own.
    pub default_deadline: Duration,
    /// Number of sequence markers remembered for duplicate suppression.
    pub dedup_window: usize,
    /// Idle time after which a held conversation expires.
    pub conversation_ttl: Duration,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            default_deadline: Duration::from_secs(180),
            dedup_window: DEFAULT_DEDUP_WINDOW,
            conversation_ttl: DEFAULT_CONVERSATION_TTL,
        }
    }
}

/// How one dispatch ended. Informational only; failures have already been
/// reported to the user and logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Nothing to act on.
    Ignored,
    /// A redelivered update for a handler that suppresses duplicates.
    Duplicate,
    /// No handler for the token; a help hint was sent.
    NotFound,
    /// The handler could not be built at startup.
    Unavailable,
    /// The handler returned a response.
    Completed,
    /// The handler failed; carries the error kind.
    Failed(&'static str),
}

impl DispatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ignored => "ignored",
            Self::Duplicate => "duplicate",
            Self::NotFound => "not_found",
            Self::Unavailable => "unavailable",
            Self::Completed => "completed",
            Self::Failed(_) => "failed",
        }
    }
}

/// Result of the synchronous part of a dispatch.
enum Plan {
    /// Finished without running a handler, optionally with a reply.
    Settled {
        token: Option<String>,
        outcome: DispatchOutcome,
        reply: Option<Response>,
    },
    Run {
        token: String,
        handler: BoxedHandler,
        command: ParsedCommand,
        deadline: Duration,
        ticket: Option<Ticket>,
    },
}

/// A parsed update before its conversation, if any, is advanced.
enum Incoming {
    Command(ParsedCommand),
    Continuation {
        token: String,
        attachments: Vec<Attachment>,
    },
}

impl Incoming {
    fn token(&self) -> &str {
        match self {
            Self::Command(command) => &command.token,
            Self::Continuation { token, .. } => token,
        }
    }
}

struct Inner {
    registry: HandlerRegistry,
    parser: CommandParser,
    delivery: BoxedDelivery,
    locks: ChatLocks,
    seen: SeenMarkers,
    conversations: Conversations,
    settings: DispatcherSettings,
    shutdown: CancellationToken,
}

/// Builder for [`Dispatcher`].
pub struct DispatcherBuilder {
    registry: HandlerRegistry,
    delivery: BoxedDelivery,
    parser: CommandParser,
    settings: DispatcherSettings,
    shutdown: CancellationToken,
}

impl DispatcherBuilder {
    pub fn with_parser(mut self, parser: CommandParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_settings(mut self, settings: DispatcherSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Token whose cancellation cancels every in-flight handler.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn build(self) -> Dispatcher {
        Dispatcher {
            inner: Arc::new(Inner {
                registry: self.registry,
                parser: self.parser,
                delivery: self.delivery,
                locks: ChatLocks::new(),
                seen: SeenMarkers::new(self.settings.dedup_window),
                conversations: Conversations::new(self.settings.conversation_ttl),
                settings: self.settings,
                shutdown: self.shutdown,
            }),
        }
    }
}

/// Routes updates to handlers. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    /// Creates a dispatcher with default settings.
    pub fn new(registry: HandlerRegistry, delivery: BoxedDelivery) -> Self {
        Self::builder(registry, delivery).build()
    }

    pub fn builder(registry: HandlerRegistry, delivery: BoxedDelivery) -> DispatcherBuilder {
        DispatcherBuilder {
            registry,
            delivery,
            parser: CommandParser::new(),
            settings: DispatcherSettings::default(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.inner.registry
    }

    pub fn conversations(&self) -> &Conversations {
        &self.inner.conversations
    }

    pub fn settings(&self) -> &DispatcherSettings {
        &self.inner.settings
    }

    /// Dispatches one update.
    ///
    /// Parsing, resolution, duplicate suppression and the per-chat ticket are
    /// handled before this returns; the returned future runs the handler and
    /// delivers the response. The future never fails and emits exactly one
    /// completion event.
    pub fn dispatch(&self, update: Update) -> impl Future<Output = DispatchOutcome> + Send + 'static {
        let started = Instant::now();
        let span = info_span!(
            "dispatch",
            chat = %update.chat,
            sequence = %update.sequence,
            token = field::Empty,
        );
        let plan = span.in_scope(|| self.plan(&update));
        if let Plan::Settled { token: Some(token), .. } | Plan::Run { token, .. } = &plan {
            span.record("token", token.as_str());
        }

        let inner = Arc::clone(&self.inner);
        async move {
            match plan {
                Plan::Settled {
                    token,
                    outcome,
                    reply,
                } => {
                    let delivered = match reply {
                        Some(reply) => deliver(&inner, &update, reply).await,
                        None => Ok(false),
                    };
                    finish(token.as_deref(), outcome, started, None, delivered);
                    outcome
                }
                Plan::Run {
                    token,
                    handler,
                    command,
                    deadline,
                    ticket,
                } => {
                    let guard = match ticket {
                        Some(ticket) => Some(ticket.acquire().await),
                        None => None,
                    };

                    let (outcome, reply, error) =
                        run_handler(&inner, update.clone(), &token, &handler, command, deadline)
                            .await;
                    let delivered = deliver(&inner, &update, reply).await;
                    drop(guard);

                    finish(Some(&token), outcome, started, error, delivered);
                    outcome
                }
            }
        }
        .instrument(span)
    }

    fn plan(&self, update: &Update) -> Plan {
        let inner = &self.inner;

        let incoming = match inner.parser.parse(update) {
            Parsed::Command(command) => Incoming::Command(command),
            Parsed::Continuation(attachments) => {
                match inner.conversations.held_by(update.chat, update.sender.id) {
                    Some(token) => Incoming::Continuation { token, attachments },
                    None => return settled(None, DispatchOutcome::Ignored, None),
                }
            }
            Parsed::Ignored => return settled(None, DispatchOutcome::Ignored, None),
        };

        let handler = match inner.registry.resolve(incoming.token()) {
            Ok(handler) => Arc::clone(handler),
            Err(ResolveError::NotFound { token }) => {
                // Stale or foreign buttons only get their spinner cleared.
                let reply = if update.callback().is_some() {
                    Response::empty()
                } else {
                    Response::text(format!("未知命令 /{token}，发送 /help 查看可用命令。"))
                };
                return settled(Some(token), DispatchOutcome::NotFound, Some(reply));
            }
            Err(ResolveError::Unavailable { token, reason }) => {
                debug!(reason = %reason, "Resolved to an unavailable command");
                let reply = Response::text(format!("/{token} 暂不可用。"));
                return settled(Some(token), DispatchOutcome::Unavailable, Some(reply));
            }
        };

        // Checked before a continuation is appended, so a redelivered photo
        // leaves the held conversation as it was.
        let options = handler.options();
        if options.suppress_duplicates && !inner.seen.first_sighting(update.sequence) {
            let token = incoming.token().to_string();
            return settled(Some(token), DispatchOutcome::Duplicate, Some(Response::empty()));
        }

        let command = match incoming {
            Incoming::Command(command) => command,
            Incoming::Continuation { attachments, .. } => {
                match inner
                    .conversations
                    .continue_with(update.chat, update.sender.id, &attachments)
                {
                    Some(command) => command,
                    None => return settled(None, DispatchOutcome::Ignored, None),
                }
            }
        };

        let ticket = options
            .serialize_per_chat
            .then(|| inner.locks.ticket(update.chat));

        Plan::Run {
            token: command.token.clone(),
            handler,
            command,
            deadline: options.deadline.unwrap_or(inner.settings.default_deadline),
            ticket,
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.inner.registry)
            .field("settings", &self.inner.settings)
            .finish_non_exhaustive()
    }
}

fn settled(token: Option<String>, outcome: DispatchOutcome, reply: Option<Response>) -> Plan {
    Plan::Settled {
        token,
        outcome,
        reply,
    }
}

/// Runs the handler with its deadline armed and turns any failure into an
/// apology. Returns the outcome, the response to deliver and, on failure, the
/// full error chain for the log.
async fn run_handler(
    inner: &Inner,
    update: Update,
    token: &str,
    handler: &BoxedHandler,
    command: ParsedCommand,
    deadline: Duration,
) -> (DispatchOutcome, Response, Option<String>) {
    let cancel = inner.shutdown.child_token();
    let ctx = HandlerContext::new(
        Arc::new(update),
        token,
        deadline,
        Arc::clone(&inner.delivery),
        inner.conversations.clone(),
    )
    .with_cancellation(cancel.clone())
    .with_span(Span::current());

    let run = AssertUnwindSafe(handler.execute(&ctx, command)).catch_unwind();
    tokio::pin!(run);

    // The deadline only raises the cancellation signal; the handler decides
    // when to stop.
    let result = tokio::select! {
        result = &mut run => result,
        _ = tokio::time::sleep_until(ctx.deadline()) => {
            cancel.cancel();
            run.await
        }
    };

    match result {
        Ok(Ok(response)) => (DispatchOutcome::Completed, response, None),
        Ok(Err(err)) => {
            let apology = handler
                .apology(&err)
                .unwrap_or_else(|| default_apology(token, &err));
            (
                DispatchOutcome::Failed(err.kind()),
                Response::text(apology),
                Some(error_chain(&err)),
            )
        }
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            (
                DispatchOutcome::Failed("panic"),
                Response::text(APOLOGY_INTERNAL),
                Some(format!("handler panicked: {message}")),
            )
        }
    }
}

/// Delivers `response`, acknowledging the originating button press if the
/// handler did not. Returns whether anything was sent.
async fn deliver(
    inner: &Inner,
    update: &Update,
    mut response: Response,
) -> Result<bool, String> {
    if response.callback_ack.is_none()
        && let Some(callback) = update.callback()
    {
        response = response.with_callback_ack(callback.id.clone(), None);
    }
    if response.is_empty() {
        return Ok(false);
    }
    inner
        .delivery
        .deliver(update.chat, &response)
        .await
        .map(|()| true)
        .map_err(|e| e.to_string())
}

fn finish(
    token: Option<&str>,
    outcome: DispatchOutcome,
    started: Instant,
    error: Option<String>,
    delivered: Result<bool, String>,
) {
    let latency_ms = started.elapsed().as_millis() as u64;
    let token = token.unwrap_or("-");
    let (delivered, delivery_error) = match delivered {
        Ok(sent) => (sent, None),
        Err(e) => (false, Some(e)),
    };

    match (outcome, error) {
        (DispatchOutcome::Failed(kind), error) => warn!(
            token,
            outcome = outcome.as_str(),
            kind,
            latency_ms,
            error = error.as_deref().unwrap_or(""),
            delivered,
            delivery_error = delivery_error.as_deref(),
            "Dispatch failed"
        ),
        (DispatchOutcome::Ignored, _) => debug!(outcome = outcome.as_str(), latency_ms, "Dispatch ignored"),
        _ if delivery_error.is_some() => warn!(
            token,
            outcome = outcome.as_str(),
            latency_ms,
            delivered,
            delivery_error = delivery_error.as_deref(),
            "Dispatch finished, delivery failed"
        ),
        _ => info!(
            token,
            outcome = outcome.as_str(),
            latency_ms,
            delivered,
            "Dispatch finished"
        ),
    }
}

fn default_apology(token: &str, err: &HandlerError) -> String {
    match err {
        HandlerError::Validation(message) => message.clone(),
        HandlerError::Cancelled | HandlerError::Pipeline(PipelineError::Cancelled { .. }) => {
            APOLOGY_TIMEOUT.to_string()
        }
        HandlerError::Pipeline(_) | HandlerError::Adapter(_) => APOLOGY_EXTERNAL.to_string(),
        HandlerError::Config(_) => format!("/{token} 暂不可用。"),
        HandlerError::Internal(_) => APOLOGY_INTERNAL.to_string(),
    }
}

/// Renders `err` and all of its sources as `outer: inner: root`.
fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut chain = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        chain.push_str(": ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    chain
}
