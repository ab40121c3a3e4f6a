//! The dispatch loop.
//!
//! [`BotRuntime`] pulls updates from an [`UpdateSource`], hands each one to the
//! [`Dispatcher`] in arrival order, and runs the resulting futures on a pool
//! bounded by `dispatch.max_concurrency`. On Ctrl+C or SIGTERM it stops polling,
//! waits up to `dispatch.drain_timeout_ms` for in-flight dispatches, then
//! cancels whatever is still running and waits for it to wind down.
//!
//! ```rust,ignore
//! use memebot_runtime::BotRuntime;
//!
//! let runtime = BotRuntime::builder(registry, delivery)
//!     .config(&config)
//!     .parser(CommandParser::new().with_bot_username("memebot"))
//!     .build();
//!
//! runtime.run(TelegramSource::new(client)).await?;
//! ```

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::StreamExt;
use tokio::signal;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use memebot_core::{BoxedDelivery, UpdateSource};
use memebot_framework::{
    CommandParser, DispatchOutcome, Dispatcher, DispatcherSettings, HandlerRegistry, RetryPolicy,
};

use crate::config::{BotConfig, DispatchConfig};
use crate::error::{RuntimeError, RuntimeResult};
use crate::stream::update_stream;

// =============================================================================
// Statistics
// =============================================================================

#[derive(Debug, Default)]
struct Counters {
    received: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    duplicates: AtomicU64,
    not_found: AtomicU64,
    unavailable: AtomicU64,
    ignored: AtomicU64,
}

impl Counters {
    fn record(&self, outcome: DispatchOutcome) {
        let counter = match outcome {
            DispatchOutcome::Completed => &self.completed,
            DispatchOutcome::Failed(_) => &self.failed,
            DispatchOutcome::Duplicate => &self.duplicates,
            DispatchOutcome::NotFound => &self.not_found,
            DispatchOutcome::Unavailable => &self.unavailable,
            DispatchOutcome::Ignored => &self.ignored,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Snapshot of what the loop has processed so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    pub received: u64,
    pub completed: u64,
    pub failed: u64,
    pub duplicates: u64,
    pub not_found: u64,
    pub unavailable: u64,
    pub ignored: u64,
    /// Dispatches currently running.
    pub in_flight: usize,
}

// =============================================================================
// BotRuntime
// =============================================================================

/// Owns the dispatcher and drives it from an update source.
pub struct BotRuntime {
    dispatcher: Dispatcher,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    cancel_handlers: CancellationToken,
    drain_timeout: Duration,
    source_backoff: RetryPolicy,
    counters: Arc<Counters>,
}

impl BotRuntime {
    pub fn builder(registry: HandlerRegistry, delivery: BoxedDelivery) -> RuntimeBuilder {
        RuntimeBuilder::new(registry, delivery)
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn stats(&self) -> RuntimeStats {
        let c = &self.counters;
        RuntimeStats {
            received: c.received.load(Ordering::Relaxed),
            completed: c.completed.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            duplicates: c.duplicates.load(Ordering::Relaxed),
            not_found: c.not_found.load(Ordering::Relaxed),
            unavailable: c.unavailable.load(Ordering::Relaxed),
            ignored: c.ignored.load(Ordering::Relaxed),
            in_flight: self.tracker.len(),
        }
    }

    /// Runs until Ctrl+C / SIGTERM or until the source closes.
    pub async fn run<S>(&self, source: S) -> RuntimeResult<()>
    where
        S: UpdateSource + 'static,
    {
        info!("memebot is now running. Press Ctrl+C to stop.");
        self.run_until(source, wait_for_shutdown()).await
    }

    /// Runs until `shutdown` resolves or the source closes.
    pub async fn run_until<S, F>(&self, source: S, shutdown: F) -> RuntimeResult<()>
    where
        S: UpdateSource + 'static,
        F: Future<Output = ()>,
    {
        info!(
            source = source.name(),
            max_concurrency = self.permits.available_permits(),
            commands = self.dispatcher.registry().len(),
            "Dispatch loop started"
        );

        let updates = update_stream(source, None, self.source_backoff);
        tokio::pin!(updates);
        tokio::pin!(shutdown);

        loop {
            let update = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested, no longer polling");
                    break;
                }
                next = updates.next() => match next {
                    Some(update) => update,
                    None => break,
                },
            };
            self.counters.received.fetch_add(1, Ordering::Relaxed);

            // Waiting for a permit keeps the source unpolled, so nothing is
            // acknowledged that cannot run yet.
            let permit = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested while waiting for a free slot");
                    break;
                }
                permit = Arc::clone(&self.permits).acquire_owned() => {
                    permit.map_err(|_| RuntimeError::PoolClosed)?
                }
            };

            let dispatch = self.dispatcher.dispatch(update);
            let counters = Arc::clone(&self.counters);
            self.tracker.spawn(async move {
                let outcome = dispatch.await;
                counters.record(outcome);
                drop(permit);
            });
        }

        self.drain().await;
        let stats = self.stats();
        info!(
            received = stats.received,
            completed = stats.completed,
            failed = stats.failed,
            "Dispatch loop stopped"
        );
        Ok(())
    }

    /// Waits for in-flight dispatches, cancelling them after the drain timeout.
    async fn drain(&self) {
        self.tracker.close();
        if self.tracker.is_empty() {
            return;
        }

        info!(in_flight = self.tracker.len(), "Waiting for in-flight dispatches");
        if tokio::time::timeout(self.drain_timeout, self.tracker.wait())
            .await
            .is_err()
        {
            warn!(
                in_flight = self.tracker.len(),
                "Drain timeout elapsed, cancelling in-flight handlers"
            );
            self.cancel_handlers.cancel();
            self.tracker.wait().await;
        }
    }
}

impl std::fmt::Debug for BotRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotRuntime")
            .field("dispatcher", &self.dispatcher)
            .field("drain_timeout", &self.drain_timeout)
            .finish_non_exhaustive()
    }
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                error!(error = %e, "Failed to register SIGTERM handler, only Ctrl+C will stop");
                if signal::ctrl_c().await.is_ok() {
                    info!("Received Ctrl+C, shutting down");
                }
                return;
            }
        };

        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => error!(error = %e, "Failed to listen for Ctrl+C"),
        }
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for [`BotRuntime`].
pub struct RuntimeBuilder {
    registry: HandlerRegistry,
    delivery: BoxedDelivery,
    parser: CommandParser,
    dispatch: DispatchConfig,
}

impl RuntimeBuilder {
    pub fn new(registry: HandlerRegistry, delivery: BoxedDelivery) -> Self {
        Self {
            registry,
            delivery,
            parser: CommandParser::new(),
            dispatch: DispatchConfig::default(),
        }
    }

    /// Takes the `dispatch` section of `config`.
    pub fn config(mut self, config: &BotConfig) -> Self {
        self.dispatch = config.dispatch.clone();
        self
    }

    pub fn dispatch_config(mut self, dispatch: DispatchConfig) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn parser(mut self, parser: CommandParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn build(self) -> BotRuntime {
        let settings: DispatcherSettings = self.dispatch.to_settings();
        let cancel_handlers = CancellationToken::new();
        let dispatcher = Dispatcher::builder(self.registry, self.delivery)
            .with_parser(self.parser)
            .with_settings(settings)
            .with_shutdown(cancel_handlers.clone())
            .build();

        BotRuntime {
            dispatcher,
            permits: Arc::new(Semaphore::new(self.dispatch.max_concurrency.max(1))),
            tracker: TaskTracker::new(),
            cancel_handlers,
            drain_timeout: self.dispatch.drain_timeout(),
            source_backoff: self.dispatch.source_backoff(),
            counters: Arc::new(Counters::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use memebot_core::{
        ChannelSource, ChatId, RecordingDelivery, Response, Sender, SequenceMarker, Update, UserId,
    };
    use memebot_framework::{
        Handler, HandlerContext, HandlerError, HandlerOptions, HandlerResult, ParsedCommand,
        RegistryBuilder, handler_fn,
    };
    use std::sync::atomic::AtomicUsize;

    fn update(seq: u64, chat: i64, text: &str) -> Update {
        Update::new(SequenceMarker(seq), ChatId(chat), Sender::new(UserId(1), "alice"))
            .with_text(text)
    }

    /// Sleeps and tracks the highest number of concurrent executions.
    struct Gauge {
        running: AtomicUsize,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Handler for Gauge {
        async fn execute(
            &self,
            _ctx: &HandlerContext,
            _command: ParsedCommand,
        ) -> HandlerResult<Response> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(Response::text("done"))
        }
    }

    struct Stubborn;

    #[async_trait]
    impl Handler for Stubborn {
        fn options(&self) -> HandlerOptions {
            HandlerOptions::new().with_deadline(Duration::from_secs(3600))
        }

        async fn execute(
            &self,
            ctx: &HandlerContext,
            _command: ParsedCommand,
        ) -> HandlerResult<Response> {
            ctx.cancellation().cancelled().await;
            Err(HandlerError::Cancelled)
        }
    }

    #[tokio::test]
    async fn test_runs_until_source_closes() {
        let mut builder = RegistryBuilder::new();
        builder
            .register("ping", handler_fn("", |_, _| async { Ok(Response::text("pong")) }))
            .unwrap();
        let delivery = Arc::new(RecordingDelivery::new());
        let runtime = BotRuntime::builder(builder.build(), delivery.clone()).build();

        let (tx, source) = ChannelSource::new(8);
        tx.send(update(1, 10, "/ping")).await.unwrap();
        tx.send(update(2, 10, "/nope")).await.unwrap();
        tx.send(update(3, 10, "just chatting")).await.unwrap();
        drop(tx);

        runtime
            .run_until(source, futures::future::pending())
            .await
            .unwrap();

        let stats = runtime.stats();
        assert_eq!(stats.received, 3);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.not_found, 1);
        assert_eq!(stats.ignored, 1);
        assert_eq!(stats.in_flight, 0);
        assert_eq!(delivery.texts_for(ChatId(10)).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_is_bounded() {
        let peak = Arc::new(AtomicUsize::new(0));
        let mut builder = RegistryBuilder::new();
        builder
            .register(
                "work",
                Gauge {
                    running: AtomicUsize::new(0),
                    peak: Arc::clone(&peak),
                },
            )
            .unwrap();
        let delivery = Arc::new(RecordingDelivery::new());
        let runtime = BotRuntime::builder(builder.build(), delivery.clone())
            .dispatch_config(DispatchConfig {
                max_concurrency: 2,
                ..Default::default()
            })
            .build();

        let (tx, source) = ChannelSource::new(8);
        for seq in 1..=5 {
            tx.send(update(seq, seq as i64, "/work")).await.unwrap();
        }
        drop(tx);

        runtime
            .run_until(source, futures::future::pending())
            .await
            .unwrap();

        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert_eq!(runtime.stats().completed, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_after_drain_timeout() {
        let mut builder = RegistryBuilder::new();
        builder.register("hang", Stubborn).unwrap();
        let delivery = Arc::new(RecordingDelivery::new());
        let runtime = BotRuntime::builder(builder.build(), delivery.clone())
            .dispatch_config(DispatchConfig {
                drain_timeout_ms: 200,
                ..Default::default()
            })
            .build();

        let (tx, source) = ChannelSource::new(8);
        tx.send(update(1, 10, "/hang")).await.unwrap();

        let shutdown = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
        };
        runtime.run_until(source, shutdown).await.unwrap();
        drop(tx);

        let stats = runtime.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.in_flight, 0);
        assert_eq!(delivery.texts_for(ChatId(10)), vec!["处理超时，已取消。"]);
    }
}
