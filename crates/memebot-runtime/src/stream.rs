//! Update stream.
//!
//! Turns an [`UpdateSource`] into a lazy, infinite stream of updates. The
//! stream remembers the last sequence marker it yielded and passes it to the
//! next poll, which is how a remote source learns that earlier updates were
//! taken. A failing poll is retried with capped exponential backoff; the
//! stream ends only when the source reports it is closed.

use std::collections::VecDeque;

use futures::Stream;
use futures::stream;
use tracing::{debug, info, warn};

use memebot_core::{SequenceMarker, TransportError, Update, UpdateSource};
use memebot_framework::RetryPolicy;

struct PollState<S> {
    source: S,
    after: Option<SequenceMarker>,
    failures: u32,
    pending: VecDeque<Update>,
    backoff: RetryPolicy,
}

/// Streams updates from `source`, resuming after `start_after`.
pub fn update_stream<S>(
    source: S,
    start_after: Option<SequenceMarker>,
    backoff: RetryPolicy,
) -> impl Stream<Item = Update> + Send
where
    S: UpdateSource + 'static,
{
    let state = PollState {
        source,
        after: start_after,
        failures: 0,
        pending: VecDeque::new(),
        backoff,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(update) = state.pending.pop_front() {
                return Some((update, state));
            }

            match state.source.poll(state.after).await {
                Ok(batch) => {
                    if state.failures > 0 {
                        info!(source = state.source.name(), "Update source recovered");
                    }
                    state.failures = 0;
                    state.accept(batch);
                }
                Err(TransportError::Closed) => {
                    info!(source = state.source.name(), "Update source closed");
                    return None;
                }
                Err(e) => {
                    state.failures = state.failures.saturating_add(1);
                    let delay = state.backoff.delay_after(state.failures);
                    warn!(
                        source = state.source.name(),
                        error = %e,
                        retryable = e.is_retryable(),
                        failures = state.failures,
                        delay_ms = delay.as_millis() as u64,
                        "Polling failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    })
}

impl<S> PollState<S> {
    /// Queues the new updates of `batch` and advances the marker.
    fn accept(&mut self, batch: Vec<Update>) {
        for update in batch {
            if self.after.is_some_and(|after| update.sequence <= after) {
                debug!(sequence = %update.sequence, "Skipping already taken update");
                continue;
            }
            self.after = Some(update.sequence);
            self.pending.push_back(update);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::StreamExt;
    use memebot_core::{ChatId, Sender, TransportResult, UserId};
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;

    fn update(seq: u64) -> Update {
        Update::new(SequenceMarker(seq), ChatId(1), Sender::new(UserId(1), "u")).with_text("/ping")
    }

    /// Replays scripted poll results and records the markers it was asked for.
    struct ScriptedSource {
        script: VecDeque<TransportResult<Vec<Update>>>,
        asked: Arc<Mutex<Vec<Option<SequenceMarker>>>>,
    }

    #[async_trait]
    impl UpdateSource for ScriptedSource {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn poll(&mut self, after: Option<SequenceMarker>) -> TransportResult<Vec<Update>> {
            self.asked.lock().push(after);
            self.script.pop_front().unwrap_or(Err(TransportError::Closed))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_and_tracks_marker() {
        let asked = Arc::new(Mutex::new(Vec::new()));
        let source = ScriptedSource {
            script: VecDeque::from(vec![
                Ok(vec![update(1), update(2)]),
                Err(TransportError::ConnectionFailed {
                    url: "https://api.telegram.org".into(),
                    reason: "reset".into(),
                }),
                Ok(vec![update(2), update(3)]),
            ]),
            asked: Arc::clone(&asked),
        };
        let backoff = RetryPolicy::new(u32::MAX, Duration::from_secs(1), Duration::from_secs(4));

        let started = tokio::time::Instant::now();
        let seen: Vec<u64> = update_stream(source, None, backoff)
            .map(|u| u.sequence.0)
            .collect()
            .await;

        assert_eq!(seen, vec![1, 2, 3]);
        assert_eq!(
            *asked.lock(),
            vec![
                None,
                Some(SequenceMarker(2)),
                Some(SequenceMarker(2)),
                Some(SequenceMarker(3)),
            ]
        );
        assert!(started.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_resumes_after_marker() {
        let source = ScriptedSource {
            script: VecDeque::from(vec![Ok(vec![update(4), update(5), update(6)])]),
            asked: Arc::new(Mutex::new(Vec::new())),
        };

        let seen: Vec<u64> = update_stream(source, Some(SequenceMarker(5)), RetryPolicy::default())
            .map(|u| u.sequence.0)
            .collect()
            .await;

        assert_eq!(seen, vec![6]);
    }
}
