//! Update sources.
//!
//! An [`UpdateSource`] is polled for batches of updates strictly after a
//! sequence marker. The runtime turns repeated polls into a lazy, infinite
//! stream and restarts polling after transient failures, so a source only has
//! to answer one question: "what came after this marker?".
//!
//! Sources may acknowledge everything up to `after` when they are polled, which
//! makes resuming after a restart skip updates that were already handed out.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::foundation::error::{TransportError, TransportResult};
use crate::foundation::update::{SequenceMarker, Update};

/// Producer of inbound updates.
#[async_trait]
pub trait UpdateSource: Send {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Returns the next batch of updates whose marker is greater than `after`.
    ///
    /// May wait (long poll) until something arrives. An empty batch means
    /// nothing new yet. [`TransportError::Closed`] ends the stream.
    async fn poll(&mut self, after: Option<SequenceMarker>) -> TransportResult<Vec<Update>>;
}

/// Sending half of a [`ChannelSource`].
pub type UpdateSender = mpsc::Sender<Update>;

/// In-process source fed through a channel.
///
/// Used for local runs and tests. Updates at or before the resume marker are
/// skipped, mirroring how a remote source honours its offset.
pub struct ChannelSource {
    rx: mpsc::Receiver<Update>,
    max_batch: usize,
}

impl ChannelSource {
    /// Creates a source and the sender that feeds it.
    pub fn new(buffer: usize) -> (UpdateSender, Self) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (tx, Self { rx, max_batch: 64 })
    }

    fn is_new(update: &Update, after: Option<SequenceMarker>) -> bool {
        after.is_none_or(|marker| update.sequence > marker)
    }
}

#[async_trait]
impl UpdateSource for ChannelSource {
    fn name(&self) -> &str {
        "channel"
    }

    async fn poll(&mut self, after: Option<SequenceMarker>) -> TransportResult<Vec<Update>> {
        let Some(first) = self.rx.recv().await else {
            return Err(TransportError::Closed);
        };

        let mut batch = Vec::new();
        if Self::is_new(&first, after) {
            batch.push(first);
        }
        while batch.len() < self.max_batch {
            match self.rx.try_recv() {
                Ok(update) if Self::is_new(&update, after) => batch.push(update),
                Ok(_) => {}
                Err(_) => break,
            }
        }
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::update::{ChatId, Sender, UserId};

    fn update(seq: u64) -> Update {
        Update::new(SequenceMarker(seq), ChatId(1), Sender::new(UserId(1), "u")).with_text("hi")
    }

    #[tokio::test]
    async fn test_channel_source_batches() {
        let (tx, mut source) = ChannelSource::new(8);
        for seq in 1..=3 {
            tx.send(update(seq)).await.unwrap();
        }

        let batch = source.poll(None).await.unwrap();
        assert_eq!(batch.len(), 3);
    }

    #[tokio::test]
    async fn test_channel_source_skips_acknowledged() {
        let (tx, mut source) = ChannelSource::new(8);
        for seq in 1..=4 {
            tx.send(update(seq)).await.unwrap();
        }

        let batch = source.poll(Some(SequenceMarker(2))).await.unwrap();
        let seqs: Vec<u64> = batch.iter().map(|u| u.sequence.0).collect();
        assert_eq!(seqs, vec![3, 4]);
    }

    #[tokio::test]
    async fn test_channel_source_closed() {
        let (tx, mut source) = ChannelSource::new(1);
        drop(tx);
        assert!(matches!(source.poll(None).await, Err(TransportError::Closed)));
    }
}
