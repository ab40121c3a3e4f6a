//! Long-poll update source.

use async_trait::async_trait;
use tracing::debug;

use memebot_core::{SequenceMarker, TransportResult, Update, UpdateSource};

use crate::client::TelegramClient;
use crate::convert::to_update;

/// [`UpdateSource`] over `getUpdates`.
///
/// The offset sent to Telegram acknowledges everything up to the newest
/// update id seen, including updates that were dropped during conversion, so
/// unsupported updates are never fetched twice.
#[derive(Debug)]
pub struct TelegramSource {
    client: TelegramClient,
    last_seen: Option<i64>,
}

impl TelegramSource {
    pub fn new(client: TelegramClient) -> Self {
        Self {
            client,
            last_seen: None,
        }
    }

    fn offset(&self, after: Option<SequenceMarker>) -> Option<i64> {
        let after = after.and_then(|m| i64::try_from(m.0).ok());
        match (after, self.last_seen) {
            (Some(a), Some(b)) => Some(a.max(b) + 1),
            (Some(id), None) | (None, Some(id)) => Some(id + 1),
            (None, None) => None,
        }
    }
}

#[async_trait]
impl UpdateSource for TelegramSource {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn poll(&mut self, after: Option<SequenceMarker>) -> TransportResult<Vec<Update>> {
        let raw = self.client.get_updates(self.offset(after)).await?;

        let fetched = raw.len();
        if let Some(newest) = raw.iter().map(|u| u.update_id).max() {
            self.last_seen = Some(self.last_seen.map_or(newest, |seen| seen.max(newest)));
        }
        let updates: Vec<Update> = raw.into_iter().filter_map(to_update).collect();
        if fetched > 0 {
            debug!(fetched, kept = updates.len(), "Polled Telegram");
        }
        Ok(updates)
    }
}
