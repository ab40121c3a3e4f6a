//! Per-chat advisory locks with FIFO hand-off.
//!
//! A dispatch that needs chat serialization takes a [`Ticket`] synchronously,
//! in arrival order, before it is spawned. Tickets for one chat are served
//! strictly in the order they were issued, no matter in which order the
//! spawned tasks get scheduled. Dropping a ticket or guard (including when its
//! task is aborted) passes the turn on.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use memebot_core::ChatId;

#[derive(Debug)]
struct Lane {
    next_ticket: u64,
    serving: u64,
    /// Tickets released out of turn, waiting for `serving` to reach them.
    released: BTreeSet<u64>,
    notify: Arc<Notify>,
}

impl Lane {
    fn new() -> Self {
        Self {
            next_ticket: 0,
            serving: 0,
            released: BTreeSet::new(),
            notify: Arc::new(Notify::new()),
        }
    }
}

/// Advisory locks keyed by chat.
#[derive(Debug, Clone, Default)]
pub struct ChatLocks {
    lanes: Arc<Mutex<HashMap<ChatId, Lane>>>,
}

impl ChatLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the next place in `chat`'s queue.
    pub fn ticket(&self, chat: ChatId) -> Ticket {
        let mut lanes = self.lanes.lock();
        let lane = lanes.entry(chat).or_insert_with(Lane::new);
        let number = lane.next_ticket;
        lane.next_ticket += 1;
        Ticket {
            locks: self.clone(),
            chat,
            number,
            notify: Arc::clone(&lane.notify),
        }
    }

    /// Number of chats with outstanding tickets.
    pub fn active_chats(&self) -> usize {
        self.lanes.lock().len()
    }

    fn is_turn(&self, chat: ChatId, number: u64) -> bool {
        self.lanes
            .lock()
            .get(&chat)
            .is_some_and(|lane| lane.serving == number)
    }

    fn release(&self, chat: ChatId, number: u64) {
        let mut lanes = self.lanes.lock();
        let Some(lane) = lanes.get_mut(&chat) else {
            return;
        };

        lane.released.insert(number);
        while lane.released.remove(&lane.serving) {
            lane.serving += 1;
        }
        lane.notify.notify_waiters();

        if lane.serving == lane.next_ticket {
            lanes.remove(&chat);
        }
    }
}

/// A place in a chat's queue.
#[derive(Debug)]
pub struct Ticket {
    locks: ChatLocks,
    chat: ChatId,
    number: u64,
    notify: Arc<Notify>,
}

impl Ticket {
    /// Waits until every earlier ticket for the chat has been released.
    pub async fn acquire(self) -> ChatGuard {
        let notify = Arc::clone(&self.notify);
        loop {
            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.locks.is_turn(self.chat, self.number) {
                return ChatGuard { _ticket: self };
            }
            notified.await;
        }
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        self.locks.release(self.chat, self.number);
    }
}

/// Exclusive turn in a chat; released on drop.
#[derive(Debug)]
pub struct ChatGuard {
    _ticket: Ticket,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_fifo_regardless_of_spawn_order() {
        let locks = ChatLocks::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let first = locks.ticket(ChatId(1));
        let second = locks.ticket(ChatId(1));

        let o = Arc::clone(&order);
        let late = tokio::spawn(async move {
            let _guard = second.acquire().await;
            o.lock().push(2);
        });
        let o = Arc::clone(&order);
        let early = tokio::spawn(async move {
            let _guard = first.acquire().await;
            tokio::time::sleep(Duration::from_millis(50)).await;
            o.lock().push(1);
        });

        early.await.unwrap();
        late.await.unwrap();
        assert_eq!(*order.lock(), vec![1, 2]);
        assert_eq!(locks.active_chats(), 0);
    }

    #[tokio::test]
    async fn test_dropped_ticket_passes_turn() {
        let locks = ChatLocks::new();
        let abandoned = locks.ticket(ChatId(1));
        let next = locks.ticket(ChatId(1));

        drop(abandoned);
        let _guard = next.acquire().await;
    }

    #[tokio::test]
    async fn test_chats_are_independent() {
        let locks = ChatLocks::new();
        let _held = locks.ticket(ChatId(1)).acquire().await;

        // A different chat is not blocked by the held guard.
        let _other = locks.ticket(ChatId(2)).acquire().await;
        assert_eq!(locks.active_chats(), 2);
    }
}
