//! Pending deferred plays
//!
//! Timer table holding at most one deferred play per player. Backed by a
//! `DelayQueue`, with a side map from `PlayerId` to the queue key so that
//! identity-scoped cancellation is O(1).
//!
//! Cancellation comes in two deliberately separate primitives:
//! - `cancel(player_id)` removes only that player's entry (pause, supersede)
//! - `cancel_all()` flushes every entry (release, recycle, clear, scroll)
//!
//! The timer wheel only accepts deadlines a little over two years out, while
//! a dispatcher may ask for any positive delay. Each entry therefore keeps its
//! real deadline and the queue is armed for at most `MAX_WHEEL_DELAY` at a
//! time; an entry that surfaces early is re-armed for the remainder.

use crate::player::Player;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::time::delay_queue::{DelayQueue, Key};
use toro_common::PlayerId;
use tracing::trace;

/// Longest span a single queue insertion covers
pub const MAX_WHEEL_DELAY: Duration = Duration::from_secs(180 * 24 * 60 * 60);

struct Entry {
    key: Key,
    seq: u64,
    /// `None` when the deadline is past what `Instant` can represent
    deadline: Option<Instant>,
    player: Arc<dyn Player>,
}

/// Deferred plays waiting for their timer
pub struct PendingPlays {
    queue: DelayQueue<(PlayerId, u64)>,
    entries: HashMap<PlayerId, Entry>,
    next_seq: u64,
}

impl PendingPlays {
    pub fn new() -> Self {
        Self {
            queue: DelayQueue::new(),
            entries: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Schedule `player` to play after `delay`
    ///
    /// Any play already pending for the same player is cancelled first.
    /// Returns true if an older pending play was replaced.
    pub fn schedule(&mut self, player: Arc<dyn Player>, delay: Duration) -> bool {
        let id = player.id();
        let replaced = self.cancel(id);

        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);

        // An idle wheel stops advancing, so a later insert would measure
        // its span from a stale origin
        if self.entries.is_empty() {
            self.queue = DelayQueue::new();
        }

        let now = Instant::now();
        let deadline = now.checked_add(delay);
        let key = self.queue.insert_at((id, seq), now + delay.min(MAX_WHEEL_DELAY));
        self.entries.insert(
            id,
            Entry {
                key,
                seq,
                deadline,
                player,
            },
        );
        replaced
    }

    /// Cancel the pending play of one player
    ///
    /// Returns true if there was one.
    pub fn cancel(&mut self, player_id: PlayerId) -> bool {
        match self.entries.remove(&player_id) {
            Some(entry) => {
                self.queue.try_remove(&entry.key);
                true
            }
            None => false,
        }
    }

    /// Cancel every pending play
    ///
    /// Returns how many were cancelled.
    pub fn cancel_all(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        self.queue.clear();
        count
    }

    pub fn contains(&self, player_id: PlayerId) -> bool {
        self.entries.contains_key(&player_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Wait for the next deferred play to come due
    ///
    /// The returned player's entry has already been removed from the table,
    /// so it will not fire twice. An expired queue item whose sequence number
    /// no longer matches the table (cancelled and rescheduled) is dropped,
    /// and one that surfaced before its real deadline is re-armed.
    ///
    /// Resolves to `None` immediately when nothing is pending. Cancel safe.
    pub async fn next_due(&mut self) -> Option<Arc<dyn Player>> {
        loop {
            let expired = self.queue.next().await?;
            let (id, seq) = expired.into_inner();

            let now = Instant::now();
            match self.entries.get_mut(&id) {
                Some(entry) if entry.seq == seq => match entry.deadline {
                    Some(deadline) if deadline <= now => {
                        return self.entries.remove(&id).map(|entry| entry.player);
                    }
                    deadline => {
                        let remaining = deadline
                            .map_or(MAX_WHEEL_DELAY, |deadline| deadline - now)
                            .min(MAX_WHEEL_DELAY);
                        entry.key = self.queue.insert_at((id, seq), now + remaining);
                        trace!(
                            player_id = %id,
                            remaining_ms = remaining.as_millis() as u64,
                            "Re-armed long deferred play"
                        );
                    }
                },
                _ => trace!(player_id = %id, seq, "Dropping stale deferred play"),
            }
        }
    }
}

impl Default for PendingPlays {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::{Container, PlaybackInfo};
    use crate::Result;
    use tokio::time::{sleep, timeout};

    struct StubPlayer {
        id: PlayerId,
    }

    impl Player for StubPlayer {
        fn id(&self) -> PlayerId {
            self.id
        }
        fn player_order(&self) -> usize {
            0
        }
        fn initialize(&self, _: &dyn Container, _: PlaybackInfo) -> Result<()> {
            Ok(())
        }
        fn play(&self) -> Result<()> {
            Ok(())
        }
        fn pause(&self) -> Result<()> {
            Ok(())
        }
        fn release(&self) -> Result<()> {
            Ok(())
        }
    }

    fn stub() -> Arc<dyn Player> {
        Arc::new(StubPlayer { id: PlayerId::new() })
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_fires_after_delay() {
        let mut pending = PendingPlays::new();
        let player = stub();
        assert!(!pending.schedule(player.clone(), Duration::from_millis(50)));
        assert!(pending.contains(player.id()));

        let due = pending.next_due().await.expect("play should come due");
        assert_eq!(due.id(), player.id());
        assert!(pending.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_replaces_existing_entry() {
        let mut pending = PendingPlays::new();
        let player = stub();
        pending.schedule(player.clone(), Duration::from_millis(50));
        assert!(pending.schedule(player.clone(), Duration::from_millis(80)));
        assert_eq!(pending.len(), 1);

        let start = tokio::time::Instant::now();
        let due = pending.next_due().await.unwrap();
        assert_eq!(due.id(), player.id());
        assert!(start.elapsed() >= Duration::from_millis(80));

        // The replaced timer must not surface later
        assert!(pending.next_due().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_identity_scoped() {
        let mut pending = PendingPlays::new();
        let a = stub();
        let b = stub();
        pending.schedule(a.clone(), Duration::from_millis(20));
        pending.schedule(b.clone(), Duration::from_millis(30));

        assert!(pending.cancel(a.id()));
        assert!(!pending.cancel(a.id()));
        assert!(pending.contains(b.id()));

        let due = pending.next_due().await.unwrap();
        assert_eq!(due.id(), b.id());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_flushes_everything() {
        let mut pending = PendingPlays::new();
        for _ in 0..3 {
            pending.schedule(stub(), Duration::from_millis(10));
        }
        assert_eq!(pending.cancel_all(), 3);
        assert!(pending.is_empty());

        sleep(Duration::from_millis(50)).await;
        assert!(pending.next_due().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_due_waits_for_deadline() {
        let mut pending = PendingPlays::new();
        pending.schedule(stub(), Duration::from_millis(100));

        let early = timeout(Duration::from_millis(50), pending.next_due()).await;
        assert!(early.is_err(), "play must not come due before its delay");
        assert_eq!(pending.len(), 1);

        assert!(pending.next_due().await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_beyond_wheel_range_is_rearmed() {
        let mut pending = PendingPlays::new();
        let player = stub();
        let delay = MAX_WHEEL_DELAY * 5 + Duration::from_millis(7);
        pending.schedule(player.clone(), delay);

        let start = Instant::now();
        let due = pending.next_due().await.expect("play should come due");
        assert_eq!(due.id(), player.id());
        assert!(start.elapsed() >= delay);
        assert!(start.elapsed() < delay + Duration::from_secs(1));
        assert!(pending.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_far_future_deadline_never_comes_due() {
        let mut pending = PendingPlays::new();
        let player = stub();
        pending.schedule(player.clone(), Duration::from_millis(i64::MAX as u64));

        let early = timeout(MAX_WHEEL_DELAY * 3, pending.next_due()).await;
        assert!(early.is_err());
        assert!(pending.contains(player.id()));
        assert!(pending.cancel(player.id()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_queue_accepts_long_delay_later() {
        let mut pending = PendingPlays::new();
        pending.schedule(stub(), Duration::from_millis(10));
        assert!(pending.next_due().await.is_some());

        sleep(MAX_WHEEL_DELAY * 6).await;

        let player = stub();
        pending.schedule(player.clone(), MAX_WHEEL_DELAY * 2);
        let due = pending.next_due().await.unwrap();
        assert_eq!(due.id(), player.id());
    }
}
