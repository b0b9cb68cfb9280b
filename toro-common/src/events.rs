//! Event types for the Toro player manager
//!
//! Every state transition the manager performs on a player is published as a
//! `ManagerEvent` on an `EventBus`. Events are informational only: nothing in
//! the manager waits on a subscriber.

use crate::PlayerId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Scroll state reported by the container.
///
/// Exactly one value (`Idle`) means the container is at rest. Every other
/// value means the content is moving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollState {
    /// Container is not scrolling
    Idle,
    /// Content is being dragged by the user
    Dragging,
    /// Content is animating to its final position after a fling
    Settling,
}

impl ScrollState {
    pub fn is_idle(self) -> bool {
        matches!(self, ScrollState::Idle)
    }
}

/// Why pending deferred plays were cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// A newer play decision for the same player replaced it
    Superseded,
    /// The player was paused
    Paused,
    /// A release flushed the whole queue
    Released,
    /// A recycle flushed the whole queue
    Recycled,
    /// The manager was cleared
    Cleared,
    /// The container started scrolling
    Scrolling,
    /// The manager shut down
    Shutdown,
}

/// Player manager event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ManagerEvent {
    /// Player joined the membership set
    PlayerAttached {
        player_id: PlayerId,
        timestamp: DateTime<Utc>,
    },

    /// Player left the membership set
    PlayerDetached {
        player_id: PlayerId,
        timestamp: DateTime<Utc>,
    },

    /// Deferred play scheduled
    PlayScheduled {
        player_id: PlayerId,
        delay_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// `play()` was invoked on a player
    ///
    /// `deferred` is false when the delay policy asked for immediate playback.
    PlayStarted {
        player_id: PlayerId,
        deferred: bool,
        timestamp: DateTime<Utc>,
    },

    /// A timer-fired `play()` returned an error
    ///
    /// Only deferred plays produce this event; immediate plays return the
    /// error to the caller instead.
    PlayFailed {
        player_id: PlayerId,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// One or more pending deferred plays were cancelled
    ///
    /// `player_id` is set for identity-scoped cancellation and `None` for a
    /// global flush.
    PlaysCancelled {
        player_id: Option<PlayerId>,
        count: usize,
        reason: CancelReason,
        timestamp: DateTime<Utc>,
    },

    /// `pause()` was invoked on a player
    PlayerPaused {
        player_id: PlayerId,
        timestamp: DateTime<Utc>,
    },

    /// `release()` was invoked on a managed player
    PlayerReleased {
        player_id: PlayerId,
        timestamp: DateTime<Utc>,
    },

    /// Membership set emptied
    ManagerCleared {
        removed: usize,
        timestamp: DateTime<Utc>,
    },

    /// Container reported a scroll state change
    ScrollStateChanged {
        state: ScrollState,
        timestamp: DateTime<Utc>,
    },
}

impl ManagerEvent {
    /// Get event type as string for filtering
    pub fn event_type(&self) -> &str {
        match self {
            ManagerEvent::PlayerAttached { .. } => "PlayerAttached",
            ManagerEvent::PlayerDetached { .. } => "PlayerDetached",
            ManagerEvent::PlayScheduled { .. } => "PlayScheduled",
            ManagerEvent::PlayStarted { .. } => "PlayStarted",
            ManagerEvent::PlayFailed { .. } => "PlayFailed",
            ManagerEvent::PlaysCancelled { .. } => "PlaysCancelled",
            ManagerEvent::PlayerPaused { .. } => "PlayerPaused",
            ManagerEvent::PlayerReleased { .. } => "PlayerReleased",
            ManagerEvent::ManagerCleared { .. } => "ManagerCleared",
            ManagerEvent::ScrollStateChanged { .. } => "ScrollStateChanged",
        }
    }

    /// Player this event concerns, if it concerns exactly one
    pub fn player_id(&self) -> Option<PlayerId> {
        match self {
            ManagerEvent::PlayerAttached { player_id, .. }
            | ManagerEvent::PlayerDetached { player_id, .. }
            | ManagerEvent::PlayScheduled { player_id, .. }
            | ManagerEvent::PlayStarted { player_id, .. }
            | ManagerEvent::PlayFailed { player_id, .. }
            | ManagerEvent::PlayerPaused { player_id, .. }
            | ManagerEvent::PlayerReleased { player_id, .. } => Some(*player_id),
            ManagerEvent::PlaysCancelled { player_id, .. } => *player_id,
            ManagerEvent::ManagerCleared { .. } | ManagerEvent::ScrollStateChanged { .. } => None,
        }
    }
}

/// Event distribution bus for manager events
///
/// Wraps `tokio::sync::broadcast`:
/// - Publishing never blocks; slow subscribers see `Lagged` instead
/// - Any number of subscribers
/// - Subscribers only see events emitted after they subscribed
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ManagerEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per subscriber
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero (same contract as `broadcast::channel`).
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<ManagerEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: ManagerEvent,
    ) -> Result<usize, broadcast::error::SendError<ManagerEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: ManagerEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scroll_state_idle() {
        assert!(ScrollState::Idle.is_idle());
        assert!(!ScrollState::Dragging.is_idle());
        assert!(!ScrollState::Settling.is_idle());
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let id = PlayerId::new();
        let event = ManagerEvent::PlayScheduled {
            player_id: id,
            delay_ms: 250,
            timestamp: Utc::now(),
        };

        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "PlayScheduled");
        assert_eq!(json["delay_ms"], 250);
        assert_eq!(json["player_id"], id.to_string());
    }

    #[test]
    fn test_cancel_reason_snake_case() {
        let event = ManagerEvent::PlaysCancelled {
            player_id: None,
            count: 3,
            reason: CancelReason::Scrolling,
            timestamp: Utc::now(),
        };

        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["reason"], "scrolling");
        assert!(json["player_id"].is_null());
    }

    #[test]
    fn test_event_type_matches_serde_tag() {
        let event = ManagerEvent::ScrollStateChanged {
            state: ScrollState::Settling,
            timestamp: Utc::now(),
        };
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.event_type());
        assert_eq!(json["state"], "settling");
    }

    #[test]
    fn test_player_id_accessor() {
        let id = PlayerId::new();
        let scoped = ManagerEvent::PlaysCancelled {
            player_id: Some(id),
            count: 1,
            reason: CancelReason::Paused,
            timestamp: Utc::now(),
        };
        assert_eq!(scoped.player_id(), Some(id));

        let cleared = ManagerEvent::ManagerCleared {
            removed: 2,
            timestamp: Utc::now(),
        };
        assert_eq!(cleared.player_id(), None);
    }

    #[tokio::test]
    async fn test_event_bus_delivers_to_subscribers() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        let id = PlayerId::new();
        let delivered = bus
            .emit(ManagerEvent::PlayerAttached {
                player_id: id,
                timestamp: Utc::now(),
            })
            .unwrap();
        assert_eq!(delivered, 1);

        match rx.recv().await.unwrap() {
            ManagerEvent::PlayerAttached { player_id, .. } => assert_eq!(player_id, id),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(4);
        assert_eq!(bus.capacity(), 4);

        let event = ManagerEvent::ManagerCleared {
            removed: 0,
            timestamp: Utc::now(),
        };
        assert!(bus.emit(event.clone()).is_err());
        // Lossy variant must not panic
        bus.emit_lossy(event);
    }
}
