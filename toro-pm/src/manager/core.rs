//! Scheduler loop
//!
//! `ManagerState` is the single owner of the membership set and the
//! pending-play table. `run` drives it from one tokio task: commands are
//! applied in the order they were sent, and due deferred plays fire between
//! commands. Nothing here ever runs concurrently with anything else, so a
//! cancellation that was applied can never be overtaken by its timer.

use super::pending::PendingPlays;
use super::Command;
use crate::delay::Delay;
use crate::player::{Container, Player};
use crate::Result;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use toro_common::events::{CancelReason, EventBus, ManagerEvent, ScrollState};
use toro_common::PlayerId;
use tracing::{debug, info, warn};

pub(crate) struct ManagerState {
    container: Arc<dyn Container>,
    players: HashMap<PlayerId, Arc<dyn Player>>,
    pending: PendingPlays,
    events: EventBus,
}

impl ManagerState {
    pub(crate) fn new(container: Arc<dyn Container>, events: EventBus) -> Self {
        Self {
            container,
            players: HashMap::new(),
            pending: PendingPlays::new(),
            events,
        }
    }

    pub(crate) fn attach_player(&mut self, player: Arc<dyn Player>) -> bool {
        let id = player.id();
        if self.players.contains_key(&id) {
            return false;
        }
        self.players.insert(id, player);
        debug!(player_id = %id, "Player attached");
        self.events.emit_lossy(ManagerEvent::PlayerAttached {
            player_id: id,
            timestamp: Utc::now(),
        });
        true
    }

    /// Pure membership bookkeeping: pending plays are left alone
    pub(crate) fn detach_player(&mut self, player_id: PlayerId) -> bool {
        let removed = self.players.remove(&player_id).is_some();
        if removed {
            debug!(player_id = %player_id, "Player detached");
            self.events.emit_lossy(ManagerEvent::PlayerDetached {
                player_id,
                timestamp: Utc::now(),
            });
        }
        removed
    }

    pub(crate) fn manages(&self, player_id: PlayerId) -> bool {
        self.players.contains_key(&player_id)
    }

    pub(crate) fn list_players(&self) -> Vec<Arc<dyn Player>> {
        self.players.values().cloned().collect()
    }

    pub(crate) fn initialize(&self, player: &dyn Player) -> Result<()> {
        let info = self.container.playback_info(player.player_order());
        player.initialize(self.container.as_ref(), info)
    }

    pub(crate) fn play(&mut self, player: Arc<dyn Player>) -> Result<()> {
        let raw = self
            .container
            .player_dispatcher()
            .delay_to_play(player.as_ref());
        let delay = Delay::from_millis(raw)?;

        let id = player.id();
        if self.pending.cancel(id) {
            self.emit_cancelled(Some(id), 1, CancelReason::Superseded);
        }

        match delay {
            Delay::Never => {
                debug!(player_id = %id, "Delay policy says never, play suppressed");
                Ok(())
            }
            Delay::Immediate => {
                player.play()?;
                debug!(player_id = %id, "Player started immediately");
                self.events.emit_lossy(ManagerEvent::PlayStarted {
                    player_id: id,
                    deferred: false,
                    timestamp: Utc::now(),
                });
                Ok(())
            }
            Delay::After(duration) => {
                let delay_ms = duration.as_millis() as u64;
                self.pending.schedule(player, duration);
                debug!(player_id = %id, delay_ms, "Deferred play scheduled");
                self.events.emit_lossy(ManagerEvent::PlayScheduled {
                    player_id: id,
                    delay_ms,
                    timestamp: Utc::now(),
                });
                Ok(())
            }
        }
    }

    pub(crate) fn pause(&mut self, player: &dyn Player) -> Result<()> {
        let id = player.id();
        if self.pending.cancel(id) {
            self.emit_cancelled(Some(id), 1, CancelReason::Paused);
        }
        player.pause()?;
        self.events.emit_lossy(ManagerEvent::PlayerPaused {
            player_id: id,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Flushes every pending play, then releases the player if managed
    pub(crate) fn release(&mut self, player: &dyn Player) -> Result<bool> {
        self.cancel_all(CancelReason::Released);

        let id = player.id();
        if !self.manages(id) {
            debug!(player_id = %id, "Release requested for unmanaged player");
            return Ok(false);
        }

        player.release()?;
        self.events.emit_lossy(ManagerEvent::PlayerReleased {
            player_id: id,
            timestamp: Utc::now(),
        });
        Ok(true)
    }

    pub(crate) fn recycle(&mut self, player: &dyn Player) {
        debug!(player_id = %player.id(), "Player recycled");
        self.cancel_all(CancelReason::Recycled);
    }

    pub(crate) fn clear(&mut self) {
        self.cancel_all(CancelReason::Cleared);
        let removed = self.players.len();
        self.players.clear();
        self.events.emit_lossy(ManagerEvent::ManagerCleared {
            removed,
            timestamp: Utc::now(),
        });
    }

    pub(crate) fn on_container_scroll_state_changed(&mut self, state: ScrollState) {
        self.events.emit_lossy(ManagerEvent::ScrollStateChanged {
            state,
            timestamp: Utc::now(),
        });
        if !state.is_idle() {
            self.cancel_all(CancelReason::Scrolling);
        }
    }

    pub(crate) fn pending_plays(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn has_pending_play(&self, player_id: PlayerId) -> bool {
        self.pending.contains(player_id)
    }

    /// Run a deferred play whose timer came due
    ///
    /// There is no caller to hand an error back to, so failures are logged
    /// and published.
    pub(crate) fn fire(&mut self, player: Arc<dyn Player>) {
        let id = player.id();
        match player.play() {
            Ok(()) => {
                debug!(player_id = %id, "Deferred play fired");
                self.events.emit_lossy(ManagerEvent::PlayStarted {
                    player_id: id,
                    deferred: true,
                    timestamp: Utc::now(),
                });
            }
            Err(e) => {
                warn!(player_id = %id, "Deferred play failed: {}", e);
                self.events.emit_lossy(ManagerEvent::PlayFailed {
                    player_id: id,
                    message: e.to_string(),
                    timestamp: Utc::now(),
                });
            }
        }
    }

    fn cancel_all(&mut self, reason: CancelReason) {
        let count = self.pending.cancel_all();
        if count > 0 {
            debug!(count, ?reason, "Pending plays cancelled");
            self.emit_cancelled(None, count, reason);
        }
    }

    fn emit_cancelled(&self, player_id: Option<PlayerId>, count: usize, reason: CancelReason) {
        self.events.emit_lossy(ManagerEvent::PlaysCancelled {
            player_id,
            count,
            reason,
            timestamp: Utc::now(),
        });
    }

    /// Apply one command and send its reply
    ///
    /// Returns false when the loop should stop.
    fn handle(&mut self, command: Command) -> bool {
        // A dropped reply receiver only means the caller stopped waiting
        match command {
            Command::Attach { player, reply } => {
                let _ = reply.send(self.attach_player(player));
            }
            Command::Detach { player_id, reply } => {
                let _ = reply.send(self.detach_player(player_id));
            }
            Command::Manages { player_id, reply } => {
                let _ = reply.send(self.manages(player_id));
            }
            Command::List { reply } => {
                let _ = reply.send(self.list_players());
            }
            Command::Initialize { player, reply } => {
                let _ = reply.send(self.initialize(player.as_ref()));
            }
            Command::Play { player, reply } => {
                let _ = reply.send(self.play(player));
            }
            Command::Pause { player, reply } => {
                let _ = reply.send(self.pause(player.as_ref()));
            }
            Command::Release { player, reply } => {
                let _ = reply.send(self.release(player.as_ref()));
            }
            Command::Recycle { player, reply } => {
                self.recycle(player.as_ref());
                let _ = reply.send(());
            }
            Command::Clear { reply } => {
                self.clear();
                let _ = reply.send(());
            }
            Command::ScrollStateChanged { state, reply } => {
                self.on_container_scroll_state_changed(state);
                let _ = reply.send(());
            }
            Command::PendingPlays { reply } => {
                let _ = reply.send(self.pending_plays());
            }
            Command::HasPendingPlay { player_id, reply } => {
                let _ = reply.send(self.has_pending_play(player_id));
            }
            Command::Shutdown { reply } => {
                self.cancel_all(CancelReason::Shutdown);
                let _ = reply.send(());
                return false;
            }
        }
        true
    }
}

/// Scheduler loop body
///
/// Commands take priority over due timers when both are ready, so a
/// cancellation already queued is applied before the play it cancels.
pub(crate) async fn run(mut state: ManagerState, mut commands: mpsc::UnboundedReceiver<Command>) {
    info!("Player manager started");

    loop {
        // Commands first. A command sent after a timer came due, while this
        // loop was busy, also runs ahead of that timer. A delay is only a
        // lower bound, and a pending cancel always wins.
        tokio::select! {
            biased;

            command = commands.recv() => match command {
                Some(command) => {
                    if !state.handle(command) {
                        break;
                    }
                }
                // Every handle dropped
                None => {
                    state.cancel_all(CancelReason::Shutdown);
                    break;
                }
            },

            Some(player) = state.pending.next_due(), if !state.pending.is_empty() => {
                state.fire(player);
            }
        }
    }

    info!("Player manager stopped");
}
