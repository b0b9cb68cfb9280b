//! Player manager
//!
//! `PlayerManager` is the handle the container talks to. Each operation is
//! sent as a `Command` to the scheduler task (see `core`) and the handle
//! awaits the reply. Because every command and every timer fire is applied
//! on that one task, the handle can be cloned and used from anywhere without
//! breaking the ordering guarantees:
//! - a later `play()` for a player always supersedes its earlier pending play
//! - a `pause()` or scroll event always lands before any timer it cancels

mod core;
pub mod pending;

use crate::player::{Container, Player};
use crate::{Error, Result};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use toro_common::config::{ManagerSettings, TomlConfig};
use toro_common::events::{EventBus, ManagerEvent, ScrollState};
use toro_common::PlayerId;

use self::core::ManagerState;

/// Default per-subscriber event buffer
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

pub(crate) enum Command {
    Attach {
        player: Arc<dyn Player>,
        reply: oneshot::Sender<bool>,
    },
    Detach {
        player_id: PlayerId,
        reply: oneshot::Sender<bool>,
    },
    Manages {
        player_id: PlayerId,
        reply: oneshot::Sender<bool>,
    },
    List {
        reply: oneshot::Sender<Vec<Arc<dyn Player>>>,
    },
    Initialize {
        player: Arc<dyn Player>,
        reply: oneshot::Sender<Result<()>>,
    },
    Play {
        player: Arc<dyn Player>,
        reply: oneshot::Sender<Result<()>>,
    },
    Pause {
        player: Arc<dyn Player>,
        reply: oneshot::Sender<Result<()>>,
    },
    Release {
        player: Arc<dyn Player>,
        reply: oneshot::Sender<Result<bool>>,
    },
    Recycle {
        player: Arc<dyn Player>,
        reply: oneshot::Sender<()>,
    },
    Clear {
        reply: oneshot::Sender<()>,
    },
    ScrollStateChanged {
        state: ScrollState,
        reply: oneshot::Sender<()>,
    },
    PendingPlays {
        reply: oneshot::Sender<usize>,
    },
    HasPendingPlay {
        player_id: PlayerId,
        reply: oneshot::Sender<bool>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to the player manager of one container
///
/// Cloning is cheap; all clones drive the same scheduler task. The task stops
/// when `shutdown()` is called or the last handle is dropped, cancelling any
/// deferred plays still pending.
#[derive(Clone)]
pub struct PlayerManager {
    commands: mpsc::UnboundedSender<Command>,
    events: EventBus,
}

impl PlayerManager {
    /// Spawn the scheduler task for `container`
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(container: Arc<dyn Container>) -> Self {
        Self::with_event_bus(container, EventBus::new(DEFAULT_EVENT_CAPACITY))
    }

    /// Spawn using the `[manager]` section of the configuration
    ///
    /// A zero `event_capacity` is raised to one.
    pub fn from_settings(container: Arc<dyn Container>, settings: &ManagerSettings) -> Self {
        Self::with_event_bus(container, EventBus::new(settings.event_capacity.max(1)))
    }

    /// Validate a full configuration, then spawn from its `[manager]` section
    pub fn from_config(container: Arc<dyn Container>, config: &TomlConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_settings(container, &config.manager))
    }

    /// Spawn publishing events on an existing bus
    pub fn with_event_bus(container: Arc<dyn Container>, events: EventBus) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = ManagerState::new(container, events.clone());
        tokio::spawn(self::core::run(state, rx));
        Self {
            commands: tx,
            events,
        }
    }

    /// Subscribe to manager events emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ManagerEvent> {
        self.events.subscribe()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.events
    }

    /// Add `player` to the managed set
    ///
    /// Returns false if it was already managed.
    pub async fn attach_player(&self, player: Arc<dyn Player>) -> Result<bool> {
        self.request(|reply| Command::Attach { player, reply }).await
    }

    /// Remove `player` from the managed set
    ///
    /// Pending plays are not cancelled and the player is neither paused nor
    /// released; callers do that first if they need it.
    pub async fn detach_player(&self, player: &dyn Player) -> Result<bool> {
        let player_id = player.id();
        self.request(|reply| Command::Detach { player_id, reply }).await
    }

    pub async fn manages(&self, player: &dyn Player) -> Result<bool> {
        let player_id = player.id();
        self.request(|reply| Command::Manages { player_id, reply }).await
    }

    /// Snapshot of the managed players
    ///
    /// The returned vector is owned by the caller; it neither reflects nor
    /// affects later membership changes.
    pub async fn list_players(&self) -> Result<Vec<Arc<dyn Player>>> {
        self.request(|reply| Command::List { reply }).await
    }

    /// Initialize `player` with the container's saved playback info for its order
    pub async fn initialize(&self, player: Arc<dyn Player>) -> Result<()> {
        self.request(|reply| Command::Initialize { player, reply })
            .await?
    }

    /// Start `player` according to the container's delay policy
    ///
    /// With `DELAY_NONE` the player has been started by the time this
    /// returns. With a positive delay a deferred play is scheduled, replacing
    /// any play already pending for this player. With `DELAY_INFINITE`
    /// nothing is scheduled.
    ///
    /// # Errors
    ///
    /// `Error::InvalidDelay` if the policy returns a value below
    /// `DELAY_INFINITE`; errors from `Player::play` are returned unchanged.
    pub async fn play(&self, player: Arc<dyn Player>) -> Result<()> {
        self.request(|reply| Command::Play { player, reply }).await?
    }

    /// Cancel this player's pending play, then pause it
    pub async fn pause(&self, player: Arc<dyn Player>) -> Result<()> {
        self.request(|reply| Command::Pause { player, reply }).await?
    }

    /// Cancel ALL pending plays, then release `player` if it is managed
    ///
    /// Returns false (without calling `Player::release`) for an unmanaged
    /// player; the global cancellation happens either way.
    pub async fn release(&self, player: Arc<dyn Player>) -> Result<bool> {
        self.request(|reply| Command::Release { player, reply }).await?
    }

    /// Cancel ALL pending plays
    pub async fn recycle(&self, player: Arc<dyn Player>) -> Result<()> {
        self.request(|reply| Command::Recycle { player, reply }).await
    }

    /// Cancel ALL pending plays and forget every managed player
    pub async fn clear(&self) -> Result<()> {
        self.request(|reply| Command::Clear { reply }).await
    }

    /// Scroll hook: any non-idle state cancels ALL pending plays
    ///
    /// Players already playing are not paused, and returning to idle does not
    /// resume anything.
    pub async fn on_container_scroll_state_changed(&self, state: ScrollState) -> Result<()> {
        self.request(|reply| Command::ScrollStateChanged { state, reply })
            .await
    }

    /// Number of deferred plays currently waiting
    pub async fn pending_plays(&self) -> Result<usize> {
        self.request(|reply| Command::PendingPlays { reply }).await
    }

    pub async fn has_pending_play(&self, player: &dyn Player) -> Result<bool> {
        let player_id = player.id();
        self.request(|reply| Command::HasPendingPlay { player_id, reply })
            .await
    }

    /// Cancel all pending plays and stop the scheduler task
    ///
    /// Every later call on any handle returns `Error::ManagerClosed`.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(build(reply))
            .map_err(|_| Error::ManagerClosed)?;
        rx.await.map_err(|_| Error::ManagerClosed)
    }
}
