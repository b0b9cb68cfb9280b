//! Collaborator interfaces: players, the container and its delay policy

use crate::Result;
use toro_common::PlayerId;

/// Saved playback position for a player order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackInfo {
    /// Window (item) index to resume in, `-1` when unknown
    pub resume_window: i32,

    /// Position to resume from, `-1` when unknown
    pub resume_position_ms: i64,
}

impl PlaybackInfo {
    pub fn new(resume_window: i32, resume_position_ms: i64) -> Self {
        Self {
            resume_window,
            resume_position_ms,
        }
    }

    /// True when a resume position was actually recorded
    pub fn has_resume_position(&self) -> bool {
        self.resume_window >= 0 && self.resume_position_ms >= 0
    }
}

impl Default for PlaybackInfo {
    fn default() -> Self {
        Self::new(-1, -1)
    }
}

/// A playable unit owned by the container
///
/// The manager only ever uses the identity, the order key and the four
/// lifecycle calls. All calls happen on the manager's scheduler task.
pub trait Player: Send + Sync {
    /// Identity used for membership and pending-play bookkeeping
    fn id(&self) -> PlayerId;

    /// Ordering key used to look up the saved playback position
    fn player_order(&self) -> usize;

    fn initialize(&self, container: &dyn Container, playback_info: PlaybackInfo) -> Result<()>;

    fn play(&self) -> Result<()>;

    fn pause(&self) -> Result<()>;

    fn release(&self) -> Result<()>;
}

/// Delay policy consulted on every `play()`
///
/// Returns milliseconds, with `DELAY_INFINITE` (-1) meaning never and
/// `DELAY_NONE` (0) meaning immediately. Anything below -1 is invalid.
pub trait PlayerDispatcher: Send + Sync {
    fn delay_to_play(&self, player: &dyn Player) -> i64;
}

impl<F> PlayerDispatcher for F
where
    F: Fn(&dyn Player) -> i64 + Send + Sync,
{
    fn delay_to_play(&self, player: &dyn Player) -> i64 {
        self(player)
    }
}

/// The scrollable container owning the players
pub trait Container: Send + Sync {
    /// Saved playback position for the given player order
    fn playback_info(&self, order: usize) -> PlaybackInfo;

    fn player_dispatcher(&self) -> &dyn PlayerDispatcher;
}
