//! # Toro Player Manager (toro-pm)
//!
//! Schedules play/pause/release transitions for the players attached to one
//! scrollable container.
//!
//! **Architecture:** a cloneable `PlayerManager` handle feeds commands to a
//! single tokio task that owns the membership set and the pending-play timer
//! table. Every mutation and every timer fire runs serialized on that task.

pub mod delay;
pub mod error;
pub mod manager;
pub mod player;

pub use delay::{Delay, DefaultDispatcher, FixedDelayDispatcher, DELAY_INFINITE, DELAY_NONE};
pub use error::{Error, Result};
pub use manager::PlayerManager;
pub use player::{Container, PlaybackInfo, Player, PlayerDispatcher};
pub use toro_common::events::{CancelReason, ManagerEvent, ScrollState};
pub use toro_common::PlayerId;
