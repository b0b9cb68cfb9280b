//! # Toro Common Library
//!
//! Shared code for the Toro player manager crates including:
//! - Player identity (`PlayerId`)
//! - Manager event types and the broadcast `EventBus`
//! - Configuration loading
//! - Common error type

pub mod config;
pub mod error;
pub mod events;
pub mod player_id;

pub use error::{Error, Result};
pub use events::{EventBus, ManagerEvent, ScrollState};
pub use player_id::PlayerId;
