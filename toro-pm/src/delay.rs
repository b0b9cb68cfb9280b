//! Delay sentinels and the built-in dispatchers

use crate::player::{Player, PlayerDispatcher};
use crate::{Error, Result};
use std::time::Duration;
use toro_common::config::DispatcherSettings;

/// Never start the player
pub const DELAY_INFINITE: i64 = -1;

/// Start the player immediately
pub const DELAY_NONE: i64 = 0;

/// Resolved answer of a delay policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delay {
    /// Play is suppressed; no timer is scheduled
    Never,
    /// Play synchronously, without a timer
    Immediate,
    /// Play once the duration has elapsed
    After(Duration),
}

impl Delay {
    /// Resolve a raw millisecond value returned by a `PlayerDispatcher`
    ///
    /// Values below `DELAY_INFINITE` are malformed policy output and are
    /// rejected rather than clamped.
    pub fn from_millis(raw: i64) -> Result<Self> {
        match raw {
            DELAY_INFINITE => Ok(Delay::Never),
            DELAY_NONE => Ok(Delay::Immediate),
            ms if ms > 0 => Ok(Delay::After(Duration::from_millis(ms as u64))),
            _ => Err(Error::InvalidDelay(raw)),
        }
    }

    /// Raw millisecond form, the inverse of `from_millis`
    pub fn as_millis(&self) -> i64 {
        match self {
            Delay::Never => DELAY_INFINITE,
            Delay::Immediate => DELAY_NONE,
            Delay::After(d) => d.as_millis() as i64,
        }
    }
}

impl TryFrom<i64> for Delay {
    type Error = Error;

    fn try_from(raw: i64) -> Result<Self> {
        Delay::from_millis(raw)
    }
}

/// Dispatcher that plays every player immediately
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDispatcher;

impl PlayerDispatcher for DefaultDispatcher {
    fn delay_to_play(&self, _player: &dyn Player) -> i64 {
        DELAY_NONE
    }
}

/// Dispatcher returning the same delay for every player
#[derive(Debug, Clone, Copy)]
pub struct FixedDelayDispatcher {
    delay: Delay,
}

impl FixedDelayDispatcher {
    /// Fails with `InvalidDelay` for values below `DELAY_INFINITE`
    pub fn new(delay_ms: i64) -> Result<Self> {
        Ok(Self {
            delay: Delay::from_millis(delay_ms)?,
        })
    }

    pub fn from_settings(settings: &DispatcherSettings) -> Result<Self> {
        Self::new(settings.delay_ms)
    }

    pub fn delay(&self) -> Delay {
        self.delay
    }
}

impl PlayerDispatcher for FixedDelayDispatcher {
    fn delay_to_play(&self, _player: &dyn Player) -> i64 {
        self.delay.as_millis()
    }
}
