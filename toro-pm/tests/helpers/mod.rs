//! Shared test doubles for player manager integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::time::Instant;
use toro_pm::{
    Container, Error, ManagerEvent, PlaybackInfo, Player, PlayerDispatcher, PlayerId,
    PlayerManager, Result,
};

/// Lifecycle call recorded by `MockPlayer`
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Initialize(PlaybackInfo),
    Play,
    Pause,
    Release,
}

/// Player that records every call with the (paused) tokio clock time
pub struct MockPlayer {
    id: PlayerId,
    order: usize,
    calls: Mutex<Vec<(Call, Instant)>>,
    fail_play: AtomicBool,
    fail_initialize: AtomicBool,
}

impl MockPlayer {
    pub fn new(order: usize) -> Arc<Self> {
        Arc::new(Self {
            id: PlayerId::new(),
            order,
            calls: Mutex::new(Vec::new()),
            fail_play: AtomicBool::new(false),
            fail_initialize: AtomicBool::new(false),
        })
    }

    pub fn set_fail_play(&self, fail: bool) {
        self.fail_play.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_initialize(&self, fail: bool) {
        self.fail_initialize.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().iter().map(|(c, _)| c.clone()).collect()
    }

    fn count(&self, call: &Call) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| c == call)
            .count()
    }

    pub fn play_count(&self) -> usize {
        self.count(&Call::Play)
    }

    pub fn pause_count(&self) -> usize {
        self.count(&Call::Pause)
    }

    pub fn release_count(&self) -> usize {
        self.count(&Call::Release)
    }

    /// Clock times at which `play()` was invoked
    pub fn play_times(&self) -> Vec<Instant> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == Call::Play)
            .map(|(_, at)| *at)
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push((call, Instant::now()));
    }
}

impl Player for MockPlayer {
    fn id(&self) -> PlayerId {
        self.id
    }

    fn player_order(&self) -> usize {
        self.order
    }

    fn initialize(&self, _container: &dyn Container, playback_info: PlaybackInfo) -> Result<()> {
        if self.fail_initialize.load(Ordering::SeqCst) {
            return Err(Error::Player(format!("player {} failed to initialize", self.order)));
        }
        self.record(Call::Initialize(playback_info));
        Ok(())
    }

    fn play(&self) -> Result<()> {
        if self.fail_play.load(Ordering::SeqCst) {
            return Err(Error::Player(format!("player {} failed to play", self.order)));
        }
        self.record(Call::Play);
        Ok(())
    }

    fn pause(&self) -> Result<()> {
        self.record(Call::Pause);
        Ok(())
    }

    fn release(&self) -> Result<()> {
        self.record(Call::Release);
        Ok(())
    }
}

/// Container whose delay policy can be changed per player while running
pub struct TestContainer {
    default_delay: AtomicI64,
    delays: Mutex<HashMap<PlayerId, i64>>,
    saved: Mutex<HashMap<usize, PlaybackInfo>>,
}

impl TestContainer {
    pub fn new(default_delay: i64) -> Arc<Self> {
        Arc::new(Self {
            default_delay: AtomicI64::new(default_delay),
            delays: Mutex::new(HashMap::new()),
            saved: Mutex::new(HashMap::new()),
        })
    }

    pub fn set_delay(&self, player: &dyn Player, delay_ms: i64) {
        self.delays.lock().unwrap().insert(player.id(), delay_ms);
    }

    pub fn set_default_delay(&self, delay_ms: i64) {
        self.default_delay.store(delay_ms, Ordering::SeqCst);
    }

    pub fn save_playback_info(&self, order: usize, info: PlaybackInfo) {
        self.saved.lock().unwrap().insert(order, info);
    }
}

impl PlayerDispatcher for TestContainer {
    fn delay_to_play(&self, player: &dyn Player) -> i64 {
        self.delays
            .lock()
            .unwrap()
            .get(&player.id())
            .copied()
            .unwrap_or_else(|| self.default_delay.load(Ordering::SeqCst))
    }
}

impl Container for TestContainer {
    fn playback_info(&self, order: usize) -> PlaybackInfo {
        self.saved
            .lock()
            .unwrap()
            .get(&order)
            .copied()
            .unwrap_or_default()
    }

    fn player_dispatcher(&self) -> &dyn PlayerDispatcher {
        self
    }
}

/// Spawn a manager over a fresh `TestContainer`
pub fn setup(default_delay: i64) -> (PlayerManager, Arc<TestContainer>) {
    let container = TestContainer::new(default_delay);
    let manager = PlayerManager::spawn(container.clone());
    (manager, container)
}

/// Drain every event currently buffered for `rx`
pub fn drain_events(rx: &mut broadcast::Receiver<ManagerEvent>) -> Vec<ManagerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
