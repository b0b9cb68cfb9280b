//! Toro player manager simulator (toro-sim)
//!
//! Drives a simulated scrolling container through a `PlayerManager`: players
//! are attached and started under the configured delay policy, a scroll
//! gesture interrupts the deferred starts, and the container is finally
//! paused, released and cleared. Manager events are printed as they happen.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use toro_common::config::ConfigResolver;
use toro_pm::{
    Container, Delay, FixedDelayDispatcher, PlaybackInfo, Player, PlayerDispatcher, PlayerId,
    PlayerManager, ScrollState,
};

/// Command-line arguments for toro-sim
#[derive(Parser, Debug)]
#[command(name = "toro-sim")]
#[command(about = "Simulate a scrolling container driving the Toro player manager")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "TORO_CONFIG")]
    config: Option<PathBuf>,

    /// Delay before a player starts: -1 never, 0 immediately, N milliseconds
    #[arg(short, long, allow_negative_numbers = true)]
    delay_ms: Option<i64>,

    /// Number of players in the container
    #[arg(short, long, default_value = "4")]
    players: usize,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Print manager events as JSON lines
    #[arg(long)]
    json: bool,
}

/// Container with a fixed delay policy and a few saved positions
struct SimContainer {
    dispatcher: FixedDelayDispatcher,
    saved: HashMap<usize, PlaybackInfo>,
}

impl Container for SimContainer {
    fn playback_info(&self, order: usize) -> PlaybackInfo {
        self.saved.get(&order).copied().unwrap_or_default()
    }

    fn player_dispatcher(&self) -> &dyn PlayerDispatcher {
        &self.dispatcher
    }
}

/// Player that only logs its lifecycle
struct SimPlayer {
    id: PlayerId,
    order: usize,
    playing: AtomicBool,
}

impl SimPlayer {
    fn new(order: usize) -> Self {
        Self {
            id: PlayerId::new(),
            order,
            playing: AtomicBool::new(false),
        }
    }
}

impl Player for SimPlayer {
    fn id(&self) -> PlayerId {
        self.id
    }

    fn player_order(&self) -> usize {
        self.order
    }

    fn initialize(&self, _container: &dyn Container, info: PlaybackInfo) -> toro_pm::Result<()> {
        if info.has_resume_position() {
            info!(order = self.order, "initialize: resume at {} ms", info.resume_position_ms);
        } else {
            info!(order = self.order, "initialize: from start");
        }
        Ok(())
    }

    fn play(&self) -> toro_pm::Result<()> {
        self.playing.store(true, Ordering::SeqCst);
        info!(order = self.order, "play");
        Ok(())
    }

    fn pause(&self) -> toro_pm::Result<()> {
        self.playing.store(false, Ordering::SeqCst);
        info!(order = self.order, "pause");
        Ok(())
    }

    fn release(&self) -> toro_pm::Result<()> {
        self.playing.store(false, Ordering::SeqCst);
        info!(order = self.order, "release");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Priority: CLI > environment > TOML > built-in defaults
    let mut config = ConfigResolver::new("toro")
        .resolve(args.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(delay_ms) = args.delay_ms {
        config.dispatcher.delay_ms = delay_ms;
    }
    if let Some(level) = args.log_level.clone() {
        config.logging.level = level;
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("toro_pm={0},toro_sim={0},toro_common={0}", config.logging.level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let dispatcher = FixedDelayDispatcher::from_settings(&config.dispatcher)
        .context("Invalid dispatcher delay")?;
    info!(
        "Starting toro-sim with {} players, delay policy {:?}",
        args.players,
        dispatcher.delay()
    );

    let container = Arc::new(SimContainer {
        dispatcher,
        saved: HashMap::from([(1, PlaybackInfo::new(1, 12_000))]),
    });
    let manager = PlayerManager::from_config(container.clone(), &config)
        .context("Invalid manager configuration")?;

    let printer = tokio::spawn(print_events(manager.subscribe(), args.json));

    tokio::select! {
        result = run_scenario(&manager, args.players, dispatcher.delay()) => {
            result.context("Scenario failed")?;
        }
        _ = shutdown_signal() => {}
    }

    manager.shutdown().await.context("Failed to stop player manager")?;
    drop(manager);
    printer.await.context("Event printer panicked")?;

    info!("Simulation complete");
    Ok(())
}

async fn run_scenario(manager: &PlayerManager, count: usize, delay: Delay) -> toro_pm::Result<()> {
    let players: Vec<Arc<dyn Player>> = (0..count)
        .map(|order| Arc::new(SimPlayer::new(order)) as Arc<dyn Player>)
        .collect();

    for player in &players {
        manager.attach_player(player.clone()).await?;
        manager.initialize(player.clone()).await?;
    }

    // Half the container becomes visible and asks to play
    let visible = &players[..count.div_ceil(2)];
    for player in visible {
        manager.play(player.clone()).await?;
    }
    info!("Pending deferred plays: {}", manager.pending_plays().await?);

    let step = match delay {
        Delay::After(d) => d,
        _ => Duration::from_millis(100),
    };

    // User flings before the deferred starts fire
    tokio::time::sleep(step / 2).await;
    manager
        .on_container_scroll_state_changed(ScrollState::Dragging)
        .await?;
    manager
        .on_container_scroll_state_changed(ScrollState::Settling)
        .await?;
    manager
        .on_container_scroll_state_changed(ScrollState::Idle)
        .await?;
    info!(
        "Pending deferred plays after scroll: {}",
        manager.pending_plays().await?
    );

    // The other half is now visible
    for player in &players[visible.len()..] {
        manager.play(player.clone()).await?;
    }
    tokio::time::sleep(step * 2).await;

    if let Some(first) = players.first() {
        manager.pause(first.clone()).await?;
    }
    if let Some(last) = players.last() {
        let released = manager.release(last.clone()).await?;
        info!("Released last player: {}", released);
        manager.detach_player(last.as_ref()).await?;
    }

    info!("Managed players: {}", manager.list_players().await?.len());
    manager.clear().await?;
    Ok(())
}

async fn print_events(
    mut rx: tokio::sync::broadcast::Receiver<toro_pm::ManagerEvent>,
    json: bool,
) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                if json {
                    match serde_json::to_string(&event) {
                        Ok(line) => println!("{}", line),
                        Err(e) => warn!("Failed to serialize event: {}", e),
                    }
                } else {
                    info!("event: {}", event.event_type());
                }
            }
            Err(RecvError::Lagged(skipped)) => warn!("Event printer lagged, {} skipped", skipped),
            Err(RecvError::Closed) => break,
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
