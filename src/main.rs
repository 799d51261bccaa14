//! Duel Client - headless sparring client for the relay
//!
//! Connects to the relay, creates or joins a room and runs one fighter
//! against whoever joins:
//! - Ticks the match session at the configured rate
//! - Walks toward the opponent and attacks when in range
//! - Asks for a replay after each knockout

use duel_core::config::{Config, LogFormat};
use duel_core::game::combat::AttackStats;
use duel_core::game::state::MAX_SPECIAL;
use duel_core::game::{opponent, FightStatus, GameMode, MatchSession, SceneHooks, SessionConfig, TickInput};
use duel_core::util::time::{tick_interval, MatchClock};
use duel_core::ws::{NetworkMessage, TransportManager, WsSocketFactory};
use tokio::runtime::Handle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Stop this far inside normal attack range
const RANGE_MARGIN: f32 = 10.0;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(&config.log_level, config.log_format);

    info!("Starting Duel Client");
    info!("Relay: {}", config.relay_url);

    let mut transport = TransportManager::new(Box::new(WsSocketFactory::new(Handle::current())))
        .with_reconnect(config.reconnect);
    transport.connect(&config.relay_url, config.room_code.as_deref())?;

    // Room creator plays the first slot, the joiner the second
    let local = usize::from(config.room_code.is_some());
    let session_config = SessionConfig {
        local_player_index: local,
        game_mode: GameMode::Online,
        ..SessionConfig::default()
    };
    let mut session = MatchSession::new(session_config, transport, LoggingHooks::default());

    let clock = MatchClock::new();
    let tick_duration = tick_interval(config.tick_rate);
    let dt = tick_duration.as_secs_f32();
    let mut ticker = interval(tick_duration);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    let mut replay_asked = false;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = clock.now_ms();
                session.tick(now);
                handle_notices(&mut session);

                if session.state().is_terminal() {
                    if !replay_asked {
                        replay_asked = session.request_replay(Some("rematch?"));
                    }
                    continue;
                }
                replay_asked = false;

                let input = sparring_input(&session, local);
                session.apply_input(local, &input, now);
                step_motion(&mut session, local, dt);
            }
            _ = &mut shutdown => break,
        }
    }

    session.transport_mut().disconnect();
    info!("Client shutdown complete");
    Ok(())
}

/// Act on relay and peer notices the hooks collected this tick
fn handle_notices(session: &mut MatchSession<LoggingHooks>) {
    if let Some(room_code) = session.hooks_mut().room_created.take() {
        info!(room_code = %room_code, "Room created, waiting for an opponent");
        session.transport_mut().set_host(true);
    }
    if std::mem::take(&mut session.hooks_mut().replay_requested) {
        session.respond_replay(true);
    }
}

/// Walk into range, then swing; spend a full meter on a special
fn sparring_input(session: &MatchSession<LoggingHooks>, player: usize) -> TickInput {
    let (Some(me), Some(them)) = (session.fighter(player), session.fighter(opponent(player))) else {
        return TickInput::default();
    };

    let gap = them.x - me.x;
    let in_range = gap.abs() <= AttackStats::for_attack(false).range - RANGE_MARGIN;
    TickInput {
        move_x: if in_range { 0.0 } else { gap.signum() },
        attack: in_range,
        special: in_range && session.state().special(player) >= MAX_SPECIAL,
        ..TickInput::default()
    }
}

/// Minimal horizontal integration; there is no physics engine here
fn step_motion(session: &mut MatchSession<LoggingHooks>, player: usize, dt: f32) {
    if let Some(fighter) = session.fighter(player) {
        let x = fighter.x + fighter.velocity_x * dt;
        let y = fighter.y;
        session.set_fighter_motion(player, x, y, 0.0);
    }
}

/// HUD stand-in: logs what a real game would draw
#[derive(Debug, Default)]
struct LoggingHooks {
    room_created: Option<String>,
    replay_requested: bool,
}

impl SceneHooks for LoggingHooks {
    fn update_health_bar(&mut self, player: usize, health: f32) {
        info!(player, health, "Health bar");
    }

    fn update_special_pips(&mut self, player: usize, meter: u8) {
        info!(player, meter, "Special meter");
    }

    fn check_winner(&mut self, health: &[f32]) -> FightStatus {
        let down: Vec<bool> = health.iter().map(|&h| h <= 0.0).collect();
        match down.as_slice() {
            [true, true] => FightStatus::Draw,
            [false, true] => FightStatus::Won { winner: 0 },
            [true, false] => FightStatus::Won { winner: 1 },
            _ => FightStatus::Ongoing,
        }
    }

    fn on_peer_message(&mut self, message: &NetworkMessage) {
        match message {
            NetworkMessage::RoomCreated { room_code } => {
                self.room_created = Some(room_code.clone());
            }
            NetworkMessage::ReplayRequest { .. } => self.replay_requested = true,
            NetworkMessage::PlayerJoined { .. } | NetworkMessage::GameJoined { .. } => {
                info!("Opponent connected");
            }
            NetworkMessage::Error { message } => warn!(error = %message, "Relay error"),
            other => info!(kind = other.kind(), "Peer message"),
        }
    }
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str, format: LogFormat) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    let json = format == LogFormat::Json;
    tracing_subscriber::registry()
        .with(env_filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json().with_target(true)))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_target(true)))
        .init();
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        }
    }
}
