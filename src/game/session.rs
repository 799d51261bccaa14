//! Match session: owns match state, the transport and the collaborators,
//! and is the single entry point for ticks and inbound messages

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::util::timers::Timers;
use crate::ws::protocol::{AnimationKind, Direction, NetworkMessage};
use crate::ws::TransportManager;

use super::animation::AnimationFrameSynchronizer;
use super::combat::{ActionKind, CombatResolver};
use super::reconcile::RemoteStateReconciler;
use super::state::{Fighter, GameMode, MatchState, PLAYER_COUNT};
use super::{DeferredTask, Scene, SceneHooks, TickInput};

/// Per-match settings
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub local_player_index: usize,
    pub game_mode: GameMode,
    /// Identifies this client in replay handshakes
    pub player_id: String,
    pub spawn_positions: [(f32, f32); PLAYER_COUNT],
    /// Horizontal speed while walking (px/s)
    pub walk_speed: f32,
    /// Initial upward speed of a jump (px/s)
    pub jump_velocity: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            local_player_index: 0,
            game_mode: GameMode::Local,
            player_id: Uuid::new_v4().to_string(),
            spawn_positions: [(200.0, 400.0), (600.0, 400.0)],
            walk_speed: 160.0,
            jump_velocity: 330.0,
        }
    }
}

/// One running match
pub struct MatchSession<H: SceneHooks> {
    config: SessionConfig,
    match_id: String,
    state: MatchState,
    fighters: Vec<Fighter>,
    transport: TransportManager,
    hooks: H,
    timers: Timers<DeferredTask>,
    combat: CombatResolver,
    reconciler: RemoteStateReconciler,
    animation: AnimationFrameSynchronizer,
    inbox: mpsc::UnboundedReceiver<NetworkMessage>,
    /// Match id of a peer's replay request awaiting our answer
    pending_replay_request: Option<String>,
}

impl<H: SceneHooks> MatchSession<H> {
    /// Build the match and take over the transport's message handler
    pub fn new(config: SessionConfig, mut transport: TransportManager, hooks: H) -> Self {
        let (inbox_tx, inbox) = mpsc::unbounded_channel();
        transport.on_message(move |message| {
            if inbox_tx.send(message).is_err() {
                debug!("Session inbox closed, message dropped");
            }
        });

        let fighters = config
            .spawn_positions
            .iter()
            .map(|&(x, y)| Fighter::new(x, y))
            .collect();

        let match_id = Uuid::new_v4().to_string();
        info!(
            match_id = %match_id,
            local_player = config.local_player_index,
            mode = ?config.game_mode,
            "Match session created"
        );

        Self {
            state: MatchState::new(config.local_player_index, config.game_mode),
            config,
            match_id,
            fighters,
            transport,
            hooks,
            timers: Timers::new(),
            combat: CombatResolver::new(),
            reconciler: RemoteStateReconciler::new(),
            animation: AnimationFrameSynchronizer::new(),
            inbox,
            pending_replay_request: None,
        }
    }

    pub fn state(&self) -> &MatchState {
        &self.state
    }

    pub fn fighters(&self) -> &[Fighter] {
        &self.fighters
    }

    pub fn fighter(&self, player: usize) -> Option<&Fighter> {
        self.fighters.get(player)
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut H {
        &mut self.hooks
    }

    pub fn transport(&self) -> &TransportManager {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut TransportManager {
        &mut self.transport
    }

    pub fn combat(&self) -> &CombatResolver {
        &self.combat
    }

    pub fn match_id(&self) -> &str {
        &self.match_id
    }

    /// Online matches drive only their own slot; local matches drive both
    pub fn is_locally_driven(&self, player: usize) -> bool {
        match self.state.game_mode {
            GameMode::Local => player < PLAYER_COUNT,
            GameMode::Online => player == self.state.local_player_index,
        }
    }

    /// Apply one tick of controller input for a locally-driven fighter
    pub fn apply_input(&mut self, player: usize, input: &TickInput, now: u64) {
        if !self.is_locally_driven(player) {
            warn!(player, "Input for a fighter this client does not drive");
            return;
        }
        if self.state.is_terminal() {
            return;
        }

        self.apply_movement(player, input);

        let (mut scene, combat, _, _) = self.parts();
        if input.block {
            combat.try_action(&mut scene, player, ActionKind::Block, now);
        } else if scene.fighters.get(player).is_some_and(|f| f.is_blocking) {
            combat.release_block(&mut scene, player);
        }

        if input.special {
            combat.try_action(&mut scene, player, ActionKind::Special, now);
        } else if input.attack {
            combat.try_action(&mut scene, player, ActionKind::Attack, now);
        }
    }

    /// Report physics results from the host engine
    pub fn set_fighter_motion(&mut self, player: usize, x: f32, y: f32, velocity_y: f32) {
        if let Some(fighter) = self.fighters.get_mut(player) {
            fighter.x = x;
            fighter.y = y;
            fighter.velocity_y = velocity_y;
        }
    }

    /// One frame: network in, deferred tasks, animation
    pub fn tick(&mut self, now: u64) {
        self.transport.pump(now);
        self.process_inbox(now);

        let due = self.timers.take_due(now);
        let (mut scene, combat, _, _) = self.parts();
        for task in due {
            combat.run_deferred(&mut scene, task);
        }

        for player in 0..self.fighters.len().min(PLAYER_COUNT) {
            let local = self.is_locally_driven(player);
            let (mut scene, _, _, animation) = self.parts();
            if local {
                animation.update_walking_animation(&mut scene, player, now);
            } else {
                animation.update_shared_walking_animation(&mut scene, player, now);
            }
        }
    }

    /// Drain messages delivered by the transport callback
    pub fn process_inbox(&mut self, now: u64) {
        while let Ok(message) = self.inbox.try_recv() {
            self.handle_message(message, now);
        }
    }

    /// Act on one inbound message
    pub fn handle_message(&mut self, message: NetworkMessage, now: u64) {
        debug!(kind = message.kind(), "Inbound message");
        let local = self.state.local_player_index;

        match &message {
            NetworkMessage::Movement {
                player_idx,
                direction,
                ..
            } => {
                let walk_speed = self.config.walk_speed;
                if let Some(fighter) = self.remote_fighter_mut(*player_idx) {
                    fighter.velocity_x = direction.sign() * walk_speed;
                    if *direction != Direction::Stop {
                        fighter.flip_x = *direction == Direction::Left;
                    }
                    fighter.remote_animation = Some(if *direction == Direction::Stop {
                        AnimationKind::Idle
                    } else {
                        AnimationKind::Walking
                    });
                }
            }
            NetworkMessage::Jump { player_idx, .. } => {
                let jump_velocity = self.config.jump_velocity;
                if let Some(fighter) = self.remote_fighter_mut(*player_idx) {
                    fighter.velocity_y = -jump_velocity;
                }
            }
            NetworkMessage::Attack {
                player_idx,
                is_special,
                ..
            } => {
                let (mut scene, combat, _, _) = self.parts();
                combat.apply_remote_attack(&mut scene, *player_idx, *is_special, now);
            }
            NetworkMessage::Block {
                player_idx,
                is_blocking,
                ..
            } => {
                if let Some(fighter) = self.remote_fighter_mut(*player_idx) {
                    fighter.is_blocking = *is_blocking;
                }
            }
            NetworkMessage::HealthUpdate {
                player_index,
                health,
                ..
            } => {
                let (mut scene, _, reconciler, _) = self.parts();
                reconciler.apply_health_update(&mut scene, local, *player_index, *health);
            }
            NetworkMessage::PositionUpdate(update) => {
                let (mut scene, _, _, animation) = self.parts();
                animation.handle_remote_action(&mut scene, update, now);
            }
            NetworkMessage::ReplayRequest {
                match_id, player_id, ..
            } => {
                info!(match_id = %match_id, player_id = %player_id, "Peer requested a replay");
                self.pending_replay_request = Some(match_id.clone());
                self.hooks.on_peer_message(&message);
            }
            NetworkMessage::ReplayResponse { accepted, .. } => {
                info!(accepted, "Peer answered replay request");
                if *accepted {
                    self.restart();
                }
                self.hooks.on_peer_message(&message);
            }
            NetworkMessage::Error { message: text } => {
                warn!(error = %text, "Relay reported an error");
                self.hooks.on_peer_message(&message);
            }
            NetworkMessage::CreateRoom { .. } | NetworkMessage::JoinRoom { .. } => {
                debug!(kind = message.kind(), "Ignoring client-side relay request");
            }
            NetworkMessage::HostStatus { .. }
            | NetworkMessage::RoomCode { .. }
            | NetworkMessage::GameAction { .. }
            | NetworkMessage::CharacterSelected { .. }
            | NetworkMessage::RoomCreated { .. }
            | NetworkMessage::GameJoined { .. }
            | NetworkMessage::PlayerJoined { .. } => {
                info!(kind = message.kind(), "Peer notice");
                self.hooks.on_peer_message(&message);
            }
        }
    }

    /// New round: full health, empty meters, fresh cadence, nothing pending
    pub fn restart(&mut self) {
        self.state.reset();
        for fighter in &mut self.fighters {
            fighter.reset();
        }
        self.combat.reset();
        self.timers.clear();
        self.pending_replay_request = None;
        self.match_id = Uuid::new_v4().to_string();

        info!(match_id = %self.match_id, "Match restarted");
        let (mut scene, _, _, _) = self.parts();
        scene.refresh_hud();
    }

    /// Ask the peer for a rematch
    pub fn request_replay(&mut self, message: Option<&str>) -> bool {
        self.transport
            .send_replay_request(&self.match_id, &self.config.player_id, message)
    }

    /// Answer a pending replay request; accepting restarts locally too
    pub fn respond_replay(&mut self, accepted: bool) -> bool {
        let Some(match_id) = self.pending_replay_request.take() else {
            debug!("No replay request to answer");
            return false;
        };

        let sent = self
            .transport
            .send_replay_response(&match_id, &self.config.player_id, accepted);
        if accepted {
            self.restart();
        }
        sent
    }

    fn apply_movement(&mut self, player: usize, input: &TickInput) {
        let walk_speed = self.config.walk_speed;
        let jump_velocity = self.config.jump_velocity;
        let broadcast = self.state.should_broadcast(player);
        let Some(fighter) = self.fighters.get_mut(player) else {
            return;
        };

        let direction = input.direction();
        let velocity_x = direction.sign() * walk_speed;
        if fighter.velocity_x != velocity_x {
            fighter.velocity_x = velocity_x;
            if direction != Direction::Stop {
                fighter.flip_x = direction == Direction::Left;
            }
            if broadcast {
                self.transport
                    .send(&NetworkMessage::movement(player, direction));
            }
        }

        if input.jump && fighter.velocity_y == 0.0 {
            fighter.velocity_y = -jump_velocity;
            if broadcast {
                self.transport.send(&NetworkMessage::jump(player));
            }
        }
    }

    fn remote_fighter_mut(&mut self, player: usize) -> Option<&mut Fighter> {
        if self.is_locally_driven(player) {
            debug!(player, "Peer message about a locally-driven fighter, ignoring");
            return None;
        }
        self.fighters.get_mut(player)
    }

    fn parts(
        &mut self,
    ) -> (
        Scene<'_>,
        &mut CombatResolver,
        &RemoteStateReconciler,
        &AnimationFrameSynchronizer,
    ) {
        let Self {
            state,
            fighters,
            transport,
            hooks,
            timers,
            combat,
            reconciler,
            animation,
            ..
        } = self;

        let scene = Scene {
            state,
            fighters,
            transport,
            hooks,
            timers,
        };
        (scene, combat, reconciler, animation)
    }
}
