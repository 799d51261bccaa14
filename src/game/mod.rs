//! Match simulation: cadence, combat, reconciliation, animation

pub mod animation;
pub mod cadence;
pub mod combat;
pub mod reconcile;
pub mod session;
pub mod state;

pub use animation::{AnimationFrameSynchronizer, RemoteFrameHold, SpriteAnimation};
pub use cadence::{AttackCadenceController, CadenceDecision};
pub use combat::{ActionKind, ActionOutcome, AttackOutcome, CombatResolver};
pub use reconcile::RemoteStateReconciler;
pub use session::{MatchSession, SessionConfig};
pub use state::{Fighter, GameMode, MatchState};

use tracing::info;

use crate::util::timers::Timers;
use crate::ws::protocol::{Direction, NetworkMessage};
use crate::ws::TransportManager;
use state::PLAYER_COUNT;

/// Result of the external win check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FightStatus {
    Ongoing,
    Won { winner: usize },
    Draw,
}

/// Callbacks into the surrounding game (HUD, win screen, menus)
pub trait SceneHooks {
    fn update_health_bar(&mut self, player: usize, health: f32);

    fn update_special_pips(&mut self, player: usize, meter: u8);

    /// Decide whether the fight is over
    fn check_winner(&mut self, health: &[f32]) -> FightStatus;

    /// Peer messages the core does not act on itself (character select,
    /// replay requests, free-form game actions, relay notices)
    fn on_peer_message(&mut self, _message: &NetworkMessage) {}
}

/// Work deferred to a later tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredTask {
    /// Put both fighters back in their pre-special render order
    RestoreDepth {
        attacker: usize,
        defender: usize,
        due_at: u64,
    },
    /// An attack animation flag runs out
    EndAttack {
        player: usize,
        is_special: bool,
        due_at: u64,
    },
}

/// Borrowed view of everything a component may touch during one call
pub struct Scene<'a> {
    pub state: &'a mut MatchState,
    pub fighters: &'a mut [Fighter],
    pub transport: &'a mut TransportManager,
    pub hooks: &'a mut dyn SceneHooks,
    pub timers: &'a mut Timers<DeferredTask>,
}

impl Scene<'_> {
    /// Push health and meter for both players to the HUD, then check for a winner
    pub fn refresh_hud(&mut self) {
        self.state.ensure_arrays();
        for player in 0..PLAYER_COUNT {
            self.hooks
                .update_health_bar(player, self.state.health(player));
            self.hooks
                .update_special_pips(player, self.state.special(player));
        }
        self.check_winner();
    }

    /// Health bars only, then the winner check
    pub fn refresh_health_bars(&mut self) {
        self.state.ensure_arrays();
        for player in 0..PLAYER_COUNT {
            self.hooks
                .update_health_bar(player, self.state.health(player));
        }
        self.check_winner();
    }

    fn check_winner(&mut self) {
        let status = self.hooks.check_winner(&self.state.player_health);
        if status == FightStatus::Ongoing {
            return;
        }
        if !self.state.fight_ended {
            info!(?status, "Fight over");
        }
        self.state.fight_ended = true;
        self.state.game_over = true;
    }
}

/// The other player slot
pub fn opponent(player: usize) -> usize {
    1 - player.min(1)
}

/// Controller state for one locally-driven fighter for a single tick
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TickInput {
    /// -1.0 = left, 1.0 = right, 0.0 = stand
    pub move_x: f32,
    pub jump: bool,
    pub attack: bool,
    pub special: bool,
    pub block: bool,
}

impl TickInput {
    pub fn direction(&self) -> Direction {
        if self.move_x < 0.0 {
            Direction::Left
        } else if self.move_x > 0.0 {
            Direction::Right
        } else {
            Direction::Stop
        }
    }
}

/// Shared fixtures for component tests
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::ws::transport::testing::{connected_transport, fake_transport, SharedWire};

    /// Records every HUD call; knocks out at 0 health
    #[derive(Debug, Default)]
    pub struct RecordingHooks {
        pub health_bars: Vec<(usize, f32)>,
        pub pips: Vec<(usize, u8)>,
        pub winner_checks: u32,
        pub peer_messages: Vec<NetworkMessage>,
    }

    impl SceneHooks for RecordingHooks {
        fn update_health_bar(&mut self, player: usize, health: f32) {
            self.health_bars.push((player, health));
        }

        fn update_special_pips(&mut self, player: usize, meter: u8) {
            self.pips.push((player, meter));
        }

        fn check_winner(&mut self, health: &[f32]) -> FightStatus {
            self.winner_checks += 1;
            match (health[0] <= 0.0, health[1] <= 0.0) {
                (true, true) => FightStatus::Draw,
                (false, true) => FightStatus::Won { winner: 0 },
                (true, false) => FightStatus::Won { winner: 1 },
                (false, false) => FightStatus::Ongoing,
            }
        }

        fn on_peer_message(&mut self, message: &NetworkMessage) {
            self.peer_messages.push(message.clone());
        }
    }

    pub struct Fixture {
        pub state: MatchState,
        pub fighters: Vec<Fighter>,
        pub transport: TransportManager,
        pub wire: SharedWire,
        pub hooks: RecordingHooks,
        pub timers: Timers<DeferredTask>,
    }

    impl Fixture {
        /// Hot-seat match, fighters 50px apart
        pub fn local() -> Self {
            let (transport, wire) = fake_transport();
            Self::build(MatchState::new(0, GameMode::Local), transport, wire)
        }

        /// Online match with a connected transport
        pub fn online(local_player_index: usize) -> Self {
            let (transport, wire) = connected_transport();
            Self::build(
                MatchState::new(local_player_index, GameMode::Online),
                transport,
                wire,
            )
        }

        fn build(state: MatchState, transport: TransportManager, wire: SharedWire) -> Self {
            Self {
                state,
                fighters: vec![Fighter::new(100.0, 300.0), Fighter::new(150.0, 300.0)],
                transport,
                wire,
                hooks: RecordingHooks::default(),
                timers: Timers::new(),
            }
        }

        pub fn scene(&mut self) -> Scene<'_> {
            Scene {
                state: &mut self.state,
                fighters: &mut self.fighters,
                transport: &mut self.transport,
                hooks: &mut self.hooks,
                timers: &mut self.timers,
            }
        }

        pub fn sent(&self) -> Vec<NetworkMessage> {
            self.wire.borrow().sent_messages()
        }
    }
}
