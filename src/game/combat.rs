//! Combat resolution - damage, special meter, depth swaps, outbound updates

use tracing::{debug, info, warn};

use crate::ws::protocol::NetworkMessage;

use super::cadence::{AttackCadenceController, CadenceDecision};
use super::state::{pair_mut, MAX_SPECIAL, PLAYER_COUNT};
use super::{opponent, DeferredTask, Scene};

/// Render order of the attacker during a special
pub const SPECIAL_ATTACKER_DEPTH: i32 = 100;

/// Render order of the defender during a special
pub const SPECIAL_DEFENDER_DEPTH: i32 = 99;

/// How long the special's depth swap lasts (ms)
pub const DEPTH_RESTORE_MS: u64 = 300;

/// How long attack animation flags stay set (ms)
pub const ATTACK_ANIMATION_MS: u64 = 500;

/// Damage and reach of one attack type
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttackStats {
    pub damage: f32,
    /// Maximum horizontal distance that still connects
    pub range: f32,
}

impl AttackStats {
    pub fn for_attack(is_special: bool) -> Self {
        if is_special {
            Self {
                damage: 10.0,
                range: 120.0,
            }
        } else {
            Self {
                damage: 5.0,
                range: 80.0,
            }
        }
    }
}

/// What the player tried to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Attack,
    Special,
    Block,
}

/// A landed hit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitResult {
    pub attacker: usize,
    pub defender: usize,
    pub damage: f32,
    pub defender_health: f32,
    pub is_special: bool,
    pub knocked_out: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AttackOutcome {
    /// Bad index or missing fighter; nothing happened
    Ignored,
    /// Animation played but nothing connected
    OutOfRange { distance: f32 },
    Hit(HitResult),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActionOutcome {
    Rejected(CadenceDecision),
    Blocking,
    Attack(AttackOutcome),
}

/// Apply damage to health, returns (new_health, is_knocked_out)
pub fn apply_damage(current_health: f32, damage: f32) -> (f32, bool) {
    let new_health = (current_health - damage).max(0.0);
    (new_health, new_health <= 0.0)
}

/// Resolves attacks for both player slots
#[derive(Debug, Clone, Default)]
pub struct CombatResolver {
    cadence: AttackCadenceController,
}

impl CombatResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cadence(&self) -> &AttackCadenceController {
        &self.cadence
    }

    /// Entry point for a locally-driven action
    pub fn try_action(
        &mut self,
        scene: &mut Scene<'_>,
        player: usize,
        kind: ActionKind,
        now: u64,
    ) -> ActionOutcome {
        if scene.state.is_terminal() {
            debug!(player, ?kind, "Action ignored, fight is over");
            return ActionOutcome::Rejected(CadenceDecision::Terminal);
        }
        if player >= PLAYER_COUNT {
            warn!(player, "Action for invalid player slot");
            return ActionOutcome::Attack(AttackOutcome::Ignored);
        }
        scene.state.ensure_arrays();

        if kind == ActionKind::Block {
            self.set_blocking(scene, player, true);
            return ActionOutcome::Blocking;
        }

        let is_special = kind == ActionKind::Special;
        let decision = self.cadence.can_attack(player, now, is_special, scene.state);
        if !decision.is_allowed() {
            return ActionOutcome::Rejected(decision);
        }
        if !is_special {
            self.cadence.record_attack(player, now);
        }

        start_attack_animation(scene, player, is_special, now);
        if scene.state.should_broadcast(player) {
            scene
                .transport
                .send(&NetworkMessage::attack(player, is_special));
        }

        ActionOutcome::Attack(self.try_attack(scene, player, opponent(player), now, is_special))
    }

    /// Replay an attack the peer reported. Cadence was enforced on their side
    /// and nothing is sent back.
    pub fn apply_remote_attack(
        &mut self,
        scene: &mut Scene<'_>,
        attacker: usize,
        is_special: bool,
        now: u64,
    ) -> AttackOutcome {
        if scene.state.is_terminal() || attacker >= PLAYER_COUNT {
            return AttackOutcome::Ignored;
        }
        if attacker == scene.state.local_player_index {
            warn!(attacker, "Peer reported an attack by the local fighter, ignoring");
            return AttackOutcome::Ignored;
        }

        start_attack_animation(scene, attacker, is_special, now);
        self.try_attack(scene, attacker, opponent(attacker), now, is_special)
    }

    /// Apply an attack if the fighters are close enough
    pub fn try_attack(
        &mut self,
        scene: &mut Scene<'_>,
        attacker: usize,
        defender: usize,
        now: u64,
        is_special: bool,
    ) -> AttackOutcome {
        if attacker >= PLAYER_COUNT || defender >= PLAYER_COUNT || attacker == defender {
            warn!(attacker, defender, "Invalid attack slots");
            return AttackOutcome::Ignored;
        }
        scene.state.ensure_arrays();

        let Some((attacker_fighter, defender_fighter)) = pair_mut(scene.fighters, attacker, defender)
        else {
            debug!(attacker, defender, "Fighter missing, attack ignored");
            return AttackOutcome::Ignored;
        };

        let stats = AttackStats::for_attack(is_special);
        let distance = attacker_fighter.distance_to(defender_fighter);
        if distance > stats.range {
            debug!(attacker, distance, range = stats.range, "Attack out of range");
            return AttackOutcome::OutOfRange { distance };
        }

        let (new_health, knocked_out) = apply_damage(scene.state.health(defender), stats.damage);
        let defender_health = scene.state.set_health(defender, new_health);
        defender_fighter.health = defender_health;

        if is_special {
            let due_at = now + DEPTH_RESTORE_MS;
            attacker_fighter.raise_depth(SPECIAL_ATTACKER_DEPTH, due_at);
            defender_fighter.raise_depth(SPECIAL_DEFENDER_DEPTH, due_at);
            scene.timers.schedule(
                due_at,
                DeferredTask::RestoreDepth {
                    attacker,
                    defender,
                    due_at,
                },
            );
        } else {
            let meter = scene.state.special(attacker).saturating_add(1).min(MAX_SPECIAL);
            scene.state.set_special(attacker, meter);
        }

        info!(
            attacker,
            defender,
            damage = stats.damage,
            health = defender_health,
            is_special,
            "Hit landed"
        );

        if scene.state.should_broadcast(attacker) {
            scene.transport.send_health_update(defender, defender_health);
        }
        scene.refresh_hud();

        AttackOutcome::Hit(HitResult {
            attacker,
            defender,
            damage: stats.damage,
            defender_health,
            is_special,
            knocked_out,
        })
    }

    /// Stop blocking
    pub fn release_block(&mut self, scene: &mut Scene<'_>, player: usize) {
        self.set_blocking(scene, player, false);
    }

    fn set_blocking(&mut self, scene: &mut Scene<'_>, player: usize, is_blocking: bool) {
        let Some(fighter) = scene.fighters.get_mut(player) else {
            return;
        };
        if fighter.is_blocking == is_blocking {
            return;
        }
        fighter.is_blocking = is_blocking;

        if scene.state.should_broadcast(player) {
            scene
                .transport
                .send(&NetworkMessage::block(player, is_blocking));
        }
    }

    /// Run a due deferred task. Tasks superseded by a later attack do nothing.
    pub fn run_deferred(&mut self, scene: &mut Scene<'_>, task: DeferredTask) {
        match task {
            DeferredTask::RestoreDepth {
                attacker,
                defender,
                due_at,
            } => {
                for player in [attacker, defender] {
                    if let Some(fighter) = scene.fighters.get_mut(player) {
                        fighter.restore_depth(due_at);
                    }
                }
            }
            DeferredTask::EndAttack {
                player,
                is_special,
                due_at,
            } => {
                if let Some(fighter) = scene.fighters.get_mut(player) {
                    fighter.end_attack(is_special, due_at);
                }
            }
        }
    }

    pub fn reset(&mut self) {
        self.cadence.reset();
    }
}

/// Animation flags are set whether or not the attack connects
fn start_attack_animation(scene: &mut Scene<'_>, player: usize, is_special: bool, now: u64) {
    let Some(fighter) = scene.fighters.get_mut(player) else {
        return;
    };
    let due_at = now + ATTACK_ANIMATION_MS;
    fighter.start_attack(is_special, due_at);
    scene.timers.schedule(
        due_at,
        DeferredTask::EndAttack {
            player,
            is_special,
            due_at,
        },
    );
}
