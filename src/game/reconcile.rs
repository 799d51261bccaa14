//! Reconciliation of peer-reported health with local combat results

use tracing::{debug, info};

use super::state::PLAYER_COUNT;
use super::Scene;

/// Own-slot updates closer than this to local health are echoes of hits
/// already applied here
pub const HEALTH_ECHO_TOLERANCE: f32 = 10.0;

/// Decides when a peer's health report overrides local state
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoteStateReconciler;

impl RemoteStateReconciler {
    pub fn new() -> Self {
        Self
    }

    /// Whether an update for `player_index` should overwrite `current`.
    ///
    /// The peer is authoritative for the other slot. For the local slot only
    /// a large discrepancy counts as a desync correction.
    pub fn should_apply(
        local_player_index: usize,
        player_index: usize,
        current: f32,
        incoming: f32,
    ) -> bool {
        player_index != local_player_index || (current - incoming).abs() > HEALTH_ECHO_TOLERANCE
    }

    /// Apply a `health_update` if it passes [`should_apply`](Self::should_apply).
    /// Returns whether local state changed.
    pub fn apply_health_update(
        &self,
        scene: &mut Scene<'_>,
        local_player_index: usize,
        player_index: usize,
        health: f32,
    ) -> bool {
        if player_index >= PLAYER_COUNT {
            debug!(player_index, "Health update for invalid slot, ignoring");
            return false;
        }
        scene.state.ensure_arrays();

        let current = scene.state.health(player_index);
        if !Self::should_apply(local_player_index, player_index, current, health) {
            debug!(
                player_index,
                current,
                incoming = health,
                "Health update within echo tolerance, ignoring"
            );
            return false;
        }

        let applied = scene.state.set_health(player_index, health);
        if let Some(fighter) = scene.fighters.get_mut(player_index) {
            fighter.health = applied;
        }
        info!(player_index, from = current, to = applied, "Applied peer health update");

        scene.refresh_health_bars();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::MAX_HEALTH;
    use crate::game::testing::Fixture;

    #[test]
    fn own_slot_echo_is_ignored_and_desync_applied() {
        let mut fixture = Fixture::online(0);
        let reconciler = RemoteStateReconciler::new();

        assert!(!reconciler.apply_health_update(&mut fixture.scene(), 0, 0, 90.0));
        assert_eq!(fixture.state.health(0), MAX_HEALTH);
        assert!(fixture.hooks.health_bars.is_empty());

        assert!(reconciler.apply_health_update(&mut fixture.scene(), 0, 0, 80.0));
        assert_eq!(fixture.state.health(0), 80.0);
        assert_eq!(fixture.fighters[0].health, 80.0);
        assert_eq!(fixture.hooks.health_bars, vec![(0, 80.0), (1, 100.0)]);
        assert_eq!(fixture.hooks.winner_checks, 1);
    }

    #[test]
    fn other_slot_always_applies() {
        let mut fixture = Fixture::online(0);
        let reconciler = RemoteStateReconciler::new();

        assert!(reconciler.apply_health_update(&mut fixture.scene(), 0, 1, 99.0));
        assert_eq!(fixture.state.health(1), 99.0);

        assert!(reconciler.apply_health_update(&mut fixture.scene(), 0, 1, 99.0));
    }

    #[test]
    fn applied_health_is_clamped() {
        let mut fixture = Fixture::online(1);
        let reconciler = RemoteStateReconciler::new();

        reconciler.apply_health_update(&mut fixture.scene(), 1, 0, -20.0);

        assert_eq!(fixture.state.health(0), 0.0);
        assert!(fixture.state.fight_ended);
    }

    #[test]
    fn invalid_slot_is_ignored() {
        let mut fixture = Fixture::online(0);
        let reconciler = RemoteStateReconciler::new();

        assert!(!reconciler.apply_health_update(&mut fixture.scene(), 0, 4, 10.0));
        assert_eq!(fixture.hooks.winner_checks, 0);
    }

    #[test]
    fn echo_boundary_is_exclusive() {
        assert!(!RemoteStateReconciler::should_apply(0, 0, 100.0, 90.0));
        assert!(RemoteStateReconciler::should_apply(0, 0, 100.0, 89.5));
        assert!(RemoteStateReconciler::should_apply(0, 1, 100.0, 100.0));
    }
}
