//! Match-scoped state: the match record and the two fighters

use crate::game::animation::SpriteAnimation;
use crate::ws::protocol::AnimationKind;

/// Player slots in a duel
pub const PLAYER_COUNT: usize = 2;

/// Full health
pub const MAX_HEALTH: f32 = 100.0;

/// Special meter cap; a full meter unlocks the special attack
pub const MAX_SPECIAL: u8 = 3;

/// Render order used when a sprite never had one assigned
pub const DEFAULT_DEPTH: i32 = 1;

/// Who drives the second fighter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GameMode {
    /// Both fighters on one device
    #[default]
    Local,
    /// One fighter per peer, synced through the relay
    Online,
}

/// Per-match record, owned by the session
#[derive(Debug, Clone, Default)]
pub struct MatchState {
    pub player_health: Vec<f32>,
    pub player_special: Vec<u8>,
    pub local_player_index: usize,
    pub game_mode: GameMode,
    pub game_over: bool,
    pub fight_ended: bool,
}

impl MatchState {
    pub fn new(local_player_index: usize, game_mode: GameMode) -> Self {
        let mut state = Self {
            local_player_index,
            game_mode,
            ..Self::default()
        };
        state.ensure_arrays();
        state
    }

    /// Fill missing health/special slots with defaults
    pub fn ensure_arrays(&mut self) {
        if self.player_health.len() < PLAYER_COUNT {
            self.player_health.resize(PLAYER_COUNT, MAX_HEALTH);
        }
        if self.player_special.len() < PLAYER_COUNT {
            self.player_special.resize(PLAYER_COUNT, 0);
        }
    }

    /// Rounds are over; player actions are ignored
    pub fn is_terminal(&self) -> bool {
        self.game_over || self.fight_ended
    }

    pub fn is_online(&self) -> bool {
        self.game_mode == GameMode::Online
    }

    /// Only the local player's own actions go out on the wire
    pub fn should_broadcast(&self, player: usize) -> bool {
        self.is_online() && player == self.local_player_index
    }

    pub fn health(&self, player: usize) -> f32 {
        self.player_health.get(player).copied().unwrap_or(MAX_HEALTH)
    }

    pub fn special(&self, player: usize) -> u8 {
        self.player_special.get(player).copied().unwrap_or(0)
    }

    /// Store clamped health and return the stored value
    pub fn set_health(&mut self, player: usize, health: f32) -> f32 {
        self.ensure_arrays();
        let clamped = clamp_health(health);
        if let Some(slot) = self.player_health.get_mut(player) {
            *slot = clamped;
        }
        clamped
    }

    pub fn set_special(&mut self, player: usize, meter: u8) {
        self.ensure_arrays();
        if let Some(slot) = self.player_special.get_mut(player) {
            *slot = meter.min(MAX_SPECIAL);
        }
    }

    /// Back to a fresh round, keeping slot assignment and mode
    pub fn reset(&mut self) {
        self.player_health = vec![MAX_HEALTH; PLAYER_COUNT];
        self.player_special = vec![0; PLAYER_COUNT];
        self.game_over = false;
        self.fight_ended = false;
    }
}

/// NaN is treated as knocked out
pub fn clamp_health(health: f32) -> f32 {
    if health.is_nan() {
        return 0.0;
    }
    health.clamp(0.0, MAX_HEALTH)
}

/// A fighter sprite as the core sees it
#[derive(Debug, Clone)]
pub struct Fighter {
    pub health: f32,
    pub x: f32,
    pub y: f32,
    pub velocity_x: f32,
    pub velocity_y: f32,
    pub flip_x: bool,
    pub frame: u8,
    pub is_attacking: bool,
    pub is_special_attacking: bool,
    pub is_blocking: bool,
    /// Render order; `None` until the renderer assigns one
    pub depth: Option<i32>,
    /// Depth to return to after a special attack
    pub original_depth: Option<i32>,
    /// Due time of the restore that owns the current raise
    depth_restore_at: Option<u64>,
    /// Due times of the end-of-animation tasks that own the attack flags
    attack_ends_at: Option<u64>,
    special_ends_at: Option<u64>,
    pub animation: SpriteAnimation,
    /// Last animation the peer reported for this fighter
    pub remote_animation: Option<AnimationKind>,
    spawn_x: f32,
    spawn_y: f32,
}

impl Fighter {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            health: MAX_HEALTH,
            x,
            y,
            velocity_x: 0.0,
            velocity_y: 0.0,
            flip_x: false,
            frame: 0,
            is_attacking: false,
            is_special_attacking: false,
            is_blocking: false,
            depth: None,
            original_depth: None,
            depth_restore_at: None,
            attack_ends_at: None,
            special_ends_at: None,
            animation: SpriteAnimation::default(),
            remote_animation: None,
            spawn_x: x,
            spawn_y: y,
        }
    }

    pub fn with_depth(mut self, depth: i32) -> Self {
        self.depth = Some(depth);
        self
    }

    /// Horizontal distance to another fighter
    pub fn distance_to(&self, other: &Fighter) -> f32 {
        (self.x - other.x).abs()
    }

    /// Lift the sprite in render order until `restore_at`, remembering where
    /// it was. A raise while already raised keeps the first remembered depth
    /// and moves the restore to the new due time.
    pub fn raise_depth(&mut self, depth: i32, restore_at: u64) {
        if self.depth_restore_at.is_none() {
            self.original_depth = self.depth;
        }
        self.depth_restore_at = Some(restore_at);
        self.depth = Some(depth);
    }

    /// Undo [`raise_depth`](Self::raise_depth) for the raise due at `due_at`.
    /// A restore superseded by a later raise is a no-op.
    pub fn restore_depth(&mut self, due_at: u64) {
        if self.depth_restore_at != Some(due_at) {
            return;
        }
        self.clear_depth_raise();
    }

    fn clear_depth_raise(&mut self) {
        if self.depth_restore_at.take().is_some() {
            self.depth = Some(self.original_depth.take().unwrap_or(DEFAULT_DEPTH));
        }
    }

    /// Set an attack animation flag until `ends_at`
    pub fn start_attack(&mut self, is_special: bool, ends_at: u64) {
        if is_special {
            self.is_special_attacking = true;
            self.special_ends_at = Some(ends_at);
        } else {
            self.is_attacking = true;
            self.attack_ends_at = Some(ends_at);
        }
    }

    /// Clear the flag set by the attack ending at `due_at`, unless a later
    /// attack of the same kind has taken it over
    pub fn end_attack(&mut self, is_special: bool, due_at: u64) {
        let (flag, ends_at) = if is_special {
            (&mut self.is_special_attacking, &mut self.special_ends_at)
        } else {
            (&mut self.is_attacking, &mut self.attack_ends_at)
        };
        if *ends_at == Some(due_at) {
            *flag = false;
            *ends_at = None;
        }
    }

    /// Back to spawn for a new round
    pub fn reset(&mut self) {
        self.clear_depth_raise();
        let depth = self.depth;
        *self = Self::new(self.spawn_x, self.spawn_y);
        self.depth = depth;
    }
}

/// Two distinct fighters borrowed mutably at once
pub fn pair_mut(fighters: &mut [Fighter], a: usize, b: usize) -> Option<(&mut Fighter, &mut Fighter)> {
    if a == b || a >= fighters.len() || b >= fighters.len() {
        return None;
    }
    if a < b {
        let (left, right) = fighters.split_at_mut(b);
        Some((&mut left[a], &mut right[0]))
    } else {
        let (left, right) = fighters.split_at_mut(a);
        Some((&mut right[0], &mut left[b]))
    }
}
