//! Attack cadence: cooldowns and escalating rapid-fire penalties

use std::fmt;

use tracing::debug;

use super::state::{MatchState, MAX_SPECIAL, PLAYER_COUNT};

/// Minimum gap between any two normal attacks (ms)
pub const BASE_COOLDOWN_MS: u64 = 500;

/// Extra gap per attack beyond the second in a burst (ms)
pub const PENALTY_STEP_MS: u64 = 200;

/// Idle time that ends a burst (ms)
pub const BURST_RESET_MS: u64 = 1_000;

/// Per-player cadence bookkeeping
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CadenceState {
    pub last_attack_time: Option<u64>,
    pub consecutive_attack_count: u32,
    /// Refreshed on every attack, not only when the burst resets
    pub last_consecutive_reset_time: Option<u64>,
}

impl CadenceState {
    /// Burst count as of `now`, after applying an idle reset
    fn effective_count(&self, now: u64) -> u32 {
        match self.last_consecutive_reset_time {
            Some(at) if now.saturating_sub(at) < BURST_RESET_MS => self.consecutive_attack_count,
            _ => 0,
        }
    }
}

/// Outcome of an attack attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CadenceDecision {
    Allowed {
        /// Position of this attack in its burst (1 = first)
        consecutive: u32,
        /// Time since the previous attack, if there was one
        delay_ms: Option<u64>,
    },
    Blocked {
        remaining_ms: u64,
    },
    /// Special requested without a full meter
    MeterNotFull {
        meter: u8,
    },
    /// Round is over
    Terminal,
}

impl CadenceDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }

    pub fn remaining_ms(&self) -> Option<u64> {
        match self {
            Self::Blocked { remaining_ms } => Some(*remaining_ms),
            _ => None,
        }
    }
}

impl fmt::Display for CadenceDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allowed {
                consecutive,
                delay_ms: Some(delay),
            } => write!(f, "allowed (consecutive={consecutive}, delay was={delay}ms)"),
            Self::Allowed {
                consecutive,
                delay_ms: None,
            } => write!(f, "allowed (consecutive={consecutive}, first attack)"),
            Self::Blocked { remaining_ms } => write!(f, "blocked ({remaining_ms}ms remaining)"),
            Self::MeterNotFull { meter } => write!(f, "blocked (special meter {meter}/{MAX_SPECIAL})"),
            Self::Terminal => write!(f, "blocked (fight over)"),
        }
    }
}

/// Gap required before the next attack, given how many attacks the burst already has
pub fn required_gap_ms(burst_count: u32) -> u64 {
    // k-th attack (k >= 2) needs 500 + 200 * (k - 2); burst_count is k - 1
    let extra = burst_count.saturating_sub(1) as u64;
    BASE_COOLDOWN_MS + PENALTY_STEP_MS * extra
}

/// Gates attack attempts for both player slots
#[derive(Debug, Clone, Default)]
pub struct AttackCadenceController {
    players: [CadenceState; PLAYER_COUNT],
}

impl AttackCadenceController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, player: usize) -> Option<&CadenceState> {
        self.players.get(player)
    }

    /// Decide whether `player` may attack at `now`. Does not change state.
    pub fn can_attack(
        &self,
        player: usize,
        now: u64,
        is_special: bool,
        match_state: &MatchState,
    ) -> CadenceDecision {
        let decision = self.evaluate(player, now, is_special, match_state);
        match decision {
            CadenceDecision::Allowed { consecutive, delay_ms } => debug!(
                player,
                is_special,
                consecutive,
                delay_ms = ?delay_ms,
                "Attack {}", decision
            ),
            _ => debug!(
                player,
                is_special,
                remaining_ms = ?decision.remaining_ms(),
                "Attack {}", decision
            ),
        }
        decision
    }

    fn evaluate(
        &self,
        player: usize,
        now: u64,
        is_special: bool,
        match_state: &MatchState,
    ) -> CadenceDecision {
        if match_state.is_terminal() {
            return CadenceDecision::Terminal;
        }

        let Some(cadence) = self.players.get(player) else {
            return CadenceDecision::Terminal;
        };

        if is_special {
            let meter = match_state.special(player);
            return if meter >= MAX_SPECIAL {
                CadenceDecision::Allowed {
                    consecutive: cadence.effective_count(now),
                    delay_ms: cadence.last_attack_time.map(|t| now.saturating_sub(t)),
                }
            } else {
                CadenceDecision::MeterNotFull { meter }
            };
        }

        let count = cadence.effective_count(now);
        let Some(last) = cadence.last_attack_time else {
            return CadenceDecision::Allowed {
                consecutive: count + 1,
                delay_ms: None,
            };
        };

        let elapsed = now.saturating_sub(last);
        let required = required_gap_ms(count);
        if elapsed >= required {
            CadenceDecision::Allowed {
                consecutive: count + 1,
                delay_ms: Some(elapsed),
            }
        } else {
            CadenceDecision::Blocked {
                remaining_ms: required - elapsed,
            }
        }
    }

    /// Advance state after an allowed normal attack
    pub fn record_attack(&mut self, player: usize, now: u64) {
        let Some(cadence) = self.players.get_mut(player) else {
            return;
        };

        cadence.consecutive_attack_count = cadence.effective_count(now) + 1;
        cadence.last_consecutive_reset_time = Some(now);
        cadence.last_attack_time = Some(now);
    }

    pub fn reset(&mut self) {
        self.players = Default::default();
    }
}
