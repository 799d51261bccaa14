//! WebSocket protocol message definitions
//! These are the wire types exchanged with the peer through the relay

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use tracing::debug;

use crate::util::time::unix_millis;

/// Horizontal movement direction reported by a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Left,
    Right,
    /// Anything else (including "stop" and "none") halts the fighter
    #[serde(other)]
    Stop,
}

impl Direction {
    /// Sign applied to the walk speed
    pub fn sign(self) -> f32 {
        match self {
            Self::Left => -1.0,
            Self::Right => 1.0,
            Self::Stop => 0.0,
        }
    }
}

/// Animation a fighter is playing, as reported in position updates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnimationKind {
    Walking,
    Idle,
}

impl AnimationKind {
    /// Parse the legacy free-form `cause` field
    pub fn from_cause(cause: &str) -> Option<Self> {
        match cause {
            "walking" | "walk" | "move" => Some(Self::Walking),
            "idle" | "stop" | "stand" => Some(Self::Idle),
            _ => None,
        }
    }
}

/// Position and animation frame of one fighter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionUpdate {
    pub player_index: usize,
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub velocity_x: f32,
    #[serde(default)]
    pub velocity_y: f32,
    #[serde(default)]
    pub flip_x: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub animation: Option<AnimationKind>,
    /// Older clients describe the animation here instead of `animation`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    #[serde(default)]
    pub timestamp: u64,
}

impl PositionUpdate {
    /// `animation` wins over the legacy `cause` when both are present
    pub fn resolved_animation(&self) -> Option<AnimationKind> {
        self.animation
            .or_else(|| self.cause.as_deref().and_then(AnimationKind::from_cause))
    }
}

/// Every frame that crosses the wire, peer messages and relay control alike
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NetworkMessage {
    #[serde(rename_all = "camelCase")]
    Movement {
        player_idx: usize,
        direction: Direction,
        #[serde(default)]
        timestamp: u64,
    },

    #[serde(rename_all = "camelCase")]
    Jump {
        player_idx: usize,
        #[serde(default)]
        timestamp: u64,
    },

    #[serde(rename_all = "camelCase")]
    Attack {
        player_idx: usize,
        #[serde(default)]
        is_special: bool,
        #[serde(default)]
        timestamp: u64,
    },

    #[serde(rename_all = "camelCase")]
    Block {
        player_idx: usize,
        #[serde(default = "default_true")]
        is_blocking: bool,
        #[serde(default)]
        timestamp: u64,
    },

    /// Authoritative health for one player slot
    #[serde(rename_all = "camelCase")]
    HealthUpdate {
        player_index: usize,
        health: f32,
        #[serde(default)]
        timestamp: u64,
    },

    PositionUpdate(PositionUpdate),

    #[serde(rename_all = "camelCase")]
    ReplayRequest {
        match_id: String,
        player_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(default)]
        timestamp: u64,
    },

    #[serde(rename_all = "camelCase")]
    ReplayResponse {
        match_id: String,
        accepted: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        player_id: Option<String>,
        #[serde(default)]
        timestamp: u64,
    },

    #[serde(rename_all = "camelCase")]
    HostStatus {
        is_host: bool,
        #[serde(default)]
        timestamp: u64,
    },

    #[serde(rename_all = "camelCase")]
    RoomCode {
        room_code: String,
        #[serde(default)]
        timestamp: u64,
    },

    /// Free-form action. The relay forwards only flat top-level fields, never a payload object
    GameAction {
        action: String,
        #[serde(default)]
        timestamp: u64,
        #[serde(flatten)]
        fields: Map<String, Value>,
    },

    #[serde(rename_all = "camelCase")]
    CharacterSelected {
        character: u8,
        player_num: u8,
        #[serde(default)]
        timestamp: u64,
    },

    // Relay control
    CreateRoom {
        #[serde(default)]
        timestamp: u64,
    },

    #[serde(rename_all = "camelCase")]
    JoinRoom {
        room_code: String,
        #[serde(default)]
        timestamp: u64,
    },

    #[serde(rename_all = "camelCase")]
    RoomCreated { room_code: String },

    #[serde(rename_all = "camelCase")]
    GameJoined {
        #[serde(default)]
        room_code: Option<String>,
    },

    #[serde(rename_all = "camelCase")]
    PlayerJoined {
        #[serde(default)]
        room_code: Option<String>,
    },

    Error { message: String },
}

/// Keys owned by the `game_action` envelope itself
const RESERVED_ACTION_KEYS: [&str; 3] = ["type", "action", "timestamp"];

fn default_true() -> bool {
    true
}

impl NetworkMessage {
    pub fn movement(player_idx: usize, direction: Direction) -> Self {
        Self::Movement {
            player_idx,
            direction,
            timestamp: unix_millis(),
        }
    }

    pub fn jump(player_idx: usize) -> Self {
        Self::Jump {
            player_idx,
            timestamp: unix_millis(),
        }
    }

    pub fn attack(player_idx: usize, is_special: bool) -> Self {
        Self::Attack {
            player_idx,
            is_special,
            timestamp: unix_millis(),
        }
    }

    pub fn block(player_idx: usize, is_blocking: bool) -> Self {
        Self::Block {
            player_idx,
            is_blocking,
            timestamp: unix_millis(),
        }
    }

    pub fn health_update(player_index: usize, health: f32) -> Self {
        Self::HealthUpdate {
            player_index,
            health,
            timestamp: unix_millis(),
        }
    }

    pub fn host_status(is_host: bool) -> Self {
        Self::HostStatus {
            is_host,
            timestamp: unix_millis(),
        }
    }

    pub fn room_code(room_code: impl Into<String>) -> Self {
        Self::RoomCode {
            room_code: room_code.into(),
            timestamp: unix_millis(),
        }
    }

    /// Build a game action, turning numeric-looking string fields into numbers.
    /// Fields named like envelope keys are dropped; the envelope values win.
    pub fn game_action(action: impl Into<String>, mut fields: Map<String, Value>) -> Self {
        for key in RESERVED_ACTION_KEYS {
            if fields.remove(key).is_some() {
                debug!(key, "Dropping game action field that shadows an envelope key");
            }
        }
        Self::GameAction {
            action: action.into(),
            timestamp: unix_millis(),
            fields: coerce_numeric_fields(fields),
        }
    }

    /// Wire tag, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Movement { .. } => "movement",
            Self::Jump { .. } => "jump",
            Self::Attack { .. } => "attack",
            Self::Block { .. } => "block",
            Self::HealthUpdate { .. } => "health_update",
            Self::PositionUpdate(_) => "position_update",
            Self::ReplayRequest { .. } => "replay_request",
            Self::ReplayResponse { .. } => "replay_response",
            Self::HostStatus { .. } => "host_status",
            Self::RoomCode { .. } => "room_code",
            Self::GameAction { .. } => "game_action",
            Self::CharacterSelected { .. } => "character_selected",
            Self::CreateRoom { .. } => "create_room",
            Self::JoinRoom { .. } => "join_room",
            Self::RoomCreated { .. } => "room_created",
            Self::GameJoined { .. } => "game_joined",
            Self::PlayerJoined { .. } => "player_joined",
            Self::Error { .. } => "error",
        }
    }
}

/// Replace string values that parse as numbers with JSON numbers.
/// Peers send coordinates like `"x": "120.5"`; the combat code expects numbers.
pub fn coerce_numeric_fields(fields: Map<String, Value>) -> Map<String, Value> {
    fields
        .into_iter()
        .map(|(key, value)| (key, coerce_numeric(value)))
        .collect()
}

fn coerce_numeric(value: Value) -> Value {
    let parsed = match &value {
        Value::String(text) => parse_number(text.trim()),
        _ => None,
    };
    parsed.map(Value::Number).unwrap_or(value)
}

fn parse_number(text: &str) -> Option<Number> {
    if let Ok(int) = text.parse::<i64>() {
        return Some(int.into());
    }
    text.parse::<f64>().ok().and_then(Number::from_f64)
}
