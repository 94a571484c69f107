//! Server -> Client messages.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{ProtocolError, frame};

/// Public attributes of one player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub id: String,
    pub name: String,
    pub avatar: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    pub x: f32,
    pub y: f32,
    pub angle: f32,
    pub score: u32,
    pub alive: bool,
    pub boosting: bool,
    pub invulnerable: bool,
    pub hitbox: f32,
}

/// One collectible orb.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrbView {
    pub x: f32,
    pub y: f32,
    pub bonus: bool,
    pub value: u32,
}

/// Tuning values clients need to predict and render the game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TuningView {
    pub tick_rate: u32,
    pub speed: f32,
    pub boost_speed: f32,
    pub respawn_delay_ms: u64,
    pub invulnerability_ms: u64,
    pub max_players: usize,
    pub orb_value: u32,
    pub bonus_orb_value: u32,
    pub orb_radius: f32,
    pub trail_width: f32,
    pub self_collision: bool,
}

/// Minimal per-player tuple: `[id, x, y, score, alive, boosting, hitbox]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaEntry(
    pub String,
    pub f32,
    pub f32,
    pub u32,
    pub bool,
    pub bool,
    pub f32,
);

impl DeltaEntry {
    #[inline]
    pub fn id(&self) -> &str {
        &self.0
    }
}

/// Why a join was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RejectReason {
    Full,
}

/// Outbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Sent to every new connection before it joins.
    #[serde(rename_all = "camelCase")]
    Hello {
        arena_size: f32,
        orbs: Vec<OrbView>,
        config: TuningView,
        players: Vec<PlayerView>,
    },
    /// Reply to a successful join.
    #[serde(rename_all = "camelCase")]
    Welcome {
        id: String,
        arena_size: f32,
        players: Vec<PlayerView>,
        orbs: Vec<OrbView>,
        config: TuningView,
    },
    /// A player entered the arena (join or respawn).
    Spawn { player: PlayerView },
    /// A player left.
    Despawn { id: String },
    /// A player died.
    Death { id: String },
    /// The orb population changed, optionally naming the last scorer.
    Orbs {
        orbs: Vec<OrbView>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        score: Option<u32>,
    },
    /// The arena was reset.
    #[serde(rename_all = "camelCase")]
    Reset {
        players: Vec<PlayerView>,
        orbs: Vec<OrbView>,
        arena_size: f32,
    },
    /// Periodic full snapshot.
    State {
        players: Vec<PlayerView>,
        config: TuningView,
    },
    /// Per-tick changes.
    Delta { players: Vec<DeltaEntry> },
    /// Join refused.
    Reject { reason: RejectReason },
    /// Chat line from a player.
    Chat { id: String, name: String, text: String },
}

impl ServerMessage {
    /// Serialize to JSON text.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Serialize and wrap in a single text frame.
    pub fn to_frame(&self) -> Result<Bytes, ProtocolError> {
        Ok(frame::encode_text(&self.to_json()?))
    }
}
