//! Client -> Server messages.

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// Parsed client message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Join with a requested name and avatar.
    Join(JoinRequest),
    /// Join with a server-assigned name.
    Auto(JoinRequest),
    /// Steering intent. Either field may be omitted.
    Input {
        #[serde(default)]
        angle: Option<f32>,
        #[serde(default)]
        boost: Option<bool>,
    },
    /// Administrative command (unauthenticated).
    Admin { action: AdminAction },
    /// Chat line from a joined player.
    Chat {
        #[serde(default)]
        text: String,
    },
}

impl ClientMessage {
    /// Parse a client message from the text of one frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Fields shared by `join` and `auto`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

/// Admin actions. Unrecognised actions parse as `Unknown` and are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdminAction {
    Reset,
    #[serde(other)]
    Unknown,
}
