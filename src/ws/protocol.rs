//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::game::{Bullet, Player, PlayerId};

/// An encoded outbound frame, shared between every recipient of a broadcast
pub type Frame = Arc<str>;

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Ask for a quick-match opponent
    Match,

    /// Leave the quick-match queue
    CancelMatch,

    /// Reposition the player's plane
    Move { x: i32, y: i32 },

    /// Fire a bullet from the current position
    Shoot,

    /// Any other action; the raw frame is echoed to every connection
    #[serde(other)]
    Other,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Sent once after the connection is registered
    Welcome { player_id: PlayerId, name: String },

    /// Match request accepted, waiting for an opponent
    Queued { queue_size: usize },

    /// A match was formed; sent once to both players
    MatchSuccess {
        room_id: String,
        players: Vec<Player>,
    },

    /// Authoritative state, sent every tick while the match runs
    GameState {
        players: Vec<Player>,
        bullets: Vec<Bullet>,
    },

    /// Terminal event; `winner` is null on a draw
    GameOver { winner: Option<Player> },
}

impl ServerMsg {
    /// Serialize into a frame ready for the outbound queues
    pub fn encode(&self) -> Result<Frame, ProtocolError> {
        let json = serde_json::to_string(self).map_err(ProtocolError::Encode)?;
        Ok(Arc::from(json))
    }
}

/// Decode an inbound text frame
pub fn decode_client_msg(frame: &str) -> Result<ClientMsg, ProtocolError> {
    serde_json::from_str(frame).map_err(ProtocolError::Decode)
}

/// Protocol errors
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Malformed client frame: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Failed to encode server message: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Binary frame is not valid UTF-8")]
    NotUtf8,
}
