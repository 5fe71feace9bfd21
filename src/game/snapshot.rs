//! Outbound views of match state

use super::r#match::MatchState;
use crate::ws::protocol::ServerMsg;

/// Announcement sent to both players when a match starts
pub fn match_success(match_id: &str, state: &MatchState) -> ServerMsg {
    ServerMsg::MatchSuccess {
        room_id: match_id.to_string(),
        players: state.players.to_vec(),
    }
}

/// Full per-tick state: both players and every live bullet
pub fn game_state(state: &MatchState) -> ServerMsg {
    ServerMsg::GameState {
        players: state.players.to_vec(),
        bullets: state.bullets.clone(),
    }
}
