//! Routing of decoded client actions to the hub, queue and matches

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::app::AppState;
use crate::matchmaking::EnqueueOutcome;
use crate::ws::hub::Client;
use crate::ws::protocol::{decode_client_msg, ClientMsg, ServerMsg};

/// Handle one inbound text frame from `client`.
///
/// Malformed frames are logged and dropped. Actions aimed at a match the
/// player is not in are dropped silently.
pub async fn dispatch(state: &AppState, client: &Client, frame: &str) {
    let msg = match decode_client_msg(frame) {
        Ok(msg) => msg,
        Err(e) => {
            warn!(
                player_id = %client.player_id(),
                error = %e,
                "Discarding malformed frame"
            );
            return;
        }
    };

    match msg {
        ClientMsg::Match => request_match(state, client),
        ClientMsg::CancelMatch => {
            state.matchmaking.leave(client.player_id());
        }
        ClientMsg::Move { x, y } => {
            if let Some(game_match) = state.matches.find_by_player(client.player_id()) {
                game_match.move_player(client.player_id(), x, y);
            }
        }
        ClientMsg::Shoot => {
            if let Some(game_match) = state.matches.find_by_player(client.player_id()) {
                game_match.shoot(client.player_id());
            }
        }
        ClientMsg::Other => {
            debug!(player_id = %client.player_id(), "Echoing unrecognised action");
            state.hub.broadcast(Arc::from(frame)).await;
        }
    }
}

fn request_match(state: &AppState, client: &Client) {
    match state.matchmaking.enqueue(client.clone()) {
        EnqueueOutcome::Waiting { queue_size } => {
            let Ok(frame) = (ServerMsg::Queued { queue_size }).encode() else {
                return;
            };
            if let Err(e) = client.try_deliver(frame) {
                debug!(
                    player_id = %client.player_id(),
                    error = %e,
                    "Queued notice not delivered"
                );
            }
        }
        EnqueueOutcome::Started(game_match) => {
            debug!(
                player_id = %client.player_id(),
                match_id = %game_match.id(),
                "Match request completed a pairing"
            );
        }
        EnqueueOutcome::AlreadyInMatch { match_id } => {
            info!(
                player_id = %client.player_id(),
                match_id = %match_id,
                "Ignoring match request from player already in a match"
            );
        }
    }
}

/// Connection teardown: leave the queue, forfeit a match played on this
/// connection, then drop the client from the hub.
pub async fn disconnect(state: &AppState, client: &Client) {
    let player_id = client.player_id();
    state.matchmaking.leave(player_id);

    if let Some(game_match) = state.matches.find_by_player(player_id) {
        let same_connection = game_match
            .client_for(player_id)
            .map(|c| c.id() == client.id())
            .unwrap_or(false);
        if same_connection {
            game_match.forfeit(player_id);
        }
    }

    state.hub.unregister(client.id()).await;
}
