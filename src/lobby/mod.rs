//! Lobbies: pre-arranged matches started by their owner

pub mod directory;

use std::sync::Arc;

use tracing::{info, warn};

pub use directory::{Lobby, LobbyDirectory, LobbyError, LobbyMember, MATCH_SIZE};

use crate::app::AppState;
use crate::game::GameMatch;
use crate::ws::hub::Client;

/// Start the owner's full lobby as a match, bypassing the quick-match queue.
///
/// Every roster member must have a live connection and must not already be
/// playing. Members waiting in the quick-match queue are taken out of it.
/// The lobby is `in_game` while the match runs and `waiting` again once it ends.
pub async fn launch(state: &AppState, owner_id: &str) -> Result<Arc<GameMatch>, LobbyError> {
    let lobby = state.lobbies.ready_roster(owner_id)?;

    let mut clients: Vec<Client> = Vec::with_capacity(lobby.members.len());
    for member in &lobby.members {
        let client = state
            .hub
            .find_by_player(&member.id)
            .await
            .ok_or_else(|| LobbyError::NotConnected(member.name.clone()))?;
        clients.push(client);
    }

    let have = clients.len();
    let clients: [Client; MATCH_SIZE] = clients
        .try_into()
        .map_err(|_| LobbyError::RosterIncomplete {
            have,
            need: MATCH_SIZE,
        })?;

    let game_match = Arc::new(GameMatch::new(lobby.id.clone(), clients));
    let handle = state
        .matchmaking
        .start_match(Arc::clone(&game_match))
        .map_err(|busy| {
            let name = lobby
                .members
                .iter()
                .find(|m| m.id == busy)
                .map_or(busy.clone(), |m| m.name.clone());
            LobbyError::AlreadyInMatch(name)
        })?;

    if let Err(e) = state.lobbies.mark_in_game(&lobby.code) {
        warn!(lobby_code = %lobby.code, error = %e, "Lobby vanished while its match started");
    }
    info!(lobby_code = %lobby.code, match_id = %lobby.id, "Lobby match launched");

    let lobbies = Arc::clone(&state.lobbies);
    let code = lobby.code;
    tokio::spawn(async move {
        if let Err(e) = handle.await {
            warn!(lobby_code = %code, error = %e, "Lobby match task failed");
        }
        if lobbies.mark_waiting(&code).is_ok() {
            info!(lobby_code = %code, "Lobby reopened after its match");
        }
    });

    Ok(game_match)
}

#[cfg(test)]
mod tests {
    use super::directory::LobbyStatus;
    use super::*;
    use crate::app::state::test_support::test_state;
    use crate::matchmaking::EnqueueOutcome;
    use crate::ws::hub::{ClientReceiver, PlayerIdentity};
    use serde_json::Value;
    use std::time::Duration;
    use tokio::sync::Barrier;
    use tokio::time::{sleep, timeout};

    fn member(id: &str) -> LobbyMember {
        LobbyMember {
            id: id.to_string(),
            name: id.to_string(),
        }
    }

    async fn connect(state: &AppState, id: &str) -> (Client, ClientReceiver) {
        let (client, rx) = Client::new(
            PlayerIdentity {
                id: id.to_string(),
                name: id.to_string(),
            },
            64,
        );
        state.hub.register(client.clone()).await;
        (client, rx)
    }

    #[tokio::test]
    async fn launches_full_lobby_with_connected_players() {
        let state = test_state();
        let lobby = state.lobbies.create(member("owner"), MATCH_SIZE).unwrap();
        state.lobbies.join(&lobby.code, member("guest")).unwrap();
        let (_owner, mut owner_rx) = connect(&state, "owner").await;
        let (guest, _guest_rx) = connect(&state, "guest").await;
        state.matchmaking.enqueue(guest);

        let game = launch(&state, "owner").await.unwrap();

        assert_eq!(game.id(), lobby.id);
        assert_eq!(game.player_ids(), &["owner".to_string(), "guest".to_string()]);
        let registered = state.matches.find_by_player("guest").map(|m| m.id().to_string());
        assert_eq!(registered.as_deref(), Some(lobby.id.as_str()));
        assert_eq!(state.matchmaking.queue_size(), 0);
        assert_eq!(state.lobbies.get(&lobby.code).unwrap().status, LobbyStatus::InGame);

        let frame = timeout(Duration::from_secs(1), owner_rx.recv()).await.unwrap().unwrap();
        let hello: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(hello["type"], "match_success");
        assert_eq!(hello["players"][0]["side"], "top");

        assert_eq!(launch(&state, "owner").await.unwrap_err(), LobbyError::InGame);
        game.cancel();
    }

    #[tokio::test]
    async fn refuses_when_a_member_is_offline() {
        let state = test_state();
        let lobby = state.lobbies.create(member("owner"), MATCH_SIZE).unwrap();
        state.lobbies.join(&lobby.code, member("guest")).unwrap();
        let _owner = connect(&state, "owner").await;

        assert_eq!(
            launch(&state, "owner").await.unwrap_err(),
            LobbyError::NotConnected("guest".into())
        );
        assert_eq!(state.matches.len(), 0);
        assert_eq!(state.lobbies.get(&lobby.code).unwrap().status, LobbyStatus::Waiting);
    }

    #[tokio::test]
    async fn refuses_incomplete_roster() {
        let state = test_state();
        state.lobbies.create(member("owner"), MATCH_SIZE).unwrap();
        assert_eq!(
            launch(&state, "owner").await.unwrap_err(),
            LobbyError::RosterIncomplete { have: 1, need: 2 }
        );
    }

    #[tokio::test]
    async fn lobby_reopens_when_its_match_ends() {
        let state = test_state();
        let lobby = state.lobbies.create(member("owner"), MATCH_SIZE).unwrap();
        state.lobbies.join(&lobby.code, member("guest")).unwrap();
        let _owner = connect(&state, "owner").await;
        let _guest = connect(&state, "guest").await;

        let first = launch(&state, "owner").await.unwrap();
        assert!(first.forfeit("guest"));

        timeout(Duration::from_secs(2), async {
            while state.lobbies.get(&lobby.code).unwrap().status != LobbyStatus::Waiting {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("lobby back to waiting");
        assert_eq!(state.matches.len(), 0);

        let second = launch(&state, "owner").await.unwrap();
        assert_eq!(second.id(), lobby.id);
        assert_eq!(state.lobbies.get(&lobby.code).unwrap().status, LobbyStatus::InGame);
        second.cancel();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn lobby_start_and_quick_match_never_share_a_player() {
        for round in 0..64 {
            let state = test_state();
            let lobby = state.lobbies.create(member("owner"), MATCH_SIZE).unwrap();
            state.lobbies.join(&lobby.code, member("guest")).unwrap();
            let _owner = connect(&state, "owner").await;
            let (guest, _guest_rx) = connect(&state, "guest").await;
            let (other, _other_rx) = connect(&state, "other").await;
            state.matchmaking.enqueue(guest);

            let gate = Arc::new(Barrier::new(2));
            let lobby_side = {
                let (state, gate) = (state.clone(), Arc::clone(&gate));
                tokio::spawn(async move {
                    gate.wait().await;
                    launch(&state, "owner").await
                })
            };
            let queue_side = {
                let (state, gate) = (state.clone(), Arc::clone(&gate));
                tokio::spawn(async move {
                    gate.wait().await;
                    state.matchmaking.enqueue(other)
                })
            };
            let launched = lobby_side.await.unwrap();
            let paired = queue_side.await.unwrap();

            assert_eq!(state.matches.len(), 1, "round {}", round);
            let game = match (launched, paired) {
                (Ok(game), EnqueueOutcome::Waiting { queue_size }) => {
                    assert_eq!(queue_size, 1, "round {}", round);
                    game
                }
                (Err(LobbyError::AlreadyInMatch(name)), EnqueueOutcome::Started(game)) => {
                    assert_eq!(name, "guest", "round {}", round);
                    assert_eq!(state.matchmaking.queue_size(), 0, "round {}", round);
                    game
                }
                _ => panic!("round {}: guest was placed twice or not at all", round),
            };
            assert!(game.has_player("guest"));
            game.cancel();
        }
    }
}
