//! In-memory lobby directory

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::game::PlayerId;

/// Number of players a lobby must hold before it can start
pub const MATCH_SIZE: usize = 2;

const CODE_LEN: usize = 6;

/// Lobbies untouched for this long are dropped
pub const LOBBY_TTL_HOURS: i64 = 24;

/// Lobby lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LobbyStatus {
    Waiting,
    InGame,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LobbyMember {
    pub id: PlayerId,
    pub name: String,
}

/// A pre-match room players gather in before the owner starts the game
#[derive(Debug, Clone, Serialize)]
pub struct Lobby {
    pub id: String,
    /// Short code players use to join
    pub code: String,
    pub owner_id: PlayerId,
    pub members: Vec<LobbyMember>,
    pub status: LobbyStatus,
    pub capacity: usize,
    pub created_at: DateTime<Utc>,
    /// Pushed forward on every change to the lobby
    pub expires_at: DateTime<Utc>,
}

/// Lobby errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LobbyError {
    #[error("Lobby not found")]
    NotFound,

    #[error("You do not own a lobby")]
    NoOwnedLobby,

    #[error("Player is already in this lobby")]
    AlreadyMember,

    #[error("Player is not in a lobby")]
    NotMember,

    #[error("Lobby is full")]
    Full,

    #[error("Lobby is already in game")]
    InGame,

    #[error("Lobby capacity must be 2, got {0}")]
    InvalidCapacity(usize),

    #[error("Lobby has {have} of {need} players")]
    RosterIncomplete { have: usize, need: usize },

    #[error("Player {0} is not connected")]
    NotConnected(String),

    #[error("Player {0} is already in a match")]
    AlreadyInMatch(String),
}

/// Lobbies keyed by join code, plus an owner -> code index
pub struct LobbyDirectory {
    lobbies: DashMap<String, Lobby>,
    owners: DashMap<PlayerId, String>,
    ttl: Duration,
}

impl LobbyDirectory {
    pub fn new() -> Self {
        Self::with_ttl(Duration::hours(LOBBY_TTL_HOURS))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            lobbies: DashMap::new(),
            owners: DashMap::new(),
            ttl,
        }
    }

    /// Open a lobby owned by `owner`. Any lobby the owner already had is deleted.
    pub fn create(&self, owner: LobbyMember, capacity: usize) -> Result<Lobby, LobbyError> {
        if capacity != MATCH_SIZE {
            return Err(LobbyError::InvalidCapacity(capacity));
        }
        self.purge_expired();

        if let Some((_, previous)) = self.owners.remove(&owner.id) {
            self.lobbies.remove(&previous);
            info!(lobby_code = %previous, owner_id = %owner.id, "Replaced previous lobby");
        }

        let code = self.fresh_code();
        let now = Utc::now();
        let lobby = Lobby {
            id: Uuid::new_v4().to_string(),
            code: code.clone(),
            owner_id: owner.id.clone(),
            members: vec![owner],
            status: LobbyStatus::Waiting,
            capacity,
            created_at: now,
            expires_at: now + self.ttl,
        };

        self.owners.insert(lobby.owner_id.clone(), code.clone());
        self.lobbies.insert(code, lobby.clone());
        info!(lobby_code = %lobby.code, owner_id = %lobby.owner_id, "Lobby created");

        Ok(lobby)
    }

    /// All lobbies, newest first
    pub fn list(&self) -> Vec<Lobby> {
        self.purge_expired();
        let mut lobbies: Vec<Lobby> = self.lobbies.iter().map(|e| e.value().clone()).collect();
        lobbies.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        lobbies
    }

    pub fn get(&self, code: &str) -> Option<Lobby> {
        self.purge_expired();
        self.lobbies.get(code).map(|e| e.value().clone())
    }

    pub fn join(&self, code: &str, player: LobbyMember) -> Result<Lobby, LobbyError> {
        self.purge_expired();
        let mut lobby = self.lobbies.get_mut(code).ok_or(LobbyError::NotFound)?;

        if lobby.members.iter().any(|m| m.id == player.id) {
            return Err(LobbyError::AlreadyMember);
        }
        if lobby.status == LobbyStatus::InGame {
            return Err(LobbyError::InGame);
        }
        if lobby.members.len() >= lobby.capacity {
            return Err(LobbyError::Full);
        }

        info!(lobby_code = %code, player_id = %player.id, "Player joined lobby");
        lobby.members.push(player);
        lobby.expires_at = Utc::now() + self.ttl;
        Ok(lobby.value().clone())
    }

    /// Remove a player from whichever lobby holds them. Ownership passes to the
    /// next member; an empty lobby is deleted. Returns the lobby code.
    pub fn leave(&self, player_id: &str) -> Result<String, LobbyError> {
        let code = self
            .lobbies
            .iter()
            .find(|e| e.value().members.iter().any(|m| m.id == player_id))
            .map(|e| e.key().clone())
            .ok_or(LobbyError::NotMember)?;

        let (now_empty, new_owner) = {
            let mut lobby = self.lobbies.get_mut(&code).ok_or(LobbyError::NotFound)?;
            lobby.members.retain(|m| m.id != player_id);
            lobby.expires_at = Utc::now() + self.ttl;

            let mut new_owner = None;
            if lobby.owner_id == player_id {
                new_owner = lobby.members.first().map(|m| m.id.clone());
                if let Some(next) = &new_owner {
                    lobby.owner_id = next.clone();
                }
            }
            (lobby.members.is_empty(), new_owner)
        };

        self.owners.remove_if(player_id, |_, owned| owned == &code);
        if let Some(owner) = new_owner {
            self.owners.insert(owner, code.clone());
        }
        if now_empty {
            self.lobbies.remove(&code);
            info!(lobby_code = %code, "Empty lobby removed");
        }

        info!(lobby_code = %code, player_id = %player_id, "Player left lobby");
        Ok(code)
    }

    /// Delete the owner's lobby
    pub fn dismiss(&self, owner_id: &str) -> Result<Lobby, LobbyError> {
        let (_, code) = self
            .owners
            .remove(owner_id)
            .ok_or(LobbyError::NoOwnedLobby)?;
        let (_, lobby) = self.lobbies.remove(&code).ok_or(LobbyError::NotFound)?;
        info!(lobby_code = %code, owner_id = %owner_id, "Lobby dismissed");
        Ok(lobby)
    }

    /// The owner's lobby, provided it is full and not already playing
    pub fn ready_roster(&self, owner_id: &str) -> Result<Lobby, LobbyError> {
        let code = self
            .owners
            .get(owner_id)
            .map(|e| e.value().clone())
            .ok_or(LobbyError::NoOwnedLobby)?;
        let lobby = self.get(&code).ok_or(LobbyError::NotFound)?;

        if lobby.status == LobbyStatus::InGame {
            return Err(LobbyError::InGame);
        }
        if lobby.members.len() != lobby.capacity {
            return Err(LobbyError::RosterIncomplete {
                have: lobby.members.len(),
                need: lobby.capacity,
            });
        }
        Ok(lobby)
    }

    pub fn mark_in_game(&self, code: &str) -> Result<(), LobbyError> {
        self.set_status(code, LobbyStatus::InGame)
    }

    /// Reopen a lobby once its match is over, so it can be joined and started again
    pub fn mark_waiting(&self, code: &str) -> Result<(), LobbyError> {
        self.set_status(code, LobbyStatus::Waiting)
    }

    fn set_status(&self, code: &str, status: LobbyStatus) -> Result<(), LobbyError> {
        let mut lobby = self.lobbies.get_mut(code).ok_or(LobbyError::NotFound)?;
        lobby.status = status;
        lobby.expires_at = Utc::now() + self.ttl;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.purge_expired();
        self.lobbies.len()
    }

    /// Drop lobbies past their expiry, along with their owner index entries
    fn purge_expired(&self) {
        let now = Utc::now();
        let mut expired = Vec::new();
        self.lobbies.retain(|code, lobby| {
            let alive = lobby.expires_at > now;
            if !alive {
                expired.push((code.clone(), lobby.owner_id.clone()));
            }
            alive
        });

        for (code, owner_id) in expired {
            self.owners.remove_if(&owner_id, |_, owned| owned == &code);
            info!(lobby_code = %code, owner_id = %owner_id, "Lobby expired");
        }
    }

    fn fresh_code(&self) -> String {
        loop {
            let code: String = rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(CODE_LEN)
                .map(|c| char::from(c).to_ascii_uppercase())
                .collect();
            if !self.lobbies.contains_key(&code) {
                return code;
            }
        }
    }
}

impl Default for LobbyDirectory {
    fn default() -> Self {
        Self::new()
    }
}
