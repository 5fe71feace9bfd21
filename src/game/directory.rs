//! Directory of active matches, used to route player actions

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{GameMatch, MatchPhase, PlayerId};

/// Match id -> running match. The lock guards only the mapping; it is never
/// held while a match ticks or while a match lock is taken.
///
/// A player appears in at most one registered match.
pub struct MatchDirectory {
    matches: Mutex<HashMap<String, Arc<GameMatch>>>,
}

impl MatchDirectory {
    pub fn new() -> Self {
        Self {
            matches: Mutex::new(HashMap::new()),
        }
    }

    /// Register a match unless one of its players is already in another
    /// registered match (or the id is taken); returns the conflicting player.
    pub fn try_insert(&self, game_match: Arc<GameMatch>) -> Result<(), PlayerId> {
        let mut matches = self.matches.lock();

        for existing in matches.values() {
            if let Some(busy) = game_match
                .player_ids()
                .iter()
                .find(|id| existing.has_player(id))
            {
                return Err(busy.clone());
            }
        }
        if matches.contains_key(game_match.id()) {
            return Err(game_match.player_ids()[0].clone());
        }

        matches.insert(game_match.id().to_string(), game_match);
        Ok(())
    }

    pub fn remove(&self, id: &str) -> Option<Arc<GameMatch>> {
        self.matches.lock().remove(id)
    }

    /// Linear scan; fine for the handful of concurrent matches a node hosts
    pub fn find_by_player(&self, player_id: &str) -> Option<Arc<GameMatch>> {
        self.matches
            .lock()
            .values()
            .find(|m| m.has_player(player_id))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.matches.lock().len()
    }

    /// Cancel every match still running (server shutdown)
    pub fn cancel_all(&self) -> usize {
        let matches: Vec<Arc<GameMatch>> = self.matches.lock().values().cloned().collect();
        let mut cancelled = 0;
        for game_match in &matches {
            if game_match.phase() == MatchPhase::Running {
                game_match.cancel();
                cancelled += 1;
            }
        }
        cancelled
    }
}

impl Default for MatchDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::hub::{Client, PlayerIdentity};
    use tokio_test::assert_ok;

    fn game(id: &str, a: &str, b: &str) -> Arc<GameMatch> {
        let client = |pid: &str| {
            Client::new(
                PlayerIdentity {
                    id: pid.to_string(),
                    name: pid.to_string(),
                },
                4,
            )
            .0
        };
        Arc::new(GameMatch::new(id.to_string(), [client(a), client(b)]))
    }

    #[test]
    fn finds_matches_by_player() {
        let directory = MatchDirectory::new();
        assert_ok!(directory.try_insert(game("m1", "a", "b")));
        assert_ok!(directory.try_insert(game("m2", "c", "d")));

        assert_eq!(directory.len(), 2);
        let found = |pid: &str| directory.find_by_player(pid).map(|m| m.id().to_string());
        assert_eq!(found("d").as_deref(), Some("m2"));
        assert_eq!(found("a").as_deref(), Some("m1"));
        assert!(found("z").is_none());

        assert!(directory.remove("m1").is_some());
        assert!(directory.remove("m1").is_none());
        assert!(directory.find_by_player("a").is_none());
    }

    #[test]
    fn a_player_is_registered_in_one_match_at_most() {
        let directory = MatchDirectory::new();
        assert_ok!(directory.try_insert(game("m1", "a", "b")));

        assert_eq!(directory.try_insert(game("m2", "c", "b")), Err("b".to_string()));
        assert_eq!(directory.try_insert(game("m1", "x", "y")), Err("x".to_string()));
        assert_eq!(directory.len(), 1);

        directory.remove("m1");
        assert_ok!(directory.try_insert(game("m2", "c", "b")));
    }

    #[test]
    fn cancel_all_counts_running_matches() {
        let directory = MatchDirectory::new();
        directory.try_insert(game("m1", "a", "b")).unwrap();
        directory.try_insert(game("m2", "c", "d")).unwrap();

        assert_eq!(directory.cancel_all(), 2);
    }
}
