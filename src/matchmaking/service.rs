//! Matchmaking service - quick-match queue and match construction
//!
//! Every match is registered while the queue lock is held, and a player is
//! only queued after the same lock has confirmed they are not playing. Queue
//! membership and match membership therefore never overlap.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::game::{GameMatch, MatchDirectory, PlayerId};
use crate::ws::hub::Client;

use super::queue::{MatchmakingQueue, QueuedPlayer};

/// Result of a quick-match request
pub enum EnqueueOutcome {
    /// Still waiting for an opponent
    Waiting { queue_size: usize },
    /// Paired with the oldest waiting player; the match is registered and running
    Started(Arc<GameMatch>),
    /// The player is already playing; nothing was queued
    AlreadyInMatch { match_id: String },
}

/// Matchmaking service
pub struct MatchmakingService {
    queue: Mutex<MatchmakingQueue>,
    matches: Arc<MatchDirectory>,
    tick_interval: Duration,
}

impl MatchmakingService {
    pub fn new(matches: Arc<MatchDirectory>, tick_interval: Duration) -> Self {
        Self {
            queue: Mutex::new(MatchmakingQueue::new()),
            matches,
            tick_interval,
        }
    }

    /// Queue a connection for quick-match; pairs the two oldest entries as soon
    /// as two are waiting and starts their match. The first of the pair plays `top`.
    pub fn enqueue(&self, client: Client) -> EnqueueOutcome {
        let player_id = client.player_id().to_string();
        let mut queue = self.queue.lock();

        if let Some(current) = self.matches.find_by_player(&player_id) {
            return EnqueueOutcome::AlreadyInMatch {
                match_id: current.id().to_string(),
            };
        }

        if queue.enqueue(QueuedPlayer::new(client)) {
            info!(player_id = %player_id, "Replaced earlier queue entry");
        }

        let Some((first, second)) = queue.try_pair() else {
            let queue_size = queue.len();
            info!(player_id = %player_id, queue_size, "Player joined matchmaking queue");
            return EnqueueOutcome::Waiting { queue_size };
        };

        let match_id = Uuid::new_v4().to_string();
        info!(
            match_id = %match_id,
            top = %first.player_id(),
            bottom = %second.player_id(),
            waited_ms = first.wait_time().as_millis() as u64,
            "Paired players"
        );

        let game_match = Arc::new(GameMatch::new(match_id, [first.client, second.client]));
        match Arc::clone(&game_match).start(Arc::clone(&self.matches), self.tick_interval) {
            Ok(_) => EnqueueOutcome::Started(game_match),
            Err(busy) => {
                // Only reachable if a match was registered without this lock
                warn!(player_id = %busy, "Paired player is already in a match");
                for pid in game_match.player_ids() {
                    if pid != &busy {
                        if let Some(client) = game_match.client_for(pid) {
                            queue.enqueue(QueuedPlayer::new(client.clone()));
                        }
                    }
                }
                EnqueueOutcome::Waiting {
                    queue_size: queue.len(),
                }
            }
        }
    }

    /// Start a match formed outside the queue (a lobby). Its players are taken
    /// out of the queue under the same lock that registers the match.
    pub fn start_match(&self, game_match: Arc<GameMatch>) -> Result<JoinHandle<()>, PlayerId> {
        let mut queue = self.queue.lock();
        let handle =
            Arc::clone(&game_match).start(Arc::clone(&self.matches), self.tick_interval)?;

        for pid in game_match.player_ids() {
            if queue.dequeue(pid).is_some() {
                info!(
                    player_id = %pid,
                    match_id = %game_match.id(),
                    "Left queue for lobby match"
                );
            }
        }
        Ok(handle)
    }

    /// Leave the queue; returns false if the player was not waiting
    pub fn leave(&self, player_id: &str) -> bool {
        let removed = self.queue.lock().dequeue(player_id).is_some();
        if removed {
            info!(player_id = %player_id, "Player left matchmaking queue");
        }
        removed
    }

    pub fn queue_size(&self) -> usize {
        self.queue.lock().len()
    }
}
