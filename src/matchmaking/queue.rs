//! Matchmaking queue implementation

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::ws::hub::Client;

/// Player in the matchmaking queue
#[derive(Debug, Clone)]
pub struct QueuedPlayer {
    pub client: Client,
    pub queued_at: Instant,
}

impl QueuedPlayer {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            queued_at: Instant::now(),
        }
    }

    pub fn player_id(&self) -> &str {
        self.client.player_id()
    }

    /// How long this player has been waiting
    pub fn wait_time(&self) -> Duration {
        self.queued_at.elapsed()
    }
}

/// FIFO quick-match queue, drained two at a time
#[derive(Debug, Default)]
pub struct MatchmakingQueue {
    queue: VecDeque<QueuedPlayer>,
}

impl MatchmakingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a player to the tail. An earlier entry for the same player id is
    /// replaced; returns true when that happened.
    pub fn enqueue(&mut self, player: QueuedPlayer) -> bool {
        let before = self.queue.len();
        self.queue.retain(|p| p.player_id() != player.player_id());
        let replaced = self.queue.len() != before;
        self.queue.push_back(player);
        replaced
    }

    /// Remove a player from the queue
    pub fn dequeue(&mut self, player_id: &str) -> Option<QueuedPlayer> {
        let pos = self.queue.iter().position(|p| p.player_id() == player_id)?;
        self.queue.remove(pos)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Take the two oldest entries once at least two players are waiting
    pub fn try_pair(&mut self) -> Option<(QueuedPlayer, QueuedPlayer)> {
        if self.queue.len() < 2 {
            return None;
        }
        let first = self.queue.pop_front()?;
        let second = self.queue.pop_front()?;
        Some((first, second))
    }
}
