//! Match state and authoritative tick loop

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::ws::hub::{Client, DeliveryError};
use crate::ws::protocol::ServerMsg;

use super::combat::{apply_damage, Bullet};
use super::directory::MatchDirectory;
use super::physics::{clamp_to_arena, in_vertical_bounds};
use super::player::{Player, PlayerId, Side};
use super::snapshot;

/// Match phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    /// Ticking and accepting player actions
    Running,
    /// Terminal; no more ticks or mutations
    Ended,
}

/// Result of advancing the simulation by one tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Running,
    /// At most one player is left standing; `winner` is None on a draw
    Ended { winner: Option<Player> },
}

/// Authoritative state of one match. Only ever touched under the match lock.
#[derive(Debug, Clone)]
pub struct MatchState {
    pub phase: MatchPhase,
    pub tick: u64,
    pub players: [Player; 2],
    pub bullets: Vec<Bullet>,
}

impl MatchState {
    /// First player takes the top side, second the bottom
    pub fn new(first: Player, second: Player) -> Self {
        Self {
            phase: MatchPhase::Running,
            tick: 0,
            players: [first, second],
            bullets: Vec::new(),
        }
    }

    pub fn player(&self, id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    fn live_player_mut(&mut self, id: &str) -> Option<&mut Player> {
        if self.phase == MatchPhase::Ended {
            return None;
        }
        self.players
            .iter_mut()
            .find(|p| p.id == id && p.is_alive())
    }

    /// Reposition a player, clamped to the arena. Returns false if ignored.
    pub fn move_player(&mut self, id: &str, x: i32, y: i32) -> bool {
        match self.live_player_mut(id) {
            Some(player) => {
                (player.x, player.y) = clamp_to_arena(x, y);
                true
            }
            None => false,
        }
    }

    /// Fire a bullet from the player's muzzle. Returns false if ignored.
    pub fn shoot(&mut self, id: &str) -> bool {
        let bullet = match self.live_player_mut(id) {
            Some(player) => Bullet::fire(player),
            None => return false,
        };
        self.bullets.push(bullet);
        true
    }

    /// Knock a player out; the next tick ends the match in the opponent's favour
    pub fn forfeit(&mut self, id: &str) -> bool {
        match self.live_player_mut(id) {
            Some(player) => {
                player.hp = 0;
                true
            }
            None => false,
        }
    }

    /// Advance bullets, resolve hits, drop spent bullets and check the win condition
    pub fn step(&mut self) -> TickOutcome {
        if self.phase == MatchPhase::Ended {
            return TickOutcome::Ended {
                winner: self.survivor(),
            };
        }

        self.tick += 1;

        let players = &mut self.players;
        self.bullets.retain_mut(|bullet| {
            bullet.advance();

            // First hit consumes the bullet
            if let Some(target) = players.iter_mut().find(|p| bullet.hits(p)) {
                let (hp, _) = apply_damage(target.hp, bullet.damage);
                target.hp = hp;
                return false;
            }

            in_vertical_bounds(bullet.y)
        });

        let alive = self.players.iter().filter(|p| p.is_alive()).count();
        if alive <= 1 {
            self.phase = MatchPhase::Ended;
            return TickOutcome::Ended {
                winner: self.survivor(),
            };
        }

        TickOutcome::Running
    }

    fn survivor(&self) -> Option<Player> {
        let mut alive = self.players.iter().filter(|p| p.is_alive());
        match (alive.next(), alive.next()) {
            (Some(winner), None) => Some(winner.clone()),
            _ => None,
        }
    }
}

impl fmt::Debug for GameMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameMatch")
            .field("id", &self.id)
            .field("player_ids", &self.player_ids)
            .finish_non_exhaustive()
    }
}

/// One running two-player match.
///
/// The state lock is shared by the tick loop and by inbound player actions,
/// so every mutation of a match is totally ordered.
pub struct GameMatch {
    id: String,
    player_ids: [PlayerId; 2],
    clients: [Client; 2],
    state: Mutex<MatchState>,
    quit: watch::Sender<bool>,
}

impl GameMatch {
    /// Build a match from two connections; the first becomes `top`, the second `bottom`
    pub fn new(id: String, clients: [Client; 2]) -> Self {
        let [first, second] = &clients;
        let top = Player::spawn(
            first.identity().id.clone(),
            first.identity().name.clone(),
            Side::Top,
        );
        let bottom = Player::spawn(
            second.identity().id.clone(),
            second.identity().name.clone(),
            Side::Bottom,
        );
        let player_ids = [top.id.clone(), bottom.id.clone()];
        let (quit, _) = watch::channel(false);

        Self {
            id,
            player_ids,
            clients,
            state: Mutex::new(MatchState::new(top, bottom)),
            quit,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn player_ids(&self) -> &[PlayerId; 2] {
        &self.player_ids
    }

    pub fn has_player(&self, player_id: &str) -> bool {
        self.player_ids.iter().any(|id| id == player_id)
    }

    /// The connection a player is playing this match on
    pub fn client_for(&self, player_id: &str) -> Option<&Client> {
        self.clients.iter().find(|c| c.player_id() == player_id)
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> MatchState {
        self.state.lock().clone()
    }

    pub fn phase(&self) -> MatchPhase {
        self.state.lock().phase
    }

    pub fn move_player(&self, player_id: &str, x: i32, y: i32) -> bool {
        self.state.lock().move_player(player_id, x, y)
    }

    pub fn shoot(&self, player_id: &str) -> bool {
        self.state.lock().shoot(player_id)
    }

    pub fn forfeit(&self, player_id: &str) -> bool {
        let forfeited = self.state.lock().forfeit(player_id);
        if forfeited {
            info!(match_id = %self.id, player_id = %player_id, "Player forfeited");
        }
        forfeited
    }

    /// Stop the tick loop without declaring a winner
    pub fn cancel(&self) {
        self.quit.send_replace(true);
    }

    /// Register in the directory, announce the match and spawn its tick loop.
    /// The match removes itself from the directory when the loop exits.
    ///
    /// Fails without announcing anything when one of the players is already
    /// in a registered match; the offending player id is returned.
    pub fn start(
        self: Arc<Self>,
        directory: Arc<MatchDirectory>,
        tick_interval: Duration,
    ) -> Result<JoinHandle<()>, PlayerId> {
        directory.try_insert(Arc::clone(&self))?;

        {
            let state = self.state.lock();
            self.deliver(&snapshot::match_success(&self.id, &state));
        }

        info!(
            match_id = %self.id,
            top = %self.player_ids[0],
            bottom = %self.player_ids[1],
            "Match started"
        );

        Ok(tokio::spawn(async move {
            self.run(tick_interval).await;
            directory.remove(&self.id);
            debug!(match_id = %self.id, "Match removed from directory");
        }))
    }

    /// Run the authoritative tick loop until the match ends or is cancelled
    async fn run(&self, tick_interval: Duration) {
        let mut ticker = interval(tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick of an interval completes immediately
        ticker.tick().await;

        let mut quit = self.quit.subscribe();
        if *quit.borrow_and_update() {
            self.stop_cancelled();
            return;
        }

        loop {
            tokio::select! {
                biased;
                changed = quit.changed() => {
                    if changed.is_err() || *quit.borrow() {
                        self.stop_cancelled();
                        return;
                    }
                }
                _ = ticker.tick() => {
                    if self.tick() == MatchPhase::Ended {
                        return;
                    }
                }
            }
        }
    }

    fn stop_cancelled(&self) {
        self.state.lock().phase = MatchPhase::Ended;
        info!(match_id = %self.id, "Match cancelled");
    }

    /// One tick, executed entirely under the match lock
    fn tick(&self) -> MatchPhase {
        let mut state = self.state.lock();
        match state.step() {
            TickOutcome::Running => {
                self.deliver(&snapshot::game_state(&state));
                MatchPhase::Running
            }
            TickOutcome::Ended { winner } => {
                info!(
                    match_id = %self.id,
                    tick = state.tick,
                    winner = winner.as_ref().map(|p| p.id.as_str()).unwrap_or("none"),
                    "Match ended"
                );
                self.deliver(&ServerMsg::GameOver { winner });
                MatchPhase::Ended
            }
        }
    }

    /// Non-blocking send to both players. A failing connection never stalls the match.
    fn deliver(&self, msg: &ServerMsg) {
        let frame = match msg.encode() {
            Ok(frame) => frame,
            Err(e) => {
                error!(match_id = %self.id, error = %e, "Failed to encode match message");
                return;
            }
        };

        for client in &self.clients {
            match client.try_deliver(frame.clone()) {
                Ok(()) => {}
                Err(DeliveryError::Full) => {
                    warn!(
                        match_id = %self.id,
                        player_id = %client.player_id(),
                        "Outbound queue full, disconnecting player"
                    );
                    client.close();
                }
                Err(DeliveryError::Closed) => {
                    debug!(
                        match_id = %self.id,
                        player_id = %client.player_id(),
                        "Skipping closed connection"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::combat::BULLET_DAMAGE;
    use crate::game::player::MAX_HP;
    use crate::ws::hub::{ClientReceiver, PlayerIdentity};
    use serde_json::Value;
    use tokio::time::timeout;

    fn state() -> MatchState {
        MatchState::new(
            Player::spawn("p1".into(), "One".into(), Side::Top),
            Player::spawn("p2".into(), "Two".into(), Side::Bottom),
        )
    }

    fn bullet(owner: &str, x: i32, y: i32, speed: i32) -> Bullet {
        Bullet {
            id: format!("{}-{}-{}", owner, x, y),
            x,
            y,
            owner: owner.to_string(),
            speed,
            damage: BULLET_DAMAGE,
        }
    }

    fn client(id: &str, buffer: usize) -> (Client, ClientReceiver) {
        Client::new(
            PlayerIdentity {
                id: id.to_string(),
                name: id.to_uppercase(),
            },
            buffer,
        )
    }

    async fn next_json(rx: &mut ClientReceiver) -> Value {
        let frame = timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for frame")
            .expect("connection closed");
        serde_json::from_str(&frame).unwrap()
    }

    #[test]
    fn spawns_on_fixed_sides() {
        let state = state();
        let [top, bottom] = &state.players;
        assert_eq!((top.x, top.y, top.hp, top.side), (100, 50, MAX_HP, Side::Top));
        assert_eq!(
            (bottom.x, bottom.y, bottom.hp, bottom.side),
            (100, 500, MAX_HP, Side::Bottom)
        );
    }

    #[test]
    fn overlapping_bullet_damages_once_and_is_consumed() {
        let mut state = state();
        // Lands at (120, 510) after advancing, inside p2's box
        state.bullets.push(bullet("p1", 120, 500, 10));

        assert_eq!(state.step(), TickOutcome::Running);
        assert_eq!(state.players[1].hp, MAX_HP - BULLET_DAMAGE);
        assert!(state.bullets.is_empty());

        assert_eq!(state.step(), TickOutcome::Running);
        assert_eq!(state.players[1].hp, MAX_HP - BULLET_DAMAGE);
    }

    #[test]
    fn one_bullet_hits_at_most_one_player() {
        let mut state = state();
        // Stack both players on the same spot
        state.players[0].y = 500;
        state.bullets.push(bullet("nobody", 120, 500, 10));

        state.step();
        let total: i32 = state.players.iter().map(|p| MAX_HP - p.hp).sum();
        assert_eq!(total, BULLET_DAMAGE);
    }

    #[test]
    fn bullets_leaving_the_arena_are_dropped() {
        let mut state = state();
        state.bullets.push(bullet("p2", 400, 5, -10));
        state.bullets.push(bullet("p1", 400, 595, 10));
        state.bullets.push(bullet("p1", 400, 300, 10));

        state.step();
        assert_eq!(state.bullets.len(), 1);
        assert_eq!(state.bullets[0].y, 310);
        assert!(state.players.iter().all(|p| p.hp == MAX_HP));
    }

    #[test]
    fn shooting_and_moving_follow_side_rules() {
        let mut state = state();
        assert!(state.shoot("p1"));
        assert!(state.shoot("p2"));
        assert!(!state.shoot("ghost"));
        assert_eq!(state.bullets[0].speed, 10);
        assert_eq!(state.bullets[1].speed, -10);

        assert!(state.move_player("p1", 250, -30));
        assert_eq!((state.players[0].x, state.players[0].y), (250, 0));
        assert!(!state.move_player("ghost", 1, 1));
    }

    #[test]
    fn last_survivor_wins() {
        let mut state = state();
        state.players[1].hp = BULLET_DAMAGE;
        state.bullets.push(bullet("p1", 120, 500, 10));

        let outcome = state.step();
        let winner = match outcome {
            TickOutcome::Ended { winner } => winner.expect("expected a winner"),
            other => panic!("expected end of match, got {:?}", other),
        };
        assert_eq!(winner.id, "p1");
        assert_eq!(state.phase, MatchPhase::Ended);

        // Ended matches ignore actions
        assert!(!state.move_player("p1", 10, 10));
        assert!(!state.shoot("p1"));
    }

    #[test]
    fn simultaneous_knockout_is_a_draw() {
        let mut state = state();
        state.players[0].hp = BULLET_DAMAGE;
        state.players[1].hp = BULLET_DAMAGE;
        state.bullets.push(bullet("p1", 120, 500, 10));
        state.bullets.push(bullet("p2", 120, 70, -10));

        assert_eq!(state.step(), TickOutcome::Ended { winner: None });
    }

    #[test]
    fn forfeit_hands_the_win_to_the_opponent() {
        let mut state = state();
        assert!(state.forfeit("p2"));
        match state.step() {
            TickOutcome::Ended { winner: Some(w) } => assert_eq!(w.id, "p1"),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn match_broadcasts_until_game_over() {
        let directory = Arc::new(MatchDirectory::new());
        let (c1, mut rx1) = client("p1", 64);
        let (c2, mut rx2) = client("p2", 64);
        let game = Arc::new(GameMatch::new("m1".into(), [c1, c2]));

        let handle = Arc::clone(&game)
            .start(Arc::clone(&directory), Duration::from_millis(5))
            .unwrap();
        let registered = directory.find_by_player("p1").map(|m| m.id().to_string());
        assert_eq!(registered.as_deref(), Some("m1"));

        let hello = next_json(&mut rx1).await;
        assert_eq!(hello["type"], "match_success");
        assert_eq!(hello["room_id"], "m1");
        assert_eq!(next_json(&mut rx2).await["type"], "match_success");
        assert_eq!(next_json(&mut rx1).await["type"], "game_state");

        assert!(game.forfeit("p1"));
        timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();

        let mut last = next_json(&mut rx2).await;
        while last["type"] == "game_state" {
            last = next_json(&mut rx2).await;
        }
        assert_eq!(last["type"], "game_over");
        assert_eq!(last["winner"]["id"], "p2");
        assert!(timeout(Duration::from_millis(50), rx2.recv()).await.is_err());
        assert_eq!(directory.len(), 0);
        assert_eq!(game.phase(), MatchPhase::Ended);
    }

    #[tokio::test]
    async fn cancel_stops_the_loop_without_game_over() {
        let directory = Arc::new(MatchDirectory::new());
        let (c1, mut rx1) = client("p1", 256);
        let (c2, _rx2) = client("p2", 256);
        let game = Arc::new(GameMatch::new("m2".into(), [c1, c2]));

        let handle = Arc::clone(&game)
            .start(Arc::clone(&directory), Duration::from_millis(5))
            .unwrap();
        game.cancel();
        timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();

        assert_eq!(directory.len(), 0);
        assert_eq!(game.phase(), MatchPhase::Ended);
        while let Ok(Some(frame)) = timeout(Duration::from_millis(20), rx1.recv()).await {
            assert!(!frame.contains("game_over"));
        }
    }

    #[tokio::test]
    async fn saturated_player_is_dropped_and_match_continues() {
        let directory = Arc::new(MatchDirectory::new());
        let (c1, _rx1) = client("p1", 1);
        let (c2, mut rx2) = client("p2", 64);
        let slow = c1.clone();
        let game = Arc::new(GameMatch::new("m3".into(), [c1, c2]));

        let handle = Arc::clone(&game)
            .start(Arc::clone(&directory), Duration::from_millis(5))
            .unwrap();

        for _ in 0..3 {
            assert_ne!(next_json(&mut rx2).await["type"], "game_over");
        }
        assert!(slow.is_closed());
        assert_eq!(game.phase(), MatchPhase::Running);

        game.cancel();
        timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn moves_and_ticks_never_interleave() {
        let directory = Arc::new(MatchDirectory::new());
        let (c1, _rx1) = client("p1", 4096);
        let (c2, _rx2) = client("p2", 4096);
        let game = Arc::new(GameMatch::new("m4".into(), [c1, c2]));
        assert!(game.move_player("p1", 0, 0));
        let handle = Arc::clone(&game)
            .start(Arc::clone(&directory), Duration::from_millis(1))
            .unwrap();

        let mover = {
            let game = Arc::clone(&game);
            tokio::task::spawn_blocking(move || {
                for i in 0..500 {
                    // x and y always change together
                    let v = i % 500;
                    game.move_player("p1", v, v);
                }
            })
        };

        for _ in 0..200 {
            let snap = game.snapshot();
            assert_eq!(snap.players[0].x, snap.players[0].y);
            tokio::task::yield_now().await;
        }

        mover.await.unwrap();
        let snap = game.snapshot();
        assert_eq!(snap.players[0].x, snap.players[0].y);

        game.cancel();
        timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
    }
}
