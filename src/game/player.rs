//! Authoritative player state inside a match

use serde::{Deserialize, Serialize};

use super::physics::HITBOX_SIZE;

/// Stable player identifier issued by the identity provider
pub type PlayerId = String;

/// Hit points every plane spawns with
pub const MAX_HP: i32 = 100;

/// Which end of the arena a player defends; fixed for the whole match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// Spawns near y = 0 and fires downward
    Top,
    /// Spawns near the bottom edge and fires upward
    Bottom,
}

impl Side {
    /// Spawn anchor for this side
    pub fn spawn_point(self) -> (i32, i32) {
        match self {
            Side::Top => (100, 50),
            Side::Bottom => (100, 500),
        }
    }

    /// Sign of the vertical speed of bullets fired from this side
    pub fn fire_direction(self) -> i32 {
        match self {
            Side::Top => 1,
            Side::Bottom => -1,
        }
    }

    /// Muzzle position relative to the plane anchor
    pub fn muzzle_offset(self) -> (i32, i32) {
        match self {
            Side::Top => (HITBOX_SIZE / 2, HITBOX_SIZE),
            Side::Bottom => (HITBOX_SIZE / 2, 0),
        }
    }
}

/// A player as seen by the match and serialized to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub hp: i32,
    pub side: Side,
}

impl Player {
    /// Place a player at its side's spawn point with full hit points
    pub fn spawn(id: PlayerId, name: String, side: Side) -> Self {
        let (x, y) = side.spawn_point();
        Self {
            id,
            name,
            x,
            y,
            hp: MAX_HP,
            side,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.hp > 0
    }
}
