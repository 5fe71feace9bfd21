//! Combat system - bullets, damage, hit detection

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::physics::hitbox_contains;
use super::player::{Player, PlayerId};

/// Vertical distance a bullet travels per tick
pub const BULLET_SPEED: i32 = 10;
/// Hit points removed by one bullet
pub const BULLET_DAMAGE: i32 = 10;

/// Live projectile owned by a match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bullet {
    pub id: String,
    pub x: i32,
    pub y: i32,
    /// Id of the player who fired it; never collides with its owner
    pub owner: PlayerId,
    /// Signed vertical speed, positive travels down the arena
    pub speed: i32,
    pub damage: i32,
}

impl Bullet {
    /// Spawn a bullet at the shooter's muzzle, travelling away from its side
    pub fn fire(shooter: &Player) -> Self {
        let (dx, dy) = shooter.side.muzzle_offset();
        Self {
            id: Uuid::new_v4().to_string(),
            x: shooter.x + dx,
            y: shooter.y + dy,
            owner: shooter.id.clone(),
            speed: BULLET_SPEED * shooter.side.fire_direction(),
            damage: BULLET_DAMAGE,
        }
    }

    /// Move one tick along the bullet's direction
    pub fn advance(&mut self) {
        self.y += self.speed;
    }

    /// Does this bullet hit `target` at its current position?
    pub fn hits(&self, target: &Player) -> bool {
        target.id != self.owner && hitbox_contains(target.x, target.y, self.x, self.y)
    }
}

/// Apply damage to hit points, returns (new_hp, is_dead)
pub fn apply_damage(hp: i32, damage: i32) -> (i32, bool) {
    let new_hp = (hp - damage).max(0);
    (new_hp, new_hp <= 0)
}
