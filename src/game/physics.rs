//! Arena bounds and hitbox tests

/// Arena width in world units
pub const ARENA_WIDTH: i32 = 600;
/// Arena height in world units
pub const ARENA_HEIGHT: i32 = 600;
/// Side length of a plane's square hitbox, anchored at the plane's position
pub const HITBOX_SIZE: i32 = 50;

/// Clamp a requested plane position so the whole hitbox stays inside the arena
pub fn clamp_to_arena(x: i32, y: i32) -> (i32, i32) {
    (
        x.clamp(0, ARENA_WIDTH - HITBOX_SIZE),
        y.clamp(0, ARENA_HEIGHT - HITBOX_SIZE),
    )
}

/// Axis-aligned box test: is the point inside the hitbox anchored at (box_x, box_y)?
/// Edges count as inside.
pub fn hitbox_contains(box_x: i32, box_y: i32, x: i32, y: i32) -> bool {
    x >= box_x && x <= box_x + HITBOX_SIZE && y >= box_y && y <= box_y + HITBOX_SIZE
}

/// Is a bullet at this height still inside the playable vertical range?
pub fn in_vertical_bounds(y: i32) -> bool {
    (0..=ARENA_HEIGHT).contains(&y)
}
