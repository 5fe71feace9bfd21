//! Inbound frame rate limiting

use std::num::NonZeroU32;

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};

type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Per-connection inbound frame limiter. Owned by the connection's reader
/// loop, so it is never shared.
pub struct PlayerRateLimiter {
    frames: Limiter,
}

impl PlayerRateLimiter {
    /// Allow `frames_per_second` frames per second, bursting up to the same
    /// amount. Zero is treated as one.
    pub fn new(frames_per_second: u32) -> Self {
        let rate = NonZeroU32::new(frames_per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            frames: RateLimiter::direct(Quota::per_second(rate)),
        }
    }

    /// True if another frame may be processed now
    pub fn check_input(&self) -> bool {
        self.frames.check().is_ok()
    }
}
