//! Quick-match queue and pairing

pub mod queue;
pub mod service;

pub use service::{EnqueueOutcome, MatchmakingService};
