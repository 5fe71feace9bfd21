//! Game simulation modules

pub mod combat;
pub mod directory;
pub mod r#match;
pub mod physics;
pub mod player;
pub mod snapshot;

pub use combat::Bullet;
pub use directory::MatchDirectory;
pub use player::{Player, PlayerId};
pub use r#match::{GameMatch, MatchPhase};
