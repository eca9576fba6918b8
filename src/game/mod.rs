//! Game module - The local view of the match
//!
//! Provides:
//! - Player and roster bookkeeping
//! - The match engine deriving state and reacting to device and server events
//! - The service task that owns the engine and carries out its effects

mod engine;
mod events;
mod player;
mod service;
mod timers;

pub use engine::*;
pub use events::*;
#[cfg(test)]
pub use player::Player;
pub use service::*;
