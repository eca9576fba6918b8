//! Match and respawn countdowns

use serde::Serialize;

/// Two independent countdowns in seconds, floored at zero
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MatchTimers {
    game: u32,
    respawn: u32,
}

impl MatchTimers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm_game(&mut self, seconds: u32) {
        self.game = seconds;
    }

    pub fn arm_respawn(&mut self, seconds: u32) {
        self.respawn = seconds;
    }

    /// One second elapsed
    pub fn tick(&mut self) {
        self.game = self.game.saturating_sub(1);
        self.respawn = self.respawn.saturating_sub(1);
    }

    pub fn game(&self) -> u32 {
        self.game
    }

    pub fn respawn(&self) -> u32 {
        self.respawn
    }
}

/// Split seconds into display minutes and seconds
pub fn minutes_seconds(total: u32) -> (u8, u8) {
    let minutes = (total / 60).min(u8::MAX as u32) as u8;
    let seconds = (total % 60) as u8;
    (minutes, seconds)
}
