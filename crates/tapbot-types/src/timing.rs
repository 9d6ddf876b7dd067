use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Pacing of the automation loop. These values govern apparent game speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    /// Pause after every "move" tap before the screen is inspected.
    pub tap_interval_ms: u64,
    /// Pause after tapping "play" so the game UI can settle.
    pub game_start_delay_ms: u64,
    /// Pause after tapping "play again".
    pub play_again_delay_ms: u64,
    /// Tick budget per round.
    pub max_ticks: u32,
    /// Consecutive matching ticks required before a round ends.
    pub confirm_ticks: u32,
}

impl Timings {
    pub fn tap_interval(&self) -> Duration {
        Duration::from_millis(self.tap_interval_ms)
    }

    pub fn game_start_delay(&self) -> Duration {
        Duration::from_millis(self.game_start_delay_ms)
    }

    pub fn play_again_delay(&self) -> Duration {
        Duration::from_millis(self.play_again_delay_ms)
    }

    /// No waiting at all; used by tests and dry runs.
    pub fn instant() -> Self {
        Self {
            tap_interval_ms: 0,
            game_start_delay_ms: 0,
            play_again_delay_ms: 0,
            ..Self::default()
        }
    }
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            tap_interval_ms: 200,
            game_start_delay_ms: 3_000,
            play_again_delay_ms: 1_000,
            max_ticks: 20,
            confirm_ticks: 1,
        }
    }
}
