use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{geometry::ScaleFactor, outcome::RoundOutcome};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencySample {
    pub injection_ms: u64,
    pub captured_at: DateTime<Utc>,
}

/// What happened in one round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundTelemetry {
    /// 1-based game index within the session.
    pub game: u32,
    pub outcome: RoundOutcome,
    pub ticks: u32,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub scale: ScaleFactor,
    pub rounds: Vec<RoundTelemetry>,
}

impl SessionReport {
    pub fn new(scale: ScaleFactor) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            scale,
            rounds: Vec::new(),
        }
    }

    pub fn count(&self, outcome: RoundOutcome) -> usize {
        self.rounds.iter().filter(|r| r.outcome == outcome).count()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} games: {} won, {} lost, {} undetermined",
            self.rounds.len(),
            self.count(RoundOutcome::Won),
            self.count(RoundOutcome::Lost),
            self.count(RoundOutcome::Undetermined)
        )
    }
}
