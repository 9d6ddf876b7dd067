use std::fmt;

use serde::{Deserialize, Serialize};

use crate::vision::TemplateRole;

/// Terminal result of one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundOutcome {
    Won,
    Lost,
    /// The tick budget ran out without a confident match.
    Undetermined,
}

impl RoundOutcome {
    pub fn status_text(self) -> &'static str {
        match self {
            RoundOutcome::Won => "Game won!",
            RoundOutcome::Lost => "Game lost!",
            RoundOutcome::Undetermined => "Game outcome undetermined",
        }
    }
}

impl From<TemplateRole> for RoundOutcome {
    fn from(role: TemplateRole) -> Self {
        match role {
            TemplateRole::Won => RoundOutcome::Won,
            TemplateRole::Lost => RoundOutcome::Lost,
        }
    }
}

impl fmt::Display for RoundOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RoundOutcome::Won => "won",
            RoundOutcome::Lost => "lost",
            RoundOutcome::Undetermined => "undetermined",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundState {
    Running,
    Finished(RoundOutcome),
}

/// Per-tick state machine for one round.
///
/// Each tick reports which template (if any) matched. The caller decides
/// the tie-break by checking "won" before "lost" and reporting only the
/// first hit.
#[derive(Debug, Clone)]
pub struct RoundTracker {
    max_ticks: u32,
    confirm_ticks: u32,
    ticks: u32,
    streak: Option<(TemplateRole, u32)>,
    state: RoundState,
}

impl RoundTracker {
    pub fn new(max_ticks: u32, confirm_ticks: u32) -> Self {
        Self {
            max_ticks,
            confirm_ticks: confirm_ticks.max(1),
            ticks: 0,
            streak: None,
            state: if max_ticks == 0 {
                RoundState::Finished(RoundOutcome::Undetermined)
            } else {
                RoundState::Running
            },
        }
    }

    pub fn state(&self) -> RoundState {
        self.state
    }

    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    pub fn is_running(&self) -> bool {
        self.state == RoundState::Running
    }

    pub fn observe(&mut self, hit: Option<TemplateRole>) -> RoundState {
        if !self.is_running() {
            return self.state;
        }
        self.ticks += 1;

        self.streak = match (hit, self.streak) {
            (Some(role), Some((prev, count))) if prev == role => Some((role, count + 1)),
            (Some(role), _) => Some((role, 1)),
            (None, _) => None,
        };

        if let Some((role, count)) = self.streak {
            if count >= self.confirm_ticks {
                self.state = RoundState::Finished(role.into());
                return self.state;
            }
        }
        if self.ticks >= self.max_ticks {
            self.state = RoundState::Finished(RoundOutcome::Undetermined);
        }
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(max: u32, confirm: u32, hits: &[Option<TemplateRole>]) -> (RoundState, u32) {
        let mut tracker = RoundTracker::new(max, confirm);
        for hit in hits {
            if !tracker.is_running() {
                break;
            }
            tracker.observe(*hit);
        }
        (tracker.state(), tracker.ticks())
    }

    #[test]
    fn first_won_tick_finishes_round() {
        let hits = [None, None, Some(TemplateRole::Won), Some(TemplateRole::Lost)];
        assert_eq!(
            run(20, 1, &hits),
            (RoundState::Finished(RoundOutcome::Won), 3)
        );
    }

    #[test]
    fn first_lost_tick_finishes_round() {
        let hits = [None, Some(TemplateRole::Lost), Some(TemplateRole::Won)];
        assert_eq!(
            run(20, 1, &hits),
            (RoundState::Finished(RoundOutcome::Lost), 2)
        );
    }

    #[test]
    fn budget_exhaustion_is_undetermined() {
        let hits = vec![None; 30];
        assert_eq!(
            run(20, 1, &hits),
            (RoundState::Finished(RoundOutcome::Undetermined), 20)
        );
    }

    #[test]
    fn match_on_last_tick_still_counts() {
        let mut hits = vec![None; 19];
        hits.push(Some(TemplateRole::Lost));
        assert_eq!(
            run(20, 1, &hits),
            (RoundState::Finished(RoundOutcome::Lost), 20)
        );
    }

    #[test]
    fn confirmation_ignores_isolated_hits() {
        let hits = [
            Some(TemplateRole::Won),
            None,
            Some(TemplateRole::Lost),
            Some(TemplateRole::Won),
            Some(TemplateRole::Won),
        ];
        assert_eq!(
            run(20, 2, &hits),
            (RoundState::Finished(RoundOutcome::Won), 5)
        );

        let flicker = [Some(TemplateRole::Won), None, Some(TemplateRole::Won), None];
        assert_eq!(
            run(4, 2, &flicker),
            (RoundState::Finished(RoundOutcome::Undetermined), 4)
        );
    }

    #[test]
    fn zero_budget_never_runs() {
        let tracker = RoundTracker::new(0, 1);
        assert_eq!(
            tracker.state(),
            RoundState::Finished(RoundOutcome::Undetermined)
        );
    }
}
