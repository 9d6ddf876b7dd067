//! One round: tap "move" at a fixed cadence until an outcome screen shows up.

use std::time::Instant;

use tapbot_controller::{DeviceController, ScaledTapper};
use tapbot_types::{
    outcome::{RoundOutcome, RoundState, RoundTracker},
    setup::SessionConfig,
    telemetry::RoundTelemetry,
    timing::Timings,
    vision::TemplateRole,
    Result,
};
use tapbot_vision::TemplateDetector;
use tokio::time::sleep;
use tracing::debug;

pub struct RoundController<'a, C, D> {
    tapper: &'a ScaledTapper<C>,
    detector: &'a D,
    timings: Timings,
    threshold: f32,
}

impl<'a, C, D> RoundController<'a, C, D>
where
    C: DeviceController,
    D: TemplateDetector,
{
    pub fn new(
        tapper: &'a ScaledTapper<C>,
        detector: &'a D,
        timings: Timings,
        threshold: f32,
    ) -> Self {
        Self {
            tapper,
            detector,
            timings,
            threshold,
        }
    }

    /// Plays until a template matches or the tick budget is spent. Only a
    /// failed tap ends the round with an error.
    pub async fn play(&self, game: u32, config: &SessionConfig) -> Result<RoundTelemetry> {
        let start = Instant::now();
        let mut tracker = RoundTracker::new(self.timings.max_ticks, self.timings.confirm_ticks);

        while tracker.is_running() {
            self.tapper.tap(config.move_coords).await?;
            sleep(self.timings.tap_interval()).await;

            let hit = self.poll(config).await;
            let state = tracker.observe(hit);
            debug!(
                "game {} tick {}: hit={:?} state={:?}",
                game,
                tracker.ticks(),
                hit,
                state
            );
        }

        let outcome = match tracker.state() {
            RoundState::Finished(outcome) => outcome,
            RoundState::Running => RoundOutcome::Undetermined,
        };
        Ok(RoundTelemetry {
            game,
            outcome,
            ticks: tracker.ticks(),
            elapsed_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// "won" is checked first; "lost" is only consulted when it missed.
    async fn poll(&self, config: &SessionConfig) -> Option<TemplateRole> {
        if self.detector.detect(&config.won, self.threshold).await {
            Some(TemplateRole::Won)
        } else if self.detector.detect(&config.lost, self.threshold).await {
            Some(TemplateRole::Lost)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tapbot_controller::MockController;
    use tapbot_types::{
        geometry::{DeviceCoordinate, ScaleFactor, ScreenSize},
        vision::DEFAULT_MATCH_THRESHOLD,
        TapbotError,
    };

    use super::*;
    use crate::testing::{session_config, ScriptedDetector, MOVE};

    fn fixture(
        script: Vec<(bool, bool)>,
    ) -> (Arc<MockController>, ScaledTapper<MockController>, ScriptedDetector) {
        let controller = Arc::new(MockController::new(ScreenSize::new(1080, 1920)));
        let tapper = ScaledTapper::new(controller.clone(), ScaleFactor::IDENTITY);
        (controller, tapper, ScriptedDetector::new(script))
    }

    async fn play(
        tapper: &ScaledTapper<MockController>,
        detector: &ScriptedDetector,
        max_ticks: u32,
    ) -> Result<RoundTelemetry> {
        let timings = Timings {
            max_ticks,
            ..Timings::instant()
        };
        RoundController::new(tapper, detector, timings, DEFAULT_MATCH_THRESHOLD)
            .play(1, &session_config())
            .await
    }

    #[tokio::test]
    async fn stops_on_first_won_tick() {
        let (controller, tapper, detector) =
            fixture(vec![(false, false), (false, false), (true, false), (false, true)]);
        let round = play(&tapper, &detector, 20).await.expect("round");
        assert_eq!(round.outcome, RoundOutcome::Won);
        assert_eq!(round.ticks, 3);
        assert_eq!(
            controller.taps(),
            vec![DeviceCoordinate::new(MOVE.x, MOVE.y); 3]
        );
    }

    #[tokio::test]
    async fn stops_on_first_lost_tick() {
        let (_, tapper, detector) = fixture(vec![(false, false), (false, true), (true, false)]);
        let round = play(&tapper, &detector, 20).await.expect("round");
        assert_eq!(round.outcome, RoundOutcome::Lost);
        assert_eq!(round.ticks, 2);
    }

    #[tokio::test]
    async fn won_beats_lost_in_the_same_tick() {
        let (_, tapper, detector) = fixture(vec![(false, false), (true, true)]);
        let round = play(&tapper, &detector, 20).await.expect("round");
        assert_eq!(round.outcome, RoundOutcome::Won);
        assert_eq!(
            detector.queries(),
            vec![TemplateRole::Won, TemplateRole::Lost, TemplateRole::Won]
        );
    }

    #[tokio::test]
    async fn exhausted_budget_is_undetermined() {
        let (controller, tapper, detector) = fixture(Vec::new());
        let round = play(&tapper, &detector, 20).await.expect("round");
        assert_eq!(round.outcome, RoundOutcome::Undetermined);
        assert_eq!(round.ticks, 20);
        assert_eq!(controller.taps().len(), 20);
        assert_eq!(detector.queries().len(), 40);
    }

    #[tokio::test]
    async fn never_exceeds_the_budget() {
        for max_ticks in 1..6 {
            let (controller, tapper, detector) = fixture(vec![(false, false); 10]);
            let round = play(&tapper, &detector, max_ticks).await.expect("round");
            assert_eq!(round.ticks, max_ticks);
            assert_eq!(controller.taps().len(), max_ticks as usize);
        }
    }

    #[tokio::test]
    async fn confirmation_requires_consecutive_matches() {
        let (_, tapper, detector) = fixture(vec![
            (true, false),
            (false, false),
            (false, true),
            (false, true),
        ]);
        let timings = Timings {
            confirm_ticks: 2,
            ..Timings::instant()
        };
        let round = RoundController::new(&tapper, &detector, timings, DEFAULT_MATCH_THRESHOLD)
            .play(1, &session_config())
            .await
            .expect("round");
        assert_eq!(round.outcome, RoundOutcome::Lost);
        assert_eq!(round.ticks, 4);
    }

    #[tokio::test]
    async fn failed_tap_aborts_the_round() {
        let controller =
            Arc::new(MockController::new(ScreenSize::new(1080, 1920)).failing_taps_after(2));
        let tapper = ScaledTapper::new(controller.clone(), ScaleFactor::IDENTITY);
        let detector = ScriptedDetector::new(Vec::new());
        let err = play(&tapper, &detector, 20).await.expect_err("tap failure");
        assert!(matches!(err, TapbotError::Controller(_)));
        assert_eq!(detector.queries().len(), 4);
    }
}
