//! Session orchestration: start each game, drive the round, restart.

use std::sync::Arc;

use chrono::Utc;
use tapbot_controller::{DeviceController, LogNotifier, Notifier, ScaledTapper};
use tapbot_events::EventSink;
use tapbot_ops::TelemetryStore;
use tapbot_types::{
    config::TapbotConfig,
    events::{LifecyclePhase, StatusLevel, SystemEvent},
    geometry::ScreenSize,
    setup::{SessionConfig, SessionSetup},
    telemetry::{RoundTelemetry, SessionReport},
    timing::Timings,
    Result, TapbotError,
};
use tapbot_vision::TemplateDetector;
use tokio::time::sleep;
use tracing::{error, info};

mod round;
mod scale;
mod setup;
#[cfg(test)]
mod testing;

pub use round::RoundController;
pub use scale::compute_scale;
pub use setup::hydrate_setup;

pub struct Orchestrator<C, D, S>
where
    C: DeviceController,
    D: TemplateDetector,
    S: EventSink,
{
    controller: Arc<C>,
    detector: D,
    sink: S,
    notifier: Arc<dyn Notifier>,
    telemetry: TelemetryStore,
    timings: Timings,
    threshold: f32,
    fixed_resolution: Option<ScreenSize>,
}

impl<C, D, S> Orchestrator<C, D, S>
where
    C: DeviceController,
    D: TemplateDetector,
    S: EventSink,
{
    pub fn new(
        config: &TapbotConfig,
        controller: Arc<C>,
        detector: D,
        sink: S,
        telemetry: TelemetryStore,
    ) -> Self {
        Self {
            controller,
            detector,
            sink,
            notifier: Arc::new(LogNotifier),
            telemetry,
            timings: config.timing,
            threshold: config.vision.confidence_threshold,
            fixed_resolution: config.device.fixed_resolution,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn telemetry(&self) -> &TelemetryStore {
        &self.telemetry
    }

    /// Plays `game_count` games back to back. Refuses to start, without
    /// touching the device, unless `setup` is complete.
    pub async fn run(&mut self, setup: &SessionSetup, game_count: u32) -> Result<SessionReport> {
        let config = match setup.build() {
            Ok(config) => config,
            Err(err) => {
                error!("Refusing to start automation: {}", err);
                self.publish(SystemEvent::lifecycle(
                    LifecyclePhase::Refused,
                    Some(err.to_string()),
                ))
                .await?;
                self.publish(SystemEvent::status(
                    StatusLevel::Error,
                    format!("Please complete setup before starting ({err})"),
                ))
                .await?;
                self.notifier.notify("Setup incomplete!").await;
                return Err(err);
            }
        };

        if game_count == 0 {
            return Err(orchestrator_error("game count must be at least 1"));
        }

        let scale = compute_scale(self.controller.as_ref(), self.fixed_resolution).await;
        self.publish(SystemEvent::scale_selected(scale)).await?;
        let tapper = ScaledTapper::new(self.controller.clone(), scale);

        self.publish(SystemEvent::lifecycle(
            LifecyclePhase::SessionStart,
            Some(format!("{game_count} games")),
        ))
        .await?;
        self.notifier.notify("Starting automation!").await;

        let mut report = SessionReport::new(scale);
        for game in 1..=game_count {
            match self.play_game(&tapper, &config, game).await {
                Ok(round) => report.rounds.push(round),
                Err(err) => {
                    error!("Automation stopped during game {}: {}", game, err);
                    self.publish(SystemEvent::status(
                        StatusLevel::Error,
                        format!("Automation stopped: {err}"),
                    ))
                    .await?;
                    self.notifier.notify("Automation stopped, check logs").await;
                    return Err(err);
                }
            }
        }

        report.finished_at = Some(Utc::now());
        let metrics = self.controller.metrics();
        info!(
            "Session finished: {} ({} taps injected, {} failed)",
            report.summary(),
            metrics.successful_inputs,
            metrics.failed_inputs
        );
        self.publish(SystemEvent::lifecycle(
            LifecyclePhase::SessionEnd,
            Some(report.summary()),
        ))
        .await?;
        self.telemetry.record_report(report.clone()).await?;
        Ok(report)
    }

    /// play → settle → round → play again → settle.
    async fn play_game(
        &self,
        tapper: &ScaledTapper<C>,
        config: &SessionConfig,
        game: u32,
    ) -> Result<RoundTelemetry> {
        self.publish(SystemEvent::lifecycle(LifecyclePhase::GameStart, None))
            .await?;
        self.publish(SystemEvent::status(
            StatusLevel::Info,
            format!("Playing game {game}..."),
        ))
        .await?;

        tapper.tap(config.play).await?;
        sleep(self.timings.game_start_delay()).await;

        let round = RoundController::new(tapper, &self.detector, self.timings, self.threshold)
            .play(game, config)
            .await?;
        info!(
            "Game {} finished: {} after {} ticks",
            game, round.outcome, round.ticks
        );
        self.publish(SystemEvent::round(round.clone())).await?;
        self.publish(SystemEvent::status(
            StatusLevel::Info,
            round.outcome.status_text(),
        ))
        .await?;

        tapper.tap(config.play_again).await?;
        sleep(self.timings.play_again_delay()).await;
        self.publish(SystemEvent::lifecycle(LifecyclePhase::GameEnd, None))
            .await?;
        Ok(round)
    }

    async fn publish(&self, event: SystemEvent) -> Result<()> {
        let cloned = event.clone();
        self.sink.publish(event).await?;
        self.telemetry.record_event(cloned).await?;
        Ok(())
    }
}

pub fn orchestrator_error(message: impl Into<String>) -> TapbotError {
    TapbotError::Orchestrator(message.into())
}
