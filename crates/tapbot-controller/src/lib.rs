//! Device controller abstraction layer: screen size, capture, tap injection.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tapbot_types::{
    geometry::{DeviceCoordinate, ReferenceCoordinate, ScaleFactor, ScreenSize},
    telemetry::LatencySample,
    vision::ImageFrame,
    Result, TapbotError,
};
use tracing::{debug, info};

mod adb;
mod notify;

pub use adb::AdbController;
pub use notify::{DeviceNotifier, LogNotifier, Notifier};

/// Aggregated controller performance counters.
#[derive(Debug, Default, Clone)]
pub struct ControllerMetrics {
    pub last_latency: Option<LatencySample>,
    pub successful_inputs: u64,
    pub failed_inputs: u64,
}

#[async_trait]
pub trait DeviceController: Send + Sync {
    async fn connect(&mut self) -> Result<()>;
    /// Native resolution as reported by the device.
    async fn screen_size(&self) -> Result<ScreenSize>;
    async fn capture_frame(&self) -> Result<ImageFrame>;
    /// One synthetic touch at a native pixel position.
    async fn tap(&self, point: DeviceCoordinate) -> Result<()>;
    /// Shows a transient message on the device, when supported.
    async fn post_notification(&self, _message: &str) -> Result<()> {
        Ok(())
    }
    fn metrics(&self) -> ControllerMetrics;
}

/// Taps reference coordinates after converting them to native pixels.
pub struct ScaledTapper<C> {
    controller: Arc<C>,
    scale: ScaleFactor,
}

impl<C: DeviceController> ScaledTapper<C> {
    pub fn new(controller: Arc<C>, scale: ScaleFactor) -> Self {
        Self { controller, scale }
    }

    /// Injection failures are returned untouched; a missed tap has no
    /// automatic recovery.
    pub async fn tap(&self, coord: ReferenceCoordinate) -> Result<DeviceCoordinate> {
        let point = self.scale.apply(coord);
        debug!("tap {} -> {}", coord, point);
        self.controller.tap(point).await?;
        Ok(point)
    }
}

/// What a [`MockController`] was asked to do, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockCall {
    Tap(DeviceCoordinate),
    Capture,
}

/// In-process controller used for dry runs and tests.
pub struct MockController {
    screen: Result<ScreenSize, String>,
    frame: Mutex<ImageFrame>,
    calls: Arc<Mutex<Vec<MockCall>>>,
    fail_taps_after: Option<usize>,
    metrics: Arc<Mutex<ControllerMetrics>>,
}

impl MockController {
    pub fn new(screen: ScreenSize) -> Self {
        Self {
            screen: Ok(screen),
            frame: Mutex::new(ImageFrame::empty()),
            calls: Arc::new(Mutex::new(Vec::new())),
            fail_taps_after: None,
            metrics: Arc::new(Mutex::new(ControllerMetrics::default())),
        }
    }

    /// A device whose size query fails with `message`.
    pub fn without_screen_size(message: impl Into<String>) -> Self {
        Self {
            screen: Err(message.into()),
            ..Self::new(ScreenSize::new(0, 0))
        }
    }

    /// Taps succeed `count` times, then every further tap fails.
    pub fn failing_taps_after(mut self, count: usize) -> Self {
        self.fail_taps_after = Some(count);
        self
    }

    pub fn set_frame(&self, frame: ImageFrame) {
        if let Ok(mut guard) = self.frame.lock() {
            *guard = frame;
        }
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn taps(&self) -> Vec<DeviceCoordinate> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                MockCall::Tap(point) => Some(point),
                MockCall::Capture => None,
            })
            .collect()
    }

    fn record(&self, call: MockCall) -> Result<()> {
        self.calls
            .lock()
            .map_err(|_| controller_error("failed to lock mock call log"))?
            .push(call);
        Ok(())
    }
}

#[async_trait]
impl DeviceController for MockController {
    async fn connect(&mut self) -> Result<()> {
        info!("Connecting to mock device");
        Ok(())
    }

    async fn screen_size(&self) -> Result<ScreenSize> {
        self.screen.clone().map_err(controller_error)
    }

    async fn capture_frame(&self) -> Result<ImageFrame> {
        self.record(MockCall::Capture)?;
        self.frame
            .lock()
            .map(|frame| frame.clone())
            .map_err(|_| controller_error("failed to lock mock frame"))
    }

    async fn tap(&self, point: DeviceCoordinate) -> Result<()> {
        if let Some(limit) = self.fail_taps_after {
            if self.taps().len() >= limit {
                if let Ok(mut metrics) = self.metrics.lock() {
                    metrics.failed_inputs += 1;
                }
                return Err(controller_error(format!("mock tap at {point} rejected")));
            }
        }
        info!("Mock tap {} {}", point.x, point.y);
        self.record(MockCall::Tap(point))?;
        let mut metrics = self
            .metrics
            .lock()
            .map_err(|_| controller_error("failed to lock metrics"))?;
        metrics.last_latency = Some(LatencySample {
            injection_ms: 0,
            captured_at: Utc::now(),
        });
        metrics.successful_inputs += 1;
        Ok(())
    }

    fn metrics(&self) -> ControllerMetrics {
        self.metrics.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

/// Generate an error aligned with controller semantics.
pub fn controller_error(message: impl Into<String>) -> TapbotError {
    TapbotError::Controller(message.into())
}
