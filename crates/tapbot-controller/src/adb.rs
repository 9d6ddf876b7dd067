use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Instant,
};

use async_trait::async_trait;
use chrono::Utc;
use image::ImageFormat;
use tapbot_types::{
    config::{DeviceConfig, Transport},
    geometry::{DeviceCoordinate, ScreenSize},
    telemetry::LatencySample,
    vision::ImageFrame,
    Result,
};
use tokio::process::Command;

use crate::{controller_error, ControllerMetrics, DeviceController};

const DEFAULT_ADB: &str = "adb";
const NOTIFICATION_TAG: &str = "tapbot";

/// Drives the device through its shell, either over adb or directly.
pub struct AdbController {
    config: DeviceConfig,
    adb_path: PathBuf,
    metrics: Arc<Mutex<ControllerMetrics>>,
}

impl AdbController {
    pub fn new(config: DeviceConfig) -> Result<Self> {
        let adb_path = config
            .adb_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ADB));

        Ok(Self {
            config,
            adb_path,
            metrics: Arc::new(Mutex::new(ControllerMetrics::default())),
        })
    }

    fn serial(&self) -> &str {
        if self.config.serial.is_empty() {
            "emulator-5554"
        } else {
            &self.config.serial
        }
    }

    async fn run_program(&self, program: &Path, args: &[String]) -> Result<Vec<u8>> {
        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|err| {
                controller_error(format!(
                    "failed to run {} {}: {}",
                    program.display(),
                    args.join(" "),
                    err
                ))
            })?;

        if output.status.success() {
            Ok(output.stdout)
        } else {
            Err(controller_error(format!(
                "command failed ({} {}): {}",
                program.display(),
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }

    async fn run_adb(&self, args: &[&str]) -> Result<Vec<u8>> {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        self.run_program(&self.adb_path, &args).await
    }

    /// Runs a device shell command and returns its stdout.
    async fn run_shell(&self, shell_args: &[String]) -> Result<Vec<u8>> {
        match self.config.transport {
            Transport::Adb => {
                let mut args = vec![
                    "-s".to_string(),
                    self.serial().to_string(),
                    "shell".to_string(),
                ];
                args.extend(shell_args.iter().cloned());
                self.run_program(&self.adb_path, &args).await
            }
            Transport::Local => {
                let (program, rest) = shell_args
                    .split_first()
                    .ok_or_else(|| controller_error("empty shell command"))?;
                self.run_program(Path::new(program), rest).await
            }
        }
    }

    async fn capture_png(&self) -> Result<Vec<u8>> {
        match self.config.transport {
            Transport::Adb => {
                let args = ["-s", self.serial(), "exec-out", "screencap", "-p"];
                self.run_adb(&args).await
            }
            Transport::Local => {
                let path = self.config.capture_path.clone();
                self.run_shell(&["screencap".into(), "-p".into(), path.clone()])
                    .await?;
                tokio::fs::read(&path).await.map_err(|err| {
                    controller_error(format!("failed to read screenshot {path}: {err}"))
                })
            }
        }
    }

    fn record_success(&self, start: Instant) {
        if let Ok(mut guard) = self.metrics.lock() {
            guard.last_latency = Some(LatencySample {
                injection_ms: start.elapsed().as_millis() as u64,
                captured_at: Utc::now(),
            });
            guard.successful_inputs += 1;
        }
    }

    fn record_failure(&self) {
        if let Ok(mut guard) = self.metrics.lock() {
            guard.failed_inputs += 1;
        }
    }
}

#[async_trait]
impl DeviceController for AdbController {
    async fn connect(&mut self) -> Result<()> {
        if self.config.transport == Transport::Local {
            tracing::info!("Local shell transport, skipping adb connect");
            return Ok(());
        }
        tracing::info!("Connecting ADB controller: {}", self.serial());
        // Ensure server running
        let _ = self.run_adb(&["start-server"]).await?;
        let args = ["-s", self.serial(), "wait-for-device"];
        let _ = self.run_adb(&args).await?;
        Ok(())
    }

    async fn screen_size(&self) -> Result<ScreenSize> {
        let output = self.run_shell(&["wm".into(), "size".into()]).await?;
        ScreenSize::parse_wm_size(&String::from_utf8_lossy(&output))
    }

    async fn capture_frame(&self) -> Result<ImageFrame> {
        let raw = self.capture_png().await?;
        let img = image::load_from_memory_with_format(&raw, ImageFormat::Png)
            .map_err(|err| controller_error(format!("failed to decode screenshot: {err}")))?;
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(ImageFrame::from_rgba(width, height, rgba.into_raw()))
    }

    async fn tap(&self, point: DeviceCoordinate) -> Result<()> {
        let start = Instant::now();
        let result = self
            .run_shell(&[
                "input".into(),
                "tap".into(),
                point.x.to_string(),
                point.y.to_string(),
            ])
            .await;

        match result {
            Ok(output) => {
                if !output.is_empty() {
                    tracing::debug!("shell output: {}", String::from_utf8_lossy(&output).trim());
                }
                self.record_success(start);
                Ok(())
            }
            Err(err) => {
                self.record_failure();
                Err(err)
            }
        }
    }

    async fn post_notification(&self, message: &str) -> Result<()> {
        let text = match self.config.transport {
            Transport::Adb => shell_quote(message),
            Transport::Local => message.to_string(),
        };
        self.run_shell(&[
            "cmd".into(),
            "notification".into(),
            "post".into(),
            "-t".into(),
            "tapbot".into(),
            NOTIFICATION_TAG.into(),
            text,
        ])
        .await
        .map(|_| ())
    }

    fn metrics(&self) -> ControllerMetrics {
        self.metrics.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

/// `adb shell` joins its arguments into one command line on the device.
fn shell_quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', r"'\''"))
}
