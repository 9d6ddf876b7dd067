//! Operational helpers: logging, telemetry, session reports.

use std::{
    fs::{self, File, OpenOptions},
    path::{Path, PathBuf},
    sync::Arc,
};

use tapbot_types::{
    config::OpsConfig, events::SystemEvent, telemetry::SessionReport, Result, TapbotError,
};
use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

const LOG_FILE_NAME: &str = "tapbot.log";

fn build_filter(config: &OpsConfig) -> Result<EnvFilter> {
    EnvFilter::try_new(config.log_level.clone())
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|err| TapbotError::Ops(format!("failed to create log filter: {err}")))
}

pub fn init_tracing(config: &OpsConfig) -> Result<()> {
    fmt()
        .with_env_filter(build_filter(config)?)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| TapbotError::Ops(format!("tracing init error: {err}")))?;
    Ok(())
}

/// Logs to `<dir>/tapbot.log` instead of the terminal, for when a full-screen
/// display owns it. Returns the log file path.
pub fn init_file_tracing(config: &OpsConfig, dir: &Path) -> Result<PathBuf> {
    let (path, file) = open_log_file(dir)?;
    fmt()
        .with_env_filter(build_filter(config)?)
        .with_ansi(false)
        .with_writer(std::sync::Mutex::new(file))
        .try_init()
        .map_err(|err| TapbotError::Ops(format!("tracing init error: {err}")))?;
    Ok(path)
}

/// Opens the log file in append mode, creating `dir` if needed.
pub fn open_log_file(dir: &Path) -> Result<(PathBuf, File)> {
    fs::create_dir_all(dir)
        .map_err(|err| TapbotError::Ops(format!("failed to create log dir: {err}")))?;
    let path = dir.join(LOG_FILE_NAME);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|err| {
            TapbotError::Ops(format!("failed to open log file {}: {err}", path.display()))
        })?;
    Ok((path, file))
}

/// In-memory record of what a session published.
#[derive(Clone, Default)]
pub struct TelemetryStore {
    events: Arc<Mutex<Vec<SystemEvent>>>,
    reports: Arc<Mutex<Vec<SessionReport>>>,
}

impl TelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_event(&self, event: SystemEvent) -> Result<()> {
        self.events.lock().await.push(event);
        Ok(())
    }

    pub async fn record_report(&self, report: SessionReport) -> Result<()> {
        self.reports.lock().await.push(report);
        Ok(())
    }

    pub async fn snapshot_events(&self) -> Vec<SystemEvent> {
        self.events.lock().await.clone()
    }

    pub async fn snapshot_reports(&self) -> Vec<SessionReport> {
        self.reports.lock().await.clone()
    }
}

pub fn ensure_telemetry_dir(path: &str) -> Result<PathBuf> {
    let dir = PathBuf::from(path);
    fs::create_dir_all(&dir)
        .map_err(|err| TapbotError::Ops(format!("failed to create telemetry dir: {err}")))?;
    info!("Telemetry directory ready at {:?}", dir);
    Ok(dir)
}

/// Writes `report` as pretty JSON into `dir` and returns the file path.
pub fn write_report(dir: &Path, report: &SessionReport) -> Result<PathBuf> {
    let name = format!("session_{}.json", report.started_at.format("%Y%m%d_%H%M%S"));
    let path = dir.join(name);
    let doc = serde_json::to_string_pretty(report)
        .map_err(|err| TapbotError::Ops(format!("failed to encode session report: {err}")))?;
    fs::write(&path, doc).map_err(|err| {
        TapbotError::Ops(format!(
            "failed to write session report {}: {err}",
            path.display()
        ))
    })?;
    Ok(path)
}
