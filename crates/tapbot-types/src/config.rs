use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    geometry::ScreenSize, timing::Timings, vision::DEFAULT_MATCH_THRESHOLD, Result, TapbotError,
};

/// How shell commands reach the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    /// `adb -s <serial> shell ...` from a host machine.
    #[default]
    Adb,
    /// Commands run directly, for example from a terminal on the device.
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub serial: String,
    #[serde(default)]
    pub transport: Transport,
    pub adb_path: Option<String>,
    /// Well-known path `screencap` writes to in local mode.
    #[serde(default = "default_capture_path")]
    pub capture_path: String,
    /// Skips the `wm size` query when set.
    pub fixed_resolution: Option<ScreenSize>,
}

fn default_capture_path() -> String {
    "/sdcard/screen.png".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionConfig {
    #[serde(default = "default_threshold")]
    pub confidence_threshold: f32,
    /// Upper bound on the coarse-to-fine downsampling factor; 1 searches
    /// every position at full resolution.
    #[serde(default = "default_coarse_factor")]
    pub max_coarse_factor: u32,
    /// When set, frames that matched a template are saved here.
    pub capture_dir: Option<String>,
}

fn default_threshold() -> f32 {
    DEFAULT_MATCH_THRESHOLD
}

fn default_coarse_factor() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    pub game_count: u32,
    pub setup_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpsConfig {
    pub log_level: String,
    pub telemetry_dir: String,
    /// Post toasts on the device for session milestones.
    #[serde(default)]
    pub notifications: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TapbotConfig {
    pub device: DeviceConfig,
    pub vision: VisionConfig,
    #[serde(default)]
    pub timing: Timings,
    pub session: SessionSettings,
    pub ops: OpsConfig,
}

impl TapbotConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref).map_err(|err| {
            TapbotError::Configuration(format!(
                "unable to read config file {}: {err}",
                path_ref.display()
            ))
        })?;
        toml::from_str(&contents).map_err(|err| {
            TapbotError::Configuration(format!(
                "failed to parse config file {}: {err}",
                path_ref.display()
            ))
        })
    }

    pub fn validate(&self) -> Result<()> {
        let threshold = self.vision.confidence_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(TapbotError::Configuration(
                "vision.confidence_threshold must be in (0.0, 1.0]".into(),
            ));
        }
        if self.vision.max_coarse_factor == 0 {
            return Err(TapbotError::Configuration(
                "vision.max_coarse_factor must be at least 1".into(),
            ));
        }
        if self.timing.max_ticks == 0 {
            return Err(TapbotError::Configuration(
                "timing.max_ticks must be greater than zero".into(),
            ));
        }
        if self.timing.confirm_ticks == 0 || self.timing.confirm_ticks > self.timing.max_ticks {
            return Err(TapbotError::Configuration(
                "timing.confirm_ticks must be between 1 and timing.max_ticks".into(),
            ));
        }
        if self.session.game_count == 0 {
            return Err(TapbotError::Configuration(
                "session.game_count must be greater than zero".into(),
            ));
        }
        if matches!(self.device.fixed_resolution, Some(size) if size.width == 0 || size.height == 0)
        {
            return Err(TapbotError::Configuration(
                "device.fixed_resolution must not have a zero dimension".into(),
            ));
        }
        Ok(())
    }
}

impl Default for TapbotConfig {
    fn default() -> Self {
        Self {
            device: DeviceConfig {
                serial: "emulator-5554".into(),
                transport: Transport::Adb,
                adb_path: None,
                capture_path: default_capture_path(),
                fixed_resolution: None,
            },
            vision: VisionConfig {
                confidence_threshold: DEFAULT_MATCH_THRESHOLD,
                max_coarse_factor: default_coarse_factor(),
                capture_dir: None,
            },
            timing: Timings::default(),
            session: SessionSettings {
                game_count: 5,
                setup_path: "tapbot_setup.toml".into(),
            },
            ops: OpsConfig {
                log_level: "info".into(),
                telemetry_dir: "telemetry".into(),
                notifications: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn load_tapbot_config_from_file() {
        let temp_path = std::env::temp_dir().join("tapbot-config-test.toml");
        let mut config = TapbotConfig::default();
        config.device.transport = Transport::Local;
        config.device.fixed_resolution = Some(ScreenSize::new(720, 1280));
        config.timing.tap_interval_ms = 150;
        config.session.game_count = 12;

        let doc = toml::to_string(&config).expect("serialize config");
        fs::write(&temp_path, doc).expect("write temp config");

        let loaded = TapbotConfig::from_file(&temp_path).expect("load config");
        assert_eq!(loaded.device.transport, Transport::Local);
        assert_eq!(loaded.device.fixed_resolution, Some(ScreenSize::new(720, 1280)));
        assert_eq!(loaded.timing, config.timing);
        assert_eq!(loaded.session.game_count, 12);
        fs::remove_file(&temp_path).expect("cleanup temp config");
    }

    #[test]
    fn missing_sections_take_defaults() {
        let doc = r#"
[device]
serial = "127.0.0.1:5555"

[vision]

[session]
game_count = 3
setup_path = "setup.toml"

[ops]
log_level = "debug"
telemetry_dir = "telemetry"
"#;
        let config: TapbotConfig = toml::from_str(doc).expect("parse config");
        assert_eq!(config.device.transport, Transport::Adb);
        assert_eq!(config.device.capture_path, "/sdcard/screen.png");
        assert_eq!(config.vision.confidence_threshold, DEFAULT_MATCH_THRESHOLD);
        assert_eq!(config.vision.max_coarse_factor, 1);
        assert_eq!(config.timing, Timings::default());
        assert!(!config.ops.notifications);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_configuration_rules() {
        let mut config = TapbotConfig::default();
        assert!(config.validate().is_ok());

        config.vision.confidence_threshold = 0.0;
        assert!(config.validate().is_err());
        config.vision.confidence_threshold = 1.5;
        assert!(config.validate().is_err());
        config.vision.confidence_threshold = 0.8;

        config.vision.max_coarse_factor = 0;
        assert!(config.validate().is_err());
        config.vision.max_coarse_factor = 1;

        config.timing.max_ticks = 0;
        assert!(config.validate().is_err());
        config.timing.max_ticks = 20;

        config.timing.confirm_ticks = 21;
        assert!(config.validate().is_err());
        config.timing.confirm_ticks = 0;
        assert!(config.validate().is_err());
        config.timing.confirm_ticks = 2;

        config.session.game_count = 0;
        assert!(config.validate().is_err());
        config.session.game_count = 5;

        config.device.fixed_resolution = Some(ScreenSize::new(1080, 0));
        assert!(config.validate().is_err());
        config.device.fixed_resolution = None;
        assert!(config.validate().is_ok());
    }
}
