use std::{fmt, path::PathBuf, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Result, TapbotError};

/// Confidence floor used when nothing else is configured.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.8;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageFrame {
    pub width: u32,
    pub height: u32,
    /// Raw RGBA pixel buffer.
    pub data: Vec<u8>,
    pub captured_at: DateTime<Utc>,
}

impl ImageFrame {
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data,
            captured_at: Utc::now(),
        }
    }

    pub fn empty() -> Self {
        Self::from_rgba(0, 0, Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Which terminal screen a template identifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateRole {
    Won,
    Lost,
}

impl TemplateRole {
    pub fn as_str(self) -> &'static str {
        match self {
            TemplateRole::Won => "won",
            TemplateRole::Lost => "lost",
        }
    }
}

impl fmt::Display for TemplateRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TemplateRole {
    type Err = TapbotError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "won" => Ok(TemplateRole::Won),
            "lost" => Ok(TemplateRole::Lost),
            other => Err(TapbotError::Configuration(format!(
                "unknown template role '{other}' (expected won or lost)"
            ))),
        }
    }
}

/// Decoded single-channel template bound to a role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateImage {
    pub role: TemplateRole,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    /// Row-major 8-bit luma samples.
    pub luma: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub matched: bool,
    /// Maximum normalized cross-correlation over the capture, in [-1, 1].
    pub score: f32,
}

impl MatchResult {
    pub fn from_score(score: f32, threshold: f32) -> Self {
        Self {
            matched: score >= threshold,
            score,
        }
    }
}
