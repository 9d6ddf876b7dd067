use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Result, TapbotError};

/// Resolution that recorded coordinates are authored against.
pub const REFERENCE_RESOLUTION: ScreenSize = ScreenSize::new(1080, 1920);

/// A point expressed against [`REFERENCE_RESOLUTION`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceCoordinate {
    pub x: u32,
    pub y: u32,
}

impl ReferenceCoordinate {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for ReferenceCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Parses `X,Y` as typed on the command line.
impl FromStr for ReferenceCoordinate {
    type Err = TapbotError;

    fn from_str(s: &str) -> Result<Self> {
        let (x, y) = s.split_once(',').ok_or_else(|| {
            TapbotError::Configuration(format!("coordinate '{s}' must look like X,Y"))
        })?;
        let parse = |part: &str| {
            part.trim().parse::<u32>().map_err(|err| {
                TapbotError::Configuration(format!("invalid coordinate component '{part}': {err}"))
            })
        };
        Ok(Self::new(parse(x)?, parse(y)?))
    }
}

/// A native pixel position on the device screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCoordinate {
    pub x: u32,
    pub y: u32,
}

impl DeviceCoordinate {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for DeviceCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenSize {
    pub width: u32,
    pub height: u32,
}

impl ScreenSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Parses `wm size` output. The last `WxH` token wins, so an
    /// `Override size:` line takes precedence over `Physical size:`.
    pub fn parse_wm_size(output: &str) -> Result<Self> {
        let token = output.split_whitespace().last().ok_or_else(|| {
            TapbotError::Controller("empty screen size output".into())
        })?;
        let (width, height) = token.split_once('x').ok_or_else(|| {
            TapbotError::Controller(format!("unexpected screen size token '{token}'"))
        })?;
        let parse = |part: &str| {
            part.parse::<u32>().map_err(|err| {
                TapbotError::Controller(format!("invalid screen dimension '{part}': {err}"))
            })
        };
        Ok(Self::new(parse(width)?, parse(height)?))
    }
}

impl fmt::Display for ScreenSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Ratio between the native and the reference resolution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleFactor {
    pub x: f64,
    pub y: f64,
}

impl ScaleFactor {
    pub const IDENTITY: ScaleFactor = ScaleFactor { x: 1.0, y: 1.0 };

    pub fn from_native(native: ScreenSize) -> Result<Self> {
        if native.width == 0 || native.height == 0 {
            return Err(TapbotError::Controller(format!(
                "native resolution {native} has a zero dimension"
            )));
        }
        Ok(Self {
            x: f64::from(native.width) / f64::from(REFERENCE_RESOLUTION.width),
            y: f64::from(native.height) / f64::from(REFERENCE_RESOLUTION.height),
        })
    }

    /// Multiplies componentwise and truncates toward zero.
    pub fn apply(&self, coord: ReferenceCoordinate) -> DeviceCoordinate {
        DeviceCoordinate::new(
            (f64::from(coord.x) * self.x) as u32,
            (f64::from(coord.y) * self.y) as u32,
        )
    }
}

impl Default for ScaleFactor {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl fmt::Display for ScaleFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}x{:.4}", self.x, self.y)
    }
}

/// An unconfigured coordinate stays unconfigured instead of becoming (0, 0).
pub fn scale(coord: Option<ReferenceCoordinate>, factor: ScaleFactor) -> Option<DeviceCoordinate> {
    coord.map(|c| factor.apply(c))
}
