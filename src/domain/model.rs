use crate::utils::error::{BusError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who answered the version / `*IDN?` query.
///
/// Older ISOBUS instruments free-format their version string, so every field
/// is optional; Mercury-series controllers always fill all four.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub vendor: Option<String>,
    pub model: Option<String>,
    pub serial: Option<String>,
    pub firmware: Option<String>,
}

/// Front-panel / remote interlock state shared by the ISOBUS instruments.
///
/// The `Cn` digit is the value the instrument expects on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    LocalLocked,
    RemoteLocked,
    LocalUnlocked,
    RemoteUnlocked,
}

impl ControlMode {
    pub fn command_digit(self) -> u8 {
        match self {
            Self::LocalLocked => 0,
            Self::RemoteLocked => 1,
            Self::LocalUnlocked => 2,
            Self::RemoteUnlocked => 3,
        }
    }

    pub fn from_digit(digit: u8) -> Option<Self> {
        match digit {
            0 => Some(Self::LocalLocked),
            1 => Some(Self::RemoteLocked),
            2 => Some(Self::LocalUnlocked),
            3 => Some(Self::RemoteUnlocked),
            _ => None,
        }
    }

    pub fn is_remote(self) -> bool {
        matches!(self, Self::RemoteLocked | Self::RemoteUnlocked)
    }
}

impl std::str::FromStr for ControlMode {
    type Err = BusError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "local" | "local-unlocked" => Ok(Self::LocalUnlocked),
            "remote" | "remote-unlocked" => Ok(Self::RemoteUnlocked),
            "local-locked" => Ok(Self::LocalLocked),
            "remote-locked" => Ok(Self::RemoteLocked),
            other => Err(BusError::ParseError {
                reply: other.to_string(),
                reason: "expected local, remote, local-locked or remote-locked".to_string(),
            }),
        }
    }
}

impl std::fmt::Display for ControlMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::LocalLocked => "local-locked",
            Self::RemoteLocked => "remote-locked",
            Self::LocalUnlocked => "local",
            Self::RemoteUnlocked => "remote",
        };
        write!(f, "{}", s)
    }
}

/// Sampling rate of a level-meter probe. Fast burns helium on an He channel,
/// so Slow is the steady-state choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeRate {
    Slow,
    Fast,
}

impl std::str::FromStr for ProbeRate {
    type Err = BusError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "slow" => Ok(Self::Slow),
            "fast" => Ok(Self::Fast),
            other => Err(BusError::ParseError {
                reply: other.to_string(),
                reason: "expected slow or fast".to_string(),
            }),
        }
    }
}

impl std::fmt::Display for ProbeRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Slow => write!(f, "slow"),
            Self::Fast => write!(f, "fast"),
        }
    }
}

/// One axis of a vector magnet power supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// Device group the axis lives under in the controller's noun tree.
    pub fn group(self) -> &'static str {
        match self {
            Self::X => "GRPX",
            Self::Y => "GRPY",
            Self::Z => "GRPZ",
        }
    }

    pub fn all() -> [Axis; 3] {
        [Self::X, Self::Y, Self::Z]
    }
}

impl std::str::FromStr for Axis {
    type Err = BusError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "x" => Ok(Self::X),
            "y" => Ok(Self::Y),
            "z" => Ok(Self::Z),
            other => Err(BusError::ParseError {
                reply: other.to_string(),
                reason: "expected x, y or z".to_string(),
            }),
        }
    }
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::X => write!(f, "x"),
            Self::Y => write!(f, "y"),
            Self::Z => write!(f, "z"),
        }
    }
}

/// Ramp actions a magnet power supply understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MagnetAction {
    Hold,
    ToSetpoint,
    ToZero,
    Clamp,
}

impl MagnetAction {
    pub fn token(self) -> &'static str {
        match self {
            Self::Hold => "HOLD",
            Self::ToSetpoint => "RTOS",
            Self::ToZero => "RTOZ",
            Self::Clamp => "CLMP",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "HOLD" => Some(Self::Hold),
            "RTOS" => Some(Self::ToSetpoint),
            "RTOZ" => Some(Self::ToZero),
            "CLMP" => Some(Self::Clamp),
            _ => None,
        }
    }
}

impl std::str::FromStr for MagnetAction {
    type Err = BusError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "hold" => Ok(Self::Hold),
            "to-setpoint" | "rtos" => Ok(Self::ToSetpoint),
            "to-zero" | "rtoz" => Ok(Self::ToZero),
            "clamp" => Ok(Self::Clamp),
            other => Err(BusError::ParseError {
                reply: other.to_string(),
                reason: "expected hold, to-setpoint, to-zero or clamp".to_string(),
            }),
        }
    }
}

/// One sampled value, as emitted by `read --json` and the watch logger.
#[derive(Debug, Clone, Serialize)]
pub struct Reading {
    pub instrument: String,
    pub quantity: String,
    pub value: f64,
    pub unit: String,
    pub taken_at: DateTime<Utc>,
}

impl Reading {
    pub fn now(instrument: &str, quantity: &str, value: f64, unit: &str) -> Self {
        Self {
            instrument: instrument.to_string(),
            quantity: quantity.to_string(),
            value,
            unit: unit.to_string(),
            taken_at: Utc::now(),
        }
    }
}
