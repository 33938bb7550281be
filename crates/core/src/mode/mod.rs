use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Result, SubflowError};

/// Playback behaviour. The numeric order is part of the protocol: remote
/// commands address modes by index and cycling walks this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum Mode {
    Off = 0,
    Stop = 1,
    Linear = 2,
    Full = 3,
    Spiral = 4,
    Spread = 5,
    Shimmer = 6,
    PulseMap = 7,
}

/// Targets a mode asks of the global filters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModeTargets {
    pub offcenter: f32,
    pub speed: f32,
    pub drift: f32,
    pub warp: f32,
}

impl Mode {
    pub const FIRST: Mode = Mode::Off;
    pub const LAST: Mode = Mode::PulseMap;
    pub const ALL: [Mode; 8] = [
        Mode::Off,
        Mode::Stop,
        Mode::Linear,
        Mode::Full,
        Mode::Spiral,
        Mode::Spread,
        Mode::Shimmer,
        Mode::PulseMap,
    ];

    pub fn index(self) -> u32 {
        self as u32
    }

    /// Next mode in order; the last mode stays put.
    pub fn next(self) -> Mode {
        Mode::try_from(self.index() + 1).unwrap_or(self)
    }

    /// Previous mode in order; the first mode stays put.
    pub fn prev(self) -> Mode {
        match self.index().checked_sub(1) {
            Some(index) => Mode::try_from(index).unwrap_or(self),
            None => self,
        }
    }

    /// Modes where instances sit on the fixed grid instead of trailing.
    pub fn is_grid(self) -> bool {
        matches!(self, Mode::Shimmer | Mode::PulseMap)
    }

    /// True for modes that animate, i.e. anything above STOP.
    pub fn is_moving(self) -> bool {
        self > Mode::Stop
    }

    /// Speed target for the given speed command.
    pub fn speed_target(self, speed_command: f32) -> f32 {
        match self {
            Mode::Shimmer | Mode::PulseMap | Mode::Stop | Mode::Off => 0.0,
            Mode::Spread => 0.5 * speed_command,
            Mode::Spiral => 1.1 * speed_command,
            Mode::Full | Mode::Linear => speed_command,
        }
    }

    /// Full target set; drift and warp depend on the live smoothed `speed`.
    pub fn targets(self, speed_command: f32, speed: f32) -> ModeTargets {
        let speed_target = self.speed_target(speed_command);
        let (offcenter, drift, warp) = match self {
            Mode::Shimmer | Mode::PulseMap => (0.0, 0.0, 0.0),
            Mode::Spread | Mode::Spiral => (0.0, 0.0, 10.0 * (1.0 - speed / 10.5)),
            Mode::Full => (1.0, 0.7 * (1.0 - speed / 10.5), 1.5 * (1.0 - speed / 8.5)),
            Mode::Linear | Mode::Stop | Mode::Off => (1.0, 0.0, 0.0),
        };
        ModeTargets {
            offcenter,
            speed: speed_target,
            drift,
            warp,
        }
    }
}

impl TryFrom<u32> for Mode {
    type Error = SubflowError;

    fn try_from(value: u32) -> Result<Self> {
        Mode::ALL.get(value as usize).copied().ok_or_else(|| {
            SubflowError::rejected(
                "mode",
                value as f64,
                Mode::FIRST.index() as f64,
                Mode::LAST.index() as f64,
            )
        })
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::Off => "off",
            Mode::Stop => "stop",
            Mode::Linear => "linear",
            Mode::Full => "full",
            Mode::Spiral => "spiral",
            Mode::Spread => "spread",
            Mode::Shimmer => "shimmer",
            Mode::PulseMap => "pulse-map",
        };
        f.write_str(name)
    }
}
