use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Result, SubflowError};

/// Top-level configuration for the engine. Every tunable lives here and is
/// handed to [`Engine`](crate::Engine) once at construction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub motion: MotionConfig,
    pub filters: FilterConfig,
    pub tempo: TempoConfig,
    pub sequencer: SequencerConfig,
    pub layout: LayoutConfig,
    pub display: DisplayConfig,
}

impl EngineConfig {
    /// Parses a (possibly partial) JSON document; missing keys keep their
    /// defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

/// Closed numeric interval used to validate incoming commands.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f32,
    pub max: f32,
}

impl ValueRange {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Compared in `f32`, the precision the limits are stored in.
    pub fn contains(&self, value: f64) -> bool {
        let value = value as f32;
        value >= self.min && value <= self.max
    }

    /// Returns the value unchanged when it lies inside the range.
    pub fn check(&self, what: &'static str, value: f64) -> Result<f32> {
        if self.contains(value) {
            Ok(value as f32)
        } else {
            Err(SubflowError::rejected(
                what,
                value,
                self.min as f64,
                self.max as f64,
            ))
        }
    }

    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min, self.max)
    }

    /// Linear interpolation, `0.0` maps to `min` and `1.0` to `max`.
    pub fn lerp(&self, fraction: f32) -> f32 {
        self.min + (self.max - self.min) * fraction
    }
}

/// Global motion and speed settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Length of one drift/rock cycle in (speed-scaled) seconds.
    pub secs_per_move: f32,
    /// Depth spacing between trailing instances.
    pub instance_spacing: f32,
    pub y_offset: f32,
    pub far_z_limit: f32,
    pub speed_step: f32,
    pub default_speed: f32,
    pub speed: ValueRange,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            secs_per_move: 16.0,
            instance_spacing: 0.5,
            y_offset: 0.4,
            far_z_limit: 15.0,
            speed_step: 0.5,
            default_speed: 1.0,
            speed: ValueRange::new(0.3, 6.3),
        }
    }
}

/// Time constants for every smoothing filter, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub speed_k: f32,
    /// Shared by warp and drift.
    pub warp_k: f32,
    pub shade_k: f32,
    pub offcenter_k: f32,
    pub pulse_k: f32,
    pub switch_k_k: f32,
    pub init_switch_k: f32,
    pub switch_k_target: f32,
    /// Shade value forced when a new program arrives.
    pub program_flash_shade: f32,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            speed_k: 0.1,
            warp_k: 0.3,
            shade_k: 0.2,
            offcenter_k: 0.2,
            pulse_k: 0.1,
            switch_k_k: 0.3,
            init_switch_k: 0.4,
            switch_k_target: 0.0,
            program_flash_shade: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TempoConfig {
    pub bpm: ValueRange,
    /// Periods at or below this are treated as "no tempo".
    pub min_period: f64,
    pub nudge: f64,
    pub scale: ValueRange,
    pub default_pulse_scale: f32,
}

impl Default for TempoConfig {
    fn default() -> Self {
        Self {
            bpm: ValueRange::new(20.0, 480.0),
            min_period: 0.1,
            nudge: 0.05,
            scale: ValueRange::new(0.7, 1.3),
            default_pulse_scale: 1.13,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    pub magic: String,
    pub max_instructions_per_invocation: usize,
    pub max_loops: u32,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            magic: "subflow24379".to_string(),
            max_instructions_per_invocation: 10,
            max_loops: 2_000_000_000,
        }
    }
}

/// Instance count and the fixed grid used by the shimmer modes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub instance_count: usize,
    pub grid_columns: usize,
    pub grid_depth: f32,
    pub column_spacing: f32,
    pub column_offset: f32,
    pub row_spacing: f32,
    pub row_offset: f32,
    /// Seed for the rotation jitter; `None` draws from OS entropy.
    pub jitter_seed: Option<u64>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            instance_count: 60,
            grid_columns: 15,
            grid_depth: -3.7,
            column_spacing: 1.1,
            column_offset: -7.7,
            row_spacing: 1.8,
            row_offset: -2.7,
            jitter_seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub color: ValueRange,
    pub default_color: u8,
    pub alert_color: u8,
    /// Minimum seconds between two colour toggles.
    pub color_debounce: f64,
    /// Frames with a shade at or below this are not drawn.
    pub visible_shade: f32,
    pub inbox_capacity: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            color: ValueRange::new(0.0, 63.0),
            default_color: 63,
            alert_color: 48,
            color_debounce: 2.0,
            visible_shade: 0.02,
            inbox_capacity: 256,
        }
    }
}
