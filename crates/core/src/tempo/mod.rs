//! Tap-tempo and remote-tempo estimation plus the phase-locked pulse clock.
//!
//! Timestamps are seconds on whatever monotonic clock the caller ticks with.

use tracing::debug;

use crate::config::EngineConfig;
use crate::Result;

/// What a tempo operation asks of the animation state.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PulseResponse {
    /// New speed command derived from the period.
    pub speed: Option<f32>,
    /// Pulse to fire right away; 1.0 is a full pulse.
    pub pulse: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct PulseTimer {
    period: f64,
    last_pulse: f64,
    remote_bpm: f64,
    accumulated_period: f64,
    accumulated_beats: f64,
    saved_period: f64,
    last_tap: Option<f64>,
    min_period: f64,
    spacing: f64,
}

impl PulseTimer {
    /// A stopped timer whose phase anchor starts at `now`.
    pub fn new(config: &EngineConfig, now: f64) -> Self {
        Self {
            period: 0.0,
            last_pulse: now,
            remote_bpm: 0.0,
            accumulated_period: 0.0,
            accumulated_beats: 0.0,
            saved_period: 0.0,
            last_tap: None,
            min_period: config.tempo.min_period,
            spacing: config.motion.instance_spacing as f64,
        }
    }

    pub fn period(&self) -> f64 {
        self.period
    }

    pub fn remote_bpm(&self) -> f64 {
        self.remote_bpm
    }

    pub fn accumulated_beats(&self) -> f64 {
        self.accumulated_beats
    }

    pub fn accumulated_period(&self) -> f64 {
        self.accumulated_period
    }

    pub fn saved_period(&self) -> f64 {
        self.saved_period
    }

    pub fn last_pulse(&self) -> f64 {
        self.last_pulse
    }

    pub fn is_running(&self) -> bool {
        self.period > self.min_period
    }

    fn has_remote(&self) -> bool {
        self.remote_bpm > self.min_period
    }

    fn derived_speed(&self) -> f32 {
        (self.spacing / self.period) as f32
    }

    /// Folds a manual tap into the running estimate and fires a pulse.
    pub fn record_tap(&mut self, now: f64) -> PulseResponse {
        let mut speed = self.resume();

        if self.has_remote() {
            self.last_tap = None;
        } else {
            if let Some(last_tap) = self.last_tap {
                let elapsed = now - last_tap;
                let beats = if self.period < self.min_period {
                    1.0
                } else {
                    (elapsed / self.period).round().max(1.0)
                };
                self.accumulated_period += elapsed;
                self.accumulated_beats += beats;
                self.period = self.accumulated_period / self.accumulated_beats;
                speed = Some(self.derived_speed());
                debug!(elapsed, beats, period = self.period, "tap folded into tempo");
            }
            self.last_tap = Some(now);
        }

        self.last_pulse = now;
        PulseResponse {
            speed,
            pulse: Some(1.0),
        }
    }

    /// Locks the period to a remote tempo and returns the derived speed.
    pub fn set_remote_bpm(&mut self, bpm: f64, config: &EngineConfig) -> Result<f32> {
        config.tempo.bpm.check("bpm", bpm)?;
        self.remote_bpm = bpm;
        self.period = 60.0 / bpm;
        Ok(self.derived_speed())
    }

    pub fn clear_remote(&mut self) {
        self.remote_bpm = 0.0;
    }

    /// Stops automatic pulsing.
    pub fn disable(&mut self) {
        self.period = 0.0;
    }

    /// Pauses a running clock, keeping its period for [`resume`](Self::resume).
    /// On a stopped clock this fires a single pulse of the given strength.
    pub fn pause(&mut self, strength: f32) -> PulseResponse {
        let mut response = PulseResponse::default();
        if self.is_running() {
            self.saved_period = self.period;
            self.period = 0.0;
        } else {
            self.saved_period = 0.0;
            response.pulse = Some(strength);
        }
        self.accumulated_period = 0.0;
        self.accumulated_beats = 0.0;
        self.last_tap = None;
        response
    }

    /// Restores a paused period, returning the re-derived speed.
    pub fn resume(&mut self) -> Option<f32> {
        if self.saved_period > self.min_period {
            self.period = std::mem::take(&mut self.saved_period);
            Some(self.derived_speed())
        } else {
            None
        }
    }

    /// Returns true when a period boundary has been crossed at `now`.
    pub fn tick(&mut self, now: f64) -> bool {
        if self.is_running() && now > self.last_pulse + self.period {
            self.last_pulse += self.period;
            true
        } else {
            false
        }
    }

    /// Shifts the phase anchor without touching the period.
    pub fn nudge(&mut self, amount: f64) {
        self.last_pulse += amount;
    }
}
