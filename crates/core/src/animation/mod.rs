//! Per-object animation state and the filter pass that runs once per tick.

use std::f32::consts::TAU;

use glam::Vec3;
use tracing::debug;

use crate::config::EngineConfig;
use crate::filter::{lowpass, Smoothed};
use crate::instances::InstanceChannel;
use crate::Mode;

#[derive(Debug, Clone)]
pub struct AnimationState {
    pub mode: Mode,
    /// Mode that was active before the last switch into a moving mode.
    pub previous_mode: Mode,
    /// Mode the last filter pass ran with; a mismatch means a transition.
    applied_mode: Mode,
    pub time_in_mode: f64,
    /// Animation clock; advances by `delta * speed`.
    pub elapsed: f64,
    /// Desired speed set by taps, remote tempo or commands.
    pub speed_command: f32,
    pub speed: Smoothed,
    pub drift: Smoothed,
    pub warp: Smoothed,
    pub shade: Smoothed,
    pub offcenter: Smoothed,
    pub switch_k: Smoothed,
    pub scale: f32,
    pub pulse_scale: f32,
    pub position: Vec3,
    pub rotation: Vec3,
    pub instances: Vec<InstanceChannel>,
}

impl AnimationState {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            mode: Mode::Spread,
            previous_mode: Mode::Spread,
            applied_mode: Mode::Spread,
            time_in_mode: 0.0,
            elapsed: 0.0,
            speed_command: config.motion.default_speed,
            speed: Smoothed::new(0.0, config.motion.default_speed),
            drift: Smoothed::default(),
            warp: Smoothed::new(0.0, 1.0),
            shade: Smoothed::new(0.0, 1.0),
            offcenter: Smoothed::new(0.0, 1.0),
            switch_k: Smoothed::new(
                config.filters.init_switch_k,
                config.filters.switch_k_target,
            ),
            scale: 1.0,
            pulse_scale: config.tempo.default_pulse_scale,
            position: Vec3::new(0.0, config.motion.y_offset, 0.0),
            rotation: Vec3::ZERO,
            instances: vec![InstanceChannel::default(); config.layout.instance_count],
        }
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    pub fn next_mode(&mut self) {
        self.mode = self.mode.next();
    }

    pub fn prev_mode(&mut self) {
        self.mode = self.mode.prev();
    }

    /// Stores a new speed command, clamped to the configured range.
    pub fn set_speed_command(&mut self, speed: f32, config: &EngineConfig) {
        self.speed_command = config.motion.speed.clamp(speed);
    }

    /// Steps the speed command up; ignored while stopped or off.
    pub fn speed_up(&mut self, config: &EngineConfig) {
        if self.mode.is_moving() {
            let speed = self.speed_command + config.motion.speed_step;
            self.set_speed_command(speed, config);
        }
    }

    pub fn speed_down(&mut self, config: &EngineConfig) {
        if self.mode.is_moving() {
            let speed = self.speed_command - config.motion.speed_step;
            self.set_speed_command(speed, config);
        }
    }

    /// Hard-sets the scale to a pulse of the given strength (1.0 is full).
    pub fn fire_pulse(&mut self, strength: f32) {
        self.scale = 1.0 + (self.pulse_scale - 1.0) * strength;
    }

    /// Advances the clock and runs every filter once.
    pub fn advance(&mut self, dt: f32, config: &EngineConfig) {
        let filters = &config.filters;
        let travelled = dt as f64 * self.speed.value as f64;
        self.elapsed += travelled;
        self.time_in_mode += travelled;
        self.scale = lowpass(self.scale, 1.0, filters.pulse_k, dt);

        if self.mode != self.applied_mode {
            self.enter_mode(config);
        }
        self.switch_k.step(filters.switch_k_k, dt);

        self.speed
            .follow(self.mode.speed_target(self.speed_command), filters.speed_k, dt);
        let targets = self.mode.targets(self.speed_command, self.speed.value);
        self.drift.follow(targets.drift, filters.warp_k, dt);
        self.warp.follow(targets.warp, filters.warp_k, dt);
        self.offcenter.target = targets.offcenter;
        self.shade.step(filters.shade_k, dt);
        self.offcenter.step(filters.offcenter_k, dt);

        self.update_pose(config);

        let k = self.switch_k.value;
        for channel in &mut self.instances {
            channel.step(k, dt);
        }
    }

    fn enter_mode(&mut self, config: &EngineConfig) {
        debug!(from = %self.applied_mode, to = %self.mode, "mode transition");
        self.shade.target = if self.mode == Mode::Off { 0.0 } else { 1.0 };
        if self.mode.is_moving() {
            self.time_in_mode = 0.0;
            self.previous_mode = self.applied_mode;
            self.switch_k.value = config.filters.init_switch_k;
        }
        self.applied_mode = self.mode;
    }

    fn update_pose(&mut self, config: &EngineConfig) {
        let secs_per_move = config.motion.secs_per_move;
        let z = self.elapsed.rem_euclid(secs_per_move as f64) as f32;
        let wave = (z * TAU / secs_per_move).sin();
        let sway = self.drift.value * 0.1 * wave;

        self.position.z = z;
        self.rotation.z = self.warp.value * 0.2 * wave;
        self.position.x = sway;
        self.position.y = config.motion.y_offset * self.offcenter.value + sway;
    }
}
