//! Per-instance targets and transforms.
//!
//! Every instance owns four independent filter channels. Trailing modes make
//! the instances follow the global pose at increasing depth, which reads as an
//! echo of the head instance; the shimmer modes park them on a fixed grid.

use std::f32::consts::{PI, TAU};

use glam::Vec3;
use rand::Rng;

use crate::animation::AnimationState;
use crate::config::EngineConfig;
use crate::filter::Smoothed;
use crate::render::InstanceTransform;
use crate::Mode;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InstanceChannel {
    pub x: Smoothed,
    pub y: Smoothed,
    pub z: Smoothed,
    pub z_rot: Smoothed,
}

impl InstanceChannel {
    pub fn step(&mut self, k: f32, dt: f32) {
        self.x.step(k, dt);
        self.y.step(k, dt);
        self.z.step(k, dt);
        self.z_rot.step(k, dt);
    }
}

/// Writes this tick's targets for every instance from the current pose.
pub fn retarget(state: &mut AnimationState, config: &EngineConfig) {
    let layout = &config.layout;
    let motion = &config.motion;
    let mode = state.mode;
    let position = state.position;
    let rot_z = state.rotation.z;
    let warp = state.warp.value;
    let drift = state.drift.value;
    let scale = state.scale;
    let columns = layout.grid_columns.max(1);

    for (i, channel) in state.instances.iter_mut().enumerate() {
        let n = i as f32;
        if mode.is_grid() {
            let grid_scale = if mode == Mode::PulseMap { scale } else { 1.0 };
            channel.z.target = layout.grid_depth;
            channel.z_rot.target = (PI * n) % TAU;
            channel.x.target =
                ((i % columns) as f32 * layout.column_spacing + layout.column_offset) * grid_scale;
            channel.y.target =
                ((i / columns) as f32 * layout.row_spacing + layout.row_offset) * grid_scale;
        } else {
            let spread = 1.0 + 0.02 * n;
            channel.z.target = position.z - motion.instance_spacing * n;
            channel.z_rot.target = if mode == Mode::Spiral {
                warp * 0.2 * ((0.5 + position.z) * TAU / motion.secs_per_move).cos()
            } else {
                rot_z * (1.0 + warp * 0.02 * n)
            };
            channel.x.target = position.x - drift * 3.0 * rot_z * spread;
            channel.y.target = position.y * (1.0 + drift * rot_z * spread);
        }
    }
}

/// Resolves the filtered channels into transforms, adding a fresh rotation
/// jitter proportional to the current pulse.
pub fn resolve<R: Rng + ?Sized>(
    state: &AnimationState,
    config: &EngineConfig,
    rng: &mut R,
) -> Vec<InstanceTransform> {
    let grid = state.mode.is_grid();
    let shade = state.shade.value;
    let jitter = state.scale - 1.0;

    state
        .instances
        .iter()
        .map(|channel| {
            let tweak = if jitter == 0.0 {
                0.0
            } else {
                jitter * rng.gen_range(-1.0_f32..=1.0)
            };
            let brightness = if grid {
                shade
            } else {
                (1.0 + channel.z.value / config.motion.far_z_limit).max(0.0) * shade
            };
            InstanceTransform {
                position: Vec3::new(channel.x.value, channel.y.value, channel.z.value),
                rotation: Vec3::new(
                    state.rotation.x,
                    state.rotation.y,
                    channel.z_rot.value + tweak,
                ),
                scale: state.scale,
                brightness,
            }
        })
        .collect()
}
