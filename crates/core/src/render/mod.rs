use bytemuck::{Pod, Zeroable};
use glam::{EulerRot, Mat4, Quat, Vec3};
use serde::Serialize;

use crate::{ColorCode, Mode, Result};

/// Global pose of the animated object, independent of any projection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: f32,
}

/// Fully resolved transform for one visual instance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct InstanceTransform {
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: f32,
    pub brightness: f32,
}

impl InstanceTransform {
    /// Translate, then rotate around x, y, z, then scale uniformly.
    pub fn model_matrix(&self) -> Mat4 {
        let rotation = Quat::from_euler(
            EulerRot::XYZ,
            self.rotation.x,
            self.rotation.y,
            self.rotation.z,
        );
        Mat4::from_scale_rotation_translation(Vec3::splat(self.scale), rotation, self.position)
    }

    pub fn uniform(&self) -> InstanceUniform {
        InstanceUniform {
            model: self.model_matrix().to_cols_array_2d(),
            brightness: self.brightness,
            _padding: [0.0; 3],
        }
    }
}

/// GPU-ready packing of one instance, 16-byte aligned.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct InstanceUniform {
    pub model: [[f32; 4]; 4],
    pub brightness: f32,
    pub _padding: [f32; 3],
}

/// Everything the renderer needs for one tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    pub time: f64,
    pub mode: Mode,
    pub pose: Pose,
    pub instances: Vec<InstanceTransform>,
    /// False when the shade is too low for anything to be drawn.
    pub visible: bool,
    pub color: ColorCode,
}

impl Frame {
    pub fn uniforms(&self) -> Vec<InstanceUniform> {
        self.instances.iter().map(InstanceTransform::uniform).collect()
    }

    pub fn brightness(&self) -> impl Iterator<Item = f32> + '_ {
        self.instances.iter().map(|instance| instance.brightness)
    }
}

/// Consumer of resolved frames, typically a GPU backend.
pub trait FrameSink {
    fn submit(&mut self, frame: &Frame) -> Result<()>;
}

/// Renderer stand-in that keeps the latest frame and counts submissions.
#[derive(Debug, Default)]
pub struct HeadlessRenderer {
    frames_submitted: u64,
    last_frame: Option<Frame>,
}

impl HeadlessRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_submitted(&self) -> u64 {
        self.frames_submitted
    }

    pub fn last_frame(&self) -> Option<&Frame> {
        self.last_frame.as_ref()
    }
}

impl FrameSink for HeadlessRenderer {
    fn submit(&mut self, frame: &Frame) -> Result<()> {
        let was_visible = self.last_frame.as_ref().map(|f| f.visible);
        if was_visible != Some(frame.visible) {
            tracing::debug!(visible = frame.visible, time = frame.time, "visibility changed");
        }
        self.frames_submitted += 1;
        self.last_frame = Some(frame.clone());
        Ok(())
    }
}
