use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::render::{Frame, FrameSink};
use crate::Result;

/// Configuration options for the frame recorder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingSettings {
    /// Record one frame out of every `every_nth`.
    pub every_nth: u32,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self { every_nth: 1 }
    }
}

/// Writes frames as JSON lines while recording is active.
#[derive(Debug)]
pub struct Recorder<W: Write> {
    settings: RecordingSettings,
    writer: W,
    is_recording: bool,
    seen: u64,
    written: u64,
}

impl<W: Write> Recorder<W> {
    pub fn new(writer: W, settings: RecordingSettings) -> Self {
        Self {
            settings,
            writer,
            is_recording: false,
            seen: 0,
            written: 0,
        }
    }

    pub fn start(&mut self) -> Result<()> {
        self.is_recording = true;
        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        self.is_recording = false;
        self.writer.flush()?;
        Ok(())
    }

    pub fn is_recording(&self) -> bool {
        self.is_recording
    }

    pub fn frames_written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> FrameSink for Recorder<W> {
    fn submit(&mut self, frame: &Frame) -> Result<()> {
        if !self.is_recording {
            return Ok(());
        }
        let every = u64::from(self.settings.every_nth.max(1));
        let index = self.seen;
        self.seen += 1;
        if index % every != 0 {
            return Ok(());
        }
        serde_json::to_writer(&mut self.writer, frame)?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::render::{InstanceTransform, Pose};
    use crate::{ColorCode, Mode};

    fn frame(time: f64) -> Frame {
        Frame {
            time,
            mode: Mode::Linear,
            pose: Pose {
                position: Vec3::ZERO,
                rotation: Vec3::ZERO,
                scale: 1.0,
            },
            instances: vec![InstanceTransform {
                position: Vec3::new(0.0, 0.0, -1.0),
                rotation: Vec3::ZERO,
                scale: 1.0,
                brightness: 0.9,
            }],
            visible: true,
            color: ColorCode::RED,
        }
    }

    #[test]
    fn ignores_frames_until_started() {
        let mut recorder = Recorder::new(Vec::new(), RecordingSettings::default());
        recorder.submit(&frame(0.0)).unwrap();
        assert_eq!(recorder.frames_written(), 0);
        assert!(recorder.into_inner().is_empty());
    }

    #[test]
    fn writes_every_nth_frame_as_json_lines() {
        let mut recorder = Recorder::new(Vec::new(), RecordingSettings { every_nth: 2 });
        recorder.start().unwrap();
        for i in 0..5 {
            recorder.submit(&frame(i as f64)).unwrap();
        }
        recorder.stop().unwrap();
        assert!(!recorder.is_recording());
        assert_eq!(recorder.frames_written(), 3);

        let output = String::from_utf8(recorder.into_inner()).unwrap();
        let lines: Vec<serde_json::Value> = output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1]["time"], 2.0);
        assert_eq!(lines[0]["mode"], "linear");
        assert_eq!(lines[0]["color"], 48);
    }
}
