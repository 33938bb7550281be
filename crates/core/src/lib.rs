//! Core library for the subflow visualiser.
//!
//! An [`Engine`] owns the animation state of a set of instanced objects and
//! advances it once per tick. Every animated parameter is a low-pass filtered
//! value chasing a mode-dependent target; a tap or remote tempo drives a
//! pulse clock; a small sequencing language lets an operator script
//! beat-gated command programs. Inbound events arrive through a bounded
//! inbox and outbound frames are handed to a [`FrameSink`].

pub mod animation;
pub mod checksum;
pub mod color;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod filter;
pub mod instances;
pub mod mode;
pub mod record;
pub mod render;
pub mod scene;
pub mod sequencer;
pub mod tempo;

pub use animation::AnimationState;
pub use checksum::{crc8, device_tag};
pub use color::ColorCode;
pub use config::{EngineConfig, ValueRange};
pub use engine::{BeatMode, Engine};
pub use error::{Result, SubflowError};
pub use events::{
    decode_datagram, decode_frame, decode_frames, ControlAction, EventFrame, InboundEvent,
    InboxSender,
};
pub use filter::{lowpass, Smoothed};
pub use mode::Mode;
pub use record::{Recorder, RecordingSettings};
pub use render::{Frame, FrameSink, HeadlessRenderer, InstanceTransform, InstanceUniform, Pose};
pub use scene::SceneDescriptor;
pub use sequencer::{CommandSink, InstructionKind, Sequencer, StopOutcome, SubCommand};
pub use tempo::{PulseResponse, PulseTimer};
