//! The tick orchestrator.
//!
//! [`Engine`] exclusively owns the animation state, the pulse timer and the
//! sequencer. Everything outside reaches it through the inbox, so a tick is
//! never interleaved with an inbound event.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use crate::animation::AnimationState;
use crate::config::{EngineConfig, ValueRange};
use crate::events::{inbox, ControlAction, EventFrame, InboundEvent, Inbox, InboxSender};
use crate::instances;
use crate::render::{Frame, Pose};
use crate::scene::SceneDescriptor;
use crate::sequencer::{CommandSink, InstructionKind, Sequencer, StopOutcome, SubCommand};
use crate::tempo::{PulseResponse, PulseTimer};
use crate::{ColorCode, Mode, Result, SubflowError};

const CMD_COLOR: i64 = 5;
const CMD_BEAT_MODE: i64 = 7;
const CMD_PULSE_SCALE: i64 = 11;
const CMD_SEQUENCE: i64 = 17;
const CMD_MODE: i64 = 23;

const BEAT_STRENGTH: ValueRange = ValueRange::new(0.0, 1.0);

/// How `beat` frames are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BeatMode {
    /// Every beat frame fires a pulse and advances a running sequence.
    #[default]
    Direct,
    /// Beat frames only carry the remote tempo; the pulse timer keeps phase.
    Indirect,
}

#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    scene: SceneDescriptor,
    animation: AnimationState,
    pulse: PulseTimer,
    sequencer: Sequencer,
    inbox: Inbox,
    sender: InboxSender,
    beat_mode: BeatMode,
    color: ColorCode,
    last_color_switch: f64,
    rng: StdRng,
    ticks: u64,
}

impl Engine {
    /// Builds an engine whose pulse anchor starts at `now`, together with a
    /// producer handle for its inbox.
    pub fn new(config: EngineConfig, now: f64) -> (Self, InboxSender) {
        let (sender, inbox) = inbox(config.display.inbox_capacity);
        let rng = match config.layout.jitter_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let engine = Self {
            scene: SceneDescriptor::triangles(config.layout.instance_count),
            animation: AnimationState::new(&config),
            pulse: PulseTimer::new(&config, now),
            sequencer: Sequencer::new(&config.sequencer),
            inbox,
            sender: sender.clone(),
            beat_mode: BeatMode::default(),
            color: ColorCode(config.display.default_color),
            last_color_switch: -config.display.color_debounce,
            rng,
            ticks: 0,
            config,
        };
        info!(
            instances = engine.scene.instance_count,
            mode = %engine.animation.mode,
            "engine ready"
        );
        (engine, sender)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn scene(&self) -> &SceneDescriptor {
        &self.scene
    }

    pub fn animation(&self) -> &AnimationState {
        &self.animation
    }

    pub fn pulse(&self) -> &PulseTimer {
        &self.pulse
    }

    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    pub fn beat_mode(&self) -> BeatMode {
        self.beat_mode
    }

    pub fn color(&self) -> ColorCode {
        self.color
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Another producer handle for the inbox.
    pub fn sender(&self) -> InboxSender {
        self.sender.clone()
    }

    /// Runs one frame: drain the inbox, fire a due pulse, filter, resolve.
    pub fn tick(&mut self, now: f64, delta: Duration) -> Frame {
        // Events pushed while draining wait for the next tick.
        for _ in 0..self.inbox.pending() {
            let Some(event) = self.inbox.try_next() else {
                break;
            };
            self.apply(event, now);
        }

        if self.pulse.tick(now) {
            self.animation.fire_pulse(1.0);
            if self.sequencer.is_ready() {
                self.run_sequence();
            }
        }

        self.animation.advance(delta.as_secs_f32(), &self.config);
        instances::retarget(&mut self.animation, &self.config);
        let instances = instances::resolve(&self.animation, &self.config, &mut self.rng);
        self.ticks += 1;

        Frame {
            time: now,
            mode: self.animation.mode,
            pose: Pose {
                position: self.animation.position,
                rotation: self.animation.rotation,
                scale: self.animation.scale,
            },
            instances,
            visible: self.animation.shade.value > self.config.display.visible_shade,
            color: self.color,
        }
    }

    /// Applies one event immediately. Rejected events are logged and dropped.
    pub fn apply(&mut self, event: InboundEvent, now: f64) {
        match event {
            InboundEvent::Program(text) => self.load_program(&text),
            InboundEvent::Frame(frame) => self.apply_frame(&frame),
            InboundEvent::Control(action) => self.apply_control(action, now),
        }
    }

    fn load_program(&mut self, text: &str) {
        match self.sequencer.load(text) {
            Ok(_) => self.animation.shade.value = self.config.filters.program_flash_shade,
            Err(err) => warn!(%err, "program rejected"),
        }
    }

    fn apply_frame(&mut self, frame: &EventFrame) {
        let outcome = match frame.kind.as_str() {
            "beat" => self.apply_beat(frame),
            "cmd" => self.apply_command(frame.id, frame.param),
            other => {
                debug!(kind = other, "ignoring unknown frame");
                Ok(())
            }
        };
        if let Err(err) = outcome {
            warn!(%err, kind = %frame.kind, id = frame.id, "frame rejected");
        }
    }

    fn apply_beat(&mut self, frame: &EventFrame) -> Result<()> {
        match self.beat_mode {
            BeatMode::Direct => {
                let strength = BEAT_STRENGTH.check("beat strength", frame.strength)?;
                if self.sequencer.is_ready() {
                    self.run_sequence();
                }
                let response = self.pulse.pause(strength);
                self.respond(response);
            }
            BeatMode::Indirect => {
                let speed = self.pulse.set_remote_bpm(frame.bpm, &self.config)?;
                self.animation.set_speed_command(speed, &self.config);
            }
        }
        Ok(())
    }

    fn apply_command(&mut self, id: i64, param: u32) -> Result<()> {
        match id {
            CMD_MODE => {
                let mode = Mode::try_from(param)?;
                info!(%mode, "mode set remotely");
                self.animation.set_mode(mode);
            }
            CMD_SEQUENCE => match param {
                100 => {
                    if !self.start_sequence() {
                        debug!("start requested without a program");
                    }
                }
                0 => {
                    self.sequencer.halt();
                    self.sequencer.unload();
                    self.restore_defaults();
                }
                _ => self.sequencer.halt(),
            },
            CMD_PULSE_SCALE => {
                let percent = param.min(100) as f32;
                self.animation.pulse_scale = self.config.tempo.scale.lerp(percent / 100.0);
            }
            CMD_BEAT_MODE => {
                self.beat_mode = if param == 0 {
                    BeatMode::Indirect
                } else {
                    BeatMode::Direct
                };
                debug!(beat_mode = ?self.beat_mode, "beat mode changed");
            }
            CMD_COLOR => {
                let code = self.config.display.color.check("color", param as f64)?;
                self.color = ColorCode(code as u8);
            }
            other => debug!(id = other, param, "ignoring unknown command"),
        }
        Ok(())
    }

    fn apply_control(&mut self, action: ControlAction, now: f64) {
        debug!(?action, "control action");
        match action {
            ControlAction::Tap => {
                if self.sequencer.is_loaded() {
                    self.start_sequence();
                }
                let response = self.pulse.record_tap(now);
                self.respond(response);
            }
            ControlAction::Pause => {
                if self.sequencer.stop() == StopOutcome::Unloaded {
                    self.restore_defaults();
                }
                let response = self.pulse.pause(1.0);
                self.respond(response);
            }
            ControlAction::NextMode => self.animation.next_mode(),
            ControlAction::PrevMode => self.animation.prev_mode(),
            ControlAction::SpeedUp => self.animation.speed_up(&self.config),
            ControlAction::SpeedDown => self.animation.speed_down(&self.config),
            ControlAction::NudgeEarlier => self.pulse.nudge(-self.config.tempo.nudge),
            ControlAction::NudgeLater => self.pulse.nudge(self.config.tempo.nudge),
            ControlAction::ToggleColor => self.toggle_color(now),
            ControlAction::SetMode(mode) => self.animation.set_mode(mode),
        }
    }

    fn toggle_color(&mut self, now: f64) {
        if now - self.last_color_switch < self.config.display.color_debounce {
            debug!("colour toggle debounced");
            return;
        }
        let alert = ColorCode(self.config.display.alert_color);
        self.color = if self.color == alert {
            ColorCode(self.config.display.default_color)
        } else {
            alert
        };
        self.last_color_switch = now;
    }

    fn respond(&mut self, response: PulseResponse) {
        if let Some(speed) = response.speed {
            self.animation.set_speed_command(speed, &self.config);
        }
        if let Some(strength) = response.pulse {
            self.animation.fire_pulse(strength);
        }
    }

    fn restore_defaults(&mut self) {
        self.pulse.clear_remote();
        self.animation.pulse_scale = self.config.tempo.default_pulse_scale;
    }

    fn start_sequence(&mut self) -> bool {
        let mut effects = Effects {
            config: &self.config,
            animation: &mut self.animation,
            pulse: &mut self.pulse,
            color: &mut self.color,
        };
        self.sequencer.start(&mut effects)
    }

    fn run_sequence(&mut self) -> usize {
        let mut effects = Effects {
            config: &self.config,
            animation: &mut self.animation,
            pulse: &mut self.pulse,
            color: &mut self.color,
        };
        self.sequencer.run(&mut effects)
    }
}

/// The parts of the engine a sequenced instruction may touch.
struct Effects<'a> {
    config: &'a EngineConfig,
    animation: &'a mut AnimationState,
    pulse: &'a mut PulseTimer,
    color: &'a mut ColorCode,
}

impl Effects<'_> {
    fn apply(&mut self, command: &SubCommand) -> Result<()> {
        let arg = command.arg;
        match command.kind {
            InstructionKind::Bpm => match self.pulse.set_remote_bpm(arg, self.config) {
                Ok(speed) => self.animation.set_speed_command(speed, self.config),
                Err(err) => {
                    self.pulse.disable();
                    return Err(err);
                }
            },
            InstructionKind::Speed => {
                let speed = self.config.motion.speed.check("speed", arg)?;
                self.animation.set_speed_command(speed, self.config);
            }
            InstructionKind::Scale => {
                self.animation.pulse_scale = self.config.tempo.scale.check("pulse scale", arg)?;
            }
            InstructionKind::Mode => {
                if arg.is_nan() || arg < 0.0 {
                    let last = Mode::LAST.index() as f64;
                    return Err(SubflowError::rejected("mode", arg, 0.0, last));
                }
                self.animation.set_mode(Mode::try_from(arg as u32)?);
            }
            InstructionKind::Color => {
                let code = self.config.display.color.check("color", arg)?;
                *self.color = ColorCode(code as u8);
            }
            InstructionKind::Loop | InstructionKind::None => {}
        }
        Ok(())
    }
}

impl CommandSink for Effects<'_> {
    fn execute(&mut self, command: &SubCommand) {
        if let Err(err) = self.apply(command) {
            warn!(%err, kind = ?command.kind, "sequenced instruction rejected");
        }
    }
}
