//! Interpreter for operator-authored command programs.
//!
//! A program is a `;`-separated list whose first field is the magic header,
//! followed by `kind:arg:duration` instructions, e.g.
//! `subflow24379;BPM:128:4;MOD:5:8;LOP:1:0`. Instructions are fetched one
//! pulse at a time; `duration` is the number of pulses an instruction holds
//! before the next one is fetched.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::SequencerConfig;
use crate::{Result, SubflowError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstructionKind {
    Bpm,
    Speed,
    Scale,
    Mode,
    Color,
    Loop,
    None,
}

impl InstructionKind {
    /// Unknown tokens map to [`InstructionKind::None`].
    pub fn from_token(token: &str) -> Self {
        match token {
            "BPM" => Self::Bpm,
            "SPD" | "SPEED" => Self::Speed,
            "SCL" | "SCALE" => Self::Scale,
            "MOD" | "MODE" => Self::Mode,
            "COL" | "COLOR" => Self::Color,
            "LOP" | "LOOP" => Self::Loop,
            _ => Self::None,
        }
    }

    /// Kinds with a side effect hold for their duration.
    fn holds_countdown(self) -> bool {
        !matches!(self, Self::Loop | Self::None)
    }
}

/// One parsed instruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubCommand {
    pub kind: InstructionKind,
    pub arg: f64,
    pub duration_ticks: u32,
}

impl SubCommand {
    pub const NONE: SubCommand = SubCommand {
        kind: InstructionKind::None,
        arg: 0.0,
        duration_ticks: 0,
    };
}

impl FromStr for SubCommand {
    type Err = SubflowError;

    /// Only a wrong field count is malformed; an unparseable number reads as 0.
    fn from_str(text: &str) -> Result<Self> {
        let parts: Vec<&str> = text.split(':').filter(|part| !part.is_empty()).collect();
        let [kind, arg, duration] = parts.as_slice() else {
            return Err(SubflowError::MalformedInstruction(text.to_string()));
        };
        let arg = arg.trim().parse::<f64>().unwrap_or_else(|_| {
            debug!(instruction = text, "unparseable argument read as 0");
            0.0
        });
        let duration_ticks = duration.trim().parse::<u32>().unwrap_or_else(|_| {
            debug!(instruction = text, "unparseable duration read as 0");
            0
        });
        Ok(SubCommand {
            kind: InstructionKind::from_token(kind.trim()),
            arg,
            duration_ticks,
        })
    }
}

/// Receiver of executed instructions.
pub trait CommandSink {
    fn execute(&mut self, command: &SubCommand);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Advancement halted; the program stays loaded and can restart.
    Paused,
    /// The program was discarded.
    Unloaded,
}

#[derive(Debug, Clone)]
pub struct Sequencer {
    fields: Vec<String>,
    cursor: usize,
    loop_counter: u32,
    countdown: u32,
    current: SubCommand,
    loaded: bool,
    ready: bool,
    config: SequencerConfig,
}

impl Sequencer {
    pub fn new(config: &SequencerConfig) -> Self {
        Self {
            fields: Vec::new(),
            cursor: 1,
            loop_counter: 0,
            countdown: 0,
            current: SubCommand::NONE,
            loaded: false,
            ready: false,
            config: config.clone(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn countdown(&self) -> u32 {
        self.countdown
    }

    pub fn loop_counter(&self) -> u32 {
        self.loop_counter
    }

    /// Header plus instructions.
    pub fn instruction_count(&self) -> usize {
        self.fields.len()
    }

    /// Replaces the program. On failure the sequencer is cleared.
    pub fn load(&mut self, text: &str) -> Result<usize> {
        match split_program(text, &self.config.magic) {
            Ok(fields) => {
                self.fields = fields;
                self.cursor = 1;
                self.loop_counter = 0;
                self.loaded = true;
                let instructions = self.fields.len() - 1;
                info!(instructions, "program loaded");
                Ok(instructions)
            }
            Err(err) => {
                self.unload();
                Err(err)
            }
        }
    }

    /// Restarts from the first instruction and runs everything up to the
    /// first one that waits for a pulse. Does nothing without a program.
    pub fn start<S: CommandSink + ?Sized>(&mut self, sink: &mut S) -> bool {
        if !self.loaded {
            return false;
        }
        self.cursor = 1;
        self.loop_counter = 0;
        self.countdown = 0;
        self.current = SubCommand::NONE;
        self.ready = true;
        info!("sequence started");
        self.run(sink);
        true
    }

    /// First call pauses, a second call (while paused) unloads.
    pub fn stop(&mut self) -> StopOutcome {
        if self.ready {
            self.halt();
            StopOutcome::Paused
        } else {
            self.unload();
            StopOutcome::Unloaded
        }
    }

    pub fn halt(&mut self) {
        if self.ready {
            info!("sequence paused");
        }
        self.ready = false;
    }

    pub fn unload(&mut self) {
        if self.loaded {
            info!("program unloaded");
        }
        self.fields.clear();
        self.loaded = false;
        self.ready = false;
        self.cursor = 1;
        self.loop_counter = 0;
        self.countdown = 0;
        self.current = SubCommand::NONE;
    }

    /// One pulse's worth of work: advance, then keep draining zero-duration
    /// instructions up to the per-invocation bound. Returns how many
    /// instructions were executed.
    pub fn run<S: CommandSink + ?Sized>(&mut self, sink: &mut S) -> usize {
        let mut executed = usize::from(self.advance(sink));
        let mut extra = 0;
        while self.loaded
            && self.countdown == 0
            && self.current.duration_ticks == 0
            && extra < self.config.max_instructions_per_invocation
        {
            extra += 1;
            executed += usize::from(self.advance(sink));
        }
        executed
    }

    /// Single interpreter step. Returns true when an instruction executed.
    pub fn advance<S: CommandSink + ?Sized>(&mut self, sink: &mut S) -> bool {
        if !self.loaded {
            return false;
        }
        if self.countdown > 0 {
            self.countdown -= 1;
            return false;
        }
        let command = self.fetch();
        sink.execute(&command);
        if command.kind.holds_countdown() {
            self.countdown = command.duration_ticks;
        }
        self.current = command;
        true
    }

    fn fetch(&mut self) -> SubCommand {
        let last = self.fields.len().saturating_sub(1);
        let mut jumps = 0;
        loop {
            let command = self.instruction_at(self.cursor);
            // Unbounded loops that only reach other loops would never exit.
            let unbounded = command.duration_ticks == 0;
            if command.kind == InstructionKind::Loop
                && (!unbounded || jumps < self.fields.len())
                && self.loop_allowed(command.duration_ticks)
            {
                if let Some(target) = jump_target(command.arg, last) {
                    self.loop_counter = self.loop_counter.saturating_add(1);
                    self.cursor = target;
                    jumps += 1;
                    continue;
                }
            }
            if self.cursor < last {
                self.cursor += 1;
            }
            return command;
        }
    }

    fn loop_allowed(&self, duration: u32) -> bool {
        (duration == 0 && self.loop_counter < u32::MAX)
            || (duration <= self.config.max_loops && self.loop_counter < duration)
    }

    fn instruction_at(&self, index: usize) -> SubCommand {
        let Some(text) = self.fields.get(index) else {
            return SubCommand::NONE;
        };
        text.parse::<SubCommand>().unwrap_or_else(|err: SubflowError| {
            debug!(%err, index, "instruction treated as no-op");
            SubCommand::NONE
        })
    }
}

/// Valid jump targets are `< last`, i.e. strictly before the final field.
fn jump_target(arg: f64, last: usize) -> Option<usize> {
    if !arg.is_finite() || arg < 0.0 {
        return None;
    }
    let target = arg as usize;
    (target < last).then_some(target)
}

fn split_program(text: &str, magic: &str) -> Result<Vec<String>> {
    let mut fields: Vec<String> = text
        .split(';')
        .map(str::trim)
        .filter(|field| !field.is_empty())
        .map(str::to_string)
        .collect();

    let header = fields
        .first()
        .cloned()
        .ok_or_else(|| SubflowError::MalformedProgram("empty program".to_string()))?;
    if header != magic {
        // `<magic>:<instruction>` carries a single instruction in the header.
        let inline = header
            .strip_prefix(magic)
            .and_then(|rest| rest.strip_prefix(':'))
            .filter(|rest| !rest.is_empty())
            .ok_or_else(|| SubflowError::MalformedProgram(format!("missing `{magic}` header")))?;
        let inline = inline.to_string();
        fields[0] = magic.to_string();
        fields.insert(1, inline);
    }
    if fields.len() < 2 {
        return Err(SubflowError::MalformedProgram(
            "program has no instructions".to_string(),
        ));
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Collect {
        executed: Vec<SubCommand>,
    }

    impl Collect {
        fn count(&self, kind: InstructionKind) -> usize {
            self.executed.iter().filter(|c| c.kind == kind).count()
        }
    }

    impl CommandSink for Collect {
        fn execute(&mut self, command: &SubCommand) {
            self.executed.push(*command);
        }
    }

    fn sequencer() -> Sequencer {
        Sequencer::new(&SequencerConfig::default())
    }

    #[test]
    fn parses_instructions() {
        let bpm: SubCommand = "BPM:128:0".parse().unwrap();
        assert_eq!(bpm.kind, InstructionKind::Bpm);
        assert_eq!(bpm.arg, 128.0);
        assert_eq!(bpm.duration_ticks, 0);

        let speed: SubCommand = "SPEED::2.5:3".parse().unwrap();
        assert_eq!(speed.kind, InstructionKind::Speed);
        assert_eq!(speed.duration_ticks, 3);

        let unknown: SubCommand = "XYZ:1:5".parse().unwrap();
        assert_eq!(unknown.kind, InstructionKind::None);
        assert_eq!(unknown.duration_ticks, 5);

        assert!("BPM:128".parse::<SubCommand>().is_err());
        assert!("BPM:128:0:1".parse::<SubCommand>().is_err());
    }

    #[test]
    fn unparseable_numbers_read_as_zero() {
        let speed: SubCommand = "SPD:3:x".parse().unwrap();
        assert_eq!(speed.kind, InstructionKind::Speed);
        assert_eq!(speed.arg, 3.0);
        assert_eq!(speed.duration_ticks, 0);

        let mode: SubCommand = "MOD:x:2".parse().unwrap();
        assert_eq!(mode.kind, InstructionKind::Mode);
        assert_eq!(mode.arg, 0.0);
        assert_eq!(mode.duration_ticks, 2);

        let negative: SubCommand = "MOD:3:-1".parse().unwrap();
        assert_eq!(negative.duration_ticks, 0);
    }

    #[test]
    fn load_requires_magic_header() {
        let mut seq = sequencer();
        assert_eq!(seq.load("subflow24379;BPM:128:0;SPD:2:1").unwrap(), 2);
        assert!(seq.is_loaded());
        assert_eq!(seq.instruction_count(), 3);

        assert!(seq.load("garbage").is_err());
        assert!(!seq.is_loaded());
        assert!(!seq.is_ready());

        assert!(seq.load("subflow24379").is_err());
        assert!(seq.load("").is_err());
        assert!(seq.load("other;BPM:128:0").is_err());
    }

    #[test]
    fn load_accepts_inline_instruction() {
        let mut seq = sequencer();
        assert_eq!(seq.load("subflow24379:BPM:128:0").unwrap(), 1);
        let mut sink = Collect::default();
        seq.start(&mut sink);
        assert_eq!(sink.executed[0].kind, InstructionKind::Bpm);
        assert_eq!(sink.executed[0].arg, 128.0);
    }

    #[test]
    fn start_primes_until_first_timed_instruction() {
        let mut seq = sequencer();
        seq.load("subflow24379;SPD:2:0;SCL:1.2:0;MOD:3:2;SPD:4:0").unwrap();
        let mut sink = Collect::default();

        assert!(seq.start(&mut sink));
        assert!(seq.is_ready());
        let kinds: Vec<_> = sink.executed.iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![InstructionKind::Speed, InstructionKind::Scale, InstructionKind::Mode]
        );
        assert_eq!(seq.countdown(), 2);
        assert_eq!(seq.cursor(), 4);
    }

    #[test]
    fn countdown_holds_instruction() {
        let mut seq = sequencer();
        seq.load("subflow24379;BPM:100:2;SPD:2:5").unwrap();
        let mut sink = Collect::default();
        seq.start(&mut sink);
        assert_eq!(sink.executed.len(), 1);

        assert_eq!(seq.run(&mut sink), 0);
        assert_eq!(seq.run(&mut sink), 0);
        assert_eq!(seq.countdown(), 0);
        assert_eq!(seq.run(&mut sink), 1);
        assert_eq!(sink.executed.last().unwrap().kind, InstructionKind::Speed);
    }

    #[test]
    fn bounded_loop_repeats_body() {
        let mut seq = sequencer();
        seq.load("subflow24379;SPD:2:0;MOD:3:1;LOP:1:2;SCL:1.2:1").unwrap();
        let mut sink = Collect::default();
        seq.start(&mut sink);
        for _ in 0..12 {
            seq.run(&mut sink);
        }

        assert_eq!(sink.count(InstructionKind::Speed), 3);
        assert_eq!(sink.count(InstructionKind::Mode), 3);
        assert_eq!(seq.loop_counter(), 2);
        assert!(sink.count(InstructionKind::Scale) >= 1);
    }

    #[test]
    fn unbounded_loop_keeps_cycling() {
        let mut seq = sequencer();
        seq.load("subflow24379;MOD:2:0;MOD:3:1;LOP:1:0;SPD:1:0").unwrap();
        let mut sink = Collect::default();
        seq.start(&mut sink);
        for _ in 0..20 {
            seq.run(&mut sink);
        }
        assert_eq!(sink.count(InstructionKind::Speed), 0);
        assert!(sink.count(InstructionKind::Mode) >= 10);
    }

    #[test]
    fn invalid_loop_target_is_a_no_op() {
        let mut seq = sequencer();
        seq.load("subflow24379;LOP:7:0;SPD:2:1").unwrap();
        let mut sink = Collect::default();
        seq.start(&mut sink);
        assert_eq!(seq.loop_counter(), 0);
        assert_eq!(sink.executed.last().unwrap().kind, InstructionKind::Speed);
    }

    #[test]
    fn bounded_self_loop_runs_its_full_count() {
        let mut seq = sequencer();
        seq.load("subflow24379;LOP:1:5;SPD:2:1").unwrap();
        let mut sink = Collect::default();

        seq.start(&mut sink);
        assert_eq!(seq.loop_counter(), 5);
        assert_eq!(sink.executed.last().unwrap().kind, InstructionKind::Loop);

        seq.run(&mut sink);
        assert_eq!(sink.executed.last().unwrap().kind, InstructionKind::Speed);
    }

    #[test]
    fn pure_loop_program_terminates() {
        let config = SequencerConfig::default();
        let mut seq = sequencer();
        seq.load("subflow24379;LOP:1:0;LOP:1:0").unwrap();
        let mut sink = Collect::default();

        seq.start(&mut sink);
        let executed = seq.run(&mut sink);
        assert!(executed <= 1 + config.max_instructions_per_invocation);
        assert!(sink
            .executed
            .iter()
            .all(|c| c.kind == InstructionKind::Loop));
    }

    #[test]
    fn malformed_instruction_runs_as_no_op() {
        let mut seq = sequencer();
        seq.load("subflow24379;BPM;SPD:2:1").unwrap();
        let mut sink = Collect::default();
        seq.start(&mut sink);
        assert_eq!(sink.executed[0], SubCommand::NONE);
        assert_eq!(sink.executed[1].kind, InstructionKind::Speed);
    }

    #[test]
    fn stop_pauses_then_unloads() {
        let mut seq = sequencer();
        seq.load("subflow24379;SPD:2:1").unwrap();
        let mut sink = Collect::default();
        seq.start(&mut sink);

        assert_eq!(seq.stop(), StopOutcome::Paused);
        assert!(seq.is_loaded());
        assert!(!seq.is_ready());
        assert!(seq.start(&mut sink));

        seq.stop();
        assert_eq!(seq.stop(), StopOutcome::Unloaded);
        assert!(!seq.is_loaded());
        assert!(!seq.start(&mut sink));
        assert_eq!(seq.run(&mut sink), 0);
    }
}
