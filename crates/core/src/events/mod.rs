//! Inbound event shapes and the inbox that carries them into the tick.
//!
//! Transports run on their own threads and only ever hold an
//! [`InboxSender`]; the engine drains the [`Inbox`] once per tick.

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{Mode, Result, SubflowError};

/// Structured frame from the stream transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFrame {
    #[serde(rename = "evt")]
    pub kind: String,
    #[serde(default, rename = "change")]
    pub changed: bool,
    #[serde(default, rename = "pos")]
    pub position: i64,
    #[serde(default)]
    pub bpm: f64,
    #[serde(default)]
    pub strength: f64,
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub param: u32,
}

impl EventFrame {
    pub fn beat(bpm: f64, strength: f64) -> Self {
        Self {
            kind: "beat".to_string(),
            changed: false,
            position: 0,
            bpm,
            strength,
            id: 0,
            param: 0,
        }
    }

    pub fn command(id: i64, param: u32) -> Self {
        Self {
            kind: "cmd".to_string(),
            changed: false,
            position: 0,
            bpm: 0.0,
            strength: 0.0,
            id,
            param,
        }
    }
}

/// Gestures and key presses after they have been mapped to intents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlAction {
    /// Tap tempo; also starts a loaded sequence.
    Tap,
    /// Pause tempo and sequence; a second press unloads the sequence.
    Pause,
    NextMode,
    PrevMode,
    SpeedUp,
    SpeedDown,
    NudgeEarlier,
    NudgeLater,
    ToggleColor,
    SetMode(Mode),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum InboundEvent {
    /// Raw program text from the datagram transport.
    Program(String),
    Frame(EventFrame),
    Control(ControlAction),
}

/// Decodes a datagram payload into a program event.
pub fn decode_datagram(bytes: &[u8]) -> Result<InboundEvent> {
    let text = std::str::from_utf8(bytes).map_err(|_| SubflowError::InvalidUtf8)?;
    Ok(InboundEvent::Program(text.to_string()))
}

pub fn decode_frame(json: &str) -> Result<EventFrame> {
    Ok(serde_json::from_str(json)?)
}

/// Decodes back-to-back JSON frames from one stream read. Decoding stops at
/// the first malformed frame, which is reported as the final element.
pub fn decode_frames(json: &str) -> Vec<Result<EventFrame>> {
    let mut frames = Vec::new();
    for frame in serde_json::Deserializer::from_str(json).into_iter::<EventFrame>() {
        match frame {
            Ok(frame) => frames.push(Ok(frame)),
            Err(err) => {
                frames.push(Err(err.into()));
                break;
            }
        }
    }
    frames
}

/// Creates a bounded inbox and its producer handle.
pub fn inbox(capacity: usize) -> (InboxSender, Inbox) {
    let (tx, rx) = bounded(capacity.max(1));
    (InboxSender { tx }, Inbox { rx })
}

#[derive(Debug, Clone)]
pub struct InboxSender {
    tx: Sender<InboundEvent>,
}

impl InboxSender {
    /// Never blocks; a full inbox drops the event.
    pub fn send(&self, event: InboundEvent) -> Result<()> {
        match self.tx.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(event)) => {
                warn!(?event, "inbox full, dropping event");
                Err(SubflowError::InboxFull)
            }
            Err(TrySendError::Disconnected(_)) => Err(SubflowError::InboxClosed),
        }
    }
}

#[derive(Debug)]
pub struct Inbox {
    rx: Receiver<InboundEvent>,
}

impl Inbox {
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    pub fn try_next(&self) -> Option<InboundEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }
}
