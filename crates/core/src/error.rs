/// Result alias that carries the custom [`SubflowError`] type.
pub type Result<T> = std::result::Result<T, SubflowError>;

/// Common error type for the core crate.
///
/// None of these are fatal inside a tick: the engine logs them and keeps the
/// prior state.
#[derive(Debug, thiserror::Error)]
pub enum SubflowError {
    /// A numeric value fell outside its declared range.
    #[error("{what} {value} outside [{min}, {max}]")]
    Rejected {
        what: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    /// A program string without the magic header or without instructions.
    #[error("malformed program: {0}")]
    MalformedProgram(String),
    /// A single `kind:arg:duration` instruction that could not be parsed.
    #[error("malformed instruction `{0}`")]
    MalformedInstruction(String),
    /// A structured frame that failed to decode.
    #[error("failed to decode event frame: {0}")]
    Decode(#[from] serde_json::Error),
    /// Datagram payload that was not UTF-8 text.
    #[error("datagram is not valid UTF-8")]
    InvalidUtf8,
    #[error("inbox is full, event dropped")]
    InboxFull,
    #[error("inbox has been closed")]
    InboxClosed,
    /// Free-form message used by the application layer.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl SubflowError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub(crate) fn rejected(what: &'static str, value: f64, min: f64, max: f64) -> Self {
        Self::Rejected {
            what,
            value,
            min,
            max,
        }
    }
}

impl From<&str> for SubflowError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for SubflowError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
