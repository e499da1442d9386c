//! Error type for payload encoding and schema translation.

/// Everything that can go wrong turning bytes into messages or back.
///
/// None of these are faults of the gateway: the listener and bridge log them
/// and drop the offending frame or command.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Hex input with an odd number of digits.
    #[error("odd-length hex string ({0} chars)")]
    OddLength(usize),

    /// A character outside `[0-9A-Fa-f]` in hex input.
    #[error("invalid hex character {c:?} at index {index}")]
    InvalidHex { c: char, index: usize },

    /// The encoded payload does not fit in one send command.
    #[error("hex payload is {len} chars, budget is {budget}")]
    PayloadTooLarge { len: usize, budget: usize },

    /// Malformed JSON, or JSON of the wrong shape.
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// An actuator name that is in neither the compact nor verbose table.
    #[error("unknown actuator {0:?}")]
    UnknownActuator(String),

    /// An actuator command payload other than ON or OFF.
    #[error("invalid actuator state {0:?}, expected ON or OFF")]
    InvalidState(String),

    /// A field present with a value the schema cannot use.
    #[error("invalid field {field}: {reason}")]
    InvalidField { field: String, reason: String },
}

impl CodecError {
    pub(crate) fn invalid_field(field: &str, reason: impl Into<String>) -> Self {
        CodecError::InvalidField {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Convenience alias used throughout the codec.
pub type Result<T> = std::result::Result<T, CodecError>;
