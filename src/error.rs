//! Error taxonomy for the biometric engine
//!
//! Every engine call returns one of these typed errors. A negative match is
//! NOT an error: it comes back as `Ok(MatchOutcome { matched: false, .. })`.

use crate::validation::ValidationError;
use thiserror::Error;

/// Result alias used by the engine APIs
pub type EngineResult<T> = Result<T, EngineError>;

/// Template framing and payload errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Template data truncated: needed {needed} more bytes at offset {offset}")]
    Truncated { offset: usize, needed: usize },

    #[error("Unrecognized template framing")]
    BadMagic,

    #[error("Unsupported template version: {0}")]
    UnsupportedVersion(u8),

    #[error("Template checksum mismatch")]
    ChecksumMismatch,

    #[error("Unknown template format tag")]
    UnknownFormatTag,

    #[error("Template payload is empty")]
    EmptyPayload,

    #[error("Invalid template field: {0}")]
    InvalidField(String),

    #[error("Unexpected {0} trailing bytes after template")]
    TrailingBytes(usize),
}

/// Failures reported by a capture device
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("Device is not open")]
    NotOpen,

    #[error("Device disconnected")]
    Disconnected,

    #[error("Capture timed out")]
    Timeout,

    #[error("Device protocol error: {0}")]
    Protocol(String),

    #[error("Enrollment stage out of sequence: expected {expected}, got {got}")]
    OutOfSequence { expected: u32, got: u32 },
}

/// Failures reported by the matching algorithm
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MatcherError {
    /// Probe or candidate carries too few minutiae to compare
    #[error("No usable features in sample")]
    NoUsableFeatures,

    #[error("Incompatible algorithm families: probe {probe}, candidate {candidate}")]
    IncompatibleFamily { probe: String, candidate: String },

    #[error("Matcher failure: {0}")]
    Internal(String),
}

/// Errors surfaced by enrollment, verification and identification
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Device not ready: {0}")]
    NotReady(String),

    #[error("Device busy: another operation is outstanding on this handle")]
    DeviceBusy,

    #[error("Template decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("Gallery contains no decodable templates")]
    EmptyGallery,

    #[error("No enrollment data available")]
    NoData,

    #[error("Operation '{op}' not allowed in stage {stage}")]
    InvalidState { op: &'static str, stage: String },

    #[error("Hardware error: {0}")]
    Hardware(#[from] DeviceError),

    #[error("Matcher error: {0}")]
    Matcher(#[from] MatcherError),

    #[error("Operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl EngineError {
    /// Stable short code for callers that map errors to UI messages
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::NotReady(_) => "not_ready",
            EngineError::DeviceBusy => "device_busy",
            EngineError::Decode(_) => "decode_error",
            EngineError::EmptyGallery => "empty_gallery",
            EngineError::NoData => "no_data",
            EngineError::InvalidState { .. } => "invalid_state",
            EngineError::Hardware(_) => "hardware_error",
            EngineError::Matcher(_) => "matcher_error",
            EngineError::Cancelled => "cancelled",
            EngineError::Validation(_) => "invalid_input",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_conversions() {
        let err: EngineError = DecodeError::BadMagic.into();
        assert_eq!(err.code(), "decode_error");

        let err: EngineError = DeviceError::Timeout.into();
        assert_eq!(err, EngineError::Hardware(DeviceError::Timeout));

        let err: EngineError = MatcherError::NoUsableFeatures.into();
        assert_eq!(err.code(), "matcher_error");
    }

    #[test]
    fn test_messages_are_descriptive() {
        let err = EngineError::InvalidState {
            op: "add_sample",
            stage: "Completed".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Operation 'add_sample' not allowed in stage Completed"
        );
        assert_eq!(
            DecodeError::Truncated {
                offset: 4,
                needed: 2
            }
            .to_string(),
            "Template data truncated: needed 2 more bytes at offset 4"
        );
    }
}
