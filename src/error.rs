//! Error taxonomy for the detection core.
//!
//! Fatal conditions are typed so callers can tell a bad configuration from a
//! broken call sequence. End of stream is not an error (`Ok(None)` from a
//! source) and degraded conditions are logged, never returned.

use thiserror::Error;

/// Invalid configuration. Surfaced before any frame is read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{axis} of gaussian kernel should be odd and positive (got {value})")]
    InvalidKernelSize { axis: &'static str, value: i64 },

    #[error("delta_thresh must be in [0, 255) (got {0})")]
    ThresholdOutOfRange(i64),

    #[error("background model ({0}) is not supported; supported models are [\"first_frame\", \"weighted_average\"]")]
    UnsupportedBackgroundModel(String),

    #[error("end_frame ({end}) must not be less than start_frame ({start})")]
    InvalidWindow { start: u64, end: u64 },

    #[error("start_frame must be >= 1 (got {0})")]
    StartFrameTooSmall(u64),

    #[error("{field} must be >= 0 (got {value})")]
    Negative { field: &'static str, value: i64 },

    #[error("{field} must be <= {max} (got {value})")]
    OutOfRange {
        field: &'static str,
        value: i64,
        max: u64,
    },
}

/// Programmer error: the detection core was driven out of sequence or fed
/// frames that do not match its state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractViolation {
    #[error("delta requested before the background model was initialized")]
    BackgroundUninitialized,

    #[error("background model is already initialized")]
    AlreadyInitialized,

    #[error("frame is {actual_width}x{actual_height}, expected {expected_width}x{expected_height}")]
    DimensionMismatch {
        expected_width: u32,
        expected_height: u32,
        actual_width: u32,
        actual_height: u32,
    },

    #[error("expected a single-channel frame")]
    NotGrayscale,

    #[error("pixel buffer holds {actual} bytes, {expected} expected for the frame dimensions")]
    BufferLength { expected: usize, actual: usize },
}

impl ContractViolation {
    pub(crate) fn mismatch(expected: (u32, u32), actual: (u32, u32)) -> Self {
        ContractViolation::DimensionMismatch {
            expected_width: expected.0,
            expected_height: expected.1,
            actual_width: actual.0,
            actual_height: actual.1,
        }
    }
}
