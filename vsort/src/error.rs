use thiserror::Error;

use crate::register::RegisterWidth;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeatureError {
    #[error("unknown target feature `{0}`")]
    UnknownFeature(String),

    #[error("empty target feature list")]
    Empty,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// More values than one 512-bit register can hold.
    #[error("{len} values of {elem_bytes} bytes do not fit in a 64 byte register")]
    TooManyValues { len: usize, elem_bytes: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("{lanes} lanes of {elem_bytes} bytes exceed the widest register")]
    TooWide { lanes: usize, elem_bytes: usize },

    #[error("round {round}: lane {lane} points at {target}, outside the {lanes} sorted lanes")]
    OutOfRange {
        round: usize,
        lane: usize,
        target: usize,
        lanes: usize,
    },

    #[error("round {round}: lane {lane} is not paired symmetrically")]
    NotAMatching { round: usize, lane: usize },

    #[error("round {round}: no {kind} lowering for a {width} register with {features}")]
    Unsupported {
        round: usize,
        kind: &'static str,
        width: RegisterWidth,
        features: String,
    },

    #[error(transparent)]
    Buffer(#[from] BufferError),

    #[error("expected {expected} values, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
}
