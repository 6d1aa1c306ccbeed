//! HE error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HeError {
    #[error("too many values for batching: {len} > {slots}")]
    TooManyValues { len: usize, slots: usize },

    #[error("plaintext value {0} is not reduced modulo the plain modulus")]
    PlainValueOutOfRange(u64),

    #[error("serialized polynomial degree mismatch: expected {expected}, got {got}")]
    DegreeMismatch { expected: u32, got: u32 },

    #[error("serialized buffer truncated: need {need} bytes, have {have}")]
    BufferTruncated { need: usize, have: usize },

    #[error("serialized coefficient exceeds the coefficient modulus")]
    CoefficientOutOfRange,
}

pub type Result<T> = std::result::Result<T, HeError>;
