//! Protocol error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("length prefix {len} exceeds frame limit {max}")]
    FrameTooLarge { len: u64, max: u64 },

    #[error("token is not valid utf-8")]
    InvalidToken,

    #[error("batch synchronization failed: expected {expected:?}, got {got:?}")]
    BatchSync { expected: String, got: String },
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
