//! Primitive error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PrimitiveError {
    #[error("protocol error: {0}")]
    Protocol(#[from] fpsi_protocol::ProtocolError),

    #[error("he error: {0}")]
    He(#[from] fpsi_he::HeError),

    #[error("share vectors have mismatched lengths: {a} vs {b}")]
    ShareLengthMismatch { a: usize, b: usize },

    #[error("cannot aggregate an empty share vector")]
    EmptyShares,
}

pub type Result<T> = std::result::Result<T, PrimitiveError>;
