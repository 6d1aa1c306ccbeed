//! Engine error types
//!
//! Everything fatal surfaces as one error kind with an explanatory
//! message; no partial recovery is attempted across a failed query.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("e-lsh error: {0}")]
    Elsh(#[from] fpsi_elsh::ElshError),

    #[error("okvs error: {0}")]
    Okvs(#[from] fpsi_okvs::OkvsError),

    #[error("he error: {0}")]
    He(#[from] fpsi_he::HeError),

    #[error("protocol error: {0}")]
    Protocol(#[from] fpsi_protocol::ProtocolError),

    #[error("primitive error: {0}")]
    Primitive(#[from] fpsi_primitives::PrimitiveError),

    #[error("invalid parameters: {0}")]
    InvalidParameter(String),

    #[error("vector has dimension {got}, expected {expected}")]
    DataDimensionMismatch { expected: usize, got: usize },

    #[error("okvs encoding failed after {attempts} seeds")]
    OkvsEncodingFailed { attempts: usize },

    #[error("offline phase has not completed")]
    OfflineIncomplete,

    #[error("negative query count {0} announced by peer")]
    InvalidQueryCount(i32),

    #[error("decrypted slot {slot} holds {value}, outside the expected bit range")]
    DecryptedBitOutOfRange { slot: usize, value: u64 },

    #[error("homomorphic match count {got} disagrees with local equality count {expected}")]
    AggregateMismatch { expected: u64, got: u64 },

    #[error("payload has {got} bytes, expected {expected}")]
    UnexpectedPayloadLength { expected: usize, got: usize },
}

pub type Result<T> = std::result::Result<T, EngineError>;
