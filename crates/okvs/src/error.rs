//! OKVS error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OkvsError {
    #[error("no band length defined for {0} items (maximum 2^24)")]
    TooManyItems(usize),

    #[error("invalid okvs geometry: n_items={n_items}, m={m}, band_length={band_length}")]
    InvalidGeometry {
        n_items: usize,
        m: usize,
        band_length: usize,
    },

    #[error("expected {expected} key/value pairs, got {got}")]
    InputSizeMismatch { expected: usize, got: usize },

    #[error("linear system is singular; re-encode with a fresh seed")]
    SingularSystem,
}

pub type Result<T> = std::result::Result<T, OkvsError>;
