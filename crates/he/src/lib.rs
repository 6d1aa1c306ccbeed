//! BFV-style leveled homomorphic encryption
//!
//! Just enough of the scheme for the FPSI online protocol: batched
//! plaintext slots, public-key encryption, ciphertext addition and
//! negation, plaintext multiplication (slot extraction) and scaled
//! plaintext addition (blinding and masking). There is no
//! ciphertext-ciphertext multiplication and therefore no relinearization;
//! a single NTT-friendly coefficient prime sized for plaintext products
//! stands in for a modulus chain.
//!
//! Polynomials are kept in the NTT (evaluation) domain throughout, so all
//! homomorphic operations are coefficient-wise; only decryption and
//! batching cross domains.

mod ciphertext;
mod context;
mod encoding;
mod error;
mod ntt;
mod params;

pub use ciphertext::{Ciphertext, Plaintext, PlaintextNtt};
pub use context::{Decryptor, Encryptor, Evaluator, HeContext, PublicKey, SecretKey};
pub use encoding::BatchEncoder;
pub use error::{HeError, Result};
pub use params::BfvParams;
