//! FPSI party engines
//!
//! The Receiver publishes its set obliviously during the offline phase
//! (E-LSH IDs, band-OKVS encoding, packed ciphertexts, public key); the
//! Sender then drives one online sub-protocol per query, at the end of
//! which the Receiver has learned exactly the queries within the Hamming
//! threshold of its own vectors and the Sender has learned nothing about
//! which of its queries matched what.

mod error;
mod params;
mod receiver;
mod sender;
mod stats;

pub use error::{EngineError, Result};
pub use params::{ProtocolParams, MAX_ENCODE_ATTEMPTS, STATS_FILE};
pub use receiver::FpsiReceiver;
pub use sender::FpsiSender;
pub use stats::{Role, RunStats};
