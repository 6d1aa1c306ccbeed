//! FPSI wire protocol
//!
//! A blocking, ordered channel with little-endian framing and byte
//! accounting, plus the batch-synchronization tokens used while streaming
//! packed ciphertexts during the offline phase.

mod channel;
mod constants;
mod error;

pub use channel::Channel;
pub use constants::{batch_token, ACK_TOKEN, BATCH_SIZE, MAX_FRAME_BYTES};
pub use error::{ProtocolError, Result};
