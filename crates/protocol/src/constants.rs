//! Protocol constants

/// Packed ciphertexts in flight before an acknowledgement is required.
pub const BATCH_SIZE: usize = 16;

/// Acknowledgement token for one ciphertext batch.
pub const ACK_TOKEN: &str = "ACK";

/// Upper bound on any length-prefixed payload. A prefix beyond this is a
/// framing error, not an allocation request.
pub const MAX_FRAME_BYTES: u64 = 1 << 30;

/// Synchronization token sent after batch `k`.
pub fn batch_token(batch: usize) -> String {
    format!("BATCH_{batch}")
}
