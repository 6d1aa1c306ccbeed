//! Simplified 1-out-of-2 oblivious transfer
//!
//! The sender masks each message under a fresh 128-bit key with an AES
//! keystream and ships both encryptions followed by both keys; the
//! receiver expands only the key matching its choice bit. This keeps the
//! send/receive contract of a real OT but leaks the unchosen message to a
//! receiver that deviates; a deployment substitutes an OT extension
//! behind the same interface.

use std::io::{Read, Write};

use aes::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};
use aes::Aes128;
use rand::RngCore;

use fpsi_core::Block;
use fpsi_protocol::Channel;

use crate::error::Result;

/// XOR `data` with the AES-CTR keystream under `key`.
fn mask_bytes(key: Block, data: &[u8]) -> Vec<u8> {
    let cipher = Aes128::new(GenericArray::from_slice(&key.to_bytes()));
    let mut out = Vec::with_capacity(data.len());
    for (i, chunk) in data.chunks(16).enumerate() {
        let mut block = GenericArray::clone_from_slice(&(i as u128).to_le_bytes());
        cipher.encrypt_block(&mut block);
        out.extend(chunk.iter().zip(block.iter()).map(|(&d, &k)| d ^ k));
    }
    out
}

/// Transfer one of two equally sized byte payloads.
pub fn ot_send<S: Read + Write, R: RngCore>(
    chl: &mut Channel<S>,
    msg0: &[u8],
    msg1: &[u8],
    rng: &mut R,
) -> Result<()> {
    let k0 = Block::random(rng);
    let k1 = Block::random(rng);

    chl.send_bytes(&mask_bytes(k0, msg0))?;
    chl.send_bytes(&mask_bytes(k1, msg1))?;
    chl.send_block(k0)?;
    chl.send_block(k1)?;
    chl.flush()?;
    Ok(())
}

/// Receive the payload selected by `choice`.
pub fn ot_receive<S: Read + Write>(chl: &mut Channel<S>, choice: bool) -> Result<Vec<u8>> {
    let enc0 = chl.recv_bytes()?;
    let enc1 = chl.recv_bytes()?;
    let k0 = chl.recv_block()?;
    let k1 = chl.recv_block()?;

    let (enc, key) = if choice { (enc1, k1) } else { (enc0, k0) };
    Ok(mask_bytes(key, &enc))
}
