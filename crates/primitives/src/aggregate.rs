//! Homomorphic masked equality aggregate
//!
//! The Receiver ships its share_a bits encrypted one per ciphertext; the
//! Sender, holding the matching share_b bits, homomorphically accumulates
//! share_a_i ⊕ share_b_i — the per-group equality bits — and hides the
//! total under a small additive mask. The Receiver removes the mask after
//! decryption and reads off the match count.

use rand::{Rng, RngCore};

use fpsi_he::{Ciphertext, Decryptor, Encryptor, Evaluator, HeContext};

use crate::error::{PrimitiveError, Result};

/// Exclusive upper bound on the random mask. It only needs to dominate
/// the aggregate itself, which never exceeds the slot count.
pub const MASK_RANGE: u64 = 1000;

/// Receiver side: encrypt each share_a bit into slot 0 of its own
/// ciphertext.
pub fn encrypt_equality_shares<R: RngCore>(
    ctx: &HeContext,
    encryptor: &Encryptor<'_>,
    shares_a: &[u8],
    rng: &mut R,
) -> Result<Vec<Ciphertext>> {
    shares_a
        .iter()
        .map(|&a| {
            let plain = ctx.encoder().encode(&[a as u64])?;
            Ok(encryptor.encrypt(&plain, rng))
        })
        .collect()
}

/// Sender side: Σ_i (share_b_i = 0 ? Enc(a_i) : 1 - Enc(a_i)) plus a
/// random mask, all in slot 0. Returns the ciphertext and the mask, which
/// travels in the clear.
pub fn masked_equality_sum<R: RngCore>(
    ctx: &HeContext,
    evaluator: &Evaluator<'_>,
    enc_shares_a: &[Ciphertext],
    shares_b: &[u8],
    rng: &mut R,
) -> Result<(Ciphertext, u64)> {
    if enc_shares_a.len() != shares_b.len() {
        return Err(PrimitiveError::ShareLengthMismatch {
            a: enc_shares_a.len(),
            b: shares_b.len(),
        });
    }
    if enc_shares_a.is_empty() {
        return Err(PrimitiveError::EmptyShares);
    }

    let one = ctx.to_ntt(&ctx.encoder().encode(&[1])?);

    let mut acc: Option<Ciphertext> = None;
    for (enc_a, &b) in enc_shares_a.iter().zip(shares_b) {
        let mut term = enc_a.clone();
        if b == 1 {
            // a ⊕ 1 = 1 - a
            evaluator.negate_inplace(&mut term);
            evaluator.add_plain_scaled_inplace(&mut term, &one, 1);
        }
        match acc.as_mut() {
            Some(sum) => evaluator.add_inplace(sum, &term),
            None => acc = Some(term),
        }
    }

    let mask = rng.gen_range(0..MASK_RANGE);
    let mut sum = acc.expect("non-empty shares");
    evaluator.add_plain_scaled_inplace(&mut sum, &one, mask);
    Ok((sum, mask))
}

/// Receiver side: decrypt the aggregate and strip the mask modulo the
/// plain modulus.
pub fn recover_match_count(
    ctx: &HeContext,
    decryptor: &Decryptor<'_>,
    masked_sum: &Ciphertext,
    mask: u64,
) -> u64 {
    let t = ctx.params().t;
    let value = decryptor.decrypt_slot(masked_sum, 0);
    (value + t - mask % t) % t
}
