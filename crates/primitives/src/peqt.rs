//! Secret-shared and any-one private equality tests

use std::io::{Read, Write};

use rand::RngCore;

use fpsi_protocol::Channel;

use crate::error::Result;

/// Produce an XOR sharing of the equality bit: share_a ⊕ share_b = 1 iff
/// x = y. In this protocol the shares are generated by the Receiver, which
/// keeps share_a and hands share_b to the Sender.
pub fn generate_shares<R: RngCore>(x: u8, y: u8, rng: &mut R) -> (u8, u8) {
    let equal = (x == y) as u8;
    let share_a = (rng.next_u32() & 1) as u8;
    let share_b = share_a ^ equal;
    (share_a, share_b)
}

pub fn generate_shares_batch<R: RngCore>(
    xs: &[u8],
    ys: &[u8],
    rng: &mut R,
) -> (Vec<u8>, Vec<u8>) {
    debug_assert_eq!(xs.len(), ys.len());
    let mut shares_a = Vec::with_capacity(xs.len());
    let mut shares_b = Vec::with_capacity(xs.len());
    for (&x, &y) in xs.iter().zip(ys) {
        let (a, b) = generate_shares(x, y, rng);
        shares_a.push(a);
        shares_b.push(b);
    }
    (shares_a, shares_b)
}

/// Sender half of the any-one test: masks its flag vector, ships it, and
/// unmasks the returned bit. Both parties hold the same flag vector in
/// this protocol (the e-flags were exchanged round by round); the masking
/// only hides individual positions from the transcript.
pub fn any_one_sender<S: Read + Write, R: RngCore>(
    flags: &[u8],
    chl: &mut Channel<S>,
    rng: &mut R,
) -> Result<bool> {
    let masks: Vec<u8> = flags
        .iter()
        .map(|_| (rng.next_u32() & 1) as u8)
        .collect();
    let masked: Vec<u8> = flags.iter().zip(&masks).map(|(&f, &m)| f ^ m).collect();
    chl.send_raw(&masked)?;
    chl.flush()?;

    let masked_result = chl.recv_u8()?;
    let mask_or = masks.iter().fold(0u8, |acc, &m| acc | m);
    Ok(masked_result ^ mask_or == 1)
}

/// Receiver half: recovers the mask bits from the masked vector (the flag
/// vectors agree), returns the masked OR, and reports its own result.
pub fn any_one_receiver<S: Read + Write>(flags: &[u8], chl: &mut Channel<S>) -> Result<bool> {
    let mut masked = vec![0u8; flags.len()];
    chl.recv_raw(&mut masked)?;

    let flag_or = flags.iter().fold(0u8, |acc, &f| acc | f);
    let mask_or = masked
        .iter()
        .zip(flags)
        .fold(0u8, |acc, (&m, &f)| acc | (m ^ f));
    chl.send_u8(flag_or ^ mask_or)?;
    chl.flush()?;

    Ok(flag_or == 1)
}
