//! Batching: plaintext slot vectors
//!
//! The plain modulus satisfies t ≡ 1 (mod 2N), so Z_t[X]/(X^N + 1) splits
//! into N copies of Z_t. Encoding places a value vector into those slots;
//! polynomial products then act slot-wise.

use crate::ciphertext::Plaintext;
use crate::error::{HeError, Result};
use crate::ntt::{mul_mod, NttTables};

pub struct BatchEncoder {
    t: u64,
    ntt: NttTables,
    /// Evaluation point of each slot, in transform order. slot_roots[k] is
    /// the image of X in slot k, so a single slot can be read back by
    /// evaluating the polynomial at that root.
    slot_roots: Vec<u64>,
}

impl BatchEncoder {
    pub fn new(n: usize, t: u64, psi_t: u64) -> Self {
        let ntt = NttTables::new(n, t, psi_t);

        let mut x = vec![0u64; n];
        x[1] = 1;
        ntt.forward(&mut x);

        Self {
            t,
            ntt,
            slot_roots: x,
        }
    }

    pub fn slot_count(&self) -> usize {
        self.ntt.n()
    }

    /// Encode up to `slot_count` values (each < t) into a plaintext;
    /// remaining slots are zero.
    pub fn encode(&self, values: &[u64]) -> Result<Plaintext> {
        let n = self.ntt.n();
        if values.len() > n {
            return Err(HeError::TooManyValues {
                len: values.len(),
                slots: n,
            });
        }
        if let Some(&bad) = values.iter().find(|&&v| v >= self.t) {
            return Err(HeError::PlainValueOutOfRange(bad));
        }

        let mut coeffs = vec![0u64; n];
        coeffs[..values.len()].copy_from_slice(values);
        self.ntt.inverse(&mut coeffs);
        Ok(Plaintext::new(coeffs))
    }

    /// Read back all slots.
    pub fn decode(&self, plain: &Plaintext) -> Vec<u64> {
        let mut slots = plain.coeffs().to_vec();
        self.ntt.forward(&mut slots);
        slots
    }

    /// Read back a single slot by evaluating the polynomial at that slot's
    /// root (Horner), avoiding a full transform.
    pub fn decode_slot(&self, plain: &Plaintext, slot: usize) -> u64 {
        let root = self.slot_roots[slot];
        let mut acc = 0u64;
        for &coeff in plain.coeffs().iter().rev() {
            acc = (mul_mod(acc, root, self.t) + coeff) % self.t;
        }
        acc
    }
}
