//! Band OKVS encoder/decoder

use aes::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};
use aes::Aes128;
use rand::RngCore;

use fpsi_core::Block;

use crate::error::{OkvsError, Result};

/// Row-count expansion factor: m >= (1 + EPSILON) * n.
const EPSILON: f64 = 0.05;

/// Minimum slack rows over the item count. The 5% expansion alone leaves
/// too few spare columns for the linear system to stay regular on small
/// inputs.
const MIN_ROW_SLACK: usize = 64;

/// Band length as a step function of the item count. Inputs beyond 2^24
/// items are rejected.
pub fn band_length_for(n_items: usize) -> Result<usize> {
    match n_items {
        n if n <= 1 << 14 => Ok(339),
        n if n <= 1 << 16 => Ok(350),
        n if n <= 1 << 18 => Ok(366),
        n if n <= 1 << 20 => Ok(377),
        n if n <= 1 << 22 => Ok(396),
        n if n <= 1 << 24 => Ok(413),
        n => Err(OkvsError::TooManyItems(n)),
    }
}

/// Encoded row count for an item count: ceil((1 + EPSILON) * n) with the
/// minimum slack floor.
fn okvs_row_count(n_items: usize) -> usize {
    let expanded = ((1.0 + EPSILON) * n_items as f64).ceil() as usize;
    expanded.max(n_items + MIN_ROW_SLACK)
}

/// One reduced row of the banded system: the pivot column, the window
/// origin, the remaining band bits (window-relative) and the running value.
struct SolvedRow {
    pivot: usize,
    start: usize,
    bits: Vec<u64>,
    value: Block,
}

/// Band OKVS codec. Sized and seeded deterministically, so a decoder built
/// from the wire parameters agrees with the encoder.
pub struct BandOkvs {
    n_items: usize,
    m: usize,
    band_length: usize,
    prf: Aes128,
}

impl BandOkvs {
    /// Prepare a codec with explicit geometry (the decoder path: all four
    /// values arrive on the wire).
    pub fn new(n_items: usize, m: usize, band_length: usize, seed: Block) -> Result<Self> {
        if n_items == 0 || band_length == 0 || band_length > m || m < n_items {
            return Err(OkvsError::InvalidGeometry {
                n_items,
                m,
                band_length,
            });
        }
        // Reject sizes the band-length table does not cover.
        band_length_for(n_items)?;

        let prf = Aes128::new(GenericArray::from_slice(&seed.to_bytes()));
        Ok(Self {
            n_items,
            m,
            band_length,
            prf,
        })
    }

    /// Prepare a codec with the derived geometry (the encoder path).
    pub fn with_auto_params(n_items: usize, seed: Block) -> Result<Self> {
        let m = okvs_row_count(n_items);
        let band_length = band_length_for(n_items)?.min(m);
        Self::new(n_items, m, band_length, seed)
    }

    /// Number of encoded rows.
    pub fn size(&self) -> usize {
        self.m
    }

    pub fn n_items(&self) -> usize {
        self.n_items
    }

    pub fn band_length(&self) -> usize {
        self.band_length
    }

    /// Derive a key's band: the starting row and `band_length` selection
    /// bits. Bit 0 is forced set so every band is non-empty.
    fn band_of(&self, key: Block) -> (usize, Vec<u64>) {
        let mut block = GenericArray::clone_from_slice(&key.to_bytes());
        self.prf.encrypt_block(&mut block);
        let h = u64::from_le_bytes(block[..8].try_into().expect("8 bytes"));
        let start = (h % (self.m - self.band_length + 1) as u64) as usize;

        let words = self.band_length.div_ceil(64);
        let mut bits = Vec::with_capacity(words);
        let mut counter = 0u128;
        while bits.len() < words {
            counter += 1;
            let tweaked = key ^ Block(counter);
            let mut block = GenericArray::clone_from_slice(&tweaked.to_bytes());
            self.prf.encrypt_block(&mut block);
            for chunk in block.chunks_exact(8) {
                if bits.len() < words {
                    bits.push(u64::from_le_bytes(chunk.try_into().expect("8 bytes")));
                }
            }
        }

        // Mask off bits past the band length and pin the origin bit.
        let tail_bits = self.band_length % 64;
        if tail_bits != 0 {
            let last = bits.len() - 1;
            bits[last] &= (1u64 << tail_bits) - 1;
        }
        bits[0] |= 1;

        (start, bits)
    }

    /// Encode the key/value pairs into `size()` rows. Rows not pinned by
    /// the system are filled from `rng`. Fails if the banded system is
    /// singular; callers re-seed and retry.
    pub fn encode<R: RngCore>(
        &self,
        keys: &[Block],
        values: &[Block],
        rng: &mut R,
    ) -> Result<Vec<Block>> {
        if keys.len() != self.n_items || values.len() != self.n_items {
            return Err(OkvsError::InputSizeMismatch {
                expected: self.n_items,
                got: keys.len().max(values.len()),
            });
        }

        let mut items: Vec<(usize, Vec<u64>, Block)> = keys
            .iter()
            .zip(values)
            .map(|(&key, &value)| {
                let (start, bits) = self.band_of(key);
                (start, bits, value)
            })
            .collect();
        items.sort_by_key(|&(start, _, _)| start);

        // Forward elimination. Processing in start order keeps every pivot
        // row's window at or before the row it reduces, so band XORs only
        // ever shift in one direction.
        let mut pivot_of = vec![usize::MAX; self.m];
        let mut solved: Vec<SolvedRow> = Vec::with_capacity(self.n_items);

        for (start, mut bits, mut value) in items {
            loop {
                let Some(offset) = first_set_bit(&bits) else {
                    if value == Block::ZERO {
                        // Duplicate key with a consistent value.
                        break;
                    }
                    return Err(OkvsError::SingularSystem);
                };
                let col = start + offset;
                debug_assert!(col < self.m);

                let pivot = pivot_of[col];
                if pivot == usize::MAX {
                    pivot_of[col] = solved.len();
                    solved.push(SolvedRow {
                        pivot: col,
                        start,
                        bits,
                        value,
                    });
                    break;
                }

                let row = &solved[pivot];
                xor_shifted(&mut bits, &row.bits, start - row.start);
                value ^= row.value;
            }
        }

        // Free rows take random fill; pivot rows are back-substituted in
        // decreasing pivot order so every non-pivot column a row touches is
        // already final.
        let mut encoded: Vec<Block> = (0..self.m).map(|_| Block::random(rng)).collect();

        let mut order: Vec<usize> = (0..solved.len()).collect();
        order.sort_by_key(|&i| std::cmp::Reverse(solved[i].pivot));

        for i in order {
            let row = &solved[i];
            let mut acc = row.value;
            for offset in set_bits(&row.bits, self.band_length) {
                let col = row.start + offset;
                if col != row.pivot {
                    acc ^= encoded[col];
                }
            }
            encoded[row.pivot] = acc;
        }

        Ok(encoded)
    }

    /// Recover the value for a key. Total: a key that was never encoded
    /// yields the XOR of rows the decoder cannot predict.
    pub fn decode(&self, key: Block, encoded: &[Block]) -> Block {
        let (start, bits) = self.band_of(key);
        let mut acc = Block::ZERO;
        for offset in set_bits(&bits, self.band_length) {
            acc ^= encoded[start + offset];
        }
        acc
    }
}

fn first_set_bit(bits: &[u64]) -> Option<usize> {
    for (word_idx, &word) in bits.iter().enumerate() {
        if word != 0 {
            return Some(word_idx * 64 + word.trailing_zeros() as usize);
        }
    }
    None
}

/// Iterate the set bit offsets of a band, lowest first.
fn set_bits(bits: &[u64], band_length: usize) -> impl Iterator<Item = usize> + '_ {
    bits.iter()
        .enumerate()
        .flat_map(|(word_idx, &word)| {
            (0..64).filter_map(move |bit| {
                if word & (1u64 << bit) != 0 {
                    Some(word_idx * 64 + bit)
                } else {
                    None
                }
            })
        })
        .filter(move |&offset| offset < band_length)
}

/// dst ^= src >> shift, where bit j of dst and bit j + shift of src refer
/// to the same column.
fn xor_shifted(dst: &mut [u64], src: &[u64], shift: usize) {
    let word_shift = shift / 64;
    let bit_shift = shift % 64;

    for j in 0..dst.len() {
        let k = j + word_shift;
        if k >= src.len() {
            break;
        }
        let mut word = src[k] >> bit_shift;
        if bit_shift != 0 && k + 1 < src.len() {
            word |= src[k + 1] << (64 - bit_shift);
        }
        dst[j] ^= word;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;

    fn test_seed(tag: u64) -> Block {
        Block::new(0x5eed_0000 + tag, 0)
    }

    #[test]
    fn test_band_length_table() {
        assert_eq!(band_length_for(1).unwrap(), 339);
        assert_eq!(band_length_for(1 << 14).unwrap(), 339);
        assert_eq!(band_length_for((1 << 14) + 1).unwrap(), 350);
        assert_eq!(band_length_for(1 << 16).unwrap(), 350);
        assert_eq!(band_length_for(1 << 18).unwrap(), 366);
        assert_eq!(band_length_for(1 << 20).unwrap(), 377);
        assert_eq!(band_length_for(1 << 22).unwrap(), 396);
        assert_eq!(band_length_for(1 << 24).unwrap(), 413);
        assert!(matches!(
            band_length_for((1 << 24) + 1),
            Err(OkvsError::TooManyItems(_))
        ));
    }

    #[test]
    fn test_roundtrip_thousand_pairs() {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let n = 1000;
        let keys: Vec<Block> = (0..n).map(|_| Block::random(&mut rng)).collect();
        let values: Vec<Block> = (0..n as u64).map(|i| Block::new(i, 0)).collect();

        let okvs = BandOkvs::with_auto_params(n, test_seed(1)).unwrap();
        let encoded = okvs.encode(&keys, &values, &mut rng).unwrap();
        assert_eq!(encoded.len(), okvs.size());

        for (key, value) in keys.iter().zip(&values) {
            assert_eq!(okvs.decode(*key, &encoded), *value);
        }
    }

    #[test]
    fn test_unknown_keys_decode_to_noise() {
        let mut rng = ChaCha20Rng::seed_from_u64(2);
        let n = 1000;
        let keys: Vec<Block> = (0..n).map(|_| Block::random(&mut rng)).collect();
        let values: Vec<Block> = (0..n as u64).map(|i| Block::new(i, 0)).collect();
        let value_set: HashSet<Block> = values.iter().copied().collect();

        let okvs = BandOkvs::with_auto_params(n, test_seed(2)).unwrap();
        let encoded = okvs.encode(&keys, &values, &mut rng).unwrap();

        let mut collisions = 0;
        for _ in 0..10_000 {
            let fresh = Block::random(&mut rng);
            if value_set.contains(&okvs.decode(fresh, &encoded)) {
                collisions += 1;
            }
        }
        // A random 128-bit row lands in a 1000-element set with negligible
        // probability.
        assert_eq!(collisions, 0);
    }

    #[test]
    fn test_tiny_input_encodes() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let keys: Vec<Block> = (0..8).map(|_| Block::random(&mut rng)).collect();
        let values: Vec<Block> = (0..8u64).map(|i| Block::new(i, 7)).collect();

        let okvs = BandOkvs::with_auto_params(8, test_seed(3)).unwrap();
        assert!(okvs.band_length() <= okvs.size());
        let encoded = okvs.encode(&keys, &values, &mut rng).unwrap();
        for (key, value) in keys.iter().zip(&values) {
            assert_eq!(okvs.decode(*key, &encoded), *value);
        }
    }

    #[test]
    fn test_consistent_duplicates_are_tolerated() {
        let mut rng = ChaCha20Rng::seed_from_u64(4);
        let key = Block::random(&mut rng);
        let keys = vec![key, key];
        let values = vec![Block::new(9, 0), Block::new(9, 0)];

        let okvs = BandOkvs::with_auto_params(2, test_seed(4)).unwrap();
        let encoded = okvs.encode(&keys, &values, &mut rng).unwrap();
        assert_eq!(okvs.decode(key, &encoded), Block::new(9, 0));
    }

    #[test]
    fn test_conflicting_duplicates_fail() {
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        let key = Block::random(&mut rng);
        let keys = vec![key, key];
        let values = vec![Block::new(1, 0), Block::new(2, 0)];

        let okvs = BandOkvs::with_auto_params(2, test_seed(5)).unwrap();
        assert!(matches!(
            okvs.encode(&keys, &values, &mut rng),
            Err(OkvsError::SingularSystem)
        ));
    }

    #[test]
    fn test_decoder_from_wire_params_agrees() {
        let mut rng = ChaCha20Rng::seed_from_u64(6);
        let n = 200;
        let keys: Vec<Block> = (0..n).map(|_| Block::random(&mut rng)).collect();
        let values: Vec<Block> = (0..n as u64).map(|i| Block::new(i, 1)).collect();

        let seed = test_seed(6);
        let encoder = BandOkvs::with_auto_params(n, seed).unwrap();
        let encoded = encoder.encode(&keys, &values, &mut rng).unwrap();

        // The decoder sees only (n_items, m, band_length, seed).
        let decoder =
            BandOkvs::new(encoder.n_items(), encoder.size(), encoder.band_length(), seed).unwrap();
        for (key, value) in keys.iter().zip(&values) {
            assert_eq!(decoder.decode(*key, &encoded), *value);
        }
    }

    #[test]
    fn test_invalid_geometry_rejected() {
        let seed = test_seed(7);
        assert!(BandOkvs::new(0, 10, 5, seed).is_err());
        assert!(BandOkvs::new(10, 5, 6, seed).is_err());
        assert!(BandOkvs::new(10, 8, 8, seed).is_err());
    }
}
