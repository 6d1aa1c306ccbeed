//! Entropy-based locality-sensitive hashing
//!
//! Maps a d-dimensional binary vector to L bucket IDs such that two vectors
//! within Hamming distance delta share at least one ID with high
//! probability. Each ID is the parity of the vector over one of L
//! pseudo-random k-subsets of the high-entropy dimensions, with
//! k = ceil(d / (delta + 1)).
//!
//! Both parties construct the map from the same (d, delta, L, tau)
//! parameters and the shared subset seed, so the subsets are identical on
//! both sides without any communication.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use thiserror::Error;

use fpsi_core::fnv1a_64;

/// Seed for the simulated-entropy draw and the subset shuffle. A protocol
/// deployment would derive this from a jointly agreed transcript value.
pub const SUBSET_SEED: u64 = 42;

/// Default entropy cutoff.
pub const DEFAULT_TAU: f64 = 0.5;

#[derive(Error, Debug)]
pub enum ElshError {
    #[error("dimension must be non-zero")]
    ZeroDimension,

    #[error("hash count L must be non-zero")]
    ZeroHashCount,

    #[error("vector length {got} does not match dimension {expected}")]
    DimensionMismatch { expected: usize, got: usize },
}

pub type Result<T> = std::result::Result<T, ElshError>;

/// A single bucket ID: the subset index and the parity of the vector over
/// that subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LshId {
    pub ell: u32,
    pub parity: u8,
}

impl LshId {
    /// Stable 64-bit hash of the canonical `"<ell>||<parity>"` rendering,
    /// used as the low half of the OKVS key on both sides of the wire.
    pub fn wire_hash(&self) -> u64 {
        fnv1a_64(format!("{}||{}", self.ell, self.parity).as_bytes())
    }
}

/// E-LSH configuration: dimension subsets shared by both parties.
///
/// Pure-functional after construction.
#[derive(Debug, Clone)]
pub struct ElshMap {
    d: usize,
    delta: usize,
    l: usize,
    k: usize,
    high_entropy_dims: Vec<usize>,
    subsets: Vec<Vec<usize>>,
}

impl ElshMap {
    /// Build the map for the given parameters with the default entropy
    /// cutoff.
    pub fn new(d: usize, delta: usize, l: usize) -> Result<Self> {
        Self::with_tau(d, delta, l, DEFAULT_TAU)
    }

    pub fn with_tau(d: usize, delta: usize, l: usize, tau: f64) -> Result<Self> {
        if d == 0 {
            return Err(ElshError::ZeroDimension);
        }
        if l == 0 {
            return Err(ElshError::ZeroHashCount);
        }

        let k = d.div_ceil(delta + 1);
        let high_entropy_dims = select_high_entropy_dims(d, k * l, tau);
        let subsets = generate_subsets(&high_entropy_dims, k, l);

        Ok(Self {
            d,
            delta,
            l,
            k,
            high_entropy_dims,
            subsets,
        })
    }

    pub fn d(&self) -> usize {
        self.d
    }

    pub fn delta(&self) -> usize {
        self.delta
    }

    pub fn l(&self) -> usize {
        self.l
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn subsets(&self) -> &[Vec<usize>] {
        &self.subsets
    }

    /// Compute the L IDs of a vector. Each subset contributes exactly one
    /// ID, so the result always has length L.
    pub fn compute_ids(&self, vector: &[u8]) -> Result<Vec<LshId>> {
        if vector.len() != self.d {
            return Err(ElshError::DimensionMismatch {
                expected: self.d,
                got: vector.len(),
            });
        }

        let mut ids = Vec::with_capacity(self.l);
        for (ell, subset) in self.subsets.iter().enumerate() {
            let mut parity = 0u8;
            for &dim in subset {
                parity ^= vector[dim];
            }
            ids.push(LshId {
                ell: ell as u32,
                parity,
            });
        }
        Ok(ids)
    }

    pub fn compute_ids_batch(&self, vectors: &[Vec<u8>]) -> Result<Vec<Vec<LshId>>> {
        vectors.iter().map(|v| self.compute_ids(v)).collect()
    }
}

/// Rank dimensions by simulated binary entropy and keep those above tau,
/// padding with the remaining dimensions in ascending index until at least
/// `min_dims` are kept. The Bernoulli probabilities stand in for dataset
/// statistics.
fn select_high_entropy_dims(d: usize, min_dims: usize, tau: f64) -> Vec<usize> {
    let mut rng = ChaCha20Rng::seed_from_u64(SUBSET_SEED);

    let mut entropy_dims: Vec<(f64, usize)> = (0..d)
        .map(|dim| {
            let p: f64 = rng.gen_range(0.4f64..0.6f64).clamp(0.01, 0.99);
            let entropy = -p * p.log2() - (1.0 - p) * (1.0 - p).log2();
            (entropy, dim)
        })
        .collect();

    entropy_dims.sort_by(|a, b| b.partial_cmp(a).expect("entropy is finite"));

    let mut kept = Vec::with_capacity(d);
    for &(entropy, dim) in &entropy_dims {
        if entropy > tau || kept.len() < min_dims {
            kept.push(dim);
        }
    }

    if kept.len() < min_dims {
        for dim in 0..d {
            if kept.len() >= min_dims {
                break;
            }
            if !kept.contains(&dim) {
                kept.push(dim);
            }
        }
    }

    kept
}

/// Draw L subsets of k dimensions each by shuffling the kept list with a
/// fresh seed-42 PRNG. Subsets are clamped to the kept-list size when
/// k exceeds it (small d relative to k*L).
fn generate_subsets(candidates: &[usize], k: usize, l: usize) -> Vec<Vec<usize>> {
    let mut rng = ChaCha20Rng::seed_from_u64(SUBSET_SEED);
    let size = k.min(candidates.len());

    (0..l)
        .map(|_| {
            let mut shuffled = candidates.to_vec();
            shuffled.shuffle(&mut rng);
            shuffled.truncate(size);
            shuffled
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use fpsi_core::{hamming_distance, random_binary_vector, vector_with_distance};
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;

    #[test]
    fn test_subset_size() {
        let map = ElshMap::new(128, 10, 32).unwrap();
        assert_eq!(map.k(), 12); // ceil(128 / 11)
        assert_eq!(map.subsets().len(), 32);
        for subset in map.subsets() {
            assert_eq!(subset.len(), 12);
        }
    }

    #[test]
    fn test_both_parties_agree() {
        let a = ElshMap::new(128, 10, 32).unwrap();
        let b = ElshMap::new(128, 10, 32).unwrap();
        assert_eq!(a.subsets(), b.subsets());

        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let v = random_binary_vector(128, &mut rng);
        assert_eq!(a.compute_ids(&v).unwrap(), b.compute_ids(&v).unwrap());
    }

    #[test]
    fn test_id_count_is_l() {
        let map = ElshMap::new(64, 4, 16).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(8);
        let v = random_binary_vector(64, &mut rng);
        let ids = map.compute_ids(&v).unwrap();
        assert_eq!(ids.len(), 16);
        for (ell, id) in ids.iter().enumerate() {
            assert_eq!(id.ell, ell as u32);
            assert!(id.parity <= 1);
        }
    }

    #[test]
    fn test_small_dimension_clamps_subsets() {
        // d = 16, delta = 0 gives k = 16 and k*L = 32 > d; every subset
        // falls back to a permutation of all 16 dimensions.
        let map = ElshMap::new(16, 0, 2).unwrap();
        assert_eq!(map.k(), 16);
        for subset in map.subsets() {
            assert_eq!(subset.len(), 16);
            let mut sorted = subset.clone();
            sorted.sort_unstable();
            assert_eq!(sorted, (0..16).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_close_pairs_share_an_id() {
        let map = ElshMap::new(128, 10, 32).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(9);

        for _ in 0..20 {
            let w = random_binary_vector(128, &mut rng);
            let q = vector_with_distance(&w, 3, &mut rng);
            assert!(hamming_distance(&w, &q) <= 10);

            let id_w = map.compute_ids(&w).unwrap();
            let id_q = map.compute_ids(&q).unwrap();
            let shared = id_w.iter().zip(&id_q).any(|(a, b)| a == b);
            assert!(shared, "close pair produced disjoint ID sets");
        }
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let map = ElshMap::new(32, 2, 4).unwrap();
        assert!(matches!(
            map.compute_ids(&[0u8; 16]),
            Err(ElshError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_wire_hash_matches_canonical_string() {
        let id = LshId { ell: 0, parity: 1 };
        assert_eq!(id.wire_hash(), fnv1a_64(b"0||1"));
    }
}
