//! Binary vectors stored one bit per byte

use rand::RngCore;

/// Draw a uniformly random d-dimensional binary vector.
pub fn random_binary_vector<R: RngCore>(d: usize, rng: &mut R) -> Vec<u8> {
    (0..d).map(|_| (rng.next_u32() & 1) as u8).collect()
}

/// Derive a vector at exactly `distance` Hamming distance from `base` by
/// flipping a uniformly chosen set of coordinates (Fisher-Yates selection).
/// `distance` is clamped to the dimension.
pub fn vector_with_distance<R: RngCore>(base: &[u8], distance: usize, rng: &mut R) -> Vec<u8> {
    let d = base.len();
    let distance = distance.min(d);

    let mut positions: Vec<usize> = (0..d).collect();
    for i in (1..d).rev() {
        let j = (rng.next_u64() % (i as u64 + 1)) as usize;
        positions.swap(i, j);
    }

    let mut vec = base.to_vec();
    for &pos in positions.iter().take(distance) {
        vec[pos] = 1 - vec[pos];
    }
    vec
}

/// Hamming distance between two binary vectors, over the shared prefix if
/// the lengths differ.
pub fn hamming_distance(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).filter(|(x, y)| x != y).count()
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;

    #[test]
    fn test_random_vector_is_binary() {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let v = random_binary_vector(256, &mut rng);
        assert_eq!(v.len(), 256);
        assert!(v.iter().all(|&b| b <= 1));
    }

    #[test]
    fn test_vector_with_distance_exact() {
        let mut rng = ChaCha20Rng::seed_from_u64(2);
        let base = random_binary_vector(128, &mut rng);
        for r in [0, 1, 10, 128] {
            let other = vector_with_distance(&base, r, &mut rng);
            assert_eq!(hamming_distance(&base, &other), r);
        }
    }

    #[test]
    fn test_distance_clamped_to_dimension() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let base = vec![0u8; 16];
        let other = vector_with_distance(&base, 100, &mut rng);
        assert_eq!(hamming_distance(&base, &other), 16);
    }

    #[test]
    fn test_hamming_distance() {
        assert_eq!(hamming_distance(&[0, 1, 0, 1], &[0, 1, 0, 1]), 0);
        assert_eq!(hamming_distance(&[0, 0, 0, 0], &[1, 1, 1, 1]), 4);
        assert_eq!(hamming_distance(&[1, 0, 1], &[1, 1, 0]), 2);
    }
}
