//! HE context, key material and operation handles
//!
//! Each engine owns one `HeContext` and passes it by borrow to the
//! encryptor/decryptor/evaluator handles it constructs.

use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::ciphertext::{deserialize_polys, serialize_polys, Ciphertext, Plaintext, PlaintextNtt};
use crate::encoding::BatchEncoder;
use crate::error::Result;
use crate::ntt::{add_mod, mul_mod, sub_mod, NttTables};
use crate::params::BfvParams;

/// Centered binomial noise width: coefficients in [-ETA, ETA].
const ETA: u32 = 4;

/// Public encryption key (b, a) with b = -(a·s + e), NTT domain.
#[derive(Debug, Clone)]
pub struct PublicKey {
    p0: Vec<u64>,
    p1: Vec<u64>,
}

impl PublicKey {
    pub fn to_bytes(&self) -> Vec<u8> {
        serialize_polys(&[&self.p0, &self.p1])
    }

    pub fn from_bytes(bytes: &[u8], params: &BfvParams) -> Result<Self> {
        let mut polys = deserialize_polys(bytes, params, 2)?;
        let p1 = polys.pop().expect("two polys");
        let p0 = polys.pop().expect("two polys");
        Ok(Self { p0, p1 })
    }
}

/// Secret key: the ternary polynomial s in NTT domain, erased on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecretKey {
    s: Vec<u64>,
}

/// Scheme context: parameters, transform tables and the batch encoder.
pub struct HeContext {
    params: BfvParams,
    ntt: NttTables,
    encoder: BatchEncoder,
}

impl HeContext {
    pub fn new(params: BfvParams) -> Self {
        let ntt = NttTables::new(params.n, params.q, params.psi_q);
        let encoder = BatchEncoder::new(params.n, params.t, params.psi_t);
        Self {
            params,
            ntt,
            encoder,
        }
    }

    pub fn params(&self) -> &BfvParams {
        &self.params
    }

    pub fn encoder(&self) -> &BatchEncoder {
        &self.encoder
    }

    pub fn slot_count(&self) -> usize {
        self.params.n
    }

    /// Generate a fresh key pair. Run by the Receiver only; the public
    /// half ships to the Sender.
    pub fn keygen<R: RngCore>(&self, rng: &mut R) -> (PublicKey, SecretKey) {
        let q = self.params.q;

        let mut s = self.sample_ternary(rng);
        self.ntt.forward(&mut s);

        let p1 = self.sample_uniform(rng);
        let mut e = self.sample_noise(rng);
        self.ntt.forward(&mut e);

        // p0 = -(p1·s + e)
        let p0: Vec<u64> = p1
            .iter()
            .zip(s.iter().zip(&e))
            .map(|(&a, (&sk, &err))| sub_mod(0, add_mod(mul_mod(a, sk, q), err, q), q))
            .collect();

        (PublicKey { p0, p1 }, SecretKey { s })
    }

    /// Lift a plaintext modulo q (centered, to keep multiplication noise
    /// small) and transform it for homomorphic use.
    pub fn to_ntt(&self, plain: &Plaintext) -> PlaintextNtt {
        let q = self.params.q;
        let t = self.params.t;
        let delta = self.params.delta();

        let mut raw: Vec<u64> = plain
            .coeffs()
            .iter()
            .map(|&v| if v <= t / 2 { v } else { q - (t - v) })
            .collect();
        self.ntt.forward(&mut raw);

        let scaled: Vec<u64> = raw.iter().map(|&v| mul_mod(delta, v, q)).collect();
        PlaintextNtt { raw, scaled }
    }

    fn sample_uniform<R: RngCore>(&self, rng: &mut R) -> Vec<u64> {
        let q = self.params.q;
        // Rejection sampling on the top bits keeps the draw uniform.
        let threshold = u64::MAX - u64::MAX % q;
        (0..self.params.n)
            .map(|_| loop {
                let v = rng.next_u64();
                if v < threshold {
                    break v % q;
                }
            })
            .collect()
    }

    fn sample_ternary<R: RngCore>(&self, rng: &mut R) -> Vec<u64> {
        let q = self.params.q;
        (0..self.params.n)
            .map(|_| match rng.next_u32() % 3 {
                0 => 0,
                1 => 1,
                _ => q - 1,
            })
            .collect()
    }

    fn sample_noise<R: RngCore>(&self, rng: &mut R) -> Vec<u64> {
        let q = self.params.q;
        (0..self.params.n)
            .map(|_| {
                let bits = rng.next_u32();
                let pos = (bits & ((1 << ETA) - 1)).count_ones();
                let neg = ((bits >> ETA) & ((1 << ETA) - 1)).count_ones();
                if pos >= neg {
                    (pos - neg) as u64
                } else {
                    q - (neg - pos) as u64
                }
            })
            .collect()
    }
}

/// Public-key encryptor.
pub struct Encryptor<'a> {
    ctx: &'a HeContext,
    pk: &'a PublicKey,
}

impl<'a> Encryptor<'a> {
    pub fn new(ctx: &'a HeContext, pk: &'a PublicKey) -> Self {
        Self { ctx, pk }
    }

    pub fn encrypt<R: RngCore>(&self, plain: &Plaintext, rng: &mut R) -> Ciphertext {
        let ctx = self.ctx;
        let q = ctx.params.q;
        let delta = ctx.params.delta();

        let mut u = ctx.sample_ternary(rng);
        ctx.ntt.forward(&mut u);
        let mut e0 = ctx.sample_noise(rng);
        ctx.ntt.forward(&mut e0);
        let mut e1 = ctx.sample_noise(rng);
        ctx.ntt.forward(&mut e1);

        let mut dm: Vec<u64> = plain
            .coeffs()
            .iter()
            .map(|&v| mul_mod(delta, v, q))
            .collect();
        ctx.ntt.forward(&mut dm);

        let c0: Vec<u64> = (0..ctx.params.n)
            .map(|i| {
                add_mod(
                    add_mod(mul_mod(self.pk.p0[i], u[i], q), e0[i], q),
                    dm[i],
                    q,
                )
            })
            .collect();
        let c1: Vec<u64> = (0..ctx.params.n)
            .map(|i| add_mod(mul_mod(self.pk.p1[i], u[i], q), e1[i], q))
            .collect();

        Ciphertext::new(c0, c1)
    }
}

/// Secret-key decryptor.
pub struct Decryptor<'a> {
    ctx: &'a HeContext,
    sk: &'a SecretKey,
}

impl<'a> Decryptor<'a> {
    pub fn new(ctx: &'a HeContext, sk: &'a SecretKey) -> Self {
        Self { ctx, sk }
    }

    pub fn decrypt(&self, ct: &Ciphertext) -> Plaintext {
        let ctx = self.ctx;
        let q = ctx.params.q;
        let t = ctx.params.t;

        let mut x: Vec<u64> = ct
            .c0
            .iter()
            .zip(ct.c1.iter().zip(&self.sk.s))
            .map(|(&c0, (&c1, &s))| add_mod(c0, mul_mod(c1, s, q), q))
            .collect();
        ctx.ntt.inverse(&mut x);

        let half_q = (q / 2) as u128;
        let coeffs: Vec<u64> = x
            .iter()
            .map(|&v| (((v as u128 * t as u128 + half_q) / q as u128) % t as u128) as u64)
            .collect();
        Plaintext::new(coeffs)
    }

    /// Decrypt and read a single batching slot.
    pub fn decrypt_slot(&self, ct: &Ciphertext, slot: usize) -> u64 {
        let plain = self.decrypt(ct);
        self.ctx.encoder.decode_slot(&plain, slot)
    }
}

/// Homomorphic operations. All inputs live in the same context, so the
/// polynomial degrees always agree.
pub struct Evaluator<'a> {
    ctx: &'a HeContext,
}

impl<'a> Evaluator<'a> {
    pub fn new(ctx: &'a HeContext) -> Self {
        Self { ctx }
    }

    pub fn add_inplace(&self, a: &mut Ciphertext, b: &Ciphertext) {
        let q = self.ctx.params.q;
        for (x, &y) in a.c0.iter_mut().zip(&b.c0) {
            *x = add_mod(*x, y, q);
        }
        for (x, &y) in a.c1.iter_mut().zip(&b.c1) {
            *x = add_mod(*x, y, q);
        }
    }

    pub fn negate_inplace(&self, a: &mut Ciphertext) {
        let q = self.ctx.params.q;
        for x in a.c0.iter_mut().chain(a.c1.iter_mut()) {
            *x = sub_mod(0, *x, q);
        }
    }

    /// Slot-wise product with a plaintext.
    pub fn multiply_plain(&self, a: &Ciphertext, plain: &PlaintextNtt) -> Ciphertext {
        let q = self.ctx.params.q;
        let c0 = a
            .c0
            .iter()
            .zip(&plain.raw)
            .map(|(&x, &p)| mul_mod(x, p, q))
            .collect();
        let c1 = a
            .c1
            .iter()
            .zip(&plain.raw)
            .map(|(&x, &p)| mul_mod(x, p, q))
            .collect();
        Ciphertext::new(c0, c1)
    }

    /// Slot-wise addition of `scalar` times a plaintext.
    pub fn add_plain_scaled_inplace(&self, a: &mut Ciphertext, plain: &PlaintextNtt, scalar: u64) {
        let q = self.ctx.params.q;
        for (x, &p) in a.c0.iter_mut().zip(&plain.scaled) {
            *x = add_mod(*x, mul_mod(scalar, p, q), q);
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;

    fn setup() -> (HeContext, PublicKey, SecretKey, ChaCha20Rng) {
        let ctx = HeContext::new(BfvParams::protocol_default());
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let (pk, sk) = ctx.keygen(&mut rng);
        (ctx, pk, sk, rng)
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let (ctx, pk, sk, mut rng) = setup();
        let values: Vec<u64> = (0..128).map(|i| i * 31 % ctx.params().t).collect();
        let plain = ctx.encoder().encode(&values).unwrap();

        let encryptor = Encryptor::new(&ctx, &pk);
        let decryptor = Decryptor::new(&ctx, &sk);
        let ct = encryptor.encrypt(&plain, &mut rng);
        let decoded = ctx.encoder().decode(&decryptor.decrypt(&ct));
        assert_eq!(&decoded[..128], &values[..]);
    }

    #[test]
    fn test_slot_extraction() {
        // Multiplying a packed ciphertext by a unit-slot mask isolates
        // that slot.
        let (ctx, pk, sk, mut rng) = setup();
        let values: Vec<u64> = (0..64).map(|i| (i % 2) as u64).collect();
        let plain = ctx.encoder().encode(&values).unwrap();

        let encryptor = Encryptor::new(&ctx, &pk);
        let decryptor = Decryptor::new(&ctx, &sk);
        let evaluator = Evaluator::new(&ctx);
        let packed = encryptor.encrypt(&plain, &mut rng);

        for k in [0usize, 1, 5, 63] {
            let mut unit = vec![0u64; k + 1];
            unit[k] = 1;
            let mask = ctx.to_ntt(&ctx.encoder().encode(&unit).unwrap());
            let extracted = evaluator.multiply_plain(&packed, &mask);

            let slots = ctx.encoder().decode(&decryptor.decrypt(&extracted));
            assert_eq!(slots[k], values[k]);
            for (i, &v) in slots.iter().enumerate() {
                if i != k {
                    assert_eq!(v, 0, "slot {i} leaked into extraction of slot {k}");
                }
            }
            assert_eq!(decryptor.decrypt_slot(&extracted, k), values[k]);
        }
    }

    #[test]
    fn test_blinding_adds_in_matching_slot() {
        let (ctx, pk, sk, mut rng) = setup();
        let plain = ctx.encoder().encode(&[0, 1, 1, 0]).unwrap();
        let encryptor = Encryptor::new(&ctx, &pk);
        let decryptor = Decryptor::new(&ctx, &sk);
        let evaluator = Evaluator::new(&ctx);

        let packed = encryptor.encrypt(&plain, &mut rng);
        let k = 2;
        let mut unit = vec![0u64; k + 1];
        unit[k] = 1;
        let mask = ctx.to_ntt(&ctx.encoder().encode(&unit).unwrap());

        let mut extracted = evaluator.multiply_plain(&packed, &mask);
        evaluator.add_plain_scaled_inplace(&mut extracted, &mask, 1);
        // Slot k held 1; the mask bit adds arithmetically.
        assert_eq!(decryptor.decrypt_slot(&extracted, k), 2);
    }

    #[test]
    fn test_negate_and_add() {
        let (ctx, pk, sk, mut rng) = setup();
        let t = ctx.params().t;
        let encryptor = Encryptor::new(&ctx, &pk);
        let decryptor = Decryptor::new(&ctx, &sk);
        let evaluator = Evaluator::new(&ctx);

        let ct_a = encryptor.encrypt(&ctx.encoder().encode(&[5]).unwrap(), &mut rng);
        let ct_b = encryptor.encrypt(&ctx.encoder().encode(&[3]).unwrap(), &mut rng);

        let mut acc = ct_a.clone();
        evaluator.add_inplace(&mut acc, &ct_b);
        assert_eq!(decryptor.decrypt_slot(&acc, 0), 8);

        let mut neg = ct_b;
        evaluator.negate_inplace(&mut neg);
        evaluator.add_inplace(&mut acc, &neg);
        assert_eq!(decryptor.decrypt_slot(&acc, 0), 5);

        // Negation wraps modulo t.
        let mut under = encryptor.encrypt(&ctx.encoder().encode(&[1]).unwrap(), &mut rng);
        evaluator.negate_inplace(&mut under);
        assert_eq!(decryptor.decrypt_slot(&under, 0), t - 1);
    }

    #[test]
    fn test_public_key_bytes_roundtrip() {
        let (ctx, pk, sk, mut rng) = setup();
        let bytes = pk.to_bytes();
        let pk2 = PublicKey::from_bytes(&bytes, ctx.params()).unwrap();

        // A key restored from bytes must encrypt under the same secret.
        let encryptor = Encryptor::new(&ctx, &pk2);
        let decryptor = Decryptor::new(&ctx, &sk);
        let ct = encryptor.encrypt(&ctx.encoder().encode(&[99]).unwrap(), &mut rng);
        assert_eq!(decryptor.decrypt_slot(&ct, 0), 99);
    }
}
