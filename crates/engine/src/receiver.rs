//! Receiver engine
//!
//! Holds the set W and the secret key. Offline: publish the OKVS-encoded
//! ID map, the packed per-vector ciphertexts and the public key. Online:
//! answer each of the Sender's query rounds, decide the match flags, and
//! collect the fuzzy intersection through the final OT.

use std::collections::BTreeSet;
use std::io::{Read, Write};
use std::time::{Duration, Instant};

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rayon::prelude::*;
use tracing::{debug, info};

use fpsi_core::{random_binary_vector, Block, CommStats};
use fpsi_elsh::{ElshMap, LshId};
use fpsi_he::{BfvParams, Ciphertext, Decryptor, Encryptor, HeContext, PublicKey, SecretKey};
use fpsi_okvs::{BandOkvs, OkvsError};
use fpsi_primitives::{
    any_one_receiver, encrypt_equality_shares, generate_shares_batch, ot_receive,
    recover_match_count,
};
use fpsi_protocol::{batch_token, Channel, ProtocolError, ACK_TOKEN, BATCH_SIZE};

use crate::error::{EngineError, Result};
use crate::params::{ProtocolParams, MAX_ENCODE_ATTEMPTS};
use crate::stats::{Role, RunStats};

pub struct FpsiReceiver {
    params: ProtocolParams,
    n: usize,
    prng: ChaCha20Rng,
    elsh: ElshMap,
    ctx: HeContext,
    pk: PublicKey,
    sk: SecretKey,

    w: Vec<Vec<u8>>,
    id_w: Vec<Vec<LshId>>,

    fuzzy_intersection: Vec<Vec<u8>>,
    matched_queries: BTreeSet<usize>,

    offline_time: Duration,
    online_time: Duration,
    offline_comm: CommStats,
    online_comm: CommStats,
}

impl FpsiReceiver {
    /// Build a receiver for a set of `n` vectors with entropy-seeded
    /// randomness.
    pub fn new(params: ProtocolParams, n: usize) -> Result<Self> {
        Self::with_rng(params, n, ChaCha20Rng::from_entropy())
    }

    /// Build a receiver with seeded randomness, for reproducible runs and
    /// tests.
    pub fn with_seed(params: ProtocolParams, n: usize, seed: u64) -> Result<Self> {
        Self::with_rng(params, n, ChaCha20Rng::seed_from_u64(seed))
    }

    fn with_rng(params: ProtocolParams, n: usize, mut prng: ChaCha20Rng) -> Result<Self> {
        let ctx = HeContext::new(BfvParams::protocol_default());
        params.validate(ctx.slot_count())?;
        if n == 0 {
            return Err(EngineError::InvalidParameter(
                "receiver set must be non-empty".into(),
            ));
        }

        let elsh = ElshMap::with_tau(params.d, params.delta, params.l, params.tau)?;
        let (pk, sk) = ctx.keygen(&mut prng);

        Ok(Self {
            params,
            n,
            prng,
            elsh,
            ctx,
            pk,
            sk,
            w: Vec::new(),
            id_w: Vec::new(),
            fuzzy_intersection: Vec::new(),
            matched_queries: BTreeSet::new(),
            offline_time: Duration::ZERO,
            online_time: Duration::ZERO,
            offline_comm: CommStats::default(),
            online_comm: CommStats::default(),
        })
    }

    /// Fill W with random vectors.
    pub fn generate_data(&mut self) {
        self.w = (0..self.n)
            .map(|_| random_binary_vector(self.params.d, &mut self.prng))
            .collect();
    }

    /// Use caller-supplied vectors as W.
    pub fn set_data(&mut self, w: Vec<Vec<u8>>) -> Result<()> {
        if w.len() != self.n {
            return Err(EngineError::InvalidParameter(format!(
                "expected {} vectors, got {}",
                self.n,
                w.len()
            )));
        }
        for v in &w {
            if v.len() != self.params.d {
                return Err(EngineError::DataDimensionMismatch {
                    expected: self.params.d,
                    got: v.len(),
                });
            }
        }
        self.w = w;
        Ok(())
    }

    pub fn fuzzy_intersection(&self) -> &[Vec<u8>] {
        &self.fuzzy_intersection
    }

    pub fn matched_queries(&self) -> &BTreeSet<usize> {
        &self.matched_queries
    }

    pub fn stats(&self) -> RunStats {
        RunStats {
            role: Role::Receiver,
            set_size: self.n,
            d: self.params.d,
            delta: self.params.delta,
            matches: self.fuzzy_intersection.len(),
            offline_time: self.offline_time,
            online_time: self.online_time,
            offline_comm: self.offline_comm,
            online_comm: self.online_comm,
        }
    }

    /// Offline phase: E-LSH, OKVS encode and publish, packed ciphertexts
    /// in acknowledged batches, public key.
    pub fn run_offline<S: Read + Write>(&mut self, chl: &mut Channel<S>) -> Result<()> {
        let start = Instant::now();
        let sent0 = chl.bytes_sent();
        let received0 = chl.bytes_received();

        self.id_w = self.elsh.compute_ids_batch(&self.w)?;

        let mut keys = Vec::with_capacity(self.n * self.params.l);
        let mut values = Vec::with_capacity(self.n * self.params.l);
        for (i, ids) in self.id_w.iter().enumerate() {
            for id in ids {
                keys.push(Block::new(id.wire_hash(), i as u64));
                values.push(Block::new(i as u64, 0));
            }
        }
        info!(pairs = keys.len(), "receiver: encoding okvs");

        let (okvs, seed, rows) = self.encode_okvs(&keys, &values)?;

        chl.send_u64(rows.len() as u64)?;
        let mut row_bytes = Vec::with_capacity(rows.len() * 16);
        for row in &rows {
            row_bytes.extend_from_slice(&row.to_bytes());
        }
        chl.send_raw(&row_bytes)?;
        chl.send_block(seed)?;
        chl.send_i32(okvs.size() as i32)?;
        chl.send_i32(okvs.band_length() as i32)?;
        chl.send_i32(keys.len() as i32)?;

        self.send_packed_vectors(chl)?;

        chl.send_bytes(&self.pk.to_bytes())?;
        chl.flush()?;

        self.offline_time = start.elapsed();
        self.offline_comm = CommStats::new(
            chl.bytes_sent() - sent0,
            chl.bytes_received() - received0,
        );
        info!(
            seconds = self.offline_time.as_secs_f64(),
            sent_mb = self.offline_comm.megabytes_sent(),
            "receiver: offline phase done"
        );
        Ok(())
    }

    fn encode_okvs(
        &mut self,
        keys: &[Block],
        values: &[Block],
    ) -> Result<(BandOkvs, Block, Vec<Block>)> {
        for _ in 0..MAX_ENCODE_ATTEMPTS {
            let seed = Block::random(&mut self.prng);
            let okvs = BandOkvs::with_auto_params(keys.len(), seed)?;
            match okvs.encode(keys, values, &mut self.prng) {
                Ok(rows) => return Ok((okvs, seed, rows)),
                Err(OkvsError::SingularSystem) => {
                    debug!("receiver: okvs seed produced a singular system, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(EngineError::OkvsEncodingFailed {
            attempts: MAX_ENCODE_ATTEMPTS,
        })
    }

    /// Pack each vector's bits into the first d plaintext slots, encrypt,
    /// and stream in acknowledged batches to bound in-flight memory.
    fn send_packed_vectors<S: Read + Write>(&mut self, chl: &mut Channel<S>) -> Result<()> {
        chl.send_i32(self.n as i32)?;

        let encryptor = Encryptor::new(&self.ctx, &self.pk);
        let num_batches = self.n.div_ceil(BATCH_SIZE);

        for batch in 0..num_batches {
            let lo = batch * BATCH_SIZE;
            let hi = ((batch + 1) * BATCH_SIZE).min(self.n);

            let seeds: Vec<u64> = (lo..hi).map(|_| self.prng.next_u64()).collect();
            let blobs: Vec<Vec<u8>> = (lo..hi)
                .into_par_iter()
                .map(|i| {
                    let mut rng = ChaCha20Rng::seed_from_u64(seeds[i - lo]);
                    let slots: Vec<u64> = self.w[i].iter().map(|&b| b as u64).collect();
                    let plain = self.ctx.encoder().encode(&slots)?;
                    Ok(encryptor.encrypt(&plain, &mut rng).to_bytes())
                })
                .collect::<Result<_>>()?;

            for blob in &blobs {
                chl.send_bytes(blob)?;
            }
            chl.send_token(&batch_token(batch))?;
            chl.flush()?;

            let ack = chl.recv_token()?;
            if ack != ACK_TOKEN {
                return Err(ProtocolError::BatchSync {
                    expected: ACK_TOKEN.to_string(),
                    got: ack,
                }
                .into());
            }
            debug!(batch, num_batches, "receiver: ciphertext batch acknowledged");
        }
        Ok(())
    }

    /// Online phase: serve every query the Sender announces.
    pub fn run_online<S: Read + Write>(&mut self, chl: &mut Channel<S>) -> Result<()> {
        let start = Instant::now();
        let sent0 = chl.bytes_sent();
        let received0 = chl.bytes_received();

        let m_sender = chl.recv_i32()?;
        if m_sender < 0 {
            return Err(EngineError::InvalidQueryCount(m_sender));
        }
        info!(queries = m_sender, "receiver: online phase started");

        for j in 0..m_sender as usize {
            if j > 0 && j % 100 == 0 {
                debug!(progress = j, total = m_sender, "receiver: query progress");
            }
            self.process_query(j, chl)?;
        }

        self.online_time = start.elapsed();
        self.online_comm = CommStats::new(
            chl.bytes_sent() - sent0,
            chl.bytes_received() - received0,
        );
        info!(
            matches = self.fuzzy_intersection.len(),
            seconds = self.online_time.as_secs_f64(),
            "receiver: online phase done"
        );
        Ok(())
    }

    fn process_query<S: Read + Write>(&mut self, j: usize, chl: &mut Channel<S>) -> Result<bool> {
        let d = self.params.d;
        let num_slots = self.params.num_slots();
        let decryptor = Decryptor::new(&self.ctx, &self.sk);
        let encryptor = Encryptor::new(&self.ctx, &self.pk);

        let mut e_flags: Vec<u8> = Vec::with_capacity(self.params.l);
        let mut diffs: Vec<Vec<u8>> = Vec::with_capacity(self.params.l);

        for _ell in 0..self.params.l {
            let mut cts = Vec::with_capacity(d);
            for _ in 0..d {
                let bytes = chl.recv_bytes()?;
                cts.push(Ciphertext::from_bytes(&bytes, self.ctx.params())?);
            }
            let mut u = vec![0u8; d];
            chl.recv_raw(&mut u)?;

            // Slot k of the k-th ciphertext holds w_k + mask_k, so the low
            // bit is w_k XOR mask_k.
            let decrypted: Vec<u64> = cts
                .par_iter()
                .enumerate()
                .map(|(k, ct)| decryptor.decrypt_slot(ct, k))
                .collect();
            let mut v = vec![0u8; d];
            for (k, &value) in decrypted.iter().enumerate() {
                if value > 2 {
                    return Err(EngineError::DecryptedBitOutOfRange { slot: k, value });
                }
                v[k] = (value & 1) as u8;
            }

            // u XOR v = q XOR w: the blinding cancels.
            let diff: Vec<u8> = u.iter().zip(&v).map(|(&a, &b)| a ^ b).collect();
            let dist = diff.iter().filter(|&&b| b == 1).count();

            let mut eq = vec![1u8; num_slots];
            for (k, &b) in diff.iter().enumerate() {
                if b == 1 {
                    eq[k / 8] = 0;
                }
            }

            let ones = vec![1u8; num_slots];
            let (shares_a, shares_b) = generate_shares_batch(&eq, &ones, &mut self.prng);
            let enc_a = encrypt_equality_shares(&self.ctx, &encryptor, &shares_a, &mut self.prng)?;
            for ct in &enc_a {
                chl.send_bytes(&ct.to_bytes())?;
            }
            chl.send_raw(&shares_b)?;
            chl.flush()?;

            let masked = Ciphertext::from_bytes(&chl.recv_bytes()?, self.ctx.params())?;
            let mask = chl.recv_u64()?;
            let match_count = recover_match_count(&self.ctx, &decryptor, &masked, mask);
            let local_count = eq.iter().map(|&b| b as u64).sum::<u64>();
            if match_count != local_count {
                return Err(EngineError::AggregateMismatch {
                    expected: local_count,
                    got: match_count,
                });
            }

            let e = (dist <= self.params.delta) as u8;
            chl.send_u8(e)?;
            chl.flush()?;
            e_flags.push(e);
            diffs.push(diff);
        }

        let has_match = any_one_receiver(&e_flags, chl)?;
        let payload = ot_receive(chl, has_match)?;
        if payload.len() != d {
            return Err(EngineError::UnexpectedPayloadLength {
                expected: d,
                got: payload.len(),
            });
        }

        if has_match {
            // The payload is q; XOR with q ^ w of the matching round
            // recovers the matched receiver vector.
            let ell = e_flags
                .iter()
                .position(|&e| e == 1)
                .expect("any-one reported a set flag");
            let matched: Vec<u8> = payload
                .iter()
                .zip(&diffs[ell])
                .map(|(&p, &x)| p ^ x)
                .collect();
            self.fuzzy_intersection.push(matched);
            self.matched_queries.insert(j);
        }
        Ok(has_match)
    }
}
