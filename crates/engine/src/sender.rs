//! Sender engine
//!
//! Holds the query set Q. Offline: receive and materialize the Receiver's
//! OKVS, packed ciphertexts and public key. Online: for each query, walk
//! its ID candidates, recover the owning receiver vector (or a dummy)
//! from the OKVS, blind it homomorphically, run the equality aggregate,
//! and finish with the any-one test and the OT.

use std::collections::BTreeSet;
use std::io::{Read, Write};
use std::time::{Duration, Instant};

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rayon::prelude::*;
use tracing::{debug, info};

use fpsi_core::{random_binary_vector, Block, CommStats};
use fpsi_elsh::{ElshMap, LshId};
use fpsi_he::{
    BfvParams, Ciphertext, Encryptor, Evaluator, HeContext, PlaintextNtt, PublicKey,
};
use fpsi_okvs::BandOkvs;
use fpsi_primitives::{any_one_sender, masked_equality_sum, ot_send};
use fpsi_protocol::{batch_token, Channel, ProtocolError, ACK_TOKEN, BATCH_SIZE};

use crate::error::{EngineError, Result};
use crate::params::ProtocolParams;
use crate::stats::{Role, RunStats};

pub struct FpsiSender {
    params: ProtocolParams,
    m: usize,
    prng: ChaCha20Rng,
    elsh: ElshMap,
    ctx: HeContext,

    q_set: Vec<Vec<u8>>,
    id_q: Vec<Vec<LshId>>,

    okvs: Option<BandOkvs>,
    okvs_rows: Vec<Block>,
    packed: Vec<Ciphertext>,
    pk: Option<PublicKey>,
    unit_masks: Vec<PlaintextNtt>,

    matched_queries: BTreeSet<usize>,

    offline_time: Duration,
    online_time: Duration,
    offline_comm: CommStats,
    online_comm: CommStats,
}

impl FpsiSender {
    /// Build a sender for a set of `m` queries with entropy-seeded
    /// randomness.
    pub fn new(params: ProtocolParams, m: usize) -> Result<Self> {
        Self::with_rng(params, m, ChaCha20Rng::from_entropy())
    }

    /// Build a sender with seeded randomness, for reproducible runs and
    /// tests.
    pub fn with_seed(params: ProtocolParams, m: usize, seed: u64) -> Result<Self> {
        Self::with_rng(params, m, ChaCha20Rng::seed_from_u64(seed))
    }

    fn with_rng(params: ProtocolParams, m: usize, prng: ChaCha20Rng) -> Result<Self> {
        let ctx = HeContext::new(BfvParams::protocol_default());
        params.validate(ctx.slot_count())?;
        if m == 0 {
            return Err(EngineError::InvalidParameter(
                "sender set must be non-empty".into(),
            ));
        }

        let elsh = ElshMap::with_tau(params.d, params.delta, params.l, params.tau)?;

        Ok(Self {
            params,
            m,
            prng,
            elsh,
            ctx,
            q_set: Vec::new(),
            id_q: Vec::new(),
            okvs: None,
            okvs_rows: Vec::new(),
            packed: Vec::new(),
            pk: None,
            unit_masks: Vec::new(),
            matched_queries: BTreeSet::new(),
            offline_time: Duration::ZERO,
            online_time: Duration::ZERO,
            offline_comm: CommStats::default(),
            online_comm: CommStats::default(),
        })
    }

    /// Fill Q with random vectors.
    pub fn generate_data(&mut self) {
        self.q_set = (0..self.m)
            .map(|_| random_binary_vector(self.params.d, &mut self.prng))
            .collect();
    }

    /// Use caller-supplied vectors as Q.
    pub fn set_data(&mut self, q: Vec<Vec<u8>>) -> Result<()> {
        if q.len() != self.m {
            return Err(EngineError::InvalidParameter(format!(
                "expected {} vectors, got {}",
                self.m,
                q.len()
            )));
        }
        for v in &q {
            if v.len() != self.params.d {
                return Err(EngineError::DataDimensionMismatch {
                    expected: self.params.d,
                    got: v.len(),
                });
            }
        }
        self.q_set = q;
        Ok(())
    }

    pub fn matched_queries(&self) -> &BTreeSet<usize> {
        &self.matched_queries
    }

    pub fn stats(&self) -> RunStats {
        RunStats {
            role: Role::Sender,
            set_size: self.m,
            d: self.params.d,
            delta: self.params.delta,
            matches: self.matched_queries.len(),
            offline_time: self.offline_time,
            online_time: self.online_time,
            offline_comm: self.offline_comm,
            online_comm: self.online_comm,
        }
    }

    /// Offline phase: receive the OKVS, the packed ciphertexts and the
    /// public key, and precompute the slot-extraction masks.
    pub fn run_offline<S: Read + Write>(&mut self, chl: &mut Channel<S>) -> Result<()> {
        let start = Instant::now();
        let sent0 = chl.bytes_sent();
        let received0 = chl.bytes_received();

        self.id_q = self.elsh.compute_ids_batch(&self.q_set)?;

        self.receive_okvs(chl)?;
        self.receive_packed_vectors(chl)?;

        let pk_bytes = chl.recv_bytes()?;
        self.pk = Some(PublicKey::from_bytes(&pk_bytes, self.ctx.params())?);

        self.unit_masks = (0..self.params.d)
            .into_par_iter()
            .map(|k| {
                let mut unit = vec![0u64; k + 1];
                unit[k] = 1;
                Ok(self.ctx.to_ntt(&self.ctx.encoder().encode(&unit)?))
            })
            .collect::<Result<_>>()?;

        self.offline_time = start.elapsed();
        self.offline_comm = CommStats::new(
            chl.bytes_sent() - sent0,
            chl.bytes_received() - received0,
        );
        info!(
            received_mb = self.offline_comm.megabytes_received(),
            seconds = self.offline_time.as_secs_f64(),
            "sender: offline phase done"
        );
        Ok(())
    }

    fn receive_okvs<S: Read + Write>(&mut self, chl: &mut Channel<S>) -> Result<()> {
        let okvs_size = chl.recv_u64()? as usize;
        let mut row_bytes = vec![0u8; okvs_size * 16];
        chl.recv_raw(&mut row_bytes)?;
        self.okvs_rows = row_bytes
            .chunks_exact(16)
            .map(|chunk| Block::from_bytes(chunk.try_into().expect("16-byte chunk")))
            .collect();

        let seed = chl.recv_block()?;
        let m_okvs = chl.recv_i32()?;
        let band_length = chl.recv_i32()?;
        let n_items = chl.recv_i32()?;
        if m_okvs < 0 || band_length < 0 || n_items < 0 || m_okvs as usize != okvs_size {
            return Err(EngineError::InvalidParameter(format!(
                "inconsistent okvs geometry on the wire: size={okvs_size}, m={m_okvs}, \
                 band={band_length}, items={n_items}"
            )));
        }

        self.okvs = Some(BandOkvs::new(
            n_items as usize,
            m_okvs as usize,
            band_length as usize,
            seed,
        )?);
        debug!(rows = okvs_size, items = n_items, "sender: okvs materialized");
        Ok(())
    }

    fn receive_packed_vectors<S: Read + Write>(&mut self, chl: &mut Channel<S>) -> Result<()> {
        let n_receiver = chl.recv_i32()?;
        if n_receiver < 0 {
            return Err(EngineError::InvalidParameter(format!(
                "negative receiver set size {n_receiver}"
            )));
        }
        let n_receiver = n_receiver as usize;

        self.packed = Vec::with_capacity(n_receiver);
        let num_batches = n_receiver.div_ceil(BATCH_SIZE);
        for batch in 0..num_batches {
            let hi = ((batch + 1) * BATCH_SIZE).min(n_receiver);
            while self.packed.len() < hi {
                let bytes = chl.recv_bytes()?;
                self.packed
                    .push(Ciphertext::from_bytes(&bytes, self.ctx.params())?);
            }

            let token = chl.recv_token()?;
            let expected = batch_token(batch);
            if token != expected {
                return Err(ProtocolError::BatchSync {
                    expected,
                    got: token,
                }
                .into());
            }
            chl.send_token(ACK_TOKEN)?;
            chl.flush()?;
        }
        debug!(count = n_receiver, "sender: packed ciphertexts received");
        Ok(())
    }

    /// Online phase: announce the query count, then run every query.
    pub fn run_online<S: Read + Write>(&mut self, chl: &mut Channel<S>) -> Result<()> {
        let start = Instant::now();
        let sent0 = chl.bytes_sent();
        let received0 = chl.bytes_received();

        chl.send_i32(self.m as i32)?;
        chl.flush()?;

        for j in 0..self.m {
            if j > 0 && j % 100 == 0 {
                debug!(progress = j, total = self.m, "sender: query progress");
            }
            self.process_query(j, chl)?;
        }

        self.online_time = start.elapsed();
        self.online_comm = CommStats::new(
            chl.bytes_sent() - sent0,
            chl.bytes_received() - received0,
        );
        info!(
            matched = self.matched_queries.len(),
            seconds = self.online_time.as_secs_f64(),
            "sender: online phase done"
        );
        Ok(())
    }

    fn process_query<S: Read + Write>(&mut self, j: usize, chl: &mut Channel<S>) -> Result<bool> {
        let d = self.params.d;
        let num_slots = self.params.num_slots();
        let okvs = self.okvs.as_ref().ok_or(EngineError::OfflineIncomplete)?;
        let pk = self.pk.as_ref().ok_or(EngineError::OfflineIncomplete)?;
        let encryptor = Encryptor::new(&self.ctx, pk);
        let evaluator = Evaluator::new(&self.ctx);
        let q_j = &self.q_set[j];

        let mut e_flags: Vec<u8> = Vec::with_capacity(self.params.l);

        for id in self.id_q[j].iter().take(self.params.l) {
            let key = Block::new(id.wire_hash(), j as u64);
            let idx = okvs.decode(key, &self.okvs_rows).lo() as usize;

            // An index outside the receiver's set is the common miss case:
            // this id was never encoded, so the decoded row is noise.
            // Substitute an encrypted zero vector; the distance check then
            // runs against the zero vector and yields no match.
            let dummy;
            let packed_ct = if idx < self.packed.len() {
                &self.packed[idx]
            } else {
                let zero = self.ctx.encoder().encode(&[])?;
                dummy = encryptor.encrypt(&zero, &mut self.prng);
                &dummy
            };

            let mask_bits: Vec<u8> = (0..d)
                .map(|_| (self.prng.next_u32() & 1) as u8)
                .collect();

            // Extract slot k and add the mask bit into the same slot.
            let blobs: Vec<Vec<u8>> = (0..d)
                .into_par_iter()
                .map(|k| {
                    let mut ct = evaluator.multiply_plain(packed_ct, &self.unit_masks[k]);
                    if mask_bits[k] == 1 {
                        evaluator.add_plain_scaled_inplace(&mut ct, &self.unit_masks[k], 1);
                    }
                    ct.to_bytes()
                })
                .collect();
            for blob in &blobs {
                chl.send_bytes(blob)?;
            }

            let u: Vec<u8> = mask_bits.iter().zip(q_j).map(|(&m, &qk)| m ^ qk).collect();
            chl.send_raw(&u)?;
            chl.flush()?;

            let mut enc_a = Vec::with_capacity(num_slots);
            for _ in 0..num_slots {
                let bytes = chl.recv_bytes()?;
                enc_a.push(Ciphertext::from_bytes(&bytes, self.ctx.params())?);
            }
            let mut shares_b = vec![0u8; num_slots];
            chl.recv_raw(&mut shares_b)?;

            let (masked_sum, mask) =
                masked_equality_sum(&self.ctx, &evaluator, &enc_a, &shares_b, &mut self.prng)?;
            chl.send_bytes(&masked_sum.to_bytes())?;
            chl.send_u64(mask)?;
            chl.flush()?;

            e_flags.push(chl.recv_u8()?);
        }

        let has_match = any_one_sender(&e_flags, chl, &mut self.prng)?;

        let zeros = vec![0u8; d];
        ot_send(chl, &zeros, q_j, &mut self.prng)?;

        if has_match {
            self.matched_queries.insert(j);
        }
        Ok(has_match)
    }
}
