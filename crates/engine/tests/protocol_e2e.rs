//! End-to-end protocol runs over localhost TCP, one thread per party.

use std::net::{TcpListener, TcpStream};
use std::thread;

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use fpsi_core::{hamming_distance, random_binary_vector, Block};
use fpsi_engine::{EngineError, FpsiReceiver, FpsiSender, ProtocolParams};
use fpsi_he::{BfvParams, Encryptor, HeContext};
use fpsi_okvs::BandOkvs;
use fpsi_protocol::{Channel, ProtocolError};

/// Parse a bit string like "00110011" into a byte-per-bit vector.
fn bits(s: &str) -> Vec<u8> {
    s.chars()
        .map(|c| match c {
            '0' => 0,
            '1' => 1,
            _ => panic!("not a bit string"),
        })
        .collect()
}

fn run_protocol(
    params: ProtocolParams,
    w: Vec<Vec<u8>>,
    q: Vec<Vec<u8>>,
) -> (FpsiReceiver, FpsiSender) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let n = w.len();
    let m = q.len();

    let receiver_handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        stream.set_nodelay(true).unwrap();
        let mut chl = Channel::new(stream);

        let mut receiver = FpsiReceiver::with_seed(params, n, 1001).unwrap();
        receiver.set_data(w).unwrap();
        receiver.run_offline(&mut chl).unwrap();
        receiver.run_online(&mut chl).unwrap();
        receiver
    });

    let stream = TcpStream::connect(addr).unwrap();
    stream.set_nodelay(true).unwrap();
    let mut chl = Channel::new(stream);

    let mut sender = FpsiSender::with_seed(params, m, 2002).unwrap();
    sender.set_data(q).unwrap();
    sender.run_offline(&mut chl).unwrap();
    sender.run_online(&mut chl).unwrap();

    (receiver_handle.join().unwrap(), sender)
}

#[test]
fn test_single_close_pair_is_found() {
    // d=8, delta=1: only q_0 = 00000001 lies within distance 1 of a
    // receiver vector (00000000); q_1 is distance 4 from its candidate.
    let params = ProtocolParams::new(8, 1, 4);
    let w = vec![bits("00000000"), bits("11110000")];
    let q = vec![bits("00000001"), bits("00110011")];

    let (receiver, sender) = run_protocol(params, w, q);

    assert_eq!(receiver.fuzzy_intersection(), vec![bits("00000000")]);
    assert_eq!(
        receiver.matched_queries().iter().copied().collect::<Vec<_>>(),
        vec![0]
    );
    assert_eq!(
        sender.matched_queries().iter().copied().collect::<Vec<_>>(),
        vec![0]
    );
}

#[test]
fn test_exact_match_at_zero_threshold() {
    // delta=0 degenerates to exact PSI on a single shared vector.
    let params = ProtocolParams::new(16, 0, 2);
    let vector = bits("1010010110100101"); // 0xA5A5
    let (receiver, sender) = run_protocol(params, vec![vector.clone()], vec![vector.clone()]);

    assert_eq!(receiver.fuzzy_intersection(), vec![vector]);
    assert_eq!(sender.matched_queries().len(), 1);

    // Both phases moved real traffic.
    let stats = receiver.stats();
    assert!(stats.offline_comm.sent > 0);
    assert!(stats.online_comm.total() > 0);
}

#[test]
fn test_maximal_threshold_matches_everything() {
    // delta = d: every pair is within threshold, so every query matches.
    let params = ProtocolParams::new(16, 16, 2);
    let w = vec![
        bits("0000000000000000"),
        bits("1111111111111111"),
        bits("0101010101010101"),
    ];
    let q = vec![
        bits("0011001100110011"),
        bits("1100110011001100"),
        bits("1111000011110000"),
    ];

    let (receiver, sender) = run_protocol(params, w, q);

    assert_eq!(receiver.fuzzy_intersection().len(), 3);
    assert_eq!(receiver.matched_queries().len(), 3);
    assert_eq!(sender.matched_queries().len(), 3);
}

#[test]
fn test_distant_sets_produce_empty_intersection() {
    // d=128, delta=10: every cross pair is at distance >= 20 and every
    // query has weight >= 20 (so the dummy zero vector cannot match
    // either). The intersection must stay empty.
    let params = ProtocolParams::new(128, 10, 32);
    let mut rng = ChaCha20Rng::seed_from_u64(424242);

    let (w, q) = loop {
        let w: Vec<Vec<u8>> = (0..4).map(|_| random_binary_vector(128, &mut rng)).collect();
        let q: Vec<Vec<u8>> = (0..4).map(|_| random_binary_vector(128, &mut rng)).collect();

        let far_enough = q.iter().all(|qv| {
            qv.iter().filter(|&&b| b == 1).count() >= 20
                && w.iter().all(|wv| hamming_distance(wv, qv) >= 20)
        });
        if far_enough {
            break (w, q);
        }
    };

    let (receiver, sender) = run_protocol(params, w, q);

    assert!(receiver.fuzzy_intersection().is_empty());
    assert!(receiver.matched_queries().is_empty());
    assert!(sender.matched_queries().is_empty());
}

#[test]
fn test_misordered_batch_token_fails_the_sender() {
    // A corrupted offline stream: a valid OKVS section and a full batch
    // of ciphertexts, followed by the wrong synchronization token.
    let params = ProtocolParams::new(8, 1, 4);
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let corrupt_receiver = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut chl = Channel::new(stream);
        let mut rng = ChaCha20Rng::seed_from_u64(7);

        let seed = Block::new(11, 22);
        let okvs = BandOkvs::with_auto_params(1, seed).unwrap();
        let rows = okvs
            .encode(&[Block::new(5, 0)], &[Block::new(0, 0)], &mut rng)
            .unwrap();

        chl.send_u64(rows.len() as u64).unwrap();
        let mut row_bytes = Vec::new();
        for row in &rows {
            row_bytes.extend_from_slice(&row.to_bytes());
        }
        chl.send_raw(&row_bytes).unwrap();
        chl.send_block(seed).unwrap();
        chl.send_i32(okvs.size() as i32).unwrap();
        chl.send_i32(okvs.band_length() as i32).unwrap();
        chl.send_i32(1).unwrap();

        chl.send_i32(16).unwrap();
        let ctx = HeContext::new(BfvParams::protocol_default());
        let (pk, _sk) = ctx.keygen(&mut rng);
        let encryptor = Encryptor::new(&ctx, &pk);
        for _ in 0..16 {
            let ct = encryptor.encrypt(&ctx.encoder().encode(&[]).unwrap(), &mut rng);
            chl.send_bytes(&ct.to_bytes()).unwrap();
        }
        // Wrong batch index: the sender expects BATCH_0.
        chl.send_token("BATCH_7").unwrap();
        chl.flush().unwrap();
    });

    let stream = TcpStream::connect(addr).unwrap();
    let mut chl = Channel::new(stream);
    let mut sender = FpsiSender::with_seed(params, 1, 3003).unwrap();
    sender.set_data(vec![bits("00000000")]).unwrap();

    let result = sender.run_offline(&mut chl);
    assert!(matches!(
        result,
        Err(EngineError::Protocol(ProtocolError::BatchSync { .. }))
    ));
    corrupt_receiver.join().unwrap();
}
