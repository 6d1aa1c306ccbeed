//! FPSI Receiver binary
//!
//! Listens for a single Sender connection and runs both protocol phases.

use std::net::TcpListener;
use std::path::Path;
use std::process;

use tracing::info;

use fpsi_engine::{FpsiReceiver, ProtocolParams, STATS_FILE};
use fpsi_protocol::Channel;

const DEFAULT_PORT: u16 = 12345;
const DEFAULT_N: usize = 256;

fn main() {
    tracing_subscriber::fmt::init();

    let port = match std::env::args().nth(1) {
        Some(arg) => match arg.parse() {
            Ok(port) => port,
            Err(_) => {
                eprintln!("usage: fpsi-receiver [port]");
                process::exit(1);
            }
        },
        None => DEFAULT_PORT,
    };

    let params = ProtocolParams::new(128, 10, 8);
    info!(
        n = DEFAULT_N,
        d = params.d,
        delta = params.delta,
        l = params.l,
        port,
        "fpsi receiver starting"
    );

    if let Err(e) = run(params, port) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run(params: ProtocolParams, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let mut receiver = FpsiReceiver::new(params, DEFAULT_N)?;
    receiver.generate_data();

    let listener = TcpListener::bind(("0.0.0.0", port))?;
    info!(port, "waiting for the sender to connect");
    let (stream, peer) = listener.accept()?;
    stream.set_nodelay(true)?;
    info!(%peer, "sender connected");

    let mut chl = Channel::new(stream);
    receiver.run_offline(&mut chl)?;
    receiver.run_online(&mut chl)?;

    let stats = receiver.stats();
    print!("{stats}");
    for (i, vector) in receiver.fuzzy_intersection().iter().enumerate() {
        let prefix: String = vector.iter().take(20).map(|b| b.to_string()).collect();
        info!(match_index = i, prefix = %prefix, "fuzzy intersection entry");
    }
    stats.append_to(Path::new(STATS_FILE))?;

    info!("protocol complete");
    Ok(())
}
