//! FPSI Sender binary
//!
//! Connects to a listening Receiver and runs both protocol phases.

use std::net::TcpStream;
use std::path::Path;
use std::process;

use tracing::info;

use fpsi_engine::{FpsiSender, ProtocolParams, STATS_FILE};
use fpsi_protocol::Channel;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 12345;
const DEFAULT_M: usize = 256;

fn main() {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().collect();
    let host = args.get(1).cloned().unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port: u16 = match args.get(2) {
        Some(arg) => match arg.parse() {
            Ok(port) => port,
            Err(_) => {
                eprintln!("usage: fpsi-sender [host] [port]");
                process::exit(1);
            }
        },
        None => DEFAULT_PORT,
    };

    let params = ProtocolParams::new(128, 10, 8);
    info!(
        m = DEFAULT_M,
        d = params.d,
        delta = params.delta,
        l = params.l,
        host = %host,
        port,
        "fpsi sender starting"
    );

    if let Err(e) = run(params, &host, port) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run(params: ProtocolParams, host: &str, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let mut sender = FpsiSender::new(params, DEFAULT_M)?;
    sender.generate_data();

    let stream = TcpStream::connect((host, port))?;
    stream.set_nodelay(true)?;
    info!(host = %host, port, "connected to the receiver");

    let mut chl = Channel::new(stream);
    sender.run_offline(&mut chl)?;
    sender.run_online(&mut chl)?;

    let stats = sender.stats();
    print!("{stats}");
    stats.append_to(Path::new(STATS_FILE))?;

    info!("protocol complete");
    Ok(())
}
