use std::io;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tscast::{RtspServer, ServerConfig};

#[derive(Parser)]
#[command(
    name = "tscast-server",
    about = "RTSP streaming server for a catalog of MPEG-TS files"
)]
struct Args {
    /// RTSP control port
    #[arg(long, short, default_value_t = 8554)]
    port: u16,

    /// Directory containing the streamable files
    #[arg(long, short, default_value = ".")]
    catalog: PathBuf,

    /// Maximum concurrent client connections
    #[arg(long, default_value_t = 100)]
    max_connections: usize,

    /// Idle seconds before a client session is timed out
    #[arg(long, default_value_t = 60)]
    session_timeout: u64,
}

fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = ServerConfig {
        port: args.port,
        max_connections: args.max_connections,
        session_timeout: Duration::from_secs(args.session_timeout),
        catalog: args.catalog,
        ..ServerConfig::default()
    };

    let mut server = RtspServer::new(config);
    let events = server.subscribe();

    if let Err(e) = server.start() {
        eprintln!("failed to start server: {e}");
        std::process::exit(1);
    }

    std::thread::spawn(move || {
        for event in events {
            tracing::info!(event = ?event, "server event");
        }
    });

    println!("RTSP server on port {} — press Enter to stop", args.port);
    let mut input = String::new();
    let _ = io::stdin().read_line(&mut input);

    server.stop();
}
