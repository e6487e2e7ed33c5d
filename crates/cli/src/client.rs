use std::io;
use std::path::PathBuf;

use clap::Parser;
use tscast::{RtspClient, parse_request_url};

#[derive(Parser)]
#[command(
    name = "tscast-client",
    about = "Fetch a stream from a tscast RTSP server into a local file"
)]
struct Args {
    /// Stream URL, e.g. rtsp://host:8554/movie.ts
    url: String,

    /// Output file path
    #[arg(long, short)]
    output: PathBuf,

    /// Start position in seconds
    #[arg(long)]
    seek: Option<f64>,
}

fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let (host, port, name) = match parse_request_url(&args.url) {
        Ok(parts) => parts,
        Err(e) => {
            eprintln!("bad URL: {e}");
            std::process::exit(2);
        }
    };

    let mut client = RtspClient::new();
    if let Err(e) = client.connect(&host, port) {
        eprintln!("could not connect to {host}:{port}: {e}");
        std::process::exit(1);
    }
    if let Err(e) = client.open_stream(&args.url, &args.output) {
        eprintln!("could not open {name}: {e}");
        std::process::exit(1);
    }
    if let Some(seek) = args.seek
        && let Err(e) = client.seek_stream(seek)
    {
        eprintln!("seek failed: {e}");
        std::process::exit(1);
    }

    println!(
        "receiving {} into {} ({} s) — press Enter to stop",
        name,
        args.output.display(),
        client.duration()
    );
    let mut input = String::new();
    let _ = io::stdin().read_line(&mut input);

    let _ = client.teardown_stream();
    client.disconnect();
}
