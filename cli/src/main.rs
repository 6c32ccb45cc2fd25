use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;

use swarmdl_core::codec::AddrInfo;
use swarmdl_core::config::Config;
use swarmdl_core::crypto::{P256SignatureVerifier, SharksKeyRecovery};
use swarmdl_core::manager::DownloadManager;
use swarmdl_core::model::PeerId;
use swarmdl_core::store::{InMemoryFileRecordStore, InMemorySegmentStore};

mod terminal_observer;
mod transport;

use terminal_observer::TerminalProgressObserver;
use transport::NullTransport;

/// Drives one download through a `DownloadManager` and renders its progress.
#[derive(Parser)]
#[command(name = "swarmdl", about = "Peer-to-peer file download client")]
struct Args {
    /// File id to download.
    #[arg(short, long)]
    file_id: String,

    /// Owner private key, hex-encoded. Falls back to the configured default
    /// identity if omitted.
    #[arg(short = 'k', long)]
    owner_key: Option<String>,

    /// Destination directory for the merged output.
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Number of peers to report as known — stands in for the overlay's real
    /// membership count until one is wired in.
    #[arg(long, default_value_t = 1)]
    known_peers: usize,

    /// Maximum number of downloads the manager will run concurrently.
    #[arg(long, default_value_t = Config::default().max_sessions)]
    max_sessions: usize,
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let args = Args::parse();

    let owner_key = match &args.owner_key {
        Some(hex) => decode_hex(hex).unwrap_or_else(|e| {
            eprintln!("invalid --owner-key: {e}");
            std::process::exit(2);
        }),
        None => Config::default().owner_private_key,
    };

    let mut cfg = Config::default();
    cfg.max_sessions = args.max_sessions;

    let manager = DownloadManager::start(
        cfg,
        AddrInfo { peer_id: PeerId::generate(), multiaddrs: vec![] },
        std::sync::Arc::new(InMemoryFileRecordStore::new()),
        std::sync::Arc::new(InMemorySegmentStore::new()),
        std::sync::Arc::new(NullTransport),
        std::sync::Arc::new(NullTransport),
        std::sync::Arc::new(P256SignatureVerifier),
        std::sync::Arc::new(SharksKeyRecovery::default()),
    )
    .await;
    manager.set_known_peer_count(args.known_peers);

    let status_rx = manager.subscribe_status();
    let error_rx = manager.subscribe_errors();

    println!("Starting download: {}", args.file_id);
    let start = Instant::now();

    let task_id = match manager
        .new_download(&owner_key, args.file_id.clone().into(), args.output.display().to_string())
        .await
    {
        Ok(id) => id,
        Err(e) => {
            eprintln!("Download failed to start: {e}");
            std::process::exit(1);
        }
    };

    let observer = TerminalProgressObserver::new();
    observer.watch(&task_id, status_rx, error_rx).await;

    let elapsed = start.elapsed();
    println!("Finished in {:.2}s (task {task_id})", elapsed.as_secs_f64());
}

fn decode_hex(s: &str) -> Result<Vec<u8>, String> {
    let s = s.trim();
    if s.len() % 2 != 0 {
        return Err("hex string must have an even length".into());
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|e| e.to_string()))
        .collect()
}
