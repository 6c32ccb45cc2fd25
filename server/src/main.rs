mod hex;
mod server;
mod transport;
mod types;

use std::sync::Arc;

use swarmdl_core::codec::AddrInfo;
use swarmdl_core::config::Config;
use swarmdl_core::crypto::{P256SignatureVerifier, SharksKeyRecovery};
use swarmdl_core::manager::DownloadManager;
use swarmdl_core::model::PeerId;
use swarmdl_core::store::{InMemoryFileRecordStore, InMemorySegmentStore};

use server::AppState;
use transport::NullTransport;

#[tokio::main]
async fn main() {
    env_logger::init();

    let host = std::env::var("SWARMDL_HOST").unwrap_or_else(|_| "127.0.0.1".into());
    let port: u16 = std::env::var("SWARMDL_PORT").ok().and_then(|p| p.parse().ok()).unwrap_or(7878);

    let manager = DownloadManager::start(
        Config::default(),
        AddrInfo { peer_id: PeerId::generate(), multiaddrs: vec![] },
        Arc::new(InMemoryFileRecordStore::new()),
        Arc::new(InMemorySegmentStore::new()),
        Arc::new(NullTransport),
        Arc::new(NullTransport),
        Arc::new(P256SignatureVerifier),
        Arc::new(SharksKeyRecovery::default()),
    )
    .await;
    // Stand-in for a real membership source; raise it once peer discovery is
    // wired in, same caveat as `swarmdl_cli::transport::NullTransport`.
    manager.set_known_peer_count(1);

    let state = AppState { manager };
    let app = server::router(state);

    let addr = format!("{host}:{port}");
    log::info!("listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await.expect("bind address");
    axum::serve(listener, app).await.expect("serve");
}
