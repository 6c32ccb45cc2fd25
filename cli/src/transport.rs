//! Stand-in transports for the overlay network `swarmdl_core` depends on but
//! does not implement — the P2P pubsub bus and peer-stream layer are external
//! collaborators, out of scope for this repository. A real deployment links
//! in its own `PubsubTransport`/`StreamTransport` here; this binary ships
//! `NullTransport` so it links and runs standalone, reporting "no peers"
//! rather than silently doing nothing.

use async_trait::async_trait;
use tokio::sync::mpsc;

use swarmdl_core::discovery::{PubsubTransport, Topic};
use swarmdl_core::model::{DiscoveryError, PeerId, TransferError, TransferErrorCode};
use swarmdl_core::transfer::{SegmentStream, StreamTransport};

pub struct NullTransport;

#[async_trait]
impl PubsubTransport for NullTransport {
    async fn request_reply(&self, _topic: &Topic, _payload: Vec<u8>) -> Result<Vec<u8>, DiscoveryError> {
        Err(DiscoveryError::Transport("no pubsub overlay configured".into()))
    }

    async fn publish(&self, _topic: &Topic, _payload: Vec<u8>) -> Result<(), DiscoveryError> {
        Ok(())
    }

    async fn subscribe(&self, _topic: &Topic) -> Result<mpsc::Receiver<(PeerId, Vec<u8>)>, DiscoveryError> {
        let (_tx, rx) = mpsc::channel(1);
        Ok(rx)
    }
}

#[async_trait]
impl StreamTransport for NullTransport {
    async fn open_stream(&self, _peer: &PeerId) -> Result<Box<dyn SegmentStream>, TransferError> {
        Err(TransferError::new(TransferErrorCode::Network, "no stream overlay configured"))
    }
}
