//! Pubsub transport seam — `spec.md` §1 treats the overlay's pubsub bus as
//! an external collaborator; this trait is the boundary `discovery` depends
//! on. `swarmdl_core` ships no production implementation, only the trait and
//! test fakes, matching the teacher's habit of depending on thin traits at
//! I/O seams (`DownloadStrategy` in `rdm_core`).

use async_trait::async_trait;

use crate::model::{DiscoveryError, PeerId};

/// A single topic string, versioned per `spec.md` §6.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic(pub String);

impl Topic {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Topic name construction — `spec.md` §6's versioned topic strings.
pub struct Topics;

impl Topics {
    pub fn file_info_request(version: u16) -> Topic {
        Topic::new(format!("/download/fileinfo/request/{version}"))
    }

    pub fn manifest_request(version: u16) -> Topic {
        Topic::new(format!("/download/manifest/request/{version}"))
    }

    pub fn manifest_response(version: u16) -> Topic {
        Topic::new(format!("/download/manifest/response/{version}"))
    }

    pub fn content_request(version: u16) -> Topic {
        Topic::new(format!("/download/content/request/{version}"))
    }
}

/// Depended on by [`crate::discovery`] for all three request topics and the
/// response topic.
#[async_trait]
pub trait PubsubTransport: Send + Sync {
    /// Publishes a request and waits for exactly one private reply from the
    /// named peer — used for `file-info request` and `segment-content
    /// request`, both of which are request/reply (`spec.md` §6).
    async fn request_reply(&self, topic: &Topic, payload: Vec<u8>) -> Result<Vec<u8>, DiscoveryError>;

    /// Publishes a fire-and-forget message on `topic` — used for `manifest
    /// request`, whose replies arrive asynchronously on the response topic.
    async fn publish(&self, topic: &Topic, payload: Vec<u8>) -> Result<(), DiscoveryError>;

    /// Subscribes to `topic`, returning a channel of incoming payloads. Used
    /// to receive manifest responses.
    async fn subscribe(&self, topic: &Topic) -> Result<tokio::sync::mpsc::Receiver<(PeerId, Vec<u8>)>, DiscoveryError>;
}
