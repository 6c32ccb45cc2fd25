//! Stream transport seam — `spec.md` §1 treats the bidirectional stream
//! overlay as an external collaborator. `swarmdl_core` only depends on this
//! trait; no production implementation ships here.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::model::{PeerId, TransferError};

/// An opened bidirectional stream to a peer, ready for framed request/response.
pub trait SegmentStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> SegmentStream for T {}

#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// Opens a bidirectional stream to `peer` on the protocol named in
    /// `spec.md` §6 ("…/stream/request/segment/<v>").
    async fn open_stream(&self, peer: &PeerId) -> Result<Box<dyn SegmentStream>, TransferError>;
}
