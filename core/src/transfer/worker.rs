//! Bounded worker-pool fan-out for one `network-transfer` round — `spec.md`
//! §4.1 "Network-transfer" and §4.3's per-peer/total worker caps. Grounded on
//! `MultipartDownloadStrategy::download`'s per-unit `tokio::spawn` fan-out
//! (`rdm_core`), generalized from "piece of one HTTP download" to "segment
//! of one peer assignment" and bounded by a semaphore rather than spawning
//! one task per segment unconditionally.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::codec::{self, AddrInfo, ContentRequest, StreamEnvelope};
use crate::config::Config;
use crate::crypto::{KeyRecovery, SignatureVerifier};
use crate::model::{
    FileId, FileMeta, PeerAssignment, PeerId, SegmentId, SegmentPayload, SegmentStatus, SliceTableEntry, TaskId,
    TransferError, TransferErrorCode,
};
use crate::store::SegmentStore;

use super::framing::{read_frame, write_frame};
use super::pipeline::{process_segment_response, ProcessContext};
use super::stream::StreamTransport;

/// Per-task facts threaded into every segment request on this transfer
/// round — identity plus the file-level data the verification pipeline
/// needs.
pub struct SegmentRequestContext {
    pub task_id: TaskId,
    pub file_id: FileId,
    pub owner_pubkey_hash: Vec<u8>,
    pub requester: AddrInfo,
    pub task_key_share: Vec<u8>,
    pub file_meta: FileMeta,
    pub slice_table: Vec<SliceTableEntry>,
}

pub struct TransferDeps {
    pub stream_transport: Arc<dyn StreamTransport>,
    pub segment_store: Arc<dyn SegmentStore>,
    pub verifier: Arc<dyn SignatureVerifier>,
    pub key_recovery: Arc<dyn KeyRecovery>,
}

#[derive(Default, Debug)]
pub struct TransferRoundOutcome {
    pub completed: Vec<(SegmentId, PeerId)>,
    /// Segments whose peer returned a terminal per-peer error this round —
    /// the caller removes `peer` from the segment's availability map
    /// (`spec.md` §4.3: "A peer returning a terminal error for a segment is
    /// removed from that segment's availability map.").
    pub degraded: Vec<(SegmentId, PeerId)>,
    pub errors: Vec<(PeerId, TransferError)>,
}

impl TransferRoundOutcome {
    pub fn any_success(&self) -> bool {
        !self.completed.is_empty()
    }

    fn merge(&mut self, other: TransferRoundOutcome) {
        self.completed.extend(other.completed);
        self.degraded.extend(other.degraded);
        self.errors.extend(other.errors);
    }
}

/// Splits `segment_ids` into worker chunks, preferring `chunk_size` but
/// never producing more than `max_workers` chunks for this peer — `spec.md`
/// §4.3 "segments-per-worker" / "max-workers-per-peer".
fn chunk_for_peer(segment_ids: &[SegmentId], chunk_size: usize, max_workers: usize) -> Vec<Vec<SegmentId>> {
    if segment_ids.is_empty() {
        return Vec::new();
    }
    let chunk_size = chunk_size.max(1);
    let natural_chunks = segment_ids.len().div_ceil(chunk_size);
    let effective_chunk_size = if natural_chunks > max_workers && max_workers > 0 {
        segment_ids.len().div_ceil(max_workers)
    } else {
        chunk_size
    };
    segment_ids.chunks(effective_chunk_size.max(1)).map(|c| c.to_vec()).collect()
}

/// Runs one `network-transfer` round for the drained assignments: for each
/// peer, opens one or more streams (bounded by the per-peer and total worker
/// caps) and transfers the assigned segments concurrently.
pub async fn run_transfer_round(
    assignments: Vec<PeerAssignment>,
    ctx: Arc<SegmentRequestContext>,
    deps: Arc<TransferDeps>,
    cfg: &Config,
    cancel: CancellationToken,
) -> TransferRoundOutcome {
    let total_permits = Arc::new(Semaphore::new(cfg.max_total_workers.max(1)));
    let mut join_set = tokio::task::JoinSet::new();

    for assignment in assignments {
        let chunks = chunk_for_peer(&assignment.segment_ids, cfg.segments_per_worker, cfg.max_workers_per_peer);
        for chunk in chunks {
            let permits = Arc::clone(&total_permits);
            let ctx = Arc::clone(&ctx);
            let deps = Arc::clone(&deps);
            let peer = assignment.peer.clone();
            let cancel = cancel.clone();
            let conn_timeout = cfg.conn_timeout;
            let max_block_size = cfg.max_block_size;
            join_set.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                run_worker(peer, chunk, ctx, deps, conn_timeout, max_block_size, cancel).await
            });
        }
    }

    let mut outcome = TransferRoundOutcome::default();
    while let Some(res) = join_set.join_next().await {
        if let Ok(worker_outcome) = res {
            outcome.merge(worker_outcome);
        }
    }
    outcome
}

async fn run_worker(
    peer: PeerId,
    segment_ids: Vec<SegmentId>,
    ctx: Arc<SegmentRequestContext>,
    deps: Arc<TransferDeps>,
    conn_timeout: Duration,
    max_block_size: usize,
    cancel: CancellationToken,
) -> TransferRoundOutcome {
    let mut outcome = TransferRoundOutcome::default();

    let mut stream = match deps.stream_transport.open_stream(&peer).await {
        Ok(s) => s,
        Err(e) => {
            outcome.errors.push((peer, e));
            return outcome;
        }
    };

    for segment_id in segment_ids {
        if cancel.is_cancelled() {
            break;
        }
        match fetch_and_process_one(stream.as_mut(), &peer, &segment_id, &ctx, &deps, conn_timeout, max_block_size).await {
            Ok(()) => outcome.completed.push((segment_id, peer.clone())),
            Err(e) if e.is_per_peer_degradation() => {
                persist_failure(&deps, &segment_id, Some(&peer)).await;
                outcome.degraded.push((segment_id, peer.clone()));
                outcome.errors.push((peer.clone(), e));
            }
            Err(e) => {
                revert_to_pending(&deps, &segment_id).await;
                outcome.errors.push((peer.clone(), e));
            }
        }
    }
    outcome
}

fn timeout_error(_: tokio::time::error::Elapsed) -> TransferError {
    TransferError::new(TransferErrorCode::Timeout, "deadline exceeded")
}

async fn fetch_and_process_one(
    stream: &mut dyn super::stream::SegmentStream,
    peer: &PeerId,
    segment_id: &SegmentId,
    ctx: &SegmentRequestContext,
    deps: &TransferDeps,
    conn_timeout: Duration,
    max_block_size: usize,
) -> Result<(), TransferError> {
    let segment = deps
        .segment_store
        .get(segment_id)
        .await
        .map_err(|e| TransferError::new(TransferErrorCode::Other, e))?
        .ok_or_else(|| TransferError::new(TransferErrorCode::NotFound, "segment unknown to local store"))?;

    if matches!(segment.status, SegmentStatus::Completed) {
        return Ok(());
    }

    mark_downloading(deps, segment_id).await;

    let request = ContentRequest {
        version: codec::CURRENT_PROTOCOL_VERSION,
        task_id: ctx.task_id.clone(),
        file_id: ctx.file_id.clone(),
        owner_pubkey_hash: ctx.owner_pubkey_hash.clone(),
        requester: ctx.requester.clone(),
        segment_id: segment_id.clone(),
        segment_index: segment.segment_index,
    };
    let payload = codec::encode(&request).map_err(|e| TransferError::new(TransferErrorCode::Other, e.to_string()))?;

    timeout(conn_timeout, write_frame(stream, &payload))
        .await
        .map_err(timeout_error)??;

    let response_bytes = timeout(conn_timeout, read_frame(stream, max_block_size))
        .await
        .map_err(timeout_error)??;

    let envelope: StreamEnvelope =
        codec::decode(&response_bytes).map_err(|e| TransferError::new(TransferErrorCode::Other, e.to_string()))?;

    let response = match envelope {
        StreamEnvelope::Content(r) => r,
        StreamEnvelope::Error { code, message } => return Err(error_from_envelope(&code, message)),
    };

    let process_ctx = ProcessContext {
        file_id: &ctx.file_id,
        file_meta: &ctx.file_meta,
        slice_table: &ctx.slice_table,
        task_key_share: &ctx.task_key_share,
    };
    let plaintext = process_segment_response(&process_ctx, &response, deps.verifier.as_ref(), deps.key_recovery.as_ref())
        .map_err(|e| TransferError::new(TransferErrorCode::Corrupted, e.to_string()))?;

    persist_success(deps, segment_id, plaintext, response.key_share.clone(), peer.clone()).await;
    Ok(())
}

/// Maps a framed error envelope's `code` string to the `spec.md` §4.3 error
/// taxonomy.
fn error_from_envelope(code: &str, message: String) -> TransferError {
    let classified = match code {
        "not-found" => TransferErrorCode::NotFound,
        "permission-denied" => TransferErrorCode::PermissionDenied,
        "corrupted" => TransferErrorCode::Corrupted,
        "out-of-space" => TransferErrorCode::OutOfSpace,
        "rate-limited" => TransferErrorCode::RateLimited,
        "busy" => TransferErrorCode::Busy,
        "network" => TransferErrorCode::Network,
        "timeout" => TransferErrorCode::Timeout,
        _ => TransferErrorCode::Other,
    };
    TransferError::new(classified, message)
}

/// Marks a segment `downloading` once a worker claims it for this round —
/// `spec.md` §3: "Segment: pending → downloading → (completed | failed)".
/// Keeps `on_process`'s pending-match set from re-dispatching a segment
/// that's already in flight with another peer.
async fn mark_downloading(deps: &TransferDeps, segment_id: &SegmentId) {
    if let Ok(Some(mut segment)) = deps.segment_store.get(segment_id).await {
        if matches!(segment.status, SegmentStatus::Pending) {
            segment.status = SegmentStatus::Downloading;
            let _ = deps.segment_store.put(segment).await;
        }
    }
}

/// Reverts a segment back to `pending` after a local-retry-class transfer
/// error, so the next `segment-process` tick can re-queue it for another
/// peer instead of leaving it stuck in `downloading` forever.
async fn revert_to_pending(deps: &TransferDeps, segment_id: &SegmentId) {
    if let Ok(Some(mut segment)) = deps.segment_store.get(segment_id).await {
        if matches!(segment.status, SegmentStatus::Downloading) {
            segment.status = SegmentStatus::Pending;
            let _ = deps.segment_store.put(segment).await;
        }
    }
}

async fn persist_success(deps: &TransferDeps, segment_id: &SegmentId, plaintext: Vec<u8>, key_share_b: Vec<u8>, peer: PeerId) {
    if let Ok(Some(mut segment)) = deps.segment_store.get(segment_id).await {
        segment.status = SegmentStatus::Completed;
        segment.payload = Some(SegmentPayload::Bytes(plaintext));
        segment.key_share_b = Some(key_share_b);
        segment.completed_by = Some(peer);
        let _ = deps.segment_store.put(segment).await;
    }
}

/// Marks a segment `failed` and, if a peer returned a terminal per-peer
/// error, removes it from the segment's availability map.
async fn persist_failure(deps: &TransferDeps, segment_id: &SegmentId, terminal_peer: Option<&PeerId>) {
    if let Ok(Some(mut segment)) = deps.segment_store.get(segment_id).await {
        if matches!(segment.status, SegmentStatus::Completed) {
            return;
        }
        segment.status = SegmentStatus::Failed;
        if let Some(peer) = terminal_peer {
            segment.remove_peer(peer);
        }
        let _ = deps.segment_store.put(segment).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::signature::P256SignatureVerifier;
    use crate::model::{DownloadSegment, FileId, SegmentId, TaskId, VerifyError};
    use crate::store::{InMemorySegmentStore, SegmentStore};
    use async_trait::async_trait;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use p256::ecdsa::signature::Signer;
    use p256::ecdsa::{Signature, SigningKey};
    use rand::rngs::OsRng;
    use std::io::{Cursor, Write};
    use std::sync::Mutex as StdMutex;

    struct FixedKeyRecovery(Vec<u8>);
    impl KeyRecovery for FixedKeyRecovery {
        fn recover(&self, _shares: &[Vec<u8>]) -> Result<Vec<u8>, VerifyError> {
            Ok(self.0.clone())
        }
    }

    /// A stream backed by an in-memory cursor pre-loaded with one framed
    /// response, and a write side that discards bytes.
    struct FakeStream {
        read_buf: Cursor<Vec<u8>>,
        written: StdMutex<Vec<u8>>,
    }

    impl tokio::io::AsyncRead for FakeStream {
        fn poll_read(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::pin::Pin::new(&mut self.read_buf).poll_read(cx, buf)
        }
    }

    impl tokio::io::AsyncWrite for FakeStream {
        fn poll_write(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            buf: &[u8],
        ) -> std::task::Poll<Result<usize, std::io::Error>> {
            self.written.lock().unwrap().extend_from_slice(buf);
            std::task::Poll::Ready(Ok(buf.len()))
        }
        fn poll_flush(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Result<(), std::io::Error>> {
            std::task::Poll::Ready(Ok(()))
        }
        fn poll_shutdown(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Result<(), std::io::Error>> {
            std::task::Poll::Ready(Ok(()))
        }
    }

    struct FakeStreamTransport {
        frame: StdMutex<Option<Vec<u8>>>,
    }

    #[async_trait]
    impl StreamTransport for FakeStreamTransport {
        async fn open_stream(&self, _peer: &PeerId) -> Result<Box<dyn crate::transfer::stream::SegmentStream>, TransferError> {
            let frame = self.frame.lock().unwrap().clone().expect("frame preloaded");
            let mut buf = Vec::new();
            buf.extend_from_slice(&(frame.len() as u32).to_be_bytes());
            buf.extend_from_slice(&frame);
            Ok(Box::new(FakeStream { read_buf: Cursor::new(buf), written: StdMutex::new(Vec::new()) }))
        }
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[tokio::test]
    async fn happy_path_persists_completed_segment() {
        let signing_key = SigningKey::random(&mut OsRng);
        let meta = FileMeta {
            name: "f".into(),
            extension: "bin".into(),
            size: 4,
            content_type: "application/octet-stream".into(),
            sha256: [0u8; 32],
        };
        let secret = b"recovered-secret".to_vec();
        let compressed = gzip(b"segment plaintext");
        let crc = crate::crypto::crc32(&compressed);

        let key = crate::crypto::cipher::derive_key(&secret);
        use aes_gcm::aead::Aead;
        use aes_gcm::{Aes128Gcm, KeyInit, Nonce};
        let cipher = Aes128Gcm::new_from_slice(&key).unwrap();
        let nonce_bytes = [3u8; 12];
        let nonce = Nonce::from_slice(&nonce_bytes);
        let mut encrypted = nonce_bytes.to_vec();
        encrypted.extend(cipher.encrypt(nonce, compressed.as_slice()).unwrap());

        let segment_id = SegmentId::from("s0");
        let slice_table = vec![SliceTableEntry { index: 0, segment_id: segment_id.clone(), crc32: crc, is_parity: false }];
        let message = crate::crypto::canonical_message_for_meta(&FileId::from("f1"), &meta, &slice_table, &segment_id, 0, crc, &encrypted);
        let signature: Signature = signing_key.sign(&message);
        let verifying_key = p256::ecdsa::VerifyingKey::from(&signing_key);
        let script = verifying_key.to_encoded_point(true).as_bytes().to_vec();

        let response = crate::codec::SegmentContentResponse {
            version: 1,
            task_id: TaskId::from("t1"),
            segment_id: segment_id.clone(),
            segment_index: 0,
            crc32: crc,
            is_parity: false,
            key_share: vec![9, 9, 9],
            encrypted_payload: encrypted,
            signature_der: signature.to_der().as_bytes().to_vec(),
            script,
        };
        let envelope = StreamEnvelope::Content(response);
        let frame = codec::encode(&envelope).unwrap();

        let segment_store = Arc::new(InMemorySegmentStore::new());
        segment_store
            .put(DownloadSegment::new(TaskId::from("t1"), segment_id.clone(), 0, crc, false))
            .await
            .unwrap();

        let deps = Arc::new(TransferDeps {
            stream_transport: Arc::new(FakeStreamTransport { frame: StdMutex::new(Some(frame)) }),
            segment_store: segment_store.clone(),
            verifier: Arc::new(P256SignatureVerifier),
            key_recovery: Arc::new(FixedKeyRecovery(secret)),
        });
        let ctx = Arc::new(SegmentRequestContext {
            task_id: TaskId::from("t1"),
            file_id: FileId::from("f1"),
            owner_pubkey_hash: vec![1, 2, 3],
            requester: AddrInfo { peer_id: PeerId::from("me"), multiaddrs: vec![] },
            task_key_share: vec![1, 2, 3],
            file_meta: meta,
            slice_table,
        });

        let assignments = vec![PeerAssignment { peer: PeerId::from("peerA"), segment_ids: vec![segment_id.clone()] }];
        let outcome = run_transfer_round(assignments, ctx, deps, &Config::default(), CancellationToken::new()).await;

        assert_eq!(outcome.completed.len(), 1);
        assert!(outcome.errors.is_empty());
        let stored = segment_store.get(&segment_id).await.unwrap().unwrap();
        assert!(matches!(stored.status, SegmentStatus::Completed));
    }

    #[tokio::test]
    async fn local_retry_error_reverts_segment_to_pending() {
        let segment_id = SegmentId::from("s0");
        let envelope = StreamEnvelope::Error { code: "network".into(), message: "peer unreachable".into() };
        let frame = codec::encode(&envelope).unwrap();

        let segment_store = Arc::new(InMemorySegmentStore::new());
        segment_store
            .put(DownloadSegment::new(TaskId::from("t1"), segment_id.clone(), 0, 0, false))
            .await
            .unwrap();

        let deps = Arc::new(TransferDeps {
            stream_transport: Arc::new(FakeStreamTransport { frame: StdMutex::new(Some(frame)) }),
            segment_store: segment_store.clone(),
            verifier: Arc::new(P256SignatureVerifier),
            key_recovery: Arc::new(FixedKeyRecovery(b"irrelevant".to_vec())),
        });
        let ctx = Arc::new(SegmentRequestContext {
            task_id: TaskId::from("t1"),
            file_id: FileId::from("f1"),
            owner_pubkey_hash: vec![1, 2, 3],
            requester: AddrInfo { peer_id: PeerId::from("me"), multiaddrs: vec![] },
            task_key_share: vec![1, 2, 3],
            file_meta: FileMeta {
                name: "f".into(),
                extension: "bin".into(),
                size: 4,
                content_type: "application/octet-stream".into(),
                sha256: [0u8; 32],
            },
            slice_table: vec![SliceTableEntry { index: 0, segment_id: segment_id.clone(), crc32: 0, is_parity: false }],
        });

        let assignments = vec![PeerAssignment { peer: PeerId::from("peerA"), segment_ids: vec![segment_id.clone()] }];
        let outcome = run_transfer_round(assignments, ctx, deps, &Config::default(), CancellationToken::new()).await;

        assert!(outcome.completed.is_empty());
        assert_eq!(outcome.errors.len(), 1);
        // Marked `downloading` on pickup, then reverted to `pending` since a
        // network error is local-retry, not per-peer degradation — it must
        // stay retriable rather than stick in `downloading` forever.
        let stored = segment_store.get(&segment_id).await.unwrap().unwrap();
        assert!(matches!(stored.status, SegmentStatus::Pending));
    }

    #[test]
    fn chunking_respects_per_peer_worker_cap() {
        let ids: Vec<SegmentId> = (0..25).map(|i| SegmentId::from(format!("s{i}").as_str())).collect();
        let chunks = chunk_for_peer(&ids, 10, 2);
        assert!(chunks.len() <= 2);
        let total: usize = chunks.iter().map(|c| c.len()).sum();
        assert_eq!(total, 25);
    }

    #[test]
    fn chunking_uses_segments_per_worker_when_under_cap() {
        let ids: Vec<SegmentId> = (0..5).map(|i| SegmentId::from(format!("s{i}").as_str())).collect();
        let chunks = chunk_for_peer(&ids, 10, 50);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 5);
    }
}
