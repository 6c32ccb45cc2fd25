//! Error taxonomy for the engine, split into the three bands `spec.md` §7
//! describes: local-retry, per-peer-degradation, and task-fatal. Modeled on
//! `rdm_core::types::types::DownloadError` (one flat `thiserror` enum per
//! layer, `#[from]` conversions for the primitives underneath).

use thiserror::Error;

use super::ids::{PeerId, SegmentId, TaskId};

/// Structured per-transfer error, carrying a stable `code` (used in logs and
/// status events) alongside a human-readable `message`. `spec.md` §4.3/§7
/// calls for "structured, with code + message."
#[derive(Debug, Clone, Error)]
#[error("{code}: {message}")]
pub struct TransferError {
    pub code: TransferErrorCode,
    pub message: String,
}

impl TransferError {
    pub fn new(code: TransferErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Band classification per `spec.md` §7.
    pub fn is_local_retry(&self) -> bool {
        matches!(
            self.code,
            TransferErrorCode::OutOfSpace
                | TransferErrorCode::RateLimited
                | TransferErrorCode::Busy
                | TransferErrorCode::Network
                | TransferErrorCode::Timeout
        )
    }

    /// Per-peer degradation: the peer should be dropped from the segment's
    /// availability map and another peer tried.
    pub fn is_per_peer_degradation(&self) -> bool {
        matches!(
            self.code,
            TransferErrorCode::NotFound
                | TransferErrorCode::PermissionDenied
                | TransferErrorCode::Corrupted
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferErrorCode {
    NotFound,
    PermissionDenied,
    Corrupted,
    OutOfSpace,
    RateLimited,
    Busy,
    Network,
    Timeout,
    Other,
}

impl std::fmt::Display for TransferErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransferErrorCode::NotFound => "not-found",
            TransferErrorCode::PermissionDenied => "permission-denied",
            TransferErrorCode::Corrupted => "corrupted",
            TransferErrorCode::OutOfSpace => "out-of-space",
            TransferErrorCode::RateLimited => "rate-limited",
            TransferErrorCode::Busy => "busy",
            TransferErrorCode::Network => "network",
            TransferErrorCode::Timeout => "timeout",
            TransferErrorCode::Other => "other",
        };
        f.write_str(s)
    }
}

/// Task-fatal errors — `spec.md` §7's third band. These are reported on the
/// manager's error channel and drive the owning task to `Failed`.
#[derive(Debug, Clone, Error)]
pub enum TaskError {
    #[error("file record missing for task {0}")]
    FileRecordMissing(TaskId),
    #[error("slice table for task {0} is empty")]
    EmptySliceTable(TaskId),
    #[error("slice table indices for task {0} are non-contiguous")]
    NonContiguousSliceTable(TaskId),
    #[error("recovery exhausted for task {task}: needed {needed} more shard(s), none recoverable")]
    RecoveryExhausted { task: TaskId, needed: usize },
    #[error("encryption key recovery failed for segment {0}")]
    KeyRecoveryFailed(SegmentId),
    #[error("failed to write merged output for task {0}: {1}")]
    MergeWriteFailed(TaskId, String),
    #[error("downloading stalled for task {0}: {1} consecutive ticks with no progress")]
    DownloadingStalled(TaskId, u32),
    #[error("task {0} was cancelled")]
    Cancelled(TaskId),
    #[error("store error: {0}")]
    Store(String),
}

/// Errors from [`crate::manager::DownloadManager`] operations — `spec.md`
/// §4.5 and §8's boundary behaviors.
#[derive(Debug, Clone, Error)]
pub enum ManagerError {
    #[error("maximum concurrent downloads reached")]
    MaxConcurrencyReached,
    #[error("file {0} is already downloading")]
    AlreadyDownloading(FileIdDisplay),
    #[error("fewer than the configured minimum peers are known ({known} < {required})")]
    InsufficientPeers { known: usize, required: usize },
    #[error("task {0} not found")]
    TaskNotFound(TaskId),
    #[error("task {task} is in state {state:?}, which does not permit this operation")]
    InvalidTransition { task: TaskId, state: String },
    #[error("dispatch channel timed out sending task {0}")]
    DispatchTimeout(TaskId),
    #[error(transparent)]
    Task(#[from] TaskError),
}

/// A thin `Display`-only wrapper so `ManagerError::AlreadyDownloading` does
/// not need `FileId` to implement `Error`.
#[derive(Debug, Clone)]
pub struct FileIdDisplay(pub String);

impl std::fmt::Display for FileIdDisplay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<super::ids::FileId> for FileIdDisplay {
    fn from(id: super::ids::FileId) -> Self {
        Self(id.0)
    }
}

/// Errors surfaced while verifying/decrypting/decompressing a single
/// transfer response — feeds into [`TransferErrorCode::Corrupted`].
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("signature verification failed")]
    BadSignature,
    #[error("key recovery failed: {0}")]
    KeyRecovery(String),
    #[error("decryption failed: {0}")]
    Decrypt(String),
    #[error("crc32 mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch { expected: u32, actual: u32 },
    #[error("decompression failed: {0}")]
    Decompress(String),
}

/// Errors from [`crate::erasure::ErasureCodec`] operations.
#[derive(Debug, Error)]
pub enum ErasureError {
    #[error("not enough shards to reconstruct: have {have}, need {need}")]
    InsufficientShards { have: usize, need: usize },
    #[error("erasure codec error: {0}")]
    Codec(String),
}

/// Errors raised directly by a [`crate::discovery`] request, distinct from
/// the per-segment [`TransferError`] taxonomy used by the stream path.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request to peer {0} timed out")]
    Timeout(PeerId),
}
