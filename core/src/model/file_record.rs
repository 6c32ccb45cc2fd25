//! File-level task metadata — `spec.md` §3 "File Record".

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use super::ids::{FileId, SegmentId, TaskId};

/// One entry of the ordered slice table: `index -> (segment id, crc32, is_parity)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceTableEntry {
    pub index: u32,
    pub segment_id: SegmentId,
    pub crc32: u32,
    pub is_parity: bool,
}

/// File-level metadata echoed back by peers alongside segment content,
/// per `spec.md` §6's `SegmentContentResponse.file_meta`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    pub name: String,
    pub extension: String,
    pub size: u64,
    pub content_type: String,
    pub sha256: [u8; 32],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileStatus {
    Pending,
    FetchingInfo,
    Downloading,
    Paused,
    Completed,
    Cancelled,
    Failed,
}

impl FileStatus {
    /// Statuses the manager counts against `max-sessions` — `spec.md` §4.5.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            FileStatus::FetchingInfo | FileStatus::Pending | FileStatus::Downloading | FileStatus::Paused
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, FileStatus::Completed | FileStatus::Cancelled | FileStatus::Failed)
    }
}

/// One task's persisted metadata — `spec.md` §3 "File Record".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub task_id: TaskId,
    pub file_id: FileId,
    pub owner_pubkey_hash: Vec<u8>,
    /// The first of the two key shares; the second arrives per-segment in
    /// each `SegmentContentResponse` (`spec.md` §4.3(b)).
    pub key_share: Vec<u8>,
    pub destination_dir: String,
    pub meta: Option<FileMeta>,
    pub slice_table: Vec<SliceTableEntry>,
    pub status: FileStatus,
    pub created_at: u64,
    pub started_at: Option<u64>,
    pub finished_at: Option<u64>,
    /// Final output path, set once `finalize` succeeds.
    pub output_path: Option<String>,
}

impl FileRecord {
    pub fn new(
        task_id: TaskId,
        file_id: FileId,
        owner_pubkey_hash: Vec<u8>,
        key_share: Vec<u8>,
        destination_dir: impl Into<String>,
    ) -> Self {
        Self {
            task_id,
            file_id,
            owner_pubkey_hash,
            key_share,
            destination_dir: destination_dir.into(),
            meta: None,
            slice_table: Vec::new(),
            status: FileStatus::Pending,
            created_at: now_secs(),
            started_at: None,
            finished_at: None,
            output_path: None,
        }
    }

    /// Required data-shard count — `spec.md` §3 invariant.
    pub fn required_data_shards(&self) -> usize {
        self.slice_table.iter().filter(|e| !e.is_parity).count()
    }

    /// Validates the contiguity invariant from `spec.md` §3: segment indices
    /// must form `[0, N)` with no gaps.
    pub fn validate_slice_table(&self) -> Result<(), super::error::TaskError> {
        if self.slice_table.is_empty() {
            return Err(super::error::TaskError::EmptySliceTable(self.task_id.clone()));
        }
        let mut indices: Vec<u32> = self.slice_table.iter().map(|e| e.index).collect();
        indices.sort_unstable();
        for (expected, actual) in indices.iter().enumerate() {
            if expected as u32 != *actual {
                return Err(super::error::TaskError::NonContiguousSliceTable(self.task_id.clone()));
            }
        }
        Ok(())
    }
}

pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
