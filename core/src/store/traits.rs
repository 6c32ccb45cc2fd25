//! Store seams — `spec.md` §1/§6 treat the embedded key-value/SQL store as
//! an external collaborator. These traits are the boundary the rest of the
//! engine depends on; `super::memory` ships the in-memory reference
//! implementation used by tests and by default.

use async_trait::async_trait;

use crate::model::{DownloadSegment, FileRecord, SegmentId, SegmentStatus, TaskId};

/// Query filters for [`FileRecordStore::query`] — `spec.md` §4.5 `query`.
#[derive(Debug, Clone, Default)]
pub struct FileRecordFilter {
    pub status: Option<crate::model::FileStatus>,
}

#[async_trait]
pub trait FileRecordStore: Send + Sync {
    async fn put(&self, record: FileRecord) -> Result<(), String>;
    async fn get(&self, task_id: &TaskId) -> Result<Option<FileRecord>, String>;
    async fn delete(&self, task_id: &TaskId) -> Result<(), String>;
    /// All records, for manager startup reconciliation (`spec.md` §4.5).
    async fn list_all(&self) -> Result<Vec<FileRecord>, String>;
    /// Paged scan — `spec.md` §4.5 `query(start, pageSize, filters...)`.
    async fn query(
        &self,
        start: usize,
        page_size: usize,
        filter: FileRecordFilter,
    ) -> Result<(Vec<FileRecord>, usize), String>;
    /// Whether a non-terminal task already exists for this file id —
    /// `spec.md` §4.5 `new-download`'s "already downloading" rejection.
    async fn find_active_by_file_id(&self, file_id: &crate::model::FileId) -> Result<Option<TaskId>, String>;
}

#[async_trait]
pub trait SegmentStore: Send + Sync {
    async fn put(&self, segment: DownloadSegment) -> Result<(), String>;
    async fn get(&self, segment_id: &SegmentId) -> Result<Option<DownloadSegment>, String>;
    async fn list_by_task(&self, task_id: &TaskId) -> Result<Vec<DownloadSegment>, String>;
    async fn list_by_task_and_status(
        &self,
        task_id: &TaskId,
        status: SegmentStatus,
    ) -> Result<Vec<DownloadSegment>, String>;
    /// Deletes every segment belonging to a task — used by `finalize`
    /// (`spec.md` §4.1) in a single transactional sweep.
    async fn delete_all_for_task(&self, task_id: &TaskId) -> Result<(), String>;
}
