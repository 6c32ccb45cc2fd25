//! In-memory reference implementations of the store traits. Adequate for the
//! manager's own bookkeeping and for tests; a durable backend lives behind
//! the same trait (`spec.md` §1 out-of-scope "embedded key-value and SQL
//! stores") and is not this repo's concern.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::model::{DownloadSegment, FileId, FileRecord, SegmentId, SegmentStatus, TaskId};

use super::traits::{FileRecordFilter, FileRecordStore, SegmentStore};

#[derive(Default)]
pub struct InMemoryFileRecordStore {
    records: RwLock<HashMap<TaskId, FileRecord>>,
}

impl InMemoryFileRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FileRecordStore for InMemoryFileRecordStore {
    async fn put(&self, record: FileRecord) -> Result<(), String> {
        self.records.write().unwrap().insert(record.task_id.clone(), record);
        Ok(())
    }

    async fn get(&self, task_id: &TaskId) -> Result<Option<FileRecord>, String> {
        Ok(self.records.read().unwrap().get(task_id).cloned())
    }

    async fn delete(&self, task_id: &TaskId) -> Result<(), String> {
        self.records.write().unwrap().remove(task_id);
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<FileRecord>, String> {
        Ok(self.records.read().unwrap().values().cloned().collect())
    }

    async fn query(
        &self,
        start: usize,
        page_size: usize,
        filter: FileRecordFilter,
    ) -> Result<(Vec<FileRecord>, usize), String> {
        let guard = self.records.read().unwrap();
        let mut all: Vec<FileRecord> = guard
            .values()
            .filter(|r| filter.status.map(|s| s == r.status).unwrap_or(true))
            .cloned()
            .collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.task_id.0.cmp(&b.task_id.0)));
        let total = all.len();
        let page = all.into_iter().skip(start).take(page_size).collect();
        Ok((page, total))
    }

    async fn find_active_by_file_id(&self, file_id: &FileId) -> Result<Option<TaskId>, String> {
        let guard = self.records.read().unwrap();
        Ok(guard
            .values()
            .find(|r| &r.file_id == file_id && !r.status.is_terminal())
            .map(|r| r.task_id.clone()))
    }
}

#[derive(Default)]
pub struct InMemorySegmentStore {
    segments: RwLock<HashMap<SegmentId, DownloadSegment>>,
}

impl InMemorySegmentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SegmentStore for InMemorySegmentStore {
    async fn put(&self, segment: DownloadSegment) -> Result<(), String> {
        self.segments.write().unwrap().insert(segment.segment_id.clone(), segment);
        Ok(())
    }

    async fn get(&self, segment_id: &SegmentId) -> Result<Option<DownloadSegment>, String> {
        Ok(self.segments.read().unwrap().get(segment_id).cloned())
    }

    async fn list_by_task(&self, task_id: &TaskId) -> Result<Vec<DownloadSegment>, String> {
        Ok(self
            .segments
            .read()
            .unwrap()
            .values()
            .filter(|s| &s.task_id == task_id)
            .cloned()
            .collect())
    }

    async fn list_by_task_and_status(
        &self,
        task_id: &TaskId,
        status: SegmentStatus,
    ) -> Result<Vec<DownloadSegment>, String> {
        Ok(self
            .segments
            .read()
            .unwrap()
            .values()
            .filter(|s| &s.task_id == task_id && s.status == status)
            .cloned()
            .collect())
    }

    async fn delete_all_for_task(&self, task_id: &TaskId) -> Result<(), String> {
        self.segments.write().unwrap().retain(|_, s| &s.task_id != task_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FileStatus;

    fn sample_record(task_id: &str, file_id: &str, status: FileStatus) -> FileRecord {
        let mut r = FileRecord::new(
            TaskId::from(task_id),
            FileId::from(file_id),
            vec![1, 2, 3],
            vec![4, 5, 6],
            "/tmp",
        );
        r.status = status;
        r
    }

    #[tokio::test]
    async fn find_active_by_file_id_ignores_terminal() {
        let store = InMemoryFileRecordStore::new();
        store.put(sample_record("t1", "f1", FileStatus::Completed)).await.unwrap();
        assert!(store.find_active_by_file_id(&FileId::from("f1")).await.unwrap().is_none());

        store.put(sample_record("t2", "f2", FileStatus::Downloading)).await.unwrap();
        assert_eq!(
            store.find_active_by_file_id(&FileId::from("f2")).await.unwrap(),
            Some(TaskId::from("t2"))
        );
    }

    #[tokio::test]
    async fn query_pages_and_filters() {
        let store = InMemoryFileRecordStore::new();
        for i in 0..5 {
            store
                .put(sample_record(&format!("t{i}"), &format!("f{i}"), FileStatus::Paused))
                .await
                .unwrap();
        }
        let (page, total) = store
            .query(0, 2, FileRecordFilter { status: Some(FileStatus::Paused) })
            .await
            .unwrap();
        assert_eq!(total, 5);
        assert_eq!(page.len(), 2);
    }

    #[tokio::test]
    async fn segment_store_delete_all_for_task() {
        let store = InMemorySegmentStore::new();
        let task = TaskId::from("t1");
        for i in 0..3 {
            store
                .put(DownloadSegment::new(task.clone(), SegmentId::from(format!("s{i}").as_str()), i, 0, false))
                .await
                .unwrap();
        }
        assert_eq!(store.list_by_task(&task).await.unwrap().len(), 3);
        store.delete_all_for_task(&task).await.unwrap();
        assert!(store.list_by_task(&task).await.unwrap().is_empty());
    }
}
