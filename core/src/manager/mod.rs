//! The download manager — `spec.md` §4.5. Holds the concurrent map of live
//! tasks, enforces the active-session cap, and owns the two bounded
//! broadcast channels (status, error) every task reports onto. Grounded on
//! `rdm_server::server`'s `AppState` (a locked map of active work plus
//! shared output channels), generalized from "one HTTP download" to "one
//! P2P task" and given the startup-reconciliation rule the teacher has no
//! analogue for, since it has no persistence layer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock as StdRwLock};
use std::time::Duration;

use log::{info, warn};
use tokio::sync::{broadcast, mpsc};

use crate::codec::AddrInfo;
use crate::config::Config;
use crate::crypto::{KeyRecovery, SignatureVerifier};
use crate::discovery::PubsubTransport;
use crate::model::{
    FileId, FileRecord, FileStatus, ManagerError, StatusEvent, TaskError, TaskId,
};
use crate::store::{FileRecordFilter, FileRecordStore, SegmentStore};
use crate::task::{self, TaskDeps, TaskHandle};
use crate::transfer::StreamTransport;

const STATUS_CHANNEL_CAPACITY: usize = 100;
const ERROR_CHANNEL_CAPACITY: usize = 100;
const DISPATCH_CHANNEL_CAPACITY: usize = 5;
const DISPATCH_TIMEOUT: Duration = Duration::from_secs(5);

pub struct DownloadManager {
    cfg: Config,
    local_addr: AddrInfo,
    file_store: Arc<dyn FileRecordStore>,
    segment_store: Arc<dyn SegmentStore>,
    pubsub: Arc<dyn PubsubTransport>,
    stream_transport: Arc<dyn StreamTransport>,
    verifier: Arc<dyn SignatureVerifier>,
    key_recovery: Arc<dyn KeyRecovery>,

    tasks: StdRwLock<HashMap<TaskId, TaskHandle>>,
    status_tx: broadcast::Sender<StatusEvent>,
    error_tx: broadcast::Sender<(TaskId, TaskError)>,
    dispatch_tx: mpsc::Sender<TaskId>,

    /// Stand-in for the overlay's peer-membership registry, an external
    /// collaborator per `spec.md` §1 ("peer discovery/membership" is out of
    /// scope). Callers that track real peer counts call
    /// [`DownloadManager::set_known_peer_count`].
    known_peers: AtomicUsize,
}

impl DownloadManager {
    /// Constructs the manager, runs startup reconciliation against
    /// `file_store` (`spec.md` §4.5 paragraph 3), and spawns the internal
    /// dispatcher that backs [`DownloadManager::trigger`].
    pub async fn start(
        cfg: Config,
        local_addr: AddrInfo,
        file_store: Arc<dyn FileRecordStore>,
        segment_store: Arc<dyn SegmentStore>,
        pubsub: Arc<dyn PubsubTransport>,
        stream_transport: Arc<dyn StreamTransport>,
        verifier: Arc<dyn SignatureVerifier>,
        key_recovery: Arc<dyn KeyRecovery>,
    ) -> Arc<Self> {
        let (status_tx, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        let (error_tx, _) = broadcast::channel(ERROR_CHANNEL_CAPACITY);
        let (dispatch_tx, dispatch_rx) = mpsc::channel(DISPATCH_CHANNEL_CAPACITY);

        let manager = Arc::new(Self {
            cfg,
            local_addr,
            file_store,
            segment_store,
            pubsub,
            stream_transport,
            verifier,
            key_recovery,
            tasks: StdRwLock::new(HashMap::new()),
            status_tx,
            error_tx,
            dispatch_tx,
            known_peers: AtomicUsize::new(0),
        });

        manager.reconcile_on_startup().await;

        let worker = Arc::clone(&manager);
        tokio::spawn(worker.run_dispatcher(dispatch_rx));

        manager
    }

    /// `spec.md` §4.5 paragraph 3: active-looking statuses are forced to
    /// `paused`; `completed`/`paused` survive untouched; everything else is
    /// marked `failed`. No task is spawned here — "idle task objects" only.
    async fn reconcile_on_startup(&self) {
        let records = match self.file_store.list_all().await {
            Ok(r) => r,
            Err(e) => {
                warn!("startup reconciliation: failed to list file records: {e}");
                return;
            }
        };
        for mut record in records {
            let original = record.status;
            record.status = match record.status {
                FileStatus::Downloading | FileStatus::FetchingInfo | FileStatus::Pending => FileStatus::Paused,
                FileStatus::Completed | FileStatus::Paused => record.status,
                FileStatus::Cancelled | FileStatus::Failed => FileStatus::Failed,
            };
            if record.status != original {
                info!("reconciled task {} from {:?} to {:?}", record.task_id, original, record.status);
                let _ = self.file_store.put(record).await;
            }
        }
    }

    async fn run_dispatcher(self: Arc<Self>, mut rx: mpsc::Receiver<TaskId>) {
        while let Some(task_id) = rx.recv().await {
            self.start_or_resume(&task_id).await;
        }
    }

    async fn start_or_resume(&self, task_id: &TaskId) {
        let existing = self.tasks.read().unwrap().get(task_id).cloned();
        if let Some(handle) = existing {
            if let Err(e) = handle.resume().await {
                warn!("resuming task {task_id} failed: {e}");
            }
            return;
        }

        let deps = TaskDeps {
            cfg: self.cfg.clone(),
            local_addr: self.local_addr.clone(),
            file_store: Arc::clone(&self.file_store),
            segment_store: Arc::clone(&self.segment_store),
            pubsub: Arc::clone(&self.pubsub),
            stream_transport: Arc::clone(&self.stream_transport),
            verifier: Arc::clone(&self.verifier),
            key_recovery: Arc::clone(&self.key_recovery),
            status_tx: self.status_tx.clone(),
            error_tx: self.error_tx.clone(),
        };
        let handle = task::spawn(task_id.clone(), deps);
        self.tasks.write().unwrap().insert(task_id.clone(), handle);
    }

    /// Counts tasks in an active status (`spec.md` §4.5 `trigger`'s cap),
    /// excluding `task_id` itself so re-triggering an already-active task
    /// never self-blocks.
    async fn active_count_excluding(&self, task_id: &TaskId) -> Result<usize, ManagerError> {
        let records = self.file_store.list_all().await.map_err(TaskError::Store)?;
        Ok(records.iter().filter(|r| r.status.is_active() && &r.task_id != task_id).count())
    }

    /// Sets the known-peer count used by `new_download`'s minimum-peer-count
    /// gate. Callers own the real membership source; this is the seam.
    pub fn set_known_peer_count(&self, count: usize) {
        self.known_peers.store(count, Ordering::Relaxed);
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusEvent> {
        self.status_tx.subscribe()
    }

    pub fn subscribe_errors(&self) -> broadcast::Receiver<(TaskId, TaskError)> {
        self.error_tx.subscribe()
    }

    /// `spec.md` §4.5 `new-download`: derives identity from `owner_priv`,
    /// persists a `pending` record, and schedules the task. The exact
    /// owner-side key-derivation scheme is left unspecified upstream (the
    /// signing collaborator that would produce it is explicitly out of
    /// scope); see `identity::derive` and `DESIGN.md` for the placeholder
    /// this repo uses.
    pub async fn new_download(
        &self,
        owner_priv: &[u8],
        file_id: FileId,
        destination_dir: impl Into<String>,
    ) -> Result<TaskId, ManagerError> {
        self.check_peer_count()?;
        self.reject_if_already_active(&file_id).await?;

        let (task_id, owner_pubkey_hash, key_share) = identity::derive_from_private_key(owner_priv, &file_id);
        self.create_and_schedule(task_id, file_id, owner_pubkey_hash, key_share, destination_dir).await
    }

    /// `spec.md` §4.5 `new-share-download`: same, using a supplied share
    /// rather than deriving one.
    pub async fn new_share_download(
        &self,
        file_id: FileId,
        key_share: Vec<u8>,
        owner_pubkey_hash: Vec<u8>,
        destination_dir: impl Into<String>,
    ) -> Result<TaskId, ManagerError> {
        self.check_peer_count()?;
        self.reject_if_already_active(&file_id).await?;

        let task_id = identity::derive_from_share(&file_id, &key_share, &owner_pubkey_hash);
        self.create_and_schedule(task_id, file_id, owner_pubkey_hash, key_share, destination_dir).await
    }

    fn check_peer_count(&self) -> Result<(), ManagerError> {
        let known = self.known_peers.load(Ordering::Relaxed);
        if known < self.cfg.min_download_server_nodes {
            return Err(ManagerError::InsufficientPeers { known, required: self.cfg.min_download_server_nodes });
        }
        Ok(())
    }

    async fn reject_if_already_active(&self, file_id: &FileId) -> Result<(), ManagerError> {
        let existing = self
            .file_store
            .find_active_by_file_id(file_id)
            .await
            .map_err(TaskError::Store)?;
        if existing.is_some() {
            return Err(ManagerError::AlreadyDownloading(file_id.clone().into()));
        }
        Ok(())
    }

    async fn create_and_schedule(
        &self,
        task_id: TaskId,
        file_id: FileId,
        owner_pubkey_hash: Vec<u8>,
        key_share: Vec<u8>,
        destination_dir: impl Into<String>,
    ) -> Result<TaskId, ManagerError> {
        let record = FileRecord::new(task_id.clone(), file_id, owner_pubkey_hash, key_share, destination_dir);
        self.file_store.put(record).await.map_err(TaskError::Store)?;
        if let Err(e) = self.trigger(task_id.clone()).await {
            // Roll back the just-persisted record: leaving it behind would
            // make the file id permanently "active" for `reject_if_already_active`
            // even though no task slot was ever actually consumed.
            let _ = self.file_store.delete(&task_id).await;
            return Err(e);
        }
        Ok(task_id)
    }

    /// `spec.md` §4.5 `trigger`: enforces the active-session cap, then hands
    /// off to the dispatcher on a bounded channel with a 5 s timeout.
    pub async fn trigger(&self, task_id: TaskId) -> Result<(), ManagerError> {
        if self.active_count_excluding(&task_id).await? >= self.cfg.max_sessions {
            return Err(ManagerError::MaxConcurrencyReached);
        }
        match tokio::time::timeout(DISPATCH_TIMEOUT, self.dispatch_tx.send(task_id.clone())).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(ManagerError::TaskNotFound(task_id)),
            Err(_) => Err(ManagerError::DispatchTimeout(task_id)),
        }
    }

    /// `spec.md` §4.5 `pause`: allowed in `{pending, downloading}`.
    pub async fn pause(&self, task_id: &TaskId) -> Result<(), ManagerError> {
        if let Some(handle) = self.tasks.read().unwrap().get(task_id).cloned() {
            return handle.pause().await.map_err(ManagerError::from);
        }
        let mut record = self.record_or_not_found(task_id).await?;
        if !matches!(record.status, FileStatus::Pending | FileStatus::Downloading | FileStatus::FetchingInfo) {
            return Err(invalid_transition(task_id, record.status));
        }
        record.status = FileStatus::Paused;
        self.file_store.put(record).await.map_err(TaskError::Store)?;
        Ok(())
    }

    /// `spec.md` §4.5 `resume`: allowed in `{pending, downloading, paused,
    /// failed}`; always routes through `trigger` so a live task is resumed
    /// in place and an idle one is freshly spawned.
    pub async fn resume(&self, task_id: &TaskId) -> Result<(), ManagerError> {
        let record = self.record_or_not_found(task_id).await?;
        if !matches!(
            record.status,
            FileStatus::Pending | FileStatus::Downloading | FileStatus::Paused | FileStatus::Failed
        ) {
            return Err(invalid_transition(task_id, record.status));
        }
        self.trigger(task_id.clone()).await
    }

    /// `spec.md` §4.5 `cancel`: allowed in any non-terminal state; keeps the
    /// file record.
    pub async fn cancel(&self, task_id: &TaskId) -> Result<(), ManagerError> {
        if let Some(handle) = self.tasks.read().unwrap().get(task_id).cloned() {
            return handle.cancel().await.map_err(ManagerError::from);
        }
        let mut record = self.record_or_not_found(task_id).await?;
        if record.status.is_terminal() {
            return Err(invalid_transition(task_id, record.status));
        }
        record.status = FileStatus::Cancelled;
        record.finished_at = Some(crate::model::file_record::now_secs());
        self.file_store.put(record).await.map_err(TaskError::Store)?;
        Ok(())
    }

    /// `spec.md` §4.5 `delete`: disallowed in `downloading`; removes the
    /// file record and all segments.
    pub async fn delete(&self, task_id: &TaskId) -> Result<(), ManagerError> {
        let record = self.record_or_not_found(task_id).await?;
        if matches!(record.status, FileStatus::Downloading) {
            return Err(invalid_transition(task_id, record.status));
        }
        if let Some(handle) = self.tasks.write().unwrap().remove(task_id) {
            let _ = handle.cancel().await;
        }
        self.segment_store.delete_all_for_task(task_id).await.map_err(TaskError::Store)?;
        self.file_store.delete(task_id).await.map_err(TaskError::Store)?;
        Ok(())
    }

    /// `spec.md` §4.5 `query`: paged scan.
    pub async fn query(
        &self,
        start: usize,
        page_size: usize,
        filter: FileRecordFilter,
    ) -> Result<(Vec<FileRecord>, usize), ManagerError> {
        self.file_store.query(start, page_size, filter).await.map_err(TaskError::Store).map_err(ManagerError::from)
    }

    async fn record_or_not_found(&self, task_id: &TaskId) -> Result<FileRecord, ManagerError> {
        self.file_store
            .get(task_id)
            .await
            .map_err(TaskError::Store)?
            .ok_or_else(|| ManagerError::TaskNotFound(task_id.clone()))
    }
}

fn invalid_transition(task_id: &TaskId, status: FileStatus) -> ManagerError {
    ManagerError::InvalidTransition { task: task_id.clone(), state: format!("{status:?}") }
}

/// Deterministic identity derivation for `new_download`/`new_share_download`
/// — see `DESIGN.md` for why this is a placeholder rather than real PKI math.
mod identity {
    use sha2::{Digest, Sha256};

    use crate::model::{FileId, TaskId};

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    pub fn derive_from_private_key(owner_priv: &[u8], file_id: &FileId) -> (TaskId, Vec<u8>, Vec<u8>) {
        let mut id_hasher = Sha256::new();
        id_hasher.update(b"task-id");
        id_hasher.update(owner_priv);
        id_hasher.update(file_id.as_str().as_bytes());
        let task_id = TaskId::new(format!("t-{}", hex(&id_hasher.finalize()[..12])));

        let mut pubkey_hasher = Sha256::new();
        pubkey_hasher.update(b"pubkey-hash");
        pubkey_hasher.update(owner_priv);
        let owner_pubkey_hash = pubkey_hasher.finalize().to_vec();

        let mut share_hasher = Sha256::new();
        share_hasher.update(b"key-share-a");
        share_hasher.update(owner_priv);
        share_hasher.update(file_id.as_str().as_bytes());
        let key_share = share_hasher.finalize().to_vec();

        (task_id, owner_pubkey_hash, key_share)
    }

    pub fn derive_from_share(file_id: &FileId, key_share: &[u8], owner_pubkey_hash: &[u8]) -> TaskId {
        let mut hasher = Sha256::new();
        hasher.update(b"task-id-share");
        hasher.update(file_id.as_str().as_bytes());
        hasher.update(key_share);
        hasher.update(owner_pubkey_hash);
        TaskId::new(format!("t-{}", hex(&hasher.finalize()[..12])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{P256SignatureVerifier, SharksKeyRecovery};
    use crate::discovery::{PubsubTransport, Topic};
    use crate::model::{DiscoveryError, PeerId, TransferError};
    use crate::store::{InMemoryFileRecordStore, InMemorySegmentStore};
    use crate::transfer::{SegmentStream, StreamTransport};
    use async_trait::async_trait;

    struct DeadPubsub;
    #[async_trait]
    impl PubsubTransport for DeadPubsub {
        async fn request_reply(&self, _topic: &Topic, _payload: Vec<u8>) -> Result<Vec<u8>, DiscoveryError> {
            Err(DiscoveryError::Transport("no peers in test".into()))
        }
        async fn publish(&self, _topic: &Topic, _payload: Vec<u8>) -> Result<(), DiscoveryError> {
            Ok(())
        }
        async fn subscribe(&self, _topic: &Topic) -> Result<mpsc::Receiver<(PeerId, Vec<u8>)>, DiscoveryError> {
            let (_tx, rx) = mpsc::channel(1);
            Ok(rx)
        }
    }

    struct DeadStreamTransport;
    #[async_trait]
    impl StreamTransport for DeadStreamTransport {
        async fn open_stream(&self, _peer: &PeerId) -> Result<Box<dyn SegmentStream>, TransferError> {
            Err(TransferError::new(crate::model::TransferErrorCode::Network, "no streams in test"))
        }
    }

    async fn test_manager() -> Arc<DownloadManager> {
        DownloadManager::start(
            Config::default(),
            AddrInfo { peer_id: PeerId::from("me"), multiaddrs: vec![] },
            Arc::new(InMemoryFileRecordStore::new()),
            Arc::new(InMemorySegmentStore::new()),
            Arc::new(DeadPubsub),
            Arc::new(DeadStreamTransport),
            Arc::new(P256SignatureVerifier),
            Arc::new(SharksKeyRecovery::default()),
        )
        .await
    }

    #[tokio::test]
    async fn new_download_rejects_below_peer_threshold() {
        let manager = test_manager().await;
        let err = manager.new_download(b"owner-key", FileId::from("f1"), "/tmp").await.unwrap_err();
        assert!(matches!(err, ManagerError::InsufficientPeers { .. }));
    }

    #[tokio::test]
    async fn new_download_schedules_a_pending_record() {
        let manager = test_manager().await;
        manager.set_known_peer_count(3);
        let task_id = manager.new_download(b"owner-key", FileId::from("f1"), "/tmp").await.unwrap();
        let (records, total) = manager.query(0, 10, FileRecordFilter::default()).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(records[0].task_id, task_id);
    }

    #[tokio::test]
    async fn new_download_rejects_duplicate_active_file() {
        // Insert the active record directly rather than through `new_download`,
        // so the assertion below can't race the background supervisor it would
        // otherwise spawn (which fails instantly against `DeadPubsub`).
        let manager = test_manager().await;
        manager.set_known_peer_count(3);
        let existing = FileRecord::new(TaskId::from("t-existing"), FileId::from("f1"), vec![1], vec![2], "/tmp");
        manager.file_store.put(existing).await.unwrap();

        let err = manager.new_download(b"other-key", FileId::from("f1"), "/tmp").await.unwrap_err();
        assert!(matches!(err, ManagerError::AlreadyDownloading(_)));
    }

    #[tokio::test]
    async fn pause_then_resume_idle_task_round_trips_through_store() {
        // No live handle yet (never triggered), so this exercises the
        // direct-store-mutation branch of `pause`/`resume`.
        let manager = test_manager().await;
        let task_id = TaskId::from("t-idle");
        let record = FileRecord::new(task_id.clone(), FileId::from("f1"), vec![1], vec![2], "/tmp");
        manager.file_store.put(record).await.unwrap();

        manager.pause(&task_id).await.unwrap();
        let (records, _) = manager.query(0, 10, FileRecordFilter::default()).await.unwrap();
        assert_eq!(records[0].status, FileStatus::Paused);

        manager.set_known_peer_count(3);
        manager.resume(&task_id).await.unwrap();
    }

    #[tokio::test]
    async fn delete_rejects_while_downloading() {
        let manager = test_manager().await;
        let task_id = TaskId::from("t-manual");
        let mut record = FileRecord::new(task_id.clone(), FileId::from("f1"), vec![1], vec![2], "/tmp");
        record.status = FileStatus::Downloading;
        manager.file_store.put(record).await.unwrap();

        let err = manager.delete(&task_id).await.unwrap_err();
        assert!(matches!(err, ManagerError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn cancel_is_rejected_once_terminal() {
        let manager = test_manager().await;
        let task_id = TaskId::from("t-manual");
        let mut record = FileRecord::new(task_id.clone(), FileId::from("f1"), vec![1], vec![2], "/tmp");
        record.status = FileStatus::Completed;
        manager.file_store.put(record).await.unwrap();

        let err = manager.cancel(&task_id).await.unwrap_err();
        assert!(matches!(err, ManagerError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn startup_reconciliation_forces_active_statuses_to_paused() {
        let file_store = Arc::new(InMemoryFileRecordStore::new());
        let mut downloading = FileRecord::new(TaskId::from("t1"), FileId::from("f1"), vec![1], vec![2], "/tmp");
        downloading.status = FileStatus::Downloading;
        file_store.put(downloading).await.unwrap();
        let mut cancelled = FileRecord::new(TaskId::from("t2"), FileId::from("f2"), vec![1], vec![2], "/tmp");
        cancelled.status = FileStatus::Cancelled;
        file_store.put(cancelled).await.unwrap();

        let _manager = DownloadManager::start(
            Config::default(),
            AddrInfo { peer_id: PeerId::from("me"), multiaddrs: vec![] },
            file_store.clone(),
            Arc::new(InMemorySegmentStore::new()),
            Arc::new(DeadPubsub),
            Arc::new(DeadStreamTransport),
            Arc::new(P256SignatureVerifier),
            Arc::new(SharksKeyRecovery::default()),
        )
        .await;

        let rec1 = file_store.get(&TaskId::from("t1")).await.unwrap().unwrap();
        assert_eq!(rec1.status, FileStatus::Paused);
        // Cancelled is neither active nor {completed, paused}, so reconciliation
        // marks it failed rather than leaving it cancelled.
        let rec2 = file_store.get(&TaskId::from("t2")).await.unwrap().unwrap();
        assert_eq!(rec2.status, FileStatus::Failed);
    }

    /// `spec.md` §8: requesting the max-concurrency+1-th download returns the
    /// "max concurrency reached" error and does not consume a task slot —
    /// the rejected file id must remain startable afterward, not left behind
    /// as a ghost `pending` record.
    #[tokio::test]
    async fn new_download_past_max_concurrency_does_not_consume_a_slot() {
        let manager = test_manager().await;
        manager.set_known_peer_count(3);
        for i in 0..manager.cfg.max_sessions {
            let mut record = FileRecord::new(
                TaskId::from(format!("t-active-{i}").as_str()),
                FileId::from(format!("f-active-{i}").as_str()),
                vec![1],
                vec![2],
                "/tmp",
            );
            record.status = FileStatus::Downloading;
            manager.file_store.put(record).await.unwrap();
        }

        let err = manager.new_download(b"owner-key", FileId::from("f-overflow"), "/tmp").await.unwrap_err();
        assert!(matches!(err, ManagerError::MaxConcurrencyReached));

        // No ghost record left behind for the rejected file id.
        assert!(manager.file_store.find_active_by_file_id(&FileId::from("f-overflow")).await.unwrap().is_none());
        let (_, total) = manager.query(0, 100, FileRecordFilter::default()).await.unwrap();
        assert_eq!(total, manager.cfg.max_sessions);

        // And it's retriable: freeing one slot lets it through.
        let mut freed = manager.file_store.get(&TaskId::from("t-active-0")).await.unwrap().unwrap();
        freed.status = FileStatus::Completed;
        manager.file_store.put(freed).await.unwrap();
        manager.new_download(b"owner-key", FileId::from("f-overflow"), "/tmp").await.unwrap();
    }
}
