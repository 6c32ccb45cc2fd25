//! Shared task state and the individual state-machine transitions —
//! `spec.md` §4.1. Split out from `mod.rs` so the transitions can be spawned
//! as their own `tokio::spawn`ed units (needed for the re-entrancy guards on
//! `verify`/`merge` to mean anything: a single-threaded supervisor loop
//! can't race itself, but a trigger that fans out into its own task can).

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use log::{info, warn};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::codec::AddrInfo;
use crate::config::Config;
use crate::crypto::{KeyRecovery, SignatureVerifier};
use crate::discovery::{self, PubsubTransport};
use crate::erasure;
use crate::model::{
    DistributionQueue, FileId, FileRecord, FileStatus, PeerAssignment, SegmentId, SegmentPayload, SegmentStatus,
    StatusEvent, TaskError, TaskId,
};
use crate::store::{FileRecordStore, SegmentStore};
use crate::transfer::{self, SegmentRequestContext, StreamTransport, TransferDeps};
use crate::util::unique_path;

use super::backoff::StallTracker;
use super::trigger::Trigger;

/// A reentrancy guard combining an atomic in-progress flag with a minimum
/// interval between executions — `spec.md` §4.1/§9: "verify, merge, and the
/// index-tick request each hold an atomic in-progress flag and a timestamped
/// mutex; concurrent triggers collapse to at most one executing instance."
pub struct ReentrancyGuard {
    in_progress: AtomicBool,
    last_run: StdMutex<Option<Instant>>,
    min_interval: Duration,
}

impl ReentrancyGuard {
    pub fn new(min_interval: Duration) -> Self {
        Self { in_progress: AtomicBool::new(false), last_run: StdMutex::new(None), min_interval }
    }

    /// Attempts to enter the guarded section. Returns `false` (without
    /// blocking) if another execution is in progress or the minimum
    /// interval has not elapsed since the last run.
    pub fn try_enter(&self) -> bool {
        if self.in_progress.swap(true, Ordering::SeqCst) {
            return false;
        }
        let mut last = self.last_run.lock().unwrap();
        if let Some(t) = *last {
            if t.elapsed() < self.min_interval {
                drop(last);
                self.in_progress.store(false, Ordering::SeqCst);
                return false;
            }
        }
        *last = Some(Instant::now());
        true
    }

    pub fn exit(&self) {
        self.in_progress.store(false, Ordering::SeqCst);
    }
}

/// Collaborators and shared mutable state for one task, `Arc`-wrapped so the
/// supervisor loop (`super::DownloadTask::run`) can spawn each transition as
/// its own task without cloning every field by hand.
pub struct TaskCore {
    pub task_id: TaskId,
    pub cfg: Config,
    pub local_addr: AddrInfo,

    pub file_store: Arc<dyn FileRecordStore>,
    pub segment_store: Arc<dyn SegmentStore>,
    pub distribution: Arc<DistributionQueue>,
    pub pubsub: Arc<dyn PubsubTransport>,
    pub stream_transport: Arc<dyn StreamTransport>,
    pub verifier: Arc<dyn SignatureVerifier>,
    pub key_recovery: Arc<dyn KeyRecovery>,

    pub status_tx: broadcast::Sender<StatusEvent>,
    pub error_tx: broadcast::Sender<(TaskId, TaskError)>,

    pub transfer_tx: tokio::sync::mpsc::Sender<Vec<PeerAssignment>>,

    pub index_tick: Trigger,
    pub process: Trigger,
    pub dispatch: Trigger,
    pub verify: Trigger,
    pub recovery: Trigger,
    pub merge: Trigger,
    pub finalize: Trigger,

    /// Parent token: cancelling this tears down the whole task (cancel/delete).
    pub parent_cancel: CancellationToken,
    /// Child token for in-flight transfer rounds: `pause` cancels this one
    /// without tearing down the supervisor itself, matching the teacher's
    /// `MultipartDownloadStrategy.cancel_token` pause/resume split.
    pub transfer_cancel: StdMutex<CancellationToken>,

    pub verify_guard: ReentrancyGuard,
    pub merge_guard: ReentrancyGuard,
    pub stall: StdMutex<StallTracker>,
    pub tick_enabled: AtomicBool,
    pub tick_interval_secs: AtomicU32,
}

#[derive(Debug, PartialEq, Eq)]
pub enum VerifyOutcome {
    NeedRecovery,
    ReadyToMerge,
    NotYet,
}

impl TaskCore {
    pub fn new(
        task_id: TaskId,
        cfg: Config,
        local_addr: AddrInfo,
        file_store: Arc<dyn FileRecordStore>,
        segment_store: Arc<dyn SegmentStore>,
        pubsub: Arc<dyn PubsubTransport>,
        stream_transport: Arc<dyn StreamTransport>,
        verifier: Arc<dyn SignatureVerifier>,
        key_recovery: Arc<dyn KeyRecovery>,
        status_tx: broadcast::Sender<StatusEvent>,
        error_tx: broadcast::Sender<(TaskId, TaskError)>,
        transfer_tx: tokio::sync::mpsc::Sender<Vec<PeerAssignment>>,
        triggers: super::TaskTriggers,
        parent_cancel: CancellationToken,
    ) -> Self {
        let verify_retry_delay = cfg.verify_retry_delay;
        let index_tick_base = cfg.index_tick_base;
        let index_tick_cap = cfg.index_tick_cap;
        Self {
            task_id,
            local_addr,
            file_store,
            segment_store,
            distribution: Arc::new(DistributionQueue::new()),
            pubsub,
            stream_transport,
            verifier,
            key_recovery,
            status_tx,
            error_tx,
            transfer_tx,
            index_tick: triggers.index_tick,
            process: triggers.process,
            dispatch: triggers.dispatch,
            verify: triggers.verify,
            recovery: triggers.recovery,
            merge: triggers.merge,
            finalize: triggers.finalize,
            transfer_cancel: StdMutex::new(parent_cancel.child_token()),
            parent_cancel,
            verify_guard: ReentrancyGuard::new(verify_retry_delay),
            merge_guard: ReentrancyGuard::new(Duration::ZERO),
            stall: StdMutex::new(StallTracker::new(index_tick_base, index_tick_cap)),
            tick_enabled: AtomicBool::new(true),
            tick_interval_secs: AtomicU32::new(index_tick_base.as_secs() as u32),
            cfg,
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs.load(Ordering::Relaxed) as u64)
    }

    async fn record(&self) -> Option<FileRecord> {
        self.file_store.get(&self.task_id).await.ok().flatten()
    }

    async fn fail_task(&self, error: TaskError) {
        warn!("task {} failed: {error}", self.task_id);
        if let Some(mut record) = self.record().await {
            if !record.status.is_terminal() {
                record.status = FileStatus::Failed;
                record.finished_at = Some(crate::model::file_record::now_secs());
                let _ = self.file_store.put(record).await;
            }
        }
        let _ = self.error_tx.send((self.task_id.clone(), error));
    }

    fn emit_event(&self, event: StatusEvent) {
        let _ = self.status_tx.send(event);
    }

    /// Reports a non-fatal condition on the error channel without touching
    /// the file record's status — `spec.md` §8 scenario 3: a "downloading
    /// stalled" error is surfaced to the caller, but the task stays
    /// `downloading` (stalled discovery isn't one of `spec.md` §7's
    /// task-fatal errors; ticking continues and may still recover).
    fn report_stall(&self, error: TaskError) {
        warn!("task {}: {error}", self.task_id);
        let _ = self.error_tx.send((self.task_id.clone(), error));
    }

    // ── segment-index tick ────────────────────────────────────────────────

    pub async fn on_index_tick(&self) {
        let Some(mut record) = self.record().await else { return };
        if record.status.is_terminal() || matches!(record.status, FileStatus::Paused) {
            return;
        }

        if record.slice_table.is_empty() {
            if let Err(e) = self.fetch_file_info(&mut record).await {
                self.fail_task(e).await;
                return;
            }
        }

        let segments = self.segment_store.list_by_task(&self.task_id).await.unwrap_or_default();
        let pending: Vec<SegmentId> = segments
            .iter()
            .filter(|s| !s.is_parity && !matches!(s.status, SegmentStatus::Completed))
            .map(|s| s.segment_id.clone())
            .collect();

        if pending.is_empty() {
            self.tick_enabled.store(false, Ordering::Relaxed);
            self.verify.fire();
            return;
        }

        let progress = self.progress_percent(&segments, &record);
        let (interval, stalled, ticks) = {
            let mut guard = self.stall.lock().unwrap();
            let (interval, stalled) = guard.observe(&pending, progress);
            (interval, stalled, guard.unchanged_ticks())
        };
        self.tick_interval_secs.store(interval.as_secs() as u32, Ordering::Relaxed);

        if stalled {
            self.report_stall(TaskError::DownloadingStalled(self.task_id.clone(), ticks));
            return;
        }

        if let Err(e) = discovery::request_manifest(
            self.pubsub.as_ref(),
            &self.task_id,
            &record.file_id,
            &record.owner_pubkey_hash,
            self.local_addr.clone(),
            pending,
        )
        .await
        {
            warn!("manifest request failed for task {}: {e}", self.task_id);
        }
    }

    async fn fetch_file_info(&self, record: &mut FileRecord) -> Result<(), TaskError> {
        record.status = FileStatus::FetchingInfo;
        let _ = self.file_store.put(record.clone()).await;

        let response = discovery::request_file_info(
            self.pubsub.as_ref(),
            &self.task_id,
            &record.file_id,
            &record.owner_pubkey_hash,
            self.local_addr.clone(),
        )
        .await
        .map_err(|e| TaskError::Store(e.to_string()))?;

        record.meta = Some(crate::model::FileMeta {
            name: response.name,
            extension: response.extension,
            size: response.size,
            content_type: response.content_type,
            sha256: response.sha256,
        });
        record.slice_table = response.slice_table;
        record.validate_slice_table()?;

        for entry in &record.slice_table {
            let segment = crate::model::DownloadSegment::new(
                self.task_id.clone(),
                entry.segment_id.clone(),
                entry.index,
                entry.crc32,
                entry.is_parity,
            );
            let _ = self.segment_store.put(segment).await;
        }

        record.status = FileStatus::Downloading;
        record.started_at = Some(crate::model::file_record::now_secs());
        self.file_store
            .put(record.clone())
            .await
            .map_err(TaskError::Store)?;
        Ok(())
    }

    fn progress_percent(&self, segments: &[crate::model::DownloadSegment], record: &FileRecord) -> u8 {
        let required = record.required_data_shards();
        if required == 0 {
            return 100;
        }
        let completed = segments
            .iter()
            .filter(|s| !s.is_parity && matches!(s.status, SegmentStatus::Completed))
            .count();
        ((completed * 100) / required).min(100) as u8
    }

    /// Subscribes to the manifest-response topic and ingests every response
    /// addressed to this task for as long as the task runs — `spec.md` §4.2
    /// "Manifest response ingestion." Runs as its own long-lived task
    /// alongside the supervisor loop (`super::spawn`), since `subscribe`
    /// yields a channel rather than a single reply.
    pub async fn run_manifest_listener(&self) {
        let topic = discovery::Topics::manifest_response(crate::codec::CURRENT_PROTOCOL_VERSION);
        let mut rx = match self.pubsub.subscribe(&topic).await {
            Ok(rx) => rx,
            Err(e) => {
                warn!("task {}: failed to subscribe to manifest responses: {e}", self.task_id);
                return;
            }
        };
        // Coalesces every manifest response that lands within `batch_window`
        // of the first one into a single `process` trigger, rather than
        // firing once per response — `spec.md` §6 "batch-window".
        let mut batch_due = Box::pin(tokio::time::sleep(self.cfg.batch_window));
        let mut batch_pending = false;
        loop {
            tokio::select! {
                _ = self.parent_cancel.cancelled() => break,
                _ = &mut batch_due, if batch_pending => {
                    self.process.fire();
                    batch_pending = false;
                }
                received = rx.recv() => {
                    let Some((_peer, payload)) = received else { break };
                    let response: crate::codec::ManifestResponse = match crate::codec::decode(&payload) {
                        Ok(r) => r,
                        Err(e) => {
                            warn!("task {}: malformed manifest response: {e}", self.task_id);
                            continue;
                        }
                    };
                    if response.task_id != self.task_id {
                        continue;
                    }
                    match discovery::ingest_manifest_response_into_store(&response, self.segment_store.as_ref(), &self.distribution).await {
                        Ok(true) => {
                            if !batch_pending {
                                batch_due.as_mut().reset(tokio::time::Instant::now() + self.cfg.batch_window);
                                batch_pending = true;
                            }
                        }
                        Ok(false) => {}
                        Err(e) => warn!("task {}: failed to ingest manifest response: {e}", self.task_id),
                    }
                }
            }
        }
    }

    // ── segment-process / node-dispatch ──────────────────────────────────

    pub async fn on_process(&self) {
        let segments = self.segment_store.list_by_task(&self.task_id).await.unwrap_or_default();
        let pending_ids: std::collections::HashSet<SegmentId> = segments
            .iter()
            .filter(|s| matches!(s.status, SegmentStatus::Pending))
            .map(|s| s.segment_id.clone())
            .collect();

        let drained = self.distribution.drain_all();
        let mut by_peer: std::collections::HashMap<crate::model::PeerId, Vec<SegmentId>> = std::collections::HashMap::new();
        for assignment in drained {
            for segment_id in assignment.segment_ids {
                if pending_ids.contains(&segment_id) {
                    by_peer.entry(assignment.peer.clone()).or_default().push(segment_id);
                }
            }
        }
        for (peer, segment_ids) in by_peer {
            if !segment_ids.is_empty() {
                self.distribution.add(PeerAssignment { peer, segment_ids });
            }
        }
        self.dispatch.fire();
    }

    pub async fn on_dispatch(&self) {
        let batch = self.distribution.drain_all();
        if batch.is_empty() {
            self.verify.fire();
            return;
        }
        if let Err(tokio::sync::mpsc::error::TrySendError::Full(returned)) = self.transfer_tx.try_send(batch) {
            for assignment in returned {
                self.distribution.add(assignment);
            }
        }
        self.verify.fire();
    }

    // ── network-transfer ─────────────────────────────────────────────────

    pub async fn on_network_transfer(&self, batch: Vec<PeerAssignment>) {
        let Some(record) = self.record().await else { return };
        let Some(meta) = record.meta.clone() else { return };

        let ctx = Arc::new(SegmentRequestContext {
            task_id: self.task_id.clone(),
            file_id: record.file_id.clone(),
            owner_pubkey_hash: record.owner_pubkey_hash.clone(),
            requester: self.local_addr.clone(),
            task_key_share: record.key_share.clone(),
            file_meta: meta,
            slice_table: record.slice_table.clone(),
        });
        let deps = Arc::new(TransferDeps {
            stream_transport: Arc::clone(&self.stream_transport),
            segment_store: Arc::clone(&self.segment_store),
            verifier: Arc::clone(&self.verifier),
            key_recovery: Arc::clone(&self.key_recovery),
        });
        let cancel = self.transfer_cancel.lock().unwrap().clone();

        let outcome = transfer::run_transfer_round(batch, ctx, deps, &self.cfg, cancel).await;
        info!(
            "task {} transfer round: {} completed, {} degraded, {} errors",
            self.task_id,
            outcome.completed.len(),
            outcome.degraded.len(),
            outcome.errors.len()
        );

        for (segment_id, peer) in &outcome.completed {
            if let Some(event) = self.build_status_event(segment_id, peer.clone(), false).await {
                self.emit_event(event);
            }
        }

        self.verify.fire();
    }

    async fn build_status_event(&self, segment_id: &SegmentId, peer: crate::model::PeerId, is_complete: bool) -> Option<StatusEvent> {
        let segment = self.segment_store.get(segment_id).await.ok().flatten()?;
        let record = self.record().await?;
        let segments = self.segment_store.list_by_task(&self.task_id).await.unwrap_or_default();
        let segment_size = match &segment.payload {
            Some(SegmentPayload::Bytes(b)) => b.len() as u64,
            Some(SegmentPayload::Path(_)) | None => 0,
        };
        Some(StatusEvent {
            task_id: self.task_id.clone(),
            is_complete,
            download_progress: self.progress_percent(&segments, &record),
            total_shards: record.slice_table.len(),
            segment_id: segment.segment_id,
            segment_index: segment.segment_index,
            segment_size,
            is_parity: segment.is_parity,
            node_id: peer,
            timestamp: crate::model::file_record::now_secs(),
        })
    }

    // ── segment-verify ────────────────────────────────────────────────────

    pub async fn on_verify(&self) {
        if !self.verify_guard.try_enter() {
            return;
        }
        let outcome = self.do_verify().await;
        self.verify_guard.exit();
        match outcome {
            VerifyOutcome::NeedRecovery => self.recovery.fire(),
            VerifyOutcome::ReadyToMerge => self.merge.fire(),
            VerifyOutcome::NotYet => {}
        }
    }

    async fn do_verify(&self) -> VerifyOutcome {
        let Some(record) = self.record().await else { return VerifyOutcome::NotYet };
        if record.status.is_terminal() {
            return VerifyOutcome::NotYet;
        }
        let segments = self.segment_store.list_by_task(&self.task_id).await.unwrap_or_default();
        let completed = segments.iter().filter(|s| matches!(s.status, SegmentStatus::Completed)).count();
        let required = record.required_data_shards();
        if completed < required {
            self.tick_enabled.store(true, Ordering::Relaxed);
            VerifyOutcome::NeedRecovery
        } else {
            VerifyOutcome::ReadyToMerge
        }
    }

    // ── recovery ──────────────────────────────────────────────────────────

    pub async fn on_recovery(&self) {
        let Some(record) = self.record().await else { return };
        if record.status.is_terminal() {
            return;
        }
        let segments = self.segment_store.list_by_task(&self.task_id).await.unwrap_or_default();

        let failed_data = segments.iter().filter(|s| !s.is_parity && matches!(s.status, SegmentStatus::Failed)).count();
        let completed_parity = segments.iter().filter(|s| s.is_parity && matches!(s.status, SegmentStatus::Completed)).count();
        let needed = failed_data.saturating_sub(completed_parity);
        if needed == 0 {
            return;
        }

        let mut candidates: Vec<crate::model::DownloadSegment> = segments
            .iter()
            .filter(|s| s.is_parity && matches!(s.status, SegmentStatus::Pending))
            .cloned()
            .collect();
        candidates.extend(segments.iter().filter(|s| matches!(s.status, SegmentStatus::Failed)).cloned());
        candidates.truncate(needed);

        let mut recovered = 0usize;
        for segment in &candidates {
            match self.recover_one_segment(&record, segment).await {
                Ok(()) => recovered += 1,
                Err(e) => warn!("recovery of segment {} failed: {e}", segment.segment_id),
            }
        }

        let segments_after = self.segment_store.list_by_task(&self.task_id).await.unwrap_or_default();
        let completed_after = segments_after.iter().filter(|s| matches!(s.status, SegmentStatus::Completed)).count();
        if completed_after >= record.required_data_shards() {
            self.merge.fire();
            return;
        }

        if recovered == 0 {
            let any_pending = segments_after
                .iter()
                .any(|s| matches!(s.status, SegmentStatus::Pending | SegmentStatus::Downloading));
            if !any_pending {
                self.fail_task(TaskError::RecoveryExhausted { task: self.task_id.clone(), needed }).await;
            }
        }
    }

    async fn recover_one_segment(
        &self,
        record: &FileRecord,
        segment: &crate::model::DownloadSegment,
    ) -> Result<(), crate::model::VerifyError> {
        let Some(meta) = record.meta.clone() else {
            return Err(crate::model::VerifyError::Decrypt("no file metadata yet".into()));
        };
        let response = discovery::request_segment_content(
            self.pubsub.as_ref(),
            &self.task_id,
            &record.file_id,
            &record.owner_pubkey_hash,
            self.local_addr.clone(),
            segment.segment_id.clone(),
            segment.segment_index,
        )
        .await
        .map_err(|e| crate::model::VerifyError::Decrypt(e.to_string()))?;

        let process_ctx = transfer::ProcessContext {
            file_id: &record.file_id,
            file_meta: &meta,
            slice_table: &record.slice_table,
            task_key_share: &record.key_share,
        };
        let plaintext = transfer::process_segment_response(&process_ctx, &response, self.verifier.as_ref(), self.key_recovery.as_ref())?;

        let mut updated = segment.clone();
        updated.status = SegmentStatus::Completed;
        updated.payload = Some(SegmentPayload::Bytes(plaintext));
        updated.key_share_b = Some(response.key_share.clone());
        let _ = self.segment_store.put(updated).await;
        Ok(())
    }

    // ── segment-merge / finalize ──────────────────────────────────────────

    pub async fn on_merge(&self) {
        if !self.merge_guard.try_enter() {
            return;
        }
        let fell_back = self.do_merge().await;
        self.merge_guard.exit();
        if fell_back {
            self.process.fire();
        }
    }

    /// Returns `true` if merge fell back to `process` because fewer than the
    /// required data shards were available — `spec.md` §4.1.
    async fn do_merge(&self) -> bool {
        let Some(record) = self.record().await else { return false };
        let Some(meta) = record.meta.clone() else { return false };
        if record.slice_table.is_empty() {
            return false;
        }

        let required = record.required_data_shards();
        let total = record.slice_table.len();
        let parity = total - required;

        let mut sorted_entries = record.slice_table.clone();
        sorted_entries.sort_by_key(|e| e.index);

        let mut present: Vec<Option<Vec<u8>>> = Vec::with_capacity(total);
        let mut completed = 0usize;
        for entry in &sorted_entries {
            let segment = self.segment_store.get(&entry.segment_id).await.ok().flatten();
            match segment {
                Some(s) if matches!(s.status, SegmentStatus::Completed) => {
                    completed += 1;
                    present.push(match s.payload {
                        Some(SegmentPayload::Bytes(b)) => Some(b),
                        _ => None,
                    });
                }
                _ => present.push(None),
            }
        }

        if completed < required {
            return true;
        }

        let reconstructed = match erasure::reconstruct(present, required, parity, meta.size as usize) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.fail_task(TaskError::MergeWriteFailed(self.task_id.clone(), e.to_string())).await;
                return false;
            }
        };

        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(&reconstructed);
        let digest: [u8; 32] = hasher.finalize().into();
        if digest != meta.sha256 {
            self.fail_task(TaskError::MergeWriteFailed(self.task_id.clone(), "sha256 mismatch after reconstruction".into())).await;
            return false;
        }

        let dest_dir = std::path::PathBuf::from(&record.destination_dir);
        if let Err(e) = tokio::fs::create_dir_all(&dest_dir).await {
            self.fail_task(TaskError::MergeWriteFailed(self.task_id.clone(), e.to_string())).await;
            return false;
        }

        let final_path = unique_path(&dest_dir, &meta.name, &meta.extension, |p| p.exists());
        let temp_path = dest_dir.join(format!(".{}.part", self.task_id.as_str()));

        if let Err(e) = tokio::fs::write(&temp_path, &reconstructed).await {
            self.fail_task(TaskError::MergeWriteFailed(self.task_id.clone(), e.to_string())).await;
            return false;
        }
        if let Err(e) = tokio::fs::rename(&temp_path, &final_path).await {
            self.fail_task(TaskError::MergeWriteFailed(self.task_id.clone(), e.to_string())).await;
            return false;
        }

        let mut record = record;
        record.output_path = Some(final_path.to_string_lossy().to_string());
        let _ = self.file_store.put(record).await;

        self.finalize.fire();
        false
    }

    pub async fn on_finalize(&self) {
        let Some(mut record) = self.record().await else { return };
        record.status = FileStatus::Completed;
        record.finished_at = Some(crate::model::file_record::now_secs());
        if self.file_store.put(record.clone()).await.is_err() {
            return;
        }
        let _ = self.segment_store.delete_all_for_task(&self.task_id).await;

        self.emit_event(StatusEvent {
            task_id: self.task_id.clone(),
            is_complete: true,
            download_progress: 100,
            total_shards: record.slice_table.len(),
            segment_id: SegmentId::from(""),
            segment_index: 0,
            segment_size: 0,
            is_parity: false,
            node_id: crate::model::PeerId::from(""),
            timestamp: crate::model::file_record::now_secs(),
        });
    }

    // ── pause / resume / cancel ───────────────────────────────────────────

    pub async fn pause(&self) -> Result<(), TaskError> {
        let Some(mut record) = self.record().await else { return Ok(()) };
        if !matches!(record.status, FileStatus::Pending | FileStatus::Downloading | FileStatus::FetchingInfo) {
            return Ok(());
        }
        record.status = FileStatus::Paused;
        self.file_store.put(record).await.map_err(TaskError::Store)?;
        self.transfer_cancel.lock().unwrap().cancel();
        Ok(())
    }

    pub async fn resume(&self) -> Result<(), TaskError> {
        let Some(mut record) = self.record().await else { return Ok(()) };
        if record.status.is_terminal() && !matches!(record.status, FileStatus::Failed) {
            return Ok(());
        }
        *self.transfer_cancel.lock().unwrap() = self.parent_cancel.child_token();
        record.status = if record.slice_table.is_empty() { FileStatus::Pending } else { FileStatus::Downloading };
        self.file_store.put(record).await.map_err(TaskError::Store)?;
        self.tick_enabled.store(true, Ordering::Relaxed);
        self.index_tick.fire();
        Ok(())
    }

    pub async fn cancel(&self) -> Result<(), TaskError> {
        let Some(mut record) = self.record().await else { return Ok(()) };
        if record.status.is_terminal() {
            return Ok(());
        }
        record.status = FileStatus::Cancelled;
        record.finished_at = Some(crate::model::file_record::now_secs());
        self.file_store.put(record).await.map_err(TaskError::Store)?;
        self.transfer_cancel.lock().unwrap().cancel();
        self.parent_cancel.cancel();
        Ok(())
    }
}
