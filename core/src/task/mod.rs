//! The download task state machine — `spec.md` §4.1. One `DownloadTask` per
//! in-flight file, driven by a single `tokio::select!` supervisor loop over
//! its seven trigger channels plus the network-transfer batch channel. The
//! re-entrancy-guarded transitions (`verify`, `merge`) are spawned off the
//! loop so the guard in `core::ReentrancyGuard` actually has something to
//! guard against; everything else runs inline, since the loop only ever
//! processes one event at a time anyway.

mod backoff;
mod core;
mod trigger;

pub use backoff::StallTracker;
pub use core::{ReentrancyGuard, TaskCore};
pub use trigger::Trigger;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::codec::AddrInfo;
use crate::config::Config;
use crate::crypto::{KeyRecovery, SignatureVerifier};
use crate::discovery::PubsubTransport;
use crate::model::{PeerAssignment, StatusEvent, TaskError, TaskId};
use crate::store::{FileRecordStore, SegmentStore};
use crate::transfer::StreamTransport;

pub(crate) struct TaskTriggers {
    pub index_tick: Trigger,
    pub process: Trigger,
    pub dispatch: Trigger,
    pub verify: Trigger,
    pub recovery: Trigger,
    pub merge: Trigger,
    pub finalize: Trigger,
}

/// External handle to a running task — the manager's view. Every method is
/// non-blocking except `pause`/`resume`/`cancel`, which persist a status
/// change and so need the store round-trip.
#[derive(Clone)]
pub struct TaskHandle {
    core: Arc<TaskCore>,
}

impl TaskHandle {
    pub fn task_id(&self) -> &TaskId {
        &self.core.task_id
    }

    pub fn force_index_tick(&self) {
        self.core.index_tick.fire();
    }

    pub fn force_verify(&self) {
        self.core.verify.fire();
    }

    pub async fn pause(&self) -> Result<(), TaskError> {
        self.core.pause().await
    }

    pub async fn resume(&self) -> Result<(), TaskError> {
        self.core.resume().await
    }

    pub async fn cancel(&self) -> Result<(), TaskError> {
        self.core.cancel().await
    }
}

/// Collaborators a new task needs — bundled so `DownloadManager` doesn't have
/// to thread eight constructor arguments at every call site.
pub struct TaskDeps {
    pub cfg: Config,
    pub local_addr: AddrInfo,
    pub file_store: Arc<dyn FileRecordStore>,
    pub segment_store: Arc<dyn SegmentStore>,
    pub pubsub: Arc<dyn PubsubTransport>,
    pub stream_transport: Arc<dyn StreamTransport>,
    pub verifier: Arc<dyn SignatureVerifier>,
    pub key_recovery: Arc<dyn KeyRecovery>,
    pub status_tx: broadcast::Sender<StatusEvent>,
    pub error_tx: broadcast::Sender<(TaskId, TaskError)>,
}

/// The supervisor itself: owns the receiving half of every trigger channel
/// and runs until cancelled or finalized.
struct DownloadTask {
    core: Arc<TaskCore>,
    index_tick_rx: mpsc::Receiver<()>,
    process_rx: mpsc::Receiver<()>,
    dispatch_rx: mpsc::Receiver<()>,
    verify_rx: mpsc::Receiver<()>,
    recovery_rx: mpsc::Receiver<()>,
    merge_rx: mpsc::Receiver<()>,
    finalize_rx: mpsc::Receiver<()>,
    transfer_rx: mpsc::Receiver<Vec<PeerAssignment>>,
}

/// Spawns the supervisor for `task_id` and returns a handle to it. The
/// caller must have already persisted the task's `FileRecord` — `spec.md`
/// §4.5 `new-download` does this before calling `spawn`.
pub fn spawn(task_id: TaskId, deps: TaskDeps) -> TaskHandle {
    let (index_tick, index_tick_rx) = Trigger::channel();
    let (process, process_rx) = Trigger::channel();
    let (dispatch, dispatch_rx) = Trigger::channel();
    let (verify, verify_rx) = Trigger::channel();
    let (recovery, recovery_rx) = Trigger::channel();
    let (merge, merge_rx) = Trigger::channel();
    let (finalize, finalize_rx) = Trigger::channel();
    // Sized to `max_concurrent_downloads` — `spec.md` §5: the one non-unit
    // channel in the task, since a batch carries real dispatch work rather
    // than a content-less marker.
    let (transfer_tx, transfer_rx) = mpsc::channel(deps.cfg.max_concurrent_downloads.max(1));

    let triggers = TaskTriggers {
        index_tick: index_tick.clone(),
        process,
        dispatch,
        verify,
        recovery,
        merge,
        finalize,
    };

    let core = Arc::new(TaskCore::new(
        task_id,
        deps.cfg,
        deps.local_addr,
        deps.file_store,
        deps.segment_store,
        deps.pubsub,
        deps.stream_transport,
        deps.verifier,
        deps.key_recovery,
        deps.status_tx,
        deps.error_tx,
        transfer_tx,
        triggers,
        CancellationToken::new(),
    ));

    let task = DownloadTask {
        core: Arc::clone(&core),
        index_tick_rx,
        process_rx,
        dispatch_rx,
        verify_rx,
        recovery_rx,
        merge_rx,
        finalize_rx,
        transfer_rx,
    };

    tokio::spawn(task.run());
    tokio::spawn({
        let core = Arc::clone(&core);
        async move { core.run_manifest_listener().await }
    });
    index_tick.fire();

    TaskHandle { core }
}

impl DownloadTask {
    async fn run(mut self) {
        let mut sleep = Box::pin(tokio::time::sleep(self.core.tick_interval()));

        loop {
            let tick_enabled = self.core.tick_enabled.load(Ordering::Relaxed);
            tokio::select! {
                biased;

                _ = self.core.parent_cancel.cancelled() => {
                    break;
                }

                _ = &mut sleep, if tick_enabled => {
                    self.core.on_index_tick().await;
                    sleep.as_mut().reset(tokio::time::Instant::now() + self.core.tick_interval());
                }

                Some(()) = self.index_tick_rx.recv() => {
                    self.core.on_index_tick().await;
                    sleep.as_mut().reset(tokio::time::Instant::now() + self.core.tick_interval());
                }

                Some(()) = self.process_rx.recv() => {
                    self.core.on_process().await;
                }

                Some(()) = self.dispatch_rx.recv() => {
                    self.core.on_dispatch().await;
                }

                Some(batch) = self.transfer_rx.recv() => {
                    self.core.on_network_transfer(batch).await;
                }

                Some(()) = self.verify_rx.recv() => {
                    let core = Arc::clone(&self.core);
                    tokio::spawn(async move { core.on_verify().await });
                }

                Some(()) = self.recovery_rx.recv() => {
                    self.core.on_recovery().await;
                }

                Some(()) = self.merge_rx.recv() => {
                    let core = Arc::clone(&self.core);
                    tokio::spawn(async move { core.on_merge().await });
                }

                Some(()) = self.finalize_rx.recv() => {
                    self.core.on_finalize().await;
                    break;
                }

                else => break,
            }
        }
    }
}
