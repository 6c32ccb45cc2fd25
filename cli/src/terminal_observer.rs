//! Renders a running task's progress as indicatif terminal bars.
//!
//! One `ProgressBar` per segment, plus a total bar — mirrors the teacher's
//! `TerminalProgressObserver`, generalized from "HTTP piece" to "P2P segment"
//! and driven off `DownloadManager::subscribe_status`/`subscribe_errors`
//! rather than a push-style observer trait.

use std::collections::HashMap;
use std::sync::Mutex;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio::sync::broadcast;

use swarmdl_core::model::{StatusEvent, TaskError, TaskId};

pub struct TerminalProgressObserver {
    multi: MultiProgress,
    /// segment id -> its bar, lazily created on first sighting.
    bars: Mutex<HashMap<String, ProgressBar>>,
    total_bar: Mutex<Option<ProgressBar>>,
}

impl TerminalProgressObserver {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
            total_bar: Mutex::new(None),
        }
    }

    fn ensure_total_bar(&self) -> ProgressBar {
        let mut total_bar = self.total_bar.lock().unwrap();
        if total_bar.is_none() {
            let style = ProgressStyle::with_template("Total [{bar:30.green/white}] {pos}/100% {msg}")
                .unwrap()
                .progress_chars("=>-");
            let pb = self.multi.add(ProgressBar::new(100));
            pb.set_style(style);
            *total_bar = Some(pb);
        }
        total_bar.as_ref().unwrap().clone()
    }

    fn ensure_segment_bar(&self, event: &StatusEvent) -> ProgressBar {
        let mut bars = self.bars.lock().unwrap();
        bars.entry(event.segment_id.as_str().to_string())
            .or_insert_with(|| {
                let style = ProgressStyle::with_template("[{bar:30.cyan/blue}] {msg}")
                    .unwrap()
                    .progress_chars("=>-");
                let pb = self.multi.add(ProgressBar::new(1));
                pb.set_style(style);
                let kind = if event.is_parity { "parity" } else { "data" };
                pb.set_message(format!("{} #{} ({kind})", event.segment_id, event.segment_index));
                pb
            })
            .clone()
    }

    fn on_status(&self, event: &StatusEvent) {
        let segment_bar = self.ensure_segment_bar(event);
        segment_bar.set_position(1);

        let total_bar = self.ensure_total_bar();
        total_bar.set_position(event.download_progress as u64);
        total_bar.set_message(format!("from {}", event.node_id));

        if event.is_complete {
            segment_bar.finish_with_message(format!("{} done", event.segment_id));
            total_bar.finish_with_message(format!("task {} complete", event.task_id));
        }
    }

    fn on_error(&self, task_id: &TaskId, error: &TaskError) {
        let total_bar = self.ensure_total_bar();
        total_bar.abandon_with_message(format!("task {task_id} failed: {error}"));
    }

    /// Drains both broadcast channels for `task_id` until the task reaches a
    /// terminal state or the channels close, rendering bars as it goes.
    pub async fn watch(
        &self,
        task_id: &TaskId,
        mut status_rx: broadcast::Receiver<StatusEvent>,
        mut error_rx: broadcast::Receiver<(TaskId, TaskError)>,
    ) {
        loop {
            tokio::select! {
                status = status_rx.recv() => {
                    match status {
                        Ok(event) if &event.task_id == task_id => {
                            let complete = event.is_complete;
                            self.on_status(&event);
                            if complete {
                                break;
                            }
                        }
                        Ok(_) => continue,
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                error = error_rx.recv() => {
                    match error {
                        Ok((id, err)) if &id == task_id => {
                            self.on_error(&id, &err);
                            break;
                        }
                        Ok(_) => continue,
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }
    }
}
