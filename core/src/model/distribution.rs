//! Segment Distribution Queue — `spec.md` §4.4.
//!
//! A FIFO of `peer -> [segment ids]` assignments, protected by a single
//! `std::sync::Mutex` — the queue is drain-only and append-only, so a plain
//! `Mutex` (rather than the teacher's `RwLock` used for scan-heavy state) is
//! the right fit, matching the spec's instruction that this queue does no
//! deduplication across entries.

use std::collections::VecDeque;
use std::sync::Mutex;

use super::ids::{PeerId, SegmentId};

#[derive(Debug, Clone)]
pub struct PeerAssignment {
    pub peer: PeerId,
    pub segment_ids: Vec<SegmentId>,
}

#[derive(Default)]
pub struct DistributionQueue {
    inner: Mutex<VecDeque<PeerAssignment>>,
}

impl DistributionQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
        }
    }

    pub fn add(&self, assignment: PeerAssignment) {
        self.inner.lock().unwrap().push_back(assignment);
    }

    pub fn next(&self) -> Option<PeerAssignment> {
        self.inner.lock().unwrap().pop_front()
    }

    /// Drains every queued assignment at once — used by `node-dispatch`
    /// (`spec.md` §4.1) which processes the whole queue per tick.
    pub fn drain_all(&self) -> Vec<PeerAssignment> {
        let mut guard = self.inner.lock().unwrap();
        guard.drain(..).collect()
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
