//! Per-segment download state — `spec.md` §3 "Download Segment".

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::ids::{PeerId, SegmentId, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentStatus {
    Pending,
    Downloading,
    Completed,
    Failed,
}

/// `spec.md` §9 leaves the encrypted-payload-vs-temp-file choice open; this
/// repo stores decrypted plaintext in memory (`Bytes`) as the primary
/// representation, per the decision recorded in `DESIGN.md`, while keeping
/// the `Path` variant so a temp-file-backed store can be swapped in without
/// touching call sites.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SegmentPayload {
    Bytes(Vec<u8>),
    Path(String),
}

/// One slice-table entry's live download state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadSegment {
    pub segment_id: SegmentId,
    pub segment_index: u32,
    pub task_id: TaskId,
    pub crc32: u32,
    pub is_parity: bool,
    pub status: SegmentStatus,
    /// Present once the content response for this segment has been received.
    pub key_share_b: Option<Vec<u8>>,
    pub payload: Option<SegmentPayload>,
    /// Candidates believed to hold this segment — `peer -> still candidate`.
    /// `spec.md` §9: never cleared between task runs (see DESIGN.md).
    pub peer_availability: HashMap<PeerId, bool>,
    /// The peer that most recently completed this segment, for status events.
    pub completed_by: Option<PeerId>,
}

impl DownloadSegment {
    pub fn new(task_id: TaskId, segment_id: SegmentId, segment_index: u32, crc32: u32, is_parity: bool) -> Self {
        Self {
            segment_id,
            segment_index,
            task_id,
            crc32,
            is_parity,
            status: SegmentStatus::Pending,
            key_share_b: None,
            payload: None,
            peer_availability: HashMap::new(),
            completed_by: None,
        }
    }

    /// Candidate peers currently believed to hold this segment.
    pub fn candidate_peers(&self) -> Vec<PeerId> {
        self.peer_availability
            .iter()
            .filter(|(_, still_candidate)| **still_candidate)
            .map(|(p, _)| p.clone())
            .collect()
    }

    /// Removes a peer permanently from this segment's availability map —
    /// `spec.md` §4.3: "a peer returning a terminal error ... is removed
    /// from that segment's availability map."
    pub fn remove_peer(&mut self, peer: &PeerId) {
        self.peer_availability.remove(peer);
    }

    pub fn add_candidate(&mut self, peer: PeerId) {
        self.peer_availability.insert(peer, true);
    }
}
