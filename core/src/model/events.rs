//! Status events emitted to manager consumers — `spec.md` §6 "Status events".

use serde::Serialize;

use super::ids::{PeerId, SegmentId, TaskId};

#[derive(Debug, Clone, Serialize)]
pub struct StatusEvent {
    pub task_id: TaskId,
    pub is_complete: bool,
    /// 0-100.
    pub download_progress: u8,
    pub total_shards: usize,
    pub segment_id: SegmentId,
    pub segment_index: u32,
    pub segment_size: u64,
    pub is_parity: bool,
    pub node_id: PeerId,
    pub timestamp: u64,
}
