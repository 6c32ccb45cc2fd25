//! Discovery (Pubsub) — `spec.md` §4.2: request and ingest file-info and
//! segment-location manifests over three request topics plus one response
//! topic.

mod transport;

pub use transport::{PubsubTransport, Topic, Topics};

use std::collections::HashMap;

use log::warn;

use crate::codec::{
    self, AddrInfo, ContentRequest, FileInfoRequest, FileInfoResponse, ManifestRequest,
    ManifestResponse, SegmentContentResponse, CURRENT_PROTOCOL_VERSION,
};
use crate::model::{
    DiscoveryError, DistributionQueue, DownloadSegment, FileId, PeerAssignment, PeerId, SegmentStatus, TaskId,
};
use crate::store::SegmentStore;

/// Requests file metadata and the slice table for a task — `spec.md` §4.2
/// "file-info request". Request/reply, private.
pub async fn request_file_info(
    transport: &dyn PubsubTransport,
    task_id: &TaskId,
    file_id: &FileId,
    owner_pubkey_hash: &[u8],
    requester: AddrInfo,
) -> Result<FileInfoResponse, DiscoveryError> {
    let request = FileInfoRequest {
        version: CURRENT_PROTOCOL_VERSION,
        task_id: task_id.clone(),
        file_id: file_id.clone(),
        owner_pubkey_hash: owner_pubkey_hash.to_vec(),
        requester,
    };
    let topic = Topics::file_info_request(CURRENT_PROTOCOL_VERSION);
    let payload = codec::encode(&request).map_err(|e| DiscoveryError::Transport(e.to_string()))?;
    let reply = transport.request_reply(&topic, payload).await?;
    codec::decode(&reply).map_err(|e| DiscoveryError::Transport(e.to_string()))
}

/// Publishes a manifest request naming the still-needed segment ids —
/// `spec.md` §4.1 "segment-index tick". Fire-and-forget: responses arrive
/// asynchronously on the manifest response topic.
pub async fn request_manifest(
    transport: &dyn PubsubTransport,
    task_id: &TaskId,
    file_id: &FileId,
    owner_pubkey_hash: &[u8],
    requester: AddrInfo,
    requested_segment_ids: Vec<crate::model::SegmentId>,
) -> Result<(), DiscoveryError> {
    let request = ManifestRequest {
        version: CURRENT_PROTOCOL_VERSION,
        task_id: task_id.clone(),
        file_id: file_id.clone(),
        owner_pubkey_hash: owner_pubkey_hash.to_vec(),
        requester,
        requested_segment_ids,
    };
    let topic = Topics::manifest_request(CURRENT_PROTOCOL_VERSION);
    let payload = codec::encode(&request).map_err(|e| DiscoveryError::Transport(e.to_string()))?;
    transport.publish(&topic, payload).await
}

/// Requests a single segment's content directly, bypassing the stream
/// protocol — `spec.md` §4.2 "segment-content request", used by recovery
/// (`spec.md` §4.1 "Recovery").
pub async fn request_segment_content(
    transport: &dyn PubsubTransport,
    task_id: &TaskId,
    file_id: &FileId,
    owner_pubkey_hash: &[u8],
    requester: AddrInfo,
    segment_id: crate::model::SegmentId,
    segment_index: u32,
) -> Result<SegmentContentResponse, DiscoveryError> {
    let request = ContentRequest {
        version: CURRENT_PROTOCOL_VERSION,
        task_id: task_id.clone(),
        file_id: file_id.clone(),
        owner_pubkey_hash: owner_pubkey_hash.to_vec(),
        requester,
        segment_id,
        segment_index,
    };
    let topic = Topics::content_request(CURRENT_PROTOCOL_VERSION);
    let payload = codec::encode(&request).map_err(|e| DiscoveryError::Transport(e.to_string()))?;
    let reply = transport.request_reply(&topic, payload).await?;
    codec::decode(&reply).map_err(|e| DiscoveryError::Transport(e.to_string()))
}

/// Ingests one manifest response: for each `(peer, segment-index,
/// segment-id)` triple, updates the matching segment's availability map and,
/// if the segment is still incomplete, appends a `peer -> [segment-id]`
/// assignment to the distribution queue. `spec.md` §4.2: "Fails to find a
/// matching segment index are logged warnings, not errors."
pub fn ingest_manifest_response(
    response: &ManifestResponse,
    segments_by_index: &mut HashMap<u32, DownloadSegment>,
    distribution: &DistributionQueue,
) {
    for slice in &response.available_slices {
        let Some(segment) = segments_by_index.get_mut(&slice.index) else {
            warn!(
                "manifest response from {} for task {}: no segment at index {}",
                response.responder, response.task_id, slice.index
            );
            continue;
        };
        if segment.segment_id != slice.segment_id {
            warn!(
                "manifest response from {} for task {}: segment id mismatch at index {} (have {}, got {})",
                response.responder, response.task_id, slice.index, segment.segment_id, slice.segment_id
            );
            continue;
        }
        segment.add_candidate(response.responder.clone());
        if !matches!(segment.status, SegmentStatus::Completed) {
            distribution.add(PeerAssignment {
                peer: response.responder.clone(),
                segment_ids: vec![segment.segment_id.clone()],
            });
        }
    }
}

/// Store-backed variant of [`ingest_manifest_response`] for the live
/// runtime: loads the task's segments from `segment_store` indexed by
/// segment index, applies the same per-slice logic, and persists every
/// touched segment back. Returns whether anything was queued, so the
/// caller (`task::DownloadTask`'s manifest-response listener) knows
/// whether to fire `process`.
pub async fn ingest_manifest_response_into_store(
    response: &ManifestResponse,
    segment_store: &dyn SegmentStore,
    distribution: &DistributionQueue,
) -> Result<bool, String> {
    let segments = segment_store.list_by_task(&response.task_id).await?;
    let mut by_index: HashMap<u32, DownloadSegment> = segments.into_iter().map(|s| (s.segment_index, s)).collect();

    let mut queued = false;
    let mut touched: Vec<u32> = Vec::new();
    for slice in &response.available_slices {
        let Some(segment) = by_index.get_mut(&slice.index) else {
            warn!(
                "manifest response from {} for task {}: no segment at index {}",
                response.responder, response.task_id, slice.index
            );
            continue;
        };
        if segment.segment_id != slice.segment_id {
            warn!(
                "manifest response from {} for task {}: segment id mismatch at index {} (have {}, got {})",
                response.responder, response.task_id, slice.index, segment.segment_id, slice.segment_id
            );
            continue;
        }
        segment.add_candidate(response.responder.clone());
        if !matches!(segment.status, SegmentStatus::Completed) {
            distribution.add(PeerAssignment {
                peer: response.responder.clone(),
                segment_ids: vec![segment.segment_id.clone()],
            });
            queued = true;
        }
        touched.push(slice.index);
    }

    for index in touched {
        if let Some(segment) = by_index.remove(&index) {
            segment_store.put(segment).await?;
        }
    }
    Ok(queued)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::AvailableSlice;
    use crate::model::{SegmentId, TaskId};
    use crate::store::InMemorySegmentStore;

    fn segment(index: u32, id: &str, status: SegmentStatus) -> DownloadSegment {
        let mut s = DownloadSegment::new(TaskId::from("t1"), SegmentId::from(id), index, 0, false);
        s.status = status;
        s
    }

    #[test]
    fn ingest_adds_candidate_and_queues_incomplete_segment() {
        let mut segments = HashMap::new();
        segments.insert(0, segment(0, "s0", SegmentStatus::Pending));
        let queue = DistributionQueue::new();
        let response = ManifestResponse {
            version: 1,
            task_id: TaskId::from("t1"),
            responder: PeerId::from("peerA"),
            available_slices: vec![AvailableSlice { index: 0, segment_id: SegmentId::from("s0") }],
        };

        ingest_manifest_response(&response, &mut segments, &queue);

        assert!(segments[&0].peer_availability.contains_key(&PeerId::from("peerA")));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn ingest_skips_completed_segment_dispatch_but_still_records_peer() {
        let mut segments = HashMap::new();
        segments.insert(0, segment(0, "s0", SegmentStatus::Completed));
        let queue = DistributionQueue::new();
        let response = ManifestResponse {
            version: 1,
            task_id: TaskId::from("t1"),
            responder: PeerId::from("peerA"),
            available_slices: vec![AvailableSlice { index: 0, segment_id: SegmentId::from("s0") }],
        };

        ingest_manifest_response(&response, &mut segments, &queue);

        assert!(segments[&0].peer_availability.contains_key(&PeerId::from("peerA")));
        assert!(queue.is_empty());
    }

    #[test]
    fn ingest_logs_and_skips_unmatched_index() {
        let mut segments = HashMap::new();
        segments.insert(0, segment(0, "s0", SegmentStatus::Pending));
        let queue = DistributionQueue::new();
        let response = ManifestResponse {
            version: 1,
            task_id: TaskId::from("t1"),
            responder: PeerId::from("peerA"),
            available_slices: vec![AvailableSlice { index: 7, segment_id: SegmentId::from("s7") }],
        };

        ingest_manifest_response(&response, &mut segments, &queue);

        assert!(queue.is_empty());
        assert!(segments[&0].peer_availability.is_empty());
    }

    #[tokio::test]
    async fn ingest_into_store_persists_candidate_and_queues_dispatch() {
        let store = InMemorySegmentStore::new();
        store.put(segment(0, "s0", SegmentStatus::Pending)).await.unwrap();
        let queue = DistributionQueue::new();
        let response = ManifestResponse {
            version: 1,
            task_id: TaskId::from("t1"),
            responder: PeerId::from("peerA"),
            available_slices: vec![AvailableSlice { index: 0, segment_id: SegmentId::from("s0") }],
        };

        let queued = ingest_manifest_response_into_store(&response, &store, &queue).await.unwrap();

        assert!(queued);
        assert_eq!(queue.len(), 1);
        let stored = store.get(&SegmentId::from("s0")).await.unwrap().unwrap();
        assert!(stored.peer_availability.contains_key(&PeerId::from("peerA")));
    }
}
