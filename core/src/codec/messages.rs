//! Request/response payloads for the three pubsub topics and the one
//! stream protocol named in `spec.md` §6.

use serde::{Deserialize, Serialize};

use crate::model::{FileId, PeerId, SegmentId, SliceTableEntry, TaskId};

/// Topics and the stream protocol are versioned; `spec.md` §6 leaves the
/// version numbering scheme unspecified beyond "versioned".
pub type ProtocolVersion = u16;

pub const CURRENT_PROTOCOL_VERSION: ProtocolVersion = 1;

/// The requester's addressable identity, carried on every request so a
/// peer can reply privately. `spec.md` §6: "requester addr-info".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddrInfo {
    pub peer_id: PeerId,
    pub multiaddrs: Vec<String>,
}

/// `spec.md` §6: "file-info request: carries task id, file id, owner
/// public-key hash, and the requester's addressable identity".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfoRequest {
    pub version: ProtocolVersion,
    pub task_id: TaskId,
    pub file_id: FileId,
    pub owner_pubkey_hash: Vec<u8>,
    pub requester: AddrInfo,
}

/// The private reply to a [`FileInfoRequest`]: file metadata and the slice
/// table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfoResponse {
    pub version: ProtocolVersion,
    pub task_id: TaskId,
    pub name: String,
    pub extension: String,
    pub size: u64,
    pub content_type: String,
    pub sha256: [u8; 32],
    pub slice_table: Vec<SliceTableEntry>,
}

/// `spec.md` §6: "manifest request: same identity + a list of still-needed
/// segment ids."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestRequest {
    pub version: ProtocolVersion,
    pub task_id: TaskId,
    pub file_id: FileId,
    pub owner_pubkey_hash: Vec<u8>,
    pub requester: AddrInfo,
    pub requested_segment_ids: Vec<SegmentId>,
}

/// One slice a responding peer claims to hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableSlice {
    pub index: u32,
    pub segment_id: SegmentId,
}

/// Published on the response topic. `spec.md` §6: "available-slices map
/// `index → segment-id`" from a responding peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestResponse {
    pub version: ProtocolVersion,
    pub task_id: TaskId,
    pub responder: PeerId,
    pub available_slices: Vec<AvailableSlice>,
}

/// `spec.md` §6: "segment-content request: for a single segment by
/// id+index; used by recovery. Private reply." Also doubles as the stream
/// protocol's request (`spec.md` §6 stream protocol section).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRequest {
    pub version: ProtocolVersion,
    pub task_id: TaskId,
    pub file_id: FileId,
    pub owner_pubkey_hash: Vec<u8>,
    pub requester: AddrInfo,
    pub segment_id: SegmentId,
    pub segment_index: u32,
}

/// Alias matching `spec.md` §6's stream-protocol naming exactly
/// (`SegmentContentRequest`/`SegmentContentResponse`).
pub type SegmentContentRequest = ContentRequest;

/// The signed, encrypted segment payload as it travels the wire. `spec.md`
/// §6: "script" carries the public key used to verify the signature; its
/// internal layout is the excluded signing collaborator's concern, so it is
/// kept opaque here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentContentResponse {
    pub version: ProtocolVersion,
    pub task_id: TaskId,
    pub segment_id: SegmentId,
    pub segment_index: u32,
    pub crc32: u32,
    pub is_parity: bool,
    pub key_share: Vec<u8>,
    pub encrypted_payload: Vec<u8>,
    pub signature_der: Vec<u8>,
    pub script: Vec<u8>,
}

/// `spec.md` §6: "response = `SegmentContentResponse` or framed error
/// envelope."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamEnvelope {
    Content(SegmentContentResponse),
    Error { code: String, message: String },
}
