//! Wire types exchanged over pubsub and streams — `spec.md` §6. The segment
//! container binary format and the field encoder/decoder are out of scope
//! (`spec.md` §1); this module only defines the request/response structs
//! and encodes them with `bincode`, the way the teacher's progress snapshots
//! use `serde` for their own wire/storage representation.

mod messages;
mod wire;

pub use messages::{
    AddrInfo, AvailableSlice, ContentRequest, FileInfoRequest, FileInfoResponse, ManifestRequest,
    ManifestResponse, ProtocolVersion, SegmentContentRequest, SegmentContentResponse, StreamEnvelope,
    CURRENT_PROTOCOL_VERSION,
};
pub use wire::{decode, encode, CodecError};
