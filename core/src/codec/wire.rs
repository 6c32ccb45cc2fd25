//! Bincode encode/decode helpers. `spec.md` leaves the wire codec
//! unspecified beyond "length-prefixed frames"; `bincode` is the pack's
//! usual choice for this shape of internal request/response struct.

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("encode failed: {0}")]
    Encode(String),
    #[error("decode failed: {0}")]
    Decode(String),
}

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    bincode::serialize(value).map_err(|e| CodecError::Encode(e.to_string()))
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    bincode::deserialize(bytes).map_err(|e| CodecError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{AddrInfo, FileInfoRequest};
    use crate::model::{FileId, PeerId, TaskId};

    #[test]
    fn roundtrip_file_info_request() {
        let req = FileInfoRequest {
            version: 1,
            task_id: TaskId::from("t1"),
            file_id: FileId::from("f1"),
            owner_pubkey_hash: vec![1, 2, 3],
            requester: AddrInfo { peer_id: PeerId::from("p1"), multiaddrs: vec!["/ip4/127.0.0.1".into()] },
        };
        let bytes = encode(&req).unwrap();
        let decoded: FileInfoRequest = decode(&bytes).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn decode_rejects_garbage() {
        let result: Result<FileInfoRequest, _> = decode(&[0xff, 0x01, 0x02]);
        assert!(result.is_err());
    }
}
