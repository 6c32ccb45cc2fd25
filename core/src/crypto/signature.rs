//! ECDSA signature verification — `spec.md` §4.3(a).
//!
//! Signing itself is an excluded external collaborator (`spec.md` §1); this
//! module only verifies, over the canonical byte string `spec.md` §4.3(a)
//! defines: file id, content type, sha256, sorted slice table, segment id,
//! segment index, crc32, and encrypted payload, in that order.

use p256::ecdsa::signature::Verifier;
use p256::ecdsa::{Signature, VerifyingKey};

use crate::model::{FileId, FileMeta, SegmentId, SliceTableEntry};

/// Builds the canonical message that a segment content response's signature
/// covers. Order matters and is fixed by `spec.md` §4.3(a).
pub fn canonical_message(
    file_id: &FileId,
    content_type: &str,
    sha256: &[u8; 32],
    slice_table: &[SliceTableEntry],
    segment_id: &SegmentId,
    segment_index: u32,
    crc32: u32,
    encrypted_payload: &[u8],
) -> Vec<u8> {
    let mut sorted: Vec<&SliceTableEntry> = slice_table.iter().collect();
    sorted.sort_by_key(|e| e.index);

    let mut buf = Vec::with_capacity(encrypted_payload.len() + 256);
    buf.extend_from_slice(file_id.as_str().as_bytes());
    buf.extend_from_slice(content_type.as_bytes());
    buf.extend_from_slice(sha256);
    for entry in sorted {
        buf.extend_from_slice(entry.segment_id.as_str().as_bytes());
        buf.extend_from_slice(&entry.index.to_be_bytes());
        buf.extend_from_slice(&entry.crc32.to_be_bytes());
        buf.push(entry.is_parity as u8);
    }
    buf.extend_from_slice(segment_id.as_str().as_bytes());
    buf.extend_from_slice(&segment_index.to_be_bytes());
    buf.extend_from_slice(&crc32.to_be_bytes());
    buf.extend_from_slice(encrypted_payload);
    buf
}

pub fn canonical_message_for_meta(
    file_id: &FileId,
    meta: &FileMeta,
    slice_table: &[SliceTableEntry],
    segment_id: &SegmentId,
    segment_index: u32,
    crc32: u32,
    encrypted_payload: &[u8],
) -> Vec<u8> {
    canonical_message(
        file_id,
        &meta.content_type,
        &meta.sha256,
        slice_table,
        segment_id,
        segment_index,
        crc32,
        encrypted_payload,
    )
}

/// Verification seam. `spec.md` §4.3(a): "the public key extracted from the
/// response's script" — extraction of the key from the opaque `script`
/// bytes is left to the caller (it is part of the excluded signing
/// collaborator's format); this trait only verifies a signature against an
/// already-extracted SEC1-encoded public key.
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, pubkey_sec1: &[u8], message: &[u8], signature_der: &[u8]) -> bool;
}

/// Default P-256 ECDSA verifier.
#[derive(Default)]
pub struct P256SignatureVerifier;

impl SignatureVerifier for P256SignatureVerifier {
    fn verify(&self, pubkey_sec1: &[u8], message: &[u8], signature_der: &[u8]) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_sec1_bytes(pubkey_sec1) else {
            return false;
        };
        let Ok(signature) = Signature::from_der(signature_der) else {
            return false;
        };
        verifying_key.verify(message, &signature).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::signature::Signer;
    use p256::ecdsa::SigningKey;
    use rand::rngs::OsRng;

    #[test]
    fn verify_roundtrip() {
        let signing_key = SigningKey::random(&mut OsRng);
        let verifying_key = VerifyingKey::from(&signing_key);
        let pubkey_sec1 = verifying_key.to_encoded_point(true).as_bytes().to_vec();

        let msg = b"hello canonical message";
        let sig: Signature = signing_key.sign(msg);

        let verifier = P256SignatureVerifier;
        assert!(verifier.verify(&pubkey_sec1, msg, sig.to_der().as_bytes()));
    }

    /// `spec.md` §8: "Signature verification is idempotent on a given
    /// response; running it twice gives the same result."
    #[test]
    fn verify_is_idempotent() {
        let signing_key = SigningKey::random(&mut OsRng);
        let verifying_key = VerifyingKey::from(&signing_key);
        let pubkey_sec1 = verifying_key.to_encoded_point(true).as_bytes().to_vec();
        let msg = b"payload";
        let sig: Signature = signing_key.sign(msg);
        let verifier = P256SignatureVerifier;
        let first = verifier.verify(&pubkey_sec1, msg, sig.to_der().as_bytes());
        let second = verifier.verify(&pubkey_sec1, msg, sig.to_der().as_bytes());
        assert_eq!(first, second);
        assert!(first);
    }

    #[test]
    fn verify_rejects_tampered_message() {
        let signing_key = SigningKey::random(&mut OsRng);
        let verifying_key = VerifyingKey::from(&signing_key);
        let pubkey_sec1 = verifying_key.to_encoded_point(true).as_bytes().to_vec();
        let sig: Signature = signing_key.sign(b"original");
        let verifier = P256SignatureVerifier;
        assert!(!verifier.verify(&pubkey_sec1, b"tampered", sig.to_der().as_bytes()));
    }
}
