//! Per-segment verification/decrypt/decompress pipeline — `spec.md` §4.3
//! "Per-segment processing on receipt", steps (a)-(e). Step (f) (persist +
//! mark completed) is the caller's responsibility since it needs the
//! `SegmentStore` and the owning `DownloadSegment`.

use crate::codec::SegmentContentResponse;
use crate::crypto::{canonical_message_for_meta, KeyRecovery, SignatureVerifier};
use crate::model::{FileId, FileMeta, SliceTableEntry, VerifyError};

pub struct ProcessContext<'a> {
    pub file_id: &'a FileId,
    pub file_meta: &'a FileMeta,
    pub slice_table: &'a [SliceTableEntry],
    /// The file record's first key share; combined with `response.key_share`
    /// (the second share) to recover the symmetric key — `spec.md` §4.3(b).
    pub task_key_share: &'a [u8],
}

/// Runs steps (a)-(e) of `spec.md` §4.3 and returns the final decompressed
/// plaintext on success.
pub fn process_segment_response(
    ctx: &ProcessContext<'_>,
    response: &SegmentContentResponse,
    verifier: &dyn SignatureVerifier,
    key_recovery: &dyn KeyRecovery,
) -> Result<Vec<u8>, VerifyError> {
    // (a) signature verification. `script` carries the SEC1-encoded public
    // key the signature was produced with — see `crypto::signature` docs.
    let message = canonical_message_for_meta(
        ctx.file_id,
        ctx.file_meta,
        ctx.slice_table,
        &response.segment_id,
        response.segment_index,
        response.crc32,
        &response.encrypted_payload,
    );
    if !verifier.verify(&response.script, &message, &response.signature_der) {
        return Err(VerifyError::BadSignature);
    }

    // (b) key recovery from the two shares.
    let shares = vec![ctx.task_key_share.to_vec(), response.key_share.clone()];
    let secret = key_recovery.recover(&shares)?;

    // (c) decrypt.
    let decrypted = crate::crypto::decrypt_payload(&secret, &response.encrypted_payload)?;

    // (d) checksum check against the response-declared crc32.
    crate::crypto::verify_crc32(&decrypted, response.crc32)?;

    // (e) decompress.
    crate::crypto::gunzip(&decrypted)
}
