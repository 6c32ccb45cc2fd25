//! CRC32 integrity check — `spec.md` §4.3(d): verify the decrypted payload
//! against the slice table's recorded checksum before decompression.

use crc32fast::Hasher;

use crate::model::VerifyError;

pub fn crc32(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

pub fn verify_crc32(data: &[u8], expected: u32) -> Result<(), VerifyError> {
    let actual = crc32(data);
    if actual != expected {
        return Err(VerifyError::ChecksumMismatch { expected, actual });
    }
    Ok(())
}
