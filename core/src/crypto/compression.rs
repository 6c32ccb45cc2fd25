//! Gzip decompression — `spec.md` §4.3(e): the final transform before a
//! verified segment's bytes are written to disk.

use std::io::Read;

use flate2::read::GzDecoder;

use crate::model::VerifyError;

pub fn gunzip(data: &[u8]) -> Result<Vec<u8>, VerifyError> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| VerifyError::Decompress(e.to_string()))?;
    Ok(out)
}
