//! Length-prefixed frame I/O over an already-opened bidirectional stream —
//! `spec.md` §4.3 "Wire framing" / §6 "Stream protocol".
//!
//! Frames are a big-endian `u32` length prefix followed by that many bytes.
//! A length of `0` or greater than the configured `max_block_size` is a
//! framing error and the caller must close the stream.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::model::{TransferError, TransferErrorCode};

fn framing_error(message: impl Into<String>) -> TransferError {
    TransferError::new(TransferErrorCode::Other, message.into())
}

/// Writes one frame: a 4-byte big-endian length prefix, then `payload`.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> Result<(), TransferError> {
    let len: u32 = payload
        .len()
        .try_into()
        .map_err(|_| framing_error("frame too large to encode length prefix"))?;
    writer
        .write_all(&len.to_be_bytes())
        .await
        .map_err(|e| TransferError::new(TransferErrorCode::Network, e.to_string()))?;
    writer
        .write_all(payload)
        .await
        .map_err(|e| TransferError::new(TransferErrorCode::Network, e.to_string()))?;
    Ok(())
}

/// Reads one frame, rejecting a length of `0` or greater than
/// `max_block_size` — `spec.md` §4.3(3)/§8 "A length-prefixed frame with
/// length 0 or > max-block-size closes the stream and returns a framing
/// error."
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R, max_block_size: usize) -> Result<Vec<u8>, TransferError> {
    let mut len_bytes = [0u8; 4];
    reader
        .read_exact(&mut len_bytes)
        .await
        .map_err(|e| TransferError::new(TransferErrorCode::Network, e.to_string()))?;
    let len = u32::from_be_bytes(len_bytes) as usize;
    if len == 0 || len > max_block_size {
        return Err(framing_error(format!(
            "frame length {len} out of bounds (0, {max_block_size}]"
        )));
    }
    let mut buf = vec![0u8; len];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(|e| TransferError::new(TransferErrorCode::Network, e.to_string()))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn write_then_read_roundtrip() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"hello segment").await.unwrap();
        let mut cursor = Cursor::new(buf);
        let frame = read_frame(&mut cursor, 1024).await.unwrap();
        assert_eq!(frame, b"hello segment");
    }

    #[tokio::test]
    async fn read_rejects_zero_length() {
        let bytes = 0u32.to_be_bytes().to_vec();
        let mut cursor = Cursor::new(bytes);
        let err = read_frame(&mut cursor, 1024).await.unwrap_err();
        assert_eq!(err.code, TransferErrorCode::Other);
    }

    #[tokio::test]
    async fn read_rejects_oversized_length() {
        let bytes = 2000u32.to_be_bytes().to_vec();
        let mut cursor = Cursor::new(bytes);
        let err = read_frame(&mut cursor, 1024).await.unwrap_err();
        assert_eq!(err.code, TransferErrorCode::Other);
    }
}
