//! Erasure coding — `spec.md` §4.4/§8: the file is split into
//! `required-data-shards` data shards plus parity shards; any
//! `required-data-shards`-sized subset (of either kind) reconstructs the
//! original bytes. Grounded on the reed-solomon-erasure usage pattern in
//! the pack's `ioustamora-datamesh` actor file-storage example.

use reed_solomon_erasure::galois_8::ReedSolomon;

use crate::model::ErasureError;

/// Splits `data` into `data_shards` equal-size chunks (zero-padded) and
/// computes `parity_shards` redundant chunks. `spec.md` §8:
/// `merge(split(file, data-shards, parity-shards)) == file`.
pub fn split(data: &[u8], data_shards: usize, parity_shards: usize) -> Result<Vec<Vec<u8>>, ErasureError> {
    if data_shards == 0 {
        return Err(ErasureError::Codec("data_shards must be > 0".into()));
    }
    let chunk_size = (data.len() + data_shards - 1) / data_shards.max(1);
    let chunk_size = chunk_size.max(1);

    let mut shards: Vec<Vec<u8>> = Vec::with_capacity(data_shards + parity_shards);
    for i in 0..data_shards {
        let start = i * chunk_size;
        let end = (start + chunk_size).min(data.len());
        let mut chunk = if start < data.len() { data[start..end].to_vec() } else { Vec::new() };
        chunk.resize(chunk_size, 0);
        shards.push(chunk);
    }
    for _ in 0..parity_shards {
        shards.push(vec![0u8; chunk_size]);
    }

    let codec = ReedSolomon::new(data_shards, parity_shards)
        .map_err(|e| ErasureError::Codec(e.to_string()))?;
    codec.encode(&mut shards).map_err(|e| ErasureError::Codec(e.to_string()))?;
    Ok(shards)
}

/// Reconstructs the original bytes from a set of shards, some of which may
/// be missing (`None`). `present.len()` must equal `data_shards +
/// parity_shards`; at least `data_shards` entries must be `Some`.
/// `original_len` trims the zero-padding `split` added.
pub fn reconstruct(
    mut present: Vec<Option<Vec<u8>>>,
    data_shards: usize,
    parity_shards: usize,
    original_len: usize,
) -> Result<Vec<u8>, ErasureError> {
    let have = present.iter().filter(|s| s.is_some()).count();
    if have < data_shards {
        return Err(ErasureError::InsufficientShards { have, need: data_shards });
    }
    if present.len() != data_shards + parity_shards {
        return Err(ErasureError::Codec(format!(
            "expected {} shards, got {}",
            data_shards + parity_shards,
            present.len()
        )));
    }

    let codec = ReedSolomon::new(data_shards, parity_shards)
        .map_err(|e| ErasureError::Codec(e.to_string()))?;
    codec
        .reconstruct_data(&mut present)
        .map_err(|e| ErasureError::Codec(e.to_string()))?;

    let mut out = Vec::with_capacity(original_len);
    for shard in present.into_iter().take(data_shards) {
        out.extend(shard.expect("reconstruct_data fills all data shards"));
    }
    out.truncate(original_len);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_reconstruct_roundtrip_all_shards() {
        let data = b"the quick brown fox jumps over the lazy dog".to_vec();
        let shards = split(&data, 3, 2).unwrap();
        let present: Vec<Option<Vec<u8>>> = shards.into_iter().map(Some).collect();
        let reconstructed = reconstruct(present, 3, 2, data.len()).unwrap();
        assert_eq!(reconstructed, data);
    }

    #[test]
    fn reconstruct_from_parity_when_data_shard_missing() {
        let data = b"0123456789abcdef0123456789abcdef".to_vec();
        let shards = split(&data, 3, 2).unwrap();
        let mut present: Vec<Option<Vec<u8>>> = shards.into_iter().map(Some).collect();
        present[1] = None;
        let reconstructed = reconstruct(present, 3, 2, data.len()).unwrap();
        assert_eq!(reconstructed, data);
    }

    #[test]
    fn reconstruct_fails_with_too_few_shards() {
        let data = b"hello world".to_vec();
        let shards = split(&data, 3, 2).unwrap();
        let mut present: Vec<Option<Vec<u8>>> = shards.into_iter().map(Some).collect();
        present[0] = None;
        present[1] = None;
        let err = reconstruct(present, 3, 2, data.len()).unwrap_err();
        assert!(matches!(err, ErasureError::InsufficientShards { .. }));
    }
}
