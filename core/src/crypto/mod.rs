//! Cryptographic and integrity transforms applied to a segment's raw bytes,
//! in the pipeline order `spec.md` §4.3 specifies: verify signature, recover
//! key, decrypt, check checksum, decompress.

pub mod checksum;
pub mod cipher;
pub mod compression;
pub mod keyshare;
pub mod signature;

pub use checksum::{crc32, verify_crc32};
pub use cipher::decrypt_payload;
pub use compression::gunzip;
pub use keyshare::{KeyRecovery, SharksKeyRecovery};
pub use signature::{canonical_message, canonical_message_for_meta, P256SignatureVerifier, SignatureVerifier};
