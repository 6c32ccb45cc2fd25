//! Payload decryption — `spec.md` §4.3(c): the recovered key is run through
//! MD5 to derive a 128-bit AES-GCM key, and the segment's encrypted payload
//! carries the nonce as its first 12 bytes.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes128Gcm, KeyInit, Nonce};
use md5::{Digest, Md5};

use crate::model::VerifyError;

const NONCE_LEN: usize = 12;

/// Derives the AES-128 key from a recovered secret by MD5 digest.
pub fn derive_key(secret: &[u8]) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update(secret);
    hasher.finalize().into()
}

/// Decrypts `ciphertext` (nonce-prefixed) with the MD5-derived key.
pub fn decrypt_payload(secret: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, VerifyError> {
    if ciphertext.len() < NONCE_LEN {
        return Err(VerifyError::Decrypt("ciphertext shorter than nonce".into()));
    }
    let (nonce_bytes, body) = ciphertext.split_at(NONCE_LEN);
    let key = derive_key(secret);
    let cipher = Aes128Gcm::new_from_slice(&key).map_err(|e| VerifyError::Decrypt(e.to_string()))?;
    let nonce = Nonce::from_slice(nonce_bytes);
    cipher
        .decrypt(nonce, body)
        .map_err(|e| VerifyError::Decrypt(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::RngCore;

    fn encrypt(secret: &[u8], plaintext: &[u8]) -> Vec<u8> {
        let key = derive_key(secret);
        let cipher = Aes128Gcm::new_from_slice(&key).unwrap();
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let mut out = nonce_bytes.to_vec();
        out.extend(cipher.encrypt(nonce, plaintext).unwrap());
        out
    }

    #[test]
    fn decrypt_roundtrip() {
        let secret = b"recovered-key-material".to_vec();
        let ciphertext = encrypt(&secret, b"segment payload bytes");
        let plaintext = decrypt_payload(&secret, &ciphertext).unwrap();
        assert_eq!(plaintext, b"segment payload bytes");
    }

    #[test]
    fn decrypt_rejects_wrong_key() {
        let ciphertext = encrypt(b"right-key", b"payload");
        let err = decrypt_payload(b"wrong-key", &ciphertext).unwrap_err();
        assert!(matches!(err, VerifyError::Decrypt(_)));
    }

    #[test]
    fn decrypt_rejects_short_ciphertext() {
        let err = decrypt_payload(b"key", &[0u8; 4]).unwrap_err();
        assert!(matches!(err, VerifyError::Decrypt(_)));
    }
}
