//! Document encryption with a per-document DEK.

use zeroize::Zeroizing;

use crate::cipher::{self, NONCE_LEN, TAG_LEN};
use crate::encoding::{fixed_from_hex, to_hex};
use crate::error::{CryptoError, CryptoResult};
use crate::keys::DataKey;

/// Ciphertext with its nonce and tag kept as separate fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedPayload {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_LEN],
    pub tag: [u8; TAG_LEN],
}

impl EncryptedPayload {
    /// Nonce as persisted (lowercase hex).
    pub fn nonce_hex(&self) -> String {
        to_hex(&self.nonce)
    }

    /// Authentication tag as persisted (lowercase hex).
    pub fn tag_hex(&self) -> String {
        to_hex(&self.tag)
    }
}

/// AES-256-GCM over whole documents.
///
/// Every call draws a fresh 96-bit nonce. Each DEK encrypts exactly one
/// document, so a nonce is never reused under the same key.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvelopeCipher;

impl EnvelopeCipher {
    pub fn new() -> Self {
        Self
    }

    pub fn encrypt(&self, plaintext: &[u8], dek: &DataKey) -> CryptoResult<EncryptedPayload> {
        let nonce = cipher::generate_nonce()?;
        let (ciphertext, tag) = cipher::seal_detached(dek.as_bytes(), &nonce, &[], plaintext)?;
        Ok(EncryptedPayload {
            ciphertext,
            nonce,
            tag,
        })
    }

    /// Decrypt and verify. Any tampering or a wrong key is a hard
    /// [`CryptoError::Integrity`] failure with no output.
    pub fn decrypt(
        &self,
        ciphertext: &[u8],
        nonce: &[u8; NONCE_LEN],
        tag: &[u8; TAG_LEN],
        dek: &DataKey,
    ) -> CryptoResult<Zeroizing<Vec<u8>>> {
        cipher::open_detached(dek.as_bytes(), nonce, &[], ciphertext, tag)
    }

    /// Decrypt using the persisted hex nonce and tag.
    ///
    /// Malformed stored values are treated as tampering.
    pub fn decrypt_hex(
        &self,
        ciphertext: &[u8],
        nonce_hex: &str,
        tag_hex: &str,
        dek: &DataKey,
    ) -> CryptoResult<Zeroizing<Vec<u8>>> {
        let nonce = fixed_from_hex::<NONCE_LEN>(nonce_hex).ok_or(CryptoError::Integrity)?;
        let tag = fixed_from_hex::<TAG_LEN>(tag_hex).ok_or(CryptoError::Integrity)?;
        self.decrypt(ciphertext, &nonce, &tag, dek)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{KeyManager, MasterSecret};

    fn dek() -> DataKey {
        KeyManager::new(MasterSecret::from_bytes([1u8; 32]))
            .generate_dek()
            .unwrap()
    }

    #[test]
    fn test_encrypt_separates_tag() {
        let payload = EnvelopeCipher::new().encrypt(b"0123456789", &dek()).unwrap();
        assert_eq!(payload.ciphertext.len(), 10);
        assert_eq!(payload.nonce_hex().len(), 24);
        assert_eq!(payload.tag_hex().len(), 32);
    }

    #[test]
    fn test_fresh_nonce_per_call() {
        let key = dek();
        let cipher = EnvelopeCipher::new();
        let a = cipher.encrypt(b"same", &key).unwrap();
        let b = cipher.encrypt(b"same", &key).unwrap();
        assert_ne!(a.nonce, b.nonce);
    }

    #[test]
    fn test_decrypt_hex_roundtrip() {
        let key = dek();
        let cipher = EnvelopeCipher::new();
        let payload = cipher.encrypt(b"exhibit A", &key).unwrap();
        let plain = cipher
            .decrypt_hex(&payload.ciphertext, &payload.nonce_hex(), &payload.tag_hex(), &key)
            .unwrap();
        assert_eq!(plain.as_slice(), b"exhibit A");
    }

    #[test]
    fn test_decrypt_hex_malformed_is_integrity() {
        let key = dek();
        let cipher = EnvelopeCipher::new();
        let payload = cipher.encrypt(b"exhibit A", &key).unwrap();
        assert_eq!(
            cipher
                .decrypt_hex(&payload.ciphertext, "abcd", &payload.tag_hex(), &key)
                .unwrap_err(),
            CryptoError::Integrity
        );
        assert_eq!(
            cipher
                .decrypt_hex(&payload.ciphertext, &payload.nonce_hex(), "zz", &key)
                .unwrap_err(),
            CryptoError::Integrity
        );
    }
}
