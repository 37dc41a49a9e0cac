//! AES-256-GCM with detached tags, plus the random source.

use aes_gcm::{
    aead::{generic_array::GenericArray, AeadInPlace, KeyInit},
    Aes256Gcm, Nonce,
};
use hkdf::Hkdf;
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};

/// AES-256 key length in bytes.
pub const KEY_LEN: usize = 32;

/// GCM nonce length in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// GCM authentication tag length in bytes (128 bits).
pub const TAG_LEN: usize = 16;

/// Fill `buf` from the operating-system CSPRNG.
pub fn fill_random(buf: &mut [u8]) -> CryptoResult<()> {
    OsRng
        .try_fill_bytes(buf)
        .map_err(|e| CryptoError::Entropy(e.to_string()))
}

/// Generate a fresh random nonce.
pub fn generate_nonce() -> CryptoResult<[u8; NONCE_LEN]> {
    let mut nonce = [0u8; NONCE_LEN];
    fill_random(&mut nonce)?;
    Ok(nonce)
}

/// Encrypt `plaintext`, returning the ciphertext and its tag separately.
pub fn seal_detached(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    aad: &[u8],
    plaintext: &[u8],
) -> CryptoResult<(Vec<u8>, [u8; TAG_LEN])> {
    let cipher =
        Aes256Gcm::new_from_slice(key).map_err(|e| CryptoError::InvalidInput(e.to_string()))?;

    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(nonce), aad, &mut buffer)
        .map_err(|_| CryptoError::InvalidInput("plaintext too large for AES-GCM".into()))?;

    let mut tag_bytes = [0u8; TAG_LEN];
    tag_bytes.copy_from_slice(tag.as_slice());
    Ok((buffer, tag_bytes))
}

/// Decrypt and verify a detached-tag ciphertext.
///
/// The output buffer is scrubbed before an error is returned, so no partial
/// plaintext ever leaves this function.
pub fn open_detached(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    aad: &[u8],
    ciphertext: &[u8],
    tag: &[u8; TAG_LEN],
) -> CryptoResult<Zeroizing<Vec<u8>>> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::Integrity)?;

    let mut buffer = Zeroizing::new(ciphertext.to_vec());
    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(nonce),
            aad,
            buffer.as_mut_slice(),
            GenericArray::from_slice(tag),
        )
        .map_err(|_| CryptoError::Integrity)?;
    Ok(buffer)
}

/// Derive a 256-bit key with HKDF-SHA256.
pub fn derive_key(ikm: &[u8], info: &[u8]) -> CryptoResult<Zeroizing<[u8; KEY_LEN]>> {
    let hkdf = Hkdf::<Sha256>::new(None, ikm);
    let mut okm = Zeroizing::new([0u8; KEY_LEN]);
    hkdf.expand(info, okm.as_mut_slice())
        .map_err(|_| CryptoError::KeyWrap("key derivation failed"))?;
    Ok(okm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_nonce_random() {
        let a = generate_nonce().unwrap();
        let b = generate_nonce().unwrap();
        assert_eq!(a.len(), NONCE_LEN);
        assert_ne!(a, b);
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let key = [42u8; KEY_LEN];
        let nonce = [1u8; NONCE_LEN];
        let (ct, tag) = seal_detached(&key, &nonce, b"", b"Hello, World!").unwrap();

        // Tag is detached, so ciphertext length equals plaintext length
        assert_eq!(ct.len(), 13);
        let pt = open_detached(&key, &nonce, b"", &ct, &tag).unwrap();
        assert_eq!(pt.as_slice(), b"Hello, World!");
    }

    #[test]
    fn test_open_wrong_aad() {
        let key = [42u8; KEY_LEN];
        let nonce = [1u8; NONCE_LEN];
        let (ct, tag) = seal_detached(&key, &nonce, b"a", b"secret").unwrap();
        assert_eq!(
            open_detached(&key, &nonce, b"b", &ct, &tag).unwrap_err(),
            CryptoError::Integrity
        );
    }

    #[test]
    fn test_open_wrong_key() {
        let nonce = [1u8; NONCE_LEN];
        let (ct, tag) = seal_detached(&[1u8; KEY_LEN], &nonce, b"", b"secret").unwrap();
        assert_eq!(
            open_detached(&[2u8; KEY_LEN], &nonce, b"", &ct, &tag).unwrap_err(),
            CryptoError::Integrity
        );
    }

    #[test]
    fn test_empty_plaintext() {
        let key = [9u8; KEY_LEN];
        let nonce = [3u8; NONCE_LEN];
        let (ct, tag) = seal_detached(&key, &nonce, b"", b"").unwrap();
        assert!(ct.is_empty());
        assert!(open_detached(&key, &nonce, b"", &ct, &tag).unwrap().is_empty());
    }

    #[test]
    fn test_derive_key_deterministic_and_info_bound() {
        let a = derive_key(b"master", b"info-a").unwrap();
        let b = derive_key(b"master", b"info-a").unwrap();
        let c = derive_key(b"master", b"info-b").unwrap();
        assert_eq!(*a, *b);
        assert_ne!(*a, *c);
    }
}
