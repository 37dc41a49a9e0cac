//! Key hierarchy: master secret, data-encryption keys and the KeyManager.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::cipher::{self, KEY_LEN, NONCE_LEN, TAG_LEN};
use crate::encoding::{fixed_from_hex, to_hex};
use crate::error::{CryptoError, CryptoResult};

/// HKDF info string for the key-encryption key.
const KEK_INFO: &[u8] = b"lexvault/dek-wrap/v1";

/// Associated data bound into every wrapped DEK.
const WRAP_AAD: &[u8] = b"lexvault-dek";

const UNWRAP_FAILED: &str = "unwrap failed";
const MALFORMED_SECRET: &str = "malformed master secret";

// =============================================================================
// Master secret
// =============================================================================

/// Process-wide master secret, 32 bytes.
///
/// Loaded once at startup and injected into [`KeyManager`]. Never printed:
/// `Debug` is redacted and no error message includes it.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct MasterSecret {
    key: [u8; KEY_LEN],
}

impl std::fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterSecret")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl MasterSecret {
    pub fn from_bytes(key: [u8; KEY_LEN]) -> Self {
        Self { key }
    }

    /// Parse a configured secret.
    ///
    /// Surrounding whitespace is trimmed. A 64-character value is read as hex,
    /// anything else as standard base64. The decoded secret must be exactly
    /// 32 bytes.
    pub fn parse(encoded: &str) -> CryptoResult<Self> {
        let trimmed = encoded.trim();

        if trimmed.len() == KEY_LEN * 2 {
            if let Some(key) = fixed_from_hex::<KEY_LEN>(trimmed) {
                return Ok(Self { key });
            }
        }

        let decoded = Zeroizing::new(
            BASE64
                .decode(trimmed)
                .map_err(|_| CryptoError::KeyWrap(MALFORMED_SECRET))?,
        );
        if decoded.len() != KEY_LEN {
            return Err(CryptoError::KeyWrap(MALFORMED_SECRET));
        }
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&decoded);
        Ok(Self { key })
    }

    /// Read and parse the secret from an environment variable.
    pub fn from_env(var: &str) -> CryptoResult<Self> {
        let value = Zeroizing::new(
            std::env::var(var).map_err(|_| CryptoError::KeyWrap("master secret not configured"))?,
        );
        Self::parse(&value)
    }

    /// Generate a new random secret.
    pub fn generate() -> CryptoResult<Self> {
        let mut key = [0u8; KEY_LEN];
        cipher::fill_random(&mut key)?;
        Ok(Self { key })
    }

    /// Hex form for provisioning a new deployment.
    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(to_hex(&self.key))
    }
}

// =============================================================================
// Data-encryption key
// =============================================================================

/// A 256-bit data-encryption key.
///
/// Not `Clone`: a DEK lives in exactly one place and is scrubbed on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DataKey {
    key: [u8; KEY_LEN],
}

impl std::fmt::Debug for DataKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl DataKey {
    pub fn from_bytes(key: [u8; KEY_LEN]) -> Self {
        Self { key }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.key
    }
}

/// A DEK encrypted under the master secret.
///
/// Self-describing: it carries its own nonce, so unwrapping needs nothing
/// but the master secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedDek {
    /// Hex of the encrypted key followed by its 16-byte tag.
    pub encrypted: String,
    /// Hex of the 12-byte nonce.
    pub iv: String,
}

impl WrappedDek {
    pub fn to_json(&self) -> CryptoResult<String> {
        serde_json::to_string(self).map_err(|_| CryptoError::KeyWrap("wrapped key encoding failed"))
    }

    pub fn from_json(json: &str) -> CryptoResult<Self> {
        serde_json::from_str(json).map_err(|_| CryptoError::KeyWrap(UNWRAP_FAILED))
    }
}

// =============================================================================
// KeyManager
// =============================================================================

/// Issues DEKs and wraps/unwraps them under the master secret.
#[derive(Debug)]
pub struct KeyManager {
    master: MasterSecret,
}

impl KeyManager {
    pub fn new(master: MasterSecret) -> Self {
        Self { master }
    }

    /// Generate a fresh random DEK.
    ///
    /// Fails with [`CryptoError::Entropy`] only if the OS random source does.
    pub fn generate_dek(&self) -> CryptoResult<DataKey> {
        let mut key = [0u8; KEY_LEN];
        cipher::fill_random(&mut key)?;
        let dek = DataKey::from_bytes(key);
        key.zeroize();
        Ok(dek)
    }

    /// Encrypt `dek` under a key derived from the master secret.
    pub fn wrap_dek(&self, dek: &DataKey) -> CryptoResult<WrappedDek> {
        let kek = self.derive_kek()?;
        let iv = cipher::generate_nonce()?;
        let (mut sealed, tag) = cipher::seal_detached(&kek, &iv, WRAP_AAD, dek.as_bytes())
            .map_err(|e| match e {
                CryptoError::Entropy(_) => e,
                _ => CryptoError::KeyWrap("wrap failed"),
            })?;
        sealed.extend_from_slice(&tag);

        Ok(WrappedDek {
            encrypted: to_hex(&sealed),
            iv: to_hex(&iv),
        })
    }

    /// Recover a DEK. Every failure, whether malformed input or a rejected
    /// tag, reports the same [`CryptoError::KeyWrap`].
    pub fn unwrap_dek(&self, wrapped: &WrappedDek) -> CryptoResult<DataKey> {
        let iv = fixed_from_hex::<NONCE_LEN>(&wrapped.iv)
            .ok_or(CryptoError::KeyWrap(UNWRAP_FAILED))?;
        let sealed = fixed_from_hex::<{ KEY_LEN + TAG_LEN }>(&wrapped.encrypted)
            .map(Zeroizing::new)
            .ok_or(CryptoError::KeyWrap(UNWRAP_FAILED))?;

        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&sealed[KEY_LEN..]);

        let kek = self.derive_kek()?;
        let plain = cipher::open_detached(&kek, &iv, WRAP_AAD, &sealed[..KEY_LEN], &tag)
            .map_err(|_| CryptoError::KeyWrap(UNWRAP_FAILED))?;

        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&plain);
        let dek = DataKey::from_bytes(key);
        key.zeroize();
        Ok(dek)
    }

    /// Per-call key-encryption key, scrubbed when the caller drops it.
    fn derive_kek(&self) -> CryptoResult<Zeroizing<[u8; KEY_LEN]>> {
        cipher::derive_key(&self.master.key, KEK_INFO)
    }
}
