//! # lexvault-crypto
//!
//! Two-tier envelope encryption for documents at rest.
//!
//! A long-lived master secret never touches file content. Each document gets
//! a fresh 256-bit data-encryption key (DEK); the DEK encrypts the document
//! and is itself stored only in wrapped form.
//!
//! ## Cryptographic Primitives
//!
//! - **Symmetric cipher**: AES-256-GCM, 96-bit random nonce, 128-bit tag
//! - **Key-encryption key**: HKDF-SHA256 over the master secret, derived per
//!   call and zeroized afterwards
//! - **Random generation**: operating-system CSPRNG
//!
//! ## Wire Formats
//!
//! - Document nonce and tag: lowercase hex, stored as separate fields
//! - Wrapped DEK: `{"encrypted": hex(ciphertext || tag), "iv": hex(nonce)}`
//!
//! ## Example
//!
//! ```rust
//! use lexvault_crypto::{EnvelopeCipher, KeyManager, MasterSecret, WrappedDek};
//!
//! let keys = KeyManager::new(MasterSecret::from_bytes([7u8; 32]));
//! let cipher = EnvelopeCipher::new();
//!
//! let dek = keys.generate_dek().unwrap();
//! let stored = keys.wrap_dek(&dek).unwrap().to_json().unwrap();
//! let sealed = cipher.encrypt(b"privileged memo", &dek).unwrap();
//! drop(dek);
//!
//! let dek = keys.unwrap_dek(&WrappedDek::from_json(&stored).unwrap()).unwrap();
//! let opened = cipher
//!     .decrypt(&sealed.ciphertext, &sealed.nonce, &sealed.tag, &dek)
//!     .unwrap();
//! assert_eq!(opened.as_slice(), b"privileged memo");
//! ```

pub mod cipher;
pub mod encoding;
pub mod envelope;
pub mod error;
pub mod keys;

pub use cipher::{KEY_LEN, NONCE_LEN, TAG_LEN};
pub use envelope::{EncryptedPayload, EnvelopeCipher};
pub use error::{CryptoError, CryptoResult};
pub use keys::{DataKey, KeyManager, MasterSecret, WrappedDek};
pub use zeroize::Zeroizing;
