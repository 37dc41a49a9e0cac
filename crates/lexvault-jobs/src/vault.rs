//! Read access to encrypted documents.

use std::sync::Arc;

use tracing::{debug, instrument};
use uuid::Uuid;

use lexvault_core::{DocumentStatus, Error, Repositories, Result};
use lexvault_crypto::{EnvelopeCipher, KeyManager, WrappedDek, Zeroizing};
use lexvault_db::DocumentStore;

use crate::crypto_error;

/// Decrypts stored documents for authorized callers.
pub struct DocumentVault {
    repos: Repositories,
    store: DocumentStore,
    keys: Arc<KeyManager>,
    cipher: EnvelopeCipher,
}

impl DocumentVault {
    pub fn new(repos: Repositories, store: DocumentStore, keys: Arc<KeyManager>) -> Self {
        Self {
            repos,
            store,
            keys,
            cipher: EnvelopeCipher::new(),
        }
    }

    /// Return the plaintext of an `encrypted` document.
    ///
    /// A failed tag check is reported as [`Error::Integrity`] and no bytes
    /// are returned.
    #[instrument(
        skip(self),
        fields(subsystem = "jobs", component = "vault", op = "read_decrypted")
    )]
    pub async fn read_decrypted(&self, document_id: Uuid) -> Result<Zeroizing<Vec<u8>>> {
        let document = self
            .repos
            .documents
            .get(document_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("document {}", document_id)))?;
        if document.status != DocumentStatus::Encrypted {
            return Err(Error::NotFound(format!(
                "encrypted content for document {} (status {})",
                document_id, document.status
            )));
        }

        let meta = self
            .repos
            .encryption_metadata
            .get_for_document(document_id)
            .await?
            .ok_or_else(|| {
                Error::NotFound(format!("encryption metadata for document {}", document_id))
            })?;
        let record = self
            .repos
            .key_records
            .get(meta.key_record_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("key record {}", meta.key_record_id)))?;

        let wrapped = WrappedDek::from_json(&record.wrapped_dek).map_err(crypto_error)?;
        let dek = self.keys.unwrap_dek(&wrapped).map_err(crypto_error)?;
        let ciphertext = self.store.read_encrypted(&meta.storage_path).await?;

        let plaintext = self
            .cipher
            .decrypt_hex(&ciphertext, &meta.nonce, &meta.auth_tag, &dek)
            .map_err(crypto_error)?;
        debug!(byte_len = plaintext.len(), "Document decrypted");
        Ok(plaintext)
    }
}
