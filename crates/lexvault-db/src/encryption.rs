//! Wrapped-key and encryption-metadata repositories.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use lexvault_core::{
    new_v7, DocumentEncryptionMetadata, EncryptionKeyRecord, EncryptionMetadataRepository, Error,
    KeyRecordRepository, Result,
};

/// PostgreSQL implementation of KeyRecordRepository.
///
/// Rows are insert-only; the schema rejects updates.
#[derive(Clone)]
pub struct PgKeyRecordRepository {
    pool: Pool<Postgres>,
}

impl PgKeyRecordRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KeyRecordRepository for PgKeyRecordRepository {
    async fn insert(
        &self,
        wrapped_dek: &str,
        created_by: Option<Uuid>,
    ) -> Result<EncryptionKeyRecord> {
        let record = EncryptionKeyRecord {
            id: new_v7(),
            wrapped_dek: wrapped_dek.to_string(),
            created_by,
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO encryption_key (id, wrapped_dek, created_by, created_at)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(record.id)
        .bind(&record.wrapped_dek)
        .bind(record.created_by)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(record)
    }

    async fn get(&self, id: Uuid) -> Result<Option<EncryptionKeyRecord>> {
        let row = sqlx::query(
            "SELECT id, wrapped_dek, created_by, created_at FROM encryption_key WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(|row| EncryptionKeyRecord {
            id: row.get("id"),
            wrapped_dek: row.get("wrapped_dek"),
            created_by: row.get("created_by"),
            created_at: row.get("created_at"),
        }))
    }
}

/// PostgreSQL implementation of EncryptionMetadataRepository.
#[derive(Clone)]
pub struct PgEncryptionMetadataRepository {
    pool: Pool<Postgres>,
}

impl PgEncryptionMetadataRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EncryptionMetadataRepository for PgEncryptionMetadataRepository {
    async fn upsert(&self, meta: &DocumentEncryptionMetadata) -> Result<()> {
        sqlx::query(
            "INSERT INTO document_encryption_metadata
                 (document_id, key_record_id, storage_path, nonce, auth_tag, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (document_id) DO UPDATE SET
                 key_record_id = EXCLUDED.key_record_id,
                 storage_path = EXCLUDED.storage_path,
                 nonce = EXCLUDED.nonce,
                 auth_tag = EXCLUDED.auth_tag,
                 created_at = EXCLUDED.created_at",
        )
        .bind(meta.document_id)
        .bind(meta.key_record_id)
        .bind(&meta.storage_path)
        .bind(&meta.nonce)
        .bind(&meta.auth_tag)
        .bind(meta.created_at)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    }

    async fn get_for_document(
        &self,
        document_id: Uuid,
    ) -> Result<Option<DocumentEncryptionMetadata>> {
        let row = sqlx::query(
            "SELECT document_id, key_record_id, storage_path, nonce, auth_tag, created_at
             FROM document_encryption_metadata WHERE document_id = $1",
        )
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(|row| DocumentEncryptionMetadata {
            document_id: row.get("document_id"),
            key_record_id: row.get("key_record_id"),
            storage_path: row.get("storage_path"),
            nonce: row.get("nonce"),
            auth_tag: row.get("auth_tag"),
            created_at: row.get("created_at"),
        }))
    }
}
