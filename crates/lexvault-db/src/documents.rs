//! Document repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use lexvault_core::{
    new_v7, Document, DocumentRepository, DocumentStatus, Error, NewDocument, Result,
};

/// PostgreSQL implementation of DocumentRepository.
#[derive(Clone)]
pub struct PgDocumentRepository {
    pool: Pool<Postgres>,
}

impl PgDocumentRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_document_row(row: sqlx::postgres::PgRow) -> Result<Document> {
        let status: String = row.get("status");
        Ok(Document {
            id: row.get("id"),
            case_id: row.get("case_id"),
            file_name: row.get("file_name"),
            storage_path: row.get("storage_path"),
            status: status.parse()?,
            uploaded_by: row.get("uploaded_by"),
            processed_at: row.get("processed_at"),
            created_at: row.get("created_at"),
        })
    }
}

#[async_trait]
impl DocumentRepository for PgDocumentRepository {
    async fn insert(&self, doc: NewDocument) -> Result<Document> {
        let row = sqlx::query(
            "INSERT INTO document (id, case_id, file_name, storage_path, status, uploaded_by, created_at)
             VALUES ($1, $2, $3, $4, 'uploaded', $5, $6)
             RETURNING id, case_id, file_name, storage_path, status, uploaded_by, processed_at, created_at",
        )
        .bind(new_v7())
        .bind(doc.case_id)
        .bind(&doc.file_name)
        .bind(&doc.storage_path)
        .bind(doc.uploaded_by)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Self::parse_document_row(row)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Document>> {
        let row = sqlx::query(
            "SELECT id, case_id, file_name, storage_path, status, uploaded_by, processed_at, created_at
             FROM document WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(Self::parse_document_row).transpose()
    }

    async fn transition(
        &self,
        id: Uuid,
        expected: &[DocumentStatus],
        next: DocumentStatus,
    ) -> Result<bool> {
        let expected: Vec<&str> = expected.iter().map(|s| s.as_str()).collect();
        let processed_at = (next == DocumentStatus::Encrypted).then(Utc::now);

        let result = sqlx::query(
            "UPDATE document
             SET status = $2, processed_at = COALESCE($3, processed_at)
             WHERE id = $1 AND status = ANY($4)",
        )
        .bind(id)
        .bind(next.as_str())
        .bind(processed_at)
        .bind(&expected)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected() > 0)
    }
}
