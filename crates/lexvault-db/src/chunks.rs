//! Document chunk storage and pgvector similarity search.

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, instrument};
use uuid::Uuid;

use lexvault_core::{
    ChunkRepository, DocumentChunk, Error, Result, SimilarityMatch, SimilaritySearch,
};

/// PostgreSQL implementation of ChunkRepository.
#[derive(Clone)]
pub struct PgChunkRepository {
    pool: Pool<Postgres>,
}

impl PgChunkRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChunkRepository for PgChunkRepository {
    async fn replace_for_document(
        &self,
        document_id: Uuid,
        chunks: &[DocumentChunk],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        sqlx::query("DELETE FROM document_chunk WHERE document_id = $1")
            .bind(document_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        for chunk in chunks {
            sqlx::query(
                "INSERT INTO document_chunk (document_id, case_id, chunk_index, content, embedding)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(document_id)
            .bind(chunk.case_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.content)
            .bind(&chunk.embedding)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }

        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }

    async fn count_for_document(&self, document_id: Uuid) -> Result<i64> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM document_chunk WHERE document_id = $1")
                .bind(document_id)
                .fetch_one(&self.pool)
                .await
                .map_err(Error::Database)?;
        Ok(count.0)
    }
}

/// Cosine similarity search over `document_chunk` using pgvector.
#[derive(Clone)]
pub struct PgSimilaritySearch {
    pool: Pool<Postgres>,
}

impl PgSimilaritySearch {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SimilaritySearch for PgSimilaritySearch {
    #[instrument(
        skip(self, query),
        fields(subsystem = "db", component = "similarity_search", op = "search")
    )]
    async fn search(
        &self,
        case_id: Uuid,
        query: &Vector,
        threshold: f32,
        top_k: usize,
    ) -> Result<Vec<SimilarityMatch>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        // <=> is cosine distance; similarity = 1 - distance.
        let rows = sqlx::query(
            "SELECT document_id, chunk_index, content,
                    (1 - (embedding <=> $2))::real AS similarity
             FROM document_chunk
             WHERE case_id = $1
               AND 1 - (embedding <=> $2) >= $3::float8
             ORDER BY embedding <=> $2 ASC, document_id ASC, chunk_index ASC
             LIMIT $4",
        )
        .bind(case_id)
        .bind(query)
        .bind(threshold as f64)
        .bind(top_k as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let matches: Vec<SimilarityMatch> = rows
            .into_iter()
            .map(|row| SimilarityMatch {
                document_id: row.get("document_id"),
                chunk_index: row.get("chunk_index"),
                content: row.get("content"),
                similarity: row.get("similarity"),
            })
            .collect();

        debug!(result_count = matches.len(), "Similarity search complete");
        Ok(matches)
    }
}
