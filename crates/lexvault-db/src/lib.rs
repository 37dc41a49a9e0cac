//! # lexvault-db
//!
//! Persistence layer for the LexVault document pipeline.
//!
//! This crate provides:
//! - Connection pool management
//! - PostgreSQL repositories for documents, the processing queue, wrapped
//!   keys, encryption metadata and document chunks
//! - pgvector cosine similarity search
//! - Object storage with separate upload and ciphertext buckets
//! - In-memory implementations of every repository for tests and tooling
//!
//! ## Example
//!
//! ```rust,ignore
//! use lexvault_db::{Database, PoolConfig};
//!
//! let db = Database::connect("postgres://localhost/lexvault", PoolConfig::default()).await?;
//! db.migrate().await?;
//! let repos = db.repositories();
//! ```

pub mod chunks;
pub mod documents;
pub mod encryption;
pub mod memory;
pub mod pool;
pub mod storage;
pub mod tasks;

use std::sync::Arc;

pub use chunks::{PgChunkRepository, PgSimilaritySearch};
pub use documents::PgDocumentRepository;
pub use encryption::{PgEncryptionMetadataRepository, PgKeyRecordRepository};
pub use memory::MemoryStore;
pub use pool::{create_pool, log_pool_metrics, PoolConfig};
pub use storage::{Bucket, DocumentStore, FilesystemBackend, MemoryBackend, StorageBackend};
pub use tasks::PgTaskRepository;

use lexvault_core::{Error, Repositories, Result};

/// PostgreSQL-backed repositories sharing one pool.
#[derive(Clone)]
pub struct Database {
    pub pool: sqlx::Pool<sqlx::Postgres>,
    pub documents: PgDocumentRepository,
    pub tasks: PgTaskRepository,
    pub key_records: PgKeyRecordRepository,
    pub encryption_metadata: PgEncryptionMetadataRepository,
    pub chunks: PgChunkRepository,
    pub search: PgSimilaritySearch,
}

impl Database {
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            documents: PgDocumentRepository::new(pool.clone()),
            tasks: PgTaskRepository::new(pool.clone()),
            key_records: PgKeyRecordRepository::new(pool.clone()),
            encryption_metadata: PgEncryptionMetadataRepository::new(pool.clone()),
            chunks: PgChunkRepository::new(pool.clone()),
            search: PgSimilaritySearch::new(pool.clone()),
            pool,
        }
    }

    pub async fn connect(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Trait-object handles for the pipeline.
    pub fn repositories(&self) -> Repositories {
        Repositories {
            documents: Arc::new(self.documents.clone()),
            tasks: Arc::new(self.tasks.clone()),
            key_records: Arc::new(self.key_records.clone()),
            encryption_metadata: Arc::new(self.encryption_metadata.clone()),
            chunks: Arc::new(self.chunks.clone()),
        }
    }

    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
