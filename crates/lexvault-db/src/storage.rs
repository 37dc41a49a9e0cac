//! Object storage for plaintext uploads and document ciphertext.
//!
//! One backend holds two logical buckets. Object keys are always
//! `{bucket-prefix}/{locator}`, so the upload and ciphertext namespaces can
//! never overlap, and ciphertext locators embed a fresh UUIDv7 so an existing
//! object is never overwritten.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use lexvault_core::defaults::{ENCRYPTED_EXTENSION, ENCRYPTED_PREFIX, UPLOADS_PREFIX};
use lexvault_core::{new_v7, Error, Result};

/// Byte-oriented object store.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Store `data` at `path`.
    async fn upload(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Read the object at `path`.
    async fn download(&self, path: &str) -> Result<Vec<u8>>;

    /// Check whether an object exists at `path`.
    async fn exists(&self, path: &str) -> Result<bool>;
}

fn storage_error(op: &str, path: &str, err: impl std::fmt::Display) -> Error {
    Error::Storage(format!("{} {}: {}", op, path, err))
}

// =============================================================================
// Filesystem backend
// =============================================================================

/// Stores objects as files under a base directory.
pub struct FilesystemBackend {
    base_path: PathBuf,
}

impl FilesystemBackend {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn full_path(&self, path: &str) -> PathBuf {
        self.base_path.join(path)
    }

    /// Write, read back and delete a probe file so permission problems
    /// surface at startup rather than on the first task.
    pub async fn validate(&self) -> Result<()> {
        let probe = ".health-check/probe.bin";
        self.upload(probe, b"ok").await?;
        let read = self.download(probe).await?;
        if read != b"ok" {
            return Err(storage_error("validate", probe, "content mismatch"));
        }
        fs::remove_file(self.full_path(probe))
            .await
            .map_err(|e| storage_error("validate", probe, e))?;
        Ok(())
    }
}

/// Write `data` to `temp_path`, flush it, and move it over `final_path`.
/// Errors carry the name of the step that failed.
async fn write_then_rename(
    temp_path: &std::path::Path,
    final_path: &std::path::Path,
    data: &[u8],
) -> std::result::Result<(), (&'static str, std::io::Error)> {
    let mut file = fs::File::create(temp_path)
        .await
        .map_err(|e| ("create", e))?;
    file.write_all(data).await.map_err(|e| ("write", e))?;
    file.sync_all().await.map_err(|e| ("sync", e))?;
    drop(file);
    fs::rename(temp_path, final_path)
        .await
        .map_err(|e| ("rename", e))
}

#[async_trait]
impl StorageBackend for FilesystemBackend {
    async fn upload(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = self.full_path(path);
        debug!(storage_path = %path, byte_len = data.len(), "storage: upload");

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| storage_error("create_dir", path, e))?;
        }

        // Atomic write: temp file + rename
        let temp_path = full_path.with_extension("tmp");
        if let Err((op, e)) = write_then_rename(&temp_path, &full_path, data).await {
            warn!(storage_path = %path, op, error = %e, "storage: upload failed");
            if let Err(cleanup) = fs::remove_file(&temp_path).await {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    warn!(storage_path = %path, error = %cleanup, "storage: temp cleanup failed");
                }
            }
            return Err(storage_error(op, path, e));
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&full_path, std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(|e| storage_error("chmod", path, e))?;
        }

        Ok(())
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>> {
        fs::read(self.full_path(path))
            .await
            .map_err(|e| storage_error("read", path, e))
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        fs::try_exists(self.full_path(path))
            .await
            .map_err(|e| storage_error("stat", path, e))
    }
}

// =============================================================================
// In-memory backend
// =============================================================================

/// In-memory object store with switchable failure injection.
#[derive(Default)]
pub struct MemoryBackend {
    objects: RwLock<HashMap<String, Vec<u8>>>,
    fail_uploads: AtomicBool,
    fail_downloads: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent upload fail with a storage error.
    pub fn set_fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent download fail with a storage error.
    pub fn set_fail_downloads(&self, fail: bool) {
        self.fail_downloads.store(fail, Ordering::SeqCst);
    }

    /// Stored object keys, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn upload(&self, path: &str, data: &[u8]) -> Result<()> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(storage_error("write", path, "simulated I/O failure"));
        }
        self.objects
            .write()
            .await
            .insert(path.to_string(), data.to_vec());
        Ok(())
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>> {
        if self.fail_downloads.load(Ordering::SeqCst) {
            return Err(storage_error("read", path, "simulated I/O failure"));
        }
        self.objects
            .read()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| storage_error("read", path, "object not found"))
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.objects.read().await.contains_key(path))
    }
}

// =============================================================================
// Buckets
// =============================================================================

/// Logical bucket within the object store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    /// Plaintext uploads.
    Uploads,
    /// Document ciphertext.
    Encrypted,
}

impl Bucket {
    pub fn prefix(&self) -> &'static str {
        match self {
            Bucket::Uploads => UPLOADS_PREFIX,
            Bucket::Encrypted => ENCRYPTED_PREFIX,
        }
    }

    /// Full object key for a bucket-relative locator.
    ///
    /// Rejects empty, absolute and `..`-containing locators so no locator can
    /// escape into the other bucket.
    pub fn object_key(&self, locator: &str) -> Result<String> {
        let invalid = locator.is_empty()
            || locator.starts_with('/')
            || locator.contains('\\')
            || locator.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..");
        if invalid {
            return Err(Error::InvalidInput(format!(
                "invalid storage locator: {:?}",
                locator
            )));
        }
        Ok(format!("{}/{}", self.prefix(), locator))
    }
}

/// Keep only characters that are safe in a single path segment.
fn sanitize_segment(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches('.');
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Bucket-aware access to the object store.
#[derive(Clone)]
pub struct DocumentStore {
    backend: Arc<dyn StorageBackend>,
}

impl DocumentStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Store a plaintext upload, returning its uploads-bucket locator.
    pub async fn put_upload(&self, case_id: Uuid, file_name: &str, data: &[u8]) -> Result<String> {
        let locator = format!("{}/{}/{}", case_id, new_v7(), sanitize_segment(file_name));
        self.backend
            .upload(&Bucket::Uploads.object_key(&locator)?, data)
            .await?;
        Ok(locator)
    }

    pub async fn read_upload(&self, locator: &str) -> Result<Vec<u8>> {
        self.backend
            .download(&Bucket::Uploads.object_key(locator)?)
            .await
    }

    /// Store ciphertext at a fresh locator and return it.
    pub async fn write_encrypted(
        &self,
        case_id: Uuid,
        document_id: Uuid,
        ciphertext: &[u8],
    ) -> Result<String> {
        let locator = format!(
            "{}/{}/{}.{}",
            case_id,
            document_id,
            new_v7(),
            ENCRYPTED_EXTENSION
        );
        let key = Bucket::Encrypted.object_key(&locator)?;
        if self.backend.exists(&key).await? {
            return Err(storage_error("write", &key, "locator already in use"));
        }
        self.backend.upload(&key, ciphertext).await?;
        Ok(locator)
    }

    pub async fn read_encrypted(&self, locator: &str) -> Result<Vec<u8>> {
        self.backend
            .download(&Bucket::Encrypted.object_key(locator)?)
            .await
    }
}
