//! Blob storage for uploaded files.
//!
//! Uploads either keep a sanitized form of their original name (course
//! material, homework, screen recordings) or get an opaque generated name
//! (images such as avatars and course previews).
//!
//! Preserved names share one flat namespace: a later upload with the same
//! sanitized name replaces the earlier file.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

/// Extensions accepted when a unique name is generated
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("Invalid file extension: {0}")]
    InvalidExtension(String),

    #[error("Invalid file name")]
    InvalidName,

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// An opened stored file ready to be streamed
#[derive(Debug)]
pub struct BlobFile {
    pub name: String,
    pub file: tokio::fs::File,
    pub len: u64,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Persist `bytes` and return the name it was stored under. Without
    /// `generate_unique_name` an existing file of that name is overwritten.
    async fn store(
        &self,
        original_name: &str,
        bytes: Bytes,
        generate_unique_name: bool,
    ) -> Result<String, BlobError>;

    async fn retrieve(&self, name: &str) -> Result<BlobFile, BlobError>;
}

/// Work out the stored name for an upload without touching the disk
pub fn stored_name(original_name: &str, generate_unique_name: bool) -> Result<String, BlobError> {
    if generate_unique_name {
        let ext = Path::new(original_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        if !IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            return Err(BlobError::InvalidExtension(ext));
        }
        return Ok(format!("{}.{}", uuid::Uuid::new_v4(), ext));
    }

    let base = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim()
        .replace(' ', "_");

    if base.is_empty() || base == "." || base == ".." {
        return Err(BlobError::InvalidName);
    }
    Ok(base)
}

/// Whether a requested name is a plain file name inside the store
fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains("..")
        && !name.contains('\0')
}

/// Blob store backed by a local directory
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn store(
        &self,
        original_name: &str,
        bytes: Bytes,
        generate_unique_name: bool,
    ) -> Result<String, BlobError> {
        let name = stored_name(original_name, generate_unique_name)?;

        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.root.join(&name);
        let mut file = tokio::fs::File::create(&path).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;

        tracing::debug!(name = %name, size = bytes.len(), "Stored upload");
        Ok(name)
    }

    async fn retrieve(&self, name: &str) -> Result<BlobFile, BlobError> {
        if !is_safe_name(name) {
            return Err(BlobError::NotFound(name.to_string()));
        }

        let path = self.root.join(name);
        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BlobError::NotFound(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(BlobError::NotFound(name.to_string()));
        }

        Ok(BlobFile {
            name: name.to_string(),
            file,
            len: metadata.len(),
        })
    }
}
