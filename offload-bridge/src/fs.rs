//! Local File Storage Abstraction
//!
//! The handlers read and write media bytes through this trait so the engine
//! never touches the filesystem directly and tests can substitute an
//! in-memory store.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// File metadata information
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub size: u64,
    pub modified_at: Option<i64>,
    pub is_directory: bool,
}

/// Local file access trait
///
/// # Example
///
/// ```ignore
/// use offload_bridge::fs::FileSystemAccess;
///
/// async fn restore(fs: &dyn FileSystemAccess, path: &std::path::Path, data: bytes::Bytes)
///     -> offload_bridge::error::Result<()>
/// {
///     if let Some(parent) = path.parent() {
///         fs.create_dir_all(parent).await?;
///     }
///     fs.write_file(path, data).await
/// }
/// ```
#[async_trait]
pub trait FileSystemAccess: Send + Sync {
    /// Check if a file or directory exists
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Get metadata for a file or directory
    async fn metadata(&self, path: &Path) -> Result<FileMetadata>;

    /// Create a directory and all parent directories if they don't exist
    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Read entire file contents into memory
    async fn read_file(&self, path: &Path) -> Result<Bytes>;

    /// Write data to a file, creating it if it doesn't exist
    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()>;

    /// Delete a file
    async fn delete_file(&self, path: &Path) -> Result<()>;

    /// List all entries in a directory
    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>>;

    /// Size of a file in bytes, or `None` if it does not exist
    async fn file_size(&self, path: &Path) -> Result<Option<u64>> {
        if !self.exists(path).await? {
            return Ok(None);
        }
        Ok(Some(self.metadata(path).await?.size))
    }
}
