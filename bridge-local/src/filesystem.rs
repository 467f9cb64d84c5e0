//! File System Access Implementation using Tokio

use async_trait::async_trait;
use bytes::Bytes;
use offload_bridge::{
    error::{BridgeError, Result},
    fs::{FileMetadata, FileSystemAccess},
};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Tokio-based file system implementation
pub struct TokioFileSystem;

impl TokioFileSystem {
    pub fn new() -> Self {
        Self
    }

    fn map_io_error(e: std::io::Error) -> BridgeError {
        BridgeError::Io(e)
    }
}

impl Default for TokioFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileSystemAccess for TokioFileSystem {
    async fn exists(&self, path: &Path) -> Result<bool> {
        Ok(fs::try_exists(path).await.map_err(Self::map_io_error)?)
    }

    async fn metadata(&self, path: &Path) -> Result<FileMetadata> {
        let metadata = fs::metadata(path).await.map_err(Self::map_io_error)?;

        Ok(FileMetadata {
            size: metadata.len(),
            modified_at: metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64),
            is_directory: metadata.is_dir(),
        })
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).await.map_err(Self::map_io_error)?;
        debug!(path = ?path, "Created directory");
        Ok(())
    }

    async fn read_file(&self, path: &Path) -> Result<Bytes> {
        let data = fs::read(path).await.map_err(Self::map_io_error)?;
        Ok(Bytes::from(data))
    }

    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !fs::try_exists(parent).await.map_err(Self::map_io_error)? {
                fs::create_dir_all(parent)
                    .await
                    .map_err(Self::map_io_error)?;
            }
        }
        fs::write(path, &data).await.map_err(Self::map_io_error)?;
        debug!(path = ?path, bytes = data.len(), "Wrote file");
        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).await.map_err(Self::map_io_error)?;
        debug!(path = ?path, "Deleted file");
        Ok(())
    }

    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        let mut dir = fs::read_dir(path).await.map_err(Self::map_io_error)?;
        while let Some(entry) = dir.next_entry().await.map_err(Self::map_io_error)? {
            entries.push(entry.path());
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_read_delete() {
        let dir = tempfile::tempdir().unwrap();
        let fs = TokioFileSystem::new();
        let path = dir.path().join("nested").join("photo.jpg");

        fs.write_file(&path, Bytes::from_static(b"jpeg-bytes"))
            .await
            .unwrap();
        assert!(fs.exists(&path).await.unwrap());
        assert_eq!(fs.file_size(&path).await.unwrap(), Some(10));

        let data = fs.read_file(&path).await.unwrap();
        assert_eq!(&data[..], b"jpeg-bytes");

        fs.delete_file(&path).await.unwrap();
        assert!(!fs.exists(&path).await.unwrap());
        assert_eq!(fs.file_size(&path).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_list_directory() {
        let dir = tempfile::tempdir().unwrap();
        let fs = TokioFileSystem::new();

        fs.write_file(&dir.path().join("a.jpg"), Bytes::from_static(b"a"))
            .await
            .unwrap();
        fs.write_file(&dir.path().join("b.jpg"), Bytes::from_static(b"b"))
            .await
            .unwrap();

        let entries = fs.list_directory(dir.path()).await.unwrap();
        assert_eq!(entries.len(), 2);
    }
}
