//! File system abstraction for testability.

use async_trait::async_trait;
use std::path::Path;
use tokio::io::AsyncWriteExt;

/// Abstraction over file system operations for testability.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Returns the size of a file if it exists.
    async fn file_size(&self, path: &Path) -> Option<u64>;

    /// Creates all directories in the given path.
    async fn create_dir_all(&self, path: &Path) -> std::io::Result<()>;

    /// Creates (or truncates) a file for writing.
    async fn create_file(&self, path: &Path) -> std::io::Result<tokio::fs::File>;

    /// Opens an existing file for appending.
    async fn open_append(&self, path: &Path) -> std::io::Result<tokio::fs::File>;

    /// Removes a file.
    async fn remove_file(&self, path: &Path) -> std::io::Result<()>;
}

/// Default file system implementation using `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioFileSystem;

impl TokioFileSystem {
    /// Creates a new `TokioFileSystem` instance.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FileSystem for TokioFileSystem {
    async fn file_size(&self, path: &Path) -> Option<u64> {
        tokio::fs::metadata(path)
            .await
            .ok()
            .filter(std::fs::Metadata::is_file)
            .map(|m| m.len())
    }

    async fn create_dir_all(&self, path: &Path) -> std::io::Result<()> {
        tokio::fs::create_dir_all(path).await
    }

    async fn create_file(&self, path: &Path) -> std::io::Result<tokio::fs::File> {
        tokio::fs::File::create(path).await
    }

    async fn open_append(&self, path: &Path) -> std::io::Result<tokio::fs::File> {
        tokio::fs::OpenOptions::new().append(true).open(path).await
    }

    async fn remove_file(&self, path: &Path) -> std::io::Result<()> {
        tokio::fs::remove_file(path).await
    }
}

/// Writes one chunk and waits until it has reached the file.
///
/// `tokio::fs::File` completes writes in the background; the flush makes the
/// new length visible before the caller reports the bytes.
pub(crate) async fn write_chunk(file: &mut tokio::fs::File, chunk: &[u8]) -> std::io::Result<()> {
    file.write_all(chunk).await?;
    file.flush().await
}
