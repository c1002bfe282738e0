//! Storage and File System Abstractions
//!
//! App-owned durable storage. Local-content playlists are copied here so
//! later refreshes no longer depend on a short-lived content grant.

use async_trait::async_trait;
use core_async::io::{AsyncRead, AsyncWrite};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// File system access trait
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::FileSystemAccess;
///
/// async fn stash(fs: &dyn FileSystemAccess, data: &[u8]) -> Result<()> {
///     let dir = fs.get_data_directory().await?.join("playlists");
///     fs.create_dir_all(&dir).await?;
///     let mut file = fs.open_write_stream(&dir.join("list.m3u")).await?;
///     file.write_all(data).await?;
///     file.shutdown().await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait FileSystemAccess: Send + Sync {
    /// Get the application's data directory
    ///
    /// This directory is suitable for persistent application data.
    async fn get_data_directory(&self) -> Result<PathBuf>;

    /// Create a directory and all parent directories if they don't exist
    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Open a file for streaming reads
    ///
    /// A missing file maps to `BridgeError::NotFound`.
    async fn open_read_stream(&self, path: &Path) -> Result<Box<dyn AsyncRead + Send + Unpin>>;

    /// Open a file for streaming writes, truncating any previous content
    async fn open_write_stream(&self, path: &Path)
        -> Result<Box<dyn AsyncWrite + Send + Unpin>>;
}
