//! Directory-backed content resolver
//!
//! Maps `content://<authority>/<relative path>` onto a directory registered
//! for that authority. The relative path is percent-decoded and may not
//! escape the registered root.

use async_trait::async_trait;
use bridge_traits::{
    content::ContentResolver,
    error::{BridgeError, Result},
};
use core_async::io::AsyncRead;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::filesystem::TokioFileSystem;

const SCHEME: &str = "content://";

#[derive(Debug, Default, Clone)]
pub struct DirectoryContentResolver {
    roots: HashMap<String, PathBuf>,
}

impl DirectoryContentResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `content://<authority>/...` from `root`.
    pub fn with_authority(mut self, authority: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        self.roots.insert(authority.into(), root.into());
        self
    }

    fn locate(&self, uri: &str) -> Result<PathBuf> {
        let rest = uri
            .get(..SCHEME.len())
            .filter(|prefix| prefix.eq_ignore_ascii_case(SCHEME))
            .map(|_| &uri[SCHEME.len()..])
            .ok_or_else(|| BridgeError::OperationFailed(format!("not a content uri: {}", uri)))?;

        let (authority, relative) = rest.split_once('/').unwrap_or((rest, ""));
        let root = self
            .roots
            .get(authority)
            .ok_or_else(|| BridgeError::NotFound(uri.to_string()))?;

        let decoded = urlencoding::decode(relative)
            .map_err(|e| BridgeError::OperationFailed(format!("bad content path: {}", e)))?;
        let relative = Path::new(decoded.as_ref());
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(BridgeError::NotFound(uri.to_string()));
        }

        Ok(root.join(relative))
    }
}

#[async_trait]
impl ContentResolver for DirectoryContentResolver {
    async fn display_name(&self, uri: &str) -> Result<Option<String>> {
        let path = self.locate(uri)?;
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(None);
        }
        Ok(path
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string))
    }

    async fn open_read(&self, uri: &str) -> Result<Box<dyn AsyncRead + Send + Unpin>> {
        let path = self.locate(uri)?;
        let file = fs::File::open(&path)
            .await
            .map_err(|e| TokioFileSystem::map_io_error(&path, e))?;
        debug!(uri, path = ?path, "Opened content for reading");
        Ok(Box::new(file))
    }
}
