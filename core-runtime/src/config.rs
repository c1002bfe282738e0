//! # Core Configuration Module
//!
//! Builder-based configuration for the playlist core.
//!
//! ## Overview
//!
//! [`CoreConfigBuilder`] collects paths, timeouts, worker limits and the
//! host bridges, then validates everything in [`CoreConfigBuilder::build`].
//! Missing capabilities fail there with an actionable message instead of on
//! the first subscribe.
//!
//! ## Required Dependencies
//!
//! - `HttpClient` - playlist downloads (desktop default: reqwest)
//! - `FileSystemAccess` - durable copies of picked content (desktop default: tokio fs)
//!
//! ## Optional Dependencies
//!
//! - `ContentResolver` - `content://` references; without one those
//!   references are rejected at subscribe time
//! - `Clock` - defaults to the system clock
//!
//! With the `desktop-shims` feature, desktop defaults for `HttpClient`,
//! `FileSystemAccess` and `ContentResolver` are injected when not provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::time::Duration;
//!
//! let config = CoreConfig::builder()
//!     .data_dir("/var/lib/playlist-core")
//!     .connect_timeout(Duration::from_secs(5))
//!     .worker_pool_size(2)
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{Clock, ContentResolver, FileSystemAccess, HttpClient, SystemClock};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_WORKER_POOL_SIZE: usize = 4;
/// `SkipFavourite`: refreshes never drop channels the user starred.
pub const DEFAULT_STRATEGY_CODE: i32 = 1;
const DATABASE_FILE: &str = "playlists.db";

/// What a restore does with a line it cannot decode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedLinePolicy {
    /// Log, count and continue with the next line.
    #[default]
    Skip,
    /// Fail the whole restore on the first bad line.
    Abort,
}

/// Core configuration for the playlist core.
#[derive(Clone)]
pub struct CoreConfig {
    /// Root of app-owned storage; durable playlist copies live under it
    pub data_dir: PathBuf,

    /// SQLite database file
    pub database_path: PathBuf,

    pub connect_timeout: Duration,

    /// Longest wait for the next chunk of a playlist download. A slow body
    /// that keeps arriving is never cut off.
    pub call_timeout: Duration,

    /// Maximum number of subscribe/backup/restore jobs running at once
    pub worker_pool_size: usize,

    /// Integer strategy preference applied when callers do not pass one
    pub default_strategy_code: i32,

    pub malformed_line_policy: MalformedLinePolicy,

    pub event_buffer_size: usize,

    pub http_client: Arc<dyn HttpClient>,

    pub file_system: Arc<dyn FileSystemAccess>,

    pub content_resolver: Option<Arc<dyn ContentResolver>>,

    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("data_dir", &self.data_dir)
            .field("database_path", &self.database_path)
            .field("connect_timeout", &self.connect_timeout)
            .field("call_timeout", &self.call_timeout)
            .field("worker_pool_size", &self.worker_pool_size)
            .field("default_strategy_code", &self.default_strategy_code)
            .field("malformed_line_policy", &self.malformed_line_policy)
            .field("event_buffer_size", &self.event_buffer_size)
            .field("http_client", &"<dyn HttpClient>")
            .field("file_system", &"<dyn FileSystemAccess>")
            .field(
                "content_resolver",
                &self.content_resolver.as_ref().map(|_| "<dyn ContentResolver>"),
            )
            .finish()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Directory that receives durable copies of picked content.
    pub fn playlist_storage_dir(&self) -> PathBuf {
        self.data_dir.join("playlists")
    }

    /// Checks paths and numeric limits.
    pub fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(Error::Config("Data directory cannot be empty".to_string()));
        }

        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        if self.connect_timeout.is_zero() || self.call_timeout.is_zero() {
            return Err(Error::Config(
                "Network timeouts must be greater than zero".to_string(),
            ));
        }

        if self.worker_pool_size == 0 || self.worker_pool_size > 64 {
            return Err(Error::Config(
                "Worker pool size must be between 1 and 64".to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn http_client_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "HttpClient implementation is required to download playlists. \
                 Desktop: enable the 'desktop-shims' feature to use ReqwestHttpClient. \
                 Mobile: inject the platform HTTP stack."
            .to_string(),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn file_system_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "FileSystemAccess".to_string(),
        message: "FileSystemAccess implementation is required to store picked playlists. \
                 Desktop: enable the 'desktop-shims' feature to use TokioFileSystem. \
                 Mobile: inject an app-sandbox file adapter."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client(
    connect_timeout: Duration,
    call_timeout: Duration,
) -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::{HttpClientConfig, ReqwestHttpClient};

    let client = ReqwestHttpClient::new(HttpClientConfig {
        connect_timeout,
        read_timeout: call_timeout,
        ..HttpClientConfig::default()
    })
    .map_err(|e| Error::Internal(format!("Failed to build default HttpClient: {}", e)))?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client(
    _connect_timeout: Duration,
    _call_timeout: Duration,
) -> Result<Arc<dyn HttpClient>> {
    Err(http_client_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_file_system(data_dir: &std::path::Path) -> Result<Arc<dyn FileSystemAccess>> {
    Ok(Arc::new(bridge_desktop::TokioFileSystem::with_data_directory(
        data_dir.to_path_buf(),
    )))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_file_system(_data_dir: &std::path::Path) -> Result<Arc<dyn FileSystemAccess>> {
    Err(file_system_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_content_resolver() -> Option<Arc<dyn ContentResolver>> {
    Some(Arc::new(bridge_desktop::DirectoryContentResolver::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_content_resolver() -> Option<Arc<dyn ContentResolver>> {
    None
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    data_dir: Option<PathBuf>,
    database_path: Option<PathBuf>,
    connect_timeout: Option<Duration>,
    call_timeout: Option<Duration>,
    worker_pool_size: Option<usize>,
    default_strategy_code: Option<i32>,
    malformed_line_policy: Option<MalformedLinePolicy>,
    event_buffer_size: Option<usize>,
    http_client: Option<Arc<dyn HttpClient>>,
    file_system: Option<Arc<dyn FileSystemAccess>>,
    content_resolver: Option<Arc<dyn ContentResolver>>,
    clock: Option<Arc<dyn Clock>>,
}

impl CoreConfigBuilder {
    /// Sets the app-owned storage root (required).
    pub fn data_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.data_dir = Some(path.into());
        self
    }

    /// Overrides the database location (default: `<data_dir>/playlists.db`).
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    pub fn worker_pool_size(mut self, size: usize) -> Self {
        self.worker_pool_size = Some(size);
        self
    }

    /// Strategy preference code: `0` all, `1` skip favourites, anything else keeps everything.
    pub fn default_strategy_code(mut self, code: i32) -> Self {
        self.default_strategy_code = Some(code);
        self
    }

    pub fn malformed_line_policy(mut self, policy: MalformedLinePolicy) -> Self {
        self.malformed_line_policy = Some(policy);
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn file_system(mut self, fs: Arc<dyn FileSystemAccess>) -> Self {
        self.file_system = Some(fs);
        self
    }

    pub fn content_resolver(mut self, resolver: Arc<dyn ContentResolver>) -> Self {
        self.content_resolver = Some(resolver);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// - `Error::Config` when the data directory is missing or a limit is invalid
    /// - `Error::CapabilityMissing` when a required bridge is absent and no
    ///   desktop default is compiled in
    pub fn build(self) -> Result<CoreConfig> {
        let data_dir = self.data_dir.ok_or_else(|| {
            Error::Config("Data directory is required. Use .data_dir() to set it.".to_string())
        })?;

        let database_path = self
            .database_path
            .unwrap_or_else(|| data_dir.join(DATABASE_FILE));
        let connect_timeout = self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT);
        let call_timeout = self.call_timeout.unwrap_or(DEFAULT_CALL_TIMEOUT);

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client(connect_timeout, call_timeout)?,
        };

        let file_system = match self.file_system {
            Some(fs) => fs,
            None => provide_default_file_system(&data_dir)?,
        };

        let config = CoreConfig {
            data_dir,
            database_path,
            connect_timeout,
            call_timeout,
            worker_pool_size: self.worker_pool_size.unwrap_or(DEFAULT_WORKER_POOL_SIZE),
            default_strategy_code: self.default_strategy_code.unwrap_or(DEFAULT_STRATEGY_CODE),
            malformed_line_policy: self.malformed_line_policy.unwrap_or_default(),
            event_buffer_size: self
                .event_buffer_size
                .unwrap_or(crate::events::DEFAULT_EVENT_BUFFER_SIZE),
            http_client,
            file_system,
            content_resolver: self
                .content_resolver
                .or_else(provide_default_content_resolver),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        };

        config.validate()?;

        Ok(config)
    }
}
