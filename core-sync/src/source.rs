//! # Source Resolver
//!
//! Turns a user-supplied playlist reference into something the parser can
//! read.
//!
//! ## Reference kinds
//!
//! - `http://` / `https://`: fetched with a single GET through the
//!   [`HttpClient`] bridge, no retry. A non-2xx answer is treated as an
//!   empty playlist rather than an error.
//! - `file://`: read through [`FileSystemAccess`].
//! - `content://`: copied into `<data_dir>/playlists/` first, and the stored
//!   playlist (if any) is moved from the content reference to the copy's
//!   `file://` URL so later refreshes read the durable copy.
//!
//! Scheme matching is case-insensitive.

use crate::work::checkpoint;
use crate::{Result, SyncError};
use bridge_traits::content::ContentResolver;
use bridge_traits::error::BridgeError;
use bridge_traits::http::{HttpClient, HttpRequest};
use bridge_traits::storage::FileSystemAccess;
use bridge_traits::time::Clock;
use core_async::io::{copy, AsyncRead, AsyncWriteExt};
use core_async::sync::CancellationToken;
use core_library::PlaylistRepository;
use core_runtime::logging::redact_url;
use core_runtime::CoreConfig;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const FILE_SCHEME: &str = "file://";

/// Body of a playlist source
pub type SourceReader = Box<dyn AsyncRead + Send + Unpin>;

/// Where a playlist reference points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Network,
    LocalFile,
    LocalContent,
}

impl SourceKind {
    /// Classify by scheme; `None` for anything unsupported.
    pub fn classify(reference: &str) -> Option<Self> {
        let reference = reference.trim();
        let has_scheme = |scheme: &str| {
            reference
                .get(..scheme.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(scheme))
        };

        if has_scheme("http://") || has_scheme("https://") {
            Some(SourceKind::Network)
        } else if has_scheme(FILE_SCHEME) {
            Some(SourceKind::LocalFile)
        } else if has_scheme("content://") {
            Some(SourceKind::LocalContent)
        } else {
            None
        }
    }

    pub fn is_local(&self) -> bool {
        !matches!(self, SourceKind::Network)
    }
}

/// A reference after classification and, for picked content, copying
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    pub kind: SourceKind,
    /// What the caller passed in
    pub reference: String,
    /// URL the playlist is stored under
    pub url: String,
}

/// Resolves and opens playlist sources
pub struct SourceResolver {
    http_client: Arc<dyn HttpClient>,
    file_system: Arc<dyn FileSystemAccess>,
    content_resolver: Option<Arc<dyn ContentResolver>>,
    clock: Arc<dyn Clock>,
    playlists: Arc<dyn PlaylistRepository>,
    storage_dir: PathBuf,
}

impl SourceResolver {
    pub fn new(config: &CoreConfig, playlists: Arc<dyn PlaylistRepository>) -> Self {
        Self {
            http_client: Arc::clone(&config.http_client),
            file_system: Arc::clone(&config.file_system),
            content_resolver: config.content_resolver.clone(),
            clock: Arc::clone(&config.clock),
            playlists,
            storage_dir: config.playlist_storage_dir(),
        }
    }

    /// Classify `reference` and make it readable.
    ///
    /// # Errors
    ///
    /// - [`SyncError::EmptyReference`] for a blank reference
    /// - [`SyncError::UnsupportedSourceKind`] for an unknown scheme, or a
    ///   `content://` reference with no content resolver configured
    /// - [`SyncError::SourceNotFound`] when picked content no longer exists
    #[instrument(skip(self, reference, token), fields(reference = %redact_url(reference)))]
    pub async fn resolve(
        &self,
        reference: &str,
        token: &CancellationToken,
    ) -> Result<ResolvedSource> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(SyncError::EmptyReference);
        }

        let kind = SourceKind::classify(reference).ok_or_else(|| {
            SyncError::UnsupportedSourceKind {
                reference: reference.to_string(),
            }
        })?;

        match kind {
            SourceKind::Network | SourceKind::LocalFile => Ok(ResolvedSource {
                kind,
                reference: reference.to_string(),
                url: reference.to_string(),
            }),
            SourceKind::LocalContent => self.materialize(reference, token).await,
        }
    }

    /// Open the body of a resolved source.
    ///
    /// Returns `Ok(None)` when a network source answers with a non-2xx status.
    pub async fn open(
        &self,
        source: &ResolvedSource,
        token: &CancellationToken,
    ) -> Result<Option<SourceReader>> {
        match source.kind {
            SourceKind::Network => {
                let request = HttpRequest::get(&source.url);
                let response = checkpoint(token, self.http_client.open_stream(request))
                    .await?
                    .map_err(|e| SyncError::Network {
                        url: redact_url(&source.url),
                        message: e.to_string(),
                    })?;

                if !response.is_success() {
                    warn!(
                        url = %redact_url(&source.url),
                        status = response.status,
                        "Playlist source answered with a non-success status"
                    );
                    return Ok(None);
                }

                Ok(Some(response.body))
            }
            SourceKind::LocalFile | SourceKind::LocalContent => {
                let path = file_url_to_path(&source.url);
                let reader = self
                    .file_system
                    .open_read_stream(&path)
                    .await
                    .map_err(|e| not_found_or_bridge(e, &source.url))?;
                Ok(Some(reader))
            }
        }
    }

    /// Copy picked content into app storage and move the stored playlist.
    async fn materialize(
        &self,
        reference: &str,
        token: &CancellationToken,
    ) -> Result<ResolvedSource> {
        let resolver =
            self.content_resolver
                .as_ref()
                .ok_or_else(|| SyncError::UnsupportedSourceKind {
                    reference: reference.to_string(),
                })?;

        let display_name = match resolver.display_name(reference).await {
            Ok(name) => name.as_deref().and_then(sanitize_file_name),
            Err(e) if e.is_not_found() => {
                return Err(SyncError::SourceNotFound {
                    reference: reference.to_string(),
                })
            }
            Err(e) => {
                warn!(error = %e, "Content display name unavailable");
                None
            }
        };
        let file_name = display_name
            .unwrap_or_else(|| format!("File_{}", self.clock.unix_timestamp_millis()));

        self.file_system.create_dir_all(&self.storage_dir).await?;
        let destination = self.storage_dir.join(&file_name);

        let mut input = resolver
            .open_read(reference)
            .await
            .map_err(|e| not_found_or_bridge(e, reference))?;
        let mut output = self.file_system.open_write_stream(&destination).await?;

        let bytes = checkpoint(token, copy(&mut input, &mut output)).await??;
        checkpoint(token, output.shutdown()).await??;

        let url = path_to_file_url(&destination);
        debug!(bytes, file = %file_name, "Copied picked content into app storage");

        if self.playlists.update_url(reference, &url).await? {
            info!(url = %redact_url(&url), "Moved stored playlist to durable copy");
        }

        Ok(ResolvedSource {
            kind: SourceKind::LocalContent,
            reference: reference.to_string(),
            url,
        })
    }
}

fn not_found_or_bridge(error: BridgeError, reference: &str) -> SyncError {
    if error.is_not_found() {
        SyncError::SourceNotFound {
            reference: reference.to_string(),
        }
    } else {
        SyncError::Bridge(error)
    }
}

/// Keep a display name inside the storage directory.
fn sanitize_file_name(name: &str) -> Option<String> {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            other => other,
        })
        .collect();
    let cleaned = cleaned.trim();

    match cleaned {
        "" | "." | ".." => None,
        name => Some(name.to_string()),
    }
}

/// Filesystem path of a `file://` URL, percent-decoded.
pub fn file_url_to_path(url: &str) -> PathBuf {
    let raw = url
        .get(..FILE_SCHEME.len())
        .filter(|head| head.eq_ignore_ascii_case(FILE_SCHEME))
        .map(|_| &url[FILE_SCHEME.len()..])
        .unwrap_or(url);

    match urlencoding::decode(raw) {
        Ok(decoded) => PathBuf::from(decoded.into_owned()),
        Err(_) => PathBuf::from(raw),
    }
}

/// `file://` URL for a path, each segment percent-encoded so that
/// [`file_url_to_path`] maps it back to the same path.
pub fn path_to_file_url(path: &Path) -> String {
    let segments: Vec<String> = path
        .components()
        .map(|component| match component {
            Component::RootDir => String::new(),
            Component::Normal(segment) => {
                urlencoding::encode(&segment.to_string_lossy()).into_owned()
            }
            other => other.as_os_str().to_string_lossy().into_owned(),
        })
        .collect();

    format!("{}{}", FILE_SCHEME, segments.join("/"))
}

/// Title suggested for a pasted reference.
///
/// The last path segment up to its first `.`, or `Playlist_<unix millis>`
/// when that comes out empty.
pub fn derive_title(reference: &str, clock: &dyn Clock) -> String {
    let without_suffix = reference
        .split(['?', '#'])
        .next()
        .unwrap_or_default();
    let segment = without_suffix
        .trim_end_matches(['/', '\\'])
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    let stem = segment.split('.').next().unwrap_or_default();
    let stem = urlencoding::decode(stem)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| stem.to_string());
    let stem = stem.trim();

    // A bare scheme is not a title
    if stem.is_empty() || stem.ends_with(':') {
        format!("Playlist_{}", clock.unix_timestamp_millis())
    } else {
        stem.to_string()
    }
}
