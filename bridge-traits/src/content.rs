//! Content Resolver Abstraction
//!
//! Opaque `content://` references handed out by a platform document picker.
//! They carry no filesystem path; the host resolves them to a display name
//! and a readable stream.

use async_trait::async_trait;
use core_async::io::AsyncRead;

use crate::error::Result;

/// Resolves opaque content references.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::content::ContentResolver;
///
/// async fn name_of(resolver: &dyn ContentResolver, uri: &str) -> String {
///     resolver
///         .display_name(uri)
///         .await
///         .ok()
///         .flatten()
///         .unwrap_or_else(|| "unnamed".to_string())
/// }
/// ```
#[async_trait]
pub trait ContentResolver: Send + Sync {
    /// Human readable file name the provider advertises for `uri`, if any.
    async fn display_name(&self, uri: &str) -> Result<Option<String>>;

    /// Open the referenced content for reading.
    ///
    /// Unknown references map to `BridgeError::NotFound`.
    async fn open_read(&self, uri: &str) -> Result<Box<dyn AsyncRead + Send + Unpin>>;
}
