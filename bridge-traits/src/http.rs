//! HTTP Client Abstraction
//!
//! Single-shot HTTP requests. Playlist acquisition is one GET with no retry,
//! so the contract is a single streaming `open_stream` that hands the body
//! over as an `AsyncRead`.

use async_trait::async_trait;
use core_async::io::AsyncRead;
use std::collections::HashMap;
use std::fmt;

use crate::error::Result;

/// HTTP GET request builder
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: String,
    pub headers: HashMap<String, String>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

/// Response whose body is consumed incrementally.
pub struct HttpStream {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Box<dyn AsyncRead + Send + Unpin>,
}

impl HttpStream {
    /// Check if response status is successful (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl fmt::Debug for HttpStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpStream")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Async HTTP client trait
///
/// Implementations apply their configured connect and read timeouts to every
/// request and must not retry on their own. The read timeout bounds each wait
/// for body bytes, not the whole transfer.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::http::{HttpClient, HttpRequest};
///
/// async fn fetch(client: &dyn HttpClient) -> Result<u16> {
///     let response = client.open_stream(HttpRequest::get("https://example.com/list.m3u")).await?;
///     Ok(response.status)
/// }
/// ```
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Execute a request and return the body as a stream.
    ///
    /// # Errors
    ///
    /// Returns error if the connection fails, TLS validation fails or the
    /// request times out. Non-2xx statuses are not errors.
    async fn open_stream(&self, request: HttpRequest) -> Result<HttpStream>;
}
