//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest` with configurable connect and read timeouts
//! - `FileSystemAccess` using `tokio::fs` rooted in the platform data directory
//! - `ContentResolver` mapping `content://<authority>/<path>` onto registered
//!   local directories, standing in for a mobile document provider
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{HttpClientConfig, ReqwestHttpClient, TokioFileSystem};
//!
//! #[core_async::main]
//! async fn main() {
//!     let http_client = ReqwestHttpClient::new(HttpClientConfig::default()).unwrap();
//!     let fs = TokioFileSystem::new();
//!     // Hand both to `CoreConfig::builder()`
//! }
//! ```

mod content;
mod filesystem;
mod http;

pub use content::DirectoryContentResolver;
pub use filesystem::TokioFileSystem;
pub use http::{HttpClientConfig, ReqwestHttpClient};
