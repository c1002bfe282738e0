//! # Host Bridge Traits
//!
//! Capability contracts the playlist core needs from its host platform.
//!
//! ## Overview
//!
//! The core never touches sockets, the filesystem or a platform content
//! provider directly. Each of those is a trait here, implemented once per
//! host (`bridge-desktop` for desktop builds, platform adapters elsewhere).
//!
//! ## Traits
//!
//! ### Networking & I/O
//! - [`HttpClient`](http::HttpClient) - Single-shot HTTP requests with streamed bodies
//! - [`FileSystemAccess`](storage::FileSystemAccess) - App-owned durable storage
//! - [`ContentResolver`](content::ContentResolver) - Opaque `content://` references picked by the user
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Fail-Fast Strategy
//!
//! A missing capability is reported at configuration time rather than on the
//! first request:
//!
//! ```ignore
//! let http_client = config.http_client
//!     .ok_or_else(|| Error::CapabilityMissing {
//!         capability: "HttpClient".to_string(),
//!         message: "No HTTP client implementation provided".to_string(),
//!     })?;
//! ```
//!
//! ## Error Handling
//!
//! Every trait returns [`BridgeError`](error::BridgeError). Implementations map
//! "resource does not exist" to `BridgeError::NotFound` so the core can tell a
//! missing playlist file apart from a failing one.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so they can be shared across jobs
//! running on the worker pool.

pub mod content;
pub mod error;
pub mod http;
pub mod storage;
pub mod time;

pub use error::BridgeError;

pub use content::ContentResolver;
pub use http::{HttpClient, HttpRequest, HttpStream};
pub use storage::FileSystemAccess;
pub use time::{Clock, ConsoleLogger, FixedClock, LogEntry, LogLevel, LoggerSink, SystemClock};
