//! Async runtime facade for the playlist core.
//!
//! Every `core-*` and `bridge-*` crate depends on this crate instead of
//! naming Tokio directly. The surface is a thin set of re-exports plus a few
//! helpers (cancellation, blocking entry point, wall-clock millis).
//!
//! # Modules
//!
//! - `task`: task spawning and join handles
//! - `time`: sleep, timeout, instants, wall clock helpers
//! - `sync`: async locks, channels, semaphores, cancellation tokens
//! - `io`: async read/write traits and buffered adapters
//! - `runtime`: `block_on` and runtime builders
//!
//! `select!` is re-exported for racing a future against a cancellation token.
//!
//! # Example
//!
//! ```rust
//! use core_async::task;
//! use core_async::time::{sleep, Duration};
//!
//! async fn example() {
//!     let handle = task::spawn(async {
//!         sleep(Duration::from_millis(10)).await;
//!         42
//!     });
//!     assert_eq!(handle.await.ok(), Some(42));
//! }
//! ```

pub use core_async_macros::{main, test};

pub mod io;
pub mod runtime;
pub mod sync;
pub mod task;
pub mod time;

pub use task::spawn;
pub use tokio::select;
pub use time::{sleep, Duration, Instant};
