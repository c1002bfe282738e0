//! # Core Runtime Module
//!
//! Foundational runtime infrastructure shared by the playlist core crates:
//! - Logging and tracing initialization
//! - Configuration with fail-fast capability checks
//! - The event bus jobs report progress on
//!
//! ## Overview
//!
//! Nothing here knows about playlists beyond the event payloads; the domain
//! lives in `core-library` and `core-sync`.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{CoreConfig, CoreConfigBuilder, MalformedLinePolicy};
pub use error::{Error, Result};
pub use events::{CoreEvent, EventBus};
