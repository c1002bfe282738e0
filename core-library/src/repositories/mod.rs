//! # Repository Pattern Implementation
//!
//! Storage contract for playlists and channels.
//!
//! - Traits define the interface the sync engine works against
//! - SQLite implementations use sqlx for async database access
//! - Every call is atomic on its own; there is no transaction spanning calls
//!
//! ## Available Repositories
//!
//! - `PlaylistRepository` - Subscribed playlists keyed by resolved URL
//! - `ChannelRepository` - Channels keyed by `(playlist_url, url)`

pub mod channel;
pub mod playlist;

pub use channel::{ChannelRepository, SqliteChannelRepository};
pub use playlist::{PlaylistRepository, SqlitePlaylistRepository};
