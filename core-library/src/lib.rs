//! # Playlist Library Module
//!
//! Owns the playlist database and the storage contract the sync engine
//! works against.
//!
//! ## Overview
//!
//! - SQLite pool setup and embedded migrations (`db`)
//! - Domain models for playlists and channels (`models`)
//! - Repository traits with SQLite implementations (`repositories`)
//!
//! Every repository call is atomic on its own; callers that need several
//! calls to succeed together get no transaction across them.

pub mod db;
pub mod error;
pub mod models;
pub mod repositories;

pub use error::{LibraryError, Result};
pub use models::{Channel, ChannelId, NewChannel, Playlist, PlaylistWithChannels};
pub use repositories::{
    ChannelRepository, PlaylistRepository, SqliteChannelRepository, SqlitePlaylistRepository,
};
