//! Domain models for the playlist library
//!
//! Playlists are identified by their resolved URL; channels by their URL
//! within a playlist. Both map straight onto their SQLite rows.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

const FILE_SCHEME: &str = "file://";

// =============================================================================
// ID Types
// =============================================================================

/// Store-assigned channel identifier
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(transparent)]
pub struct ChannelId(pub i64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// True for references that point at a file on this device.
pub fn is_local_url(url: &str) -> bool {
    url.get(..FILE_SCHEME.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(FILE_SCHEME))
}

// =============================================================================
// Domain Models
// =============================================================================

/// A subscribed playlist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Playlist {
    /// Resolved URL, unique
    pub url: String,
    /// Display title
    pub title: String,
    /// Sourced from a file on this device rather than the network
    #[serde(default)]
    pub from_local: bool,
}

impl Playlist {
    /// Create a playlist, deriving `from_local` from the URL scheme
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            from_local: is_local_url(&url),
            title: title.into(),
            url,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.url.trim().is_empty() {
            return Err("Playlist url cannot be empty".to_string());
        }
        Ok(())
    }
}

/// A streamable entry belonging to one playlist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Channel {
    pub id: ChannelId,
    /// Owning playlist's URL
    pub playlist_url: String,
    pub url: String,
    pub title: String,
    #[sqlx(rename = "group_title")]
    #[serde(default)]
    pub group: Option<String>,
    /// Logo URL
    #[serde(default)]
    pub cover: Option<String>,
    #[serde(default)]
    pub favourite: bool,
    /// Muted by the user; hidden from listings but kept across refreshes
    #[serde(default)]
    pub banned: bool,
    #[serde(default)]
    pub position: i64,
}

/// Channel fields before the store assigns an id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewChannel {
    pub playlist_url: String,
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub cover: Option<String>,
    #[serde(default)]
    pub favourite: bool,
    #[serde(default)]
    pub banned: bool,
    #[serde(default)]
    pub position: i64,
}

impl NewChannel {
    pub fn new(
        playlist_url: impl Into<String>,
        url: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            playlist_url: playlist_url.into(),
            url: url.into(),
            title: title.into(),
            group: None,
            cover: None,
            favourite: false,
            banned: false,
            position: 0,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.playlist_url.trim().is_empty() {
            return Err("Channel playlist_url cannot be empty".to_string());
        }
        if self.url.trim().is_empty() {
            return Err("Channel url cannot be empty".to_string());
        }
        Ok(())
    }
}

impl From<Channel> for NewChannel {
    fn from(channel: Channel) -> Self {
        Self {
            playlist_url: channel.playlist_url,
            url: channel.url,
            title: channel.title,
            group: channel.group,
            cover: channel.cover,
            favourite: channel.favourite,
            banned: channel.banned,
            position: channel.position,
        }
    }
}

/// A playlist with its channels in position order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistWithChannels {
    pub playlist: Playlist,
    pub channels: Vec<Channel>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_local_follows_scheme() {
        assert!(Playlist::new("A", "file:///data/tv.m3u").from_local);
        assert!(Playlist::new("A", "FILE:///data/tv.m3u").from_local);
        assert!(!Playlist::new("A", "https://example.com/tv.m3u").from_local);
        assert!(!Playlist::new("A", "content://provider/doc").from_local);
    }

    #[test]
    fn test_validation() {
        assert!(Playlist::new("A", "  ").validate().is_err());
        assert!(NewChannel::new("http://p", "", "One").validate().is_err());
        assert!(NewChannel::new("http://p", "http://c", "One").validate().is_ok());
    }

    #[test]
    fn test_channel_json_tolerates_missing_optional_fields() {
        let channel: Channel = serde_json::from_str(
            r#"{"id":3,"playlist_url":"http://p","url":"http://c","title":"One","extra":1}"#,
        )
        .unwrap();

        assert_eq!(channel.id, ChannelId(3));
        assert_eq!(channel.group, None);
        assert!(!channel.favourite);
        assert_eq!(channel.position, 0);
    }
}
