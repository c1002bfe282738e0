//! Channel repository trait and implementation

use crate::error::{LibraryError, Result};
use crate::models::{Channel, ChannelId, NewChannel};
use async_trait::async_trait;
use sqlx::{query, query_as, SqlitePool};

/// Channel repository interface for data access operations
#[async_trait]
pub trait ChannelRepository: Send + Sync {
    /// Channels of one playlist in position order
    async fn get_by_playlist_url(&self, playlist_url: &str) -> Result<Vec<Channel>>;

    async fn get_by_id(&self, id: ChannelId) -> Result<Option<Channel>>;

    /// Insert a new channel
    ///
    /// # Errors
    /// Fails if the playlist does not exist or the playlist already has a
    /// channel with the same URL.
    async fn insert(&self, channel: &NewChannel) -> Result<ChannelId>;

    /// Insert a channel, or overwrite every field of the one stored under the
    /// same `(playlist_url, url)`.
    async fn upsert(&self, channel: &NewChannel) -> Result<ChannelId>;

    /// Delete one channel of a playlist by its URL
    async fn delete_by_url(&self, playlist_url: &str, url: &str) -> Result<bool>;

    /// Delete every channel of a playlist, returning how many went
    async fn delete_by_playlist_url(&self, playlist_url: &str) -> Result<u64>;

    async fn set_favourite(&self, id: ChannelId, favourite: bool) -> Result<bool>;

    async fn set_banned(&self, id: ChannelId, banned: bool) -> Result<bool>;

    /// Every banned channel across all playlists
    async fn find_banned(&self) -> Result<Vec<Channel>>;
}

/// SQLite implementation of ChannelRepository
pub struct SqliteChannelRepository {
    pool: SqlitePool,
}

impl SqliteChannelRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChannelRepository for SqliteChannelRepository {
    async fn get_by_playlist_url(&self, playlist_url: &str) -> Result<Vec<Channel>> {
        let channels = query_as::<_, Channel>(
            "SELECT * FROM channels WHERE playlist_url = ? ORDER BY position ASC, id ASC",
        )
        .bind(playlist_url)
        .fetch_all(&self.pool)
        .await?;

        Ok(channels)
    }

    async fn get_by_id(&self, id: ChannelId) -> Result<Option<Channel>> {
        let channel = query_as::<_, Channel>("SELECT * FROM channels WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(channel)
    }

    async fn insert(&self, channel: &NewChannel) -> Result<ChannelId> {
        channel.validate().map_err(|e| LibraryError::invalid("Channel", e))?;

        let result = query(
            r#"
            INSERT INTO channels (
                playlist_url, url, title, group_title, cover, favourite, banned, position
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&channel.playlist_url)
        .bind(&channel.url)
        .bind(&channel.title)
        .bind(&channel.group)
        .bind(&channel.cover)
        .bind(channel.favourite)
        .bind(channel.banned)
        .bind(channel.position)
        .execute(&self.pool)
        .await?;

        Ok(ChannelId(result.last_insert_rowid()))
    }

    async fn upsert(&self, channel: &NewChannel) -> Result<ChannelId> {
        channel.validate().map_err(|e| LibraryError::invalid("Channel", e))?;

        let (id,): (i64,) = query_as(
            r#"
            INSERT INTO channels (
                playlist_url, url, title, group_title, cover, favourite, banned, position
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (playlist_url, url) DO UPDATE SET
                title = excluded.title,
                group_title = excluded.group_title,
                cover = excluded.cover,
                favourite = excluded.favourite,
                banned = excluded.banned,
                position = excluded.position
            RETURNING id
            "#,
        )
        .bind(&channel.playlist_url)
        .bind(&channel.url)
        .bind(&channel.title)
        .bind(&channel.group)
        .bind(&channel.cover)
        .bind(channel.favourite)
        .bind(channel.banned)
        .bind(channel.position)
        .fetch_one(&self.pool)
        .await?;

        Ok(ChannelId(id))
    }

    async fn delete_by_url(&self, playlist_url: &str, url: &str) -> Result<bool> {
        let result = query("DELETE FROM channels WHERE playlist_url = ? AND url = ?")
            .bind(playlist_url)
            .bind(url)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_by_playlist_url(&self, playlist_url: &str) -> Result<u64> {
        let result = query("DELETE FROM channels WHERE playlist_url = ?")
            .bind(playlist_url)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn set_favourite(&self, id: ChannelId, favourite: bool) -> Result<bool> {
        let result = query("UPDATE channels SET favourite = ? WHERE id = ?")
            .bind(favourite)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_banned(&self, id: ChannelId, banned: bool) -> Result<bool> {
        let result = query("UPDATE channels SET banned = ? WHERE id = ?")
            .bind(banned)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_banned(&self) -> Result<Vec<Channel>> {
        let channels = query_as::<_, Channel>(
            "SELECT * FROM channels WHERE banned = 1 ORDER BY playlist_url ASC, position ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(channels)
    }
}
