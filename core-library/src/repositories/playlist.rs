//! Playlist repository trait and implementation

use crate::error::{LibraryError, Result};
use crate::models::{is_local_url, Channel, Playlist, PlaylistWithChannels};
use async_trait::async_trait;
use sqlx::{query, query_as, SqlitePool};
use std::collections::HashMap;
use tracing::debug;

/// Playlist repository interface for data access operations
#[async_trait]
pub trait PlaylistRepository: Send + Sync {
    /// Insert a playlist, or overwrite the title and origin of the one
    /// already stored under the same URL. Existing channels are kept.
    async fn insert_or_replace(&self, playlist: &Playlist) -> Result<()>;

    /// Find a playlist by its URL
    ///
    /// # Returns
    /// - `Ok(Some(playlist))` if found
    /// - `Ok(None)` if not found
    async fn get_by_url(&self, url: &str) -> Result<Option<Playlist>>;

    /// Move a playlist from `from` to `to`, carrying its channels along.
    ///
    /// If a playlist is already stored under `to`, the one under `from` is
    /// dropped instead and the existing target wins.
    ///
    /// # Returns
    /// `Ok(false)` if nothing was stored under `from`
    async fn update_url(&self, from: &str, to: &str) -> Result<bool>;

    /// Delete a playlist by URL; its channels cascade.
    ///
    /// # Returns
    /// - `Ok(true)` if playlist was deleted
    /// - `Ok(false)` if playlist was not found
    async fn delete(&self, url: &str) -> Result<bool>;

    /// Change a playlist's display title
    async fn rename(&self, url: &str, title: &str) -> Result<bool>;

    /// All playlists ordered by title
    async fn get_all(&self) -> Result<Vec<Playlist>>;

    /// One playlist with its channels in position order
    async fn get_with_channels(&self, url: &str) -> Result<Option<PlaylistWithChannels>>;

    /// Every playlist with its channels in position order
    async fn get_all_with_channels(&self) -> Result<Vec<PlaylistWithChannels>>;
}

/// SQLite implementation of PlaylistRepository
pub struct SqlitePlaylistRepository {
    pool: SqlitePool,
}

impl SqlitePlaylistRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PlaylistRepository for SqlitePlaylistRepository {
    async fn insert_or_replace(&self, playlist: &Playlist) -> Result<()> {
        playlist.validate().map_err(|e| LibraryError::invalid("Playlist", e))?;

        // A plain INSERT OR REPLACE would delete the row first and cascade
        // the delete to every channel.
        query(
            r#"
            INSERT INTO playlists (url, title, from_local)
            VALUES (?, ?, ?)
            ON CONFLICT (url) DO UPDATE SET
                title = excluded.title,
                from_local = excluded.from_local
            "#,
        )
        .bind(&playlist.url)
        .bind(&playlist.title)
        .bind(playlist.from_local)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_by_url(&self, url: &str) -> Result<Option<Playlist>> {
        let playlist = query_as::<_, Playlist>(
            "SELECT url, title, from_local FROM playlists WHERE url = ?",
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;

        Ok(playlist)
    }

    async fn update_url(&self, from: &str, to: &str) -> Result<bool> {
        if to.trim().is_empty() {
            return Err(LibraryError::invalid("url", "Target url cannot be empty"));
        }
        if from == to {
            return Ok(self.get_by_url(from).await?.is_some());
        }

        let mut tx = self.pool.begin().await?;

        let target_exists: Option<(String,)> =
            query_as("SELECT url FROM playlists WHERE url = ?")
                .bind(to)
                .fetch_optional(&mut *tx)
                .await?;

        let result = if target_exists.is_some() {
            debug!(from, to, "Target playlist exists, dropping source row");
            query("DELETE FROM playlists WHERE url = ?")
                .bind(from)
                .execute(&mut *tx)
                .await?
        } else {
            query("UPDATE playlists SET url = ?, from_local = ? WHERE url = ?")
                .bind(to)
                .bind(is_local_url(to))
                .bind(from)
                .execute(&mut *tx)
                .await?
        };

        tx.commit().await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, url: &str) -> Result<bool> {
        let result = query("DELETE FROM playlists WHERE url = ?")
            .bind(url)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn rename(&self, url: &str, title: &str) -> Result<bool> {
        let result = query("UPDATE playlists SET title = ? WHERE url = ?")
            .bind(title)
            .bind(url)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_all(&self) -> Result<Vec<Playlist>> {
        let playlists = query_as::<_, Playlist>(
            "SELECT url, title, from_local FROM playlists ORDER BY title ASC, url ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(playlists)
    }

    async fn get_with_channels(&self, url: &str) -> Result<Option<PlaylistWithChannels>> {
        let Some(playlist) = self.get_by_url(url).await? else {
            return Ok(None);
        };

        let channels = query_as::<_, Channel>(
            "SELECT * FROM channels WHERE playlist_url = ? ORDER BY position ASC, id ASC",
        )
        .bind(url)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(PlaylistWithChannels { playlist, channels }))
    }

    async fn get_all_with_channels(&self) -> Result<Vec<PlaylistWithChannels>> {
        let playlists = self.get_all().await?;

        let channels = query_as::<_, Channel>(
            "SELECT * FROM channels ORDER BY playlist_url ASC, position ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut by_playlist: HashMap<String, Vec<Channel>> = HashMap::new();
        for channel in channels {
            by_playlist
                .entry(channel.playlist_url.clone())
                .or_default()
                .push(channel);
        }

        Ok(playlists
            .into_iter()
            .map(|playlist| {
                let channels = by_playlist.remove(&playlist.url).unwrap_or_default();
                PlaylistWithChannels { playlist, channels }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::models::NewChannel;
    use crate::repositories::{ChannelRepository, SqliteChannelRepository};

    async fn setup() -> (SqlitePlaylistRepository, SqliteChannelRepository) {
        let pool = create_test_pool().await.unwrap();
        (
            SqlitePlaylistRepository::new(pool.clone()),
            SqliteChannelRepository::new(pool),
        )
    }

    #[core_async::test]
    async fn test_insert_and_find_playlist() {
        let (repo, _) = setup().await;

        let playlist = Playlist::new("News", "http://example.com/news.m3u");
        repo.insert_or_replace(&playlist).await.unwrap();

        let found = repo.get_by_url(&playlist.url).await.unwrap().unwrap();
        assert_eq!(found, playlist);
        assert!(!found.from_local);

        assert!(repo.get_by_url("http://missing").await.unwrap().is_none());
    }

    #[core_async::test]
    async fn test_insert_or_replace_keeps_channels() {
        let (repo, channels) = setup().await;

        let playlist = Playlist::new("News", "http://example.com/news.m3u");
        repo.insert_or_replace(&playlist).await.unwrap();
        channels
            .insert(&NewChannel::new(&playlist.url, "http://c/1", "One"))
            .await
            .unwrap();

        repo.insert_or_replace(&Playlist::new("Renamed", &playlist.url))
            .await
            .unwrap();

        let found = repo.get_by_url(&playlist.url).await.unwrap().unwrap();
        assert_eq!(found.title, "Renamed");
        assert_eq!(
            channels.get_by_playlist_url(&playlist.url).await.unwrap().len(),
            1
        );
    }

    #[core_async::test]
    async fn test_insert_rejects_empty_url() {
        let (repo, _) = setup().await;
        assert!(repo.insert_or_replace(&Playlist::new("A", "")).await.is_err());
    }

    #[core_async::test]
    async fn test_update_url_cascades_to_channels() {
        let (repo, channels) = setup().await;

        let content = "content://provider/doc123";
        repo.insert_or_replace(&Playlist::new("Picked", content))
            .await
            .unwrap();
        channels
            .insert(&NewChannel::new(content, "http://c/1", "One"))
            .await
            .unwrap();

        let durable = "file:///data/playlists/File_1700000000000";
        assert!(repo.update_url(content, durable).await.unwrap());

        assert!(repo.get_by_url(content).await.unwrap().is_none());
        let moved = repo.get_by_url(durable).await.unwrap().unwrap();
        assert!(moved.from_local);
        assert_eq!(moved.title, "Picked");

        let moved_channels = channels.get_by_playlist_url(durable).await.unwrap();
        assert_eq!(moved_channels.len(), 1);
        assert_eq!(moved_channels[0].playlist_url, durable);
    }

    #[core_async::test]
    async fn test_update_url_onto_existing_target_drops_source() {
        let (repo, _) = setup().await;

        repo.insert_or_replace(&Playlist::new("Old", "content://p/doc"))
            .await
            .unwrap();
        repo.insert_or_replace(&Playlist::new("Existing", "file:///data/tv.m3u"))
            .await
            .unwrap();

        assert!(repo
            .update_url("content://p/doc", "file:///data/tv.m3u")
            .await
            .unwrap());

        let all = repo.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title, "Existing");
    }

    #[core_async::test]
    async fn test_update_url_missing_source() {
        let (repo, _) = setup().await;
        assert!(!repo.update_url("content://p/none", "file:///x").await.unwrap());
    }

    #[core_async::test]
    async fn test_delete_cascades() {
        let (repo, channels) = setup().await;

        let playlist = Playlist::new("News", "http://example.com/news.m3u");
        repo.insert_or_replace(&playlist).await.unwrap();
        channels
            .insert(&NewChannel::new(&playlist.url, "http://c/1", "One"))
            .await
            .unwrap();

        assert!(repo.delete(&playlist.url).await.unwrap());
        assert!(!repo.delete(&playlist.url).await.unwrap());
        assert!(channels
            .get_by_playlist_url(&playlist.url)
            .await
            .unwrap()
            .is_empty());
    }

    #[core_async::test]
    async fn test_rename() {
        let (repo, _) = setup().await;

        repo.insert_or_replace(&Playlist::new("A", "http://a"))
            .await
            .unwrap();

        assert!(repo.rename("http://a", "B").await.unwrap());
        assert!(!repo.rename("http://missing", "B").await.unwrap());
        assert_eq!(repo.get_by_url("http://a").await.unwrap().unwrap().title, "B");
    }

    #[core_async::test]
    async fn test_get_all_with_channels_groups_in_position_order() {
        let (repo, channels) = setup().await;

        repo.insert_or_replace(&Playlist::new("A", "http://a"))
            .await
            .unwrap();
        repo.insert_or_replace(&Playlist::new("B", "http://b"))
            .await
            .unwrap();

        let mut second = NewChannel::new("http://a", "http://c/2", "Two");
        second.position = 1;
        channels.insert(&second).await.unwrap();
        channels
            .insert(&NewChannel::new("http://a", "http://c/1", "One"))
            .await
            .unwrap();

        let all = repo.get_all_with_channels().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].playlist.url, "http://a");
        let titles: Vec<_> = all[0].channels.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["One", "Two"]);
        assert!(all[1].channels.is_empty());

        let single = repo.get_with_channels("http://a").await.unwrap().unwrap();
        assert_eq!(single.channels.len(), 2);
        assert!(repo.get_with_channels("http://none").await.unwrap().is_none());
    }
}
