//! # Reconciliation Engine
//!
//! Decides which stored channels survive a refresh and which parsed entries
//! become new channels.
//!
//! ## Strategies
//!
//! | Strategy        | Deletes                                   | Inserts                                   |
//! |-----------------|-------------------------------------------|-------------------------------------------|
//! | `All`           | previous channels missing from the parse  | parsed entries not already retained       |
//! | `SkipFavourite` | non-favourites missing from the parse     | as `All`, favourite URLs count as present |
//! | `Keep`          | nothing                                   | nothing                                   |
//!
//! [`reconcile`] is pure. [`apply_reconciliation`] performs the deletes and
//! then the inserts, one repository call at a time, and keeps going past
//! individual storage failures.

use crate::parser::ParsedEntry;
use crate::work::ensure_active;
use crate::Result;
use core_async::sync::CancellationToken;
use core_library::{Channel, ChannelRepository, LibraryError, NewChannel};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

// ============================================================================
// Strategy
// ============================================================================

/// Which stored channels survive a refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Mirror the source exactly
    All,
    /// Mirror the source but never drop favourites
    SkipFavourite,
    /// Leave stored channels untouched
    Keep,
}

impl Strategy {
    /// Map a stored preference code; unknown codes fall back to `Keep`.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Strategy::All,
            1 => Strategy::SkipFavourite,
            _ => Strategy::Keep,
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            Strategy::All => 0,
            Strategy::SkipFavourite => 1,
            Strategy::Keep => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::All => "all",
            Strategy::SkipFavourite => "skip_favourite",
            Strategy::Keep => "keep",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Planning
// ============================================================================

/// Outcome of comparing stored channels with a fresh parse
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Reconciliation {
    pub to_delete: Vec<Channel>,
    /// Delete candidates that are still present in the parse
    pub retained: Vec<Channel>,
    /// Parsed entries to store, in parse order
    pub to_insert: Vec<ParsedEntry>,
    /// Position given to the first inserted channel
    pub first_position: i64,
}

impl Reconciliation {
    pub fn is_noop(&self) -> bool {
        self.to_delete.is_empty() && self.to_insert.is_empty()
    }

    /// Channels to insert for `playlist_url`, numbered from `first_position`.
    pub fn new_channels(&self, playlist_url: &str) -> Vec<NewChannel> {
        self.to_insert
            .iter()
            .zip(self.first_position..)
            .map(|(entry, position)| NewChannel {
                playlist_url: playlist_url.to_string(),
                url: entry.url.clone(),
                title: entry.title.clone(),
                group: entry.group.clone(),
                cover: entry.cover.clone(),
                favourite: false,
                banned: false,
                position,
            })
            .collect()
    }
}

/// Compare `previous` channels with `parsed` entries under `strategy`.
pub fn reconcile(previous: &[Channel], parsed: &[ParsedEntry], strategy: Strategy) -> Reconciliation {
    let parsed_urls: HashSet<&str> = parsed.iter().map(|entry| entry.url.as_str()).collect();

    let (favourites, others): (Vec<&Channel>, Vec<&Channel>) =
        previous.iter().partition(|channel| channel.favourite);

    let candidates: Vec<&Channel> = match strategy {
        Strategy::All => previous.iter().collect(),
        Strategy::SkipFavourite => others,
        Strategy::Keep => Vec::new(),
    };

    let (retained, to_delete): (Vec<Channel>, Vec<Channel>) = candidates
        .into_iter()
        .cloned()
        .partition(|channel| parsed_urls.contains(channel.url.as_str()));

    let to_insert = match strategy {
        Strategy::Keep => Vec::new(),
        Strategy::All | Strategy::SkipFavourite => {
            let mut existing: HashSet<&str> =
                retained.iter().map(|channel| channel.url.as_str()).collect();
            if strategy == Strategy::SkipFavourite {
                existing.extend(favourites.iter().map(|channel| channel.url.as_str()));
            }

            let mut seen = HashSet::new();
            parsed
                .iter()
                .filter(|entry| !existing.contains(entry.url.as_str()))
                .filter(|entry| seen.insert(entry.url.as_str()))
                .cloned()
                .collect()
        }
    };

    let deleted_urls: HashSet<&str> = to_delete.iter().map(|c| c.url.as_str()).collect();
    let first_position = previous
        .iter()
        .filter(|channel| !deleted_urls.contains(channel.url.as_str()))
        .map(|channel| channel.position + 1)
        .max()
        .unwrap_or(0);

    debug!(
        %strategy,
        previous = previous.len(),
        parsed = parsed.len(),
        delete = to_delete.len(),
        retain = retained.len(),
        insert = to_insert.len(),
        "Reconciled playlist"
    );

    Reconciliation {
        to_delete,
        retained,
        to_insert,
        first_position,
    }
}

// ============================================================================
// Apply
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplyOperation {
    Delete,
    Insert,
}

impl fmt::Display for ApplyOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplyOperation::Delete => f.write_str("delete"),
            ApplyOperation::Insert => f.write_str("insert"),
        }
    }
}

/// One storage call that failed while applying a reconciliation
#[derive(Error, Debug)]
#[error("Failed to {operation} channel {url}: {source}")]
pub struct StorageApplyFailure {
    pub operation: ApplyOperation,
    pub url: String,
    #[source]
    pub source: LibraryError,
}

/// What actually reached storage
#[derive(Debug, Default)]
pub struct ApplyReport {
    pub deleted: usize,
    pub inserted: usize,
    pub failures: Vec<StorageApplyFailure>,
}

impl ApplyReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Delete then insert, one call per channel.
///
/// Earlier successful calls are not rolled back when a later one fails.
/// Cancellation is checked before every call; on cancellation the storage is
/// left as the last completed call made it.
pub async fn apply_reconciliation(
    channels: &dyn ChannelRepository,
    playlist_url: &str,
    reconciliation: &Reconciliation,
    token: &CancellationToken,
) -> Result<ApplyReport> {
    let mut report = ApplyReport::default();

    for channel in &reconciliation.to_delete {
        ensure_active(token)?;
        match channels.delete_by_url(playlist_url, &channel.url).await {
            Ok(_) => report.deleted += 1,
            Err(source) => {
                warn!(url = %channel.url, error = %source, "Failed to delete channel");
                report.failures.push(StorageApplyFailure {
                    operation: ApplyOperation::Delete,
                    url: channel.url.clone(),
                    source,
                });
            }
        }
    }

    for channel in reconciliation.new_channels(playlist_url) {
        ensure_active(token)?;
        match channels.insert(&channel).await {
            Ok(_) => report.inserted += 1,
            Err(source) => {
                warn!(url = %channel.url, error = %source, "Failed to insert channel");
                report.failures.push(StorageApplyFailure {
                    operation: ApplyOperation::Insert,
                    url: channel.url,
                    source,
                });
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_library::ChannelId;

    fn stored(id: i64, url: &str, favourite: bool, position: i64) -> Channel {
        Channel {
            id: ChannelId(id),
            playlist_url: "http://p".to_string(),
            url: url.to_string(),
            title: url.to_string(),
            group: None,
            cover: None,
            favourite,
            banned: false,
            position,
        }
    }

    fn parsed(url: &str) -> ParsedEntry {
        ParsedEntry::new(url, url)
    }

    fn urls<'a>(items: impl IntoIterator<Item = &'a str>) -> Vec<&'a str> {
        items.into_iter().collect()
    }

    #[test]
    fn test_strategy_codes() {
        assert_eq!(Strategy::from_code(0), Strategy::All);
        assert_eq!(Strategy::from_code(1), Strategy::SkipFavourite);
        assert_eq!(Strategy::from_code(2), Strategy::Keep);
        assert_eq!(Strategy::from_code(-7), Strategy::Keep);
        assert_eq!(Strategy::from_code(Strategy::SkipFavourite.code()), Strategy::SkipFavourite);
    }

    #[test]
    fn test_all_drops_missing_favourites_too() {
        let previous = vec![stored(1, "A", false, 0), stored(2, "B", true, 1)];
        let result = reconcile(&previous, &[parsed("A"), parsed("C")], Strategy::All);

        assert_eq!(urls(result.to_delete.iter().map(|c| c.url.as_str())), vec!["B"]);
        assert_eq!(urls(result.to_insert.iter().map(|e| e.url.as_str())), vec!["C"]);
        assert_eq!(urls(result.retained.iter().map(|c| c.url.as_str())), vec!["A"]);
        assert_eq!(result.first_position, 1);
    }

    #[test]
    fn test_skip_favourite_keeps_favourites() {
        let previous = vec![stored(1, "A", false, 0), stored(2, "B", true, 1)];
        let result = reconcile(
            &previous,
            &[parsed("A"), parsed("C")],
            Strategy::SkipFavourite,
        );

        assert!(result.to_delete.is_empty());
        assert_eq!(urls(result.to_insert.iter().map(|e| e.url.as_str())), vec!["C"]);
        assert_eq!(result.first_position, 2);
    }

    #[test]
    fn test_skip_favourite_does_not_duplicate_favourite() {
        let previous = vec![stored(1, "B", true, 0), stored(2, "D", false, 1)];
        let result = reconcile(&previous, &[parsed("B")], Strategy::SkipFavourite);

        assert_eq!(urls(result.to_delete.iter().map(|c| c.url.as_str())), vec!["D"]);
        assert!(result.to_insert.is_empty());
    }

    #[test]
    fn test_keep_is_noop() {
        let previous = vec![stored(1, "A", false, 0)];
        let result = reconcile(&previous, &[parsed("C")], Strategy::Keep);

        assert!(result.is_noop());
        assert!(result.retained.is_empty());
    }

    #[test]
    fn test_unchanged_parse_is_idempotent() {
        let previous = vec![stored(1, "A", false, 0), stored(2, "B", true, 1)];
        let result = reconcile(&previous, &[parsed("A"), parsed("B")], Strategy::All);

        assert!(result.is_noop());
        assert_eq!(result.retained.len(), 2);
    }

    #[test]
    fn test_duplicate_parsed_urls_collapse_to_first() {
        let mut first = parsed("C");
        first.title = "first".to_string();
        let mut second = parsed("C");
        second.title = "second".to_string();

        let result = reconcile(&[], &[first, second], Strategy::All);

        assert_eq!(result.to_insert.len(), 1);
        assert_eq!(result.to_insert[0].title, "first");
        assert_eq!(result.first_position, 0);
    }

    #[test]
    fn test_empty_parse_under_all_clears_everything() {
        let previous = vec![stored(1, "A", false, 3), stored(2, "B", true, 7)];
        let result = reconcile(&previous, &[], Strategy::All);

        assert_eq!(result.to_delete.len(), 2);
        assert_eq!(result.first_position, 0);
    }

    #[test]
    fn test_new_channels_are_numbered_sequentially() {
        let previous = vec![stored(1, "A", false, 4)];
        let result = reconcile(
            &previous,
            &[parsed("A"), parsed("X"), parsed("Y")],
            Strategy::All,
        );

        let channels = result.new_channels("http://p");
        let positions: Vec<i64> = channels.iter().map(|c| c.position).collect();
        assert_eq!(positions, vec![5, 6]);
        assert!(channels.iter().all(|c| c.playlist_url == "http://p" && !c.favourite));
    }
}
