//! # Snapshot Codec
//!
//! Line-oriented backup format for playlists and their channels.
//!
//! ```text
//! PLAYLIST|{"url":"http://host/tv.m3u","title":"TV","from_local":false}
//! CHANNEL|{"playlist_url":"http://host/tv.m3u","url":"http://s/1","title":"One",...}
//! ```
//!
//! One compact JSON record per line, each followed by `\n`, no header. A
//! playlist line precedes the lines of its channels. Playlists read from
//! local files are left out since their source does not travel with the
//! backup.
//!
//! Decoding is lenient where it can be: blank lines and lines without a
//! known tag are ignored, and unknown JSON keys are dropped. Channel ids are
//! not written; restore matches channels by `(playlist_url, url)`.

use crate::work::{checkpoint, ensure_active};
use crate::{Result, SyncError};
use core_async::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use core_async::sync::CancellationToken;
use core_library::{ChannelRepository, NewChannel, Playlist, PlaylistRepository, PlaylistWithChannels};
use core_runtime::MalformedLinePolicy;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub const PLAYLIST_TAG: &str = "PLAYLIST";
pub const CHANNEL_TAG: &str = "CHANNEL";
const SEPARATOR: char = '|';

/// One decoded backup line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotRecord {
    Playlist(Playlist),
    Channel(NewChannel),
}

impl SnapshotRecord {
    pub fn tag(&self) -> &'static str {
        match self {
            SnapshotRecord::Playlist(_) => PLAYLIST_TAG,
            SnapshotRecord::Channel(_) => CHANNEL_TAG,
        }
    }

    /// Encode as a single line, without the trailing newline.
    pub fn encode(&self) -> Result<String> {
        let json = match self {
            SnapshotRecord::Playlist(playlist) => serde_json::to_string(playlist)?,
            SnapshotRecord::Channel(channel) => serde_json::to_string(channel)?,
        };
        Ok(format!("{}{}{}", self.tag(), SEPARATOR, json))
    }
}

/// Counts from a finished backup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupReport {
    pub playlists: u64,
    pub channels: u64,
}

/// Counts from a finished restore
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreReport {
    pub playlists: u64,
    pub channels: u64,
    /// Lines that could not be decoded
    pub skipped: u64,
    /// Decoded records that storage rejected
    pub failed: u64,
}

// ============================================================================
// Encoding
// ============================================================================

/// Records for every non-local playlist, each followed by its channels.
pub fn records(playlists: &[PlaylistWithChannels]) -> impl Iterator<Item = SnapshotRecord> + '_ {
    playlists
        .iter()
        .filter(|entry| !entry.playlist.from_local)
        .flat_map(|entry| {
            std::iter::once(SnapshotRecord::Playlist(entry.playlist.clone())).chain(
                entry
                    .channels
                    .iter()
                    .map(|channel| SnapshotRecord::Channel(NewChannel::from(channel.clone()))),
            )
        })
}

/// Encoded lines for every non-local playlist and its channels.
pub fn encode_all(playlists: &[PlaylistWithChannels]) -> impl Iterator<Item = String> + '_ {
    records(playlists).filter_map(|record| match record.encode() {
        Ok(line) => Some(line),
        Err(e) => {
            warn!(tag = record.tag(), error = %e, "Dropping record that failed to encode");
            None
        }
    })
}

/// Write every non-local playlist to `writer`, flushing at the end.
pub async fn write_backup<W>(
    playlists: &dyn PlaylistRepository,
    writer: &mut W,
    token: &CancellationToken,
) -> Result<BackupReport>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let all = playlists.get_all_with_channels().await?;
    let mut report = BackupReport::default();

    for record in records(&all) {
        ensure_active(token)?;

        let mut line = record.encode()?;
        line.push('\n');
        checkpoint(token, writer.write_all(line.as_bytes())).await??;

        match record {
            SnapshotRecord::Playlist(_) => report.playlists += 1,
            SnapshotRecord::Channel(_) => report.channels += 1,
        }
    }

    checkpoint(token, writer.flush()).await??;

    info!(
        playlists = report.playlists,
        channels = report.channels,
        "Backup written"
    );
    Ok(report)
}

// ============================================================================
// Decoding
// ============================================================================

/// Decode one backup line.
///
/// Returns `Ok(None)` for blank lines and lines without a known tag.
///
/// # Errors
///
/// [`SyncError::SnapshotDecode`] when a known tag carries JSON that does not
/// describe the tagged record.
pub fn decode_line(text: &str) -> Result<Option<SnapshotRecord>> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }

    let Some((tag, json)) = text.split_once(SEPARATOR) else {
        return Ok(None);
    };

    let decode_error = |e: serde_json::Error| SyncError::SnapshotDecode {
        line: 0,
        message: format!("{} record: {}", tag, e),
    };

    match tag {
        PLAYLIST_TAG => {
            let playlist: Playlist = serde_json::from_str(json).map_err(decode_error)?;
            Ok(Some(SnapshotRecord::Playlist(playlist)))
        }
        CHANNEL_TAG => {
            let channel: NewChannel = serde_json::from_str(json).map_err(decode_error)?;
            Ok(Some(SnapshotRecord::Channel(channel)))
        }
        _ => Ok(None),
    }
}

/// Restore records from `reader` in file order.
///
/// Playlists are inserted or replaced by URL; channels are upserted by
/// `(playlist_url, url)`. Under [`MalformedLinePolicy::Skip`] bad lines and
/// rejected records are counted and skipped; under
/// [`MalformedLinePolicy::Abort`] the first one ends the restore. Read
/// errors always end it.
pub async fn read_backup<R>(
    reader: &mut R,
    playlists: &dyn PlaylistRepository,
    channels: &dyn ChannelRepository,
    policy: MalformedLinePolicy,
    token: &CancellationToken,
) -> Result<RestoreReport>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let mut report = RestoreReport::default();
    let mut buf = Vec::new();
    let mut line_number = 0usize;

    loop {
        buf.clear();
        let read = checkpoint(token, reader.read_until(b'\n', &mut buf)).await??;
        if read == 0 {
            break;
        }
        line_number += 1;

        let text = String::from_utf8_lossy(&buf);
        let record = match decode_line(&text) {
            Ok(Some(record)) => record,
            Ok(None) => continue,
            Err(e) => {
                let e = e.at_line(line_number);
                match policy {
                    MalformedLinePolicy::Abort => return Err(e),
                    MalformedLinePolicy::Skip => {
                        warn!(line = line_number, error = %e, "Skipping malformed backup line");
                        report.skipped += 1;
                        continue;
                    }
                }
            }
        };

        let stored = match &record {
            SnapshotRecord::Playlist(playlist) => playlists.insert_or_replace(playlist).await,
            SnapshotRecord::Channel(channel) => channels.upsert(channel).await.map(|_| ()),
        };

        match stored {
            Ok(()) => match record {
                SnapshotRecord::Playlist(_) => report.playlists += 1,
                SnapshotRecord::Channel(_) => report.channels += 1,
            },
            Err(e) => match policy {
                MalformedLinePolicy::Abort => return Err(e.into()),
                MalformedLinePolicy::Skip => {
                    warn!(line = line_number, error = %e, "Backup record rejected by storage");
                    report.failed += 1;
                }
            },
        }
    }

    debug!(lines = line_number, "Backup fully read");
    info!(
        playlists = report.playlists,
        channels = report.channels,
        skipped = report.skipped,
        failed = report.failed,
        "Backup restored"
    );
    Ok(report)
}
