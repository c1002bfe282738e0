use crate::reconcile::StorageApplyFailure;
use bridge_traits::error::BridgeError;
use core_library::LibraryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Playlist reference is empty")]
    EmptyReference,

    #[error("Unsupported playlist source: {reference}")]
    UnsupportedSourceKind { reference: String },

    #[error("Playlist source not found: {reference}")]
    SourceNotFound { reference: String },

    #[error("Network error fetching {url}: {message}")]
    Network { url: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed entry at line {line}: {reason}")]
    MalformedEntry { line: usize, reason: String },

    /// `line` is 1-based; 0 when the text was decoded outside a file.
    #[error("Malformed snapshot line {line}: {message}")]
    SnapshotDecode { line: usize, message: String },

    #[error("Snapshot encoding failed: {0}")]
    SnapshotEncode(#[from] serde_json::Error),

    #[error(transparent)]
    StorageApply(#[from] StorageApplyFailure),

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Work queue is closed")]
    QueueClosed,
}

impl SyncError {
    /// Attach a line number to a snapshot decode error.
    pub(crate) fn at_line(self, line_number: usize) -> Self {
        match self {
            SyncError::SnapshotDecode { message, .. } => SyncError::SnapshotDecode {
                line: line_number,
                message,
            },
            other => other,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
