//! User-facing conditions reported by the sync engine.
//!
//! Hosts localize by [`Message::id`]; the `Display` text is an English
//! fallback for logs and tooling.

use core_runtime::events::SnapshotOperation;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Message {
    EmptyTitle,
    EmptyUrl,
    /// No file was picked from local storage
    EmptyFile,
    Enqueued,
    BackingUp,
    Restoring,
    /// The source could not be reached or did not answer
    WrongUrl,
    UnsupportedUrl,
    FileNotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageSeverity {
    Info,
    Warning,
    Error,
}

impl Message {
    /// Stable identifier
    pub fn id(&self) -> &'static str {
        match self {
            Message::EmptyTitle => "empty_title",
            Message::EmptyUrl => "empty_url",
            Message::EmptyFile => "empty_file",
            Message::Enqueued => "enqueued",
            Message::BackingUp => "backing_up",
            Message::Restoring => "restoring",
            Message::WrongUrl => "wrong_url",
            Message::UnsupportedUrl => "unsupported_url",
            Message::FileNotFound => "file_not_found",
        }
    }

    pub fn severity(&self) -> MessageSeverity {
        match self {
            Message::Enqueued | Message::BackingUp | Message::Restoring => MessageSeverity::Info,
            Message::EmptyTitle | Message::EmptyUrl | Message::EmptyFile => {
                MessageSeverity::Warning
            }
            Message::WrongUrl | Message::UnsupportedUrl | Message::FileNotFound => {
                MessageSeverity::Error
            }
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        [
            Message::EmptyTitle,
            Message::EmptyUrl,
            Message::EmptyFile,
            Message::Enqueued,
            Message::BackingUp,
            Message::Restoring,
            Message::WrongUrl,
            Message::UnsupportedUrl,
            Message::FileNotFound,
        ]
        .into_iter()
        .find(|message| message.id() == id)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Message::EmptyTitle => "Title cannot be empty",
            Message::EmptyUrl => "URL cannot be empty",
            Message::EmptyFile => "No file selected",
            Message::Enqueued => "Subscription queued",
            Message::BackingUp => "Backing up playlists",
            Message::Restoring => "Restoring playlists",
            Message::WrongUrl => "Could not load the playlist from this URL",
            Message::UnsupportedUrl => "This kind of URL is not supported",
            Message::FileNotFound => "Playlist file not found",
        };
        f.write_str(text)
    }
}

impl From<SnapshotOperation> for Message {
    fn from(operation: SnapshotOperation) -> Self {
        match operation {
            SnapshotOperation::Backup => Message::BackingUp,
            SnapshotOperation::Restore => Message::Restoring,
        }
    }
}
