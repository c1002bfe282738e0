//! # Event Bus System
//!
//! Broadcasts typed events between the playlist core and its host using
//! `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! - **Event Types**: one enum per domain, wrapped by [`CoreEvent`]
//! - **EventBus**: the broadcast channel jobs publish to
//! - **EventStream**: a receiver wrapper with an optional predicate
//!
//! ```text
//! ┌──────────────────┐  emit   ┌───────────┐  subscribe  ┌────────────┐
//! │ Subscription job ├────────>│           ├────────────>│ Subscriber │
//! └──────────────────┘         │ EventBus  │             └────────────┘
//! ┌──────────────────┐  emit   │           │  subscribe  ┌────────────┐
//! │ Backup / restore ├────────>│           ├────────────>│ Subscriber │
//! └──────────────────┘         └───────────┘             └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, SubscriptionEvent};
//!
//! let event_bus = EventBus::new(100);
//! let mut subscriber = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Subscription(SubscriptionEvent::Started {
//!         job_id: "job-1".to_string(),
//!         url: "https://example.com/list.m3u".to_string(),
//!         strategy: "all".to_string(),
//!     }))
//!     .ok();
//!
//! assert!(subscriber.try_recv().is_ok());
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber fell `n` events behind. Non-fatal.
//! - **`RecvError::Closed`**: every sender was dropped; treat as shutdown.
//!
//! Publishing with no subscribers returns an error; emitters call `.ok()` on it.

use core_async::sync::broadcast;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use core_async::sync::broadcast::error::{RecvError, SendError};
pub use core_async::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Playlist fetch, parse and reconcile jobs
    Subscription(SubscriptionEvent),
    /// Backup and restore jobs
    Snapshot(SnapshotEvent),
    /// Direct edits to stored playlists and channels
    Library(LibraryEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Subscription(e) => e.description(),
            CoreEvent::Snapshot(e) => e.description(),
            CoreEvent::Library(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Subscription(SubscriptionEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Snapshot(SnapshotEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Subscription(SubscriptionEvent::Completed { failures, .. })
                if *failures > 0 =>
            {
                EventSeverity::Warning
            }
            CoreEvent::Snapshot(SnapshotEvent::RestoreCompleted { skipped, failed, .. })
                if *skipped + *failed > 0 =>
            {
                EventSeverity::Warning
            }
            CoreEvent::Subscription(SubscriptionEvent::Completed { .. })
            | CoreEvent::Subscription(SubscriptionEvent::Empty { .. })
            | CoreEvent::Snapshot(SnapshotEvent::BackupCompleted { .. })
            | CoreEvent::Snapshot(SnapshotEvent::RestoreCompleted { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Subscription Events
// ============================================================================

/// Lifecycle of a single subscribe job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SubscriptionEvent {
    Started {
        job_id: String,
        /// Reference as the caller supplied it.
        url: String,
        strategy: String,
    },
    /// Reconciliation applied.
    Completed {
        job_id: String,
        /// Resolved playlist URL.
        url: String,
        inserted: u64,
        deleted: u64,
        retained: u64,
        /// Individual storage operations that failed.
        failures: u64,
    },
    /// The source produced no channels (non-2xx response or empty list).
    Empty { job_id: String, url: String },
    Failed {
        job_id: String,
        url: String,
        message: String,
    },
    Cancelled { job_id: String, url: String },
}

impl SubscriptionEvent {
    fn description(&self) -> &str {
        match self {
            SubscriptionEvent::Started { .. } => "Subscription started",
            SubscriptionEvent::Completed { .. } => "Subscription completed",
            SubscriptionEvent::Empty { .. } => "Subscription produced no channels",
            SubscriptionEvent::Failed { .. } => "Subscription failed",
            SubscriptionEvent::Cancelled { .. } => "Subscription cancelled",
        }
    }
}

// ============================================================================
// Snapshot Events
// ============================================================================

/// Which side of the snapshot codec a job runs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotOperation {
    Backup,
    Restore,
}

impl SnapshotOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotOperation::Backup => "backup",
            SnapshotOperation::Restore => "restore",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SnapshotEvent {
    Started {
        job_id: String,
        operation: SnapshotOperation,
    },
    BackupCompleted {
        job_id: String,
        playlists: u64,
        channels: u64,
    },
    RestoreCompleted {
        job_id: String,
        playlists: u64,
        channels: u64,
        /// Lines that could not be decoded.
        skipped: u64,
        /// Decoded records the store rejected.
        failed: u64,
    },
    Failed {
        job_id: String,
        operation: SnapshotOperation,
        message: String,
    },
    Cancelled {
        job_id: String,
        operation: SnapshotOperation,
    },
}

impl SnapshotEvent {
    fn description(&self) -> &str {
        match self {
            SnapshotEvent::Started { operation, .. } => match operation {
                SnapshotOperation::Backup => "Backup started",
                SnapshotOperation::Restore => "Restore started",
            },
            SnapshotEvent::BackupCompleted { .. } => "Backup completed",
            SnapshotEvent::RestoreCompleted { .. } => "Restore completed",
            SnapshotEvent::Failed { .. } => "Snapshot operation failed",
            SnapshotEvent::Cancelled { .. } => "Snapshot operation cancelled",
        }
    }
}

// ============================================================================
// Library Events
// ============================================================================

/// Edits applied outside a subscribe job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum LibraryEvent {
    PlaylistUnsubscribed { url: String },
    PlaylistRenamed { url: String, title: String },
    /// A picked content reference was materialized to a durable file.
    PlaylistRelocated { from: String, to: String },
    ChannelFavouriteChanged { channel_id: i64, favourite: bool },
    ChannelBanChanged { channel_id: i64, banned: bool },
}

impl LibraryEvent {
    fn description(&self) -> &str {
        match self {
            LibraryEvent::PlaylistUnsubscribed { .. } => "Playlist unsubscribed",
            LibraryEvent::PlaylistRenamed { .. } => "Playlist renamed",
            LibraryEvent::PlaylistRelocated { .. } => "Playlist moved to durable storage",
            LibraryEvent::ChannelFavouriteChanged { .. } => "Channel favourite changed",
            LibraryEvent::ChannelBanChanged { .. } => "Channel ban changed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central broadcast channel for [`CoreEvent`]s.
///
/// Cloning the bus clones the sender; every clone publishes to the same
/// subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// A subscriber that falls behind by more than `capacity` events receives
    /// `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// when there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with an optional predicate.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let snapshots = EventStream::new(event_bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Snapshot(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive a matching event without waiting.
    ///
    /// Returns `None` if no matching events are currently buffered.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn started(job: &str) -> CoreEvent {
        CoreEvent::Subscription(SubscriptionEvent::Started {
            job_id: job.to_string(),
            url: "https://example.com/list.m3u".to_string(),
            strategy: "all".to_string(),
        })
    }

    #[test]
    fn test_emission_without_subscribers_errors() {
        let bus = EventBus::new(10);
        assert!(bus.emit(started("job-1")).is_err());
    }

    #[core_async::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        let event = started("job-1");
        assert_eq!(bus.emit(event.clone()).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[core_async::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::Snapshot(_)));

        bus.emit(started("job-1")).ok();
        let backup = CoreEvent::Snapshot(SnapshotEvent::BackupCompleted {
            job_id: "job-2".to_string(),
            playlists: 2,
            channels: 40,
        });
        bus.emit(backup.clone()).ok();

        assert_eq!(stream.recv().await.unwrap(), backup);
        assert!(stream.try_recv().is_none());
    }

    #[core_async::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for i in 0..5 {
            bus.emit(started(&format!("job-{}", i))).ok();
        }

        assert!(matches!(sub.recv().await, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn test_event_severity() {
        let failed = CoreEvent::Subscription(SubscriptionEvent::Failed {
            job_id: "job-1".to_string(),
            url: "http://x".to_string(),
            message: "boom".to_string(),
        });
        let partial = CoreEvent::Subscription(SubscriptionEvent::Completed {
            job_id: "job-1".to_string(),
            url: "http://x".to_string(),
            inserted: 3,
            deleted: 1,
            retained: 4,
            failures: 1,
        });
        let clean_restore = CoreEvent::Snapshot(SnapshotEvent::RestoreCompleted {
            job_id: "job-2".to_string(),
            playlists: 1,
            channels: 1,
            skipped: 0,
            failed: 0,
        });

        assert_eq!(failed.severity(), EventSeverity::Error);
        assert_eq!(partial.severity(), EventSeverity::Warning);
        assert_eq!(clean_restore.severity(), EventSeverity::Info);
        assert_eq!(started("job-3").severity(), EventSeverity::Debug);
    }

    #[test]
    fn test_event_description() {
        let event = CoreEvent::Snapshot(SnapshotEvent::Started {
            job_id: "job-1".to_string(),
            operation: SnapshotOperation::Restore,
        });
        assert_eq!(event.description(), "Restore started");
    }

    #[test]
    fn test_event_serialization_shape() {
        let event = CoreEvent::Library(LibraryEvent::ChannelBanChanged {
            channel_id: 7,
            banned: true,
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "Library");
        assert_eq!(json["payload"]["event"], "ChannelBanChanged");

        let back: CoreEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
