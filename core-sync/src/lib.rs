//! # Playlist Sync Module
//!
//! Subscribes to M3U playlists and keeps the stored channel list in step
//! with its source.
//!
//! ## Overview
//!
//! A subscribe job resolves a playlist reference, streams the source through
//! the M3U parser, and reconciles the parsed entries with the channels
//! already stored for that playlist. Jobs run on a bounded work queue and a
//! newer request for the same reference cancels the older one.
//!
//! ## Components
//!
//! - **Parser** (`parser`): Streaming extended-M3U reader
//! - **Reconciliation** (`reconcile`): Refresh strategies and the storage apply step
//! - **Source Resolver** (`source`): Network, file and picked-content references
//! - **Snapshot Codec** (`snapshot`): Line-tagged backup and restore
//! - **Work Queue** (`work`): Bounded, tag-cancellable job runner
//! - **Service** (`service`): Host-facing façade tying the above together
//! - **Messages** (`message`): User-facing conditions with stable ids

pub mod error;
pub mod message;
pub mod parser;
pub mod reconcile;
pub mod service;
pub mod snapshot;
pub mod source;
pub mod work;

pub use error::{Result, SyncError};
pub use message::{Message, MessageSeverity};
pub use parser::{M3uParser, ParsedEntries, ParsedEntry};
pub use reconcile::{
    apply_reconciliation, reconcile, ApplyOperation, ApplyReport, Reconciliation,
    StorageApplyFailure, Strategy,
};
pub use service::{
    PlaylistSyncService, SubscribeProgress, SubscribeRequest, SubscribeSummary,
    SubscriptionHandle,
};
pub use snapshot::{BackupReport, RestoreReport, SnapshotRecord};
pub use source::{derive_title, ResolvedSource, SourceKind, SourceResolver};
pub use work::{checkpoint, ensure_active, JobContext, JobId, TaskHandle, WorkQueue};
