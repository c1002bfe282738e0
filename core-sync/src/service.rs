//! # Playlist Sync Service
//!
//! Host-facing entry point: subscribe to playlists, refresh them, edit the
//! library, and back it up or restore it.
//!
//! ## Overview
//!
//! A subscribe request is validated synchronously. Invalid requests never
//! reach the queue; their [`SubscriptionHandle`] yields a single
//! [`SubscribeProgress::Message`]. Valid requests cancel any job already
//! running for the same reference and are queued on the shared
//! [`WorkQueue`]. The job then runs these steps in order:
//!
//! 1. resolve the reference (copying picked content into app storage)
//! 2. open and parse the source
//! 3. insert or replace the playlist row
//! 4. read the stored channels and reconcile them with the parse
//! 5. apply deletes, then inserts
//!
//! Progress goes to the handle and lifecycle events go to the [`EventBus`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! let service = PlaylistSyncService::open(&config).await?;
//! let handle = service
//!     .subscribe("News", "https://example.com/news.m3u", Strategy::SkipFavourite)
//!     .await;
//! match handle.finish().await {
//!     SubscribeProgress::Success(summary) => println!("{} new", summary.inserted),
//!     other => println!("{:?}", other),
//! }
//! ```

use crate::message::Message;
use crate::parser::{M3uParser, ParsedEntry};
use crate::reconcile::{apply_reconciliation, reconcile, StorageApplyFailure, Strategy};
use crate::snapshot::{read_backup, write_backup, BackupReport, RestoreReport};
use crate::source::{derive_title, SourceReader, SourceResolver};
use crate::work::{checkpoint, ensure_active, JobContext, JobId, TaskHandle, WorkQueue};
use crate::{Result, SyncError};
use bridge_traits::storage::FileSystemAccess;
use bridge_traits::time::Clock;
use core_async::io::{AsyncRead, AsyncWrite, BufReader, BufWriter};
use core_async::sync::{mpsc, CancellationToken};
use core_library::db::{create_pool, DatabaseConfig};
use core_library::{
    Channel, ChannelId, ChannelRepository, Playlist, PlaylistRepository, PlaylistWithChannels,
    SqliteChannelRepository, SqlitePlaylistRepository,
};
use core_runtime::events::{LibraryEvent, SnapshotEvent, SnapshotOperation, SubscriptionEvent};
use core_runtime::logging::redact_url;
use core_runtime::{CoreConfig, CoreEvent, EventBus, MalformedLinePolicy};
use futures::StreamExt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

const BACKUP_TAG: &str = "backup";
const RESTORE_TAG: &str = "restore";
const PROGRESS_BUFFER: usize = 8;

// ============================================================================
// Requests and Progress
// ============================================================================

/// A subscribe or refresh request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeRequest {
    pub title: String,
    pub reference: String,
    /// `None` uses the configured default
    pub strategy: Option<Strategy>,
    /// The reference came from a local file picker rather than a text field
    pub local_pick: bool,
}

impl SubscribeRequest {
    pub fn new(title: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            reference: reference.into(),
            strategy: None,
            local_pick: false,
        }
    }

    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn local_pick(mut self) -> Self {
        self.local_pick = true;
        self
    }

    /// Message for the first missing input, if any.
    pub fn validate(&self) -> Option<Message> {
        if self.title.trim().is_empty() {
            Some(Message::EmptyTitle)
        } else if self.reference.trim().is_empty() {
            Some(if self.local_pick {
                Message::EmptyFile
            } else {
                Message::EmptyUrl
            })
        } else {
            None
        }
    }
}

/// What reached storage in a finished subscribe
#[derive(Debug)]
pub struct SubscribeSummary {
    pub playlist: Playlist,
    pub parsed: usize,
    pub inserted: usize,
    pub deleted: usize,
    pub retained: usize,
    pub failures: Vec<StorageApplyFailure>,
}

/// Progress of one subscribe job
#[derive(Debug)]
pub enum SubscribeProgress {
    Loading,
    Success(SubscribeSummary),
    /// The source produced no channels
    Empty,
    /// A condition the user can act on
    Message(Message),
    Failed(String),
    Cancelled,
}

impl SubscribeProgress {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SubscribeProgress::Loading)
    }
}

/// Handle to a submitted subscribe request
#[derive(Debug)]
pub struct SubscriptionHandle {
    task: Option<TaskHandle<()>>,
    progress: mpsc::Receiver<SubscribeProgress>,
}

impl SubscriptionHandle {
    fn rejected(progress: SubscribeProgress) -> Self {
        let (tx, rx) = mpsc::channel(1);
        tx.try_send(progress).ok();
        Self {
            task: None,
            progress: rx,
        }
    }

    /// Id of the queued job; `None` when the request was rejected up front.
    pub fn job_id(&self) -> Option<JobId> {
        self.task.as_ref().map(TaskHandle::id)
    }

    /// `Enqueued` once the request reached the queue.
    pub fn notice(&self) -> Option<Message> {
        self.task.as_ref().map(|_| Message::Enqueued)
    }

    pub fn cancel(&self) {
        if let Some(task) = &self.task {
            task.cancel();
        }
    }

    /// Next progress update, `None` once the job is gone.
    pub async fn recv(&mut self) -> Option<SubscribeProgress> {
        self.progress.recv().await
    }

    /// Wait for the terminal state.
    ///
    /// A job that disappears without reporting one counts as cancelled.
    pub async fn finish(mut self) -> SubscribeProgress {
        while let Some(progress) = self.progress.recv().await {
            if progress.is_terminal() {
                return progress;
            }
        }
        SubscribeProgress::Cancelled
    }
}

// ============================================================================
// Service
// ============================================================================

struct ServiceInner {
    resolver: SourceResolver,
    playlists: Arc<dyn PlaylistRepository>,
    channels: Arc<dyn ChannelRepository>,
    file_system: Arc<dyn FileSystemAccess>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    queue: WorkQueue,
    parser: M3uParser,
    default_strategy: Strategy,
    malformed_line_policy: MalformedLinePolicy,
}

/// Playlist subscription and library service
#[derive(Clone)]
pub struct PlaylistSyncService {
    inner: Arc<ServiceInner>,
}

impl PlaylistSyncService {
    pub fn new(
        config: &CoreConfig,
        playlists: Arc<dyn PlaylistRepository>,
        channels: Arc<dyn ChannelRepository>,
        events: EventBus,
    ) -> Self {
        let default_strategy = Strategy::from_code(config.default_strategy_code);
        info!(
            workers = config.worker_pool_size,
            strategy = %default_strategy,
            "Playlist sync service ready"
        );

        Self {
            inner: Arc::new(ServiceInner {
                resolver: SourceResolver::new(config, Arc::clone(&playlists)),
                playlists,
                channels,
                file_system: Arc::clone(&config.file_system),
                clock: Arc::clone(&config.clock),
                events,
                queue: WorkQueue::new(config.worker_pool_size),
                parser: M3uParser::new(),
                default_strategy,
                malformed_line_policy: config.malformed_line_policy,
            }),
        }
    }

    /// Open the SQLite database named by `config` and build the service on it.
    pub async fn open(config: &CoreConfig) -> Result<Self> {
        if let Some(parent) = config.database_path.parent() {
            if !parent.as_os_str().is_empty() {
                config.file_system.create_dir_all(parent).await?;
            }
        }

        let pool = create_pool(DatabaseConfig::new(&config.database_path)).await?;
        let playlists: Arc<dyn PlaylistRepository> =
            Arc::new(SqlitePlaylistRepository::new(pool.clone()));
        let channels: Arc<dyn ChannelRepository> = Arc::new(SqliteChannelRepository::new(pool));

        Ok(Self::new(
            config,
            playlists,
            channels,
            EventBus::new(config.event_buffer_size),
        ))
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn default_strategy(&self) -> Strategy {
        self.inner.default_strategy
    }

    /// Title suggestion for a pasted or picked reference.
    pub fn suggest_title(&self, reference: &str) -> String {
        derive_title(reference, self.inner.clock.as_ref())
    }

    // ------------------------------------------------------------------------
    // Subscribe
    // ------------------------------------------------------------------------

    /// Subscribe to, or refresh, the playlist at `reference`.
    pub async fn subscribe(
        &self,
        title: &str,
        reference: &str,
        strategy: Strategy,
    ) -> SubscriptionHandle {
        self.submit(SubscribeRequest::new(title, reference).strategy(strategy))
            .await
    }

    /// Validate and queue `request`.
    pub async fn submit(&self, request: SubscribeRequest) -> SubscriptionHandle {
        if let Some(message) = request.validate() {
            debug!(message = message.id(), "Subscribe request rejected");
            return SubscriptionHandle::rejected(SubscribeProgress::Message(message));
        }

        let request = SubscribeRequest {
            title: request.title.trim().to_string(),
            reference: request.reference.trim().to_string(),
            ..request
        };
        let strategy = request.strategy.unwrap_or(self.inner.default_strategy);
        let tag = request.reference.clone();

        let superseded = self.inner.queue.cancel_by_tag(&tag).await;
        if superseded > 0 {
            debug!(
                reference = %redact_url(&tag),
                superseded,
                "Cancelled earlier subscribe for the same reference"
            );
        }

        let (tx, rx) = mpsc::channel(PROGRESS_BUFFER);
        let inner = Arc::clone(&self.inner);
        let queued = self
            .inner
            .queue
            .enqueue(tag, move |ctx| inner.run_subscribe(request, strategy, tx, ctx))
            .await;

        match queued {
            Ok(task) => SubscriptionHandle {
                task: Some(task),
                progress: rx,
            },
            Err(e) => {
                warn!(error = %e, "Subscribe request not queued");
                SubscriptionHandle::rejected(SubscribeProgress::Failed(e.to_string()))
            }
        }
    }

    // ------------------------------------------------------------------------
    // Library
    // ------------------------------------------------------------------------

    pub async fn playlists(&self) -> Result<Vec<Playlist>> {
        Ok(self.inner.playlists.get_all().await?)
    }

    pub async fn playlist_with_channels(&self, url: &str) -> Result<Option<PlaylistWithChannels>> {
        Ok(self.inner.playlists.get_with_channels(url).await?)
    }

    /// Remove a playlist and its channels, returning what was removed.
    ///
    /// A subscribe still running for `url` is cancelled first.
    #[instrument(skip(self, url), fields(url = %redact_url(url)))]
    pub async fn unsubscribe(&self, url: &str) -> Result<Option<Playlist>> {
        self.inner.queue.cancel_by_tag(url).await;

        let Some(playlist) = self.inner.playlists.get_by_url(url).await? else {
            debug!("Nothing to unsubscribe");
            return Ok(None);
        };

        let channels = self.inner.channels.delete_by_playlist_url(url).await?;
        self.inner.playlists.delete(url).await?;

        info!(channels, "Playlist unsubscribed");
        self.inner.emit(CoreEvent::Library(LibraryEvent::PlaylistUnsubscribed {
            url: url.to_string(),
        }));
        Ok(Some(playlist))
    }

    /// Rename a playlist. Failures are logged, not returned.
    pub async fn rename(&self, url: &str, title: &str) {
        let title = title.trim();
        if title.is_empty() {
            warn!(url = %redact_url(url), "Ignoring rename to an empty title");
            return;
        }

        match self.inner.playlists.rename(url, title).await {
            Ok(true) => {
                self.inner.emit(CoreEvent::Library(LibraryEvent::PlaylistRenamed {
                    url: url.to_string(),
                    title: title.to_string(),
                }));
            }
            Ok(false) => warn!(url = %redact_url(url), "Rename target not found"),
            Err(e) => warn!(url = %redact_url(url), error = %e, "Rename failed"),
        }
    }

    pub async fn set_favourite(&self, id: ChannelId, favourite: bool) -> Result<bool> {
        let updated = self.inner.channels.set_favourite(id, favourite).await?;
        if updated {
            self.inner.emit(CoreEvent::Library(LibraryEvent::ChannelFavouriteChanged {
                channel_id: id.0,
                favourite,
            }));
        }
        Ok(updated)
    }

    pub async fn set_banned(&self, id: ChannelId, banned: bool) -> Result<bool> {
        let updated = self.inner.channels.set_banned(id, banned).await?;
        if updated {
            self.inner.emit(CoreEvent::Library(LibraryEvent::ChannelBanChanged {
                channel_id: id.0,
                banned,
            }));
        }
        Ok(updated)
    }

    pub async fn banned_channels(&self) -> Result<Vec<Channel>> {
        Ok(self.inner.channels.find_banned().await?)
    }

    // ------------------------------------------------------------------------
    // Backup / Restore
    // ------------------------------------------------------------------------

    /// Write every non-local playlist to `writer`.
    ///
    /// Starting a backup cancels the one already running.
    pub async fn backup<W>(&self, writer: W) -> Result<TaskHandle<BackupReport>>
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        self.inner.queue.cancel_by_tag(BACKUP_TAG).await;

        let inner = Arc::clone(&self.inner);
        self.inner
            .queue
            .enqueue(BACKUP_TAG, move |ctx| async move {
                let mut writer = writer;
                inner.snapshot_started(&ctx, SnapshotOperation::Backup);
                let result = write_backup(inner.playlists.as_ref(), &mut writer, &ctx.token).await;
                if let Ok(report) = &result {
                    inner.emit(CoreEvent::Snapshot(SnapshotEvent::BackupCompleted {
                        job_id: ctx.id.to_string(),
                        playlists: report.playlists,
                        channels: report.channels,
                    }));
                }
                inner.snapshot_finished(&ctx, SnapshotOperation::Backup, result)
            })
            .await
    }

    /// Restore playlists and channels from `reader`.
    ///
    /// Starting a restore cancels the one already running.
    pub async fn restore<R>(&self, reader: R) -> Result<TaskHandle<RestoreReport>>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        self.inner.queue.cancel_by_tag(RESTORE_TAG).await;

        let inner = Arc::clone(&self.inner);
        self.inner
            .queue
            .enqueue(RESTORE_TAG, move |ctx| async move {
                let mut reader = BufReader::new(reader);
                inner.snapshot_started(&ctx, SnapshotOperation::Restore);
                let result = read_backup(
                    &mut reader,
                    inner.playlists.as_ref(),
                    inner.channels.as_ref(),
                    inner.malformed_line_policy,
                    &ctx.token,
                )
                .await;
                if let Ok(report) = &result {
                    inner.emit(CoreEvent::Snapshot(SnapshotEvent::RestoreCompleted {
                        job_id: ctx.id.to_string(),
                        playlists: report.playlists,
                        channels: report.channels,
                        skipped: report.skipped,
                        failed: report.failed,
                    }));
                }
                inner.snapshot_finished(&ctx, SnapshotOperation::Restore, result)
            })
            .await
    }

    /// Back up into a file, replacing its content.
    pub async fn backup_to_file(&self, path: &Path) -> Result<TaskHandle<BackupReport>> {
        let stream = self.inner.file_system.open_write_stream(path).await?;
        self.backup(BufWriter::new(stream)).await
    }

    /// Restore from a file.
    pub async fn restore_from_file(&self, path: &Path) -> Result<TaskHandle<RestoreReport>> {
        let stream = self.inner.file_system.open_read_stream(path).await?;
        self.restore(stream).await
    }

    /// Cancel every job and stop accepting new ones.
    pub async fn shutdown(&self) {
        info!("Shutting down playlist sync service");
        self.inner.queue.shutdown().await;
    }
}

// ============================================================================
// Jobs
// ============================================================================

impl ServiceInner {
    fn emit(&self, event: CoreEvent) {
        self.events.emit(event).ok();
    }

    async fn run_subscribe(
        self: Arc<Self>,
        request: SubscribeRequest,
        strategy: Strategy,
        progress: mpsc::Sender<SubscribeProgress>,
        ctx: JobContext,
    ) -> Result<()> {
        let job_id = ctx.id.to_string();
        let reference = request.reference.clone();

        progress.send(SubscribeProgress::Loading).await.ok();
        self.emit(CoreEvent::Subscription(SubscriptionEvent::Started {
            job_id: job_id.clone(),
            url: reference.clone(),
            strategy: strategy.as_str().to_string(),
        }));

        let result = self.sync_playlist(&request, strategy, &ctx.token).await;

        let (terminal, outcome) = match result {
            Ok(summary) => {
                let url = summary.playlist.url.clone();
                if summary.parsed == 0 {
                    info!(
                        url = %redact_url(&url),
                        deleted = summary.deleted,
                        "Playlist source produced no channels"
                    );
                    self.emit(CoreEvent::Subscription(SubscriptionEvent::Empty {
                        job_id,
                        url,
                    }));
                    (SubscribeProgress::Empty, Ok(()))
                } else {
                    self.emit(CoreEvent::Subscription(SubscriptionEvent::Completed {
                        job_id,
                        url,
                        inserted: summary.inserted as u64,
                        deleted: summary.deleted as u64,
                        retained: summary.retained as u64,
                        failures: summary.failures.len() as u64,
                    }));
                    (SubscribeProgress::Success(summary), Ok(()))
                }
            }
            Err(SyncError::Cancelled) => {
                info!(reference = %redact_url(&reference), "Subscribe cancelled");
                self.emit(CoreEvent::Subscription(SubscriptionEvent::Cancelled {
                    job_id,
                    url: reference,
                }));
                (SubscribeProgress::Cancelled, Err(SyncError::Cancelled))
            }
            Err(e) => {
                let terminal = match user_message(&e) {
                    Some(message) => {
                        warn!(
                            reference = %redact_url(&reference),
                            error = %e,
                            "Subscribe failed"
                        );
                        SubscribeProgress::Message(message)
                    }
                    None => {
                        error!(
                            reference = %redact_url(&reference),
                            error = %e,
                            "Subscribe failed"
                        );
                        SubscribeProgress::Failed(e.to_string())
                    }
                };
                self.emit(CoreEvent::Subscription(SubscriptionEvent::Failed {
                    job_id,
                    url: reference,
                    message: e.to_string(),
                }));
                (terminal, Err(e))
            }
        };

        progress.send(terminal).await.ok();
        outcome
    }

    #[instrument(
        skip(self, request, strategy, token),
        fields(reference = %redact_url(&request.reference), strategy = %strategy)
    )]
    async fn sync_playlist(
        &self,
        request: &SubscribeRequest,
        strategy: Strategy,
        token: &CancellationToken,
    ) -> Result<SubscribeSummary> {
        let resolved = self.resolver.resolve(&request.reference, token).await?;
        if resolved.url != resolved.reference {
            self.emit(CoreEvent::Library(LibraryEvent::PlaylistRelocated {
                from: resolved.reference.clone(),
                to: resolved.url.clone(),
            }));
        }

        let parsed = match self.resolver.open(&resolved, token).await? {
            Some(reader) => self.collect_entries(reader, token).await?,
            None => Vec::new(),
        };
        debug!(entries = parsed.len(), "Playlist source parsed");

        ensure_active(token)?;
        let playlist = Playlist::new(&request.title, &resolved.url);
        self.playlists.insert_or_replace(&playlist).await?;

        ensure_active(token)?;
        let previous = self.channels.get_by_playlist_url(&playlist.url).await?;
        let plan = reconcile(&previous, &parsed, strategy);
        let report =
            apply_reconciliation(self.channels.as_ref(), &playlist.url, &plan, token).await?;

        if !report.is_clean() {
            warn!(failures = report.failures.len(), "Some channel updates did not reach storage");
        }
        info!(
            previous = previous.len(),
            inserted = report.inserted,
            deleted = report.deleted,
            retained = plan.retained.len(),
            "Playlist synced"
        );

        Ok(SubscribeSummary {
            playlist,
            parsed: parsed.len(),
            inserted: report.inserted,
            deleted: report.deleted,
            retained: plan.retained.len(),
            failures: report.failures,
        })
    }

    async fn collect_entries(
        &self,
        reader: SourceReader,
        token: &CancellationToken,
    ) -> Result<Vec<ParsedEntry>> {
        let mut entries = self.parser.parse(BufReader::new(reader));
        let mut parsed = Vec::new();
        while let Some(entry) = checkpoint(token, entries.next()).await? {
            parsed.push(entry?);
        }
        Ok(parsed)
    }

    fn snapshot_started(&self, ctx: &JobContext, operation: SnapshotOperation) {
        info!(job_id = %ctx.id, operation = operation.as_str(), "Snapshot job started");
        self.emit(CoreEvent::Snapshot(SnapshotEvent::Started {
            job_id: ctx.id.to_string(),
            operation,
        }));
    }

    fn snapshot_finished<T>(
        &self,
        ctx: &JobContext,
        operation: SnapshotOperation,
        result: Result<T>,
    ) -> Result<T> {
        match &result {
            Ok(_) => {}
            Err(SyncError::Cancelled) => {
                info!(job_id = %ctx.id, operation = operation.as_str(), "Snapshot job cancelled");
                self.emit(CoreEvent::Snapshot(SnapshotEvent::Cancelled {
                    job_id: ctx.id.to_string(),
                    operation,
                }));
            }
            Err(e) => {
                error!(
                    job_id = %ctx.id,
                    operation = operation.as_str(),
                    error = %e,
                    "Snapshot job failed"
                );
                self.emit(CoreEvent::Snapshot(SnapshotEvent::Failed {
                    job_id: ctx.id.to_string(),
                    operation,
                    message: e.to_string(),
                }));
            }
        }
        result
    }
}

/// User-facing message for errors the user can act on.
fn user_message(error: &SyncError) -> Option<Message> {
    match error {
        SyncError::EmptyReference => Some(Message::EmptyUrl),
        SyncError::UnsupportedSourceKind { .. } => Some(Message::UnsupportedUrl),
        SyncError::SourceNotFound { .. } => Some(Message::FileNotFound),
        _ => None,
    }
}
