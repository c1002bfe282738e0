//! End-to-end tests for the playlist sync service against in-memory SQLite,
//! a mocked HTTP client and a real temp directory.

use async_trait::async_trait;
use bridge_desktop::TokioFileSystem;
use bridge_traits::content::ContentResolver;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::http::{HttpClient, HttpRequest, HttpStream};
use bridge_traits::time::FixedClock;
use core_async::io::{AsyncRead, ReadBuf};
use core_async::sync::Notify;
use core_library::db::create_test_pool;
use core_library::{
    ChannelRepository, Playlist, PlaylistRepository, SqliteChannelRepository,
    SqlitePlaylistRepository,
};
use core_runtime::events::{LibraryEvent, Receiver, SubscriptionEvent};
use core_runtime::{CoreConfig, CoreEvent, EventBus};
use core_sync::source::path_to_file_url;
use core_sync::{
    Message, PlaylistSyncService, SubscribeProgress, SubscribeRequest, SyncError, Strategy,
};
use mockall::mock;
use std::collections::{HashMap, VecDeque};
use std::io::Cursor;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

const PLAYLIST_URL: &str = "http://iptv.example.com/lists/news.m3u";

mock! {
    HttpClient {}

    #[async_trait]
    impl HttpClient for HttpClient {
        async fn open_stream(&self, request: HttpRequest) -> BridgeResult<HttpStream>;
    }
}

mock! {
    ContentResolver {}

    #[async_trait]
    impl ContentResolver for ContentResolver {
        async fn display_name(&self, uri: &str) -> BridgeResult<Option<String>>;
        async fn open_read(&self, uri: &str) -> BridgeResult<Box<dyn AsyncRead + Send + Unpin>>;
    }
}

// ============================================================================
// Fixtures
// ============================================================================

struct Harness {
    service: PlaylistSyncService,
    playlists: Arc<dyn PlaylistRepository>,
    channels: Arc<dyn ChannelRepository>,
    events: Receiver<CoreEvent>,
    data_dir: PathBuf,
}

impl Harness {
    async fn new(http: MockHttpClient) -> Self {
        Self::build(http, None).await
    }

    async fn build(http: MockHttpClient, content: Option<MockContentResolver>) -> Self {
        let data_dir = std::env::temp_dir().join(format!("core-sync-{}", uuid::Uuid::new_v4()));
        let mut builder = CoreConfig::builder()
            .data_dir(&data_dir)
            .worker_pool_size(2)
            .default_strategy_code(1)
            .http_client(Arc::new(http))
            .file_system(Arc::new(TokioFileSystem::with_data_directory(data_dir.clone())))
            .clock(Arc::new(FixedClock::from_millis(1_700_000_000_000)));
        if let Some(content) = content {
            builder = builder.content_resolver(Arc::new(content));
        }
        let config = builder.build().unwrap();

        let pool = create_test_pool().await.unwrap();
        let playlists: Arc<dyn PlaylistRepository> =
            Arc::new(SqlitePlaylistRepository::new(pool.clone()));
        let channels: Arc<dyn ChannelRepository> = Arc::new(SqliteChannelRepository::new(pool));
        let bus = EventBus::new(64);
        let events = bus.subscribe();

        let service = PlaylistSyncService::new(
            &config,
            Arc::clone(&playlists),
            Arc::clone(&channels),
            bus,
        );

        Self {
            service,
            playlists,
            channels,
            events,
            data_dir,
        }
    }

    fn drain_events(&mut self) -> Vec<CoreEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    async fn channel_urls(&self, playlist_url: &str) -> Vec<String> {
        self.channels
            .get_by_playlist_url(playlist_url)
            .await
            .unwrap()
            .into_iter()
            .map(|channel| channel.url)
            .collect()
    }

    async fn cleanup(self) {
        self.service.shutdown().await;
        std::fs::remove_dir_all(&self.data_dir).ok();
    }
}

fn m3u(urls: &[&str]) -> String {
    let mut body = String::from("#EXTM3U\n");
    for url in urls {
        let name = url.rsplit('/').next().unwrap_or(url);
        body.push_str(&format!(
            "#EXTINF:-1 tvg-id=\"{0}\" group-title=\"News\",{0}\n{1}\n",
            name, url
        ));
    }
    body
}

fn stream(status: u16, body: String) -> HttpStream {
    HttpStream {
        status,
        headers: HashMap::new(),
        body: Box::new(Cursor::new(body.into_bytes())),
    }
}

/// HTTP mock answering successive GETs with `bodies` in order.
fn scripted_http(bodies: Vec<String>) -> MockHttpClient {
    let bodies = Arc::new(Mutex::new(VecDeque::from(bodies)));
    let mut http = MockHttpClient::new();
    http.expect_open_stream().returning(move |request| {
        assert_eq!(request.url, PLAYLIST_URL);
        let body = bodies.lock().unwrap().pop_front().unwrap_or_default();
        Ok(stream(200, body))
    });
    http
}

/// Body that hands out `prefix` and then never produces another byte.
struct StallingBody {
    prefix: Cursor<Vec<u8>>,
}

impl AsyncRead for StallingBody {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let before = buf.filled().len();
        match Pin::new(&mut self.prefix).poll_read(cx, buf) {
            Poll::Ready(Ok(())) if buf.filled().len() == before => Poll::Pending,
            other => other,
        }
    }
}

/// HTTP mock whose call number `stall_on` (1-based) gets a body that stalls
/// after one entry; every other call gets `body`. `opened` is notified when
/// the stalling body is handed out.
fn stalling_http(stall_on: usize, body: String, opened: Arc<Notify>) -> MockHttpClient {
    let calls = AtomicUsize::new(0);
    let mut http = MockHttpClient::new();
    http.expect_open_stream().returning(move |_| {
        if calls.fetch_add(1, Ordering::SeqCst) + 1 == stall_on {
            opened.notify_one();
            return Ok(HttpStream {
                status: 200,
                headers: HashMap::new(),
                body: Box::new(StallingBody {
                    prefix: Cursor::new(m3u(&["http://s/partial"]).into_bytes()),
                }),
            });
        }
        Ok(stream(200, body.clone()))
    });
    http
}

fn success(progress: SubscribeProgress) -> core_sync::SubscribeSummary {
    match progress {
        SubscribeProgress::Success(summary) => summary,
        other => panic!("expected success, got {:?}", other),
    }
}

// ============================================================================
// Subscribe
// ============================================================================

#[core_async::test]
async fn test_subscribe_stores_playlist_and_channels() {
    let mut harness = Harness::new(scripted_http(vec![m3u(&[
        "http://s/1", "http://s/2", "http://s/3",
    ])]))
    .await;

    let handle = harness
        .service
        .subscribe("News", PLAYLIST_URL, Strategy::All)
        .await;
    assert_eq!(handle.notice(), Some(Message::Enqueued));
    let summary = success(handle.finish().await);

    assert_eq!(summary.inserted, 3);
    assert_eq!(summary.deleted, 0);
    assert!(summary.failures.is_empty());

    let stored = harness.playlists.get_by_url(PLAYLIST_URL).await.unwrap().unwrap();
    assert_eq!(stored.title, "News");
    assert!(!stored.from_local);

    let channels = harness.channels.get_by_playlist_url(PLAYLIST_URL).await.unwrap();
    let positions: Vec<i64> = channels.iter().map(|c| c.position).collect();
    assert_eq!(positions, vec![0, 1, 2]);
    assert_eq!(channels[0].group.as_deref(), Some("News"));

    let events = harness.drain_events();
    assert!(matches!(
        events.first(),
        Some(CoreEvent::Subscription(SubscriptionEvent::Started { strategy, .. })) if strategy == "all"
    ));
    assert!(events.iter().any(|event| matches!(
        event,
        CoreEvent::Subscription(SubscriptionEvent::Completed { inserted: 3, .. })
    )));

    harness.cleanup().await;
}

#[core_async::test]
async fn test_refresh_strategies() {
    let harness = Harness::new(scripted_http(vec![
        m3u(&["http://s/a", "http://s/b", "http://s/c"]),
        m3u(&["http://s/a", "http://s/d"]),
        m3u(&["http://s/a"]),
        m3u(&["http://s/z"]),
    ]))
    .await;
    let service = &harness.service;

    success(service.subscribe("News", PLAYLIST_URL, Strategy::All).await.finish().await);

    let b = harness
        .channels
        .get_by_playlist_url(PLAYLIST_URL)
        .await
        .unwrap()
        .into_iter()
        .find(|c| c.url == "http://s/b")
        .unwrap();
    assert!(service.set_favourite(b.id, true).await.unwrap());

    // Favourite b survives, c goes, d is appended after the survivors
    let summary = success(
        service
            .subscribe("News", PLAYLIST_URL, Strategy::SkipFavourite)
            .await
            .finish()
            .await,
    );
    assert_eq!((summary.deleted, summary.inserted, summary.retained), (1, 1, 1));
    assert_eq!(
        harness.channel_urls(PLAYLIST_URL).await,
        vec!["http://s/a", "http://s/b", "http://s/d"]
    );
    let d = harness
        .channels
        .get_by_playlist_url(PLAYLIST_URL)
        .await
        .unwrap()
        .into_iter()
        .find(|c| c.url == "http://s/d")
        .unwrap();
    assert_eq!(d.position, 2);

    // All mirrors the source, favourites included
    success(service.subscribe("News", PLAYLIST_URL, Strategy::All).await.finish().await);
    assert_eq!(harness.channel_urls(PLAYLIST_URL).await, vec!["http://s/a"]);

    // Keep touches nothing
    let summary = success(service.subscribe("News", PLAYLIST_URL, Strategy::Keep).await.finish().await);
    assert_eq!((summary.deleted, summary.inserted), (0, 0));
    assert_eq!(harness.channel_urls(PLAYLIST_URL).await, vec!["http://s/a"]);

    harness.cleanup().await;
}

#[core_async::test]
async fn test_invalid_requests_never_reach_the_queue() {
    // No expectations: any HTTP call panics the mock
    let harness = Harness::new(MockHttpClient::new()).await;
    let service = &harness.service;

    let cases = [
        (SubscribeRequest::new("", PLAYLIST_URL), Message::EmptyTitle),
        (SubscribeRequest::new("News", " "), Message::EmptyUrl),
        (SubscribeRequest::new("News", "").local_pick(), Message::EmptyFile),
    ];
    for (request, expected) in cases {
        let handle = service.submit(request).await;
        assert_eq!(handle.job_id(), None);
        assert!(matches!(handle.finish().await, SubscribeProgress::Message(m) if m == expected));
    }

    let handle = service
        .subscribe("News", "ftp://iptv.example.com/news.m3u", Strategy::All)
        .await;
    assert!(matches!(
        handle.finish().await,
        SubscribeProgress::Message(Message::UnsupportedUrl)
    ));
    assert!(service.playlists().await.unwrap().is_empty());

    harness.cleanup().await;
}

#[core_async::test]
async fn test_network_failure_is_a_generic_failure() {
    let mut http = MockHttpClient::new();
    http.expect_open_stream().times(1).returning(|_| {
        Err(BridgeError::OperationFailed("connection refused".to_string()))
    });
    let mut harness = Harness::new(http).await;

    let handle = harness
        .service
        .subscribe("News", PLAYLIST_URL, Strategy::All)
        .await;
    match handle.finish().await {
        SubscribeProgress::Failed(reason) => assert!(reason.contains("connection refused")),
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(harness.playlists.get_by_url(PLAYLIST_URL).await.unwrap().is_none());
    assert!(harness.drain_events().iter().any(|event| matches!(
        event,
        CoreEvent::Subscription(SubscriptionEvent::Failed { .. })
    )));

    harness.cleanup().await;
}

#[core_async::test]
async fn test_non_success_status_is_empty_and_still_reconciled() {
    let mut http = MockHttpClient::new();
    let mut calls = 0;
    http.expect_open_stream().times(2).returning(move |_| {
        calls += 1;
        if calls == 1 {
            Ok(stream(200, m3u(&["http://s/1", "http://s/2"])))
        } else {
            Ok(stream(404, "not found".to_string()))
        }
    });
    let mut harness = Harness::new(http).await;

    success(
        harness
            .service
            .subscribe("News", PLAYLIST_URL, Strategy::All)
            .await
            .finish()
            .await,
    );
    harness.drain_events();

    let handle = harness
        .service
        .subscribe("News", PLAYLIST_URL, Strategy::All)
        .await;
    assert!(matches!(handle.finish().await, SubscribeProgress::Empty));
    assert!(harness.channel_urls(PLAYLIST_URL).await.is_empty());
    assert!(harness.playlists.get_by_url(PLAYLIST_URL).await.unwrap().is_some());
    assert!(harness.drain_events().iter().any(|event| matches!(
        event,
        CoreEvent::Subscription(SubscriptionEvent::Empty { .. })
    )));

    harness.cleanup().await;
}

#[core_async::test]
async fn test_local_file_subscribe() {
    let harness = Harness::new(MockHttpClient::new()).await;
    let path = harness.data_dir.join("imports").join("My List.m3u");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, m3u(&["http://s/1"])).unwrap();
    let url = format!("file://{}", path.display());

    let summary = success(
        harness
            .service
            .submit(SubscribeRequest::new("Mine", &url).local_pick())
            .await
            .finish()
            .await,
    );

    assert_eq!(summary.inserted, 1);
    assert!(summary.playlist.from_local);
    assert_eq!(harness.service.suggest_title(&url), "My List");

    let missing = harness
        .service
        .subscribe("Gone", "file:///definitely/not/here.m3u", Strategy::All)
        .await;
    assert!(matches!(
        missing.finish().await,
        SubscribeProgress::Message(Message::FileNotFound)
    ));

    harness.cleanup().await;
}

#[core_async::test]
async fn test_content_reference_is_copied_and_playlist_moved() {
    let content_ref = "content://provider/document/42";
    let mut content = MockContentResolver::new();
    content.expect_display_name().returning(|_| Ok(None));
    content.expect_open_read().returning(|_| {
        Ok(Box::new(Cursor::new(m3u(&["http://s/1", "http://s/2"]).into_bytes()))
            as Box<dyn AsyncRead + Send + Unpin>)
    });
    let mut harness = Harness::build(MockHttpClient::new(), Some(content)).await;

    harness
        .playlists
        .insert_or_replace(&Playlist::new("Picked", content_ref))
        .await
        .unwrap();

    let summary = success(
        harness
            .service
            .subscribe("Picked", content_ref, Strategy::All)
            .await
            .finish()
            .await,
    );

    let copy = harness.data_dir.join("playlists").join("File_1700000000000");
    assert_eq!(summary.playlist.url, path_to_file_url(&copy));
    assert!(summary.playlist.from_local);
    assert!(copy.exists());
    assert!(harness.playlists.get_by_url(content_ref).await.unwrap().is_none());
    assert_eq!(harness.channel_urls(&summary.playlist.url).await.len(), 2);

    // The event carries the stored keys, not a redacted form
    let moved = harness.drain_events().into_iter().find_map(|event| match event {
        CoreEvent::Library(LibraryEvent::PlaylistRelocated { from, to }) => Some((from, to)),
        _ => None,
    });
    assert_eq!(moved, Some((content_ref.to_string(), summary.playlist.url.clone())));
    assert!(harness.playlists.get_by_url(&summary.playlist.url).await.unwrap().is_some());

    harness.cleanup().await;
}

#[core_async::test]
async fn test_content_name_with_percent_escape_is_subscribed() {
    let content_ref = "content://provider/document/7";
    let mut content = MockContentResolver::new();
    content
        .expect_display_name()
        .returning(|_| Ok(Some("sports%20hd.m3u".to_string())));
    content.expect_open_read().returning(|_| {
        Ok(Box::new(Cursor::new(m3u(&["http://s/1", "http://s/2"]).into_bytes()))
            as Box<dyn AsyncRead + Send + Unpin>)
    });
    let harness = Harness::build(MockHttpClient::new(), Some(content)).await;

    let summary = success(
        harness
            .service
            .subscribe("Sports", content_ref, Strategy::All)
            .await
            .finish()
            .await,
    );

    let copy = harness.data_dir.join("playlists").join("sports%20hd.m3u");
    assert!(copy.exists());
    assert_eq!(summary.playlist.url, path_to_file_url(&copy));
    assert_eq!(summary.inserted, 2);
    assert_eq!(harness.service.suggest_title(&summary.playlist.url), "sports%20hd");
    assert_eq!(harness.channel_urls(&summary.playlist.url).await.len(), 2);

    harness.cleanup().await;
}

// ============================================================================
// Cancellation
// ============================================================================

#[core_async::test]
async fn test_cancel_during_slow_download_keeps_stored_channels() {
    let opened = Arc::new(Notify::new());
    let mut harness = Harness::new(stalling_http(
        2,
        m3u(&["http://s/1", "http://s/2"]),
        Arc::clone(&opened),
    ))
    .await;

    success(
        harness
            .service
            .subscribe("News", PLAYLIST_URL, Strategy::All)
            .await
            .finish()
            .await,
    );
    harness.drain_events();

    let mut handle = harness
        .service
        .subscribe("News", PLAYLIST_URL, Strategy::All)
        .await;
    assert!(matches!(handle.recv().await, Some(SubscribeProgress::Loading)));
    opened.notified().await;
    handle.cancel();

    assert!(matches!(handle.finish().await, SubscribeProgress::Cancelled));
    assert_eq!(
        harness.channel_urls(PLAYLIST_URL).await,
        vec!["http://s/1", "http://s/2"]
    );
    assert!(harness.drain_events().iter().any(|event| matches!(
        event,
        CoreEvent::Subscription(SubscriptionEvent::Cancelled { url, .. }) if url == PLAYLIST_URL
    )));

    harness.cleanup().await;
}

#[core_async::test]
async fn test_resubscribe_supersedes_running_job() {
    let opened = Arc::new(Notify::new());
    let harness = Harness::new(stalling_http(1, m3u(&["http://s/a"]), Arc::clone(&opened))).await;

    let first = harness
        .service
        .subscribe("News", PLAYLIST_URL, Strategy::All)
        .await;
    opened.notified().await;

    let second = harness
        .service
        .subscribe("News", PLAYLIST_URL, Strategy::All)
        .await;

    assert!(matches!(first.finish().await, SubscribeProgress::Cancelled));
    let summary = success(second.finish().await);
    assert_eq!(summary.inserted, 1);
    assert_eq!(harness.channel_urls(PLAYLIST_URL).await, vec!["http://s/a"]);

    harness.cleanup().await;
}

// ============================================================================
// Library edits
// ============================================================================

#[core_async::test]
async fn test_unsubscribe_rename_and_ban() {
    let mut harness = Harness::new(scripted_http(vec![m3u(&["http://s/1", "http://s/2"])])).await;
    let service = &harness.service;
    success(service.subscribe("News", PLAYLIST_URL, Strategy::All).await.finish().await);

    service.rename(PLAYLIST_URL, "Headlines").await;
    service.rename("http://unknown", "Ignored").await;
    assert_eq!(
        harness.playlists.get_by_url(PLAYLIST_URL).await.unwrap().unwrap().title,
        "Headlines"
    );

    let first = harness.channels.get_by_playlist_url(PLAYLIST_URL).await.unwrap()[0].clone();
    assert!(service.set_banned(first.id, true).await.unwrap());
    assert_eq!(service.banned_channels().await.unwrap().len(), 1);

    let removed = service.unsubscribe(PLAYLIST_URL).await.unwrap();
    assert_eq!(removed.map(|p| p.title), Some("Headlines".to_string()));
    assert!(service.playlist_with_channels(PLAYLIST_URL).await.unwrap().is_none());
    assert!(harness.channel_urls(PLAYLIST_URL).await.is_empty());
    assert!(service.unsubscribe(PLAYLIST_URL).await.unwrap().is_none());

    let events = harness.drain_events();
    for expected in ["renamed", "banned", "unsubscribed"] {
        let seen = events.iter().any(|event| match event {
            CoreEvent::Library(LibraryEvent::PlaylistRenamed { title, .. }) => {
                expected == "renamed" && title == "Headlines"
            }
            CoreEvent::Library(LibraryEvent::ChannelBanChanged { banned: true, .. }) => {
                expected == "banned"
            }
            CoreEvent::Library(LibraryEvent::PlaylistUnsubscribed { url }) => {
                expected == "unsubscribed" && url == PLAYLIST_URL
            }
            _ => false,
        });
        assert!(seen, "missing {} event", expected);
    }

    harness.cleanup().await;
}

// ============================================================================
// Backup / Restore
// ============================================================================

#[core_async::test]
async fn test_backup_then_restore_into_fresh_library() {
    let source = Harness::new(scripted_http(vec![m3u(&["http://s/1", "http://s/2"])])).await;
    success(
        source
            .service
            .subscribe("News", PLAYLIST_URL, Strategy::All)
            .await
            .finish()
            .await,
    );

    let local = source.data_dir.join("local.m3u");
    std::fs::write(&local, m3u(&["http://s/9"])).unwrap();
    success(
        source
            .service
            .subscribe("Local", &format!("file://{}", local.display()), Strategy::All)
            .await
            .finish()
            .await,
    );

    let backup_path = source.data_dir.join("backup.txt");
    let report = source
        .service
        .backup_to_file(&backup_path)
        .await
        .unwrap()
        .join()
        .await
        .unwrap();
    assert_eq!((report.playlists, report.channels), (1, 2));

    let target = Harness::new(MockHttpClient::new()).await;
    let restored = target
        .service
        .restore_from_file(&backup_path)
        .await
        .unwrap()
        .join()
        .await
        .unwrap();

    assert_eq!((restored.playlists, restored.channels), (1, 2));
    assert_eq!((restored.skipped, restored.failed), (0, 0));
    assert_eq!(
        target.channel_urls(PLAYLIST_URL).await,
        vec!["http://s/1", "http://s/2"]
    );
    assert_eq!(target.service.playlists().await.unwrap().len(), 1);

    source.cleanup().await;
    target.cleanup().await;
}

#[core_async::test]
async fn test_restore_skips_blank_and_malformed_lines() {
    let harness = Harness::new(MockHttpClient::new()).await;
    let backup = format!(
        "PLAYLIST|{{\"url\":\"{0}\",\"title\":\"News\",\"from_local\":false}}\n\
         \n\
         CHANNEL|{{not json\n\
         CHANNEL|{{\"playlist_url\":\"{0}\",\"url\":\"http://s/1\",\"title\":\"One\",\"position\":0}}\n",
        PLAYLIST_URL
    );

    let report = harness
        .service
        .restore(Cursor::new(backup.into_bytes()))
        .await
        .unwrap()
        .join()
        .await
        .unwrap();

    assert_eq!((report.playlists, report.channels), (1, 1));
    assert_eq!(report.skipped, 1);
    assert_eq!(harness.channel_urls(PLAYLIST_URL).await, vec!["http://s/1"]);

    harness.cleanup().await;
}

#[core_async::test]
async fn test_shutdown_cancels_and_rejects() {
    let harness = Harness::new(MockHttpClient::new()).await;
    harness.service.shutdown().await;

    let handle = harness
        .service
        .subscribe("News", PLAYLIST_URL, Strategy::All)
        .await;
    assert!(matches!(handle.finish().await, SubscribeProgress::Failed(_)));

    let result = harness.service.restore(Cursor::new(Vec::new())).await;
    assert!(matches!(result, Err(SyncError::QueueClosed)));

    harness.cleanup().await;
}
