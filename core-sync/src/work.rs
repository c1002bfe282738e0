//! # Work Queue
//!
//! Bounded worker pool for subscribe, backup and restore jobs.
//!
//! ## Overview
//!
//! Jobs are spawned immediately but wait for one of `pool_size` permits
//! before doing any work. Every job is registered under a tag (the playlist
//! URL for subscribes, `backup` / `restore` for snapshots) together with its
//! own [`CancellationToken`], so a newer request can cancel the older one
//! with [`WorkQueue::cancel_by_tag`].
//!
//! A job that is cancelled while still waiting for a permit is started
//! anyway; it observes the cancelled token at its first [`checkpoint`] and
//! reports its own cancellation.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let queue = WorkQueue::new(4);
//! let handle = queue
//!     .enqueue("backup", |ctx| async move {
//!         checkpoint(&ctx.token, write_everything()).await?
//!     })
//!     .await?;
//! let report = handle.join().await?;
//! ```

use crate::{Result, SyncError};
use core_async::sync::{CancellationToken, Mutex, Semaphore};
use core_async::task::JoinHandle;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for a queued job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Cancellation
// ============================================================================

/// Race `future` against `token`.
///
/// Returns `Err(SyncError::Cancelled)` without polling `future` when the
/// token is already cancelled.
pub async fn checkpoint<F>(token: &CancellationToken, future: F) -> Result<F::Output>
where
    F: Future,
{
    if token.is_cancelled() {
        return Err(SyncError::Cancelled);
    }

    core_async::select! {
        biased;
        _ = token.cancelled() => Err(SyncError::Cancelled),
        output = future => Ok(output),
    }
}

/// Fail fast if `token` has been cancelled.
pub fn ensure_active(token: &CancellationToken) -> Result<()> {
    if token.is_cancelled() {
        Err(SyncError::Cancelled)
    } else {
        Ok(())
    }
}

// ============================================================================
// Job Context
// ============================================================================

/// What a running job knows about itself
#[derive(Debug, Clone)]
pub struct JobContext {
    pub id: JobId,
    pub tag: String,
    pub token: CancellationToken,
}

// ============================================================================
// Task Handle
// ============================================================================

/// Handle to a queued job
///
/// Dropping the handle does not stop the job; [`TaskHandle::cancel`] does.
#[derive(Debug)]
pub struct TaskHandle<T> {
    id: JobId,
    tag: String,
    token: CancellationToken,
    join: JoinHandle<Result<T>>,
}

impl<T> TaskHandle<T> {
    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Request cancellation; the job stops at its next checkpoint.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the job and return its result.
    pub async fn join(self) -> Result<T> {
        match self.join.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(SyncError::Cancelled),
            Err(e) => Err(SyncError::Io(std::io::Error::other(format!(
                "job {} panicked: {}",
                self.id, e
            )))),
        }
    }
}

// ============================================================================
// Work Queue
// ============================================================================

#[derive(Debug)]
struct Registration {
    id: JobId,
    token: CancellationToken,
}

/// Bounded, tag-cancellable job runner
#[derive(Debug, Clone)]
pub struct WorkQueue {
    permits: Arc<Semaphore>,
    registry: Arc<Mutex<HashMap<String, Vec<Registration>>>>,
    pool_size: usize,
}

impl WorkQueue {
    /// Create a queue running at most `pool_size` jobs at once.
    pub fn new(pool_size: usize) -> Self {
        let pool_size = pool_size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(pool_size)),
            registry: Arc::new(Mutex::new(HashMap::new())),
            pool_size,
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Spawn `job` under `tag` and return its handle immediately.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::QueueClosed`] after [`WorkQueue::shutdown`].
    pub async fn enqueue<F, Fut, T>(&self, tag: impl Into<String>, job: F) -> Result<TaskHandle<T>>
    where
        F: FnOnce(JobContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        if self.permits.is_closed() {
            return Err(SyncError::QueueClosed);
        }

        let tag = tag.into();
        let id = JobId::new();
        let token = CancellationToken::new();

        self.registry
            .lock()
            .await
            .entry(tag.clone())
            .or_default()
            .push(Registration {
                id,
                token: token.clone(),
            });

        let permits = Arc::clone(&self.permits);
        let registry = Arc::clone(&self.registry);
        let context = JobContext {
            id,
            tag: tag.clone(),
            token: token.clone(),
        };

        let join = core_async::task::spawn(async move {
            let permit = core_async::select! {
                biased;
                _ = context.token.cancelled() => None,
                permit = permits.acquire_owned() => permit.ok(),
            };

            let tag = context.tag.clone();
            if permit.is_none() && !context.token.is_cancelled() {
                warn!(job_id = %id, tag = %tag, "Work queue closed before job started");
                unregister(&registry, &tag, id).await;
                return Err(SyncError::QueueClosed);
            }

            debug!(job_id = %id, tag = %tag, "Job started");
            let result = job(context).await;
            drop(permit);

            unregister(&registry, &tag, id).await;
            debug!(job_id = %id, tag = %tag, ok = result.is_ok(), "Job finished");
            result
        });

        Ok(TaskHandle {
            id,
            tag,
            token,
            join,
        })
    }

    /// Cancel every live job registered under `tag`, returning how many.
    pub async fn cancel_by_tag(&self, tag: &str) -> usize {
        let registry = self.registry.lock().await;
        let Some(jobs) = registry.get(tag) else {
            return 0;
        };

        let mut cancelled = 0;
        for job in jobs {
            if !job.token.is_cancelled() {
                job.token.cancel();
                cancelled += 1;
            }
        }

        if cancelled > 0 {
            debug!(tag, cancelled, "Cancelled jobs by tag");
        }
        cancelled
    }

    /// Number of jobs registered under `tag` that have not finished yet.
    pub async fn active_count(&self, tag: &str) -> usize {
        self.registry
            .lock()
            .await
            .get(tag)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Stop accepting jobs and cancel everything in flight.
    pub async fn shutdown(&self) {
        self.permits.close();
        let registry = self.registry.lock().await;
        for job in registry.values().flatten() {
            job.token.cancel();
        }
    }
}

async fn unregister(
    registry: &Mutex<HashMap<String, Vec<Registration>>>,
    tag: &str,
    id: JobId,
) {
    let mut registry = registry.lock().await;
    if let Some(jobs) = registry.get_mut(tag) {
        jobs.retain(|job| job.id != id);
        if jobs.is_empty() {
            registry.remove(tag);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_async::sync::oneshot;
    use core_async::time::{sleep, timeout, Duration};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[core_async::test]
    async fn test_enqueue_returns_result() {
        let queue = WorkQueue::new(2);
        let handle = queue
            .enqueue("answer", |_ctx| async { Ok(42) })
            .await
            .unwrap();

        assert_eq!(handle.tag(), "answer");
        assert_eq!(handle.join().await.unwrap(), 42);
    }

    #[core_async::test]
    async fn test_checkpoint_observes_cancellation() {
        let token = CancellationToken::new();
        token.cancel();

        let result = checkpoint(&token, async { 1 }).await;
        assert!(matches!(result, Err(SyncError::Cancelled)));
        assert!(ensure_active(&token).is_err());
    }

    #[core_async::test]
    async fn test_cancel_by_tag_stops_running_job() {
        let queue = WorkQueue::new(1);
        let (started_tx, started_rx) = oneshot::channel();

        let handle = queue
            .enqueue("http://a", |ctx| async move {
                let _ = started_tx.send(());
                checkpoint(&ctx.token, sleep(Duration::from_secs(30))).await?;
                Ok(())
            })
            .await
            .unwrap();

        started_rx.await.unwrap();
        assert_eq!(queue.cancel_by_tag("http://a").await, 1);
        assert_eq!(queue.cancel_by_tag("http://other").await, 0);

        let result = timeout(Duration::from_secs(5), handle.join()).await.unwrap();
        assert!(matches!(result, Err(SyncError::Cancelled)));
        assert_eq!(queue.active_count("http://a").await, 0);
    }

    #[core_async::test]
    async fn test_pool_size_bounds_concurrency() {
        let queue = WorkQueue::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for i in 0..6 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            handles.push(
                queue
                    .enqueue(format!("job-{}", i), move |_ctx| async move {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        sleep(Duration::from_millis(20)).await;
                        running.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .await
                    .unwrap(),
            );
        }

        for handle in handles {
            handle.join().await.unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[core_async::test]
    async fn test_job_cancelled_while_waiting_still_reports() {
        let queue = WorkQueue::new(1);
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let blocker = queue
            .enqueue("blocker", |_ctx| async move {
                let _ = release_rx.await;
                Ok(())
            })
            .await
            .unwrap();

        let waiting = queue
            .enqueue("waiting", |ctx| async move {
                ensure_active(&ctx.token)?;
                Ok(())
            })
            .await
            .unwrap();

        waiting.cancel();
        let result = timeout(Duration::from_secs(5), waiting.join()).await.unwrap();
        assert!(matches!(result, Err(SyncError::Cancelled)));

        let _ = release_tx.send(());
        blocker.join().await.unwrap();
    }

    #[core_async::test]
    async fn test_shutdown_rejects_new_jobs() {
        let queue = WorkQueue::new(1);
        queue.shutdown().await;

        let result = queue.enqueue("late", |_ctx| async { Ok(()) }).await;
        assert!(matches!(result, Err(SyncError::QueueClosed)));
    }
}
