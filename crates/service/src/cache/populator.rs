//! Bounded background cache population.
//!
//! Cache misses hand their result to [`CachePopulator::schedule`], which
//! queues it without waiting. A single dispatcher task drains the queue and
//! runs at most `workers` cache writes at once. When the queue is full the job
//! is dropped: the entry is simply rebuilt by a later miss.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, Notify, Semaphore, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use super::{CachedPage, QueryCache};

/// A cache write waiting to run.
#[derive(Debug)]
pub struct PopulateJob {
    pub key: String,
    pub page: CachedPage,
    pub ttl: Duration,
}

/// Handle to the population dispatcher. Cheap to clone.
#[derive(Clone)]
pub struct CachePopulator {
    inner: Arc<PopulatorInner>,
}

struct PopulatorInner {
    tx: mpsc::Sender<PopulateJob>,
    tracker: Arc<PendingTracker>,
    shutdown: Arc<Notify>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

/// Counts accepted jobs that have not finished yet.
#[derive(Default)]
struct PendingTracker {
    pending: AtomicUsize,
    idle: Notify,
}

impl PendingTracker {
    fn begin(&self) {
        self.pending.fetch_add(1, Ordering::AcqRel);
    }

    fn finish(&self) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }

    fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl CachePopulator {
    /// Start the dispatcher. Must be called from within a Tokio runtime.
    #[must_use]
    pub fn spawn(cache: QueryCache, workers: usize, queue_capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let tracker = Arc::new(PendingTracker::default());
        let shutdown = Arc::new(Notify::new());

        let dispatcher = tokio::spawn(dispatch(
            rx,
            cache,
            Arc::new(Semaphore::new(workers.max(1))),
            Arc::clone(&tracker),
            Arc::clone(&shutdown),
        ));

        Self {
            inner: Arc::new(PopulatorInner {
                tx,
                tracker,
                shutdown,
                dispatcher: Mutex::new(Some(dispatcher)),
            }),
        }
    }

    /// Queue a cache write without waiting for it.
    ///
    /// Returns `false` when the job was dropped because the queue is full or
    /// the populator has shut down.
    pub fn schedule(&self, job: PopulateJob) -> bool {
        self.inner.tracker.begin();
        match self.inner.tx.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(job)) => {
                self.inner.tracker.finish();
                warn!(key = %job.key, "Cache population queue full, dropping write");
                false
            }
            Err(TrySendError::Closed(job)) => {
                self.inner.tracker.finish();
                debug!(key = %job.key, "Cache populator stopped, dropping write");
                false
            }
        }
    }

    /// Number of accepted writes that have not completed.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.tracker.pending()
    }

    /// Wait until every accepted write has completed.
    pub async fn wait_idle(&self) {
        self.inner.tracker.wait_idle().await;
    }

    /// Stop accepting writes, finish the queued ones and stop the dispatcher.
    pub async fn shutdown(&self) {
        self.inner.shutdown.notify_one();
        let handle = self.inner.dispatcher.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "Cache population dispatcher panicked");
            }
        }
    }
}

async fn dispatch(
    mut rx: mpsc::Receiver<PopulateJob>,
    cache: QueryCache,
    permits: Arc<Semaphore>,
    tracker: Arc<PendingTracker>,
    shutdown: Arc<Notify>,
) {
    let mut writes = JoinSet::new();
    let mut closing = false;

    loop {
        let next = if closing {
            rx.recv().await
        } else {
            tokio::select! {
                () = shutdown.notified() => {
                    rx.close();
                    closing = true;
                    continue;
                }
                job = rx.recv() => job,
            }
        };
        let Some(job) = next else { break };

        while let Some(result) = writes.try_join_next() {
            if let Err(e) = result {
                error!(error = %e, "Cache population task panicked");
            }
        }

        let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
            tracker.finish();
            break;
        };

        let cache = cache.clone();
        let tracker = Arc::clone(&tracker);
        writes.spawn(async move {
            let _permit = permit;
            if let Err(e) = cache.set(&job.key, job.page, job.ttl).await {
                warn!(key = %job.key, error = %e, "Failed to populate cache");
            } else {
                debug!(key = %job.key, "Cache populated");
            }
            tracker.finish();
        });
    }

    while let Some(result) = writes.join_next().await {
        if let Err(e) = result {
            error!(error = %e, "Cache population task panicked");
        }
    }
    info!("Cache populator stopped");
}
