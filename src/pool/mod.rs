//! Bounded concurrent fan-out with per-group progress.
//!
//! A [`WorkerPool`] runs a fixed number of workers draining one bounded
//! queue. Producers [`submit`](WorkerPool::submit) items (waiting while the
//! queue is full) and then [`finish`](WorkerPool::finish) the pool, which
//! closes the queue and waits for every worker to drain it.
//!
//! # Overview
//!
//! - Workers share one receiver; no ordering is kept across items
//! - A failing item is logged, reported to the [`ProgressSink`] and counted;
//!   the worker moves on to the next item
//! - A panicking handler counts as a failed item
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use vk_client::pool::{GroupCounters, PoolConfig, WorkItem, WorkerPool};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let counters = Arc::new(GroupCounters::<&'static str>::new());
//! let pool = WorkerPool::<u64, &'static str>::start(PoolConfig::default(), counters.clone(), |id: u64| async move {
//!     println!("processing {id}");
//!     Ok::<(), std::io::Error>(())
//! })?;
//!
//! let cancel = CancellationToken::new();
//! for id in 0..10 {
//!     pool.submit(&cancel, WorkItem::new(id, "batch")).await?;
//! }
//! let stats = pool.finish().await?;
//! println!("Completed: {}, Failed: {}", stats.completed(), stats.failed());
//! # Ok(())
//! # }
//! ```

mod progress;

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures_util::FutureExt;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

pub use progress::{BarProgress, GroupCounters, NoProgress, ProgressSink};

/// Minimum allowed parallelism.
const MIN_PARALLELISM: usize = 1;

/// Maximum allowed parallelism.
const MAX_PARALLELISM: usize = 256;

/// Default number of workers.
pub const DEFAULT_PARALLELISM: usize = 64;

/// Default queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Error type for worker pool operations.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Invalid parallelism value provided.
    #[error(
        "invalid parallelism value {value}: must be between {MIN_PARALLELISM} and {MAX_PARALLELISM}"
    )]
    InvalidParallelism {
        /// The invalid value that was provided.
        value: usize,
    },

    /// The caller cancelled while waiting for queue space.
    #[error("submission cancelled")]
    Cancelled,

    /// Every worker is gone; nothing will drain the queue.
    #[error("worker pool closed")]
    Closed,

    /// Worker tasks died outside of item handling.
    #[error("{count} worker task(s) panicked")]
    WorkersLost {
        /// How many workers died.
        count: usize,
    },
}

/// Pool sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of concurrent workers.
    pub parallelism: usize,
    /// Items buffered before `submit` waits.
    pub queue_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            parallelism: DEFAULT_PARALLELISM,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl PoolConfig {
    /// Creates a config with `parallelism` workers and the default queue.
    #[must_use]
    pub fn with_parallelism(parallelism: usize) -> Self {
        Self {
            parallelism,
            ..Self::default()
        }
    }
}

/// One unit of work and the group it is reported under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem<T, K> {
    /// Opaque payload handed to the handler.
    pub payload: T,
    /// Progress group.
    pub group: K,
}

impl<T, K> WorkItem<T, K> {
    /// Creates a work item.
    pub fn new(payload: T, group: K) -> Self {
        Self { payload, group }
    }
}

/// Statistics from one pool run.
#[derive(Debug, Default)]
pub struct PoolStats {
    completed: AtomicUsize,
    failed: AtomicUsize,
    panicked: AtomicUsize,
}

impl PoolStats {
    /// Returns the number of items whose handler succeeded.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Returns the number of items whose handler failed or panicked.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Returns the number of items whose handler panicked.
    #[must_use]
    pub fn panicked(&self) -> usize {
        self.panicked.load(Ordering::SeqCst)
    }

    /// Returns the total number of items processed.
    #[must_use]
    pub fn total(&self) -> usize {
        self.completed() + self.failed()
    }

    fn snapshot(&self) -> Self {
        Self {
            completed: AtomicUsize::new(self.completed()),
            failed: AtomicUsize::new(self.failed()),
            panicked: AtomicUsize::new(self.panicked()),
        }
    }
}

/// Fixed-size pool of workers over a bounded queue.
pub struct WorkerPool<T, K> {
    sender: mpsc::Sender<WorkItem<T, K>>,
    workers: Vec<JoinHandle<()>>,
    stats: Arc<PoolStats>,
}

impl<T, K> fmt::Debug for WorkerPool<T, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl<T, K> WorkerPool<T, K>
where
    T: fmt::Debug + Send + 'static,
    K: fmt::Debug + Send + Sync + 'static,
{
    /// Starts `config.parallelism` workers applying `handler` to each item.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidParallelism`] if the value is outside
    /// the valid range (1-256).
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[instrument(level = "debug", skip(sink, handler))]
    pub fn start<F, Fut, E>(
        config: PoolConfig,
        sink: Arc<dyn ProgressSink<K>>,
        handler: F,
    ) -> Result<Self, PoolError>
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        if !(MIN_PARALLELISM..=MAX_PARALLELISM).contains(&config.parallelism) {
            return Err(PoolError::InvalidParallelism {
                value: config.parallelism,
            });
        }

        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let handler = Arc::new(handler);
        let stats = Arc::new(PoolStats::default());

        let workers = (0..config.parallelism)
            .map(|worker| {
                tokio::spawn(run_worker(
                    worker,
                    Arc::clone(&receiver),
                    Arc::clone(&handler),
                    Arc::clone(&sink),
                    Arc::clone(&stats),
                ))
            })
            .collect();

        debug!(
            parallelism = config.parallelism,
            queue_capacity = config.queue_capacity,
            "worker pool started"
        );
        Ok(Self {
            sender,
            workers,
            stats,
        })
    }

    /// Enqueues an item, waiting while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Cancelled`] if `cancel` fires while waiting and
    /// [`PoolError::Closed`] if no worker is left to receive it.
    pub async fn submit(
        &self,
        cancel: &CancellationToken,
        item: WorkItem<T, K>,
    ) -> Result<(), PoolError> {
        if cancel.is_cancelled() {
            return Err(PoolError::Cancelled);
        }
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(PoolError::Cancelled),
            sent = self.sender.send(item) => sent.map_err(|_| PoolError::Closed),
        }
    }

    /// Closes the queue and waits for every worker to drain it.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::WorkersLost`] if a worker task died; items it
    /// had not yet taken are still drained by the others.
    #[instrument(skip(self), fields(workers = self.workers.len()))]
    pub async fn finish(self) -> Result<PoolStats, PoolError> {
        let Self {
            sender,
            workers,
            stats,
        } = self;
        drop(sender);

        let mut lost = 0;
        for handle in workers {
            if let Err(e) = handle.await {
                warn!(error = %e, "worker task panicked");
                lost += 1;
            }
        }

        info!(
            completed = stats.completed(),
            failed = stats.failed(),
            "worker pool finished"
        );
        if lost > 0 {
            return Err(PoolError::WorkersLost { count: lost });
        }

        Ok(Arc::try_unwrap(stats).unwrap_or_else(|shared| shared.snapshot()))
    }
}

async fn run_worker<T, K, F, Fut, E>(
    worker: usize,
    receiver: Arc<Mutex<mpsc::Receiver<WorkItem<T, K>>>>,
    handler: Arc<F>,
    sink: Arc<dyn ProgressSink<K>>,
    stats: Arc<PoolStats>,
) where
    T: fmt::Debug,
    K: fmt::Debug,
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: fmt::Display,
{
    loop {
        let next = receiver.lock().await.recv().await;
        let Some(WorkItem { payload, group }) = next else {
            break;
        };

        let item = format!("{payload:?}");
        let outcome = AssertUnwindSafe(async { (*handler)(payload).await })
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(())) => {
                sink.increment(&group);
                stats.completed.fetch_add(1, Ordering::SeqCst);
            }
            Ok(Err(error)) => {
                warn!(worker, ?group, %item, %error, "item failed");
                sink.failed(&group, &error);
                stats.failed.fetch_add(1, Ordering::SeqCst);
            }
            Err(_) => {
                warn!(worker, ?group, %item, "item handler panicked");
                sink.failed(&group, &"handler panicked");
                stats.failed.fetch_add(1, Ordering::SeqCst);
                stats.panicked.fetch_add(1, Ordering::SeqCst);
            }
        }
    }
    debug!(worker, "worker finished");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn noop(_: u32) -> std::future::Ready<Result<(), String>> {
        std::future::ready(Ok(()))
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_parallelism() {
        for value in [0, 257] {
            let result = WorkerPool::<u32, u32>::start(
                PoolConfig::with_parallelism(value),
                Arc::new(NoProgress),
                noop,
            );
            assert!(matches!(
                result,
                Err(PoolError::InvalidParallelism { value: v }) if v == value
            ));
        }
    }

    #[tokio::test]
    async fn test_panicking_handler_counts_as_failure() {
        let counters = Arc::new(GroupCounters::<u8>::new());
        let pool = WorkerPool::<u32, u8>::start(
            PoolConfig::with_parallelism(2),
            counters.clone(),
            |n: u32| async move {
                assert!(n != 3, "handler exploded");
                Ok::<(), String>(())
            },
        )
        .unwrap();

        let cancel = CancellationToken::new();
        for n in 0..6 {
            pool.submit(&cancel, WorkItem::new(n, 1u8)).await.unwrap();
        }
        let stats = pool.finish().await.unwrap();
        assert_eq!(stats.completed(), 5);
        assert_eq!(stats.failed(), 1);
        assert_eq!(stats.panicked(), 1);
        assert_eq!(counters.failures(&1), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_cancelled_while_queue_full() {
        let config = PoolConfig {
            parallelism: 1,
            queue_capacity: 1,
        };
        let pool = WorkerPool::<u32, u8>::start(config, Arc::new(NoProgress), |_: u32| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok::<(), String>(())
        })
        .unwrap();

        let cancel = CancellationToken::new();
        pool.submit(&cancel, WorkItem::new(1, 0u8)).await.unwrap();
        pool.submit(&cancel, WorkItem::new(2, 0u8)).await.unwrap();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });
        let result = pool.submit(&cancel, WorkItem::new(3, 0u8)).await;
        assert!(matches!(result, Err(PoolError::Cancelled)));
    }

    #[tokio::test]
    async fn test_finish_with_no_items() {
        let pool = WorkerPool::<u32, u8>::start(
            PoolConfig::with_parallelism(4),
            Arc::new(NoProgress),
            noop,
        )
        .unwrap();
        let stats = pool.finish().await.unwrap();
        assert_eq!(stats.total(), 0);
    }
}
