//! Bounded worker pool with per-worker resources.
//!
//! [`WorkPool`] fans a batch of items out over at most `size` tokio tasks.
//! Each worker opens its own context through [`Job::open_worker`] (for the
//! crawl: its own [`Fetcher`](crate::fetch::Fetcher)), then pulls items from a
//! shared backlog until it is empty or the pool is cancelled. The context is
//! dropped when the worker returns, whatever the exit path.
//!
//! Results are sent over a channel as soon as each item finishes, so they
//! arrive in completion order, not input order. A failed item (error or panic)
//! is logged and reported as `Output::default()`; the worker moves on to the
//! next item.
//!
//! All items are queued up front. The pool bounds concurrency, not queue
//! depth.

use futures::FutureExt;
use std::collections::VecDeque;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// One unit of work the pool can run over a batch of items.
pub trait Job: Send + Sync + 'static {
    type Item: Display + Send + 'static;
    type Output: Default + Send + 'static;
    /// Per-worker resource, opened once at worker start.
    type Worker: Send + 'static;
    type Error: Display + Send + 'static;

    fn open_worker(&self, worker_id: usize) -> Result<Self::Worker, Self::Error>;

    fn run(
        &self,
        worker: &mut Self::Worker,
        item: Self::Item,
    ) -> impl Future<Output = Result<Self::Output, Self::Error>> + Send;
}

/// Per-worker counters, reported when the worker exits.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStats {
    pub processed: usize,
    pub failed: usize,
}

/// Totals over all workers of one batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PoolSummary {
    pub workers: usize,
    pub processed: usize,
    pub failed: usize,
    /// Items never picked up, because of cancellation or dead workers.
    pub unprocessed: usize,
}

/// A running batch.
pub struct PoolRun<I, R> {
    results: mpsc::UnboundedReceiver<R>,
    workers: JoinSet<WorkerStats>,
    backlog: Arc<Mutex<VecDeque<I>>>,
    total: usize,
}

impl<I, R> PoolRun<I, R> {
    /// Number of items submitted.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Next finished result, or `None` once every worker has exited.
    pub async fn next(&mut self) -> Option<R> {
        self.results.recv().await
    }

    /// Wait for all workers and sum up their counters.
    pub async fn finish(mut self) -> PoolSummary {
        let mut summary = PoolSummary::default();
        while let Some(joined) = self.workers.join_next().await {
            match joined {
                Ok(stats) => {
                    summary.workers += 1;
                    summary.processed += stats.processed;
                    summary.failed += stats.failed;
                }
                Err(e) => error!(error = %e, "worker task ended abnormally"),
            }
        }
        summary.unprocessed = self.backlog.lock().map(|q| q.len()).unwrap_or_default();
        summary
    }
}

/// Fixed-size pool of worker tasks.
#[derive(Debug, Clone)]
pub struct WorkPool {
    size: usize,
    cancel: CancellationToken,
}

impl WorkPool {
    /// A pool of `size` workers (at least one).
    pub fn new(size: usize) -> Self {
        Self {
            size: size.max(1),
            cancel: CancellationToken::new(),
        }
    }

    /// Share an external cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Start `job` over `items`, returning a handle that yields results as
    /// they complete.
    pub fn spawn<J: Job>(&self, job: Arc<J>, items: Vec<J::Item>) -> PoolRun<J::Item, J::Output> {
        let total = items.len();
        let backlog: Arc<Mutex<VecDeque<J::Item>>> = Arc::new(Mutex::new(items.into()));
        let (tx, rx) = mpsc::unbounded_channel();
        let mut workers = JoinSet::new();
        let worker_count = self.size.min(total.max(1));

        for worker_id in 0..worker_count {
            let job = Arc::clone(&job);
            let backlog = Arc::clone(&backlog);
            let tx = tx.clone();
            let cancel = self.cancel.clone();
            workers.spawn(async move { work(worker_id, job, backlog, tx, cancel).await });
        }
        drop(tx);
        debug!(workers = worker_count, items = total, "pool started");

        PoolRun {
            results: rx,
            workers,
            backlog,
            total,
        }
    }
}

async fn work<J: Job>(
    worker_id: usize,
    job: Arc<J>,
    backlog: Arc<Mutex<VecDeque<J::Item>>>,
    tx: mpsc::UnboundedSender<J::Output>,
    cancel: CancellationToken,
) -> WorkerStats {
    let mut stats = WorkerStats::default();
    let mut worker = match job.open_worker(worker_id) {
        Ok(w) => w,
        Err(e) => {
            error!(worker_id, error = %e, "failed to open worker; leaving the pool");
            return stats;
        }
    };

    loop {
        if cancel.is_cancelled() {
            debug!(worker_id, "cancelled; not taking more items");
            break;
        }
        let Some(item) = backlog.lock().ok().and_then(|mut q| q.pop_front()) else {
            break;
        };
        let label = item.to_string();

        let outcome = AssertUnwindSafe(job.run(&mut worker, item))
            .catch_unwind()
            .await;
        stats.processed += 1;
        let output = match outcome {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                stats.failed += 1;
                warn!(worker_id, item = %label, error = %e, "item failed");
                J::Output::default()
            }
            Err(_) => {
                stats.failed += 1;
                error!(worker_id, item = %label, "item panicked");
                J::Output::default()
            }
        };
        if tx.send(output).is_err() {
            debug!(worker_id, "result receiver dropped");
            break;
        }
    }

    debug!(worker_id, processed = stats.processed, failed = stats.failed, "worker done");
    stats
}
