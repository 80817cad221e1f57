//! Worker pool: concurrent insert executors
//!
//! Each worker pulls rows off the shared queue and inserts them one at a time.
//! Per row: `Pending -> Attempting -> Succeeded | Attempting (retry) | Failed`.
//! Retryable failures back off and try again up to the policy's attempt limit.
//! A failed row either aborts the run or is skipped, per [`FailurePolicy`].

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::config::{FailurePolicy, IngestConfig, RetryPolicy};
use super::error::{IngestError, IngestResult};
use super::inserter::RowInserter;
use super::queue::JobReceiver;
use super::source::Row;
use super::tracker::CompletionTracker;

/// Per-worker counters, reported when the worker exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub worker: usize,
    pub processed: u64,
    pub inserted: u64,
    pub skipped: u64,
    /// Progress lines emitted, one per `progress_every` rows processed
    pub progress_reports: u64,
}

#[derive(Debug, Clone, Copy)]
struct WorkerSettings {
    retry: RetryPolicy,
    on_failure: FailurePolicy,
    progress_every: u64,
}

struct Worker {
    id: usize,
    receiver: JobReceiver,
    inserter: Arc<dyn RowInserter>,
    tracker: Arc<CompletionTracker>,
    settings: WorkerSettings,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(self) -> IngestResult<WorkerStats> {
        let mut stats = WorkerStats {
            worker: self.id,
            ..WorkerStats::default()
        };

        loop {
            let row = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                row = self.receiver.recv() => match row {
                    Some(row) => row,
                    None => break,
                },
            };

            match self.insert_with_retry(&row).await {
                Ok(()) => {
                    stats.inserted += 1;
                },
                Err(IngestError::Cancelled) => break,
                Err(err) => match self.settings.on_failure {
                    FailurePolicy::SkipRow => {
                        warn!(worker = self.id, line = row.line, error = %err, "Skipping row");
                        stats.skipped += 1;
                    },
                    FailurePolicy::AbortRun => {
                        error!(worker = self.id, line = row.line, error = %err, "Aborting run");
                        self.cancel.cancel();
                        return Err(err);
                    },
                },
            }

            self.tracker.complete();
            stats.processed += 1;

            if stats.processed % self.settings.progress_every == 0 {
                stats.progress_reports += 1;
                info!(
                    worker = self.id,
                    processed = stats.processed,
                    inserted = stats.inserted,
                    "Worker progress"
                );
            }
        }

        debug!(
            worker = self.id,
            processed = stats.processed,
            skipped = stats.skipped,
            "Worker finished"
        );
        Ok(stats)
    }

    async fn insert_with_retry(&self, row: &Row) -> IngestResult<()> {
        let retry = self.settings.retry;
        let mut attempt = 0;

        loop {
            attempt += 1;

            match self.inserter.insert(row).await {
                Ok(()) => return Ok(()),
                Err(err) if err.is_retryable() && attempt < retry.max_attempts => {
                    let delay = retry.backoff(attempt);
                    warn!(
                        worker = self.id,
                        line = row.line,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Insert failed, retrying"
                    );

                    tokio::select! {
                        _ = self.cancel.cancelled() => return Err(IngestError::Cancelled),
                        _ = tokio::time::sleep(delay) => {},
                    }
                },
                Err(err) => {
                    return Err(IngestError::Insert {
                        line: row.line,
                        attempts: attempt,
                        source: err,
                    })
                },
            }
        }
    }
}

/// A fixed set of workers sharing one queue, inserter and tracker
pub struct WorkerPool {
    tasks: JoinSet<IngestResult<WorkerStats>>,
    cancel: CancellationToken,
}

impl WorkerPool {
    pub fn spawn(
        config: &IngestConfig,
        receiver: JobReceiver,
        inserter: Arc<dyn RowInserter>,
        tracker: Arc<CompletionTracker>,
        cancel: CancellationToken,
    ) -> Self {
        let settings = WorkerSettings {
            retry: config.retry,
            on_failure: config.on_failure,
            progress_every: config.progress_every.max(1),
        };

        let mut tasks = JoinSet::new();
        for id in 0..config.workers {
            let worker = Worker {
                id,
                receiver: receiver.clone(),
                inserter: inserter.clone(),
                tracker: tracker.clone(),
                settings,
                cancel: cancel.clone(),
            };
            let cancel = cancel.clone();

            tasks.spawn(async move {
                match AssertUnwindSafe(worker.run()).catch_unwind().await {
                    Ok(result) => result,
                    Err(_) => {
                        error!(worker = id, "Worker panicked, aborting run");
                        cancel.cancel();
                        Err(IngestError::WorkerPanicked { worker: id })
                    },
                }
            });
        }

        debug!(workers = config.workers, "Worker pool started");
        Self { tasks, cancel }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for every worker. The first worker error, if any, is returned.
    pub async fn join(mut self) -> IngestResult<Vec<WorkerStats>> {
        let mut stats = Vec::with_capacity(self.tasks.len());
        let mut first_error = None;

        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(Ok(worker)) => stats.push(worker),
                Ok(Err(err)) => {
                    first_error.get_or_insert(err);
                },
                Err(join_error) => {
                    self.cancel.cancel();
                    first_error.get_or_insert(IngestError::Worker(join_error));
                },
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(stats),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::error::InsertError;
    use crate::ingest::queue::JobQueue;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Fails each row's first `failures` attempts with a retryable error
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl RowInserter for Flaky {
        async fn insert(&self, _row: &Row) -> Result<(), InsertError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(InsertError::retryable("connection reset"))
            } else {
                Ok(())
            }
        }
    }

    struct AlwaysFatal;

    #[async_trait]
    impl RowInserter for AlwaysFatal {
        async fn insert(&self, _row: &Row) -> Result<(), InsertError> {
            Err(InsertError::fatal("invalid input syntax"))
        }
    }

    fn config(workers: usize, on_failure: FailurePolicy) -> IngestConfig {
        IngestConfig {
            workers,
            queue_capacity: 4,
            retry: RetryPolicy {
                max_attempts: 3,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(2),
            },
            on_failure,
            ..IngestConfig::default()
        }
    }

    async fn run_rows(
        config: &IngestConfig,
        inserter: Arc<dyn RowInserter>,
        rows: u64,
    ) -> (IngestResult<Vec<WorkerStats>>, Arc<CompletionTracker>) {
        let (tx, rx) = JobQueue::bounded(config.queue_capacity);
        let tracker = Arc::new(CompletionTracker::new());
        let pool = WorkerPool::spawn(config, rx, inserter, tracker.clone(), CancellationToken::new());

        for n in 0..rows {
            tracker.submit();
            if tx.submit(Row::new(n + 2, vec![n.to_string()])).await.is_err() {
                tracker.complete();
                break;
            }
        }
        tx.close();

        (pool.join().await, tracker)
    }

    #[tokio::test]
    async fn test_retryable_errors_are_retried() {
        let inserter = Arc::new(Flaky {
            failures: 2,
            calls: AtomicU32::new(0),
        });
        let config = config(1, FailurePolicy::AbortRun);

        let (result, tracker) = run_rows(&config, inserter.clone(), 1).await;
        let stats = result.unwrap();

        assert_eq!(stats[0].inserted, 1);
        assert_eq!(inserter.calls.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_retry_limit_aborts_run() {
        let inserter = Arc::new(Flaky {
            failures: u32::MAX,
            calls: AtomicU32::new(0),
        });
        let config = config(1, FailurePolicy::AbortRun);

        let (result, _) = run_rows(&config, inserter.clone(), 1).await;
        match result {
            Err(IngestError::Insert { attempts, line, .. }) => {
                assert_eq!(attempts, 3);
                assert_eq!(line, 2);
            },
            other => panic!("expected insert error, got {:?}", other),
        }
        assert_eq!(inserter.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fatal_error_is_not_retried() {
        let config = config(2, FailurePolicy::AbortRun);
        let (result, _) = run_rows(&config, Arc::new(AlwaysFatal), 10).await;
        assert!(matches!(result, Err(IngestError::Insert { attempts: 1, .. })));
    }

    #[tokio::test]
    async fn test_skip_policy_keeps_going() {
        let config = config(3, FailurePolicy::SkipRow);
        let (result, tracker) = run_rows(&config, Arc::new(AlwaysFatal), 25).await;

        let stats = result.unwrap();
        let skipped: u64 = stats.iter().map(|s| s.skipped).sum();
        let inserted: u64 = stats.iter().map(|s| s.inserted).sum();
        assert_eq!(skipped, 25);
        assert_eq!(inserted, 0);
        assert_eq!(tracker.outstanding(), 0);
        assert_eq!(tracker.completed(), 25);
    }

    #[tokio::test]
    async fn test_progress_is_reported_per_worker() {
        let config = IngestConfig {
            progress_every: 10,
            ..config(1, FailurePolicy::AbortRun)
        };
        let inserter = Arc::new(Flaky {
            failures: 0,
            calls: AtomicU32::new(0),
        });

        let (result, _) = run_rows(&config, inserter, 35).await;
        let stats = result.unwrap();
        assert_eq!(stats[0].processed, 35);
        assert_eq!(stats[0].progress_reports, 3);
    }

    #[tokio::test]
    async fn test_progress_counts_are_not_shared_between_workers() {
        let config = IngestConfig {
            progress_every: 10,
            ..config(4, FailurePolicy::SkipRow)
        };

        let (result, _) = run_rows(&config, Arc::new(AlwaysFatal), 200).await;
        let stats = result.unwrap();

        let processed: u64 = stats.iter().map(|s| s.processed).sum();
        assert_eq!(processed, 200);
        for worker in &stats {
            assert_eq!(worker.progress_reports, worker.processed / 10);
        }
    }

    #[tokio::test]
    async fn test_pool_spawns_configured_workers() {
        let config = config(7, FailurePolicy::AbortRun);
        let (tx, rx) = JobQueue::bounded(0);
        let pool = WorkerPool::spawn(
            &config,
            rx,
            Arc::new(AlwaysFatal),
            Arc::new(CompletionTracker::new()),
            CancellationToken::new(),
        );
        assert_eq!(pool.len(), 7);

        tx.close();
        assert_eq!(pool.join().await.unwrap().len(), 7);
    }
}
