//! Ingestion orchestrator
//!
//! Runs one file through the pipeline:
//! 1. Check the database is reachable
//! 2. Open the row source
//! 3. Start the worker pool on a fresh job queue
//! 4. Feed rows into the queue (blocking when full), then close it
//! 5. Wait for the completion tracker to drain and join the workers

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::config::IngestConfig;
use super::error::{IngestError, IngestResult};
use super::inserter::RowInserter;
use super::queue::{JobQueue, JobSender};
use super::schema::Schema;
use super::source::RowSource;
use super::tracker::CompletionTracker;
use super::worker::WorkerPool;

/// Summary of a finished run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub rows_submitted: u64,
    pub rows_inserted: u64,
    pub rows_skipped: u64,
    pub elapsed: Duration,
}

impl IngestReport {
    /// Elapsed wall-clock time rounded up to whole seconds
    pub fn elapsed_secs(&self) -> u64 {
        let secs = self.elapsed.as_secs();
        if self.elapsed.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }
}

#[derive(Clone)]
pub struct IngestOrchestrator {
    config: IngestConfig,
    schema: Arc<Schema>,
    inserter: Arc<dyn RowInserter>,
}

impl IngestOrchestrator {
    pub fn new(config: IngestConfig, schema: Arc<Schema>, inserter: Arc<dyn RowInserter>) -> Self {
        Self {
            config,
            schema,
            inserter,
        }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Load the delimited file at `path`.
    #[instrument(skip(self), fields(file = %path.display()))]
    pub async fn run_file(&self, path: &Path) -> IngestResult<IngestReport> {
        let started = Instant::now();
        self.inserter.ready().await.map_err(IngestError::NotReady)?;

        let source = RowSource::open(path, self.schema.clone(), self.config.delimiter).await?;
        self.drive(source, started, &path.display().to_string()).await
    }

    /// Load delimited text from any reader, e.g. an in-memory buffer.
    #[instrument(skip(self, input))]
    pub async fn run_reader<R>(&self, input: R, label: &str) -> IngestResult<IngestReport>
    where
        R: AsyncRead + Unpin + Send,
    {
        let started = Instant::now();
        self.inserter.ready().await.map_err(IngestError::NotReady)?;

        let source = RowSource::new(input, self.schema.clone(), self.config.delimiter);
        self.drive(source, started, label).await
    }

    async fn drive<R>(
        &self,
        mut source: RowSource<R>,
        started: Instant,
        label: &str,
    ) -> IngestResult<IngestReport>
    where
        R: AsyncRead + Unpin + Send,
    {
        let (sender, receiver) = JobQueue::bounded(self.config.queue_capacity);
        let tracker = Arc::new(CompletionTracker::new());
        let cancel = CancellationToken::new();

        let pool = WorkerPool::spawn(
            &self.config,
            receiver,
            self.inserter.clone(),
            tracker.clone(),
            cancel.clone(),
        );

        let produced = produce(&mut source, &sender, &tracker, &cancel).await;
        sender.close();

        if let Err(ref err) = produced {
            warn!(error = %err, "Row source failed, finishing rows already queued");
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => debug!("Run cancelled before the tracker drained"),
            _ = tracker.wait_drained() => debug!("All submitted rows finished"),
        }

        let workers = pool.join().await?;
        let rows_submitted = produced?;

        let report = IngestReport {
            rows_submitted,
            rows_inserted: workers.iter().map(|w| w.inserted).sum(),
            rows_skipped: workers.iter().map(|w| w.skipped).sum(),
            elapsed: started.elapsed(),
        };

        info!(
            file = %label,
            rows = report.rows_inserted,
            skipped = report.rows_skipped,
            elapsed_secs = report.elapsed_secs(),
            "done in {} seconds",
            report.elapsed_secs()
        );

        Ok(report)
    }
}

/// Feed every row into the queue. Returns how many were handed off.
async fn produce<R>(
    source: &mut RowSource<R>,
    sender: &JobSender,
    tracker: &CompletionTracker,
    cancel: &CancellationToken,
) -> IngestResult<u64>
where
    R: AsyncRead + Unpin + Send,
{
    let mut submitted = 0;

    while let Some(row) = source.next_row().await? {
        if cancel.is_cancelled() {
            break;
        }

        tracker.submit();
        let handed_off = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = sender.submit(row) => Some(result),
        };

        match handed_off {
            Some(Ok(())) => submitted += 1,
            Some(Err(_)) if !cancel.is_cancelled() => {
                tracker.complete();
                return Err(IngestError::QueueClosed);
            },
            _ => {
                tracker.complete();
                break;
            },
        }
    }

    Ok(submitted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::error::InsertError;
    use crate::ingest::source::Row;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        rows: Mutex<Vec<Row>>,
    }

    #[async_trait]
    impl RowInserter for Recording {
        async fn insert(&self, row: &Row) -> Result<(), InsertError> {
            self.rows.lock().map_err(|e| InsertError::fatal(e.to_string()))?.push(row.clone());
            Ok(())
        }
    }

    struct Unreachable;

    #[async_trait]
    impl RowInserter for Unreachable {
        async fn ready(&self) -> Result<(), InsertError> {
            Err(InsertError::retryable("connection refused"))
        }

        async fn insert(&self, _row: &Row) -> Result<(), InsertError> {
            Err(InsertError::retryable("connection refused"))
        }
    }

    fn orchestrator(inserter: Arc<dyn RowInserter>) -> IngestOrchestrator {
        let config = IngestConfig {
            workers: 4,
            ..IngestConfig::default()
        };
        let schema = Arc::new(Schema::text("t", &["a", "b", "c"]).unwrap());
        IngestOrchestrator::new(config, schema, inserter)
    }

    #[test]
    fn test_elapsed_secs_rounds_up() {
        let report = IngestReport {
            rows_submitted: 0,
            rows_inserted: 0,
            rows_skipped: 0,
            elapsed: Duration::from_millis(1_200),
        };
        assert_eq!(report.elapsed_secs(), 2);

        let exact = IngestReport {
            elapsed: Duration::from_secs(3),
            ..report
        };
        assert_eq!(exact.elapsed_secs(), 3);
    }

    #[tokio::test]
    async fn test_run_reader_counts_rows() {
        let recording = Arc::new(Recording::default());
        let report = orchestrator(recording.clone())
            .run_reader("a,b,c\n1,2,3\n4,5,6\n".as_bytes(), "inline")
            .await
            .unwrap();

        assert_eq!(report.rows_submitted, 2);
        assert_eq!(report.rows_inserted, 2);
        assert_eq!(recording.rows.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_database_fails_before_reading() {
        let err = orchestrator(Arc::new(Unreachable))
            .run_reader("a,b,c\n1,2,3\n".as_bytes(), "inline")
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::NotReady(_)));
    }

    #[tokio::test]
    async fn test_source_error_after_rows_still_drains() {
        let recording = Arc::new(Recording::default());
        let err = orchestrator(recording.clone())
            .run_reader("a,b,c\n1,2,3\n4,5\n".as_bytes(), "inline")
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::Arity { line: 3, .. }));
        assert_eq!(recording.rows.lock().unwrap().len(), 1);
    }
}
