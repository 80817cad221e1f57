//! Concurrent delimited-file ingestion
//!
//! # Architecture
//!
//! - **schema**: target table and column kinds, statement building
//! - **source**: streaming CSV reader, header skipped, one `Row` per record
//! - **queue**: bounded multi-consumer job queue (capacity 0 is a rendezvous)
//! - **tracker**: outstanding-job counter the orchestrator waits on
//! - **inserter**: `RowInserter` seam and the PostgreSQL implementation
//! - **worker**: fixed pool of insert workers with bounded retry
//! - **orchestrator**: wires one run together and reports the outcome
//! - **config**: `INGEST_*` settings
//!
//! A run reads rows on the calling task while the pool inserts them. It returns
//! only after every submitted row has finished or the run was cancelled.

pub mod config;
pub mod error;
pub mod inserter;
pub mod orchestrator;
pub mod queue;
pub mod schema;
pub mod source;
pub mod tracker;
pub mod worker;

pub use config::{FailurePolicy, IngestConfig, RetryPolicy};
pub use error::{IngestError, IngestResult, InsertError};
pub use inserter::{PgRowInserter, RowInserter};
pub use orchestrator::{IngestOrchestrator, IngestReport};
pub use queue::{JobQueue, JobReceiver, JobSender};
pub use schema::{Column, ColumnKind, Schema};
pub use source::{Row, RowSource};
pub use tracker::CompletionTracker;
pub use worker::{WorkerPool, WorkerStats};
