//! Ingestion error types

use std::path::PathBuf;
use thiserror::Error;

/// Boxed error carried by [`InsertError`]
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type IngestResult<T> = Result<T, IngestError>;

/// Outcome of a single failed insert attempt
///
/// Inserters decide which failures are worth another attempt; workers only look at
/// the variant.
#[derive(Error, Debug)]
pub enum InsertError {
    #[error("transient database error: {0}")]
    Retryable(#[source] BoxError),

    #[error("database error: {0}")]
    Fatal(#[source] BoxError),
}

impl InsertError {
    pub fn retryable(err: impl Into<BoxError>) -> Self {
        Self::Retryable(err.into())
    }

    pub fn fatal(err: impl Into<BoxError>) -> Self {
        Self::Fatal(err.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }
}

/// Errors that end an ingestion run
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Invalid schema: {0}")]
    Schema(String),

    #[error("Failed to open source {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed record: {0}")]
    Csv(#[from] csv_async::Error),

    #[error("Line {line}: {reason}")]
    Malformed { line: u64, reason: &'static str },

    #[error("Line {line}: expected {expected} fields, found {found}")]
    Arity {
        line: u64,
        expected: usize,
        found: usize,
    },

    #[error("Line {line}: column {column} expects an integer, got '{value}'")]
    InvalidValue {
        line: u64,
        column: String,
        value: String,
    },

    #[error("Database is not ready: {0}")]
    NotReady(#[source] InsertError),

    #[error("Line {line}: insert failed after {attempts} attempt(s): {source}")]
    Insert {
        line: u64,
        attempts: u32,
        #[source]
        source: InsertError,
    },

    #[error("Job queue closed before all rows were submitted")]
    QueueClosed,

    #[error("Run cancelled")]
    Cancelled,

    #[error("Worker {worker} panicked")]
    WorkerPanicked { worker: usize },

    #[error("Worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl IngestError {
    /// Errors caused by the uploaded content rather than the infrastructure
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::Open { .. }
                | Self::Csv(_)
                | Self::Malformed { .. }
                | Self::Arity { .. }
                | Self::InvalidValue { .. }
        )
    }
}
