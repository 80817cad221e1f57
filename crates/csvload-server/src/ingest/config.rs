//! Ingestion configuration
//!
//! Pool size, queue capacity, retry and failure behaviour for one ingestion run.
//! Built once at startup and passed to [`IngestOrchestrator`](super::IngestOrchestrator).

use csvload_common::env;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::IngestResult;
use super::schema::{Schema, DEFAULT_TABLE};

/// Default number of concurrent insert workers.
pub const DEFAULT_WORKERS: usize = 100;

/// Default queue capacity. Zero means rendezvous handoff.
pub const DEFAULT_QUEUE_CAPACITY: usize = 0;

/// Default number of jobs between per-worker progress lines.
pub const DEFAULT_PROGRESS_EVERY: u64 = 100;

/// Default attempts per row, including the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 50;

pub const DEFAULT_MAX_BACKOFF_MS: u64 = 2_000;

/// Bounded retry with doubling backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay after failed attempt number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: Duration::from_millis(DEFAULT_INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(DEFAULT_MAX_BACKOFF_MS),
        }
    }
}

/// What a run does once a row has failed for good
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop the run and report it as failed
    #[default]
    AbortRun,
    /// Log the row, count it as skipped and keep going
    SkipRow,
}

impl std::str::FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "abort" | "abort_run" => Ok(FailurePolicy::AbortRun),
            "skip" | "skip_row" => Ok(FailurePolicy::SkipRow),
            other => Err(format!("expected 'abort' or 'skip', got '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    pub progress_every: u64,
    pub delimiter: u8,
    pub retry: RetryPolicy,
    pub on_failure: FailurePolicy,
    pub table: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            progress_every: DEFAULT_PROGRESS_EVERY,
            delimiter: b',',
            retry: RetryPolicy::default(),
            on_failure: FailurePolicy::default(),
            table: DEFAULT_TABLE.to_string(),
        }
    }
}

impl IngestConfig {
    /// Read `INGEST_*` overrides on top of the defaults
    pub fn from_env() -> csvload_common::Result<Self> {
        let defaults = Self::default();

        let delimiter = match env::var("INGEST_DELIMITER") {
            None => defaults.delimiter,
            Some(raw) => parse_delimiter(&raw)?,
        };

        Ok(Self {
            workers: env::parse_or("INGEST_WORKERS", defaults.workers)?,
            queue_capacity: env::parse_or("INGEST_QUEUE_CAPACITY", defaults.queue_capacity)?,
            progress_every: env::parse_or("INGEST_PROGRESS_EVERY", defaults.progress_every)?,
            delimiter,
            retry: RetryPolicy {
                max_attempts: env::parse_or("INGEST_MAX_ATTEMPTS", defaults.retry.max_attempts)?,
                initial_backoff: Duration::from_millis(env::parse_or(
                    "INGEST_INITIAL_BACKOFF_MS",
                    DEFAULT_INITIAL_BACKOFF_MS,
                )?),
                max_backoff: Duration::from_millis(env::parse_or(
                    "INGEST_MAX_BACKOFF_MS",
                    DEFAULT_MAX_BACKOFF_MS,
                )?),
            },
            on_failure: env::parse_or("INGEST_ON_FAILURE", defaults.on_failure)?,
            table: env::var("INGEST_TABLE").unwrap_or(defaults.table),
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.workers == 0 {
            anyhow::bail!("Ingest workers must be greater than 0");
        }
        if self.retry.max_attempts == 0 {
            anyhow::bail!("Ingest max_attempts must be greater than 0");
        }
        if self.progress_every == 0 {
            anyhow::bail!("Ingest progress_every must be greater than 0");
        }
        if self.table.trim().is_empty() {
            anyhow::bail!("Ingest table name cannot be empty");
        }
        Ok(())
    }

    /// Domain schema for the configured table
    pub fn schema(&self) -> IngestResult<Schema> {
        Schema::domain(self.table.clone())
    }
}

fn parse_delimiter(raw: &str) -> csvload_common::Result<u8> {
    let value = match raw {
        "\\t" | "tab" => "\t",
        other => other,
    };
    match value.as_bytes() {
        [byte] => Ok(*byte),
        _ => Err(csvload_common::CsvloadError::InvalidEnv {
            key: "INGEST_DELIMITER".to_string(),
            value: raw.to_string(),
            reason: "delimiter must be a single byte".to_string(),
        }),
    }
}
