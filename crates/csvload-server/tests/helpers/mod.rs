//! Test helpers for csvload server integration tests
//!
//! This module provides:
//! - A recording in-memory `RowInserter`
//! - Orchestrator and router builders that need no database
//! - CSV fixture builders

#![allow(dead_code)]

use async_trait::async_trait;
use csvload_server::{
    config::Config,
    features::{self, FeatureState},
    ingest::{IngestConfig, IngestOrchestrator, InsertError, Row, RowInserter, Schema},
    storage::UploadStore,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Records every row it is asked to insert, optionally failing on some lines
#[derive(Default)]
pub struct RecordingInserter {
    rows: Mutex<Vec<Row>>,
    calls: AtomicUsize,
    fail_lines: Vec<u64>,
    not_ready: bool,
    delay: Option<Duration>,
}

impl RecordingInserter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fatal error for rows starting on any of `lines`
    pub fn failing_on(lines: &[u64]) -> Arc<Self> {
        Arc::new(Self {
            fail_lines: lines.to_vec(),
            ..Self::default()
        })
    }

    /// Reports the database as unreachable
    pub fn unreachable() -> Arc<Self> {
        Arc::new(Self {
            not_ready: true,
            ..Self::default()
        })
    }

    /// Takes `delay` per insert
    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Self::default()
        })
    }

    pub fn rows(&self) -> Vec<Row> {
        self.rows.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Inserted field tuples, sorted so runs can be compared as multisets
    pub fn sorted_fields(&self) -> Vec<Vec<String>> {
        let mut fields: Vec<_> = self.rows().into_iter().map(|r| r.fields).collect();
        fields.sort();
        fields
    }
}

#[async_trait]
impl RowInserter for RecordingInserter {
    async fn ready(&self) -> Result<(), InsertError> {
        if self.not_ready {
            return Err(InsertError::retryable("connection refused"));
        }
        Ok(())
    }

    async fn insert(&self, row: &Row) -> Result<(), InsertError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_lines.contains(&row.line) {
            return Err(InsertError::fatal(format!("rejected line {}", row.line)));
        }
        self.rows.lock().unwrap().push(row.clone());
        Ok(())
    }
}

pub fn abc_schema() -> Arc<Schema> {
    Arc::new(Schema::text("t", &["a", "b", "c"]).unwrap())
}

pub fn ingest_config(workers: usize) -> IngestConfig {
    IngestConfig {
        workers,
        ..IngestConfig::default()
    }
}

pub fn orchestrator(
    config: IngestConfig,
    schema: Arc<Schema>,
    inserter: Arc<RecordingInserter>,
) -> IngestOrchestrator {
    IngestOrchestrator::new(config, schema, inserter)
}

/// Router with the upload feature, storing into `upload_dir`
pub fn upload_app(upload_dir: &Path, orchestrator: IngestOrchestrator) -> axum::Router {
    let state = FeatureState {
        orchestrator,
        store: UploadStore::new(upload_dir),
    };

    let config = Config::default();
    features::router(state)
        .layer(csvload_server::middleware::tracing_layer())
        .layer(csvload_server::middleware::cors_layer(&config.cors))
}

/// `header` followed by `rows` lines of `n,n*2,n*3`
pub fn numbered_csv(header: &str, rows: usize) -> String {
    let mut csv = format!("{}\n", header);
    for n in 0..rows {
        csv.push_str(&format!("{},{},{}\n", n, n * 2, n * 3));
    }
    csv
}

/// Multipart body with one file field
pub fn multipart_body(boundary: &str, field: &str, file_name: &str, content: &str) -> String {
    format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n\
         Content-Type: text/csv\r\n\
         \r\n\
         {content}\r\n\
         --{boundary}--\r\n"
    )
}
