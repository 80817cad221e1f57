//! csvload Server Library
//!
//! HTTP service that loads uploaded delimited files into PostgreSQL.
//!
//! # Overview
//!
//! - **API**: `POST /upload` stores a file and ingests it, `GET /health` checks the database
//! - **Ingestion**: streaming reader, bounded job queue and a fixed pool of insert workers
//! - **Database**: PostgreSQL through a SQLx connection pool
//! - **Storage**: uploads are written to a local directory
//! - **Middleware**: CORS, request logging and timeouts
//!
//! # Example
//!
//! ```no_run
//! use csvload_server::ingest::{IngestConfig, IngestOrchestrator, PgRowInserter};
//! use std::sync::Arc;
//!
//! # async fn run(pool: sqlx::PgPool) -> anyhow::Result<()> {
//! let config = IngestConfig::default();
//! let schema = Arc::new(config.schema()?);
//! let inserter = Arc::new(PgRowInserter::new(pool, schema.clone()));
//! let orchestrator = IngestOrchestrator::new(config, schema, inserter);
//!
//! let report = orchestrator.run_file("static/majestic_million.csv".as_ref()).await?;
//! println!("{} rows in {}s", report.rows_inserted, report.elapsed_secs());
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod features;
pub mod ingest;
pub mod middleware;
pub mod storage;

// Re-export commonly used types
pub use error::{AppError, ServerResult};
