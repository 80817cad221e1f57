//! Feature modules implementing the HTTP API
//!
//! Each feature is a vertical slice with its own `commands/` and `routes.rs`.
//!
//! # Features
//!
//! - **uploads**: receive a delimited file, store it and load it into the database

pub mod uploads;

use axum::Router;

use crate::ingest::IngestOrchestrator;
use crate::storage::UploadStore;

/// Shared state for all feature routes
#[derive(Clone)]
pub struct FeatureState {
    /// Runs the ingestion pipeline on stored uploads
    pub orchestrator: IngestOrchestrator,
    /// Local directory uploads are written to
    pub store: UploadStore,
}

/// Creates the router with all feature routes mounted at the root
///
/// - `POST /upload` - upload and ingest a file
pub fn router(state: FeatureState) -> Router<()> {
    Router::new().merge(uploads::uploads_routes().with_state(state))
}
