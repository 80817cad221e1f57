use axum::body::Bytes;
use chrono::Local;
use csvload_common::naming::timestamped_file_name;
use futures::Stream;
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use crate::features::FeatureState;
use crate::ingest::{IngestError, IngestReport};
use crate::storage::StorageError;

/// Multipart field carrying the uploaded file
pub const FILE_FIELD: &str = "file";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadCsvCommand {
    /// File name as sent by the client, if any
    pub original_name: Option<String>,
}

/// Body returned by `POST /upload`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    #[serde(rename = "IsSuccess")]
    pub is_success: bool,
    #[serde(rename = "FileName")]
    pub file_name: String,
}

impl UploadResult {
    pub fn success(file_name: impl Into<String>) -> Self {
        Self {
            is_success: true,
            file_name: file_name.into(),
        }
    }

    pub fn failure(file_name: impl Into<String>) -> Self {
        Self {
            is_success: false,
            file_name: file_name.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("No '{}' field in the upload form", FILE_FIELD)]
    MissingFile,
    #[error("Invalid multipart body: {0}")]
    Multipart(String),
    #[error("Failed to save upload: {0}")]
    Storage(#[from] StorageError),
    #[error("Ingestion failed: {0}")]
    Ingest(#[from] IngestError),
}

/// What happened to one upload
#[derive(Debug)]
pub struct UploadOutcome {
    /// Stored name, empty when nothing was stored
    pub file_name: String,
    pub result: Result<IngestReport, UploadError>,
}

impl UploadOutcome {
    pub fn rejected(err: UploadError) -> Self {
        Self {
            file_name: String::new(),
            result: Err(err),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

impl From<&UploadOutcome> for UploadResult {
    fn from(outcome: &UploadOutcome) -> Self {
        Self {
            is_success: outcome.is_success(),
            file_name: outcome.file_name.clone(),
        }
    }
}

impl UploadCsvCommand {
    /// Name the upload is stored under
    pub fn stored_name(&self) -> String {
        timestamped_file_name(self.original_name.as_deref().unwrap_or(""), &Local::now())
    }
}

/// Store the uploaded body, then run it through the pipeline.
///
/// The run is spawned onto its own task once the file is stored. Dropping the
/// request future (client gone, request timeout) stops waiting for the result but
/// never aborts the load.
#[tracing::instrument(skip(state, command, body), fields(original = ?command.original_name))]
pub async fn handle<S, E>(state: &FeatureState, command: UploadCsvCommand, body: S) -> UploadOutcome
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    let file_name = command.stored_name();

    let stored = match state.store.save(&file_name, body).await {
        Ok(stored) => stored,
        Err(err) => {
            tracing::warn!(file = %file_name, error = %err, "File {} Fail uploaded", file_name);
            return UploadOutcome {
                file_name,
                result: Err(err.into()),
            };
        },
    };

    let orchestrator = state.orchestrator.clone();
    let name = file_name.clone();
    let run = tokio::spawn(
        async move {
            let result = orchestrator.run_file(&stored.path).await;
            match &result {
                Ok(report) => tracing::info!(
                    file = %name,
                    rows = report.rows_inserted,
                    "File {} Uploaded successfully",
                    name
                ),
                Err(err) => tracing::error!(file = %name, error = %err, "Ingestion of {} failed", name),
            }
            result
        }
        .in_current_span(),
    );

    let result = match run.await {
        Ok(result) => result.map_err(UploadError::from),
        Err(join_error) => Err(IngestError::Worker(join_error).into()),
    };

    UploadOutcome { file_name, result }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_serializes_with_wire_names() {
        let body = serde_json::to_value(UploadResult::success("data-20240101000000.csv")).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"IsSuccess": true, "FileName": "data-20240101000000.csv"})
        );
    }

    #[test]
    fn test_stored_name_keeps_base_and_extension() {
        let command = UploadCsvCommand {
            original_name: Some("majestic_million.csv".to_string()),
        };
        let name = command.stored_name();
        assert!(name.starts_with("majestic_million-"));
        assert!(name.ends_with(".csv"));
        assert_eq!(name.len(), "majestic_million-".len() + 14 + ".csv".len());
    }

    #[test]
    fn test_stored_name_without_client_name() {
        let command = UploadCsvCommand { original_name: None };
        assert!(command.stored_name().starts_with("upload-"));
    }

    #[test]
    fn test_rejected_outcome_has_empty_name() {
        let outcome = UploadOutcome::rejected(UploadError::MissingFile);
        assert_eq!(UploadResult::from(&outcome), UploadResult::failure(""));
    }
}
