use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};

use super::commands::{upload, UploadCsvCommand, UploadError, UploadOutcome, UploadResult, FILE_FIELD};
use crate::features::FeatureState;

pub fn uploads_routes() -> Router<FeatureState> {
    Router::new().route("/upload", post(upload_file))
}

/// `POST /upload`: always 200 with `{"IsSuccess", "FileName"}`.
#[tracing::instrument(skip(state, multipart))]
async fn upload_file(
    State(state): State<FeatureState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let mut multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => {
            let outcome = UploadOutcome::rejected(UploadError::Multipart(rejection.body_text()));
            return respond(&outcome);
        },
    };

    loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some(FILE_FIELD) => {
                let command = UploadCsvCommand {
                    original_name: field.file_name().map(str::to_string),
                };
                let outcome = upload::handle(&state, command, field).await;
                return respond(&outcome);
            },
            Ok(Some(field)) => {
                tracing::debug!(field = ?field.name(), "Ignoring form field");
            },
            Ok(None) => break,
            Err(e) => {
                let outcome = UploadOutcome::rejected(UploadError::Multipart(e.body_text()));
                return respond(&outcome);
            },
        }
    }

    respond(&UploadOutcome::rejected(UploadError::MissingFile))
}

fn respond(outcome: &UploadOutcome) -> Response {
    if let Err(ref err) = outcome.result {
        tracing::warn!(file = %outcome.file_name, error = %err, "Upload not loaded");
    }

    match serde_json::to_vec(&UploadResult::from(outcome)) {
        Ok(body) => (StatusCode::OK, [(header::CONTENT_TYPE, "application/json")], body).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize upload result");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        },
    }
}
