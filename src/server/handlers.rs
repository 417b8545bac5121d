// ============================================================
// Layer 1 — HTTP Handlers
// ============================================================
// Every failure leaves as JSON: { "error": { "message", "type" } }.
// Status codes:
//   413  upload larger than the configured body limit
//   400  not a multipart form, malformed form, undecodable scan
//   422  form without a `file` field
//   500  the classifier failed

use std::sync::Arc;

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Json, Multipart, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::data::preprocessor::UndecodableScan;
use crate::domain::{prediction::ScanUpload, traits::ScanClassifier};

/// Multipart field carrying the scan
pub const FILE_FIELD: &str = "file";

/// Shared application state
pub struct AppState {
    pub classifier: Arc<dyn ScanClassifier>,
}

impl AppState {
    pub fn new(classifier: Arc<dyn ScanClassifier>) -> Self {
        Self { classifier }
    }
}

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Classify one uploaded scan
pub async fn predict(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => {
            return error_response(rejection.status(), rejection.body_text(), "invalid_request_error");
        }
    };

    let upload = match read_upload(multipart).await {
        Ok(Some(upload)) => upload,
        Ok(None) => {
            return error_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("Missing multipart field '{FILE_FIELD}'"),
                "invalid_request_error",
            );
        }
        Err(e) => {
            let status = e.status();
            tracing::warn!("Rejected upload ({status}): {}", e.body_text());
            let kind = if status == StatusCode::PAYLOAD_TOO_LARGE {
                "payload_too_large_error"
            } else {
                "invalid_request_error"
            };
            return error_response(status, e.body_text(), kind);
        }
    };

    tracing::debug!(
        "Received {} bytes ({})",
        upload.bytes.len(),
        upload.filename.as_deref().unwrap_or("no filename")
    );

    // The model forward pass is CPU/GPU bound; keep it off the async workers
    let classifier = state.classifier.clone();
    let result = tokio::task::spawn_blocking(move || classifier.classify(&upload)).await;

    match result {
        Ok(Ok(prediction)) => (StatusCode::OK, Json(prediction)).into_response(),
        Ok(Err(e)) if e.downcast_ref::<UndecodableScan>().is_some() => {
            tracing::warn!("Rejected upload: {e:#}");
            error_response(StatusCode::BAD_REQUEST, e.to_string(), "invalid_image_error")
        }
        Ok(Err(e)) => {
            tracing::error!("Prediction failed: {e:#}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string(), "server_error")
        }
        Err(e) => {
            tracing::error!("Prediction task panicked: {e}");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Prediction task failed".to_string(),
                "server_error",
            )
        }
    }
}

/// First `file` field of the form, or None when the form has none.
/// Errors keep their own status so an oversized body maps to 413.
async fn read_upload(mut multipart: Multipart) -> Result<Option<ScanUpload>, MultipartError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let filename = field.file_name().map(str::to_string);
        let bytes = field.bytes().await?;
        return Ok(Some(ScanUpload::new(filename, bytes.to_vec())));
    }
    Ok(None)
}

fn error_response(status: StatusCode, message: String, kind: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: ErrorDetail {
                message,
                r#type: kind.to_string(),
            },
        }),
    )
        .into_response()
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub message: String,
    pub r#type: String,
}
