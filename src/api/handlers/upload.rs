use crate::AppState;
use crate::api::error::AppError;
use crate::services::staging::StagingError;
use crate::services::worker::{EnqueueOutcome, ScanRequest};
use crate::utils::validation::{ValidationError, validate_upload_name};
use axum::{
    Json,
    extract::{
        Multipart, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::StatusCode,
};
use futures::TryStreamExt;
use serde::Serialize;
use tokio_util::io::StreamReader;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadResponse {
    pub message: String,
    pub filename: String,
    pub path: String,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

fn multipart_error(e: &MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge("Request body exceeds the maximum allowed limit".to_string())
    } else {
        AppError::BadRequest(e.body_text())
    }
}

/// A failed body stream is the client's fault; anything else is a disk problem
fn staging_error(e: StagingError) -> AppError {
    let from_body = e
        .io_error()
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<MultipartError>())
        .map(multipart_error);

    from_body.unwrap_or(AppError::Staging(e))
}

#[utoipa::path(
    post,
    path = "/api/upload",
    request_body(content = Multipart, description = "Media file in the `file` field"),
    responses(
        (status = 200, description = "File staged for indexing", body = UploadResponse),
        (status = 400, description = "No file part, no file selected, or file type not allowed", body = ErrorResponse),
        (status = 413, description = "Upload exceeds the size limit", body = ErrorResponse)
    ),
    tag = "upload"
)]
pub async fn upload_file(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, AppError> {
    // Not a multipart body at all, so there is no `file` part to read
    let mut multipart = multipart.map_err(|rejection| {
        tracing::warn!("Upload rejected: {}", rejection.body_text());
        AppError::Validation(ValidationError::NoFilePart)
    })?;

    let result: Result<Json<UploadResponse>, AppError> = async {
        let mut stored = None;

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| multipart_error(&e))?
        {
            // Only the first `file` field is consumed; the rest is skipped
            if stored.is_some() || field.name() != Some("file") {
                continue;
            }

            let original_filename = field.file_name().unwrap_or_default().to_string();
            let accepted = validate_upload_name(&original_filename)?;

            let body_with_io_error = field.map_err(std::io::Error::other);
            let reader = StreamReader::new(body_with_io_error);

            let file = state
                .staging
                .write_stream(&accepted.filename, reader)
                .await
                .map_err(staging_error)?;

            tracing::info!(
                "📥 Staged {} upload {} ({} bytes)",
                accepted.category,
                file.path.display(),
                file.size
            );
            stored = Some((accepted.filename, file.path));
        }

        let (filename, path) = stored.ok_or(ValidationError::NoFilePart)?;

        match state.worker.try_enqueue(ScanRequest {
            trigger: filename.clone(),
        }) {
            EnqueueOutcome::Queued => {}
            EnqueueOutcome::Coalesced => {
                tracing::debug!("Scan queue full, {} will be covered by a pending scan", filename)
            }
            EnqueueOutcome::Closed => {
                tracing::warn!("Upload worker not running, {} stays staged", filename)
            }
        }

        Ok(Json(UploadResponse {
            message: "File uploaded successfully".to_string(),
            filename,
            path: path.display().to_string(),
        }))
    }
    .await;

    match result {
        Ok(res) => Ok(res),
        Err(e) => {
            // Drain the rest of the body so the client sees our response instead of a reset
            tracing::warn!("Upload rejected: {}. Consuming remaining stream...", e);
            while let Ok(Some(mut field)) = multipart.next_field().await {
                while let Ok(Some(_)) = field.chunk().await {}
            }
            Err(e)
        }
    }
}
