use crate::error::RelayError;
use crate::models::UploadedFile;
use crate::services::{
    extract_single_file, record_compression, record_upload, record_upload_size, record_upstream,
    should_compress, try_compress,
};
use crate::startup::AppState;
use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    Extension, Json,
};
use serde_json::Value;
use service_core::middleware::RequestId;
use std::time::Instant;

/// `POST /upload` and `POST /api/upload`.
///
/// Parses the single `file` part, shrinks large images, relays the file to
/// the analysis API and returns its JSON unchanged. Any spool file is removed
/// when this returns.
pub async fn upload_file(
    State(state): State<AppState>,
    request_id: Option<Extension<RequestId>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, RelayError> {
    let request_id = request_id.map(|Extension(id)| id.0);

    let result = relay_upload(&state, request_id.as_deref(), multipart).await;
    match &result {
        Ok(_) => record_upload("success"),
        Err(e) => record_upload(e.outcome()),
    }

    result.map(Json)
}

async fn relay_upload(
    state: &AppState,
    request_id: Option<&str>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Value, RelayError> {
    let multipart = multipart.map_err(|e| RelayError::InvalidMultipart(e.body_text()))?;
    let file = extract_single_file(multipart, &state.config.upload).await?;

    record_upload_size(file.size);
    tracing::info!(
        filename = %file.filename,
        mime_type = %file.mime_type,
        size = file.size,
        spooled = file.is_spooled(),
        "Upload received"
    );

    let file = maybe_compress(state, file).await;

    let started = Instant::now();
    let result = state.relay.analyze(&file, request_id).await;
    let elapsed = started.elapsed();
    record_upstream(
        elapsed,
        match &result {
            Ok(_) => "success",
            Err(e) => e.outcome(),
        },
    );

    let analysis = result?;

    tracing::info!(
        filename = %file.filename,
        elapsed_ms = elapsed.as_millis() as u64,
        "Upload relayed"
    );

    Ok(analysis)
}

/// Swap in a JPEG re-encode when the file qualifies. Falls back to the
/// original bytes if the image cannot be decoded or encoded.
async fn maybe_compress(state: &AppState, file: UploadedFile) -> UploadedFile {
    let config = &state.config.compression;
    if !should_compress(file.mime_type, file.size, config) {
        return file;
    }

    match try_compress(&file, config).await {
        Ok(compressed) => {
            record_compression("compressed");
            compressed
        }
        Err(e) => {
            record_compression("failed");
            tracing::warn!(
                filename = %file.filename,
                error = %e,
                "Image compression failed, forwarding original"
            );
            file
        }
    }
}
