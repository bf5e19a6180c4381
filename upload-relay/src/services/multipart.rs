//! Single-file extraction from `multipart/form-data` bodies.
//!
//! The part named `file` is the upload. Its content type is checked from the
//! part headers before any of its body is read, so a disallowed file aborts
//! the request without being buffered.

use crate::config::UploadConfig;
use crate::error::RelayError;
use crate::models::{AllowedMimeType, UploadedFile};
use axum::body::Bytes;
use axum::extract::multipart::{Field, MultipartError};
use axum::extract::Multipart;
use axum::http::StatusCode;
use std::path::Path;
use tokio::io::AsyncWriteExt;

pub const FILE_FIELD: &str = "file";

/// Parse the request body to completion and return the one uploaded file.
///
/// Non-file fields are skipped. A second `file` part is rejected so that
/// exactly one file is relayed per request.
pub async fn extract_single_file(
    mut multipart: Multipart,
    limits: &UploadConfig,
) -> Result<UploadedFile, RelayError> {
    let limit = limits.max_file_size;
    let mut uploaded: Option<UploadedFile> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| map_multipart_error(e, limit))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        // No filename: a plain form value. Empty filename: a form submitted
        // with no file selected.
        let filename = match field.file_name() {
            Some(name) if !name.trim().is_empty() => name.to_string(),
            _ => continue,
        };

        if uploaded.is_some() {
            return Err(RelayError::MultipleFiles);
        }

        let content_type = field.content_type().unwrap_or_default().to_string();
        let mime_type = AllowedMimeType::from_content_type(&content_type).ok_or_else(|| {
            RelayError::InvalidFileType {
                received: if content_type.is_empty() {
                    "none".to_string()
                } else {
                    content_type.clone()
                },
            }
        })?;

        let file = match &limits.spool_dir {
            Some(dir) => spool_field(field, dir, filename, mime_type, limit).await?,
            None => buffer_field(field, filename, mime_type, limit).await?,
        };

        uploaded = Some(file);
    }

    uploaded.ok_or(RelayError::NoFileUploaded)
}

async fn buffer_field(
    mut field: Field<'_>,
    filename: String,
    mime_type: AllowedMimeType,
    max_file_size: u64,
) -> Result<UploadedFile, RelayError> {
    let mut data = Vec::new();

    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| map_multipart_error(e, max_file_size))?
    {
        check_size(data.len() as u64 + chunk.len() as u64, max_file_size)?;
        data.extend_from_slice(&chunk);
    }

    Ok(UploadedFile::in_memory(filename, mime_type, Bytes::from(data)))
}

async fn spool_field(
    mut field: Field<'_>,
    dir: &Path,
    filename: String,
    mime_type: AllowedMimeType,
    max_file_size: u64,
) -> Result<UploadedFile, RelayError> {
    let spool = tempfile::Builder::new()
        .prefix("upload-")
        .tempfile_in(dir)
        .map_err(|e| {
            RelayError::Internal(anyhow::anyhow!(
                "Failed to create spool file in {}: {}",
                dir.display(),
                e
            ))
        })?;

    let handle = spool
        .as_file()
        .try_clone()
        .map_err(|e| RelayError::Internal(anyhow::anyhow!("Failed to open spool file: {}", e)))?;
    let mut writer = tokio::fs::File::from_std(handle);
    let mut size: u64 = 0;

    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| map_multipart_error(e, max_file_size))?
    {
        size += chunk.len() as u64;
        check_size(size, max_file_size)?;
        writer.write_all(&chunk).await.map_err(|e| {
            RelayError::Internal(anyhow::anyhow!("Failed to write spool file: {}", e))
        })?;
    }
    writer
        .flush()
        .await
        .map_err(|e| RelayError::Internal(anyhow::anyhow!("Failed to flush spool file: {}", e)))?;

    tracing::debug!(path = %spool.path().display(), size, "Upload spooled to disk");

    Ok(UploadedFile::spooled(filename, mime_type, spool, size))
}

fn check_size(size: u64, limit: u64) -> Result<(), RelayError> {
    if size > limit {
        Err(RelayError::FileTooLarge { limit })
    } else {
        Ok(())
    }
}

/// The request-wide body limit surfaces as a multipart error with status 413.
fn map_multipart_error(err: MultipartError, limit: u64) -> RelayError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        RelayError::FileTooLarge { limit }
    } else {
        RelayError::InvalidMultipart(err.body_text())
    }
}
