use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use service_core::error::ErrorResponse;
use std::time::Duration;
use thiserror::Error;

pub const INVALID_FILE_TYPE_MESSAGE: &str =
    "Invalid file type. Only PDF, PNG, and JPEG files are allowed.";

/// Every way a relayed upload can fail, from client input to the upstream call.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("No file uploaded")]
    NoFileUploaded,

    #[error("Invalid file type: {received}")]
    InvalidFileType { received: String },

    #[error("File exceeds the {limit} byte upload limit")]
    FileTooLarge { limit: u64 },

    #[error("Only one file may be uploaded per request")]
    MultipleFiles,

    #[error("Invalid multipart request: {0}")]
    InvalidMultipart(String),

    #[error("Upstream responded with {status}")]
    UpstreamStatus { status: StatusCode, body: String },

    #[error("Upstream did not respond within {0:?}")]
    UpstreamTimeout(Duration),

    #[error("Invalid JSON response from upstream: {0}")]
    InvalidUpstreamResponse(String),

    #[error("Upstream request failed: {0}")]
    UpstreamUnavailable(#[source] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl RelayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::NoFileUploaded
            | RelayError::InvalidFileType { .. }
            | RelayError::FileTooLarge { .. }
            | RelayError::MultipleFiles
            | RelayError::InvalidMultipart(_) => StatusCode::BAD_REQUEST,
            RelayError::UpstreamStatus { status, .. } => *status,
            RelayError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            RelayError::InvalidUpstreamResponse(_)
            | RelayError::UpstreamUnavailable(_)
            | RelayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Metric label for the request outcome.
    pub fn outcome(&self) -> &'static str {
        match self {
            RelayError::NoFileUploaded => "no_file",
            RelayError::InvalidFileType { .. } => "invalid_type",
            RelayError::FileTooLarge { .. } => "too_large",
            RelayError::MultipleFiles | RelayError::InvalidMultipart(_) => "bad_request",
            RelayError::UpstreamStatus { .. } => "upstream_error",
            RelayError::UpstreamTimeout(_) => "upstream_timeout",
            RelayError::InvalidUpstreamResponse(_) => "upstream_invalid_json",
            RelayError::UpstreamUnavailable(_) => "upstream_unavailable",
            RelayError::Internal(_) => "internal_error",
        }
    }

    /// Rejected before anything was sent upstream.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            RelayError::NoFileUploaded
                | RelayError::InvalidFileType { .. }
                | RelayError::FileTooLarge { .. }
                | RelayError::MultipleFiles
                | RelayError::InvalidMultipart(_)
        )
    }
}

/// Body returned when the upstream answered with a non-success status.
#[derive(Debug, Serialize)]
struct UpstreamErrorResponse {
    error: &'static str,
    details: String,
    status: u16,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if self.is_client_error() {
            tracing::warn!(error = %self, "Rejected upload");
        } else {
            tracing::error!(error = %self, status = %status, "Upload relay failed");
        }

        let body = match self {
            RelayError::UpstreamStatus { status, body } => {
                return (
                    status,
                    Json(UpstreamErrorResponse {
                        error: "API request failed",
                        details: body,
                        status: status.as_u16(),
                    }),
                )
                    .into_response();
            }
            RelayError::NoFileUploaded => ErrorResponse::new("No file uploaded", None),
            RelayError::InvalidFileType { received } => ErrorResponse::new(
                INVALID_FILE_TYPE_MESSAGE,
                Some(format!("Received content type '{}'", received)),
            ),
            RelayError::FileTooLarge { limit } => ErrorResponse::new(
                "File too large",
                Some(format!("Maximum upload size is {} bytes", limit)),
            ),
            RelayError::MultipleFiles => ErrorResponse::new("Only one file may be uploaded", None),
            RelayError::InvalidMultipart(details) => {
                ErrorResponse::new("Invalid multipart request", Some(details))
            }
            RelayError::UpstreamTimeout(after) => ErrorResponse::new(
                "Upstream request timed out",
                Some(format!("No response within {} seconds", after.as_secs())),
            ),
            RelayError::InvalidUpstreamResponse(details) => {
                ErrorResponse::new("Invalid JSON response from API", Some(details))
            }
            RelayError::UpstreamUnavailable(err) => {
                ErrorResponse::new("Server error", Some(err.to_string()))
            }
            RelayError::Internal(err) => {
                ErrorResponse::new("Server error", Some(format!("{:#}", err)))
            }
        };

        (status, Json(body)).into_response()
    }
}
