//! # Error Handling
//!
//! This module defines the HTTP-facing error type and how it is converted to
//! JSON responses.
//!
//! ## Layers:
//! - [`TranscribeError`] is the pipeline's own taxonomy (unsupported format,
//!   storage failure, model failure). It knows nothing about HTTP.
//! - [`AppError`] adds the failures that only exist at the HTTP edge
//!   (malformed multipart, oversized upload) and maps everything to a status
//!   code and a JSON body.
//!
//! ## JSON Response Format:
//! Every error carries `success: false` so clients can branch on one field:
//! ```json
//! {
//!   "success": false,
//!   "error": {
//!     "type": "unsupported_format",
//!     "message": "Unsupported file type. Please upload an audio file (mp3, wav, webm, m4a, ogg, flac)",
//!     "timestamp": "2025-01-01T12:00:00Z"
//!   }
//! }
//! ```

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

use crate::transcription::{AudioFormat, TranscribeError};

/// Custom error types for the HTTP layer.
///
/// ## Error Categories:
/// - **UnsupportedFormat**: Missing filename or extension not allowed (400)
/// - **BadRequest**: Malformed multipart body or missing `file` field (400)
/// - **PayloadTooLarge**: Upload exceeds the configured limit (413)
/// - **TranscriptionFailed**: The model could not transcribe the file (500)
/// - **StorageFailure**: The upload could not be staged on disk (500)
/// - **Internal**: Anything else that went wrong on our side (500)
#[derive(Debug)]
pub enum AppError {
    UnsupportedFormat,
    BadRequest(String),
    PayloadTooLarge { limit_bytes: usize },
    TranscriptionFailed,
    StorageFailure,
    Internal(String),
}

impl AppError {
    /// Machine-readable error type for the response body.
    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::UnsupportedFormat => "unsupported_format",
            AppError::BadRequest(_) => "bad_request",
            AppError::PayloadTooLarge { .. } => "payload_too_large",
            AppError::TranscriptionFailed => "transcription_failed",
            AppError::StorageFailure => "storage_failure",
            AppError::Internal(_) => "internal_error",
        }
    }
}

/// Client-facing messages. Server-side failures stay opaque; their details go
/// to the log, not the response.
impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::UnsupportedFormat => write!(
                f,
                "Unsupported file type. Please upload an audio file ({})",
                AudioFormat::supported_list()
            ),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::PayloadTooLarge { limit_bytes } => write!(
                f,
                "File too large (max: {} bytes)",
                limit_bytes
            ),
            AppError::TranscriptionFailed => write!(f, "Error during transcription"),
            AppError::StorageFailure => write!(f, "Failed to store uploaded file"),
            AppError::Internal(_) => write!(f, "Internal server error"),
        }
    }
}

/// ## HTTP Status Code Mapping:
/// - UnsupportedFormat/BadRequest → 400
/// - PayloadTooLarge → 413
/// - TranscriptionFailed/StorageFailure/Internal → 500
impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::UnsupportedFormat | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::TranscriptionFailed | AppError::StorageFailure | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "success": false,
            "error": {
                "type": self.error_type(),
                "message": self.to_string(),
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

/// Pipeline failures keep their category; the internal details are logged
/// here, at the point where they are dropped from the response.
impl From<TranscribeError> for AppError {
    fn from(err: TranscribeError) -> Self {
        match err {
            TranscribeError::UnsupportedFormat { .. } => AppError::UnsupportedFormat,
            TranscribeError::StorageFailure(e) => {
                tracing::error!(error = %e, "Failed to stage upload");
                AppError::StorageFailure
            }
            TranscribeError::TranscriptionFailed(e) => {
                tracing::error!(error = %format!("{:#}", e), "Error during transcription");
                AppError::TranscriptionFailed
            }
            TranscribeError::TaskAborted(msg) => {
                tracing::error!(error = %msg, "Transcription task aborted");
                AppError::Internal(msg)
            }
        }
    }
}

/// Shorthand for handler results.
pub type AppResult<T> = Result<T, AppError>;
