//! # Transcription Request Pipeline
//!
//! Turns one uploaded file into one transcription response:
//!
//! `Received → Validated → Stored → Transcribed → Cleaned → Responded`
//!
//! A bad filename is rejected before anything touches the disk. Once the
//! upload is stored, the staged file is released on every exit path,
//! including model failures and panics on the blocking pool.

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::transcription::engine::{Transcriber, TranscriptionResult};
use crate::transcription::formats::AudioFormat;
use crate::transcription::storage::TempStorage;

/// Language reported when the model does not name one.
const UNKNOWN_LANGUAGE: &str = "unknown";

/// One incoming upload.
#[derive(Debug, Clone)]
pub struct UploadedAudio {
    /// Client supplied filename. Only its extension is inspected.
    pub filename: Option<String>,

    /// Declared content type. Logged, never trusted.
    pub content_type: Option<String>,

    pub bytes: Vec<u8>,
}

/// Success body for `POST /transcribe`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscriptionResponse {
    pub transcription: String,
    pub language: String,
    pub success: bool,
    pub filename: String,
}

/// Failure conditions of the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum TranscribeError {
    #[error("unsupported file type {filename:?}")]
    UnsupportedFormat { filename: Option<String> },

    #[error("temporary storage failed: {0}")]
    StorageFailure(#[source] std::io::Error),

    #[error("transcription failed: {0:#}")]
    TranscriptionFailed(anyhow::Error),

    #[error("transcription task aborted: {0}")]
    TaskAborted(String),
}

/// The transcription request handler.
///
/// Holds the shared, read-only model handle and the temp storage location.
/// Cloning is cheap and every clone shares the same model.
#[derive(Clone)]
pub struct TranscriptionService {
    transcriber: Arc<dyn Transcriber>,
    storage: TempStorage,
}

impl TranscriptionService {
    pub fn new(transcriber: Arc<dyn Transcriber>, storage: TempStorage) -> Self {
        Self { transcriber, storage }
    }

    pub fn transcriber(&self) -> &Arc<dyn Transcriber> {
        &self.transcriber
    }

    pub fn storage(&self) -> &TempStorage {
        &self.storage
    }

    /// Validate, stage, transcribe and clean up one upload.
    ///
    /// ## Blocking work:
    /// Writing the temp file, the model call and the deletion all run on the
    /// tokio blocking pool. The staged file is owned by that task, so a client
    /// that disconnects mid-request cannot pull the file out from under the
    /// model.
    pub async fn transcribe(
        &self,
        upload: UploadedAudio,
        request_id: Uuid,
    ) -> Result<TranscriptionResponse, TranscribeError> {
        let UploadedAudio { filename, content_type, bytes } = upload;

        let format = filename.as_deref().and_then(AudioFormat::from_filename);
        let (filename, format) = match (filename, format) {
            (Some(name), Some(format)) => (name, format),
            (filename, _) => {
                tracing::info!(
                    request_id = %request_id,
                    filename = ?filename,
                    content_type = ?content_type,
                    "Rejected upload with unsupported file type"
                );
                return Err(TranscribeError::UnsupportedFormat { filename });
            }
        };

        tracing::info!(
            request_id = %request_id,
            filename = %filename,
            format = %format,
            content_type = content_type.as_deref().unwrap_or("none"),
            size = bytes.len(),
            "Transcribing file"
        );

        let transcriber = Arc::clone(&self.transcriber);
        let storage = self.storage.clone();

        let outcome = tokio::task::spawn_blocking(move || {
            let staged = storage
                .stage(&bytes, format)
                .map_err(TranscribeError::StorageFailure)?;

            let result = transcriber
                .transcribe(staged.path())
                .map_err(TranscribeError::TranscriptionFailed);

            staged.release();
            result
        })
        .await;

        let TranscriptionResult { text, language } = match outcome {
            Ok(result) => result?,
            // A panic inside the model still unwinds through the staged
            // file's destructor before we get here.
            Err(e) if e.is_panic() => {
                return Err(TranscribeError::TranscriptionFailed(anyhow::anyhow!(
                    "model panicked: {}",
                    panic_message(e.into_panic())
                )));
            }
            Err(e) => return Err(TranscribeError::TaskAborted(e.to_string())),
        };

        let language = if language.trim().is_empty() {
            UNKNOWN_LANGUAGE.to_string()
        } else {
            language
        };

        tracing::info!(
            request_id = %request_id,
            filename = %filename,
            language = %language,
            chars = text.trim().len(),
            "Transcription completed"
        );

        Ok(TranscriptionResponse {
            transcription: text.trim().to_string(),
            language,
            success: true,
            filename,
        })
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(msg) => *msg,
        Err(payload) => payload
            .downcast_ref::<&str>()
            .map(|msg| msg.to_string())
            .unwrap_or_else(|| "unknown panic".to_string()),
    }
}
