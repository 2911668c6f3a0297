use actix_multipart::{Field, Multipart};
use actix_web::{web, HttpResponse};
use futures_util::stream::StreamExt;
use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::middleware::RequestId;
use crate::state::AppState;
use crate::transcription::UploadedAudio;

/// Name of the multipart field carrying the audio.
pub const FILE_FIELD: &str = "file";

/// Transcribe an uploaded audio file.
///
/// ## Endpoint: `POST /transcribe`
///
/// ## Request:
/// Multipart form data with the audio in a field named "file". The filename's
/// extension decides whether the upload is accepted.
///
/// ## Response:
/// ```json
/// {
///   "transcription": "Hello, this is a test.",
///   "language": "en",
///   "success": true,
///   "filename": "speech.mp3"
/// }
/// ```
pub async fn transcribe(
    state: web::Data<AppState>,
    request_id: RequestId,
    payload: Multipart,
) -> AppResult<HttpResponse> {
    let _in_flight = state.stats.begin();

    let upload = match read_upload(payload, state.config.max_upload_bytes()).await {
        Ok(upload) => upload,
        Err(e) => {
            info!(request_id = %request_id, error = %e, "Rejected malformed upload");
            state.stats.record_rejected();
            return Err(e);
        }
    };

    let outcome = state.transcription.transcribe(upload, request_id.0).await;
    state.stats.record(&outcome);

    Ok(HttpResponse::Ok().json(outcome?))
}

/// Pull the `file` field out of the multipart stream.
///
/// Other fields are drained and ignored, as is any repeat of `file`.
async fn read_upload(mut payload: Multipart, limit_bytes: usize) -> AppResult<UploadedAudio> {
    let mut upload: Option<UploadedAudio> = None;

    while let Some(item) = payload.next().await {
        let mut field: Field =
            item.map_err(|e| AppError::BadRequest(format!("Multipart error: {}", e)))?;

        let field_name = field.name().map(str::to_string);
        if upload.is_some() || field_name.as_deref() != Some(FILE_FIELD) {
            debug!(field = ?field_name, "Skipping multipart field");
            drain(&mut field).await?;
            continue;
        }

        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_string);
        let content_type = field.content_type().map(|mime| mime.to_string());

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk =
                chunk.map_err(|e| AppError::BadRequest(format!("Chunk error: {}", e)))?;
            if bytes.len() + chunk.len() > limit_bytes {
                return Err(AppError::PayloadTooLarge { limit_bytes });
            }
            bytes.extend_from_slice(&chunk);
        }

        upload = Some(UploadedAudio {
            filename,
            content_type,
            bytes,
        });
    }

    upload.ok_or_else(|| AppError::BadRequest(format!("No '{}' field provided", FILE_FIELD)))
}

async fn drain(field: &mut Field) -> AppResult<()> {
    while let Some(chunk) = field.next().await {
        chunk.map_err(|e| AppError::BadRequest(format!("Chunk error: {}", e)))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::middleware::{RequestLogging, REQUEST_ID_HEADER};
    use crate::transcription::engine::stub::StubTranscriber;
    use crate::transcription::{TempStorage, TranscriptionService};
    use actix_web::http::{header, StatusCode};
    use actix_web::{test, App};
    use std::sync::Arc;
    use tempfile::TempDir;

    const BOUNDARY: &str = "whisper-test-boundary";

    struct Part<'a> {
        name: &'a str,
        filename: Option<&'a str>,
        bytes: &'a [u8],
    }

    fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            let disposition = match part.filename {
                Some(filename) => format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                    part.name, filename
                ),
                None => format!("Content-Disposition: form-data; name=\"{}\"\r\n", part.name),
            };
            body.extend_from_slice(disposition.as_bytes());
            body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
            body.extend_from_slice(part.bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    fn upload_request(parts: &[Part<'_>]) -> test::TestRequest {
        test::TestRequest::post()
            .uri("/transcribe")
            .insert_header((
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            ))
            .set_payload(multipart_body(parts))
    }

    fn file_part<'a>(filename: &'a str, bytes: &'a [u8]) -> Part<'a> {
        Part {
            name: FILE_FIELD,
            filename: Some(filename),
            bytes,
        }
    }

    struct Fixture {
        tmp: TempDir,
        stub: Arc<StubTranscriber>,
        state: AppState,
    }

    fn fixture(stub: StubTranscriber, config: AppConfig) -> Fixture {
        let tmp = TempDir::new().unwrap();
        let stub = Arc::new(stub);
        let service = TranscriptionService::new(stub.clone(), TempStorage::new(tmp.path()));
        let state = AppState::new(config, service);
        Fixture { tmp, stub, state }
    }

    macro_rules! app {
        ($state:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($state.clone()))
                    .wrap(RequestLogging)
                    .configure(crate::handlers::configure_routes),
            )
            .await
        };
    }

    fn leftover_files(tmp: &TempDir) -> usize {
        std::fs::read_dir(tmp.path()).unwrap().count()
    }

    #[actix_web::test]
    async fn test_transcribe_success() {
        let f = fixture(StubTranscriber::returning(" hello world ", "en"), AppConfig::default());
        let app = app!(f.state);

        let resp = test::call_service(&app, upload_request(&[file_part("speech.mp3", b"audio")]).to_request()).await;

        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers().contains_key(REQUEST_ID_HEADER));
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(
            body,
            serde_json::json!({
                "transcription": "hello world",
                "language": "en",
                "success": true,
                "filename": "speech.mp3"
            })
        );
        assert_eq!(f.stub.calls()[0].bytes, b"audio");
        assert_eq!(leftover_files(&f.tmp), 0);

        let stats = f.state.stats.snapshot();
        assert_eq!((stats.total, stats.succeeded, stats.in_flight), (1, 1, 0));
    }

    #[actix_web::test]
    async fn test_unsupported_extension_rejected() {
        let f = fixture(StubTranscriber::returning("hi", "en"), AppConfig::default());
        let app = app!(f.state);

        let resp = test::call_service(&app, upload_request(&[file_part("notes.txt", b"text")]).to_request()).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["type"], "unsupported_format");
        assert!(f.stub.calls().is_empty());
        assert_eq!(leftover_files(&f.tmp), 0);
        assert_eq!(f.state.stats.snapshot().rejected, 1);
    }

    #[actix_web::test]
    async fn test_model_failure_is_opaque_500() {
        let f = fixture(StubTranscriber::failing(), AppConfig::default());
        let app = app!(f.state);

        let resp = test::call_service(&app, upload_request(&[file_part("corrupt.wav", b"junk")]).to_request()).await;

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["type"], "transcription_failed");
        assert_eq!(body["error"]["message"], "Error during transcription");
        assert!(!body.to_string().contains("tensor"));
        assert_eq!(leftover_files(&f.tmp), 0);
        assert_eq!(f.state.stats.snapshot().failed, 1);
    }

    #[actix_web::test]
    async fn test_model_panic_reported_as_transcription_failure() {
        let f = fixture(StubTranscriber::panicking(), AppConfig::default());
        let app = app!(f.state);

        let resp = test::call_service(&app, upload_request(&[file_part("corrupt.wav", b"junk")]).to_request()).await;

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["type"], "transcription_failed");
        assert!(!body.to_string().contains("blew up"));
        assert_eq!(leftover_files(&f.tmp), 0);
        assert_eq!(f.state.stats.snapshot().failed, 1);
    }

    #[actix_web::test]
    async fn test_missing_file_field() {
        let f = fixture(StubTranscriber::returning("hi", "en"), AppConfig::default());
        let app = app!(f.state);

        let resp = test::call_service(
            &app,
            upload_request(&[Part {
                name: "audio",
                filename: Some("speech.mp3"),
                bytes: b"audio",
            }])
            .to_request(),
        )
        .await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["type"], "bad_request");
        assert!(f.stub.calls().is_empty());
    }

    #[actix_web::test]
    async fn test_extra_fields_are_ignored() {
        let f = fixture(StubTranscriber::returning("hi", "en"), AppConfig::default());
        let app = app!(f.state);

        let resp = test::call_service(
            &app,
            upload_request(&[
                Part {
                    name: "language",
                    filename: None,
                    bytes: b"en",
                },
                file_part("clip.ogg", b"OggS"),
            ])
            .to_request(),
        )
        .await;

        assert_eq!(resp.status(), StatusCode::OK);
        let calls = f.stub.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].bytes, b"OggS");
    }

    #[actix_web::test]
    async fn test_oversized_upload_rejected() {
        let mut config = AppConfig::default();
        config.upload.max_file_size_mb = 1;
        let f = fixture(StubTranscriber::returning("hi", "en"), config);
        let app = app!(f.state);

        let big = vec![0u8; 1024 * 1024 + 1];
        let resp = test::call_service(&app, upload_request(&[file_part("long.wav", &big)]).to_request()).await;

        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["type"], "payload_too_large");
        assert!(f.stub.calls().is_empty());
        assert_eq!(leftover_files(&f.tmp), 0);
    }
}
