use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

/// Liveness probe.
///
/// ## Endpoint: `GET /`
pub async fn root() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "message": "Whisper Transcription Service is running",
        "status": "healthy"
    }))
}

/// Service status, model details and request counters.
///
/// ## Endpoint: `GET /health`
///
/// The server only starts listening after the model has loaded, so
/// `model_loaded` is always true when this handler can answer.
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let transcriber = state.transcription.transcriber();
    let stats = state.stats.snapshot();

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "service": "whisper-transcription",
        "model_loaded": true,
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.get_uptime_seconds(),
        "model": {
            "name": transcriber.model_name(),
            "device": transcriber.device_name()
        },
        "transcriptions": stats
    }))
}
