//! # Whisper Transcription Service - Main Application Entry Point
//!
//! Loads the configuration and the Whisper model, then serves:
//! - `POST /transcribe`: multipart audio upload, returns text and language
//! - `GET /health`: service status and counters
//! - `GET /`: liveness probe
//!
//! The model is loaded before the server binds. If it cannot be loaded the
//! process exits with an error instead of serving requests it can't answer.

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Result;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use whisper_service::config::AppConfig;
use whisper_service::device::DeviceManager;
use whisper_service::handlers;
use whisper_service::middleware::RequestLogging;
use whisper_service::state::AppState;
use whisper_service::transcription::{TempStorage, Transcriber, TranscriptionService, WhisperTranscriber};

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting whisper-service v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}", config.bind_addr());

    let model_size = config.whisper_model()?;
    let device = DeviceManager::get_device(config.device_preference()?);
    info!(
        "Loading Whisper model '{}' on {}...",
        model_size,
        DeviceManager::get_device_info(&device)
    );

    let transcriber = WhisperTranscriber::load(model_size, device)
        .await
        .map_err(|e| {
            error!("Failed to load Whisper model: {:#}", e);
            e
        })?;
    info!("Model loaded: {}", transcriber.model_name());

    let storage = TempStorage::new(config.temp_dir());
    info!("Staging uploads in {}", storage.dir().display());

    let service = TranscriptionService::new(Arc::new(transcriber), storage);
    let app_state = AppState::new(config.clone(), service);
    let bind_addr = config.bind_addr();

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        // Middleware runs in reverse order of registration on the way in
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(Logger::default())
            .wrap(RequestLogging)
            .configure(handlers::configure_routes)
    })
    .disable_signals()
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
                Ok(Ok(())) => {}
            }
        }
        signal = wait_for_shutdown() => {
            signal?;
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Console logging filtered by `RUST_LOG`, defaulting to
/// "whisper_service=debug,actix_web=info".
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "whisper_service=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}

/// Resolves on SIGINT or SIGTERM (Ctrl+C only on non-unix targets).
async fn wait_for_shutdown() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
