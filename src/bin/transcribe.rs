//! One-shot transcription of a local file.
//!
//! Prints `{"transcription", "language", "success": true}` to stdout, or
//! `{"error", "success": false}` to stderr with exit code 1. Logs go to
//! stderr so stdout stays machine readable.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use serde_json::{json, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use whisper_service::device::{DeviceManager, DevicePreference};
use whisper_service::transcription::{ModelSize, Transcriber, TranscriptionResult, WhisperTranscriber};

#[derive(Parser, Debug)]
#[command(name = "transcribe", version, about = "Transcribe an audio file with Whisper")]
struct Cli {
    /// Audio file to transcribe
    audio_file_path: PathBuf,

    /// Whisper model size (tiny, base, small, medium, large)
    #[arg(short, long, default_value = "base")]
    model: ModelSize,

    /// Compute device (auto, cpu, cuda, metal)
    #[arg(short, long, default_value = "auto")]
    device: DevicePreference,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    match run(&cli).await {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(output) => {
            eprintln!("{}", output);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> Result<Value, Value> {
    if !cli.audio_file_path.exists() {
        return Err(not_found(&cli.audio_file_path));
    }

    let device = DeviceManager::get_device(cli.device);
    let transcriber = WhisperTranscriber::load(cli.model, device)
        .await
        .map_err(|e| failure(&e))?;

    let path = cli.audio_file_path.clone();
    let result = tokio::task::spawn_blocking(move || transcriber.transcribe(&path))
        .await
        .map_err(|e| failure(&anyhow::Error::new(e)))?
        .map_err(|e| failure(&e))?;

    Ok(success(result))
}

fn success(result: TranscriptionResult) -> Value {
    let language = if result.language.trim().is_empty() {
        "unknown".to_string()
    } else {
        result.language
    };
    json!({
        "transcription": result.text.trim(),
        "language": language,
        "success": true
    })
}

fn not_found(path: &Path) -> Value {
    json!({
        "error": format!("Audio file '{}' not found", path.display()),
        "success": false
    })
}

fn failure(err: &anyhow::Error) -> Value {
    json!({
        "error": format!("Error during transcription: {:#}", err),
        "success": false
    })
}

fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "whisper_service=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
