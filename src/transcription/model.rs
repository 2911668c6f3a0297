//! # Whisper Model Catalogue
//!
//! Which Whisper checkpoints the service can run and where their files come
//! from.
//!
//! ## Model Loading Process:
//! 1. Resolve the HuggingFace repository for the requested size
//! 2. Download config, tokenizer and safetensors weights (cached locally)
//! 3. Download the 80-bin mel filter bank used for spectrogram extraction
//!
//! The actual weight loading lives in [`crate::transcription::whisper`].

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use hf_hub::api::tokio::{Api, ApiBuilder};

/// Repository hosting the precomputed mel filter banks.
const MEL_FILTERS_REPO: &str = "FL33TW00D-HF/whisper-base";
const MEL_FILTERS_FILE: &str = "melfilters.bytes";

/// Available Whisper model sizes.
///
/// ## Trade-offs:
/// - **Size vs Accuracy**: Larger models are more accurate but slower
/// - **Memory**: Weights are memory-mapped, so RSS grows with the size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ModelSize {
    Tiny,
    Base,
    Small,
    Medium,
    Large,
}

impl ModelSize {
    /// Get the HuggingFace model repository name.
    pub fn repo_name(&self) -> &'static str {
        match self {
            ModelSize::Tiny => "openai/whisper-tiny",
            ModelSize::Base => "openai/whisper-base",
            ModelSize::Small => "openai/whisper-small",
            ModelSize::Medium => "openai/whisper-medium",
            ModelSize::Large => "openai/whisper-large-v2",
        }
    }

    /// Get the approximate model size in MB.
    pub fn size_mb(&self) -> u32 {
        match self {
            ModelSize::Tiny => 39,
            ModelSize::Base => 74,
            ModelSize::Small => 244,
            ModelSize::Medium => 769,
            ModelSize::Large => 1550,
        }
    }

    /// Get a human-readable description.
    pub fn description(&self) -> &'static str {
        match self {
            ModelSize::Tiny => "Fastest, basic accuracy",
            ModelSize::Base => "Fast, good default for a service",
            ModelSize::Small => "Balanced speed and accuracy",
            ModelSize::Medium => "Good accuracy, handles technical vocabulary",
            ModelSize::Large => "Best accuracy, slower processing",
        }
    }
}

impl std::str::FromStr for ModelSize {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "tiny" => Ok(ModelSize::Tiny),
            "base" => Ok(ModelSize::Base),
            "small" => Ok(ModelSize::Small),
            "medium" => Ok(ModelSize::Medium),
            "large" => Ok(ModelSize::Large),
            _ => Err(anyhow!("Unknown model size: {}", s)),
        }
    }
}

impl std::fmt::Display for ModelSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ModelSize::Tiny => "tiny",
            ModelSize::Base => "base",
            ModelSize::Small => "small",
            ModelSize::Medium => "medium",
            ModelSize::Large => "large",
        };
        write!(f, "{}", name)
    }
}

/// Local paths of a downloaded checkpoint.
#[derive(Debug, Clone)]
pub struct ModelFiles {
    pub config: PathBuf,
    pub tokenizer: PathBuf,
    pub weights: PathBuf,
    pub mel_filters: PathBuf,
}

impl ModelFiles {
    /// Download (or reuse from cache) everything needed to run `size`.
    ///
    /// ## Environment:
    /// - `HF_TOKEN`: optional access token
    /// - `HF_HUB_CACHE` / `HF_HOME`: cache location override
    pub async fn fetch(size: ModelSize) -> Result<Self> {
        let api = hub_api()?;

        tracing::info!("Fetching model files from {}", size.repo_name());
        let repo = api.model(size.repo_name().to_string());

        let config = repo
            .get("config.json")
            .await
            .map_err(|e| anyhow!("Failed to download config.json from {}: {}", size.repo_name(), e))?;
        let tokenizer = repo
            .get("tokenizer.json")
            .await
            .map_err(|e| anyhow!("Failed to download tokenizer.json from {}: {}", size.repo_name(), e))?;
        let weights = repo
            .get("model.safetensors")
            .await
            .map_err(|e| anyhow!("Failed to download model weights from {}: {}", size.repo_name(), e))?;

        let mel_filters = api
            .model(MEL_FILTERS_REPO.to_string())
            .get(MEL_FILTERS_FILE)
            .await
            .map_err(|e| anyhow!("Failed to download {} from {}: {}", MEL_FILTERS_FILE, MEL_FILTERS_REPO, e))?;

        tracing::debug!(?config, ?tokenizer, ?weights, ?mel_filters, "Model files ready");

        Ok(Self {
            config,
            tokenizer,
            weights,
            mel_filters,
        })
    }
}

fn hub_api() -> Result<Api> {
    let mut builder = ApiBuilder::new().with_progress(false);

    if let Ok(token) = std::env::var("HF_TOKEN") {
        tracing::debug!("Using HF token (length: {})", token.len());
        builder = builder.with_token(Some(token));
    }

    if let Ok(cache_dir) = std::env::var("HF_HUB_CACHE") {
        builder = builder.with_cache_dir(cache_dir.into());
    } else if let Ok(hf_home) = std::env::var("HF_HOME") {
        builder = builder.with_cache_dir(PathBuf::from(hf_home).join("hub"));
    }

    builder
        .build()
        .map_err(|e| anyhow!("Failed to create HuggingFace API client: {}", e))
}
