//! # Configuration Management
//!
//! This module handles loading and managing application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. `HOST` / `PORT` environment variables (deployment platforms)
//! 2. Environment variables (`APP_SERVER__PORT`, `APP_MODELS__WHISPER_MODEL`, ...)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)
//!
//! Nested keys are separated by a double underscore so that field names which
//! themselves contain underscores (`max_file_size_mb`) stay intact.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::device::DevicePreference;
use crate::transcription::model::ModelSize;

const BYTES_PER_MB: usize = 1024 * 1024;

/// Main application configuration that contains all settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub models: ModelsConfig,
    pub upload: UploadConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (containers, production)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Speech model configuration.
///
/// ## Fields:
/// - `whisper_model`: Which Whisper checkpoint to load ("tiny", "base", "small", "medium", "large")
/// - `device`: Where to run it ("auto", "cpu", "cuda", "metal")
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    pub whisper_model: String,
    pub device: String,
}

/// Upload handling.
///
/// ## Fields:
/// - `max_file_size_mb`: Uploads larger than this are rejected with 413
/// - `temp_dir`: Where uploads are staged while being transcribed (system temp dir if unset)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    pub max_file_size_mb: usize,
    #[serde(default)]
    pub temp_dir: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
            },
            models: ModelsConfig {
                whisper_model: "base".to_string(),
                device: "auto".to_string(),
            },
            upload: UploadConfig {
                max_file_size_mb: 50,
                temp_dir: None,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__HOST=127.0.0.1`: Override server host
    /// - `APP_MODELS__WHISPER_MODEL=small`: Override whisper model
    /// - `APP_UPLOAD__MAX_FILE_SIZE_MB=100`: Raise the upload limit
    /// - `PORT=3000`: Special case for deployment platforms
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        // Deployment platforms set these without the APP_ prefix
        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - Server port is not 0
    /// - The Whisper model and device names are recognized
    /// - The upload limit is greater than 0 and fits in bytes
    /// - A configured temp dir exists and is a directory
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow!("Server port cannot be 0"));
        }

        self.whisper_model()?;
        self.device_preference()?;

        if self.upload.max_file_size_mb == 0 {
            return Err(anyhow!("Max upload size must be greater than 0"));
        }

        if self.upload.max_file_size_mb.checked_mul(BYTES_PER_MB).is_none() {
            return Err(anyhow!(
                "Max upload size is too large: {} MB",
                self.upload.max_file_size_mb
            ));
        }

        if let Some(dir) = &self.upload.temp_dir {
            if !Path::new(dir).is_dir() {
                return Err(anyhow!("Upload temp dir does not exist: {}", dir));
            }
        }

        Ok(())
    }

    pub fn whisper_model(&self) -> Result<ModelSize> {
        self.models.whisper_model.parse()
    }

    pub fn device_preference(&self) -> Result<DevicePreference> {
        self.models
            .device
            .parse::<DevicePreference>()
            .map_err(|e| anyhow!(e))
    }

    /// Upload limit in bytes.
    pub fn max_upload_bytes(&self) -> usize {
        self.upload.max_file_size_mb.saturating_mul(BYTES_PER_MB)
    }

    /// Directory uploads are staged in.
    pub fn temp_dir(&self) -> PathBuf {
        self.upload
            .temp_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(env::temp_dir)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
