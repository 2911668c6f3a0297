//! # Whisper Transcription Service
//!
//! Accepts audio uploads over HTTP, runs them through a locally loaded Whisper
//! model and returns the text with its detected language.
//!
//! ## Application Architecture:
//! - **config**: Layered configuration (defaults, config.toml, environment)
//! - **device**: Compute device selection for the model
//! - **audio**: Decoding uploaded files to 16kHz mono PCM
//! - **transcription**: Format validation, temp storage, the request pipeline and the model
//! - **state / health / handlers / middleware / error**: The HTTP surface

pub mod audio;
pub mod config;
pub mod device;
pub mod error;
pub mod handlers;
pub mod health;
pub mod middleware;
pub mod state;
pub mod transcription;
