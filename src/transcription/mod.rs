//! # Transcription Module
//!
//! Everything between "a file was uploaded" and "here is the text".
//!
//! ## Key Components:
//! - **formats**: The supported extension allow-list
//! - **storage**: Request-scoped temporary files with guaranteed cleanup
//! - **engine**: The `Transcriber` capability contract
//! - **pipeline**: The request handler tying validation, staging and the model together
//! - **model / whisper**: The candle-backed Whisper implementation of the capability
//!
//! ## Whisper Model Sizes:
//! - **tiny**: ~39MB, fastest but least accurate
//! - **base**: ~74MB, the service default
//! - **small**: ~244MB, better accuracy
//! - **medium**: ~769MB, good technical vocabulary
//! - **large**: ~1550MB, best accuracy but slowest

pub mod engine;
pub mod formats;
pub mod model;
pub mod pipeline;
pub mod storage;
pub mod whisper;

pub use engine::{Transcriber, TranscriptionResult};
pub use formats::AudioFormat;
pub use model::ModelSize;
pub use pipeline::{TranscribeError, TranscriptionResponse, TranscriptionService, UploadedAudio};
pub use storage::{StagedAudio, TempStorage};
pub use whisper::WhisperTranscriber;
