//! # Audio Processing Module
//!
//! Converts staged upload files into model input.
//!
//! ## Audio Format Requirements (model side):
//! - **Sample Rate**: 16kHz (16,000 Hz)
//! - **Channels**: Mono (1 channel)
//! - **Samples**: 32-bit float in [-1.0, 1.0]
//!
//! Whatever the upload contains (stereo 44.1kHz mp3, 48kHz ogg, ...) is
//! downmixed and resampled to that shape by [`decoder::decode_file`].

pub mod decoder;

pub use decoder::{decode_file, TARGET_SAMPLE_RATE};
