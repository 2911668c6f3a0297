//! # Transcription Capability
//!
//! The contract between the request pipeline and whatever actually turns audio
//! into text. The pipeline only ever hands over a filesystem path and expects
//! text plus a language code back, so any model implementation (the candle
//! Whisper model in production, a stub in tests) can sit behind it.

use std::path::Path;

use anyhow::Result;

/// Text and language produced by one transcription.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct TranscriptionResult {
    /// The transcribed text, possibly empty
    pub text: String,

    /// Detected language code ("en", "de", ...)
    pub language: String,
}

/// A loaded speech recognition model.
///
/// ## Blocking contract:
/// `transcribe` is synchronous and may run for a long time. Callers in async
/// code must move it onto the blocking pool.
///
/// ## Sharing:
/// One instance is loaded at startup and shared read-only across every
/// request, hence the `Send + Sync` bound.
pub trait Transcriber: Send + Sync {
    /// Transcribe the audio file at `path`.
    fn transcribe(&self, path: &Path) -> Result<TranscriptionResult>;

    /// Human-readable model description for status endpoints.
    fn model_name(&self) -> String;

    /// Device the model runs on ("CPU", "CUDA GPU", ...).
    fn device_name(&self) -> String {
        "CPU".to_string()
    }
}

#[cfg(test)]
pub(crate) mod stub {
    //! Test double for the transcription capability.

    use super::*;
    use anyhow::anyhow;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::time::Duration;

    /// What the stub saw on one invocation.
    #[derive(Debug, Clone)]
    pub struct Invocation {
        pub path: PathBuf,
        pub existed: bool,
        pub bytes: Vec<u8>,
    }

    /// Returns a fixed result (or failure) and records each call.
    pub struct StubTranscriber {
        text: String,
        language: String,
        fail: bool,
        panic: bool,
        delay: Duration,
        calls: Mutex<Vec<Invocation>>,
    }

    impl StubTranscriber {
        pub fn returning(text: &str, language: &str) -> Self {
            Self {
                text: text.to_string(),
                language: language.to_string(),
                fail: false,
                panic: false,
                delay: Duration::ZERO,
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::returning("", "")
            }
        }

        pub fn panicking() -> Self {
            Self {
                panic: true,
                ..Self::returning("", "")
            }
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub fn calls(&self) -> Vec<Invocation> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Transcriber for StubTranscriber {
        fn transcribe(&self, path: &Path) -> Result<TranscriptionResult> {
            let existed = path.exists();
            let bytes = std::fs::read(path).unwrap_or_default();
            self.calls.lock().unwrap().push(Invocation {
                path: path.to_path_buf(),
                existed,
                bytes,
            });

            if !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }

            if self.panic {
                panic!("model blew up");
            }

            if self.fail {
                return Err(anyhow!("tensor shape mismatch in encoder: [1, 80, 0]"));
            }

            Ok(TranscriptionResult {
                text: self.text.clone(),
                language: self.language.clone(),
            })
        }

        fn model_name(&self) -> String {
            "stub".to_string()
        }
    }
}
