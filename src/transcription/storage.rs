//! # Request-Scoped Temporary Storage
//!
//! Uploaded audio is staged on local disk so the model can read it by path.
//! Each staged file is owned by exactly one request through a [`StagedAudio`]
//! guard, and the file is deleted when that guard goes away, whichever way the
//! request ends.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::TempPath;

use crate::transcription::formats::AudioFormat;

/// Filename prefix for staged uploads.
const STAGED_PREFIX: &str = "whisper-upload-";

/// Where staged uploads are written.
#[derive(Debug, Clone)]
pub struct TempStorage {
    dir: PathBuf,
}

impl TempStorage {
    /// Stage files inside `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Stage files in the system temp directory.
    pub fn system() -> Self {
        Self::new(std::env::temp_dir())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `bytes` to a fresh, uniquely named file.
    ///
    /// The name is random and carries the format's extension as suffix, so
    /// two requests staging identical uploads never collide. If writing fails
    /// the partially written file is removed before the error is returned.
    pub fn stage(&self, bytes: &[u8], format: AudioFormat) -> std::io::Result<StagedAudio> {
        let suffix = format!(".{}", format.extension());
        let mut file = tempfile::Builder::new()
            .prefix(STAGED_PREFIX)
            .suffix(&suffix)
            .tempfile_in(&self.dir)?;

        file.write_all(bytes)?;
        file.flush()?;

        let path = file.into_temp_path();
        tracing::debug!(path = %path.display(), bytes = bytes.len(), "Staged upload");

        Ok(StagedAudio { path: Some(path) })
    }
}

/// Exclusive handle on one staged upload. Dropping it deletes the file.
#[derive(Debug)]
pub struct StagedAudio {
    path: Option<TempPath>,
}

impl StagedAudio {
    pub fn path(&self) -> &Path {
        // Only `Drop` takes the path out.
        self.path.as_deref().unwrap_or_else(|| Path::new(""))
    }

    /// Delete the file now instead of at end of scope.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for StagedAudio {
    fn drop(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };

        let shown = path.display().to_string();
        match path.close() {
            Ok(()) => tracing::debug!(path = %shown, "Removed staged upload"),
            // The response is already decided at this point; a leftover file is
            // logged rather than turned into a request error.
            Err(e) => tracing::warn!(path = %shown, error = %e, "Failed to clean up temporary file"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn test_stage_writes_bytes_with_extension() {
        let tmp = TempDir::new().unwrap();
        let storage = TempStorage::new(tmp.path());

        let staged = storage.stage(b"ID3fake", AudioFormat::Mp3).unwrap();

        assert!(staged.path().exists());
        assert_eq!(staged.path().extension().unwrap(), "mp3");
        assert!(staged.path().starts_with(tmp.path()));
        assert_eq!(std::fs::read(staged.path()).unwrap(), b"ID3fake");
    }

    #[test]
    fn test_drop_removes_file() {
        let tmp = TempDir::new().unwrap();
        let storage = TempStorage::new(tmp.path());

        let staged = storage.stage(b"RIFF", AudioFormat::Wav).unwrap();
        let path = staged.path().to_path_buf();
        drop(staged);

        assert!(!path.exists());
        assert_eq!(entries(tmp.path()), 0);
    }

    #[test]
    fn test_release_removes_file() {
        let tmp = TempDir::new().unwrap();
        let storage = TempStorage::new(tmp.path());

        let staged = storage.stage(b"fLaC", AudioFormat::Flac).unwrap();
        let path = staged.path().to_path_buf();
        staged.release();

        assert!(!path.exists());
    }

    #[test]
    fn test_identical_uploads_get_distinct_files() {
        let tmp = TempDir::new().unwrap();
        let storage = TempStorage::new(tmp.path());

        let first = storage.stage(b"same", AudioFormat::Ogg).unwrap();
        let second = storage.stage(b"same", AudioFormat::Ogg).unwrap();

        assert_ne!(first.path(), second.path());
        assert_eq!(entries(tmp.path()), 2);
    }

    #[test]
    fn test_drop_after_external_delete_does_not_panic() {
        let tmp = TempDir::new().unwrap();
        let storage = TempStorage::new(tmp.path());

        let staged = storage.stage(b"x", AudioFormat::Webm).unwrap();
        std::fs::remove_file(staged.path()).unwrap();
        drop(staged);
    }

    #[test]
    fn test_stage_into_missing_dir_fails() {
        let tmp = TempDir::new().unwrap();
        let storage = TempStorage::new(tmp.path().join("missing"));

        assert!(storage.stage(b"x", AudioFormat::Mp3).is_err());
    }
}
