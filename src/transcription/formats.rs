//! # Supported Audio Formats
//!
//! The fixed allow-list of filename extensions the service accepts for
//! transcription. Validation is purely by extension: the uploaded bytes are
//! never sniffed, so a file with a lying extension is only caught later when
//! the decoder fails on it.

use std::path::Path;

/// One member of the supported format set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioFormat {
    Mp3,
    Wav,
    Webm,
    M4a,
    Ogg,
    Flac,
}

impl AudioFormat {
    /// Every accepted format, in the order they are advertised to clients.
    pub const ALL: [AudioFormat; 6] = [
        AudioFormat::Mp3,
        AudioFormat::Wav,
        AudioFormat::Webm,
        AudioFormat::M4a,
        AudioFormat::Ogg,
        AudioFormat::Flac,
    ];

    /// Canonical lowercase extension, without the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Wav => "wav",
            AudioFormat::Webm => "webm",
            AudioFormat::M4a => "m4a",
            AudioFormat::Ogg => "ogg",
            AudioFormat::Flac => "flac",
        }
    }

    /// Match a bare extension (no dot), ignoring ASCII case.
    pub fn from_extension(ext: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|format| format.extension().eq_ignore_ascii_case(ext))
    }

    /// Resolve the format of an uploaded filename.
    ///
    /// Returns `None` for an empty name, a name without an extension, or an
    /// extension outside the supported set.
    pub fn from_filename(filename: &str) -> Option<Self> {
        Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// Comma separated list used in client-facing error messages.
    pub fn supported_list() -> String {
        Self::ALL
            .iter()
            .map(|format| format.extension())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension())
    }
}
