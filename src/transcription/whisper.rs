//! # Candle Whisper Transcriber
//!
//! The production implementation of [`Transcriber`]: a Whisper checkpoint
//! loaded once with candle and shared by every request.
//!
//! ## Per-file processing:
//! 1. Decode the file to 16kHz mono PCM
//! 2. Compute the log-mel spectrogram of the whole clip
//! 3. Detect the spoken language on the first 30 second window
//! 4. Greedy-decode each 30 second window and join the texts

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{anyhow, Result};
use candle_core::{Device, IndexOp, Tensor, D};
use candle_nn::VarBuilder;
use candle_transformers::models::whisper::{self as m, Config};
use tokenizers::Tokenizer;

use crate::audio::decode_file;
use crate::device::DeviceManager;
use crate::transcription::engine::{Transcriber, TranscriptionResult};
use crate::transcription::model::{ModelFiles, ModelSize};

/// Language codes in Whisper's token order.
const LANGUAGES: [&str; 99] = [
    "en", "zh", "de", "es", "ru", "ko", "fr", "ja", "pt", "tr", "pl", "ca", "nl", "ar", "sv",
    "it", "id", "hi", "fi", "vi", "he", "uk", "el", "ms", "cs", "ro", "da", "hu", "ta", "no",
    "th", "ur", "hr", "bg", "lt", "la", "mi", "ml", "cy", "sk", "te", "fa", "lv", "bn", "sr",
    "az", "sl", "kn", "et", "mk", "br", "eu", "is", "hy", "ne", "mn", "bs", "kk", "sq", "sw",
    "gl", "mr", "pa", "si", "km", "sn", "yo", "so", "af", "oc", "ka", "be", "tg", "sd", "gu",
    "am", "yi", "lo", "uz", "fo", "ht", "ps", "tk", "nn", "mt", "sa", "lb", "my", "bo", "tl",
    "mg", "as", "tt", "haw", "ln", "ha", "ba", "jw", "su",
];

/// Special token ids resolved once from the tokenizer.
#[derive(Debug, Clone)]
struct SpecialTokens {
    sot: u32,
    eot: u32,
    transcribe: u32,
    no_timestamps: u32,
    /// (language code, token id) for every language the tokenizer knows
    languages: Vec<(&'static str, u32)>,
}

impl SpecialTokens {
    fn resolve(tokenizer: &Tokenizer) -> Result<Self> {
        let languages: Vec<_> = LANGUAGES
            .iter()
            .filter_map(|code| {
                tokenizer
                    .token_to_id(&format!("<|{}|>", code))
                    .map(|id| (*code, id))
            })
            .collect();

        if languages.is_empty() {
            return Err(anyhow!("tokenizer has no language tokens; English-only checkpoints are not supported"));
        }

        Ok(Self {
            sot: token_id(tokenizer, m::SOT_TOKEN)?,
            eot: token_id(tokenizer, m::EOT_TOKEN)?,
            transcribe: token_id(tokenizer, m::TRANSCRIBE_TOKEN)?,
            no_timestamps: token_id(tokenizer, m::NO_TIMESTAMPS_TOKEN)?,
            languages,
        })
    }
}

/// A loaded Whisper model ready for transcription.
///
/// ## Thread Safety:
/// Candle's decoder keeps a mutable cross-attention cache, so the model sits
/// behind a mutex. Model calls serialize; everything around them (upload,
/// staging, cleanup) stays concurrent.
pub struct WhisperTranscriber {
    model: Mutex<m::model::Whisper>,
    tokenizer: Tokenizer,
    tokens: SpecialTokens,
    config: Config,
    mel_filters: Vec<f32>,
    device: Device,
    size: ModelSize,
}

impl WhisperTranscriber {
    /// Download (if needed) and load the checkpoint for `size` onto `device`.
    pub async fn load(size: ModelSize, device: Device) -> Result<Self> {
        tracing::info!("Loading Whisper {} model...", size);
        let start_time = std::time::Instant::now();

        let files = ModelFiles::fetch(size).await?;

        let config: Config = serde_json::from_reader(std::fs::File::open(&files.config)?)?;
        tracing::debug!("Model config: {:?}", config);

        let tokenizer = Tokenizer::from_file(&files.tokenizer)
            .map_err(|e| anyhow!("Failed to load tokenizer: {}", e))?;
        let tokens = SpecialTokens::resolve(&tokenizer)?;

        let mel_bytes = std::fs::read(&files.mel_filters)?;
        let mel_filters = read_mel_filters(&mel_bytes, &config)?;

        // SAFETY: safetensors files are memory-mapped read-only
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[files.weights], m::DTYPE, &device)? };
        let model = m::model::Whisper::load(&vb, config.clone())?;

        tracing::info!(
            "Whisper {} model loaded on {} in {:.2}s",
            size,
            DeviceManager::get_device_info(&device),
            start_time.elapsed().as_secs_f64()
        );

        Ok(Self {
            model: Mutex::new(model),
            tokenizer,
            tokens,
            config,
            mel_filters,
            device,
            size,
        })
    }

    /// Run the whole clip through the model.
    fn transcribe_pcm(&self, pcm: &[f32]) -> Result<TranscriptionResult> {
        let mel = m::audio::pcm_to_mel(&self.config, pcm, &self.mel_filters);
        let n_mels = self.config.num_mel_bins;
        let n_frames = mel.len() / n_mels;
        let mel = Tensor::from_vec(mel, (1, n_mels, n_frames), &self.device)?;
        let (_, _, content_frames) = mel.dims3()?;

        let mut model = lock_model(&self.model);

        let (language, language_token) = self.detect_language(&mut model, &mel)?;
        tracing::debug!(language, "Detected language");

        let mut segments = Vec::new();
        let mut seek = 0;
        while seek < content_frames {
            let segment_size = usize::min(content_frames - seek, m::N_FRAMES);
            let window = mel.narrow(2, seek, segment_size)?;

            let text = self.decode_window(&mut model, &window, language_token)?;
            tracing::debug!(seek, segment_size, chars = text.len(), "Decoded window");
            if !text.is_empty() {
                segments.push(text);
            }

            seek += segment_size;
        }

        Ok(TranscriptionResult {
            text: segments.join(" "),
            language: language.to_string(),
        })
    }

    /// Pick the most likely language token after SOT on the first window.
    fn detect_language(&self, model: &mut m::model::Whisper, mel: &Tensor) -> Result<(&'static str, u32)> {
        let (_, _, seq_len) = mel.dims3()?;
        let mel = mel.narrow(2, 0, usize::min(seq_len, m::N_FRAMES))?;

        let audio_features = model.encoder.forward(&mel, true)?;

        let sot = Tensor::new(&[[self.tokens.sot]], &self.device)?;
        let ids: Vec<u32> = self.tokens.languages.iter().map(|(_, id)| *id).collect();
        let ids = Tensor::new(ids.as_slice(), &self.device)?;

        let ys = model.decoder.forward(&sot, &audio_features, true)?;
        let logits = model.decoder.final_linear(&ys.i(..1)?)?.i(0)?.i(0)?;
        let logits = logits.index_select(&ids, 0)?;
        let probs = candle_nn::ops::softmax(&logits, D::Minus1)?;
        let best = probs.argmax(D::Minus1)?.to_scalar::<u32>()? as usize;

        self.tokens
            .languages
            .get(best)
            .copied()
            .ok_or_else(|| anyhow!("language index {} out of range", best))
    }

    /// Greedy decode of one (at most 30s) window.
    fn decode_window(&self, model: &mut m::model::Whisper, mel: &Tensor, language_token: u32) -> Result<String> {
        let audio_features = model.encoder.forward(mel, true)?;

        let prompt = [
            self.tokens.sot,
            language_token,
            self.tokens.transcribe,
            self.tokens.no_timestamps,
        ];
        let mut tokens = prompt.to_vec();
        let sample_len = model.config.max_target_positions / 2;

        for i in 0..sample_len {
            let tokens_t = Tensor::new(tokens.as_slice(), &self.device)?.unsqueeze(0)?;
            let ys = model.decoder.forward(&tokens_t, &audio_features, i == 0)?;

            let (_, seq_len, _) = ys.dims3()?;
            let logits = model
                .decoder
                .final_linear(&ys.i((..1, seq_len - 1..))?)?
                .i(0)?
                .i(0)?;
            let next_token = logits.argmax(D::Minus1)?.to_scalar::<u32>()?;

            if next_token == self.tokens.eot || tokens.len() > model.config.max_target_positions {
                break;
            }
            tokens.push(next_token);
        }

        let text = self
            .tokenizer
            .decode(&tokens[prompt.len()..], true)
            .map_err(|e| anyhow!("Tokenizer decode error: {}", e))?;

        Ok(text.trim().to_string())
    }
}

impl Transcriber for WhisperTranscriber {
    fn transcribe(&self, path: &Path) -> Result<TranscriptionResult> {
        let start_time = std::time::Instant::now();

        let pcm = decode_file(path)?;
        let audio_duration = pcm.len() as f64 / crate::audio::TARGET_SAMPLE_RATE as f64;

        let result = self.transcribe_pcm(&pcm)?;

        tracing::info!(
            "Transcribed {:.2}s of audio in {:.2}s ({} chars, language {})",
            audio_duration,
            start_time.elapsed().as_secs_f64(),
            result.text.len(),
            result.language
        );

        Ok(result)
    }

    fn model_name(&self) -> String {
        format!("whisper-{} ({})", self.size, self.size.description())
    }

    fn device_name(&self) -> String {
        DeviceManager::get_device_info(&self.device)
    }
}

/// Take the model lock, reclaiming it if an earlier call panicked while
/// holding it. Every decode flushes the decoder cache on its first step, so no
/// state from the aborted call carries over.
fn lock_model<T>(model: &Mutex<T>) -> MutexGuard<'_, T> {
    model.lock().unwrap_or_else(|poisoned: PoisonError<MutexGuard<'_, T>>| {
        tracing::warn!("Recovering whisper model after a panicked transcription");
        model.clear_poison();
        poisoned.into_inner()
    })
}

fn token_id(tokenizer: &Tokenizer, token: &str) -> Result<u32> {
    tokenizer
        .token_to_id(token)
        .ok_or_else(|| anyhow!("token not found in tokenizer: {}", token))
}

/// Parse the little-endian `f32` filter bank for the model's mel bin count.
fn read_mel_filters(bytes: &[u8], config: &Config) -> Result<Vec<f32>> {
    let expected_len = config.num_mel_bins * (m::N_FFT / 2 + 1);
    if bytes.len() < expected_len * 4 {
        return Err(anyhow!(
            "mel filters file too small for {} mel bins: {} bytes, expected at least {}",
            config.num_mel_bins,
            bytes.len(),
            expected_len * 4
        ));
    }

    Ok(bytes
        .chunks_exact(4)
        .take(expected_len)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_json(num_mel_bins: usize) -> Config {
        serde_json::from_value(serde_json::json!({
            "num_mel_bins": num_mel_bins,
            "max_source_positions": 1500,
            "d_model": 384,
            "encoder_attention_heads": 6,
            "encoder_layers": 4,
            "decoder_attention_heads": 6,
            "decoder_layers": 4,
            "vocab_size": 51865,
            "max_target_positions": 448,
            "suppress_tokens": []
        }))
        .unwrap()
    }

    #[test]
    fn test_model_lock_survives_panic() {
        let model = std::sync::Arc::new(Mutex::new(vec![1u32]));

        let poisoner = std::sync::Arc::clone(&model);
        let joined = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("decoder exploded");
        })
        .join();
        assert!(joined.is_err());
        assert!(model.is_poisoned());

        lock_model(&model).push(2);

        assert!(!model.is_poisoned());
        assert_eq!(*lock_model(&model), vec![1, 2]);
    }

    #[test]
    fn test_language_table() {
        assert_eq!(LANGUAGES.len(), 99);
        assert_eq!(LANGUAGES[0], "en");
        let mut sorted = LANGUAGES.to_vec();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), 99);
    }

    #[test]
    fn test_read_mel_filters() {
        let config = config_json(80);
        let expected = 80 * (m::N_FFT / 2 + 1);
        let bytes: Vec<u8> = (0..expected).flat_map(|i| (i as f32).to_le_bytes()).collect();

        let filters = read_mel_filters(&bytes, &config).unwrap();

        assert_eq!(filters.len(), expected);
        assert_eq!(filters[3], 3.0);
    }

    #[test]
    fn test_read_mel_filters_rejects_short_file() {
        let config = config_json(128);
        let bytes = vec![0u8; 80 * (m::N_FFT / 2 + 1) * 4];

        assert!(read_mel_filters(&bytes, &config).is_err());
    }
}
