//! # Audio File Decoding
//!
//! Turns a staged upload (mp3, wav, ogg, flac, m4a, webm) into the 16 kHz mono
//! `f32` PCM the Whisper model consumes. Container and codec detection is left
//! to symphonia's probe; the file extension is passed along as a hint only.

use std::fs::File;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Sample rate expected by Whisper.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Decode the audio file at `path` to 16 kHz mono PCM.
pub fn decode_file(path: &Path) -> Result<Vec<f32>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| anyhow!("unrecognized audio container: {}", e))?;

    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| anyhow!("no audio track found"))?;

    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let source_rate = codec_params
        .sample_rate
        .ok_or_else(|| anyhow!("unknown sample rate"))?;
    let channels = codec_params.channels.map(|c| c.count()).unwrap_or(1);

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| anyhow!("unsupported codec: {}", e))?;

    let mut samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(anyhow!("reading packet: {}", e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(e)) => {
                tracing::warn!(error = %e, "Skipping corrupt audio frame");
                continue;
            }
            Err(e) => return Err(anyhow!("decoding packet: {}", e)),
        };

        let spec = *decoded.spec();
        let frames = decoded.frames();
        if frames == 0 {
            continue;
        }

        let mut buf = SampleBuffer::<f32>::new(frames as u64, spec);
        buf.copy_interleaved_ref(decoded);
        samples.extend(downmix(buf.samples(), channels));
    }

    if samples.is_empty() {
        return Err(anyhow!("no audio samples decoded"));
    }

    if source_rate != TARGET_SAMPLE_RATE {
        samples = resample(&samples, source_rate, TARGET_SAMPLE_RATE)?;
    }

    tracing::debug!(
        samples = samples.len(),
        duration_secs = samples.len() as f32 / TARGET_SAMPLE_RATE as f32,
        source_rate,
        channels,
        "Audio decoded to 16kHz mono PCM"
    );

    Ok(samples)
}

/// Average interleaved frames down to one channel.
fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    use rubato::{
        Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
    };

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = to_rate as f64 / from_rate as f64;
    let chunk_size = 1024;

    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, chunk_size, 1)
        .map_err(|e| anyhow!("resampler init: {}", e))?;

    let mut output = Vec::with_capacity((samples.len() as f64 * ratio) as usize + chunk_size);

    for chunk in samples.chunks(chunk_size) {
        let mut input = chunk.to_vec();
        input.resize(chunk_size, 0.0);

        let result = resampler
            .process(&[input], None)
            .map_err(|e| anyhow!("resample: {}", e))?;

        if let Some(channel) = result.first() {
            output.extend_from_slice(channel);
        }
    }

    // The last chunk was zero padded.
    output.truncate((samples.len() as f64 * ratio) as usize);

    Ok(output)
}
