//! Container decoding for file playback
//!
//! The decoder is selected by file extension: `wav` goes through hound,
//! `mp3`/`aiff`/`aif` through symphonia with an extension hint, and anything
//! else through symphonia's format probe as a generic fallback. Output is
//! always interleaved f32 at the container's native rate and channel count;
//! no resampling happens here.

use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::PlaybackError;

/// Decoded audio ready for playback
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Interleaved samples (L, R, L, R, ...)
    pub samples: Vec<f32>,
    /// Number of channels
    pub channels: u16,
    /// Native sample rate
    pub sample_rate: u32,
}

impl DecodedAudio {
    /// Total number of frames (samples per channel)
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    /// Total duration
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }
}

/// Decode an audio file, selecting the container reader by extension
pub fn decode_file(path: impl AsRef<Path>) -> Result<DecodedAudio, PlaybackError> {
    let path = path.as_ref();
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let decoded = match ext.as_str() {
        "wav" => {
            let data = std::fs::read(path)?;
            decode_wav_bytes(&data)?
        }
        "mp3" | "aiff" | "aif" => decode_with_symphonia(path, Some(&ext))?,
        _ => decode_with_symphonia(path, None)?,
    };

    tracing::debug!(
        path = %path.display(),
        frames = decoded.frames(),
        sample_rate = decoded.sample_rate,
        channels = decoded.channels,
        "decoded audio file"
    );
    Ok(decoded)
}

/// Decode WAV data from memory using hound
pub fn decode_wav_bytes(data: &[u8]) -> Result<DecodedAudio, PlaybackError> {
    let reader = hound::WavReader::new(Cursor::new(data))?;

    let spec = reader.spec();
    let channels = spec.channels;
    let sample_rate = spec.sample_rate;

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    Ok(DecodedAudio {
        samples,
        channels,
        sample_rate,
    })
}

fn decode_with_symphonia(path: &Path, ext: Option<&str>) -> Result<DecodedAudio, PlaybackError> {
    let file = std::fs::File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = ext {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| match e {
            symphonia::core::errors::Error::Unsupported(_) => PlaybackError::UnsupportedFormat(
                ext.unwrap_or("unknown").to_string(),
            ),
            other => PlaybackError::Decode(other.to_string()),
        })?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| PlaybackError::Decode("no audio track found".to_string()))?;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| PlaybackError::Decode("no sample rate".to_string()))?;
    let channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(2);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| PlaybackError::Decode(e.to_string()))?;

    let track_id = track.id;
    let mut samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(PlaybackError::Decode(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = decoder
            .decode(&packet)
            .map_err(|e| PlaybackError::Decode(e.to_string()))?;

        let spec = *decoded.spec();
        let capacity = decoded.capacity();

        let mut sample_buf = SampleBuffer::<f32>::new(capacity as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        samples.extend(sample_buf.samples());
    }

    Ok(DecodedAudio {
        samples,
        channels,
        sample_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Generate a mono sine WAV file in memory
    pub(crate) fn generate_test_wav(frequency: f32, duration_secs: f32, sample_rate: u32) -> Vec<u8> {
        let num_samples = (sample_rate as f32 * duration_secs) as usize;
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..num_samples {
                let t = i as f32 / sample_rate as f32;
                let sample = (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.5;
                writer.write_sample(sample).unwrap();
            }
            writer.finalize().unwrap();
        }

        cursor.into_inner()
    }

    fn generate_stereo_i16_wav(duration_secs: f32, sample_rate: u32) -> Vec<u8> {
        let num_frames = (sample_rate as f32 * duration_secs) as usize;
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..num_frames {
                let t = i as f32 / sample_rate as f32;
                let sample = ((2.0 * std::f32::consts::PI * 440.0 * t).sin() * 16000.0) as i16;
                writer.write_sample(sample).unwrap();
                writer.write_sample(-sample).unwrap();
            }
            writer.finalize().unwrap();
        }

        cursor.into_inner()
    }

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("audio-endpoints-{}-{}", std::process::id(), name))
    }

    #[test]
    fn test_decode_wav_mono_float() {
        let data = generate_test_wav(440.0, 0.1, 48000);
        let decoded = decode_wav_bytes(&data).unwrap();

        assert_eq!(decoded.channels, 1);
        assert_eq!(decoded.sample_rate, 48000);
        assert_eq!(decoded.frames(), 4800);
        assert!((decoded.duration().as_secs_f64() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_decode_wav_stereo_int_normalizes() {
        let data = generate_stereo_i16_wav(0.05, 44100);
        let decoded = decode_wav_bytes(&data).unwrap();

        assert_eq!(decoded.channels, 2);
        assert_eq!(decoded.sample_rate, 44100);
        assert_eq!(decoded.frames(), 2205);
        let max = decoded.samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);
        assert!(max <= 1.0, "int samples should normalize into unit range");
        assert!(max > 0.3, "signal should survive normalization");
    }

    #[test]
    fn test_decode_file_selects_wav_reader() {
        let data = generate_test_wav(440.0, 0.1, 48000);
        let path = temp_path("select.wav");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(&data)
            .unwrap();

        let decoded = decode_file(&path).unwrap();
        assert_eq!(decoded.frames(), 4800);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_decode_file_rejects_garbage() {
        let path = temp_path("garbage.xyz");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"this is not audio data at all")
            .unwrap();

        let err = decode_file(&path).unwrap_err();
        assert!(matches!(
            err,
            PlaybackError::UnsupportedFormat(_) | PlaybackError::Decode(_)
        ));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_decode_file_missing_is_io() {
        let err = decode_file(temp_path("does-not-exist.wav")).unwrap_err();
        assert!(matches!(err, PlaybackError::Io(_)));
    }

    #[test]
    fn test_duration_of_empty() {
        let empty = DecodedAudio {
            samples: Vec::new(),
            channels: 2,
            sample_rate: 48000,
        };
        assert_eq!(empty.frames(), 0);
        assert_eq!(empty.duration(), Duration::ZERO);
    }
}
