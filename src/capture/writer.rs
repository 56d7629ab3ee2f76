//! WAV output for capture sessions

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use crate::error::CaptureError;

/// Streaming WAV writer for captured audio
///
/// Samples are written as 32-bit float in capture order. The header is
/// patched with the final length on `finalize`, which consumes the sink so
/// nothing can be appended afterwards.
pub struct WavSink {
    writer: hound::WavWriter<BufWriter<File>>,
    path: PathBuf,
    frames_written: u64,
    channels: u16,
}

impl WavSink {
    /// Create a WAV file at `path`, making missing parent directories
    pub fn create(
        path: impl AsRef<Path>,
        channels: u16,
        sample_rate: u32,
    ) -> Result<Self, CaptureError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let writer = hound::WavWriter::create(&path, spec)?;
        tracing::debug!(path = %path.display(), channels, sample_rate, "wav sink opened");
        Ok(Self {
            writer,
            path,
            frames_written: 0,
            channels,
        })
    }

    /// Append interleaved f32 samples
    pub fn append(&mut self, samples: &[f32]) -> Result<(), CaptureError> {
        for &sample in samples {
            self.writer.write_sample(sample)?;
        }
        if self.channels > 0 {
            self.frames_written += (samples.len() / self.channels as usize) as u64;
        }
        Ok(())
    }

    /// Flush buffered samples and patch the header
    pub fn finalize(self) -> Result<(), CaptureError> {
        let frames = self.frames_written;
        let path = self.path;
        self.writer.finalize()?;
        tracing::info!(path = %path.display(), frames, "wav sink finalized");
        Ok(())
    }

    /// Frames written so far
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Destination path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("audio-endpoints-{}-{}", std::process::id(), name))
    }

    #[test]
    fn test_write_and_finalize_round_trip() {
        let path = temp_path("sink.wav");
        let mut sink = WavSink::create(&path, 2, 48000).unwrap();

        let block: Vec<f32> = (0..960).map(|i| (i as f32 / 960.0) - 0.5).collect();
        sink.append(&block).unwrap();
        sink.append(&block).unwrap();
        assert_eq!(sink.frames_written(), 960);
        sink.finalize().unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 48000);
        assert_eq!(spec.sample_format, hound::SampleFormat::Float);
        assert_eq!(reader.len(), 1920);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_empty_capture_is_valid_wav() {
        let path = temp_path("empty-sink.wav");
        let sink = WavSink::create(&path, 1, 44100).unwrap();
        assert_eq!(sink.frames_written(), 0);
        sink.finalize().unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.len(), 0);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_create_makes_parent_directories() {
        let dir = temp_path("nested-dir");
        let path = dir.join("deeper").join("out.wav");
        let sink = WavSink::create(&path, 1, 48000).unwrap();
        sink.finalize().unwrap();
        assert!(path.exists());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
