//! Error types for the audio endpoint toolkit

use thiserror::Error;

use crate::device::Flow;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Playback error: {0}")]
    Playback(#[from] PlaybackError),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Device enumeration and resolution errors
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Device not found: {0}")]
    NotFound(String),

    #[error("No default {0} device")]
    NoDefault(Flow),

    #[error("Audio backend error: {0}")]
    Backend(String),
}

/// File player errors
#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("Nothing loaded")]
    NothingLoaded,

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("Decode failed: {0}")]
    Decode(String),

    #[error("Failed to open stream: {0}")]
    Stream(String),

    #[error("WAV file error: {0}")]
    Wav(#[from] hound::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),
}

/// Recorder errors
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Already capturing")]
    AlreadyCapturing,

    #[error("No loopback source for the default output device")]
    LoopbackUnavailable,

    #[error("Failed to open stream: {0}")]
    Stream(String),

    #[error("WAV file error: {0}")]
    Wav(#[from] hound::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;
