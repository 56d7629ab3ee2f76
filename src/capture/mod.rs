//! Capture subsystem: loopback and microphone recording

pub mod recorder;
pub mod writer;

pub use recorder::{LoopbackRecorder, MicrophoneRecorder};
pub use writer::WavSink;
