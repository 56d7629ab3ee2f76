//! Audio endpoint toolkit
//!
//! A thin layer over the system audio stack: enumerate render and capture
//! endpoints, control per-endpoint volume and mute, read peak meter levels,
//! play WAV/MP3/AIFF files on the default output, and record the microphone
//! or the system output mix to WAV.
//!
//! Endpoints are identified by opaque id strings produced by enumeration
//! (`render:<name>` / `capture:<name>`). Volume, mute, and the peak meter are
//! scoped to streams opened by this crate: values are applied inside stream
//! callbacks and the meter reads the most recent buffer of an active session.
//!
//! ```no_run
//! use audio_endpoints::{device, Player};
//!
//! # fn main() -> Result<(), audio_endpoints::Error> {
//! for dev in device::list_render_devices() {
//!     println!("{} ({})", dev.name, dev.id);
//! }
//!
//! let player = Player::new();
//! player.load("track.wav")?;
//! player.play()?;
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod device;
pub mod endpoint;
pub mod error;
pub mod meter;
pub mod playback;
pub mod volume;

pub use capture::{LoopbackRecorder, MicrophoneRecorder};
pub use device::{DeviceInfo, Flow, Role};
pub use error::{CaptureError, DeviceError, Error, PlaybackError, Result};
pub use meter::PeakMeter;
pub use playback::{Player, PlayerState};
pub use volume::VolumeControl;

/// Crate-wide tuning constants
pub mod constants {
    /// Meter floor in dBFS; silence and anything quieter reads as this
    pub const METER_FLOOR_DB: f32 = -96.0;

    /// Keep-alive poll interval for stream-owning session threads
    pub const SESSION_POLL_INTERVAL_MS: u64 = 10;
}
