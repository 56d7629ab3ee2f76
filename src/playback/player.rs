//! File player bound to the default output endpoint
//!
//! Lifecycle: Unloaded → Loaded (reads Stopped) → Playing ⇄ Paused → Stopped
//! → Unloaded. `load` decodes the whole file up front and opens an output
//! stream with the container's native rate and channel count; nothing is
//! resampled, so a config the device rejects fails the load. The cpal stream
//! is owned by a dedicated thread because streams are not `Send`; the
//! callback reads control state through atomics only.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::StreamConfig;
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::constants::SESSION_POLL_INTERVAL_MS;
use crate::device::{self, Flow};
use crate::endpoint::{EndpointRegistry, EndpointState};
use crate::error::PlaybackError;
use crate::playback::decoder::{decode_file, DecodedAudio};

const TRANSPORT_STOPPED: u8 = 0;
const TRANSPORT_PLAYING: u8 = 1;
const TRANSPORT_PAUSED: u8 = 2;

/// Current playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerState {
    Unloaded,
    Stopped,
    Playing,
    Paused,
}

struct LoadedTrack {
    audio: Arc<DecodedAudio>,
    transport: Arc<AtomicU8>,
    /// Playhead in frames
    playhead: Arc<AtomicUsize>,
    /// Keep-alive flag for the stream thread
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    error_rx: Receiver<PlaybackError>,
}

impl LoadedTrack {
    fn shutdown(mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

/// High-level file player
///
/// All mutating operations are serialized by one lock per instance.
pub struct Player {
    inner: Mutex<Option<LoadedTrack>>,
    registry: EndpointRegistry,
}

impl Player {
    /// Create a player backed by the process-wide endpoint registry
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(None),
            registry: EndpointRegistry::global(),
        }
    }

    /// Create a player over a specific registry
    pub fn with_registry(registry: EndpointRegistry) -> Self {
        Self {
            inner: Mutex::new(None),
            registry,
        }
    }

    /// Load a file and prepare it for playback on the default output device
    ///
    /// Any previously loaded file is unloaded first. The state after a
    /// successful load is `Stopped` with the playhead at zero.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<(), PlaybackError> {
        let path = path.as_ref();
        let mut guard = self.inner.lock();
        if let Some(track) = guard.take() {
            track.shutdown();
        }

        let audio = Arc::new(decode_file(path)?);
        if audio.frames() == 0 {
            return Err(PlaybackError::Decode("file contains no audio".to_string()));
        }

        let output = device::resolve_default(Flow::Render)?;
        let endpoint = self.registry.entry(&output.id);

        let config = StreamConfig {
            channels: audio.channels,
            sample_rate: cpal::SampleRate(audio.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let transport = Arc::new(AtomicU8::new(TRANSPORT_STOPPED));
        let playhead = Arc::new(AtomicUsize::new(0));
        let running = Arc::new(AtomicBool::new(true));
        let (error_tx, error_rx) = bounded::<PlaybackError>(16);
        let (ready_tx, ready_rx) = bounded::<Result<(), PlaybackError>>(1);

        let thread_audio = Arc::clone(&audio);
        let thread_transport = Arc::clone(&transport);
        let thread_playhead = Arc::clone(&playhead);
        let thread_running = Arc::clone(&running);

        let handle = thread::Builder::new()
            .name("player-output".to_string())
            .spawn(move || {
                let device = output.into_inner();
                let callback = output_callback(
                    thread_audio,
                    Arc::clone(&thread_transport),
                    thread_playhead,
                    endpoint,
                );
                let stream_error_tx = error_tx.clone();
                let stream_transport = Arc::clone(&thread_transport);
                let stream = device.build_output_stream(
                    &config,
                    callback,
                    move |err| report_stream_error(&stream_transport, &stream_error_tx, err),
                    None,
                );

                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(PlaybackError::Stream(e.to_string())));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(PlaybackError::Stream(e.to_string())));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                while thread_running.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(SESSION_POLL_INTERVAL_MS));
                }
                // Stream drops here, releasing the device.
            })
            .map_err(|e| PlaybackError::Stream(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = handle.join();
                return Err(PlaybackError::Stream(
                    "playback thread exited during startup".to_string(),
                ));
            }
        }

        tracing::info!(
            path = %path.display(),
            duration_secs = audio.duration().as_secs_f64(),
            "file loaded"
        );

        *guard = Some(LoadedTrack {
            audio,
            transport,
            playhead,
            running,
            thread: Some(handle),
            error_rx,
        });
        Ok(())
    }

    /// Start or resume playback
    pub fn play(&self) -> Result<(), PlaybackError> {
        let guard = self.inner.lock();
        let track = guard.as_ref().ok_or(PlaybackError::NothingLoaded)?;
        track.transport.store(TRANSPORT_PLAYING, Ordering::SeqCst);
        Ok(())
    }

    /// Pause playback, keeping the playhead
    ///
    /// A no-op when nothing is loaded or playback is not running.
    pub fn pause(&self) {
        let guard = self.inner.lock();
        if let Some(track) = guard.as_ref() {
            let _ = track.transport.compare_exchange(
                TRANSPORT_PLAYING,
                TRANSPORT_PAUSED,
                Ordering::SeqCst,
                Ordering::SeqCst,
            );
        }
    }

    /// Stop playback and reset the playhead to the start
    ///
    /// The file stays loaded; a no-op when nothing is loaded.
    pub fn stop(&self) {
        let guard = self.inner.lock();
        if let Some(track) = guard.as_ref() {
            track.transport.store(TRANSPORT_STOPPED, Ordering::SeqCst);
            track.playhead.store(0, Ordering::SeqCst);
        }
    }

    /// Unload the current file and release the output stream
    pub fn unload(&self) {
        let mut guard = self.inner.lock();
        if let Some(track) = guard.take() {
            track.shutdown();
        }
    }

    /// True while a file is loaded
    pub fn is_loaded(&self) -> bool {
        self.inner.lock().is_some()
    }

    /// Current playback state
    pub fn state(&self) -> PlayerState {
        let guard = self.inner.lock();
        match guard.as_ref() {
            None => PlayerState::Unloaded,
            Some(track) => match track.transport.load(Ordering::SeqCst) {
                TRANSPORT_PLAYING => PlayerState::Playing,
                TRANSPORT_PAUSED => PlayerState::Paused,
                _ => PlayerState::Stopped,
            },
        }
    }

    /// Total duration of the loaded file
    pub fn duration(&self) -> Option<Duration> {
        self.inner.lock().as_ref().map(|t| t.audio.duration())
    }

    /// Current playhead position
    pub fn position(&self) -> Option<Duration> {
        let guard = self.inner.lock();
        guard.as_ref().map(|track| {
            let frames = track.playhead.load(Ordering::SeqCst);
            Duration::from_secs_f64(frames as f64 / track.audio.sample_rate as f64)
        })
    }

    /// Move the playhead, clamped to the file length
    pub fn seek(&self, position: Duration) -> Result<(), PlaybackError> {
        let guard = self.inner.lock();
        let track = guard.as_ref().ok_or(PlaybackError::NothingLoaded)?;
        let frame = (position.as_secs_f64() * track.audio.sample_rate as f64) as usize;
        track
            .playhead
            .store(frame.min(track.audio.frames()), Ordering::SeqCst);
        Ok(())
    }

    /// Check for asynchronous stream errors
    pub fn check_errors(&self) -> Option<PlaybackError> {
        let guard = self.inner.lock();
        guard.as_ref().and_then(|t| t.error_rx.try_recv().ok())
    }
}

impl Default for Player {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.unload();
    }
}

/// Record a stream error and halt the transport
///
/// The device is gone, so the state must not keep reading as playing.
fn report_stream_error(
    transport: &AtomicU8,
    tx: &Sender<PlaybackError>,
    err: impl std::fmt::Display,
) {
    let _ = tx.try_send(PlaybackError::Stream(err.to_string()));
    transport.store(TRANSPORT_STOPPED, Ordering::SeqCst);
}

/// Build the output data callback
///
/// The callback copies frames from the decoded buffer at the shared playhead,
/// applies endpoint gain/mute, and feeds the meter. Past end of data it emits
/// silence and flips the transport to stopped, leaving the playhead at the
/// end until the owner stops or seeks.
fn output_callback(
    audio: Arc<DecodedAudio>,
    transport: Arc<AtomicU8>,
    playhead: Arc<AtomicUsize>,
    endpoint: Arc<EndpointState>,
) -> impl FnMut(&mut [f32], &cpal::OutputCallbackInfo) {
    let channels = audio.channels as usize;
    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
        if transport.load(Ordering::Acquire) != TRANSPORT_PLAYING {
            data.fill(0.0);
            return;
        }

        let total = audio.frames();
        let mut pos = playhead.load(Ordering::Acquire);

        for frame in data.chunks_mut(channels) {
            if pos >= total || frame.len() < channels {
                frame.fill(0.0);
                continue;
            }
            let base = pos * channels;
            frame.copy_from_slice(&audio.samples[base..base + channels]);
            pos += 1;
        }

        endpoint.apply(data);

        if pos >= total {
            // Natural end: only commit if a caller-side stop didn't win.
            if transport
                .compare_exchange(
                    TRANSPORT_PLAYING,
                    TRANSPORT_STOPPED,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                playhead.store(pos, Ordering::Release);
            }
        } else if transport.load(Ordering::Acquire) == TRANSPORT_PLAYING {
            playhead.store(pos, Ordering::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_wav(name: &str) -> std::path::PathBuf {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 48000,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..12000 {
                let t = i as f32 / 48000.0;
                let sample = (2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.5;
                writer.write_sample(sample).unwrap();
            }
            writer.finalize().unwrap();
        }
        let path =
            std::env::temp_dir().join(format!("audio-endpoints-{}-{}", std::process::id(), name));
        std::fs::File::create(&path)
            .unwrap()
            .write_all(&cursor.into_inner())
            .unwrap();
        path
    }

    #[test]
    fn test_stream_error_halts_transport() {
        let transport = AtomicU8::new(TRANSPORT_PLAYING);
        let (tx, rx) = bounded::<PlaybackError>(1);
        report_stream_error(&transport, &tx, "device disconnected");
        assert_eq!(transport.load(Ordering::SeqCst), TRANSPORT_STOPPED);
        assert!(matches!(rx.try_recv(), Ok(PlaybackError::Stream(_))));
    }

    #[test]
    fn test_play_without_load_fails() {
        let player = Player::with_registry(EndpointRegistry::new());
        assert!(matches!(player.play(), Err(PlaybackError::NothingLoaded)));
        assert_eq!(player.state(), PlayerState::Unloaded);
        assert!(!player.is_loaded());
    }

    #[test]
    fn test_pause_and_stop_without_load_are_noops() {
        let player = Player::with_registry(EndpointRegistry::new());
        player.pause();
        player.stop();
        assert_eq!(player.state(), PlayerState::Unloaded);
        assert!(player.duration().is_none());
        assert!(player.position().is_none());
    }

    #[test]
    fn test_seek_without_load_fails() {
        let player = Player::with_registry(EndpointRegistry::new());
        assert!(matches!(
            player.seek(Duration::from_secs(1)),
            Err(PlaybackError::NothingLoaded)
        ));
    }

    #[test]
    fn test_load_missing_file_fails() {
        let player = Player::with_registry(EndpointRegistry::new());
        let err = player.load("/definitely/not/here.wav").unwrap_err();
        assert!(matches!(err, PlaybackError::Io(_)));
        assert_eq!(player.state(), PlayerState::Unloaded);
    }

    #[test]
    fn test_lifecycle_with_output_device() {
        // Exercises the real output path; passes trivially without a usable
        // output device (headless CI).
        if device::resolve_default(Flow::Render).is_err() {
            return;
        }
        let path = temp_wav("lifecycle.wav");
        let player = Player::with_registry(EndpointRegistry::new());
        if player.load(&path).is_err() {
            let _ = std::fs::remove_file(&path);
            return;
        }

        assert!(player.is_loaded());
        assert_eq!(player.state(), PlayerState::Stopped);
        let duration = player.duration().unwrap();
        assert!((duration.as_secs_f64() - 0.25).abs() < 1e-3);

        player.play().unwrap();
        assert_eq!(player.state(), PlayerState::Playing);

        player.pause();
        assert_eq!(player.state(), PlayerState::Paused);

        player.play().unwrap();
        player.stop();
        assert_eq!(player.state(), PlayerState::Stopped);
        assert_eq!(player.position().unwrap(), Duration::ZERO);
        assert!(player.is_loaded());

        player.seek(Duration::from_secs(10)).unwrap();
        assert!(player.position().unwrap() <= duration);

        player.unload();
        assert_eq!(player.state(), PlayerState::Unloaded);

        let _ = std::fs::remove_file(&path);
    }
}
