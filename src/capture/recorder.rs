//! Loopback and microphone recording to WAV
//!
//! Each recorder owns at most one active capture session. A session is a
//! dedicated thread that owns the cpal input stream and the WAV sink; the
//! stream callback converts buffers to f32, applies endpoint gain/mute, feeds
//! the meter, and hands them to the session thread over a channel. Stop, a
//! caller's or an OS-initiated one, flips the keep-alive
//! flag and joins; the sink is finalized before `stop` returns, so the file
//! is complete and readable by then. The stream thread owns the stream
//! because cpal streams are not `Send`.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, StreamTrait};
#[cfg(not(target_os = "windows"))]
use cpal::traits::HostTrait;
use cpal::{SampleFormat, SupportedStreamConfig};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use crate::constants::SESSION_POLL_INTERVAL_MS;
use crate::device::{self, Flow, ResolvedDevice};
use crate::endpoint::{EndpointRegistry, EndpointState};
use crate::error::CaptureError;

use super::writer::WavSink;

/// One running capture: keep-alive flag, session thread, result channels
struct CaptureSession {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    error_rx: Receiver<CaptureError>,
    done_rx: Receiver<Result<u64, CaptureError>>,
}

impl CaptureSession {
    fn start(
        device: ResolvedDevice,
        supported: SupportedStreamConfig,
        path: &Path,
        endpoint: Arc<EndpointState>,
    ) -> Result<Self, CaptureError> {
        // Create the destination up front so a bad path fails synchronously.
        let sink = WavSink::create(path, supported.channels(), supported.sample_rate().0)?;

        let running = Arc::new(AtomicBool::new(true));
        let (error_tx, error_rx) = bounded::<CaptureError>(16);
        let (done_tx, done_rx) = bounded::<Result<u64, CaptureError>>(1);
        let (ready_tx, ready_rx) = bounded::<Result<(), CaptureError>>(1);

        let thread_running = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name("capture-session".to_string())
            .spawn(move || {
                run_session(
                    device.into_inner(),
                    supported,
                    sink,
                    endpoint,
                    thread_running,
                    error_tx,
                    ready_tx,
                    done_tx,
                );
            })
            .map_err(|e| CaptureError::Stream(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                running,
                thread: Some(handle),
                error_rx,
                done_rx,
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(CaptureError::Stream(
                    "capture thread exited during startup".to_string(),
                ))
            }
        }
    }

    /// True once the session thread has halted, by caller stop or stream error
    fn is_finished(&self) -> bool {
        !self.running.load(Ordering::SeqCst)
    }

    /// Request a halt, join the thread, and return the final frame count
    fn stop(mut self) -> Result<u64, CaptureError> {
        self.running.store(false, Ordering::SeqCst);
        let result = self.done_rx.recv();
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
        match result {
            Ok(r) => r,
            Err(_) => Err(CaptureError::Stream(
                "capture thread exited without finalizing".to_string(),
            )),
        }
    }
}

/// Reap a session whose thread halted on its own (OS-initiated stop)
///
/// The file was already finalized by the session thread; joining it here
/// returns the owner to idle the same way a caller-driven stop does, so
/// `is_capturing()` reads false and a new start is not blocked.
fn reap_finished(slot: &mut Option<CaptureSession>) {
    if slot.as_ref().is_some_and(|s| s.is_finished()) {
        if let Some(session) = slot.take() {
            match session.stop() {
                Ok(frames) => tracing::info!(frames, "capture halted by the stream"),
                Err(e) => tracing::warn!(error = %e, "capture halted by the stream"),
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_session(
    device: cpal::Device,
    supported: SupportedStreamConfig,
    mut sink: WavSink,
    endpoint: Arc<EndpointState>,
    running: Arc<AtomicBool>,
    error_tx: Sender<CaptureError>,
    ready_tx: Sender<Result<(), CaptureError>>,
    done_tx: Sender<Result<u64, CaptureError>>,
) {
    let config = supported.config();
    let (data_tx, data_rx) = unbounded::<Vec<f32>>();

    // A stream error is an OS-initiated stop: report it and clear the
    // keep-alive flag so the session finalizes.
    let make_err = |tx: Sender<CaptureError>, running: Arc<AtomicBool>| {
        move |err: cpal::StreamError| {
            let _ = tx.try_send(CaptureError::Stream(err.to_string()));
            running.store(false, Ordering::SeqCst);
        }
    };

    let stream = match supported.sample_format() {
        SampleFormat::F32 => {
            let tx = data_tx.clone();
            let ep = Arc::clone(&endpoint);
            device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let mut block = data.to_vec();
                    ep.apply(&mut block);
                    let _ = tx.send(block);
                },
                make_err(error_tx.clone(), Arc::clone(&running)),
                None,
            )
        }
        SampleFormat::I16 => {
            let tx = data_tx.clone();
            let ep = Arc::clone(&endpoint);
            device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let mut block: Vec<f32> =
                        data.iter().map(|&s| s as f32 / 32768.0).collect();
                    ep.apply(&mut block);
                    let _ = tx.send(block);
                },
                make_err(error_tx.clone(), Arc::clone(&running)),
                None,
            )
        }
        SampleFormat::U16 => {
            let tx = data_tx.clone();
            let ep = Arc::clone(&endpoint);
            device.build_input_stream(
                &config,
                move |data: &[u16], _: &cpal::InputCallbackInfo| {
                    let mut block: Vec<f32> =
                        data.iter().map(|&s| (s as f32 - 32768.0) / 32768.0).collect();
                    ep.apply(&mut block);
                    let _ = tx.send(block);
                },
                make_err(error_tx.clone(), Arc::clone(&running)),
                None,
            )
        }
        other => {
            let _ = ready_tx.send(Err(CaptureError::Stream(format!(
                "unsupported sample format: {other}"
            ))));
            return;
        }
    };

    let stream = match stream {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(CaptureError::Stream(e.to_string())));
            return;
        }
    };
    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(CaptureError::Stream(e.to_string())));
        return;
    }
    let _ = ready_tx.send(Ok(()));

    let mut write_error: Option<CaptureError> = None;
    while running.load(Ordering::Relaxed) {
        match data_rx.recv_timeout(Duration::from_millis(SESSION_POLL_INTERVAL_MS)) {
            Ok(block) => {
                if let Err(e) = sink.append(&block) {
                    write_error = Some(e);
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    // Stop delivery, then drain buffers that were already in flight.
    drop(stream);
    while let Ok(block) = data_rx.try_recv() {
        if write_error.is_some() {
            break;
        }
        if let Err(e) = sink.append(&block) {
            write_error = Some(e);
        }
    }

    let frames = sink.frames_written();
    let result = match write_error {
        Some(e) => Err(e),
        None => sink.finalize().map(|()| frames),
    };
    let _ = done_tx.send(result);
}

/// Records a specific input endpoint to a WAV file
pub struct MicrophoneRecorder {
    session: Mutex<Option<CaptureSession>>,
    registry: EndpointRegistry,
}

impl MicrophoneRecorder {
    /// Create a recorder backed by the process-wide registry
    pub fn new() -> Self {
        Self {
            session: Mutex::new(None),
            registry: EndpointRegistry::global(),
        }
    }

    /// Create a recorder over a specific registry
    pub fn with_registry(registry: EndpointRegistry) -> Self {
        Self {
            session: Mutex::new(None),
            registry,
        }
    }

    /// Start capturing the endpoint with id `device_id` to `path`
    ///
    /// Fails with [`CaptureError::AlreadyCapturing`] while a session is
    /// active.
    pub fn start(&self, device_id: &str, path: impl AsRef<Path>) -> Result<(), CaptureError> {
        let path = path.as_ref();
        let mut guard = self.session.lock();
        reap_finished(&mut guard);
        if guard.is_some() {
            return Err(CaptureError::AlreadyCapturing);
        }

        let device = device::resolve(device_id)?;
        let supported = device.default_input_config()?;
        let endpoint = self.registry.entry(&device.id);

        let session = CaptureSession::start(device, supported, path, endpoint)?;
        tracing::info!(device_id, path = %path.display(), "microphone capture started");
        *guard = Some(session);
        Ok(())
    }

    /// Stop capturing and finalize the file; a no-op when idle
    pub fn stop(&self) -> Result<(), CaptureError> {
        let mut guard = self.session.lock();
        match guard.take() {
            Some(session) => {
                let frames = session.stop()?;
                tracing::info!(frames, "microphone capture stopped");
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// True while a session is active
    ///
    /// A session halted by the stream itself is reaped here and reads idle.
    pub fn is_capturing(&self) -> bool {
        let mut guard = self.session.lock();
        reap_finished(&mut guard);
        guard.is_some()
    }

    /// Check for asynchronous stream errors
    pub fn check_errors(&self) -> Option<CaptureError> {
        let guard = self.session.lock();
        guard.as_ref().and_then(|s| s.error_rx.try_recv().ok())
    }
}

impl Default for MicrophoneRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MicrophoneRecorder {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Records the system output mix of the default render device to a WAV file
pub struct LoopbackRecorder {
    session: Mutex<Option<CaptureSession>>,
    registry: EndpointRegistry,
}

impl LoopbackRecorder {
    /// Create a recorder backed by the process-wide registry
    pub fn new() -> Self {
        Self {
            session: Mutex::new(None),
            registry: EndpointRegistry::global(),
        }
    }

    /// Create a recorder over a specific registry
    pub fn with_registry(registry: EndpointRegistry) -> Self {
        Self {
            session: Mutex::new(None),
            registry,
        }
    }

    /// Start capturing the system output mix to `path`
    ///
    /// Fails with [`CaptureError::AlreadyCapturing`] while a session is
    /// active and with [`CaptureError::LoopbackUnavailable`] when no loopback
    /// source exists for the default output device.
    pub fn start(&self, path: impl AsRef<Path>) -> Result<(), CaptureError> {
        let path = path.as_ref();
        let mut guard = self.session.lock();
        reap_finished(&mut guard);
        if guard.is_some() {
            return Err(CaptureError::AlreadyCapturing);
        }

        let (device, supported) = loopback_source()?;
        let endpoint = self.registry.entry(&device.id);

        let session = CaptureSession::start(device, supported, path, endpoint)?;
        tracing::info!(path = %path.display(), "loopback capture started");
        *guard = Some(session);
        Ok(())
    }

    /// Stop capturing and finalize the file; a no-op when idle
    pub fn stop(&self) -> Result<(), CaptureError> {
        let mut guard = self.session.lock();
        match guard.take() {
            Some(session) => {
                let frames = session.stop()?;
                tracing::info!(frames, "loopback capture stopped");
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// True while a session is active
    ///
    /// A session halted by the stream itself is reaped here and reads idle.
    pub fn is_capturing(&self) -> bool {
        let mut guard = self.session.lock();
        reap_finished(&mut guard);
        guard.is_some()
    }

    /// Check for asynchronous stream errors
    pub fn check_errors(&self) -> Option<CaptureError> {
        let guard = self.session.lock();
        guard.as_ref().and_then(|s| s.error_rx.try_recv().ok())
    }
}

impl Default for LoopbackRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LoopbackRecorder {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Pick the capture source for the system output mix
///
/// On WASAPI a render endpoint accepts an input stream directly, configured
/// with the device's output shape. Elsewhere the PulseAudio/PipeWire
/// convention applies: a capture endpoint advertising itself as a monitor of
/// an output, preferably the default one.
#[cfg(target_os = "windows")]
fn loopback_source() -> Result<(ResolvedDevice, SupportedStreamConfig), CaptureError> {
    let device = device::resolve_default(Flow::Render)?;
    let supported = device.default_output_config()?;
    Ok((device, supported))
}

#[cfg(not(target_os = "windows"))]
fn loopback_source() -> Result<(ResolvedDevice, SupportedStreamConfig), CaptureError> {
    let default_output = device::resolve_default(Flow::Render)
        .ok()
        .map(|d| d.name.to_lowercase());

    let host = cpal::default_host();
    let inputs = host
        .input_devices()
        .map_err(|e| CaptureError::Stream(e.to_string()))?;

    let mut fallback: Option<ResolvedDevice> = None;
    for dev in inputs {
        let Ok(name) = dev.name() else { continue };
        let lower = name.to_lowercase();
        if !lower.contains("monitor") && !lower.contains("loopback") {
            continue;
        }
        let resolved = ResolvedDevice::from_cpal(dev, Flow::Capture);
        if let Some(out) = &default_output {
            if lower.contains(out.as_str()) {
                let supported = resolved.default_input_config()?;
                return Ok((resolved, supported));
            }
        }
        if fallback.is_none() {
            fallback = Some(resolved);
        }
    }

    match fallback {
        Some(resolved) => {
            let supported = resolved.default_input_config()?;
            Ok((resolved, supported))
        }
        None => Err(CaptureError::LoopbackUnavailable),
    }
}
