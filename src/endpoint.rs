//! Shared per-endpoint control state
//!
//! cpal exposes no endpoint mixer or meter, so volume, mute, and peak level
//! live in a process-wide registry keyed by endpoint id. Streams opened by
//! this crate apply the control values inside their callbacks and feed the
//! meter; all fields are atomics so the real-time path never takes a lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use portable_atomic::AtomicF32;

/// Control state for one endpoint: gain, mute, and instantaneous peak
#[derive(Debug)]
pub struct EndpointState {
    /// Master gain, clamped to 0.0..=1.0
    gain: AtomicF32,
    /// Mute flag
    muted: AtomicBool,
    /// Peak of the most recent buffer, stored as f32 bits
    peak: AtomicU32,
}

impl EndpointState {
    pub fn new() -> Self {
        Self {
            gain: AtomicF32::new(1.0),
            muted: AtomicBool::new(false),
            peak: AtomicU32::new(0.0f32.to_bits()),
        }
    }

    /// Get current master volume
    pub fn volume(&self) -> f32 {
        self.gain.load(Ordering::Relaxed)
    }

    /// Set master volume (clamped to 0.0..=1.0)
    pub fn set_volume(&self, value: f32) {
        self.gain.store(value.clamp(0.0, 1.0), Ordering::Relaxed);
    }

    /// Get mute state
    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    /// Set mute state
    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    /// Instantaneous peak amplitude of the most recent buffer, 0.0..=1.0
    pub fn peak(&self) -> f32 {
        f32::from_bits(self.peak.load(Ordering::Relaxed))
    }

    /// Record the peak of a delivered buffer
    ///
    /// Overwrites rather than folds; the meter reports the latest buffer.
    pub fn observe(&self, samples: &[f32]) {
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);
        self.peak.store(peak.min(1.0).to_bits(), Ordering::Relaxed);
    }

    /// Apply gain and mute in place, feeding the meter with the raw signal
    ///
    /// Called from stream callbacks; lock-free.
    pub fn apply(&self, samples: &mut [f32]) {
        let gain = self.volume();
        let muted = self.is_muted();
        let mut peak = 0.0f32;
        for sample in samples.iter_mut() {
            peak = peak.max(sample.abs());
            *sample = if muted { 0.0 } else { *sample * gain };
        }
        self.peak.store(peak.min(1.0).to_bits(), Ordering::Relaxed);
    }
}

impl Default for EndpointState {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide registry of endpoint control state, keyed by endpoint id
///
/// Cheap to clone; clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct EndpointRegistry {
    inner: Arc<RwLock<HashMap<String, Arc<EndpointState>>>>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry shared by default-constructed components
    pub fn global() -> EndpointRegistry {
        static GLOBAL: OnceLock<EndpointRegistry> = OnceLock::new();
        GLOBAL.get_or_init(EndpointRegistry::new).clone()
    }

    /// Get the state for an endpoint, creating it on first use
    pub fn entry(&self, id: &str) -> Arc<EndpointState> {
        if let Some(state) = self.inner.read().get(id) {
            return Arc::clone(state);
        }
        let mut map = self.inner.write();
        Arc::clone(
            map.entry(id.to_string())
                .or_insert_with(|| Arc::new(EndpointState::new())),
        )
    }

    /// Get the state for an endpoint if any session or setter has touched it
    pub fn get(&self, id: &str) -> Option<Arc<EndpointState>> {
        self.inner.read().get(id).map(Arc::clone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_clamps() {
        let state = EndpointState::new();
        state.set_volume(1.5);
        assert_eq!(state.volume(), 1.0);
        state.set_volume(-0.3);
        assert_eq!(state.volume(), 0.0);
        state.set_volume(0.42);
        assert_eq!(state.volume(), 0.42);
    }

    #[test]
    fn test_mute_round_trips() {
        let state = EndpointState::new();
        assert!(!state.is_muted());
        state.set_muted(true);
        assert!(state.is_muted());
        state.set_muted(true);
        assert!(state.is_muted());
        state.set_muted(false);
        assert!(!state.is_muted());
    }

    #[test]
    fn test_observe_records_buffer_peak() {
        let state = EndpointState::new();
        state.observe(&[0.1, -0.6, 0.3]);
        assert!((state.peak() - 0.6).abs() < 1e-6);
        // A quieter buffer replaces the reading rather than holding the max.
        state.observe(&[0.05, -0.02]);
        assert!((state.peak() - 0.05).abs() < 1e-6);
    }

    #[test]
    fn test_observe_clamps_to_unit_range() {
        let state = EndpointState::new();
        state.observe(&[2.5]);
        assert_eq!(state.peak(), 1.0);
    }

    #[test]
    fn test_apply_gain_and_mute() {
        let state = EndpointState::new();
        state.set_volume(0.5);
        let mut samples = [0.8f32, -0.4];
        state.apply(&mut samples);
        assert!((samples[0] - 0.4).abs() < 1e-6);
        assert!((samples[1] + 0.2).abs() < 1e-6);
        // Meter reads the raw signal, not the attenuated one.
        assert!((state.peak() - 0.8).abs() < 1e-6);

        state.set_muted(true);
        let mut samples = [0.8f32, -0.4];
        state.apply(&mut samples);
        assert_eq!(samples, [0.0, 0.0]);
        assert!((state.peak() - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_registry_entry_is_shared() {
        let registry = EndpointRegistry::new();
        let a = registry.entry("render:Speakers");
        a.set_volume(0.25);
        let b = registry.entry("render:Speakers");
        assert_eq!(b.volume(), 0.25);
        assert!(registry.get("render:Speakers").is_some());
        assert!(registry.get("render:Other").is_none());
    }
}
