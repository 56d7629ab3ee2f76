//! Per-endpoint master volume and mute control

use crate::device;
use crate::endpoint::EndpointRegistry;
use crate::error::DeviceError;

/// Controls endpoint-wide master volume and mute state, keyed by endpoint id
///
/// Every operation resolves the id first; an unknown id is an error, matching
/// the lookup-required semantics of the other per-device operations.
pub struct VolumeControl {
    registry: EndpointRegistry,
}

impl VolumeControl {
    /// Create a controller backed by the process-wide registry
    pub fn new() -> Self {
        Self {
            registry: EndpointRegistry::global(),
        }
    }

    /// Create a controller over a specific registry
    pub fn with_registry(registry: EndpointRegistry) -> Self {
        Self { registry }
    }

    /// Read the master volume (0..=1) for an endpoint
    pub fn master_volume(&self, device_id: &str) -> Result<f32, DeviceError> {
        device::resolve(device_id)?;
        Ok(self.registry.entry(device_id).volume())
    }

    /// Set the master volume for an endpoint, clamped to 0..=1
    pub fn set_master_volume(&self, device_id: &str, volume: f32) -> Result<(), DeviceError> {
        device::resolve(device_id)?;
        self.registry.entry(device_id).set_volume(volume);
        tracing::debug!(device_id, volume, "master volume updated");
        Ok(())
    }

    /// Get the mute state of an endpoint
    pub fn is_muted(&self, device_id: &str) -> Result<bool, DeviceError> {
        device::resolve(device_id)?;
        Ok(self.registry.entry(device_id).is_muted())
    }

    /// Set the mute state of an endpoint
    pub fn set_muted(&self, device_id: &str, muted: bool) -> Result<(), DeviceError> {
        device::resolve(device_id)?;
        self.registry.entry(device_id).set_muted(muted);
        tracing::debug!(device_id, muted, "mute state updated");
        Ok(())
    }
}

impl Default for VolumeControl {
    fn default() -> Self {
        Self::new()
    }
}
