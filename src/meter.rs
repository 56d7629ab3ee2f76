//! Peak meter readings for endpoints

use crate::constants::METER_FLOOR_DB;
use crate::device;
use crate::endpoint::EndpointRegistry;
use crate::error::DeviceError;

/// Reads instantaneous peak levels for endpoints
///
/// Levels are fed by this crate's active playback and capture sessions; an
/// endpoint with no running session reads 0.0.
pub struct PeakMeter {
    registry: EndpointRegistry,
}

impl PeakMeter {
    /// Create a meter backed by the process-wide registry
    pub fn new() -> Self {
        Self {
            registry: EndpointRegistry::global(),
        }
    }

    /// Create a meter over a specific registry
    pub fn with_registry(registry: EndpointRegistry) -> Self {
        Self { registry }
    }

    /// Instantaneous peak amplitude (0..=1) for an endpoint
    pub fn peak(&self, device_id: &str) -> Result<f32, DeviceError> {
        device::resolve(device_id)?;
        Ok(self
            .registry
            .get(device_id)
            .map(|state| state.peak())
            .unwrap_or(0.0))
    }

    /// Peak level in dBFS, floored at the meter's silence threshold
    pub fn peak_db(&self, device_id: &str) -> Result<f32, DeviceError> {
        let peak = self.peak(device_id)?;
        if peak > 1e-10 {
            Ok((20.0 * peak.log10()).max(METER_FLOOR_DB))
        } else {
            Ok(METER_FLOOR_DB)
        }
    }
}

impl Default for PeakMeter {
    fn default() -> Self {
        Self::new()
    }
}
