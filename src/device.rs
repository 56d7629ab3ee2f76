//! Audio endpoint enumeration and lookup
//!
//! Endpoints are identified by opaque strings of the form `render:<name>` or
//! `capture:<name>`, produced by enumeration. Callers treat them as values;
//! only [`resolve`] parses them back into a live device handle.

use cpal::traits::{DeviceTrait, HostTrait};
use serde::{Deserialize, Serialize};

use crate::endpoint::EndpointRegistry;
use crate::error::DeviceError;

/// Audio signal flow direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flow {
    /// Playback endpoints (speakers, headphones)
    Render,
    /// Recording endpoints (microphones, line-in)
    Capture,
}

impl std::fmt::Display for Flow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Flow::Render => write!(f, "render"),
            Flow::Capture => write!(f, "capture"),
        }
    }
}

/// Default-device category
///
/// cpal exposes a single system default per direction, so every role resolves
/// to the same endpoint; the parameter is kept so callers can express intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Default for most applications
    Console,
    /// Default for music and video
    Multimedia,
    /// Default for VoIP and calls
    Communications,
}

/// Immutable endpoint snapshot
///
/// Constructed fresh on each query and never cached; it can go stale
/// immediately relative to live device state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
    pub flow: Flow,
    pub is_default_console: bool,
    pub is_default_multimedia: bool,
    pub is_default_communications: bool,
    pub is_muted: bool,
    pub master_volume: f32,
}

/// Wrapper around a live cpal device handle
///
/// This is the shared resolution utility every stateful component goes
/// through before opening a stream.
pub struct ResolvedDevice {
    inner: cpal::Device,
    pub id: String,
    pub name: String,
    pub flow: Flow,
}

impl std::fmt::Debug for ResolvedDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedDevice")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("flow", &self.flow)
            .finish_non_exhaustive()
    }
}

impl ResolvedDevice {
    pub(crate) fn from_cpal(device: cpal::Device, flow: Flow) -> Self {
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        let id = format!("{}:{}", flow, name);
        Self {
            inner: device,
            id,
            name,
            flow,
        }
    }

    pub fn inner(&self) -> &cpal::Device {
        &self.inner
    }

    pub fn into_inner(self) -> cpal::Device {
        self.inner
    }

    /// Get default input config
    pub fn default_input_config(&self) -> Result<cpal::SupportedStreamConfig, DeviceError> {
        self.inner
            .default_input_config()
            .map_err(|e| DeviceError::Backend(e.to_string()))
    }

    /// Get default output config
    pub fn default_output_config(&self) -> Result<cpal::SupportedStreamConfig, DeviceError> {
        self.inner
            .default_output_config()
            .map_err(|e| DeviceError::Backend(e.to_string()))
    }
}

/// List active endpoints for one direction
pub fn list_devices(flow: Flow) -> Vec<DeviceInfo> {
    let host = cpal::default_host();
    let default_name = default_device_name(&host, flow);
    let registry = EndpointRegistry::global();

    let devices = match flow {
        Flow::Render => host.output_devices().map(collect_devices),
        Flow::Capture => host.input_devices().map(collect_devices),
    };

    match devices {
        Ok(devices) => devices
            .into_iter()
            .map(|d| {
                let resolved = ResolvedDevice::from_cpal(d, flow);
                let is_default = default_name.as_deref() == Some(resolved.name.as_str());
                snapshot(&resolved, is_default, &registry)
            })
            .collect(),
        Err(e) => {
            tracing::warn!("failed to enumerate {} endpoints: {}", flow, e);
            Vec::new()
        }
    }
}

/// List active playback endpoints
pub fn list_render_devices() -> Vec<DeviceInfo> {
    list_devices(Flow::Render)
}

/// List active recording endpoints
pub fn list_capture_devices() -> Vec<DeviceInfo> {
    list_devices(Flow::Capture)
}

/// Get the default endpoint snapshot for the given flow and role
pub fn default_device(flow: Flow, role: Role) -> Result<DeviceInfo, DeviceError> {
    tracing::trace!(?flow, ?role, "resolving default endpoint");
    let resolved = resolve_default(flow)?;
    Ok(snapshot(&resolved, true, &EndpointRegistry::global()))
}

/// Retrieve an endpoint snapshot by its id
///
/// Returns `None` for an unknown id; this lookup never fails.
pub fn device_by_id(id: &str) -> Option<DeviceInfo> {
    let resolved = resolve(id).ok()?;
    let host = cpal::default_host();
    let is_default = default_device_name(&host, resolved.flow).as_deref()
        == Some(resolved.name.as_str());
    Some(snapshot(&resolved, is_default, &EndpointRegistry::global()))
}

/// Resolve an endpoint id to a live device handle
pub fn resolve(id: &str) -> Result<ResolvedDevice, DeviceError> {
    let (flow, name) = if let Some(name) = id.strip_prefix("render:") {
        (Flow::Render, name)
    } else if let Some(name) = id.strip_prefix("capture:") {
        (Flow::Capture, name)
    } else {
        return Err(DeviceError::NotFound(id.to_string()));
    };

    let host = cpal::default_host();
    let devices = match flow {
        Flow::Render => host.output_devices().map(collect_devices),
        Flow::Capture => host.input_devices().map(collect_devices),
    }
    .map_err(|e| DeviceError::Backend(e.to_string()))?;

    for device in devices {
        if let Ok(device_name) = device.name() {
            if device_name == name {
                return Ok(ResolvedDevice::from_cpal(device, flow));
            }
        }
    }

    Err(DeviceError::NotFound(id.to_string()))
}

/// Resolve the default endpoint for one direction to a live handle
pub fn resolve_default(flow: Flow) -> Result<ResolvedDevice, DeviceError> {
    let host = cpal::default_host();
    let device = match flow {
        Flow::Render => host.default_output_device(),
        Flow::Capture => host.default_input_device(),
    };
    device
        .map(|d| ResolvedDevice::from_cpal(d, flow))
        .ok_or(DeviceError::NoDefault(flow))
}

fn collect_devices(iter: impl Iterator<Item = cpal::Device>) -> Vec<cpal::Device> {
    iter.collect()
}

fn default_device_name(host: &cpal::Host, flow: Flow) -> Option<String> {
    match flow {
        Flow::Render => host.default_output_device(),
        Flow::Capture => host.default_input_device(),
    }
    .and_then(|d| d.name().ok())
}

fn snapshot(device: &ResolvedDevice, is_default: bool, registry: &EndpointRegistry) -> DeviceInfo {
    let (master_volume, is_muted) = registry
        .get(&device.id)
        .map(|state| (state.volume(), state.is_muted()))
        .unwrap_or((1.0, false));

    DeviceInfo {
        id: device.id.clone(),
        name: device.name.clone(),
        flow: device.flow,
        // One system default per direction covers all three roles.
        is_default_console: is_default,
        is_default_multimedia: is_default,
        is_default_communications: is_default,
        is_muted,
        master_volume,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_id_is_none() {
        assert!(device_by_id("render:definitely-not-a-real-endpoint").is_none());
        assert!(device_by_id("no-prefix-at-all").is_none());
    }

    #[test]
    fn test_resolve_rejects_unprefixed_ids() {
        let err = resolve("built-in-speakers").unwrap_err();
        assert!(matches!(err, DeviceError::NotFound(_)));
    }

    #[test]
    fn test_list_devices_smoke() {
        // May be empty on headless systems; must not panic either way.
        let render = list_render_devices();
        let capture = list_capture_devices();
        for d in render.iter().chain(capture.iter()) {
            assert!(d.id.starts_with("render:") || d.id.starts_with("capture:"));
            assert!((0.0..=1.0).contains(&d.master_volume));
        }
    }

    #[test]
    fn test_default_flags_are_uniform() {
        // The three role flags always agree on cpal-backed snapshots.
        for d in list_render_devices() {
            assert_eq!(d.is_default_console, d.is_default_multimedia);
            assert_eq!(d.is_default_console, d.is_default_communications);
        }
    }

    #[test]
    fn test_enumerated_ids_round_trip() {
        for d in list_capture_devices() {
            let again = device_by_id(&d.id).expect("enumerated id should resolve");
            assert_eq!(again.name, d.name);
            assert_eq!(again.flow, Flow::Capture);
        }
    }
}
