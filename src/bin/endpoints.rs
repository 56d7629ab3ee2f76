//! Endpoint Listing CLI
//!
//! Prints the active render and capture endpoints with default markers, or
//! machine-readable snapshots with `--json`.

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use audio_endpoints::device::{list_capture_devices, list_render_devices, DeviceInfo};

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let json = std::env::args().any(|a| a == "--json");

    let render = list_render_devices();
    let capture = list_capture_devices();

    if json {
        #[derive(serde::Serialize)]
        struct Listing {
            render: Vec<DeviceInfo>,
            capture: Vec<DeviceInfo>,
        }
        let listing = Listing { render, capture };
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    println!("=== Render Endpoints ===");
    print_devices(&render);
    println!("\n=== Capture Endpoints ===");
    print_devices(&capture);

    Ok(())
}

fn print_devices(devices: &[DeviceInfo]) {
    if devices.is_empty() {
        println!("  (none)");
        return;
    }
    for device in devices {
        let default_marker = if device.is_default_console {
            " [DEFAULT]"
        } else {
            ""
        };
        println!("  {}{}:", device.name, default_marker);
        println!("    ID: {}", device.id);
        println!("    Volume: {:.2}", device.master_volume);
        println!("    Muted: {}", device.is_muted);
    }
}
