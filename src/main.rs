//! Omni Render - Main Entry Point
//!
//! Dome viewer: renders the icosahedron lattice into a cubemap and
//! composites it through the configured projector calibration.

use omni_render::settings::RenderSettings;
use omni_render::telemetry::{init_logging, LogConfig};
use omni_render::OmniApp;
use winit::event_loop::{ControlFlow, EventLoop};

fn main() -> anyhow::Result<()> {
    // Keep the guard alive for the program duration
    let _log_guard = match init_logging(&LogConfig::default()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            None
        }
    };

    tracing::info!("Omni Render v{}", env!("CARGO_PKG_VERSION"));

    let mut settings = RenderSettings::load();
    settings.sanitize();
    tracing::info!(
        "Cube resolution {}, stereo {:?}, displacement {:?}",
        settings.cube_resolution,
        settings.stereo_mode,
        settings.displacement_model
    );

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = OmniApp::new(settings);
    event_loop.run_app(&mut app)?;

    tracing::info!("Shutdown complete");
    Ok(())
}
