//! Print Calibration Example
//!
//! Parses a projector calibration file, reads every warp map it references
//! and prints what was loaded.
//!
//! Usage: cargo run --example print_calibration -- path/to/calibration.txt

use omni_render::calibration::{CalibrationConfig, WarpLoadOutcome};
use omni_render::telemetry::init_logging_default;

fn main() -> anyhow::Result<()> {
    let _guard = init_logging_default()?;

    let path = std::env::args()
        .nth(1)
        .ok_or_else(|| anyhow::anyhow!("usage: print_calibration <calibration file>"))?;

    let mut config = CalibrationConfig::load(&path)?;
    for warning in config.warnings() {
        println!("warning: {}", warning);
    }

    let outcomes = config.load_data();
    print!("{}", config.summary());

    println!();
    for (projector, outcome) in config.projectors().iter().zip(&outcomes) {
        let status = match outcome {
            WarpLoadOutcome::Loaded => "loaded".to_string(),
            WarpLoadOutcome::Truncated { read, expected } => format!("short ({} of {} floats)", read, expected),
            WarpLoadOutcome::Oversized { expected, available } => {
                format!("oversized ({} floats, used {})", available, expected)
            }
            WarpLoadOutcome::NoDimensions => "no dimensions".to_string(),
            WarpLoadOutcome::TooLarge { width, height } => format!("too large ({}x{})", width, height),
            WarpLoadOutcome::Failed(e) => format!("failed: {}", e),
        };
        println!("id {}: {}", projector.id, status);
    }

    Ok(())
}
