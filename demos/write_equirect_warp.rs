//! Write Equirectangular Warp Example
//!
//! Writes a warp map whose directions cover the full sphere, in the raw
//! float format read by the calibration loader. Useful as a stand-in warp
//! file for a single full-dome projector.
//!
//! Usage: cargo run --example write_equirect_warp -- out.bin [width] [height]

use std::path::PathBuf;

use omni_render::calibration::WarpMap;
use omni_render::telemetry::init_logging_default;

fn main() -> anyhow::Result<()> {
    let _guard = init_logging_default()?;

    let mut args = std::env::args().skip(1);
    let path: PathBuf = args
        .next()
        .ok_or_else(|| anyhow::anyhow!("usage: write_equirect_warp <out> [width] [height]"))?
        .into();
    let width: u32 = args.next().map(|s| s.parse()).transpose()?.unwrap_or(2048);
    let height: u32 = args.next().map(|s| s.parse()).transpose()?.unwrap_or(1024);

    let warp = WarpMap::equirectangular(width, height);
    warp.write(&path)?;

    println!("Wrote {}x{} warp map to {}", warp.width, warp.height, path.display());
    println!();
    println!("Calibration entry:");
    println!("id 0");
    println!("filepath {}", path.display());
    println!("width {}", warp.width);
    println!("height {}", warp.height);
    println!("b 0");
    println!("h 1");
    println!("l 0");
    println!("w 1");
    println!("active 0");

    Ok(())
}
