//! Projector output
//!
//! Maps calibration viewports to pixel rectangles and composites the
//! cubemap into each projector's region.

mod compositor;
mod viewport;

pub use compositor::{
    eye_for_frame, CompositorOptions, PerProjectionRender, ProjectorChannel, WarpSource, FALLBACK_WARP_SIZE,
    WARP_FORMAT,
};
pub use viewport::{PixelRect, ViewportFraction};
