//! Omni Render Library
//!
//! Renders a scene into a cubemap (optionally per eye, with omni-stereo
//! vertex displacement) and composites it into multiple projector regions
//! through per-projector warp maps loaded from a calibration file.

pub mod app;
pub mod calibration;
pub mod capture;
pub mod cubemap;
pub mod gpu_context;
pub mod output;
pub mod scene;
pub mod settings;
pub mod shaders;
pub mod telemetry;

pub use app::OmniApp;
pub use calibration::{CalibrationConfig, ConfigError, ProjectorRecord, WarpLoadOutcome, WarpMap, WarpMapError};
pub use capture::{CaptureError, FrameCapture};
pub use cubemap::{CaptureConfig, CubeFace, CubeRender, CubeSampler, DisplacementModel, SampleMode, StereoMode};
pub use gpu_context::{GpuContext, GpuError, WindowGpuContext};
pub use output::{PerProjectionRender, PixelRect, ViewportFraction};
pub use settings::{RenderSettings, SettingsError};
