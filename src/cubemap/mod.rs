//! Cubemap capture and sampling
//!
//! - [`faces`]: the six face orientation matrices
//! - [`displacement`]: omni-stereo and flat-stereo vertex displacement
//! - [`capture`]: `CubeRender`, which renders a scene into all six faces
//! - [`sampler`]: `CubeSampler`, which reads the cubemap back out through a
//!   warp texture

pub mod capture;
pub mod displacement;
pub mod faces;
pub mod sampler;

pub use capture::{CaptureConfig, CaptureUniforms, CubeCapture, CubeRender, Pose, CUBE_FORMAT, DEPTH_FORMAT};
pub use displacement::{
    displace_closed_form, displace_flat, displace_sphere_intersection, omni_displacement, DisplacementModel, Eye,
    OmniStereo, StereoMode, DEFAULT_SPHERE_RADIUS,
};
pub use faces::{cube_face_matrix, CubeFace};
pub use sampler::{CubeSampler, SampleMode, SampleParams};
