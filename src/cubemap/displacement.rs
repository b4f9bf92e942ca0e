//! Stereo vertex displacement for dome and flat displays
//!
//! CPU versions of the displacement applied in the capture shader. Given a
//! view-space vertex, they shift it so that a camera at the origin sees it
//! as an eye offset horizontally by `eye_sep` would, projected onto a sphere
//! of radius `radius` (or a flat screen at `focal_length`).
//!
//! The shader in `shaders/cube_capture.wgsl` mirrors these functions; keep
//! them in sync.

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Default sphere radius, large enough to behave as an infinitely distant surface
pub const DEFAULT_SPHERE_RADIUS: f32 = 1e10;

/// Which displacement formula the capture shader uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DisplacementModel {
    /// Closed-form omni-stereo displacement perpendicular to the view direction
    #[default]
    ClosedForm,
    /// Intersect the eye-to-vertex ray with the sphere (quadratic root)
    SphereIntersection,
    /// Off-axis stereo for a flat screen at the focal length
    FlatScreen,
}

impl DisplacementModel {
    /// Value of the `model` uniform in the capture shader
    pub fn shader_index(self) -> u32 {
        match self {
            DisplacementModel::ClosedForm => 0,
            DisplacementModel::SphereIntersection => 1,
            DisplacementModel::FlatScreen => 2,
        }
    }

    /// Next model in cycling order
    pub fn next(self) -> Self {
        match self {
            DisplacementModel::ClosedForm => DisplacementModel::SphereIntersection,
            DisplacementModel::SphereIntersection => DisplacementModel::FlatScreen,
            DisplacementModel::FlatScreen => DisplacementModel::ClosedForm,
        }
    }
}

/// Mono renders one eye, stereo renders left and right
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StereoMode {
    #[default]
    Mono,
    Stereo,
}

impl StereoMode {
    pub fn num_eyes(self) -> usize {
        match self {
            StereoMode::Mono => 1,
            StereoMode::Stereo => 2,
        }
    }

    /// Eye for a capture pass index
    pub fn eye(self, index: usize) -> Eye {
        match (self, index) {
            (StereoMode::Mono, _) => Eye::Mono,
            (StereoMode::Stereo, 0) => Eye::Left,
            (StereoMode::Stereo, _) => Eye::Right,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eye {
    Mono,
    Left,
    Right,
}

impl Eye {
    /// Signed eye offset for a full interocular distance
    ///
    /// Zero for mono, negative for the left eye, positive for the right.
    pub fn separation(self, eye_sep: f32) -> f32 {
        match self {
            Eye::Mono => 0.0,
            Eye::Left => -0.5 * eye_sep,
            Eye::Right => 0.5 * eye_sep,
        }
    }
}

/// Displacement parameters for one eye
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OmniStereo {
    /// Signed eye offset (0 for mono)
    pub eye_sep: f32,
    /// Sphere radius in scene units
    pub radius: f32,
    /// Focal length, used by [`DisplacementModel::FlatScreen`]
    pub focal_length: f32,
    pub model: DisplacementModel,
}

impl Default for OmniStereo {
    fn default() -> Self {
        Self {
            eye_sep: 0.0,
            radius: DEFAULT_SPHERE_RADIUS,
            focal_length: 10.0,
            model: DisplacementModel::ClosedForm,
        }
    }
}

impl OmniStereo {
    pub fn displace(&self, v: Vec3) -> Vec3 {
        match self.model {
            DisplacementModel::ClosedForm => displace_closed_form(v, self.eye_sep, self.radius),
            DisplacementModel::SphereIntersection => {
                displace_sphere_intersection(v, self.eye_sep, self.radius)
            }
            DisplacementModel::FlatScreen => displace_flat(v, self.eye_sep, self.focal_length),
        }
    }
}

/// Magnitude of the closed-form omni-stereo displacement
///
/// `l` is the length of the vertex's horizontal (xz) projection. This is
/// `e (r² - sqrt(l²r² + e²(r² - l²))) / (r² - e²)` rewritten as
/// `e (r² - l²) / (r² + sqrt(l²r² + e²(r² - l²)))`, which is equal for
/// `r != e`, has no pole at `r = e` and does not cancel catastrophically
/// for huge radii.
pub fn omni_displacement(l: f32, e: f32, r: f32) -> f32 {
    let r2 = r * r;
    let l2 = l * l;
    let e2 = e * e;
    let root = (l2 * r2 + e2 * (r2 - l2)).max(0.0).sqrt();
    e * (r2 - l2) / (r2 + root)
}

/// Closed-form omni-stereo displacement of a view-space vertex
pub fn displace_closed_form(v: Vec3, e: f32, r: f32) -> Vec3 {
    let l = Vec3::new(v.x, 0.0, v.z).length();
    let vn = v.normalize_or_zero();
    let d = omni_displacement(l, e, r);
    v + Vec3::new(d * vn.z, 0.0, -d * vn.x)
}

/// Sphere-intersection omni-stereo displacement
///
/// The eye sits at `e` along the vertex direction rotated 90° in the
/// horizontal plane. With `t` the distance from the eye to the sphere along
/// the eye-to-vertex ray, the law of cosines gives
/// `r² = t² + e² + 2te·cosθ`; the positive root keeps the hit in front of
/// the eye. The result points at the hit and keeps the eye-to-vertex
/// distance.
pub fn displace_sphere_intersection(v: Vec3, e: f32, r: f32) -> Vec3 {
    let eye = Vec3::new(-v.z, 0.0, v.x).normalize_or_zero() * e;
    let to_vertex = v - eye;
    let distance = to_vertex.length();
    if distance <= 1e-6 {
        return Vec3::ZERO;
    }
    let dir = to_vertex / distance;

    // t² + 2bt + c = 0
    let b = -eye.dot(dir);
    let c = e * e - r * r;
    let t = -b + (b * b - c).max(0.0).sqrt();

    (eye + t * dir).normalize_or_zero() * distance
}

/// Off-axis stereo displacement for a flat screen at `focal_length`
///
/// Vertices in the eye's plane (`z ≈ 0`) are returned unchanged.
pub fn displace_flat(v: Vec3, e: f32, focal_length: f32) -> Vec3 {
    if v.z.abs() <= 1e-6 {
        return v;
    }
    let eye = Vec3::new(e, 0.0, 0.0);
    let distance = (v - eye).length();
    let t = focal_length * (v.x - eye.x) / -v.z;
    let p = Vec3::new(e + t, focal_length * v.y / -v.z, v.z.signum() * focal_length);
    p.normalize_or_zero() * distance
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERTICES: [Vec3; 6] = [
        Vec3::new(10.0, 20.0, -30.0),
        Vec3::new(3.0, 0.0, -4.0),
        Vec3::new(-1.0, 0.5, 2.0),
        Vec3::new(0.0, 5.0, 0.0),
        Vec3::new(50.0, 10.0, -20.0),
        Vec3::new(0.0, 3.0, -20.0),
    ];

    fn literal_formula(l: f64, e: f64, r: f64) -> f64 {
        let r2 = r * r;
        e * (r2 - (l * l * r2 + e * e * (r2 - l * l)).sqrt()) / (r2 - e * e)
    }

    #[test]
    fn test_model_cycle_visits_all() {
        let mut model = DisplacementModel::default();
        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(model.shader_index());
            model = model.next();
        }
        assert_eq!(model, DisplacementModel::ClosedForm);
        assert_eq!(seen, vec![0, 1, 2]);
    }

    #[test]
    fn test_zero_eye_sep_is_identity() {
        for radius in [1.0, 30.0, 1e4, DEFAULT_SPHERE_RADIUS] {
            for v in VERTICES {
                assert_eq!(displace_closed_form(v, 0.0, radius), v);
                assert!(displace_sphere_intersection(v, 0.0, radius).abs_diff_eq(v, 1e-4 * v.length()));
            }
        }
    }

    #[test]
    fn test_flat_zero_eye_sep_is_identity_in_front() {
        for v in VERTICES.iter().filter(|v| v.z < 0.0) {
            assert!(displace_flat(*v, 0.0, 10.0).abs_diff_eq(*v, 1e-4 * v.length()));
        }
        let on_plane = Vec3::new(0.0, 5.0, 0.0);
        assert_eq!(displace_flat(on_plane, 1.0, 10.0), on_plane);
    }

    #[test]
    fn test_rewritten_formula_matches_literal() {
        for (l, e, r) in [(36.06, 1.0, 30.0), (5.0, 0.1, 100.0), (53.85, 1.0, 20.0), (0.0, 0.5, 10.0)] {
            let ours = omni_displacement(l as f32, e as f32, r as f32) as f64;
            let literal = literal_formula(l, e, r);
            assert!((ours - literal).abs() < 1e-4, "l={} e={} r={}: {} vs {}", l, e, r, ours, literal);
        }
    }

    #[test]
    fn test_radius_term_vanishes_for_large_radius() {
        let e = 0.1;
        let l = 5.0;
        let mut previous = f32::INFINITY;
        for r in [10.0, 100.0, 1e3, 1e4, 1e6] {
            let deviation = (omni_displacement(l, e, r) - e).abs();
            assert!(deviation < previous, "deviation should shrink with radius");
            previous = deviation;
        }

        let far = omni_displacement(l, e, DEFAULT_SPHERE_RADIUS);
        assert!(far.is_finite());
        assert!((far - e).abs() < 1e-6);
    }

    #[test]
    fn test_huge_radius_stays_finite() {
        for v in VERTICES {
            let closed = displace_closed_form(v, 0.065, DEFAULT_SPHERE_RADIUS);
            let sphere = displace_sphere_intersection(v, 0.065, DEFAULT_SPHERE_RADIUS);
            assert!(closed.is_finite());
            assert!(sphere.is_finite());
        }
    }

    #[test]
    fn test_displacement_is_horizontal_and_perpendicular() {
        let v = Vec3::new(3.0, 1.0, -4.0);
        let displaced = displace_closed_form(v, 0.2, 30.0);
        let offset = displaced - v;
        assert_eq!(offset.y, 0.0);
        assert!(offset.dot(Vec3::new(v.x, 0.0, v.z)).abs() < 1e-5);
    }

    #[test]
    fn test_models_agree_on_horizon_for_large_radius() {
        let v = Vec3::new(3.0, 0.0, -4.0);
        let closed = displace_closed_form(v, 0.1, 1e4);
        let sphere = displace_sphere_intersection(v, 0.1, 1e4);
        assert!(closed.abs_diff_eq(sphere, 1e-3), "{:?} vs {:?}", closed, sphere);
    }

    #[test]
    fn test_sphere_intersection_at_eye() {
        let v = Vec3::new(0.0, 0.0, 0.0);
        assert_eq!(displace_sphere_intersection(v, 0.1, 10.0), Vec3::ZERO);
    }

    #[test]
    fn test_eye_separation_signs() {
        assert_eq!(StereoMode::Mono.num_eyes(), 1);
        assert_eq!(StereoMode::Stereo.num_eyes(), 2);
        assert_eq!(StereoMode::Mono.eye(0).separation(0.064), 0.0);
        assert_eq!(StereoMode::Stereo.eye(0).separation(0.064), -0.032);
        assert_eq!(StereoMode::Stereo.eye(1).separation(0.064), 0.032);
    }

    #[test]
    fn test_omni_stereo_dispatch() {
        let v = Vec3::new(1.0, 2.0, -3.0);
        let params = OmniStereo {
            eye_sep: 0.1,
            radius: 20.0,
            ..Default::default()
        };
        assert_eq!(params.displace(v), displace_closed_form(v, 0.1, 20.0));

        let sphere = OmniStereo {
            model: DisplacementModel::SphereIntersection,
            ..params
        };
        assert_eq!(sphere.displace(v), displace_sphere_intersection(v, 0.1, 20.0));
        assert_eq!(DisplacementModel::FlatScreen.shader_index(), 2);
    }
}
