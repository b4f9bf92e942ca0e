//! Scene content captured into the cubemap
//!
//! Besides mesh and object-uniform plumbing this holds the demo scene the
//! viewer draws: a lattice of spinning icosahedra around the viewer.

mod mesh;
mod objects;

pub use mesh::{GpuMesh, Mesh, MeshVertex};
pub use objects::{ObjectBuffer, ObjectUniforms};

use glam::{Mat4, Vec3};

use crate::cubemap::{CubeCapture, CubeFace, CubeRender};

/// Lattice extent: cells run from `-GRID_HALF_EXTENT` to `GRID_HALF_EXTENT`
pub const GRID_HALF_EXTENT: i32 = 5;

/// Distance between lattice cells
pub const GRID_SPACING: f32 = 2.0;

/// Scale applied to each icosahedron
pub const GRID_OBJECT_SCALE: f32 = 0.1;

/// Share of normal shading mixed into vertex colours
pub const GRID_LIGHT_MIX: f32 = 0.3;

/// Lattice cell centres, skipping the cell at the viewer
pub fn grid_positions() -> Vec<Vec3> {
    let range = -GRID_HALF_EXTENT..=GRID_HALF_EXTENT;
    let mut positions = Vec::new();
    for a in range.clone() {
        for b in range.clone() {
            for c in range.clone() {
                if a == 0 && b == 0 && c == 0 {
                    continue;
                }
                positions.push(Vec3::new(a as f32, b as f32, c as f32) * GRID_SPACING);
            }
        }
    }
    positions
}

/// Model matrix of a lattice object at `time` seconds
///
/// Objects wobble around z by `sin(2t)` degrees and around y by `sin(3t)`
/// degrees.
pub fn grid_model(position: Vec3, time: f32) -> Mat4 {
    Mat4::from_translation(position)
        * Mat4::from_rotation_z((2.0 * time).sin().to_radians())
        * Mat4::from_rotation_y((3.0 * time).sin().to_radians())
        * Mat4::from_scale(Vec3::splat(GRID_OBJECT_SCALE))
}

/// Clear colour for a cube face, distinct per face
pub fn face_clear_color(face: CubeFace) -> wgpu::Color {
    let i = face.index() as f64;
    wgpu::Color {
        r: i / 5.0,
        g: (5.0 - i) / 5.0,
        b: 1.0,
        a: 1.0,
    }
}

/// Icosahedron lattice drawn into every cube face
pub struct GridScene {
    mesh: GpuMesh,
    objects: ObjectBuffer,
    positions: Vec<Vec3>,
    uniforms: Vec<ObjectUniforms>,
}

impl GridScene {
    pub fn new(device: &wgpu::Device, cube: &CubeRender) -> Self {
        let mut mesh = Mesh::icosahedron();
        mesh.color_ramp([1.0, 0.0, 0.0, 1.0], [0.0, 1.0, 0.0, 1.0]);

        let positions = grid_positions();
        let objects = ObjectBuffer::new(device, cube.object_bind_group_layout(), positions.len());
        let uniforms = positions
            .iter()
            .map(|p| ObjectUniforms::new(grid_model(*p, 0.0)).with_light_mix(GRID_LIGHT_MIX))
            .collect();

        tracing::debug!("Grid scene: {} objects", positions.len());

        Self {
            mesh: GpuMesh::upload(device, &mesh, "Icosahedron"),
            objects,
            positions,
            uniforms,
        }
    }

    /// Animate objects to `time` seconds and upload
    pub fn update(&mut self, queue: &wgpu::Queue, time: f32) {
        for (uniform, position) in self.uniforms.iter_mut().zip(&self.positions) {
            uniform.model = grid_model(*position, time).to_cols_array_2d();
        }
        self.objects.write(queue, &self.uniforms);
    }

    /// Draw the lattice into every face of every eye
    pub fn capture(&self, capture: &mut CubeCapture<'_>) {
        for eye in 0..capture.num_eyes() {
            capture.set_eye(eye);
            for face in CubeFace::ALL {
                let mut pass = capture.set_face(face, face_clear_color(face));
                self.draw(&mut pass);
            }
        }
    }

    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        self.mesh.bind(pass);
        for index in 0..self.positions.len() {
            self.objects.bind(pass, index);
            self.mesh.draw(pass);
        }
    }

    pub fn object_count(&self) -> usize {
        self.positions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_skips_center() {
        let positions = grid_positions();
        assert_eq!(positions.len(), 11 * 11 * 11 - 1);
        assert!(!positions.contains(&Vec3::ZERO));
        assert!(positions.contains(&Vec3::new(-10.0, 10.0, 0.0)));
    }

    #[test]
    fn test_grid_model_at_rest() {
        let position = Vec3::new(2.0, 0.0, -4.0);
        let model = grid_model(position, 0.0);
        assert!(model.transform_point3(Vec3::ZERO).abs_diff_eq(position, 1e-6));
        let edge = model.transform_point3(Vec3::X) - position;
        assert!((edge.length() - GRID_OBJECT_SCALE).abs() < 1e-6);
    }

    #[test]
    fn test_face_clear_colors_distinct() {
        let colors: Vec<_> = CubeFace::ALL.iter().map(|f| face_clear_color(*f).r).collect();
        for pair in colors.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        assert_eq!(face_clear_color(CubeFace::PositiveX).g, 1.0);
    }
}
