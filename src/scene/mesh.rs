//! Mesh generation for captured scenes
//!
//! Vertices carry position, colour, texcoord and normal, matching the
//! capture shader's input locations 0..3.

use bytemuck::{Pod, Zeroable};
use std::f32::consts::{PI, TAU};

/// Vertex for meshes drawn into the cubemap
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct MeshVertex {
    /// Position in object space
    pub position: [f32; 3],
    /// Vertex colour (RGBA)
    pub color: [f32; 4],
    /// Texture coordinates
    pub texcoord: [f32; 2],
    /// Normal vector (for lighting)
    pub normal: [f32; 3],
}

impl MeshVertex {
    /// Size of vertex in bytes
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;

    /// Vertex buffer layout for wgpu
    pub fn buffer_layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: Self::SIZE,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                // position
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                // color
                wgpu::VertexAttribute {
                    offset: 12,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x4,
                },
                // texcoord
                wgpu::VertexAttribute {
                    offset: 28,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x2,
                },
                // normal
                wgpu::VertexAttribute {
                    offset: 36,
                    shader_location: 3,
                    format: wgpu::VertexFormat::Float32x3,
                },
            ],
        }
    }
}

/// Generated mesh data
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
}

impl Mesh {
    /// Unit icosahedron (circumradius 1), white, flat-shaded
    ///
    /// Each face gets its own three vertices so normals are per face.
    pub fn icosahedron() -> Self {
        let phi = (1.0 + 5.0f32.sqrt()) / 2.0;
        let scale = 1.0 / (1.0 + phi * phi).sqrt();
        let corners: [[f32; 3]; 12] = [
            [-1.0, phi, 0.0],
            [1.0, phi, 0.0],
            [-1.0, -phi, 0.0],
            [1.0, -phi, 0.0],
            [0.0, -1.0, phi],
            [0.0, 1.0, phi],
            [0.0, -1.0, -phi],
            [0.0, 1.0, -phi],
            [phi, 0.0, -1.0],
            [phi, 0.0, 1.0],
            [-phi, 0.0, -1.0],
            [-phi, 0.0, 1.0],
        ];
        #[rustfmt::skip]
        const FACES: [[usize; 3]; 20] = [
            [0, 11, 5], [0, 5, 1], [0, 1, 7], [0, 7, 10], [0, 10, 11],
            [1, 5, 9], [5, 11, 4], [11, 10, 2], [10, 7, 6], [7, 1, 8],
            [3, 9, 4], [3, 4, 2], [3, 2, 6], [3, 6, 8], [3, 8, 9],
            [4, 9, 5], [2, 4, 11], [6, 2, 10], [8, 6, 7], [9, 8, 1],
        ];

        let mut vertices = Vec::with_capacity(60);
        let mut indices = Vec::with_capacity(60);

        for face in FACES {
            let [a, b, c] = face.map(|i| glam::Vec3::from(corners[i]) * scale);
            let normal = (b - a).cross(c - a).normalize_or_zero();
            for p in [a, b, c] {
                indices.push(vertices.len() as u32);
                vertices.push(MeshVertex {
                    position: p.into(),
                    color: [1.0, 1.0, 1.0, 1.0],
                    texcoord: spherical_uv(p),
                    normal: normal.into(),
                });
            }
        }

        Self { vertices, indices }
    }

    /// Blend vertex colours from `start` to `end` across vertex order
    pub fn color_ramp(&mut self, start: [f32; 4], end: [f32; 4]) {
        let count = self.vertices.len().max(1) as f32;
        for (i, vertex) in self.vertices.iter_mut().enumerate() {
            let t = i as f32 / count;
            for c in 0..4 {
                vertex.color[c] = start[c] + (end[c] - start[c]) * t;
            }
        }
    }

    /// Get vertex count
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Get index count
    pub fn index_count(&self) -> usize {
        self.indices.len()
    }
}

fn spherical_uv(p: glam::Vec3) -> [f32; 2] {
    let n = p.normalize_or_zero();
    let u = 0.5 + n.z.atan2(n.x) / TAU;
    let v = 0.5 - n.y.asin() / PI;
    [u, v]
}

/// GPU buffers for one mesh
pub struct GpuMesh {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
}

impl GpuMesh {
    pub fn upload(device: &wgpu::Device, mesh: &Mesh, label: &str) -> Self {
        use wgpu::util::DeviceExt;

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{} Vertex Buffer", label)),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{} Index Buffer", label)),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        Self {
            vertex_buffer,
            index_buffer,
            index_count: mesh.indices.len() as u32,
        }
    }

    /// Bind buffers on `pass`; follow with [`GpuMesh::draw`]
    pub fn bind(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
    }

    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.draw_indexed(0..self.index_count, 0, 0..1);
    }
}
