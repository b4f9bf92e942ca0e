//! Cube face orientation table
//!
//! Each face matrix rotates a view-space vertex so that the face's world
//! axis lands on the capture camera's forward axis (-Z). The entries follow
//! the GL cube map face order and orientation convention and must stay
//! bit-exact.

use glam::{Mat4, Vec3};

/// One face of a cube map, in texture layer order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CubeFace {
    PositiveX = 0,
    NegativeX = 1,
    PositiveY = 2,
    NegativeY = 3,
    PositiveZ = 4,
    NegativeZ = 5,
}

/// Face matrices in row-major order, indexed by face
#[rustfmt::skip]
const FACE_ROWS: [[f32; 16]; 6] = [
    // +X: (x, y, z) -> (-z, -y, -x)
    [
         0.0,  0.0, -1.0, 0.0,
         0.0, -1.0,  0.0, 0.0,
        -1.0,  0.0,  0.0, 0.0,
         0.0,  0.0,  0.0, 1.0,
    ],
    // -X: (x, y, z) -> (z, -y, x)
    [
         0.0,  0.0,  1.0, 0.0,
         0.0, -1.0,  0.0, 0.0,
         1.0,  0.0,  0.0, 0.0,
         0.0,  0.0,  0.0, 1.0,
    ],
    // +Y: (x, y, z) -> (x, z, -y)
    [
         1.0,  0.0,  0.0, 0.0,
         0.0,  0.0,  1.0, 0.0,
         0.0, -1.0,  0.0, 0.0,
         0.0,  0.0,  0.0, 1.0,
    ],
    // -Y: (x, y, z) -> (x, -z, y)
    [
         1.0,  0.0,  0.0, 0.0,
         0.0,  0.0, -1.0, 0.0,
         0.0,  1.0,  0.0, 0.0,
         0.0,  0.0,  0.0, 1.0,
    ],
    // +Z: (x, y, z) -> (x, -y, -z)
    [
         1.0,  0.0,  0.0, 0.0,
         0.0, -1.0,  0.0, 0.0,
         0.0,  0.0, -1.0, 0.0,
         0.0,  0.0,  0.0, 1.0,
    ],
    // -Z: (x, y, z) -> (-x, -y, z)
    [
        -1.0,  0.0,  0.0, 0.0,
         0.0, -1.0,  0.0, 0.0,
         0.0,  0.0,  1.0, 0.0,
         0.0,  0.0,  0.0, 1.0,
    ],
];

impl CubeFace {
    /// All faces in layer order
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
        CubeFace::PositiveZ,
        CubeFace::NegativeZ,
    ];

    /// Face for a layer index, `None` outside 0..6
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Texture array layer of this face
    pub fn index(self) -> usize {
        self as usize
    }

    /// World axis this face looks along
    pub fn direction(self) -> Vec3 {
        match self {
            CubeFace::PositiveX => Vec3::X,
            CubeFace::NegativeX => Vec3::NEG_X,
            CubeFace::PositiveY => Vec3::Y,
            CubeFace::NegativeY => Vec3::NEG_Y,
            CubeFace::PositiveZ => Vec3::Z,
            CubeFace::NegativeZ => Vec3::NEG_Z,
        }
    }

    /// Rotation applied to view-space vertices when rendering this face
    pub fn matrix(self) -> Mat4 {
        // glam is column-major; the table is written row by row
        Mat4::from_cols_array(&FACE_ROWS[self.index()]).transpose()
    }

    pub fn label(self) -> &'static str {
        match self {
            CubeFace::PositiveX => "+X",
            CubeFace::NegativeX => "-X",
            CubeFace::PositiveY => "+Y",
            CubeFace::NegativeY => "-Y",
            CubeFace::PositiveZ => "+Z",
            CubeFace::NegativeZ => "-Z",
        }
    }
}

/// Face matrix by index, identity for indices outside 0..6
pub fn cube_face_matrix(index: usize) -> Mat4 {
    CubeFace::from_index(index)
        .map(CubeFace::matrix)
        .unwrap_or(Mat4::IDENTITY)
}
