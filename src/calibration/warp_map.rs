//! Warp maps: per-pixel cubemap sampling directions for one projector
//!
//! On disk a warp map is a headerless array of little-endian `f32`,
//! `width * height * 4` values (RGBA per pixel, rows bottom to top). The
//! RGB channels hold the direction to sample the cubemap along; alpha holds
//! the blend weight.

use std::f32::consts::{PI, TAU};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use super::ProjectorRecord;

/// Largest warp map edge accepted from calibration data
///
/// Matches wgpu's default `max_texture_dimension_2d`; the compositor also
/// checks the device's actual limit before uploading.
pub const MAX_WARP_DIMENSION: u32 = 8192;

/// Float count of a `width` x `height` RGBA map, `None` on overflow
pub fn warp_float_count(width: u32, height: u32) -> Option<usize> {
    (width as usize).checked_mul(height as usize)?.checked_mul(4)
}

/// Errors reading or writing warp data
#[derive(Debug, thiserror::Error)]
pub enum WarpMapError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("warp map is {width}x{height} but holds {len} floats")]
    SizeMismatch { width: u32, height: u32, len: usize },
    #[error("warp map of {width}x{height} exceeds the {max}px limit")]
    TooLarge { width: u32, height: u32, max: u32 },
    #[error("couldn't allocate {floats} floats for {path}")]
    Alloc { path: PathBuf, floats: usize },
}

/// Result of loading one projector's warp data
#[derive(Debug)]
pub enum WarpLoadOutcome {
    /// File held exactly the expected number of floats
    Loaded,
    /// File was short; `read` floats were loaded and the rest zero-filled
    Truncated { read: usize, expected: usize },
    /// File held more floats than expected; the extra tail was ignored
    Oversized { expected: usize, available: usize },
    /// Projector has zero width or height, nothing to load
    NoDimensions,
    /// Projector dimensions exceed [`MAX_WARP_DIMENSION`], nothing loaded
    TooLarge { width: u32, height: u32 },
    /// File could not be opened or read
    Failed(WarpMapError),
}

impl WarpLoadOutcome {
    /// Whether the projector ended up with usable data
    pub fn has_data(&self) -> bool {
        matches!(
            self,
            WarpLoadOutcome::Loaded | WarpLoadOutcome::Truncated { .. } | WarpLoadOutcome::Oversized { .. }
        )
    }
}

/// Read `expected` floats from a raw warp file
///
/// The returned vector always has exactly `expected` elements: a short file
/// is zero-filled past its end and a trailing partial float is ignored.
pub fn read_warp_data(path: &Path, expected: usize) -> Result<(Vec<f32>, WarpLoadOutcome), WarpMapError> {
    let file = File::open(path).map_err(|source| WarpMapError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let file_len = file
        .metadata()
        .map_err(|source| WarpMapError::Read {
            path: path.to_path_buf(),
            source,
        })?
        .len();
    let available = (file_len / 4) as usize;

    let mut bytes = Vec::with_capacity(expected.min(available) * 4);
    file.take((expected as u64).saturating_mul(4))
        .read_to_end(&mut bytes)
        .map_err(|source| WarpMapError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    let mut data: Vec<f32> = Vec::new();
    data.try_reserve_exact(expected).map_err(|_| WarpMapError::Alloc {
        path: path.to_path_buf(),
        floats: expected,
    })?;
    data.resize(expected, 0.0);
    let read = bytes.len() / 4;
    for (dst, chunk) in data.iter_mut().zip(bytes.chunks_exact(4)) {
        *dst = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }

    let outcome = if read < expected {
        WarpLoadOutcome::Truncated { read, expected }
    } else if available > expected {
        WarpLoadOutcome::Oversized { expected, available }
    } else {
        WarpLoadOutcome::Loaded
    };

    Ok((data, outcome))
}

/// RGBA float image of sampling directions
#[derive(Debug, Clone, PartialEq)]
pub struct WarpMap {
    pub width: u32,
    pub height: u32,
    /// `width * height * 4` floats, row-major
    pub data: Vec<f32>,
}

impl WarpMap {
    pub fn new(width: u32, height: u32, data: Vec<f32>) -> Result<Self, WarpMapError> {
        let expected = warp_float_count(width, height).unwrap_or(0);
        if data.len() != expected || expected == 0 {
            return Err(WarpMapError::SizeMismatch {
                width,
                height,
                len: data.len(),
            });
        }
        Ok(Self { width, height, data })
    }

    /// Warp map of a loaded projector record, `None` if it has no data
    pub fn from_record(record: &ProjectorRecord) -> Option<Self> {
        if !record.has_data() {
            return None;
        }
        Self::new(record.width, record.height, record.data.clone()).ok()
    }

    /// Load a raw warp file of known dimensions
    pub fn load(path: &Path, width: u32, height: u32) -> Result<(Self, WarpLoadOutcome), WarpMapError> {
        if width > MAX_WARP_DIMENSION || height > MAX_WARP_DIMENSION {
            return Err(WarpMapError::TooLarge {
                width,
                height,
                max: MAX_WARP_DIMENSION,
            });
        }
        let expected = warp_float_count(width, height).unwrap_or(0);
        let (data, outcome) = read_warp_data(path, expected)?;
        Ok((Self::new(width, height, data)?, outcome))
    }

    /// Equirectangular direction map
    ///
    /// Column `i` maps to longitude `i / width * 2π`, row `j` to latitude
    /// `(j / height - 0.5) * π`. Alpha is zero.
    pub fn equirectangular(width: u32, height: u32) -> Self {
        let width = width.clamp(1, MAX_WARP_DIMENSION);
        let height = height.clamp(1, MAX_WARP_DIMENSION);
        let mut data = vec![0.0f32; width as usize * height as usize * 4];

        for j in 0..height {
            let latitude = (j as f32 / height as f32 - 0.5) * PI;
            for i in 0..width {
                let longitude = i as f32 / width as f32 * TAU;
                let idx = (i + width * j) as usize * 4;
                data[idx] = longitude.cos() * latitude.cos();
                data[idx + 1] = latitude.sin();
                data[idx + 2] = longitude.sin() * latitude.cos();
                data[idx + 3] = 0.0;
            }
        }

        Self { width, height, data }
    }

    /// RGBA value of one pixel
    pub fn texel(&self, x: u32, y: u32) -> Option<[f32; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (x + self.width * y) as usize * 4;
        Some([self.data[idx], self.data[idx + 1], self.data[idx + 2], self.data[idx + 3]])
    }

    /// Raw bytes for texture upload
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    /// Write the map in the raw float format
    pub fn write(&self, path: &Path) -> Result<(), WarpMapError> {
        let write_err = |source| WarpMapError::Write {
            path: path.to_path_buf(),
            source,
        };

        let mut bytes = Vec::with_capacity(self.data.len() * 4);
        for value in &self.data {
            bytes.extend_from_slice(&value.to_le_bytes());
        }

        let mut file = File::create(path).map_err(write_err)?;
        file.write_all(&bytes).map_err(write_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("omni_render_warp_tests");
        std::fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    #[test]
    fn test_exact_length_file() {
        let path = temp_path("exact.bin");
        let map = WarpMap::equirectangular(8, 4);
        map.write(&path).unwrap();

        let (loaded, outcome) = WarpMap::load(&path, 8, 4).unwrap();
        assert!(matches!(outcome, WarpLoadOutcome::Loaded));
        assert_eq!(loaded.data.len(), 8 * 4 * 4);
        assert_eq!(loaded, map);
    }

    #[test]
    fn test_short_file_zero_fills() {
        let path = temp_path("short.bin");
        // 5 floats plus two stray bytes
        let mut bytes = Vec::new();
        for v in [1.0f32, 2.0, 3.0, 4.0, 5.0] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes.extend_from_slice(&[0xAB, 0xCD]);
        std::fs::write(&path, bytes).unwrap();

        let (data, outcome) = read_warp_data(&path, 16).unwrap();
        assert_eq!(data.len(), 16);
        assert_eq!(&data[..5], &[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert!(data[5..].iter().all(|v| *v == 0.0));
        match &outcome {
            WarpLoadOutcome::Truncated { read, expected } => {
                assert_eq!(*read, 5);
                assert_eq!(*expected, 16);
            }
            other => panic!("expected truncation, got {:?}", other),
        }
        assert!(outcome.has_data());
    }

    #[test]
    fn test_empty_file() {
        let path = temp_path("empty.bin");
        std::fs::write(&path, b"").unwrap();
        let (data, outcome) = read_warp_data(&path, 4).unwrap();
        assert_eq!(data, vec![0.0; 4]);
        assert!(matches!(outcome, WarpLoadOutcome::Truncated { read: 0, expected: 4 }));
    }

    #[test]
    fn test_oversized_file_reads_prefix() {
        let path = temp_path("long.bin");
        let mut bytes = Vec::new();
        for i in 0..12 {
            bytes.extend_from_slice(&(i as f32).to_le_bytes());
        }
        std::fs::write(&path, bytes).unwrap();

        let (data, outcome) = read_warp_data(&path, 8).unwrap();
        assert_eq!(data, (0..8).map(|i| i as f32).collect::<Vec<_>>());
        assert!(matches!(outcome, WarpLoadOutcome::Oversized { expected: 8, available: 12 }));
    }

    #[test]
    fn test_float_count_overflow() {
        assert_eq!(warp_float_count(4, 2), Some(32));
        assert_eq!(warp_float_count(0, 9), Some(0));
        assert_eq!(warp_float_count(u32::MAX, u32::MAX), None);
    }

    #[test]
    fn test_load_rejects_huge_dimensions() {
        let path = temp_path("huge.bin");
        std::fs::write(&path, [0u8; 16]).unwrap();
        assert!(matches!(
            WarpMap::load(&path, 200_000, 200_000),
            Err(WarpMapError::TooLarge { width: 200_000, .. })
        ));
        assert!(matches!(
            WarpMap::load(&path, u32::MAX, u32::MAX),
            Err(WarpMapError::TooLarge { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let path = temp_path("missing.bin");
        let _ = std::fs::remove_file(&path);
        assert!(matches!(read_warp_data(&path, 4), Err(WarpMapError::Open { .. })));
    }

    #[test]
    fn test_equirect_directions_are_unit() {
        let map = WarpMap::equirectangular(16, 8);
        for y in 0..8 {
            for x in 0..16 {
                let [r, g, b, a] = map.texel(x, y).unwrap();
                let len = (r * r + g * g + b * b).sqrt();
                assert!((len - 1.0).abs() < 1e-5);
                assert_eq!(a, 0.0);
            }
        }
        // Bottom row looks straight down, column 0 along +X
        let [r, g, _, _] = map.texel(0, 0).unwrap();
        assert!((g + 1.0).abs() < 1e-5);
        assert!(r.abs() < 1e-5);
        let [r, g, b, _] = map.texel(0, 4).unwrap();
        assert!((r - 1.0).abs() < 1e-5 && g.abs() < 1e-5 && b.abs() < 1e-5);
    }

    #[test]
    fn test_from_record_requires_data() {
        let mut record = ProjectorRecord {
            width: 2,
            height: 1,
            ..Default::default()
        };
        assert!(WarpMap::from_record(&record).is_none());
        record.data = vec![0.5; 8];
        let map = WarpMap::from_record(&record).unwrap();
        assert_eq!(map.texel(1, 0), Some([0.5; 4]));
        assert_eq!(map.texel(2, 0), None);
    }

    #[test]
    fn test_new_rejects_mismatched_length() {
        assert!(matches!(
            WarpMap::new(2, 2, vec![0.0; 3]),
            Err(WarpMapError::SizeMismatch { .. })
        ));
    }
}
