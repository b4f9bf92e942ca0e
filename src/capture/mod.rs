//! Frame capture to PNG.
//!
//! Textures are copied into staging buffers on the GPU, mapped
//! asynchronously, and the pixels are handed to [`SaveWorker`] for encoding.
//! Nothing in this path blocks the render loop.

mod worker;

pub use worker::{encode_png, SaveJob, SaveWorker};

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use thiserror::Error;

/// Errors raised while capturing or saving a frame
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("cannot capture texture format {0:?}")]
    UnsupportedFormat(wgpu::TextureFormat),

    #[error("GPU readback failed for {}", path.display())]
    Readback { path: PathBuf },

    #[error("pixel data does not match {width}x{height}")]
    BadDimensions { width: u32, height: u32 },

    #[error("failed to prepare {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to spawn capture worker: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("capture worker is not running")]
    WorkerGone,

    #[error("save queue is full, dropped {}", path.display())]
    QueueFull { path: PathBuf },
}

const MAP_WAITING: u8 = 0;
const MAP_DONE: u8 = 1;
const MAP_FAILED: u8 = 2;

/// State of a staging buffer in the capture pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadbackState {
    /// Copy recorded, waiting for the encoder to be submitted.
    Pending,
    /// map_async has been called, waiting for callback.
    Mapping,
}

/// One texture copy in flight.
struct Readback {
    buffer: wgpu::Buffer,
    state: ReadbackState,
    /// Set by the async map callback.
    map_status: Arc<AtomicU8>,
    width: u32,
    height: u32,
    /// Bytes per row (with padding for wgpu alignment).
    padded_bytes_per_row: u32,
    /// Source is BGRA and needs swizzling to RGBA.
    swap_bgra: bool,
    path: PathBuf,
}

/// Copies rendered textures to disk as PNG files.
pub struct FrameCapture {
    worker: SaveWorker,
    readbacks: Vec<Readback>,
}

impl FrameCapture {
    pub fn new() -> Result<Self, CaptureError> {
        Ok(Self {
            worker: SaveWorker::new()?,
            readbacks: Vec::new(),
        })
    }

    /// Record a copy of one layer of `texture` into a staging buffer.
    ///
    /// Call before `queue.submit()`; the texture needs `COPY_SRC` usage and
    /// an 8-bit RGBA or BGRA format.
    pub fn copy_texture(
        &mut self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        texture: &wgpu::Texture,
        layer: u32,
        path: impl Into<PathBuf>,
    ) -> Result<(), CaptureError> {
        let format = texture.format();
        let swap_bgra = match format {
            wgpu::TextureFormat::Rgba8Unorm | wgpu::TextureFormat::Rgba8UnormSrgb => false,
            wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Bgra8UnormSrgb => true,
            other => return Err(CaptureError::UnsupportedFormat(other)),
        };

        let width = texture.width();
        let height = texture.height();
        let padded = padded_bytes_per_row(width);

        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Frame Capture Staging Buffer"),
            size: padded as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d { x: 0, y: 0, z: layer },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );

        let path = path.into();
        tracing::debug!("Capture queued: {}x{} layer {} -> {}", width, height, layer, path.display());

        self.readbacks.push(Readback {
            buffer,
            state: ReadbackState::Pending,
            map_status: Arc::new(AtomicU8::new(MAP_WAITING)),
            width,
            height,
            padded_bytes_per_row: padded,
            swap_bgra,
            path,
        });
        Ok(())
    }

    /// Advance readbacks and collect finished saves.
    ///
    /// Call once per frame after `queue.submit()`. Never blocks.
    pub fn process(&mut self, device: &wgpu::Device) -> Vec<Result<PathBuf, CaptureError>> {
        let mut results = Vec::new();

        if !self.readbacks.is_empty() {
            device.poll(wgpu::Maintain::Poll);
        }

        let mut i = 0;
        while i < self.readbacks.len() {
            let readback = &mut self.readbacks[i];
            match readback.state {
                ReadbackState::Pending => {
                    let status = readback.map_status.clone();
                    readback.buffer.slice(..).map_async(wgpu::MapMode::Read, move |result| {
                        let value = if result.is_ok() { MAP_DONE } else { MAP_FAILED };
                        status.store(value, Ordering::Release);
                    });
                    readback.state = ReadbackState::Mapping;
                    i += 1;
                }
                ReadbackState::Mapping => match readback.map_status.load(Ordering::Acquire) {
                    MAP_WAITING => i += 1,
                    MAP_DONE => {
                        let readback = self.readbacks.swap_remove(i);
                        if let Err(e) = self.finish(readback) {
                            results.push(Err(e));
                        }
                    }
                    _ => {
                        let readback = self.readbacks.swap_remove(i);
                        results.push(Err(CaptureError::Readback { path: readback.path }));
                    }
                },
            }
        }

        results.extend(self.worker.poll());
        results
    }

    /// Unpack a mapped buffer and hand it to the worker.
    fn finish(&mut self, readback: Readback) -> Result<(), CaptureError> {
        let pixels = {
            let data = readback.buffer.slice(..).get_mapped_range();
            unpack_rows(
                &data,
                readback.width,
                readback.height,
                readback.padded_bytes_per_row,
                readback.swap_bgra,
            )
        };
        readback.buffer.unmap();

        self.worker.submit(SaveJob {
            pixels,
            width: readback.width,
            height: readback.height,
            path: readback.path,
        })
    }

    /// Captures not yet reported back.
    pub fn in_flight(&self) -> usize {
        self.readbacks.len() + self.worker.in_flight()
    }
}

/// Row stride of a staging buffer for an RGBA8 texture of `width` pixels.
pub fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

/// Strip row padding and convert BGRA to RGBA when needed.
pub fn unpack_rows(data: &[u8], width: u32, height: u32, padded_bytes_per_row: u32, swap_bgra: bool) -> Vec<u8> {
    let row_bytes = (width * 4) as usize;
    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * padded_bytes_per_row as usize;
        pixels.extend_from_slice(&data[start..start + row_bytes]);
    }
    if swap_bgra {
        for px in pixels.chunks_exact_mut(4) {
            px.swap(0, 2);
        }
    }
    pixels
}

/// Numbered capture path inside `dir`, e.g. `frame_00012.png`.
pub fn frame_path(dir: &Path, prefix: &str, index: u32) -> PathBuf {
    dir.join(format!("{}_{:05}.png", prefix, index))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padded_bytes_per_row() {
        assert_eq!(padded_bytes_per_row(64), 256);
        assert_eq!(padded_bytes_per_row(65), 512);
        assert_eq!(padded_bytes_per_row(1), 256);
        assert_eq!(padded_bytes_per_row(1024), 4096);
    }

    #[test]
    fn test_unpack_strips_padding() {
        let padded = 256u32;
        let mut data = vec![0xAAu8; padded as usize * 2];
        data[0..8].copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        data[256..264].copy_from_slice(&[9, 10, 11, 12, 13, 14, 15, 16]);

        let pixels = unpack_rows(&data, 2, 2, padded, false);
        assert_eq!(pixels, (1..=16).collect::<Vec<u8>>());
    }

    #[test]
    fn test_unpack_swaps_bgra() {
        let data = [10u8, 20, 30, 40];
        assert_eq!(unpack_rows(&data, 1, 1, 4, true), vec![30, 20, 10, 40]);
    }

    #[test]
    fn test_frame_path() {
        let path = frame_path(Path::new("/tmp/shots"), "frame", 12);
        assert_eq!(path, PathBuf::from("/tmp/shots/frame_00012.png"));
    }

    #[test]
    fn test_error_messages() {
        let err = CaptureError::BadDimensions { width: 3, height: 2 };
        assert_eq!(err.to_string(), "pixel data does not match 3x2");
        let err = CaptureError::Readback {
            path: PathBuf::from("out.png"),
        };
        assert_eq!(err.to_string(), "GPU readback failed for out.png");
    }
}
