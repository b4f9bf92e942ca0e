//! Multi-projector compositing
//!
//! `PerProjectionRender` owns one warp texture per projector and draws the
//! captured cubemap into each projector's region of the framebuffer, in
//! calibration file order.

use crate::calibration::{CalibrationConfig, ProjectorRecord, WarpMap};
use crate::cubemap::{CubeRender, CubeSampler, SampleMode, SampleParams};
use crate::gpu_context::with_validation;

use super::viewport::ViewportFraction;

/// Size of the equirectangular map used when a projector has no warp data
pub const FALLBACK_WARP_SIZE: (u32, u32) = (2048, 1024);

/// Format of warp textures
pub const WARP_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;

/// Where a projector's sampling directions come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarpSource {
    /// Warp data loaded from calibration
    Calibration,
    /// Generated equirectangular directions
    Equirect,
}

/// Compositing options
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositorOptions {
    pub sample_mode: SampleMode,
    /// Multiply output by the warp alpha
    pub apply_blend: bool,
}

impl Default for CompositorOptions {
    fn default() -> Self {
        Self {
            sample_mode: SampleMode::Warp,
            apply_blend: false,
        }
    }
}

/// GPU state for one projector
pub struct ProjectorChannel {
    pub id: i32,
    pub viewport: ViewportFraction,
    /// Projector supports frame-sequential stereo
    pub active: bool,
    pub source: WarpSource,
    warp_size: (u32, u32),
    warp_view: wgpu::TextureView,
    params_buffer: wgpu::Buffer,
    /// One per eye of the cube last composited
    bind_groups: Vec<wgpu::BindGroup>,
}

impl ProjectorChannel {
    pub fn warp_size(&self) -> (u32, u32) {
        self.warp_size
    }

    fn params(&self, options: CompositorOptions) -> SampleParams {
        channel_params(self.source, options)
    }
}

/// Whether a warp map fits the device's 2D texture limit
fn fits_texture_limit(width: u32, height: u32, max_dimension: u32) -> bool {
    width > 0 && height > 0 && width <= max_dimension && height <= max_dimension
}

/// Size of the generated map for a projector without usable warp data
fn fallback_warp_size(record: &ProjectorRecord, max_dimension: u32) -> (u32, u32) {
    let (width, height) = if record.width > 0 && record.height > 0 {
        (record.width, record.height)
    } else {
        FALLBACK_WARP_SIZE
    };
    (width.min(max_dimension).max(1), height.min(max_dimension).max(1))
}

/// Cached bind groups are stale once the cube targets are reallocated
fn needs_rebind(bound: Option<u64>, cube_generation: u64) -> bool {
    bound != Some(cube_generation)
}

/// Sampling parameters for a channel; generated maps carry no blend weight
fn channel_params(source: WarpSource, options: CompositorOptions) -> SampleParams {
    let apply_blend = options.apply_blend && source == WarpSource::Calibration;
    SampleParams::new(options.sample_mode, apply_blend)
}

/// Eye shown by a projector on a given frame
///
/// Active-stereo projectors alternate eyes frame by frame; the rest always
/// show the first eye.
pub fn eye_for_frame(active: bool, num_eyes: usize, frame_index: u64) -> usize {
    if active && num_eyes > 1 {
        (frame_index % num_eyes as u64) as usize
    } else {
        0
    }
}

/// Composites a cubemap into per-projector viewports through warp maps
pub struct PerProjectionRender {
    sampler: CubeSampler,
    channels: Vec<ProjectorChannel>,
    options: CompositorOptions,
    /// Cube generation the channel bind groups were built for
    bound_generation: Option<u64>,
}

impl PerProjectionRender {
    /// Create channels for every projector in `config`
    ///
    /// Projectors without loaded warp data get an equirectangular map. An
    /// empty configuration yields one full-framebuffer equirect channel.
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        target_format: wgpu::TextureFormat,
        config: &CalibrationConfig,
        options: CompositorOptions,
    ) -> Self {
        let sampler = CubeSampler::new(device, target_format);
        let mut render = Self {
            sampler,
            channels: Vec::new(),
            options,
            bound_generation: None,
        };
        render.load_calibration(device, queue, config);
        render
    }

    /// Replace all channels from a calibration configuration
    pub fn load_calibration(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, config: &CalibrationConfig) {
        self.channels.clear();
        self.bound_generation = None;

        if config.is_empty() {
            tracing::info!("No projectors configured, compositing one equirectangular view");
            let record = ProjectorRecord {
                w: 1.0,
                h: 1.0,
                ..Default::default()
            };
            let channel = self.create_channel(device, queue, &record);
            self.channels.push(channel);
            return;
        }

        for record in config.projectors() {
            let channel = self.create_channel(device, queue, record);
            tracing::info!(
                "Projector {}: {}x{} warp ({:?}), viewport l={} b={} w={} h={}{}",
                channel.id,
                channel.warp_size.0,
                channel.warp_size.1,
                channel.source,
                record.l,
                record.b,
                record.w,
                record.h,
                if record.active { ", active stereo" } else { "" }
            );
            self.channels.push(channel);
        }
    }

    fn create_channel(&self, device: &wgpu::Device, queue: &wgpu::Queue, record: &ProjectorRecord) -> ProjectorChannel {
        let max_dimension = device.limits().max_texture_dimension_2d;

        let calibrated = WarpMap::from_record(record).filter(|warp| {
            let fits = fits_texture_limit(warp.width, warp.height, max_dimension);
            if !fits {
                tracing::warn!(
                    "Projector {} warp map is {}x{}, above the device limit of {}px; using equirectangular directions",
                    record.id,
                    warp.width,
                    warp.height,
                    max_dimension
                );
            }
            fits
        });

        let (warp, source) = match calibrated {
            Some(warp) => (warp, WarpSource::Calibration),
            None => {
                if !record.filepath.is_empty() && !record.has_data() {
                    tracing::warn!(
                        "Projector {} has no warp data, using equirectangular directions",
                        record.id
                    );
                }
                let (width, height) = fallback_warp_size(record, max_dimension);
                (WarpMap::equirectangular(width, height), WarpSource::Equirect)
            }
        };

        let (warp_view, error) = with_validation(device, || upload_warp(device, queue, &warp, record.id));
        let (warp, source, warp_view) = match error {
            None => (warp, source, warp_view),
            Some(e) => {
                tracing::warn!(
                    "Projector {} warp texture rejected, using equirectangular directions: {}",
                    record.id,
                    e
                );
                let (width, height) = fallback_warp_size(&ProjectorRecord::default(), max_dimension);
                let fallback = WarpMap::equirectangular(width, height);
                let view = upload_warp(device, queue, &fallback, record.id);
                (fallback, WarpSource::Equirect, view)
            }
        };

        ProjectorChannel {
            id: record.id,
            viewport: ViewportFraction::new(record.l, record.b, record.w, record.h),
            active: record.active,
            source,
            warp_size: (warp.width, warp.height),
            warp_view,
            params_buffer: self
                .sampler
                .create_params_buffer(device, channel_params(source, self.options)),
            bind_groups: Vec::new(),
        }
    }

    /// Change sampling options for all channels
    pub fn set_options(&mut self, queue: &wgpu::Queue, options: CompositorOptions) {
        self.options = options;
        for channel in &self.channels {
            let params = channel.params(options);
            queue.write_buffer(&channel.params_buffer, 0, bytemuck::bytes_of(&params));
        }
    }

    pub fn options(&self) -> CompositorOptions {
        self.options
    }

    pub fn channels(&self) -> &[ProjectorChannel] {
        &self.channels
    }

    pub fn num_projections(&self) -> usize {
        self.channels.len()
    }

    /// Sampler, for shader hot reload
    pub fn sampler_mut(&mut self) -> &mut CubeSampler {
        &mut self.sampler
    }

    /// Rebuild per-eye bind groups when the cube targets changed
    fn bind_cube(&mut self, device: &wgpu::Device, cube: &CubeRender) {
        if !needs_rebind(self.bound_generation, cube.generation()) {
            return;
        }

        for channel in &mut self.channels {
            channel.bind_groups = (0..cube.num_eyes())
                .map(|eye| {
                    self.sampler
                        .create_bind_group(device, &channel.warp_view, cube.cube_view(eye), &channel.params_buffer)
                })
                .collect();
        }
        self.bound_generation = Some(cube.generation());
        tracing::debug!(
            "Bound {} projector channel(s) to {} eye(s)",
            self.channels.len(),
            cube.num_eyes()
        );
    }

    /// Draw every projector's view of `cube` into `target`
    ///
    /// `target` is cleared to black first; regions not covered by a
    /// projector stay black.
    pub fn composite(
        &mut self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        target_size: (u32, u32),
        cube: &CubeRender,
        frame_index: u64,
    ) {
        self.bind_cube(device, cube);

        let (width, height) = target_size;
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Projector Composite Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        for channel in &self.channels {
            let rect = channel.viewport.to_pixels(width, height);
            if rect.is_empty() {
                continue;
            }
            let eye = eye_for_frame(channel.active, channel.bind_groups.len(), frame_index);
            let Some(bind_group) = channel.bind_groups.get(eye) else {
                continue;
            };
            rect.apply(&mut pass);
            self.sampler.draw(&mut pass, bind_group);
        }
    }
}

/// Upload a warp map as an `Rgba32Float` texture
fn upload_warp(device: &wgpu::Device, queue: &wgpu::Queue, warp: &WarpMap, id: i32) -> wgpu::TextureView {
    let size = wgpu::Extent3d {
        width: warp.width,
        height: warp.height,
        depth_or_array_layers: 1,
    };

    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(&format!("Warp Texture (projector {})", id)),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: WARP_FORMAT,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });

    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        warp.as_bytes(),
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            // 4 channels * 4 bytes
            bytes_per_row: Some(warp.width * 16),
            rows_per_image: Some(warp.height),
        },
        size,
    );

    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mono_always_left_eye() {
        for frame in 0..4 {
            assert_eq!(eye_for_frame(true, 1, frame), 0);
            assert_eq!(eye_for_frame(false, 1, frame), 0);
        }
    }

    #[test]
    fn test_active_stereo_alternates() {
        let eyes: Vec<_> = (0..4).map(|f| eye_for_frame(true, 2, f)).collect();
        assert_eq!(eyes, vec![0, 1, 0, 1]);
        let passive: Vec<_> = (0..4).map(|f| eye_for_frame(false, 2, f)).collect();
        assert_eq!(passive, vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_generated_maps_ignore_blend() {
        let options = CompositorOptions {
            sample_mode: SampleMode::Warp,
            apply_blend: true,
        };
        assert_eq!(channel_params(WarpSource::Calibration, options).apply_blend, 1);
        assert_eq!(channel_params(WarpSource::Equirect, options).apply_blend, 0);
    }

    #[test]
    fn test_texture_limit() {
        assert!(fits_texture_limit(8192, 10, 8192));
        assert!(!fits_texture_limit(9000, 10, 8192));
        assert!(!fits_texture_limit(10, 9000, 8192));
        assert!(!fits_texture_limit(0, 10, 8192));
    }

    #[test]
    fn test_fallback_size_respects_limit() {
        let record = ProjectorRecord {
            width: 9000,
            height: 10,
            ..Default::default()
        };
        assert_eq!(fallback_warp_size(&record, 8192), (8192, 10));
        assert_eq!(fallback_warp_size(&ProjectorRecord::default(), 8192), FALLBACK_WARP_SIZE);
        assert_eq!(fallback_warp_size(&ProjectorRecord::default(), 1024), (1024, 1024));
    }

    #[test]
    fn test_rebind_only_after_reallocation() {
        assert!(needs_rebind(None, 0));
        assert!(!needs_rebind(Some(0), 0));
        assert!(needs_rebind(Some(0), 1));
        assert!(!needs_rebind(Some(3), 3));
    }

    #[test]
    fn test_default_options() {
        let options = CompositorOptions::default();
        assert_eq!(options.sample_mode, SampleMode::Warp);
        assert!(!options.apply_blend);
    }
}
