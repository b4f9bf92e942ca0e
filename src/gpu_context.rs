//! GPU context for the dome renderer
//!
//! Provides `GpuContext` for the device, queue and adapter, and
//! `WindowGpuContext` for the presentation surface of the output window.

use std::sync::Arc;
use thiserror::Error;
use winit::window::Window;

/// Errors raised while bringing up the GPU
#[derive(Debug, Error)]
pub enum GpuError {
    #[error("failed to create surface: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),

    #[error("no suitable GPU adapter found")]
    NoAdapter,

    #[error("failed to create device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),

    #[error("surface reports no supported formats")]
    NoSurfaceFormat,
}

// ═══════════════════════════════════════════════════════════════════════════════
// GPU CONTEXT: device and queue
// ═══════════════════════════════════════════════════════════════════════════════

/// Device, queue and adapter shared by the cube renderer and compositor.
pub struct GpuContext {
    /// The wgpu instance
    pub instance: wgpu::Instance,
    /// The selected GPU adapter
    pub adapter: wgpu::Adapter,
    /// The GPU device for creating resources
    pub device: wgpu::Device,
    /// The command queue for submitting GPU work
    pub queue: wgpu::Queue,
    /// The preferred surface format (typically sRGB)
    pub surface_format: wgpu::TextureFormat,
}

impl GpuContext {
    /// Create a GPU context compatible with the given window.
    ///
    /// Returns the context together with the surface created for adapter
    /// selection, so the caller can configure it without creating a second one.
    pub async fn new(window: Arc<Window>) -> Result<(Self, wgpu::Surface<'static>), GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance.create_surface(window)?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;

        tracing::info!("Using GPU: {}", adapter.get_info().name);
        tracing::info!("Backend: {:?}", adapter.get_info().backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Omni Render Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: adapter.limits(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await?;

        let surface_caps = surface.get_capabilities(&adapter);

        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or(GpuError::NoSurfaceFormat)?;

        tracing::info!("Surface format: {:?}", surface_format);

        Ok((
            Self {
                instance,
                adapter,
                device,
                queue,
                surface_format,
            },
            surface,
        ))
    }
}

/// Round `size` up to a multiple of `alignment`.
pub fn align_to(size: u64, alignment: u64) -> u64 {
    size.div_ceil(alignment) * alignment
}

/// Stride between uniform blocks addressed with dynamic offsets.
pub fn uniform_stride(device: &wgpu::Device, size: u64) -> u64 {
    let alignment = device.limits().min_uniform_buffer_offset_alignment as u64;
    align_to(size, alignment.max(1))
}

/// Run `create` inside a validation error scope.
///
/// Returns the created value along with the first validation error raised
/// while creating it, so callers can report failures instead of relying on
/// the device's uncaptured-error handler.
pub fn with_validation<T>(device: &wgpu::Device, create: impl FnOnce() -> T) -> (T, Option<wgpu::Error>) {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = create();
    let error = pollster::block_on(device.pop_error_scope());
    (value, error)
}

// ═══════════════════════════════════════════════════════════════════════════════
// WINDOW GPU CONTEXT: presentation surface
// ═══════════════════════════════════════════════════════════════════════════════

/// Surface and configuration of the output window.
pub struct WindowGpuContext {
    /// The wgpu surface for this window
    pub surface: wgpu::Surface<'static>,
    /// Surface configuration
    pub config: wgpu::SurfaceConfiguration,
    /// Surface textures can be copied out for frame capture
    pub can_capture: bool,
}

impl WindowGpuContext {
    /// Configure `surface` for the window's current size.
    ///
    /// `vsync` selects FIFO presentation; otherwise the lowest latency mode
    /// the surface supports is used.
    pub fn new(gpu: &GpuContext, surface: wgpu::Surface<'static>, window: &Window, vsync: bool) -> Self {
        let size = window.inner_size();
        let surface_caps = surface.get_capabilities(&gpu.adapter);

        let present_mode = if vsync {
            wgpu::PresentMode::Fifo
        } else if surface_caps.present_modes.contains(&wgpu::PresentMode::Mailbox) {
            wgpu::PresentMode::Mailbox
        } else if surface_caps.present_modes.contains(&wgpu::PresentMode::Immediate) {
            wgpu::PresentMode::Immediate
        } else {
            wgpu::PresentMode::Fifo
        };

        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let can_capture = surface_caps.usages.contains(wgpu::TextureUsages::COPY_SRC);
        let mut usage = wgpu::TextureUsages::RENDER_ATTACHMENT;
        if can_capture {
            usage |= wgpu::TextureUsages::COPY_SRC;
        }

        let config = wgpu::SurfaceConfiguration {
            usage,
            format: gpu.surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        surface.configure(&gpu.device, &config);
        tracing::debug!(
            "Surface configured: {}x{} {:?}",
            config.width,
            config.height,
            present_mode
        );

        Self {
            surface,
            config,
            can_capture,
        }
    }

    /// Resize the window surface.
    pub fn resize(&mut self, gpu: &GpuContext, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            self.surface.configure(&gpu.device, &self.config);
        }
    }

    /// Reconfigure after the surface was lost or became outdated.
    pub fn reconfigure(&self, gpu: &GpuContext) {
        self.surface.configure(&gpu.device, &self.config);
    }

    /// Get the current surface size.
    pub fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpu_error_messages() {
        assert_eq!(GpuError::NoAdapter.to_string(), "no suitable GPU adapter found");
        assert_eq!(
            GpuError::NoSurfaceFormat.to_string(),
            "surface reports no supported formats"
        );
    }

    #[test]
    fn test_align_to() {
        assert_eq!(align_to(208, 256), 256);
        assert_eq!(align_to(256, 256), 256);
        assert_eq!(align_to(257, 256), 512);
        assert_eq!(align_to(96, 64), 128);
    }
}
