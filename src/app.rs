//! Viewer application
//!
//! Opens a window, renders the icosahedron lattice into the cubemap each
//! frame and composites it into every calibrated projector region.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use glam::Vec3;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::ActiveEventLoop;
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Fullscreen, Window, WindowId};

use crate::calibration::CalibrationConfig;
use crate::capture::{frame_path, FrameCapture};
use crate::cubemap::{CaptureConfig, CubeFace, CubeRender, SampleMode, StereoMode};
use crate::gpu_context::{GpuContext, GpuError, WindowGpuContext};
use crate::output::{CompositorOptions, PerProjectionRender};
use crate::scene::GridScene;
use crate::settings::RenderSettings;
use crate::shaders::{load_shader, ShaderKind, ShaderWatcher};

/// Camera speed in scene units per second
const MOVE_SPEED: f32 = 2.0;

/// Turn rate in radians per second
const TURN_SPEED: f32 = 1.2;

/// Eye separation change per bracket key press
const EYE_SEP_STEP: f32 = 0.005;

/// GPU state created once the window exists
struct RenderState {
    gpu: GpuContext,
    window_ctx: WindowGpuContext,
    cube: CubeRender,
    compositor: PerProjectionRender,
    scene: GridScene,
    capture: Option<FrameCapture>,
    shader_watcher: Option<ShaderWatcher>,
}

impl RenderState {
    fn new(window: Arc<Window>, settings: &RenderSettings) -> Result<Self, GpuError> {
        let (gpu, surface) = pollster::block_on(GpuContext::new(window.clone()))?;
        let window_ctx = WindowGpuContext::new(&gpu, surface, &window, settings.vsync_enabled);

        let cube = CubeRender::new(&gpu.device, capture_config(settings));
        tracing::info!("Cube render: {}px faces, {}", cube.resolution(), cube.status());
        if !cube.is_complete() {
            tracing::warn!("Cube render is incomplete, faces will stay at their clear colour");
        }

        let calibration = load_calibration(settings);
        let compositor = PerProjectionRender::new(
            &gpu.device,
            &gpu.queue,
            gpu.surface_format,
            &calibration,
            CompositorOptions {
                sample_mode: settings.sample_mode,
                apply_blend: settings.apply_blend,
            },
        );

        let scene = GridScene::new(&gpu.device, &cube);

        let capture = match FrameCapture::new() {
            Ok(capture) => Some(capture),
            Err(e) => {
                tracing::warn!("Frame capture unavailable: {}", e);
                None
            }
        };

        let shader_watcher = match ShaderWatcher::new() {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                tracing::warn!("Shader hot-reload unavailable: {}", e);
                None
            }
        };

        Ok(Self {
            gpu,
            window_ctx,
            cube,
            compositor,
            scene,
            capture,
            shader_watcher,
        })
    }
}

/// Capture parameters from viewer settings
pub fn capture_config(settings: &RenderSettings) -> CaptureConfig {
    CaptureConfig {
        resolution: settings.cube_resolution,
        near: settings.near,
        far: settings.far,
        radius: settings.sphere_radius,
        eye_sep: settings.eye_separation,
        focal_length: settings.focal_length,
        stereo: settings.stereo_mode,
        model: settings.displacement_model,
    }
}

/// Eye separation after a bracket key step, never negative
fn step_eye_sep(current: f32, delta: f32) -> f32 {
    let next = current + delta;
    if next.is_finite() {
        next.max(0.0)
    } else {
        current
    }
}

/// Parse the configured calibration file and read its warp maps
///
/// Problems are logged; a missing file yields an empty configuration.
fn load_calibration(settings: &RenderSettings) -> CalibrationConfig {
    let Some(path) = settings.calibration_path() else {
        tracing::info!("No calibration file configured");
        return CalibrationConfig::default();
    };

    let mut config = CalibrationConfig::load_or_empty(&path);
    let outcomes = config.load_data();
    let loaded = outcomes.iter().filter(|o| o.has_data()).count();
    tracing::info!("{} of {} warp maps loaded from {}", loaded, config.len(), path.display());
    tracing::debug!("Calibration:\n{}", config.summary());
    config
}

/// Viewer application driven by the winit event loop
pub struct OmniApp {
    settings: RenderSettings,
    window: Option<Arc<Window>>,
    render: Option<RenderState>,
    held_keys: HashSet<KeyCode>,
    start_time: Instant,
    last_frame: Instant,
    frame_index: u64,
    capture_index: u32,
    capture_requested: bool,
}

impl OmniApp {
    pub fn new(settings: RenderSettings) -> Self {
        let now = Instant::now();
        Self {
            settings,
            window: None,
            render: None,
            held_keys: HashSet::new(),
            start_time: now,
            last_frame: now,
            frame_index: 0,
            capture_index: 0,
            capture_requested: false,
        }
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    fn handle_resize(&mut self, size: PhysicalSize<u32>) {
        if let Some(render) = &mut self.render {
            render.window_ctx.resize(&render.gpu, size);
        }
    }

    fn handle_key(&mut self, event_loop: &ActiveEventLoop, key: KeyEvent) {
        let PhysicalKey::Code(code) = key.physical_key else {
            return;
        };

        if key.state == ElementState::Released {
            self.held_keys.remove(&code);
            return;
        }
        self.held_keys.insert(code);
        if key.repeat {
            return;
        }

        match code {
            KeyCode::Escape => event_loop.exit(),
            KeyCode::F12 => self.capture_requested = true,
            KeyCode::Tab => self.toggle_stereo(),
            KeyCode::KeyB => self.toggle_blend(),
            KeyCode::KeyM => self.toggle_sample_mode(),
            KeyCode::KeyC => self.cycle_model(),
            KeyCode::BracketLeft => self.adjust_eye_sep(-EYE_SEP_STEP),
            KeyCode::BracketRight => self.adjust_eye_sep(EYE_SEP_STEP),
            _ => {}
        }
    }

    fn toggle_stereo(&mut self) {
        let Some(render) = &mut self.render else { return };
        let stereo = match render.cube.config().stereo {
            StereoMode::Mono => StereoMode::Stereo,
            StereoMode::Stereo => StereoMode::Mono,
        };
        render.cube.set_stereo(&render.gpu.device, stereo);
        tracing::info!("Stereo mode: {:?}", stereo);
    }

    fn cycle_model(&mut self) {
        let Some(render) = &mut self.render else { return };
        let model = render.cube.config().model.next();
        render.cube.set_model(model);
        tracing::info!("Displacement model: {:?}", model);
    }

    fn adjust_eye_sep(&mut self, delta: f32) {
        let Some(render) = &mut self.render else { return };
        let eye_sep = step_eye_sep(render.cube.config().eye_sep, delta);
        render.cube.set_eye_sep(eye_sep);
        tracing::info!("Eye separation: {:.3}", eye_sep);
    }

    fn toggle_blend(&mut self) {
        let Some(render) = &mut self.render else { return };
        let mut options = render.compositor.options();
        options.apply_blend = !options.apply_blend;
        render.compositor.set_options(&render.gpu.queue, options);
        tracing::info!("Blend: {}", if options.apply_blend { "on" } else { "off" });
    }

    fn toggle_sample_mode(&mut self) {
        let Some(render) = &mut self.render else { return };
        let mut options = render.compositor.options();
        options.sample_mode = match options.sample_mode {
            SampleMode::Warp => SampleMode::Equirect,
            SampleMode::Equirect => SampleMode::Warp,
        };
        render.compositor.set_options(&render.gpu.queue, options);
        tracing::info!("Sample mode: {:?}", options.sample_mode);
    }

    /// Apply held navigation keys to the capture pose
    fn update_navigation(&mut self, dt: f32) {
        let Some(render) = &mut self.render else { return };

        let mut movement = Vec3::ZERO;
        let mut yaw = 0.0;
        let mut pitch = 0.0;
        for key in &self.held_keys {
            match key {
                KeyCode::KeyW => movement.z -= 1.0,
                KeyCode::KeyS => movement.z += 1.0,
                KeyCode::KeyA => movement.x -= 1.0,
                KeyCode::KeyD => movement.x += 1.0,
                KeyCode::KeyQ => movement.y -= 1.0,
                KeyCode::KeyE => movement.y += 1.0,
                KeyCode::ArrowLeft => yaw += 1.0,
                KeyCode::ArrowRight => yaw -= 1.0,
                KeyCode::ArrowUp => pitch += 1.0,
                KeyCode::ArrowDown => pitch -= 1.0,
                _ => {}
            }
        }

        let pose = render.cube.pose_mut();
        if movement != Vec3::ZERO {
            pose.translate_local(movement.normalize() * MOVE_SPEED * dt);
        }
        if yaw != 0.0 {
            pose.yaw(yaw * TURN_SPEED * dt);
        }
        if pitch != 0.0 {
            pose.pitch(pitch * TURN_SPEED * dt);
        }
    }

    fn reload_shaders(&mut self) {
        let Some(render) = &mut self.render else { return };
        let Some(watcher) = &mut render.shader_watcher else { return };
        let Some(kind) = watcher.poll_kind() else { return };

        let source = load_shader(kind);
        let result = match kind {
            ShaderKind::CubeCapture => render.cube.rebuild_pipeline(&render.gpu.device, &source),
            ShaderKind::CubeSample => render
                .compositor
                .sampler_mut()
                .rebuild_pipeline(&render.gpu.device, &source),
        };
        if result.is_ok() {
            tracing::info!("Reloaded {}", kind.file_name());
        }
    }

    fn capture_path(&self, prefix: &str) -> PathBuf {
        frame_path(Path::new(&self.settings.capture_directory), prefix, self.capture_index)
    }

    fn render_frame(&mut self) {
        let now = Instant::now();
        let dt = (now - self.last_frame).as_secs_f32();
        self.last_frame = now;
        self.update_navigation(dt);
        self.reload_shaders();

        let capture_requested = std::mem::take(&mut self.capture_requested);
        let surface_path = self.capture_path("frame");
        let face_paths: Vec<PathBuf> = CubeFace::ALL
            .iter()
            .map(|face| self.capture_path(&format!("face{}", face.index())))
            .collect();
        let time = self.start_time.elapsed().as_secs_f32();
        let frame_index = self.frame_index;

        let Some(render) = &mut self.render else { return };

        let surface_texture = match render.window_ctx.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                render.window_ctx.reconfigure(&render.gpu);
                return;
            }
            Err(wgpu::SurfaceError::Timeout) => {
                tracing::debug!("Surface timeout, skipping frame");
                return;
            }
            Err(e) => {
                tracing::error!("Surface error: {:?}", e);
                return;
            }
        };
        let target_view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        render.scene.update(&render.gpu.queue, time);

        let mut encoder = render
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        let mut cube_capture = render.cube.begin(&render.gpu.queue, &mut encoder);
        render.scene.capture(&mut cube_capture);
        cube_capture.end();

        render.compositor.composite(
            &render.gpu.device,
            &mut encoder,
            &target_view,
            render.window_ctx.size(),
            &render.cube,
            frame_index,
        );

        let mut captured = false;
        if capture_requested {
            if let Some(capture) = &mut render.capture {
                let queued = if render.window_ctx.can_capture {
                    capture.copy_texture(
                        &render.gpu.device,
                        &mut encoder,
                        &surface_texture.texture,
                        0,
                        surface_path,
                    )
                } else {
                    tracing::info!("Surface cannot be copied, capturing cube faces instead");
                    CubeFace::ALL.iter().zip(face_paths).try_for_each(|(face, path)| {
                        capture.copy_texture(
                            &render.gpu.device,
                            &mut encoder,
                            render.cube.texture(0),
                            face.index() as u32,
                            path,
                        )
                    })
                };
                match queued {
                    Ok(()) => captured = true,
                    Err(e) => tracing::warn!("Capture failed: {}", e),
                }
            }
        }

        render.gpu.queue.submit(std::iter::once(encoder.finish()));
        surface_texture.present();

        if let Some(capture) = &mut render.capture {
            for result in capture.process(&render.gpu.device) {
                match result {
                    Ok(path) => tracing::info!("Saved {}", path.display()),
                    Err(e) => tracing::warn!("Capture failed: {}", e),
                }
            }
        }

        if captured {
            self.capture_index += 1;
        }
        self.frame_index += 1;
    }
}

impl ApplicationHandler for OmniApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let mut attributes = Window::default_attributes()
            .with_title(self.settings.window_title.clone())
            .with_inner_size(PhysicalSize::new(self.settings.window_width, self.settings.window_height));
        if self.settings.fullscreen {
            attributes = attributes
                .with_fullscreen(Some(Fullscreen::Borderless(None)))
                .with_decorations(false);
        }

        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                tracing::error!("Failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };

        match RenderState::new(window.clone(), &self.settings) {
            Ok(render) => {
                tracing::info!(
                    "{} projector channel(s), {} objects",
                    render.compositor.num_projections(),
                    render.scene.object_count()
                );
                self.render = Some(render);
            }
            Err(e) => {
                tracing::error!("Failed to initialize graphics: {}", e);
                event_loop.exit();
                return;
            }
        }

        self.last_frame = Instant::now();
        self.window = Some(window);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                tracing::info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                self.handle_resize(size);
            }
            WindowEvent::KeyboardInput { event, .. } => {
                self.handle_key(event_loop, event);
            }
            WindowEvent::Focused(false) => {
                self.held_keys.clear();
            }
            WindowEvent::RedrawRequested => {
                self.render_frame();
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cubemap::DisplacementModel;

    #[test]
    fn test_capture_config_from_settings() {
        let settings = RenderSettings {
            cube_resolution: 512,
            eye_separation: 0.05,
            stereo_mode: StereoMode::Stereo,
            displacement_model: DisplacementModel::FlatScreen,
            ..Default::default()
        };
        let config = capture_config(&settings);
        assert_eq!(config.resolution, 512);
        assert_eq!(config.eye_sep, 0.05);
        assert_eq!(config.stereo, StereoMode::Stereo);
        assert_eq!(config.model, DisplacementModel::FlatScreen);
        assert_eq!(config.radius, settings.sphere_radius);
    }

    #[test]
    fn test_missing_calibration_is_empty() {
        let settings = RenderSettings {
            calibration_file: Some(
                std::env::temp_dir()
                    .join("omni_render_no_such_calibration.txt")
                    .to_string_lossy()
                    .into_owned(),
            ),
            ..Default::default()
        };
        if std::env::var_os(crate::settings::CALIBRATION_ENV).is_none() {
            assert!(load_calibration(&settings).is_empty());
        }
    }

    #[test]
    fn test_step_eye_sep() {
        assert!((step_eye_sep(0.064, EYE_SEP_STEP) - 0.069).abs() < 1e-6);
        assert_eq!(step_eye_sep(0.002, -EYE_SEP_STEP), 0.0);
        assert_eq!(step_eye_sep(0.0, -EYE_SEP_STEP), 0.0);
        assert_eq!(step_eye_sep(0.064, f32::NAN), 0.064);
    }

    #[test]
    fn test_new_app_starts_at_frame_zero() {
        let app = OmniApp::new(RenderSettings::default());
        assert_eq!(app.frame_index(), 0);
        assert!(app.render.is_none());
    }
}
