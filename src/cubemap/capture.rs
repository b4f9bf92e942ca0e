//! Six-face cubemap capture
//!
//! `CubeRender` owns one cube texture per eye, a shared depth buffer and the
//! capture pipeline. A frame is recorded as
//!
//! ```text
//! let mut capture = cube.begin(&queue, &mut encoder);
//! for eye in 0..capture.num_eyes() {
//!     capture.set_eye(eye);
//!     for face in CubeFace::ALL {
//!         let mut pass = capture.set_face(face, clear);
//!         // draw scene
//!     }
//! }
//! capture.end();
//! ```
//!
//! Draws can only be recorded through the pass returned by `set_face`, so a
//! face is always selected before anything is drawn into it.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Quat, Vec3};

use super::displacement::{DisplacementModel, StereoMode, DEFAULT_SPHERE_RADIUS};
use super::faces::CubeFace;
use crate::gpu_context::{uniform_stride, with_validation};
use crate::scene::{MeshVertex, ObjectUniforms};
use crate::shaders::{load_shader, ShaderKind};

/// Colour format of the cube faces
pub const CUBE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

/// Depth format shared by all faces
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

const MAX_EYES: usize = 2;

/// Capture parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureConfig {
    /// Edge length of each face in pixels
    pub resolution: u32,
    pub near: f32,
    pub far: f32,
    /// Projection sphere radius
    pub radius: f32,
    /// Full interocular distance
    pub eye_sep: f32,
    /// Focal length for flat-screen stereo
    pub focal_length: f32,
    pub stereo: StereoMode,
    pub model: DisplacementModel,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            resolution: 1024,
            near: 0.1,
            far: 100.0,
            radius: DEFAULT_SPHERE_RADIUS,
            eye_sep: 0.0,
            focal_length: 10.0,
            stereo: StereoMode::Mono,
            model: DisplacementModel::ClosedForm,
        }
    }
}

impl CaptureConfig {
    /// 90° square projection covering one face
    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, self.near, self.far)
    }
}

/// Position and orientation of the capture camera
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub orientation: Quat,
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
        }
    }
}

impl Pose {
    pub fn new(position: Vec3, orientation: Quat) -> Self {
        Self {
            position,
            orientation,
        }
    }

    /// World-to-view transform
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.orientation, self.position).inverse()
    }

    pub fn forward(&self) -> Vec3 {
        self.orientation * Vec3::NEG_Z
    }

    pub fn right(&self) -> Vec3 {
        self.orientation * Vec3::X
    }

    pub fn up(&self) -> Vec3 {
        self.orientation * Vec3::Y
    }

    /// Move along the camera's own axes (x right, y up, z backward)
    pub fn translate_local(&mut self, delta: Vec3) {
        self.position += self.orientation * delta;
    }

    /// Turn around the world up axis
    pub fn yaw(&mut self, radians: f32) {
        self.orientation = (Quat::from_rotation_y(radians) * self.orientation).normalize();
    }

    /// Tilt around the camera's right axis
    pub fn pitch(&mut self, radians: f32) {
        self.orientation = (self.orientation * Quat::from_rotation_x(radians)).normalize();
    }
}

/// Camera uniform block, one per (eye, face)
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct CaptureUniforms {
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    pub face: [[f32; 4]; 4],
    pub eye_sep: f32,
    pub radius: f32,
    pub focal_length: f32,
    pub displacement_model: u32,
}

impl CaptureUniforms {
    pub fn new(view: Mat4, config: &CaptureConfig, eye: usize, face: CubeFace) -> Self {
        Self {
            view: view.to_cols_array_2d(),
            projection: config.projection().to_cols_array_2d(),
            face: face.matrix().to_cols_array_2d(),
            eye_sep: config.stereo.eye(eye).separation(config.eye_sep),
            radius: config.radius,
            focal_length: config.focal_length,
            displacement_model: config.model.shader_index(),
        }
    }
}

/// Slot of the uniform block for an eye and face
fn uniform_slot(eye: usize, face: CubeFace) -> usize {
    eye * CubeFace::ALL.len() + face.index()
}

/// Cube texture and views for one eye
struct EyeTarget {
    texture: wgpu::Texture,
    face_views: Vec<wgpu::TextureView>,
    cube_view: wgpu::TextureView,
}

impl EyeTarget {
    fn new(device: &wgpu::Device, resolution: u32, eye: usize) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&format!("Cubemap Texture (eye {})", eye)),
            size: wgpu::Extent3d {
                width: resolution,
                height: resolution,
                depth_or_array_layers: 6,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: CUBE_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });

        let face_views = CubeFace::ALL
            .iter()
            .map(|face| {
                texture.create_view(&wgpu::TextureViewDescriptor {
                    label: Some(&format!("Cubemap Face {} (eye {})", face.label(), eye)),
                    dimension: Some(wgpu::TextureViewDimension::D2),
                    base_array_layer: face.index() as u32,
                    array_layer_count: Some(1),
                    ..Default::default()
                })
            })
            .collect();

        let cube_view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(&format!("Cubemap View (eye {})", eye)),
            dimension: Some(wgpu::TextureViewDimension::Cube),
            array_layer_count: Some(6),
            ..Default::default()
        });

        Self {
            texture,
            face_views,
            cube_view,
        }
    }
}

/// Renders a scene into the six faces of a cubemap
pub struct CubeRender {
    config: CaptureConfig,
    pose: Pose,

    // Render targets
    targets: Vec<EyeTarget>,
    depth_view: wgpu::TextureView,

    // Pipeline
    pipeline: wgpu::RenderPipeline,
    pipeline_layout: wgpu::PipelineLayout,
    object_bind_group_layout: wgpu::BindGroupLayout,

    // Per (eye, face) camera uniforms, addressed by dynamic offset
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    uniform_stride: u64,

    status: String,
    generation: u64,
}

impl CubeRender {
    /// Create the cube targets and capture pipeline
    ///
    /// Creation problems do not panic; they are logged and reported by
    /// [`CubeRender::status`].
    pub fn new(device: &wgpu::Device, config: CaptureConfig) -> Self {
        let mut config = config;
        let max_size = device.limits().max_texture_dimension_2d;
        if config.resolution == 0 || config.resolution > max_size {
            let clamped = config.resolution.clamp(1, max_size);
            tracing::warn!(
                "Cubemap resolution {} unsupported, using {}",
                config.resolution,
                clamped
            );
            config.resolution = clamped;
        }

        let (render, error) = with_validation(device, || {
            let targets = Self::create_targets(device, &config);
            let depth_view = Self::create_depth(device, config.resolution);

            // Group 0: capture uniforms, group 1: object uniforms
            let capture_bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Cube Capture Bind Group Layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<CaptureUniforms>() as u64),
                    },
                    count: None,
                }],
            });

            let object_bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Cube Object Bind Group Layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<ObjectUniforms>() as u64),
                    },
                    count: None,
                }],
            });

            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Cube Capture Pipeline Layout"),
                bind_group_layouts: &[&capture_bind_group_layout, &object_bind_group_layout],
                push_constant_ranges: &[],
            });

            let pipeline = Self::create_pipeline(device, &pipeline_layout, &load_shader(ShaderKind::CubeCapture));

            let uniform_stride = uniform_stride(device, std::mem::size_of::<CaptureUniforms>() as u64);
            let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Cube Capture Uniform Buffer"),
                size: uniform_stride * (MAX_EYES * CubeFace::ALL.len()) as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });

            let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Cube Capture Bind Group"),
                layout: &capture_bind_group_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &uniform_buffer,
                        offset: 0,
                        size: wgpu::BufferSize::new(std::mem::size_of::<CaptureUniforms>() as u64),
                    }),
                }],
            });

            Self {
                config,
                pose: Pose::default(),
                targets,
                depth_view,
                pipeline,
                pipeline_layout,
                object_bind_group_layout,
                uniform_buffer,
                uniform_bind_group,
                uniform_stride,
                status: String::new(),
                generation: 0,
            }
        });

        let mut render = render;
        render.status = match error {
            None => {
                tracing::info!(
                    "Cubemap ready: {}x{} per face, {} eye(s), {:?}",
                    config.resolution,
                    config.resolution,
                    config.stereo.num_eyes(),
                    config.model
                );
                "complete".to_string()
            }
            Some(e) => {
                tracing::warn!("Cubemap target incomplete: {}", e);
                format!("incomplete: {}", e)
            }
        };
        render
    }

    fn create_targets(device: &wgpu::Device, config: &CaptureConfig) -> Vec<EyeTarget> {
        (0..config.stereo.num_eyes())
            .map(|eye| EyeTarget::new(device, config.resolution, eye))
            .collect()
    }

    fn create_depth(device: &wgpu::Device, resolution: u32) -> wgpu::TextureView {
        let depth_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Cubemap Depth Texture"),
            size: wgpu::Extent3d {
                width: resolution,
                height: resolution,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        depth_texture.create_view(&Default::default())
    }

    fn create_pipeline(device: &wgpu::Device, layout: &wgpu::PipelineLayout, source: &str) -> wgpu::RenderPipeline {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Cube Capture Shader"),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Cube Capture Pipeline"),
            layout: Some(layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[MeshVertex::buffer_layout()],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: CUBE_FORMAT,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                // Face matrices include reflections and the y flip reverses winding
                cull_mode: None,
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        })
    }

    /// Rebuild the pipeline from new shader source (hot reload)
    ///
    /// The previous pipeline is kept if the new source fails validation.
    pub fn rebuild_pipeline(&mut self, device: &wgpu::Device, source: &str) -> Result<(), wgpu::Error> {
        let (pipeline, error) = with_validation(device, || Self::create_pipeline(device, &self.pipeline_layout, source));
        match error {
            None => {
                self.pipeline = pipeline;
                tracing::info!("Cube capture pipeline rebuilt");
                Ok(())
            }
            Some(e) => {
                tracing::warn!("Cube capture shader rejected, keeping previous pipeline: {}", e);
                Err(e)
            }
        }
    }

    /// Switch between mono and stereo, reallocating cube targets
    pub fn set_stereo(&mut self, device: &wgpu::Device, stereo: StereoMode) {
        if self.config.stereo != stereo {
            self.config.stereo = stereo;
            self.targets = Self::create_targets(device, &self.config);
            self.generation += 1;
            tracing::info!("Cubemap stereo mode: {:?}", stereo);
        }
    }

    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    pub fn pose_mut(&mut self) -> &mut Pose {
        &mut self.pose
    }

    /// Full interocular distance used from the next `begin`
    pub fn set_eye_sep(&mut self, eye_sep: f32) {
        self.config.eye_sep = eye_sep;
    }

    pub fn set_model(&mut self, model: DisplacementModel) {
        self.config.model = model;
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// `"complete"` when all GPU resources were created successfully
    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn is_complete(&self) -> bool {
        self.status == "complete"
    }

    pub fn num_eyes(&self) -> usize {
        self.targets.len()
    }

    /// Bumped whenever the cube targets are reallocated
    ///
    /// Bind groups holding [`CubeRender::cube_view`] must be rebuilt when
    /// this changes.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn resolution(&self) -> u32 {
        self.config.resolution
    }

    /// Cube view of an eye for sampling; out-of-range eyes use the last one
    pub fn cube_view(&self, eye: usize) -> &wgpu::TextureView {
        &self.targets[eye.min(self.targets.len() - 1)].cube_view
    }

    /// Cube texture of an eye (six array layers)
    pub fn texture(&self, eye: usize) -> &wgpu::Texture {
        &self.targets[eye.min(self.targets.len() - 1)].texture
    }

    /// Layout for per-object uniforms (bind group 1)
    pub fn object_bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.object_bind_group_layout
    }

    /// Upload camera uniforms for every eye and face and start recording
    pub fn begin<'a>(&'a self, queue: &wgpu::Queue, encoder: &'a mut wgpu::CommandEncoder) -> CubeCapture<'a> {
        let view = self.pose.view_matrix();
        let slots = self.num_eyes() * CubeFace::ALL.len();
        let mut staging = vec![0u8; self.uniform_stride as usize * slots];

        for eye in 0..self.num_eyes() {
            for face in CubeFace::ALL {
                let uniforms = CaptureUniforms::new(view, &self.config, eye, face);
                let offset = uniform_slot(eye, face) * self.uniform_stride as usize;
                let bytes = bytemuck::bytes_of(&uniforms);
                staging[offset..offset + bytes.len()].copy_from_slice(bytes);
            }
        }
        queue.write_buffer(&self.uniform_buffer, 0, &staging);

        CubeCapture {
            render: self,
            encoder,
            eye: 0,
            faces_rendered: 0,
        }
    }
}

/// Recording state between [`CubeRender::begin`] and [`CubeCapture::end`]
pub struct CubeCapture<'a> {
    render: &'a CubeRender,
    encoder: &'a mut wgpu::CommandEncoder,
    eye: usize,
    faces_rendered: usize,
}

impl<'a> CubeCapture<'a> {
    pub fn num_eyes(&self) -> usize {
        self.render.num_eyes()
    }

    /// Select the eye whose separation and cube target later faces use
    pub fn set_eye(&mut self, eye: usize) {
        if eye >= self.num_eyes() {
            tracing::warn!("Eye {} out of range ({} eyes), using last", eye, self.num_eyes());
        }
        self.eye = eye.min(self.num_eyes() - 1);
    }

    pub fn eye(&self) -> usize {
        self.eye
    }

    /// Clear face `face` of the current eye and return a pass drawing into it
    ///
    /// The pass has the capture pipeline and camera uniforms bound; callers
    /// bind group 1 (object uniforms) and vertex buffers, then draw.
    pub fn set_face(&mut self, face: CubeFace, clear: wgpu::Color) -> wgpu::RenderPass<'_> {
        let render = self.render;
        let target = &render.targets[self.eye];

        let mut pass = self.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Cube Capture Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &target.face_views[face.index()],
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(clear),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &render.depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Discard,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        let offset = (uniform_slot(self.eye, face) as u64 * render.uniform_stride) as u32;
        pass.set_pipeline(&render.pipeline);
        pass.set_bind_group(0, &render.uniform_bind_group, &[offset]);

        self.faces_rendered += 1;
        pass
    }

    /// Finish recording; returns the number of faces rendered
    pub fn end(self) -> usize {
        let expected = self.num_eyes() * CubeFace::ALL.len();
        if self.faces_rendered < expected {
            tracing::trace!("Cubemap capture rendered {}/{} faces", self.faces_rendered, expected);
        }
        self.faces_rendered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_layouts_match_shader() {
        assert_eq!(std::mem::size_of::<CaptureUniforms>(), 208);
        assert_eq!(std::mem::size_of::<ObjectUniforms>(), 96);
    }

    #[test]
    fn test_uniform_slots_are_unique() {
        let mut slots: Vec<usize> = (0..MAX_EYES)
            .flat_map(|eye| CubeFace::ALL.into_iter().map(move |face| uniform_slot(eye, face)))
            .collect();
        slots.sort_unstable();
        slots.dedup();
        assert_eq!(slots, (0..12).collect::<Vec<_>>());
    }

    #[test]
    fn test_projection_is_ninety_degrees() {
        let config = CaptureConfig::default();
        let proj = config.projection();
        // A point on the 45° edge of the frustum lands on the clip edge
        let clip = proj * glam::Vec4::new(1.0, 1.0, -1.0, 1.0);
        assert!((clip.x / clip.w - 1.0).abs() < 1e-5);
        assert!((clip.y / clip.w - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_capture_uniforms_per_eye() {
        let config = CaptureConfig {
            eye_sep: 0.064,
            stereo: StereoMode::Stereo,
            model: DisplacementModel::SphereIntersection,
            ..Default::default()
        };
        let left = CaptureUniforms::new(Mat4::IDENTITY, &config, 0, CubeFace::PositiveX);
        let right = CaptureUniforms::new(Mat4::IDENTITY, &config, 1, CubeFace::PositiveX);
        assert_eq!(left.eye_sep, -0.032);
        assert_eq!(right.eye_sep, 0.032);
        assert_eq!(left.displacement_model, 1);
        assert_eq!(left.face, CubeFace::PositiveX.matrix().to_cols_array_2d());

        let mono = CaptureUniforms::new(Mat4::IDENTITY, &CaptureConfig::default(), 0, CubeFace::NegativeZ);
        assert_eq!(mono.eye_sep, 0.0);
        assert_eq!(mono.radius, DEFAULT_SPHERE_RADIUS);
    }

    #[test]
    fn test_pose_view_matrix() {
        let pose = Pose::new(Vec3::new(0.0, 0.0, 5.0), Quat::IDENTITY);
        let view = pose.view_matrix();
        let origin = view.transform_point3(Vec3::ZERO);
        assert!(origin.abs_diff_eq(Vec3::new(0.0, 0.0, -5.0), 1e-6));

        let mut turned = Pose::default();
        turned.yaw(std::f32::consts::FRAC_PI_2);
        assert!(turned.forward().abs_diff_eq(Vec3::NEG_X, 1e-6));
    }

    #[test]
    fn test_pose_translate_local() {
        let mut pose = Pose::default();
        pose.yaw(std::f32::consts::FRAC_PI_2);
        pose.translate_local(Vec3::new(0.0, 0.0, -2.0));
        assert!(pose.position.abs_diff_eq(Vec3::new(-2.0, 0.0, 0.0), 1e-5));
    }
}
