//! Cubemap sampling pass
//!
//! Draws a fullscreen triangle that looks up a direction per pixel (from a
//! warp texture or an equirectangular mapping) and samples the cubemap along
//! it. Callers restrict the output with viewport and scissor rectangles.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use wgpu::util::DeviceExt;

use crate::gpu_context::with_validation;
use crate::shaders::{load_shader, ShaderKind};

/// How the sampling pass obtains a direction per pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SampleMode {
    /// Read the direction from the warp texture
    #[default]
    Warp,
    /// Compute an equirectangular direction from the texcoord
    Equirect,
}

impl SampleMode {
    fn shader_index(self) -> u32 {
        match self {
            SampleMode::Warp => 0,
            SampleMode::Equirect => 1,
        }
    }
}

/// Sampling parameters (binding 3)
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct SampleParams {
    pub mode: u32,
    pub apply_blend: u32,
    pub _padding: [u32; 2],
}

impl SampleParams {
    pub fn new(mode: SampleMode, apply_blend: bool) -> Self {
        Self {
            mode: mode.shader_index(),
            apply_blend: apply_blend as u32,
            _padding: [0; 2],
        }
    }
}

/// Pipeline for sampling a cubemap through a warp texture
pub struct CubeSampler {
    pipeline: wgpu::RenderPipeline,
    pipeline_layout: wgpu::PipelineLayout,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    target_format: wgpu::TextureFormat,
}

impl CubeSampler {
    pub fn new(device: &wgpu::Device, target_format: wgpu::TextureFormat) -> Self {
        // Bind group layout: [0] warp texture, [1] cubemap, [2] sampler, [3] params
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Cube Sampler Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        // Rgba32Float is read with textureLoad
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::Cube,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<SampleParams>() as u64),
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Cube Sampler Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = Self::create_pipeline(
            device,
            &pipeline_layout,
            target_format,
            &load_shader(ShaderKind::CubeSample),
        );

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Cube Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Self {
            pipeline,
            pipeline_layout,
            bind_group_layout,
            sampler,
            target_format,
        }
    }

    fn create_pipeline(
        device: &wgpu::Device,
        layout: &wgpu::PipelineLayout,
        target_format: wgpu::TextureFormat,
        source: &str,
    ) -> wgpu::RenderPipeline {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Cube Sample Shader"),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Cube Sample Pipeline"),
            layout: Some(layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: target_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        })
    }

    /// Rebuild the pipeline from new shader source (hot reload)
    pub fn rebuild_pipeline(&mut self, device: &wgpu::Device, source: &str) -> Result<(), wgpu::Error> {
        let (pipeline, error) = with_validation(device, || {
            Self::create_pipeline(device, &self.pipeline_layout, self.target_format, source)
        });
        match error {
            None => {
                self.pipeline = pipeline;
                tracing::info!("Cube sample pipeline rebuilt");
                Ok(())
            }
            Some(e) => {
                tracing::warn!("Cube sample shader rejected, keeping previous pipeline: {}", e);
                Err(e)
            }
        }
    }

    /// Uniform buffer holding [`SampleParams`]
    pub fn create_params_buffer(&self, device: &wgpu::Device, params: SampleParams) -> wgpu::Buffer {
        device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Cube Sample Params Buffer"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        })
    }

    /// Bind a warp texture, a cubemap and sampling parameters
    pub fn create_bind_group(
        &self,
        device: &wgpu::Device,
        warp_view: &wgpu::TextureView,
        cube_view: &wgpu::TextureView,
        params: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Cube Sampler Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(warp_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(cube_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: params.as_entire_binding(),
                },
            ],
        })
    }

    /// Draw the fullscreen triangle into the current viewport
    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>, bind_group: &wgpu::BindGroup) {
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.draw(0..3, 0..1);
    }

    pub fn target_format(&self) -> wgpu::TextureFormat {
        self.target_format
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_params_layout() {
        assert_eq!(std::mem::size_of::<SampleParams>(), 16);
        let params = SampleParams::new(SampleMode::Equirect, true);
        assert_eq!(params.mode, 1);
        assert_eq!(params.apply_blend, 1);
        assert_eq!(SampleParams::new(SampleMode::Warp, false).mode, 0);
    }
}
