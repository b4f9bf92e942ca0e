//! Per-object uniforms for cubemap capture
//!
//! Model matrices and tints for many objects live in one buffer and are
//! selected per draw with a dynamic offset into bind group 1.

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use crate::gpu_context::uniform_stride;

/// Object uniform block (bind group 1 of the capture shader)
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct ObjectUniforms {
    pub model: [[f32; 4]; 4],
    /// Multiplied with vertex colours
    pub tint: [f32; 4],
    /// 0 uses vertex colour, 1 uses normal shading
    pub light_mix: f32,
    pub _padding: [f32; 3],
}

impl ObjectUniforms {
    pub fn new(model: Mat4) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            tint: [1.0, 1.0, 1.0, 1.0],
            light_mix: 0.0,
            _padding: [0.0; 3],
        }
    }

    pub fn with_light_mix(mut self, light_mix: f32) -> Self {
        self.light_mix = light_mix.clamp(0.0, 1.0);
        self
    }
}

impl Default for ObjectUniforms {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY)
    }
}

/// Uniform buffer holding `capacity` object blocks
pub struct ObjectBuffer {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    stride: u64,
    capacity: usize,
    staging: Vec<u8>,
}

impl ObjectBuffer {
    pub fn new(device: &wgpu::Device, layout: &wgpu::BindGroupLayout, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let block_size = std::mem::size_of::<ObjectUniforms>() as u64;
        let stride = uniform_stride(device, block_size);

        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Object Uniform Buffer"),
            size: stride * capacity as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Object Bind Group"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(block_size),
                }),
            }],
        });

        Self {
            buffer,
            bind_group,
            stride,
            capacity,
            staging: vec![0; (stride * capacity as u64) as usize],
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Upload object blocks; extra objects beyond capacity are dropped
    pub fn write(&mut self, queue: &wgpu::Queue, objects: &[ObjectUniforms]) {
        if objects.len() > self.capacity {
            tracing::warn!(
                "{} objects exceed buffer capacity {}, extra objects skipped",
                objects.len(),
                self.capacity
            );
        }
        let count = objects.len().min(self.capacity);
        if count == 0 {
            return;
        }
        for (i, object) in objects.iter().take(count).enumerate() {
            let offset = i * self.stride as usize;
            let bytes = bytemuck::bytes_of(object);
            self.staging[offset..offset + bytes.len()].copy_from_slice(bytes);
        }
        let used = (count - 1) * self.stride as usize + std::mem::size_of::<ObjectUniforms>();
        queue.write_buffer(&self.buffer, 0, &self.staging[..used]);
    }

    /// Bind object `index` as group 1
    pub fn bind(&self, pass: &mut wgpu::RenderPass<'_>, index: usize) {
        let offset = (index.min(self.capacity - 1) as u64 * self.stride) as u32;
        pass.set_bind_group(1, &self.bind_group, &[offset]);
    }
}
