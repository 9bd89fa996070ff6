//! GPU side of a linked program's parameter group.

use crate::gpu::textures::TexturePool;
use crate::program::{LinkedProgram, PARAMETER_GROUP};
use crate::uniforms::{TextureHandle, UniformSet};

/// Uniform buffer, textures and samplers of bind group 0, derived from a
/// [`LinkedProgram`]. Re-uploaded from the owning [`UniformSet`] every frame.
pub struct ParameterBlock {
    program: LinkedProgram,
    layout: wgpu::BindGroupLayout,
    buffer: Option<wgpu::Buffer>,
    sampler: wgpu::Sampler,
    staging: Vec<u8>,
    bind_group: Option<wgpu::BindGroup>,
    bound_textures: Vec<Option<TextureHandle>>,
}

impl ParameterBlock {
    pub fn new(device: &wgpu::Device, program: LinkedProgram) -> Self {
        let visibility = wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT;
        let mut entries = Vec::new();

        if let Some(binding) = program.uniform_binding() {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding,
                visibility,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            });
        }
        for slot in program.textures() {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: slot.binding,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: slot.dimension.view_dimension(),
                    multisampled: false,
                },
                count: None,
            });
        }
        for &binding in program.sampler_bindings() {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            });
        }

        let label = format!("{} parameters", program.name());
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(&label),
            entries: &entries,
        });

        let buffer = program.uniform_binding().map(|_| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&label),
                size: program.buffer_size(),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        });

        // Noise tiles, so parameter textures repeat.
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(&label),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Self {
            program,
            layout,
            buffer,
            sampler,
            staging: Vec::new(),
            bind_group: None,
            bound_textures: Vec::new(),
        }
    }

    pub fn layout(&self) -> &wgpu::BindGroupLayout {
        &self.layout
    }

    /// Upload `set` and return the bind group for [`PARAMETER_GROUP`].
    ///
    /// The bind group is rebuilt only when the set's texture handles changed.
    pub fn prepare(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        set: &UniformSet,
        textures: &mut TexturePool,
    ) -> &wgpu::BindGroup {
        if let Some(buffer) = &self.buffer {
            self.program.pack(set, &mut self.staging);
            queue.write_buffer(buffer, 0, &self.staging);
        }

        let handles: Vec<Option<TextureHandle>> = self
            .program
            .textures()
            .iter()
            .map(|slot| set.value_at(slot.cell).as_texture())
            .collect();
        for (slot, handle) in self.program.textures().iter().zip(&handles) {
            if handle.is_none() {
                textures.report_missing(&slot.key);
            }
        }

        let bind_group = match self.bind_group.take() {
            Some(bind_group) if handles == self.bound_textures => bind_group,
            _ => {
                let bind_group = self.create_bind_group(device, textures, &handles);
                self.bound_textures = handles;
                bind_group
            }
        };
        self.bind_group.insert(bind_group)
    }

    fn create_bind_group(
        &self,
        device: &wgpu::Device,
        textures: &TexturePool,
        handles: &[Option<TextureHandle>],
    ) -> wgpu::BindGroup {
        let mut entries = Vec::new();
        if let (Some(binding), Some(buffer)) = (self.program.uniform_binding(), &self.buffer) {
            entries.push(wgpu::BindGroupEntry {
                binding,
                resource: buffer.as_entire_binding(),
            });
        }
        for (slot, handle) in self.program.textures().iter().zip(handles) {
            entries.push(wgpu::BindGroupEntry {
                binding: slot.binding,
                resource: wgpu::BindingResource::TextureView(textures.view(*handle, slot.dimension)),
            });
        }
        for &binding in self.program.sampler_bindings() {
            entries.push(wgpu::BindGroupEntry {
                binding,
                resource: wgpu::BindingResource::Sampler(&self.sampler),
            });
        }

        log::debug!("Building bind group {} of '{}'", PARAMETER_GROUP, self.program.name());
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(self.program.name()),
            layout: &self.layout,
            entries: &entries,
        })
    }
}
