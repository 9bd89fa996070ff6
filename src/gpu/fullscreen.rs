//! Fullscreen quad shared by every screen-space pass.

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::error::Result;
use crate::gpu::context;

/// Vertex for fullscreen quad rendering.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct QuadVertex {
    position: [f32; 2],
    uv: [f32; 2],
}

impl QuadVertex {
    const ATTRIBS: [wgpu::VertexAttribute; 2] = wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2];

    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }
}

/// Two triangles covering NDC. `uv` has its origin at the top left.
const QUAD_VERTICES: &[QuadVertex] = &[
    QuadVertex { position: [-1.0, -1.0], uv: [0.0, 1.0] },
    QuadVertex { position: [ 1.0, -1.0], uv: [1.0, 1.0] },
    QuadVertex { position: [ 1.0,  1.0], uv: [1.0, 0.0] },
    QuadVertex { position: [-1.0, -1.0], uv: [0.0, 1.0] },
    QuadVertex { position: [ 1.0,  1.0], uv: [1.0, 0.0] },
    QuadVertex { position: [-1.0,  1.0], uv: [0.0, 0.0] },
];

pub fn create_quad_buffer(device: &wgpu::Device) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("Fullscreen Quad"),
        contents: bytemuck::cast_slice(QUAD_VERTICES),
        usage: wgpu::BufferUsages::VERTEX,
    })
}

pub fn draw_quad(pass: &mut wgpu::RenderPass<'_>, quad: &wgpu::Buffer) {
    pass.set_vertex_buffer(0, quad.slice(..));
    pass.draw(0..QUAD_VERTICES.len() as u32, 0..1);
}

/// Everything that varies between the fullscreen pipelines.
pub struct FullscreenPipelineDesc<'a> {
    pub label: &'a str,
    pub source: &'a str,
    pub bind_group_layouts: &'a [&'a wgpu::BindGroupLayout],
    /// `None` for depth-only passes.
    pub format: Option<wgpu::TextureFormat>,
    pub blend: Option<wgpu::BlendState>,
    pub depth_stencil: Option<wgpu::DepthStencilState>,
}

/// Build a quad pipeline. Shader and pipeline validation errors are returned
/// rather than raised on the device.
pub fn create_fullscreen_pipeline(
    device: &wgpu::Device,
    desc: &FullscreenPipelineDesc<'_>,
) -> Result<wgpu::RenderPipeline> {
    context::validated(device, desc.label, || {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(desc.label),
            source: wgpu::ShaderSource::Wgsl(desc.source.into()),
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(desc.label),
            bind_group_layouts: desc.bind_group_layouts,
            push_constant_ranges: &[],
        });

        let target = desc.format.map(|format| wgpu::ColorTargetState {
            format,
            blend: desc.blend,
            write_mask: wgpu::ColorWrites::ALL,
        });
        let targets: &[Option<wgpu::ColorTargetState>] = if target.is_some() {
            std::slice::from_ref(&target)
        } else {
            &[]
        };

        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(desc.label),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[QuadVertex::desc()],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: desc.depth_stencil.clone(),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        })
    })
}

/// Layout sample type for depth attachments read with `textureLoad`. Depth
/// views bind as unfilterable float so the WGSL can use `texture_2d<f32>`,
/// which every backend can load from.
pub const DEPTH_AS_FLOAT: wgpu::TextureSampleType = wgpu::TextureSampleType::Float { filterable: false };

/// Fragment-stage texture entry for a pass-internal bind group layout.
pub fn texture_entry(binding: u32, sample_type: wgpu::TextureSampleType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type,
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}
