//! Final pass from the main colour buffer to the output target.
//!
//! Runs luma-based edge smoothing when enabled, otherwise a plain copy.

use crate::clouds_uniforms::{self, antialias_uniforms};
use crate::error::{Result, UniformError};
use crate::gpu::fullscreen::{self, FullscreenPipelineDesc};
use crate::gpu::parameter_block::ParameterBlock;
use crate::gpu::render_target::RenderTarget;
use crate::gpu::textures::TexturePool;
use crate::program::LinkedProgram;
use crate::uniforms::UniformSet;

const PROGRAM: &str = "antialias";

pub const SOURCE: &str = include_str!("shader_antialias.wgsl");
pub const BLIT_SOURCE: &str = include_str!("shader_blit.wgsl");

pub struct AntialiasPass {
    uniforms: UniformSet,
    params: ParameterBlock,
    source_layout: wgpu::BindGroupLayout,
    pipeline: wgpu::RenderPipeline,
    blit_pipeline: wgpu::RenderPipeline,
    quad: wgpu::Buffer,
    enabled: bool,
}

impl AntialiasPass {
    pub fn new(
        device: &wgpu::Device,
        output_format: wgpu::TextureFormat,
        width: u32,
        height: u32,
        enabled: bool,
    ) -> Result<Self> {
        let mut uniforms = antialias_uniforms()?;
        clouds_uniforms::set_viewport(&mut uniforms, width, height)?;
        let params = ParameterBlock::new(device, LinkedProgram::link(PROGRAM, SOURCE, &uniforms)?);

        // Texture + sampler, shared by the antialias (group 1) and blit (group 0) shaders.
        let source_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Output Source Layout"),
            entries: &[
                fullscreen::texture_entry(0, wgpu::TextureSampleType::Float { filterable: true }),
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline = fullscreen::create_fullscreen_pipeline(
            device,
            &FullscreenPipelineDesc {
                label: "Antialias Pipeline",
                source: SOURCE,
                bind_group_layouts: &[params.layout(), &source_layout],
                format: Some(output_format),
                blend: Some(wgpu::BlendState::REPLACE),
                depth_stencil: None,
            },
        )?;
        let blit_pipeline = fullscreen::create_fullscreen_pipeline(
            device,
            &FullscreenPipelineDesc {
                label: "Blit Pipeline",
                source: BLIT_SOURCE,
                bind_group_layouts: &[&source_layout],
                format: Some(output_format),
                blend: Some(wgpu::BlendState::REPLACE),
                depth_stencil: None,
            },
        )?;

        Ok(Self {
            uniforms,
            params,
            source_layout,
            pipeline,
            blit_pipeline,
            quad: fullscreen::create_quad_buffer(device),
            enabled,
        })
    }

    pub fn uniforms(&self) -> &UniformSet {
        &self.uniforms
    }

    pub fn uniforms_mut(&mut self) -> &mut UniformSet {
        &mut self.uniforms
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), UniformError> {
        clouds_uniforms::set_viewport(&mut self.uniforms, width, height)
    }

    pub fn record(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        textures: &mut TexturePool,
        source: &RenderTarget,
        output: &wgpu::TextureView,
    ) {
        let Some(source_view) = source.color_view() else {
            log::error!("Output source has no colour attachment");
            return;
        };
        let source_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Output Source"),
            layout: &self.source_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(source_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(source.sampler()),
                },
            ],
        });
        let params = if self.enabled {
            Some(self.params.prepare(device, queue, &self.uniforms, textures))
        } else {
            None
        };

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Output Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: output,
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

        match params {
            Some(params) => {
                render_pass.set_pipeline(&self.pipeline);
                render_pass.set_bind_group(0, params, &[]);
                render_pass.set_bind_group(1, &source_bind_group, &[]);
            }
            None => {
                render_pass.set_pipeline(&self.blit_pipeline);
                render_pass.set_bind_group(0, &source_bind_group, &[]);
            }
        }
        fullscreen::draw_quad(&mut render_pass, &self.quad);
    }
}
