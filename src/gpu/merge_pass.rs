//! Full-resolution composite of the low-res clouds.

use crate::clouds_uniforms::{self, merge_uniforms, UNDERSAMPLING};
use crate::error::{Result, UniformError};
use crate::gpu::fullscreen::{self, FullscreenPipelineDesc};
use crate::gpu::lowres_pass::LowResVolumetricPass;
use crate::gpu::parameter_block::ParameterBlock;
use crate::gpu::textures::TexturePool;
use crate::program::LinkedProgram;
use crate::uniforms::{UniformSet, UniformValue};

const PROGRAM: &str = "clouds_merge";

pub const SOURCE: &str = include_str!("shader_clouds_merge.wgsl");

/// Upsamples the low-res clouds with a per-pixel depth test against the
/// full-resolution scene, then blends them over the main colour.
pub struct MergeStage {
    uniforms: UniformSet,
    params: ParameterBlock,
    inputs_layout: wgpu::BindGroupLayout,
    pipeline: wgpu::RenderPipeline,
    quad: wgpu::Buffer,
}

impl MergeStage {
    pub fn new(
        device: &wgpu::Device,
        color_format: wgpu::TextureFormat,
        width: u32,
        height: u32,
        factor: u32,
    ) -> Result<Self> {
        let mut uniforms = merge_uniforms()?;
        clouds_uniforms::set_viewport(&mut uniforms, width, height)?;
        uniforms.set(UNDERSAMPLING, UniformValue::Int(factor.max(1) as i32))?;

        let params = ParameterBlock::new(device, LinkedProgram::link(PROGRAM, SOURCE, &uniforms)?);

        let inputs_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Clouds Merge Inputs Layout"),
            entries: &[
                fullscreen::texture_entry(0, wgpu::TextureSampleType::Float { filterable: true }),
                fullscreen::texture_entry(1, fullscreen::DEPTH_AS_FLOAT),
                fullscreen::texture_entry(2, fullscreen::DEPTH_AS_FLOAT),
            ],
        });

        let pipeline = fullscreen::create_fullscreen_pipeline(
            device,
            &FullscreenPipelineDesc {
                label: "Clouds Merge Pipeline",
                source: SOURCE,
                bind_group_layouts: &[params.layout(), &inputs_layout],
                format: Some(color_format),
                blend: Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
                depth_stencil: None,
            },
        )?;

        Ok(Self {
            uniforms,
            params,
            inputs_layout,
            pipeline,
            quad: fullscreen::create_quad_buffer(device),
        })
    }

    pub fn uniforms(&self) -> &UniformSet {
        &self.uniforms
    }

    pub fn uniforms_mut(&mut self) -> &mut UniformSet {
        &mut self.uniforms
    }

    pub fn resize(&mut self, width: u32, height: u32, factor: u32) -> Result<(), UniformError> {
        clouds_uniforms::set_viewport(&mut self.uniforms, width, height)?;
        self.uniforms.set(UNDERSAMPLING, UniformValue::Int(factor.max(1) as i32))
    }

    pub fn record(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        textures: &mut TexturePool,
        clouds: &LowResVolumetricPass,
        color_view: &wgpu::TextureView,
        scene_depth: &wgpu::TextureView,
    ) {
        let (Some(cloud_color), Some(cloud_depth)) = (clouds.color_view(), clouds.depth_view()) else {
            log::error!("Low-res cloud target is missing an attachment");
            return;
        };
        let params = self.params.prepare(device, queue, &self.uniforms, textures);
        let inputs = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Clouds Merge Inputs"),
            layout: &self.inputs_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(cloud_color),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(cloud_depth),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(scene_depth),
                },
            ],
        });

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Clouds Merge Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        render_pass.set_pipeline(&self.pipeline);
        render_pass.set_bind_group(0, params, &[]);
        render_pass.set_bind_group(1, &inputs, &[]);
        fullscreen::draw_quad(&mut render_pass, &self.quad);
    }
}
