//! Full-resolution cloud integrator.
//!
//! Marches every pixel against the scene depth and blends the premultiplied
//! result straight over the main colour target.

use crate::camera::{Camera, Clock};
use crate::clouds_uniforms::{self, direct_uniforms};
use crate::error::{Result, UniformError};
use crate::gpu::fullscreen::{self, FullscreenPipelineDesc};
use crate::gpu::parameter_block::ParameterBlock;
use crate::gpu::textures::TexturePool;
use crate::program::LinkedProgram;
use crate::uniforms::UniformSet;

const PROGRAM: &str = "clouds_direct";

pub const SOURCE: &str = concat!(
    include_str!("shader_clouds_common.wgsl"),
    include_str!("shader_clouds_direct.wgsl")
);

pub struct VolumetricPass {
    uniforms: UniformSet,
    params: ParameterBlock,
    depth_layout: wgpu::BindGroupLayout,
    pipeline: wgpu::RenderPipeline,
    quad: wgpu::Buffer,
    width: u32,
    height: u32,
}

impl VolumetricPass {
    pub fn new(device: &wgpu::Device, color_format: wgpu::TextureFormat, width: u32, height: u32) -> Result<Self> {
        let mut uniforms = direct_uniforms()?;
        clouds_uniforms::set_integrator_viewport(&mut uniforms, width, height, 1)?;

        let program = LinkedProgram::link(PROGRAM, SOURCE, &uniforms)?;
        let params = ParameterBlock::new(device, program);

        let depth_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Clouds Direct Depth Layout"),
            entries: &[fullscreen::texture_entry(0, fullscreen::DEPTH_AS_FLOAT)],
        });

        let pipeline = fullscreen::create_fullscreen_pipeline(
            device,
            &FullscreenPipelineDesc {
                label: "Clouds Direct Pipeline",
                source: SOURCE,
                bind_group_layouts: &[params.layout(), &depth_layout],
                format: Some(color_format),
                blend: Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
                depth_stencil: None,
            },
        )?;

        log::info!("Created direct cloud pass at {}x{}", width, height);
        Ok(Self {
            uniforms,
            params,
            depth_layout,
            pipeline,
            quad: fullscreen::create_quad_buffer(device),
            width,
            height,
        })
    }

    pub fn uniforms(&self) -> &UniformSet {
        &self.uniforms
    }

    pub fn uniforms_mut(&mut self) -> &mut UniformSet {
        &mut self.uniforms
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Refresh camera and time inputs for the next frame.
    pub fn update(&mut self, camera: &Camera, clock: &Clock) -> Result<(), UniformError> {
        clouds_uniforms::update_frame_uniforms(&mut self.uniforms, camera, clock)
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), UniformError> {
        self.width = width;
        self.height = height;
        clouds_uniforms::set_integrator_viewport(&mut self.uniforms, width, height, 1)
    }

    /// Blend clouds over `color_view`, occluded by `scene_depth`.
    pub fn record(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        textures: &mut TexturePool,
        color_view: &wgpu::TextureView,
        scene_depth: &wgpu::TextureView,
    ) {
        let params = self.params.prepare(device, queue, &self.uniforms, textures);
        let depth_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Clouds Direct Depth"),
            layout: &self.depth_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(scene_depth),
            }],
        });

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Clouds Direct Pass"),
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
        render_pass.set_bind_group(1, &depth_bind_group, &[]);
        fullscreen::draw_quad(&mut render_pass, &self.quad);
    }
}
