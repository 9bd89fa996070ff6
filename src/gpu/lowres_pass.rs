//! Cloud integrator at a fraction of the output resolution.
//!
//! Each frame runs two draws into low-res targets:
//!
//! 1. the scene depth is max-pooled into a low-res depth texture (through
//!    `frag_depth`), so every low-res texel knows the farthest scene depth
//!    its footprint covers;
//! 2. the integrator casts one ray per texel through the full-resolution
//!    pixel at the centre of that footprint and marches it against the
//!    pooled depth, writing premultiplied cloud colour and the depth where
//!    the clouds became opaque.
//!
//! [`MergeStage`](crate::gpu::merge_pass::MergeStage) composites the result
//! at full resolution.

use crate::camera::{Camera, Clock};
use crate::clouds_uniforms::{self, low_res_uniforms};
use crate::error::{Result, UniformError};
use crate::gpu::fullscreen::{self, FullscreenPipelineDesc};
use crate::gpu::parameter_block::ParameterBlock;
use crate::gpu::render_target::{RenderTarget, RenderTargetDesc, DEPTH_FORMAT};
use crate::gpu::textures::TexturePool;
use crate::program::LinkedProgram;
use crate::quality::undersampled_size;
use crate::uniforms::UniformSet;

const PROGRAM: &str = "clouds_low_res";
const DOWNSAMPLE_PROGRAM: &str = "depth_downsample";

pub const CLOUD_COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

pub const SOURCE: &str = concat!(
    include_str!("shader_clouds_common.wgsl"),
    include_str!("shader_clouds_low_res.wgsl")
);
pub const DOWNSAMPLE_SOURCE: &str = include_str!("shader_depth_downsample.wgsl");

pub struct LowResVolumetricPass {
    uniforms: UniformSet,
    params: ParameterBlock,
    downsample_params: ParameterBlock,
    pooled_layout: wgpu::BindGroupLayout,
    scene_depth_layout: wgpu::BindGroupLayout,
    pipeline: wgpu::RenderPipeline,
    downsample_pipeline: wgpu::RenderPipeline,
    quad: wgpu::Buffer,
    clouds: RenderTarget,
    pooled_depth: RenderTarget,
    factor: u32,
    full_width: u32,
    full_height: u32,
}

impl LowResVolumetricPass {
    pub fn new(device: &wgpu::Device, full_width: u32, full_height: u32, factor: u32) -> Result<Self> {
        let factor = factor.max(1);
        let (width, height) = undersampled_size(full_width, full_height, factor);

        let mut uniforms = low_res_uniforms()?;
        clouds_uniforms::set_integrator_viewport(&mut uniforms, full_width, full_height, factor)?;

        let params = ParameterBlock::new(device, LinkedProgram::link(PROGRAM, SOURCE, &uniforms)?);
        let downsample_params = ParameterBlock::new(
            device,
            LinkedProgram::link(DOWNSAMPLE_PROGRAM, DOWNSAMPLE_SOURCE, &uniforms)?,
        );

        let pooled_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Pooled Depth Layout"),
            entries: &[fullscreen::texture_entry(0, fullscreen::DEPTH_AS_FLOAT)],
        });
        let scene_depth_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Downsample Scene Depth Layout"),
            entries: &[fullscreen::texture_entry(0, fullscreen::DEPTH_AS_FLOAT)],
        });

        let pipeline = fullscreen::create_fullscreen_pipeline(
            device,
            &FullscreenPipelineDesc {
                label: "Clouds Low-Res Pipeline",
                source: SOURCE,
                bind_group_layouts: &[params.layout(), &pooled_layout],
                format: Some(CLOUD_COLOR_FORMAT),
                blend: Some(wgpu::BlendState::REPLACE),
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Always,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
            },
        )?;
        let downsample_pipeline = fullscreen::create_fullscreen_pipeline(
            device,
            &FullscreenPipelineDesc {
                label: "Depth Downsample Pipeline",
                source: DOWNSAMPLE_SOURCE,
                bind_group_layouts: &[downsample_params.layout(), &scene_depth_layout],
                format: None,
                blend: None,
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Always,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
            },
        )?;

        let clouds = RenderTarget::new(
            device,
            RenderTargetDesc::new("Low-Res Clouds", width, height, CLOUD_COLOR_FORMAT)
                .with_depth()
                .with_filter(wgpu::FilterMode::Nearest),
        );
        let pooled_depth = RenderTarget::new(device, RenderTargetDesc::depth_only("Pooled Depth", width, height));

        log::info!(
            "Created low-res cloud pass: {}x{} -> {}x{} (factor {})",
            full_width,
            full_height,
            width,
            height,
            factor
        );
        Ok(Self {
            uniforms,
            params,
            downsample_params,
            pooled_layout,
            scene_depth_layout,
            pipeline,
            downsample_pipeline,
            quad: fullscreen::create_quad_buffer(device),
            clouds,
            pooled_depth,
            factor,
            full_width,
            full_height,
        })
    }

    pub fn uniforms(&self) -> &UniformSet {
        &self.uniforms
    }

    pub fn uniforms_mut(&mut self) -> &mut UniformSet {
        &mut self.uniforms
    }

    pub fn factor(&self) -> u32 {
        self.factor
    }

    /// Size of the low-res targets.
    pub fn size(&self) -> (u32, u32) {
        undersampled_size(self.full_width, self.full_height, self.factor)
    }

    pub fn full_size(&self) -> (u32, u32) {
        (self.full_width, self.full_height)
    }

    pub fn color_view(&self) -> Option<&wgpu::TextureView> {
        self.clouds.color_view()
    }

    pub fn depth_view(&self) -> Option<&wgpu::TextureView> {
        self.clouds.depth_view()
    }

    /// Refresh camera and time inputs for the next frame.
    pub fn update(&mut self, camera: &Camera, clock: &Clock) -> Result<(), UniformError> {
        clouds_uniforms::update_frame_uniforms(&mut self.uniforms, camera, clock)
    }

    /// Follow a change of output size, recreating the low-res targets at
    /// `ceil(full / factor)`.
    pub fn resize(&mut self, device: &wgpu::Device, full_width: u32, full_height: u32) -> Result<(), UniformError> {
        self.full_width = full_width;
        self.full_height = full_height;
        let (width, height) = self.size();
        self.clouds.resize(device, width, height);
        self.pooled_depth.resize(device, width, height);
        clouds_uniforms::set_integrator_viewport(&mut self.uniforms, full_width, full_height, self.factor)
    }

    /// Pool `scene_depth` and march the clouds into the low-res targets.
    pub fn record(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        textures: &mut TexturePool,
        scene_depth: &wgpu::TextureView,
    ) {
        let (width, height) = self.size();
        self.clouds.ensure_size(device, width, height);
        self.pooled_depth.ensure_size(device, width, height);

        let (Some(pooled_depth), Some(cloud_color), Some(cloud_depth)) = (
            self.pooled_depth.depth_view(),
            self.clouds.color_view(),
            self.clouds.depth_view(),
        ) else {
            log::error!("Low-res cloud targets are missing an attachment");
            return;
        };

        Self::record_downsample(
            &self.downsample_pipeline,
            &mut self.downsample_params,
            &self.scene_depth_layout,
            &self.quad,
            &self.uniforms,
            device,
            queue,
            encoder,
            textures,
            scene_depth,
            pooled_depth,
        );

        let params = self.params.prepare(device, queue, &self.uniforms, textures);
        let pooled_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Pooled Depth"),
            layout: &self.pooled_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(pooled_depth),
            }],
        });

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Clouds Low-Res Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: cloud_color,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: cloud_depth,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        render_pass.set_pipeline(&self.pipeline);
        render_pass.set_bind_group(0, params, &[]);
        render_pass.set_bind_group(1, &pooled_bind_group, &[]);
        fullscreen::draw_quad(&mut render_pass, &self.quad);
    }

    #[allow(clippy::too_many_arguments)]
    fn record_downsample(
        pipeline: &wgpu::RenderPipeline,
        params: &mut ParameterBlock,
        scene_depth_layout: &wgpu::BindGroupLayout,
        quad: &wgpu::Buffer,
        uniforms: &UniformSet,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        textures: &mut TexturePool,
        scene_depth: &wgpu::TextureView,
        pooled_depth: &wgpu::TextureView,
    ) {
        let params = params.prepare(device, queue, uniforms, textures);
        let depth_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Downsample Scene Depth"),
            layout: scene_depth_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(scene_depth),
            }],
        });

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Depth Downsample Pass"),
            color_attachments: &[],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: pooled_depth,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        render_pass.set_pipeline(pipeline);
        render_pass.set_bind_group(0, params, &[]);
        render_pass.set_bind_group(1, &depth_bind_group, &[]);
        fullscreen::draw_quad(&mut render_pass, quad);
    }
}
