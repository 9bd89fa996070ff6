//! Frame orchestration and cloud quality switching.
//!
//! Every frame runs, in one command encoder:
//!
//! 1. the opaque scene into the main colour/depth target,
//! 2. the live cloud stage (direct, or low-res followed by the merge),
//! 3. antialiasing (or a blit) into the caller's output view.
//!
//! Exactly one cloud stage is alive at a time. Switching quality drops the
//! outgoing stage's GPU resources and builds the incoming one at the current
//! display size, carrying its configuration across. Merge settings outlive
//! the low-res stage: while the direct path is live they are parked on the
//! driver and restored on the next switch back.

use glam::Vec3;

use crate::camera::{Camera, Clock};
use crate::clouds_uniforms::{self, DETAILS_OFFSET, NOISE_TEXTURE, NOISE_VOLUME, SUN_DIRECTION};
use crate::config::PipelineConfig;
use crate::error::{Result, UniformError};
use crate::gpu::antialias_pass::AntialiasPass;
use crate::gpu::context::{self, GpuContext};
use crate::gpu::lowres_pass::LowResVolumetricPass;
use crate::gpu::merge_pass::MergeStage;
use crate::gpu::mesh::SceneMesh;
use crate::gpu::render_target::{RenderTarget, RenderTargetDesc};
use crate::gpu::scene_pass::ScenePass;
use crate::gpu::textures::TexturePool;
use crate::gpu::volumetric_pass::VolumetricPass;
use crate::noise::{self, NoiseImage, NOISE_IMAGE_SIZE};
use crate::quality::{QualityMode, UndersamplingSettings};
use crate::shared_uniforms::SharedUniforms;
use crate::uniforms::{TextureHandle, UniformSet, UniformValue};
use crate::wind::WindAnimator;

/// Format of the main colour buffer the scene and clouds are drawn into.
pub const MAIN_COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

/// Seed of the procedural detail noise used when no image is configured.
const NOISE_SEED: u32 = 0x5eed;

/// The live cloud path.
pub enum CloudStage {
    Direct(VolumetricPass),
    LowRes {
        pass: LowResVolumetricPass,
        merge: MergeStage,
    },
}

impl CloudStage {
    fn new(device: &wgpu::Device, mode: QualityMode, width: u32, height: u32) -> Result<Self> {
        Ok(match mode {
            QualityMode::Direct => {
                CloudStage::Direct(VolumetricPass::new(device, MAIN_COLOR_FORMAT, width, height)?)
            }
            QualityMode::LowRes { factor } => CloudStage::LowRes {
                pass: LowResVolumetricPass::new(device, width, height, factor)?,
                merge: MergeStage::new(device, MAIN_COLOR_FORMAT, width, height, factor)?,
            },
        })
    }

    pub fn mode(&self) -> QualityMode {
        match self {
            CloudStage::Direct(_) => QualityMode::Direct,
            CloudStage::LowRes { pass, .. } => QualityMode::LowRes { factor: pass.factor() },
        }
    }

    /// The integrator's uniform set.
    pub fn cloud_uniforms(&self) -> &UniformSet {
        match self {
            CloudStage::Direct(pass) => pass.uniforms(),
            CloudStage::LowRes { pass, .. } => pass.uniforms(),
        }
    }

    fn cloud_uniforms_mut(&mut self) -> &mut UniformSet {
        match self {
            CloudStage::Direct(pass) => pass.uniforms_mut(),
            CloudStage::LowRes { pass, .. } => pass.uniforms_mut(),
        }
    }

    fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) -> Result<(), UniformError> {
        match self {
            CloudStage::Direct(pass) => pass.resize(width, height),
            CloudStage::LowRes { pass, merge } => {
                pass.resize(device, width, height)?;
                merge.resize(width, height, pass.factor())
            }
        }
    }

    fn update(&mut self, camera: &Camera, clock: &Clock) -> Result<(), UniformError> {
        match self {
            CloudStage::Direct(pass) => pass.update(camera, clock),
            CloudStage::LowRes { pass, .. } => pass.update(camera, clock),
        }
    }

    /// The merge set, if the low-res stage is live.
    fn merge_uniforms(&self) -> Option<&UniformSet> {
        match self {
            CloudStage::Direct(_) => None,
            CloudStage::LowRes { merge, .. } => Some(merge.uniforms()),
        }
    }

    /// Copy configuration from the outgoing stage. `parked_merge` supplies
    /// the merge settings when the outgoing stage has none.
    fn inherit(&mut self, previous: &CloudStage, parked_merge: &UniformSet) {
        let copied = self.cloud_uniforms_mut().copy_matching_from(previous.cloud_uniforms());
        if let CloudStage::LowRes { merge, .. } = self {
            let source = previous.merge_uniforms().unwrap_or(parked_merge);
            merge.uniforms_mut().copy_matching_from(source);
        }
        log::debug!("Carried {} cloud parameters across the quality switch", copied);
    }
}

/// Noise textures every cloud stage binds.
#[derive(Clone, Copy, Debug)]
struct NoiseTextures {
    image: TextureHandle,
    volume: TextureHandle,
}

impl NoiseTextures {
    fn bind(&self, set: &mut UniformSet) -> Result<(), UniformError> {
        set.set_texture(NOISE_TEXTURE, Some(self.image))?;
        set.set_texture(NOISE_VOLUME, Some(self.volume))
    }
}

pub struct PipelineDriver {
    ctx: GpuContext,
    camera: Camera,
    clock: Clock,
    wind: WindAnimator,
    undersampling: UndersamplingSettings,
    textures: TexturePool,
    noise: NoiseTextures,
    main: RenderTarget,
    scene: ScenePass,
    clouds: CloudStage,
    /// Merge settings kept while the direct path is live.
    parked_merge: UniformSet,
    antialias: AntialiasPass,
    width: u32,
    height: u32,
    frame: u64,
}

impl PipelineDriver {
    pub fn new(
        ctx: GpuContext,
        config: &PipelineConfig,
        output_format: wgpu::TextureFormat,
        width: u32,
        height: u32,
        clock: Clock,
    ) -> Result<Self> {
        let (width, height) = (width.max(1), height.max(1));
        let device = &ctx.device;

        let mut textures = TexturePool::new(device, &ctx.queue);
        let image = match &config.noise_texture {
            Some(path) => NoiseImage::from_file(path)?,
            None => NoiseImage::procedural(NOISE_IMAGE_SIZE, NOISE_SEED),
        };
        let volume_size = noise::clamp_volume_size(config.noise_volume_size);
        let noise = NoiseTextures {
            image: textures.upload_noise_image(device, &ctx.queue, &image),
            volume: textures.upload_noise_volume(
                device,
                &ctx.queue,
                volume_size,
                &noise::noise_volume_f16(volume_size),
            ),
        };

        let main = RenderTarget::new(
            device,
            RenderTargetDesc::new("Main", width, height, MAIN_COLOR_FORMAT).with_depth(),
        );
        let scene = ScenePass::new(device, MAIN_COLOR_FORMAT, &SceneMesh::demo_scene())?;
        let mode = config.undersampling.mode();
        let mut clouds = CloudStage::new(device, mode, width, height)?;
        noise.bind(clouds.cloud_uniforms_mut())?;
        let antialias = AntialiasPass::new(device, output_format, width, height, config.antialias)?;

        let mut camera = config.camera.clone();
        camera.set_viewport(width, height);

        let mut driver = Self {
            ctx,
            camera,
            clock,
            wind: config.wind,
            undersampling: config.undersampling,
            textures,
            noise,
            main,
            scene,
            clouds,
            parked_merge: clouds_uniforms::merge_uniforms()?,
            antialias,
            width,
            height,
            frame: 0,
        };
        let applied = driver.apply_overrides(&config.uniforms)?;
        log::info!(
            "Pipeline ready at {}x{}: {:?}, {} parameter overrides",
            width,
            height,
            mode,
            applied
        );
        Ok(driver)
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.ctx.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.ctx.queue
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn quality(&self) -> QualityMode {
        self.clouds.mode()
    }

    pub fn undersampling(&self) -> UndersamplingSettings {
        self.undersampling
    }

    pub fn cloud_stage(&self) -> &CloudStage {
        &self.clouds
    }

    /// Size of the low-res cloud targets, if the low-res stage is live.
    pub fn low_res_size(&self) -> Option<(u32, u32)> {
        match &self.clouds {
            CloudStage::Direct(_) => None,
            CloudStage::LowRes { pass, .. } => Some(pass.size()),
        }
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut Clock {
        &mut self.clock
    }

    pub fn wind_mut(&mut self) -> &mut WindAnimator {
        &mut self.wind
    }

    pub fn frame_count(&self) -> u64 {
        self.frame
    }

    pub fn antialias_uniforms(&self) -> &UniformSet {
        self.antialias.uniforms()
    }

    pub fn set_antialias(&mut self, enabled: bool) {
        self.antialias.set_enabled(enabled);
    }

    /// Fan-out view over every live uniform set, cloud integrator first.
    pub fn shared_uniforms(&mut self) -> SharedUniforms<'_> {
        let mut sets: Vec<&mut UniformSet> = Vec::with_capacity(3);
        match &mut self.clouds {
            CloudStage::Direct(pass) => sets.push(pass.uniforms_mut()),
            CloudStage::LowRes { pass, merge } => {
                sets.push(pass.uniforms_mut());
                sets.push(merge.uniforms_mut());
            }
        }
        sets.push(self.antialias.uniforms_mut());
        SharedUniforms::new(sets)
    }

    /// Live sets plus the parked merge set when the direct path is live.
    fn settings_uniforms(&mut self) -> SharedUniforms<'_> {
        let mut shared = Vec::with_capacity(3);
        match &mut self.clouds {
            CloudStage::Direct(pass) => {
                shared.push(pass.uniforms_mut());
                shared.push(&mut self.parked_merge);
            }
            CloudStage::LowRes { pass, merge } => {
                shared.push(pass.uniforms_mut());
                shared.push(merge.uniforms_mut());
            }
        }
        shared.push(self.antialias.uniforms_mut());
        SharedUniforms::new(shared)
    }

    /// Apply a JSON object of parameter overrides.
    ///
    /// Unlike [`PipelineDriver::shared_uniforms`], merge parameters are kept
    /// while the direct path is live and take effect on the next switch to
    /// low-res.
    pub fn apply_overrides(&mut self, overrides: &serde_json::Map<String, serde_json::Value>) -> Result<usize> {
        Ok(clouds_uniforms::apply_overrides(&mut self.settings_uniforms(), overrides)?)
    }

    /// Current value of `key` in the live sets.
    pub fn uniform(&mut self, key: &str) -> Option<UniformValue> {
        self.shared_uniforms().get(key).cloned()
    }

    pub fn set_undersampling_level(&mut self, level: u32) -> Result<bool> {
        self.set_undersampling(UndersamplingSettings {
            level,
            ..self.undersampling
        })
    }

    /// Switch cloud quality. Returns false when the effective mode is unchanged.
    ///
    /// On error the previous stage and settings stay live.
    pub fn set_undersampling(&mut self, settings: UndersamplingSettings) -> Result<bool> {
        let previous = self.clouds.mode();
        let next = settings.mode();
        if next == previous {
            self.undersampling = settings;
            log::debug!("Cloud quality already {:?}", next);
            return Ok(false);
        }

        let mut stage = CloudStage::new(&self.ctx.device, next, self.width, self.height)?;
        stage.inherit(&self.clouds, &self.parked_merge);
        // Copying carries the outgoing viewport and factor; restore ours.
        stage.resize(&self.ctx.device, self.width, self.height)?;
        self.noise.bind(stage.cloud_uniforms_mut())?;
        if let Some(merge) = self.clouds.merge_uniforms() {
            self.parked_merge = merge.clone();
        }
        self.clouds = stage;
        self.undersampling = settings;

        log::info!("Cloud quality {:?} -> {:?}", previous, next);
        Ok(true)
    }

    /// Recreate the main targets and propagate the new size to every stage.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        let (width, height) = (width.max(1), height.max(1));
        if (width, height) == (self.width, self.height) {
            return Ok(());
        }
        self.width = width;
        self.height = height;
        self.main.resize(&self.ctx.device, width, height);
        self.clouds.resize(&self.ctx.device, width, height)?;
        self.antialias.resize(width, height)?;
        self.camera.set_viewport(width, height);
        log::info!("Resized pipeline to {}x{}", width, height);
        Ok(())
    }

    /// Advance the clock by one tick.
    pub fn tick(&mut self) -> f32 {
        self.clock.tick()
    }

    /// Record and submit one frame into `target`, which must match the
    /// output format given at construction.
    pub fn render(&mut self, target: &wgpu::TextureView) -> Result<()> {
        let offset = self.wind.update(&self.clock);
        self.shared_uniforms().set(DETAILS_OFFSET, offset.into())?;
        self.clouds.update(&self.camera, &self.clock)?;

        let sun_direction = self
            .clouds
            .cloud_uniforms()
            .get(SUN_DIRECTION)
            .and_then(UniformValue::as_vec3)
            .unwrap_or(Vec3::Y);

        let device = &self.ctx.device;
        let queue = &self.ctx.queue;
        let (Some(main_color), Some(scene_depth)) = (self.main.color_view(), self.main.depth_view()) else {
            log::error!("Main target is missing an attachment");
            return Ok(());
        };

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Frame Encoder"),
        });

        self.scene.record(
            &mut encoder,
            queue,
            &self.camera,
            sun_direction,
            main_color,
            scene_depth,
        );

        match &mut self.clouds {
            CloudStage::Direct(pass) => {
                pass.record(
                    device,
                    queue,
                    &mut encoder,
                    &mut self.textures,
                    main_color,
                    scene_depth,
                );
            }
            CloudStage::LowRes { pass, merge } => {
                pass.record(device, queue, &mut encoder, &mut self.textures, scene_depth);
                merge.record(
                    device,
                    queue,
                    &mut encoder,
                    &mut self.textures,
                    pass,
                    main_color,
                    scene_depth,
                );
            }
        }

        self.antialias
            .record(device, queue, &mut encoder, &mut self.textures, &self.main, target);

        queue.submit(std::iter::once(encoder.finish()));
        context::pop_validation_scope(device, "Frame")?;
        self.frame += 1;
        log::debug!("Rendered frame {} at t={:.3}s", self.frame, self.clock.elapsed_seconds());
        Ok(())
    }
}
