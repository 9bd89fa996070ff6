//! Headless GPU device and offscreen output.

use crate::error::{PipelineError, Result};
use crate::gpu::lowres_pass::CLOUD_COLOR_FORMAT;
use crate::gpu::pipeline_driver::MAIN_COLOR_FORMAT;
use crate::gpu::render_target::DEPTH_FORMAT;
use crate::gpu::textures::NOISE_VOLUME_FORMAT;

/// What the passes do with one texture format.
#[derive(Clone, Copy, Debug)]
pub struct FormatRequirement {
    pub format: wgpu::TextureFormat,
    pub usages: wgpu::TextureUsages,
    pub flags: wgpu::TextureFormatFeatureFlags,
}

const fn requirement(
    format: wgpu::TextureFormat,
    usages: wgpu::TextureUsages,
    flags: wgpu::TextureFormatFeatureFlags,
) -> FormatRequirement {
    FormatRequirement { format, usages, flags }
}

/// Formats every frame renders to or samples from.
pub const REQUIRED_FORMATS: [FormatRequirement; 5] = [
    // Scene and clouds are blended into it, antialiasing filters it.
    requirement(
        MAIN_COLOR_FORMAT,
        wgpu::TextureUsages::RENDER_ATTACHMENT.union(wgpu::TextureUsages::TEXTURE_BINDING),
        wgpu::TextureFormatFeatureFlags::BLENDABLE.union(wgpu::TextureFormatFeatureFlags::FILTERABLE),
    ),
    requirement(
        CLOUD_COLOR_FORMAT,
        wgpu::TextureUsages::RENDER_ATTACHMENT.union(wgpu::TextureUsages::TEXTURE_BINDING),
        wgpu::TextureFormatFeatureFlags::empty(),
    ),
    // Scene, pooled and cloud depth are all read back as textures.
    requirement(
        DEPTH_FORMAT,
        wgpu::TextureUsages::RENDER_ATTACHMENT.union(wgpu::TextureUsages::TEXTURE_BINDING),
        wgpu::TextureFormatFeatureFlags::empty(),
    ),
    requirement(
        NOISE_VOLUME_FORMAT,
        wgpu::TextureUsages::TEXTURE_BINDING.union(wgpu::TextureUsages::COPY_DST),
        wgpu::TextureFormatFeatureFlags::FILTERABLE,
    ),
    requirement(
        OffscreenTarget::FORMAT,
        wgpu::TextureUsages::RENDER_ATTACHMENT.union(wgpu::TextureUsages::COPY_SRC),
        wgpu::TextureFormatFeatureFlags::empty(),
    ),
];

/// Describe what `features` lacks for `required`, if anything.
pub fn missing_capability(required: &FormatRequirement, features: &wgpu::TextureFormatFeatures) -> Option<String> {
    let usages = required.usages - features.allowed_usages;
    let flags = required.flags - features.flags;
    if usages.is_empty() && flags.is_empty() {
        return None;
    }
    Some(format!(
        "{:?} lacks usages {:?} and features {:?}",
        required.format, usages, flags
    ))
}

/// Check `adapter` against [`REQUIRED_FORMATS`].
fn check_adapter(adapter: &wgpu::Adapter, info: &wgpu::AdapterInfo) -> Result<()> {
    let missing: Vec<String> = REQUIRED_FORMATS
        .iter()
        .filter_map(|required| missing_capability(required, &adapter.get_texture_format_features(required.format)))
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    Err(PipelineError::UnsupportedAdapter {
        adapter: format!("{} ({:?})", info.name, info.backend),
        reason: missing.join("; "),
    })
}

/// Run `build` inside a validation error scope, so a rejected GPU object
/// surfaces as [`PipelineError::Gpu`] instead of reaching the device's
/// uncaptured-error handler.
pub fn validated<T>(device: &wgpu::Device, label: &str, build: impl FnOnce() -> T) -> Result<T> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = build();
    pop_validation_scope(device, label)?;
    Ok(value)
}

/// Close a validation scope opened with `push_error_scope`.
pub fn pop_validation_scope(device: &wgpu::Device, label: &str) -> Result<()> {
    match pollster::block_on(device.pop_error_scope()) {
        Some(error) => Err(PipelineError::Gpu {
            label: label.to_string(),
            message: error.to_string(),
        }),
        None => Ok(()),
    }
}

/// Device and queue shared by every pass.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl GpuContext {
    /// Open a device without a surface. Fails with
    /// [`PipelineError::UnsupportedAdapter`] when the adapter cannot render
    /// the pipeline's formats.
    pub async fn headless() -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(PipelineError::NoAdapter)?;

        let info = adapter.get_info();
        check_adapter(&adapter, &info)?;
        log::info!("Using adapter '{}' ({:?})", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("cloudlayer device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits()),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await?;

        Ok(Self { device, queue })
    }

    /// Blocking wrapper around [`headless`](Self::headless).
    pub fn headless_blocking() -> Result<Self> {
        pollster::block_on(Self::headless())
    }
}

/// Offscreen stand-in for the display surface, with CPU readback.
pub struct OffscreenTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    buffer: wgpu::Buffer,
    width: u32,
    height: u32,
    padded_bytes_per_row: u32,
}

impl OffscreenTarget {
    pub const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

    pub fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Offscreen Output"),
            size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        // Rows in a texture-to-buffer copy must be 256-byte aligned.
        let unpadded_bytes_per_row = 4 * width;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(align) * align;

        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Offscreen Readback Buffer"),
            size: u64::from(padded_bytes_per_row) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        Self {
            texture,
            view,
            buffer,
            width,
            height,
            padded_bytes_per_row,
        }
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Copy the last rendered frame back as tightly packed RGBA8 rows.
    pub fn read_rgba8(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<Vec<u8>> {
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Readback Encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &self.buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(self.padded_bytes_per_row),
                    rows_per_image: Some(self.height),
                },
            },
            self.texture.size(),
        );
        queue.submit(Some(encoder.finish()));

        let slice = self.buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| PipelineError::Readback(e.to_string()))?
            .map_err(|e| PipelineError::Readback(e.to_string()))?;

        let row_bytes = (self.width * 4) as usize;
        let mut pixels = Vec::with_capacity(row_bytes * self.height as usize);
        {
            let data = slice.get_mapped_range();
            for row in data.chunks_exact(self.padded_bytes_per_row as usize) {
                pixels.extend_from_slice(&row[..row_bytes]);
            }
        }
        self.buffer.unmap();
        Ok(pixels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(usages: wgpu::TextureUsages, flags: wgpu::TextureFormatFeatureFlags) -> wgpu::TextureFormatFeatures {
        wgpu::TextureFormatFeatures {
            allowed_usages: usages,
            flags,
        }
    }

    #[test]
    fn test_missing_render_attachment() {
        let depth = REQUIRED_FORMATS
            .iter()
            .find(|r| r.format == DEPTH_FORMAT)
            .unwrap();
        let sample_only = features(
            wgpu::TextureUsages::TEXTURE_BINDING,
            wgpu::TextureFormatFeatureFlags::empty(),
        );
        let reason = missing_capability(depth, &sample_only).unwrap();
        assert!(reason.contains("RENDER_ATTACHMENT"), "{reason}");

        let full = features(wgpu::TextureUsages::all(), wgpu::TextureFormatFeatureFlags::empty());
        assert_eq!(missing_capability(depth, &full), None);
    }

    #[test]
    fn test_missing_blending() {
        let main = REQUIRED_FORMATS
            .iter()
            .find(|r| r.format == MAIN_COLOR_FORMAT)
            .unwrap();
        let unblendable = features(wgpu::TextureUsages::all(), wgpu::TextureFormatFeatureFlags::FILTERABLE);
        let reason = missing_capability(main, &unblendable).unwrap();
        assert!(reason.contains("BLENDABLE"), "{reason}");
    }
}
