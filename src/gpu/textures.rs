//! GPU texture storage addressed by [`TextureHandle`].
//!
//! Uniform sets hold handles, never GPU objects. A cell that is still `None`
//! when a frame is drawn binds a neutral 1x1 texture of the right dimension
//! so the frame renders without the missing input.

use std::collections::HashSet;

use half::f16;

use crate::noise::{self, NoiseImage};
use crate::program::TextureDimension;
use crate::uniforms::TextureHandle;

/// Format of uploaded noise volumes.
pub const NOISE_VOLUME_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R16Float;

struct PooledTexture {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
    dimension: TextureDimension,
}

pub struct TexturePool {
    textures: Vec<PooledTexture>,
    fallback_2d: PooledTexture,
    fallback_3d: PooledTexture,
    reported_missing: HashSet<String>,
}

impl TexturePool {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        // Mid grey reads as zero after the integrator's `2x - 1` remap.
        let fallback_2d = create_texture(
            device,
            queue,
            "Fallback 2D",
            wgpu::Extent3d { width: 1, height: 1, depth_or_array_layers: 1 },
            wgpu::TextureFormat::Rgba8Unorm,
            TextureDimension::D2,
            &[128, 128, 128, 255],
            4,
        );
        let fallback_3d = create_texture(
            device,
            queue,
            "Fallback 3D",
            wgpu::Extent3d { width: 1, height: 1, depth_or_array_layers: 1 },
            NOISE_VOLUME_FORMAT,
            TextureDimension::D3,
            bytemuck::cast_slice(&[f16::ZERO]),
            2,
        );
        Self {
            textures: Vec::new(),
            fallback_2d,
            fallback_3d,
            reported_missing: HashSet::new(),
        }
    }

    fn insert(&mut self, texture: PooledTexture) -> TextureHandle {
        let handle = TextureHandle::from_raw(self.textures.len() as u32);
        self.textures.push(texture);
        handle
    }

    /// Upload an RGBA8 noise image as a 2D texture.
    pub fn upload_noise_image(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, image: &NoiseImage) -> TextureHandle {
        let texture = create_texture(
            device,
            queue,
            "Noise Texture",
            wgpu::Extent3d {
                width: image.width,
                height: image.height,
                depth_or_array_layers: 1,
            },
            wgpu::TextureFormat::Rgba8Unorm,
            TextureDimension::D2,
            &image.rgba,
            4,
        );
        self.insert(texture)
    }

    /// Upload a cubic `R16Float` volume, X fastest.
    pub fn upload_noise_volume(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        size: u32,
        samples: &[f16],
    ) -> TextureHandle {
        debug_assert_eq!(samples.len(), noise::volume_len(size));
        let texture = create_texture(
            device,
            queue,
            "Noise Volume",
            wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: size,
            },
            NOISE_VOLUME_FORMAT,
            TextureDimension::D3,
            bytemuck::cast_slice(samples),
            2,
        );
        self.insert(texture)
    }

    /// View for `handle`, or the fallback of `dimension` when the handle is
    /// absent, unknown, or of the wrong dimension.
    pub fn view(&self, handle: Option<TextureHandle>, dimension: TextureDimension) -> &wgpu::TextureView {
        let pooled = handle
            .and_then(|h| self.textures.get(h.raw() as usize))
            .filter(|t| t.dimension == dimension);
        match pooled {
            Some(texture) => &texture.view,
            None => match dimension {
                TextureDimension::D2 => &self.fallback_2d.view,
                TextureDimension::D3 => &self.fallback_3d.view,
            },
        }
    }

    /// Warn that `key` has no texture yet. Logged once per key.
    pub fn report_missing(&mut self, key: &str) {
        if self.reported_missing.insert(key.to_string()) {
            log::warn!("Texture '{}' is not ready, binding a fallback", key);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn create_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    label: &str,
    size: wgpu::Extent3d,
    format: wgpu::TextureFormat,
    dimension: TextureDimension,
    data: &[u8],
    bytes_per_texel: u32,
) -> PooledTexture {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: match dimension {
            TextureDimension::D2 => wgpu::TextureDimension::D2,
            TextureDimension::D3 => wgpu::TextureDimension::D3,
        },
        format,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });

    queue.write_texture(
        wgpu::ImageCopyTexture {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        data,
        wgpu::ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(size.width * bytes_per_texel),
            rows_per_image: Some(size.height),
        },
        size,
    );

    let view = texture.create_view(&wgpu::TextureViewDescriptor {
        label: Some(label),
        dimension: Some(dimension.view_dimension()),
        ..Default::default()
    });
    PooledTexture {
        _texture: texture,
        view,
        dimension,
    }
}
