//! Offscreen colour/depth attachments.

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

#[derive(Clone, Debug, PartialEq)]
pub struct RenderTargetDesc {
    pub label: &'static str,
    pub width: u32,
    pub height: u32,
    /// `None` for a depth-only target.
    pub color_format: Option<wgpu::TextureFormat>,
    pub has_depth: bool,
    pub filter: wgpu::FilterMode,
}

impl RenderTargetDesc {
    pub fn new(label: &'static str, width: u32, height: u32, color_format: wgpu::TextureFormat) -> Self {
        Self {
            label,
            width: width.max(1),
            height: height.max(1),
            color_format: Some(color_format),
            has_depth: false,
            filter: wgpu::FilterMode::Linear,
        }
    }

    pub fn depth_only(label: &'static str, width: u32, height: u32) -> Self {
        Self {
            color_format: None,
            has_depth: true,
            filter: wgpu::FilterMode::Nearest,
            ..Self::new(label, width, height, DEPTH_FORMAT)
        }
    }

    pub fn with_depth(mut self) -> Self {
        self.has_depth = true;
        self
    }

    pub fn with_filter(mut self, filter: wgpu::FilterMode) -> Self {
        self.filter = filter;
        self
    }

    fn extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: 1,
        }
    }
}

/// An optional colour texture and optional depth texture of the same size.
pub struct RenderTarget {
    desc: RenderTargetDesc,
    color: Option<(wgpu::Texture, wgpu::TextureView)>,
    depth: Option<(wgpu::Texture, wgpu::TextureView)>,
    sampler: wgpu::Sampler,
}

impl RenderTarget {
    pub fn new(device: &wgpu::Device, desc: RenderTargetDesc) -> Self {
        let color = desc
            .color_format
            .map(|format| create_attachment(device, &desc, format, "colour"));
        let depth = desc
            .has_depth
            .then(|| create_attachment(device, &desc, DEPTH_FORMAT, "depth"));

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(desc.label),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: desc.filter,
            min_filter: desc.filter,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        log::debug!("Created render target '{}' {}x{}", desc.label, desc.width, desc.height);
        Self {
            desc,
            color,
            depth,
            sampler,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.desc.width, self.desc.height)
    }

    pub fn color_view(&self) -> Option<&wgpu::TextureView> {
        self.color.as_ref().map(|(_, view)| view)
    }

    pub fn depth_view(&self) -> Option<&wgpu::TextureView> {
        self.depth.as_ref().map(|(_, view)| view)
    }

    pub fn sampler(&self) -> &wgpu::Sampler {
        &self.sampler
    }

    /// Recreate the attachments at a new size. Returns false when the size is unchanged.
    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) -> bool {
        let (width, height) = (width.max(1), height.max(1));
        if self.size() == (width, height) {
            return false;
        }
        self.recreate(device, width, height);
        true
    }

    /// Check the attachments against the size the owner expects and recreate
    /// them if they disagree.
    pub fn ensure_size(&mut self, device: &wgpu::Device, width: u32, height: u32) -> bool {
        let (width, height) = (width.max(1), height.max(1));
        let Some(actual) = self.attachment_size() else {
            return false;
        };
        if actual == (width, height) {
            return false;
        }
        log::warn!(
            "Render target '{}' is {}x{} but {}x{} is expected, recreating",
            self.desc.label,
            actual.0,
            actual.1,
            width,
            height
        );
        self.recreate(device, width, height);
        true
    }

    fn attachment_size(&self) -> Option<(u32, u32)> {
        let (texture, _) = self.color.as_ref().or(self.depth.as_ref())?;
        Some((texture.width(), texture.height()))
    }

    fn recreate(&mut self, device: &wgpu::Device, width: u32, height: u32) {
        let desc = RenderTargetDesc {
            width,
            height,
            ..self.desc.clone()
        };
        *self = Self::new(device, desc);
    }
}

fn create_attachment(
    device: &wgpu::Device,
    desc: &RenderTargetDesc,
    format: wgpu::TextureFormat,
    role: &str,
) -> (wgpu::Texture, wgpu::TextureView) {
    let label = format!("{} {}", desc.label, role);
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(&label),
        size: desc.extent(),
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_desc_clamps_to_one_texel() {
        let desc = RenderTargetDesc::new("t", 0, 0, wgpu::TextureFormat::Rgba16Float);
        assert_eq!((desc.width, desc.height), (1, 1));
        assert!(!desc.has_depth);
    }

    #[test]
    fn test_depth_only_desc() {
        let desc = RenderTargetDesc::depth_only("pooled", 120, 68);
        assert_eq!(desc.color_format, None);
        assert!(desc.has_depth);
        assert_eq!(desc.filter, wgpu::FilterMode::Nearest);
        assert_eq!((desc.width, desc.height), (120, 68));
    }
}
