//! Noise assets consumed by the cloud integrator.
//!
//! Two textures feed the density function: a tiling 3D spiral-noise volume
//! for the large-scale shape, and a 2D RG noise image for the details. The RG
//! image can come from a PNG or be generated here.

use std::path::Path;

use half::f16;

use crate::error::{PipelineError, Result};

/// Length of the perpendicular vector added per spiral octave.
const SPIRAL_NUDGE: f32 = 0.739513;
/// Domain scale applied before evaluating the spiral.
const SPIRAL_SCALE: f32 = 100.0;
const SPIRAL_OCTAVES: usize = 5;
const SPIRAL_FREQUENCY_STEP: f32 = 1.33733;

/// Default edge length of the generated 3D noise volume.
pub const DEFAULT_VOLUME_SIZE: u32 = 64;

/// Largest volume edge every adapter accepts for a 3D texture.
pub const MAX_VOLUME_SIZE: u32 = 256;

/// Edge length of the procedural 2D noise image.
pub const NOISE_IMAGE_SIZE: u32 = 256;

/// Texel offset between the R and G channels of the 2D noise. The integrator
/// reads both channels to interpolate between adjacent Z slices.
pub const RG_CHANNEL_OFFSET: (u32, u32) = (37, 17);

/// Spiral noise at a point in `[0, 1)^3`.
///
/// Successively adds sine waves while rotating the XZ plane and raising the
/// frequency. Output stays within about `[-6.1, 6.1]`.
pub fn spiral_noise(x: f32, y: f32, z: f32) -> f32 {
    let normalizer = 1.0 / (1.0 + SPIRAL_NUDGE * SPIRAL_NUDGE).sqrt();
    let (mut x, y, mut z) = (x * SPIRAL_SCALE, y * SPIRAL_SCALE, z * SPIRAL_SCALE);

    let mut n = 0.0;
    let mut iter = 1.0;
    for _ in 0..SPIRAL_OCTAVES {
        n += ((y * iter).sin() + (x * iter).cos()) / iter;

        let rx = z * SPIRAL_NUDGE * normalizer;
        let rz = -x * SPIRAL_NUDGE * normalizer;
        x = rx;
        z = rz;

        iter *= SPIRAL_FREQUENCY_STEP;
    }
    n
}

/// Clamp a configured volume edge to `1..=MAX_VOLUME_SIZE`.
pub fn clamp_volume_size(size: u32) -> u32 {
    if size > MAX_VOLUME_SIZE {
        log::warn!("Noise volume size {} clamped to {}", size, MAX_VOLUME_SIZE);
    }
    size.clamp(1, MAX_VOLUME_SIZE)
}

/// Number of samples in a volume of edge `size`.
pub fn volume_len(size: u32) -> usize {
    let size = size as usize;
    size * size * size
}

/// `size^3` spiral-noise samples, X fastest, then Y, then Z. `size` is
/// clamped with [`clamp_volume_size`].
pub fn noise_volume(size: u32) -> Vec<f32> {
    let size = clamp_volume_size(size);
    let inv = 1.0 / size as f32;
    let mut out = Vec::with_capacity(volume_len(size));
    for z in 0..size {
        for y in 0..size {
            for x in 0..size {
                out.push(spiral_noise(x as f32 * inv, y as f32 * inv, z as f32 * inv));
            }
        }
    }
    out
}

/// [`noise_volume`] converted for an `R16Float` upload.
pub fn noise_volume_f16(size: u32) -> Vec<f16> {
    noise_volume(size).into_iter().map(f16::from_f32).collect()
}

/// RGBA8 noise image for the detail layer.
#[derive(Clone, Debug)]
pub struct NoiseImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl NoiseImage {
    /// Decode a PNG (or any format `image` understands) into RGBA8.
    pub fn from_file(path: &Path) -> Result<Self> {
        let img = image::open(path).map_err(|e| PipelineError::Asset {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let rgba = img.to_rgba8();
        log::info!(
            "Loaded noise texture {} ({}x{})",
            path.display(),
            rgba.width(),
            rgba.height()
        );
        Ok(Self {
            width: rgba.width(),
            height: rgba.height(),
            rgba: rgba.into_raw(),
        })
    }

    /// Deterministic RG value noise. G at `(x, y)` equals R at
    /// `(x - 37, y - 17)`, wrapping at the edges.
    pub fn procedural(size: u32, seed: u32) -> Self {
        let size = size.max(1);
        let red: Vec<u8> = (0..size * size)
            .map(|i| (hash_u32(i ^ seed.wrapping_mul(0x9e37_79b9)) >> 24) as u8)
            .collect();

        let (ox, oy) = RG_CHANNEL_OFFSET;
        let mut rgba = Vec::with_capacity((size * size * 4) as usize);
        for y in 0..size {
            for x in 0..size {
                let sx = (x + size - ox % size) % size;
                let sy = (y + size - oy % size) % size;
                rgba.extend_from_slice(&[
                    red[(y * size + x) as usize],
                    red[(sy * size + sx) as usize],
                    0,
                    255,
                ]);
            }
        }
        Self { width: size, height: size, rgba }
    }

    pub fn texel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * self.width + x) * 4) as usize;
        [self.rgba[i], self.rgba[i + 1], self.rgba[i + 2], self.rgba[i + 3]]
    }
}

// Integer hash with good avalanche; lowbias32.
fn hash_u32(mut x: u32) -> u32 {
    x ^= x >> 16;
    x = x.wrapping_mul(0x7feb_352d);
    x ^= x >> 15;
    x = x.wrapping_mul(0x846c_a68b);
    x ^= x >> 16;
    x
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spiral_noise_origin() {
        // sin(0) + cos(0) on every octave, divided by the running frequency.
        let mut expected = 0.0;
        let mut iter = 1.0f32;
        for _ in 0..SPIRAL_OCTAVES {
            expected += 1.0 / iter;
            iter *= SPIRAL_FREQUENCY_STEP;
        }
        assert!((spiral_noise(0.0, 0.0, 0.0) - expected).abs() < 1e-5);
    }

    #[test]
    fn test_noise_volume_layout() {
        let size = 4;
        let volume = noise_volume(size);
        assert_eq!(volume.len(), 64);
        let (x, y, z) = (1u32, 2u32, 3u32);
        let idx = (z * size * size + y * size + x) as usize;
        let expected = spiral_noise(0.25, 0.5, 0.75);
        assert_eq!(volume[idx], expected);
        assert!(volume.iter().all(|v| v.is_finite() && v.abs() < 6.1));
    }

    #[test]
    fn test_volume_size_is_clamped() {
        assert_eq!(clamp_volume_size(0), 1);
        assert_eq!(clamp_volume_size(64), 64);
        // 2000^3 overflows u32.
        assert_eq!(clamp_volume_size(2000), MAX_VOLUME_SIZE);
        assert_eq!(volume_len(2000), 8_000_000_000);
        assert_eq!(volume_len(MAX_VOLUME_SIZE), 1 << 24);
    }

    #[test]
    fn test_f16_volume_matches() {
        let full = noise_volume(3);
        let half = noise_volume_f16(3);
        for (a, b) in full.iter().zip(&half) {
            assert!((a - b.to_f32()).abs() < 5e-3);
        }
    }

    #[test]
    fn test_procedural_rg_offset() {
        let img = NoiseImage::procedural(NOISE_IMAGE_SIZE, 7);
        assert_eq!(img.rgba.len(), (NOISE_IMAGE_SIZE * NOISE_IMAGE_SIZE * 4) as usize);
        for (x, y) in [(40u32, 20u32), (100, 200), (255, 255)] {
            assert_eq!(img.texel(x, y)[1], img.texel(x - 37, y - 17)[0]);
        }
        // Wraps around the left and top edges.
        assert_eq!(img.texel(0, 0)[1], img.texel(256 - 37, 256 - 17)[0]);
    }

    #[test]
    fn test_procedural_is_deterministic() {
        let a = NoiseImage::procedural(32, 1);
        let b = NoiseImage::procedural(32, 1);
        let c = NoiseImage::procedural(32, 2);
        assert_eq!(a.rgba, b.rgba);
        assert_ne!(a.rgba, c.rgba);
    }

    #[test]
    fn test_missing_file_is_asset_error() {
        let err = NoiseImage::from_file(Path::new("/nonexistent/noise.png")).unwrap_err();
        assert!(matches!(err, PipelineError::Asset { .. }));
    }
}
