//! Cloud quality selection and undersampling math.
//!
//! Pure helpers shared by the GPU passes and the tests: the undersampling
//! factor, the low-resolution target size, and a CPU reference of the
//! max-pooled depth downsample the low-res pass performs on the GPU.

use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Levels above this are clamped. A factor of 64 already reduces 4K to 60x34.
pub const MAX_UNDERSAMPLING_LEVEL: u32 = 6;

/// `2^level`, clamped to [`MAX_UNDERSAMPLING_LEVEL`].
pub fn undersampling_factor(level: u32) -> u32 {
    if level > MAX_UNDERSAMPLING_LEVEL {
        log::warn!(
            "Undersampling level {} clamped to {}",
            level,
            MAX_UNDERSAMPLING_LEVEL
        );
    }
    1 << level.min(MAX_UNDERSAMPLING_LEVEL)
}

/// Size of the low-resolution target for a full-resolution size and factor.
/// Never smaller than 1x1.
pub fn undersampled_size(width: u32, height: u32, factor: u32) -> (u32, u32) {
    let factor = factor.max(1);
    (
        width.div_ceil(factor).max(1),
        height.div_ceil(factor).max(1),
    )
}

/// Which cloud path is live.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QualityMode {
    /// Full-resolution integrator composited straight onto the main buffer.
    Direct,
    /// Integrator at `1/factor` resolution, then merged at full resolution.
    LowRes { factor: u32 },
}

impl QualityMode {
    /// Full-resolution pixels per low-res texel along one axis.
    pub fn factor(&self) -> u32 {
        match self {
            QualityMode::Direct => 1,
            QualityMode::LowRes { factor } => *factor,
        }
    }

    pub fn is_low_res(&self) -> bool {
        matches!(self, QualityMode::LowRes { .. })
    }
}

/// User-facing undersampling knobs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UndersamplingSettings {
    /// 0 selects the direct path, anything above selects low-res.
    pub level: u32,
    /// Replaces `2^level` as the factor when `level > 0`. Need not be a power
    /// of two.
    pub divisor: Option<u32>,
}

impl Default for UndersamplingSettings {
    fn default() -> Self {
        Self { level: 0, divisor: None }
    }
}

impl UndersamplingSettings {
    pub fn with_level(level: u32) -> Self {
        Self { level, ..Self::default() }
    }

    pub fn mode(&self) -> QualityMode {
        if self.level == 0 {
            return QualityMode::Direct;
        }
        let factor = match self.divisor {
            Some(d) => d.max(1),
            None => undersampling_factor(self.level),
        };
        QualityMode::LowRes { factor }
    }
}

/// Full-resolution coordinates pooled into low-res texel `index` along one
/// axis of length `extent`.
///
/// The window is centred on `index * factor + factor / 2` with half-extent
/// `factor / 2 + 1`, half-open, clamped to `0..extent`.
pub fn pool_window(index: u32, factor: u32, extent: u32) -> Range<u32> {
    let factor = factor.max(1);
    let centre = index * factor + factor / 2;
    let half = factor / 2 + 1;
    let start = centre.saturating_sub(half).min(extent);
    let end = (centre + half).min(extent);
    start..end
}

/// Full-resolution coordinate a low-res texel casts its ray through along
/// one axis: the centre of its pool window, kept inside `0..extent`.
///
/// Mirrors `ray_uv` in the cloud shaders. With `factor == 1` this is the
/// identity, so the direct path samples every pixel at its own centre.
pub fn ray_pixel(index: u32, factor: u32, extent: u32) -> u32 {
    let factor = factor.max(1);
    (index * factor + factor / 2).min(extent.saturating_sub(1))
}

/// CPU reference of the depth downsample.
///
/// `depth` is row-major, `width * height` values in `[0, 1]` with 1 at the far
/// plane. Each output texel is the maximum (farthest) depth of its window.
/// Returns the pooled values and the low-res size.
pub fn max_pool_depth(depth: &[f32], width: u32, height: u32, factor: u32) -> (Vec<f32>, u32, u32) {
    assert_eq!(depth.len(), (width * height) as usize, "depth buffer size mismatch");
    let (low_w, low_h) = undersampled_size(width, height, factor);
    let mut out = Vec::with_capacity((low_w * low_h) as usize);
    for ly in 0..low_h {
        let rows = pool_window(ly, factor, height);
        for lx in 0..low_w {
            let cols = pool_window(lx, factor, width);
            let mut farthest = 0.0f32;
            for y in rows.clone() {
                let row = &depth[(y * width) as usize..((y + 1) * width) as usize];
                for &d in &row[cols.start as usize..cols.end as usize] {
                    farthest = farthest.max(d);
                }
            }
            out.push(farthest);
        }
    }
    (out, low_w, low_h)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factor() {
        assert_eq!(undersampling_factor(0), 1);
        assert_eq!(undersampling_factor(1), 2);
        assert_eq!(undersampling_factor(4), 16);
        assert_eq!(undersampling_factor(40), 1 << MAX_UNDERSAMPLING_LEVEL);
    }

    #[test]
    fn test_undersampled_size() {
        assert_eq!(undersampled_size(1920, 1080, 16), (120, 68));
        assert_eq!(undersampled_size(1920, 1080, 1), (1920, 1080));
        assert_eq!(undersampled_size(7, 3, 4), (2, 1));
        assert_eq!(undersampled_size(1, 1, 64), (1, 1));
        assert_eq!(undersampled_size(0, 0, 2), (1, 1));
    }

    #[test]
    fn test_mode_selection() {
        assert_eq!(UndersamplingSettings::with_level(0).mode(), QualityMode::Direct);
        assert_eq!(
            UndersamplingSettings::with_level(2).mode(),
            QualityMode::LowRes { factor: 4 }
        );
        let custom = UndersamplingSettings { level: 1, divisor: Some(3) };
        assert_eq!(custom.mode(), QualityMode::LowRes { factor: 3 });
        // Level 0 ignores the divisor.
        let direct = UndersamplingSettings { level: 0, divisor: Some(3) };
        assert_eq!(direct.mode(), QualityMode::Direct);
    }

    #[test]
    fn test_pool_window() {
        assert_eq!(pool_window(0, 4, 100), 0..5);
        assert_eq!(pool_window(1, 4, 100), 3..9);
        assert_eq!(pool_window(2, 1, 100), 1..3);
        // Clamped at the far edge.
        assert_eq!(pool_window(24, 4, 100), 95..100);
    }

    #[test]
    fn test_ray_pixel() {
        assert_eq!(ray_pixel(0, 1, 64), 0);
        assert_eq!(ray_pixel(5, 1, 64), 5);
        assert_eq!(ray_pixel(0, 4, 64), 2);
        assert_eq!(ray_pixel(1, 4, 64), 6);
        // The last texel of 1921 / 16 overhangs the image and is clamped
        // back onto the last column, still inside its pool window.
        assert_eq!(ray_pixel(120, 16, 1921), 1920);
        assert!(pool_window(120, 16, 1921).contains(&1920));
        assert_eq!(ray_pixel(120, 16, 1921) / 16, 120);
    }

    #[test]
    fn test_max_pool_keeps_farthest() {
        // 4x4 scene with a near object in the top-left quadrant, sky elsewhere.
        #[rustfmt::skip]
        let depth = vec![
            0.2, 0.2, 1.0, 1.0,
            0.2, 0.2, 1.0, 1.0,
            1.0, 1.0, 1.0, 1.0,
            1.0, 1.0, 1.0, 1.0,
        ];
        let (pooled, w, h) = max_pool_depth(&depth, 4, 4, 2);
        assert_eq!((w, h), (2, 2));
        // The window of texel (0, 0) reaches past the object into the sky.
        assert_eq!(pooled, vec![1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_max_pool_uniform_input() {
        let depth = vec![0.5; 9 * 5];
        let (pooled, w, h) = max_pool_depth(&depth, 9, 5, 4);
        assert_eq!((w, h), (3, 2));
        assert!(pooled.iter().all(|&d| d == 0.5));
    }
}
