use cloudlayer::quality::{
    max_pool_depth, pool_window, ray_pixel, undersampled_size, UndersamplingSettings,
};
use proptest::prelude::*;

/// Depth buffer with its dimensions and an undersampling factor.
fn depth_buffer() -> impl Strategy<Value = (Vec<f32>, u32, u32, u32)> {
    (1u32..48, 1u32..48, 1u32..10).prop_flat_map(|(w, h, f)| {
        (
            proptest::collection::vec(0.0f32..=1.0, (w * h) as usize),
            Just(w),
            Just(h),
            Just(f),
        )
    })
}

proptest! {
    #[test]
    fn pooled_depth_is_window_maximum((depth, w, h, f) in depth_buffer()) {
        let (pooled, low_w, low_h) = max_pool_depth(&depth, w, h, f);
        prop_assert_eq!(pooled.len(), (low_w * low_h) as usize);

        for ly in 0..low_h {
            for lx in 0..low_w {
                let value = pooled[(ly * low_w + lx) as usize];
                let mut expected = 0.0f32;
                for y in pool_window(ly, f, h) {
                    for x in pool_window(lx, f, w) {
                        let sample = depth[(y * w + x) as usize];
                        prop_assert!(value >= sample);
                        expected = expected.max(sample);
                    }
                }
                prop_assert_eq!(value, expected);
            }
        }
    }

    #[test]
    fn every_pixel_is_in_its_texel_window(w in 1u32..4096, f in 1u32..65) {
        let (low_w, _) = undersampled_size(w, 1, f);
        for x in [0, w / 3, w / 2, w - 1] {
            let texel = x / f;
            prop_assert!(texel < low_w);
            prop_assert!(pool_window(texel, f, w).contains(&x));
        }
    }

    #[test]
    fn ray_passes_through_pooled_window(w in 1u32..4096, f in 1u32..65) {
        // The ray of every low-res texel must hit a pixel whose depth was
        // pooled into that texel, and that pixel must map back to it when
        // the merge upsamples.
        let (low_w, _) = undersampled_size(w, 1, f);
        for texel in [0, low_w / 2, low_w - 1] {
            let x = ray_pixel(texel, f, w);
            prop_assert!(x < w);
            prop_assert!(pool_window(texel, f, w).contains(&x));
            prop_assert_eq!(x / f, texel);
        }
    }

    #[test]
    fn narrow_occluder_survives_pooling(
        w in 4u32..64,
        h in 4u32..64,
        f in 2u32..9,
        ox in 0u32..64,
        oy in 0u32..64,
    ) {
        // One far pixel among near geometry: every texel whose window covers
        // it must report the far depth.
        let (ox, oy) = (ox % w, oy % h);
        let mut depth = vec![0.25f32; (w * h) as usize];
        depth[(oy * w + ox) as usize] = 1.0;

        let (pooled, low_w, _) = max_pool_depth(&depth, w, h, f);
        let (lx, ly) = (ox / f, oy / f);
        prop_assert_eq!(pooled[(ly * low_w + lx) as usize], 1.0);
    }

    #[test]
    fn undersampled_size_is_ceiling(w in 1u32..8192, h in 1u32..8192, f in 1u32..128) {
        let (low_w, low_h) = undersampled_size(w, h, f);
        prop_assert!(low_w >= 1 && low_h >= 1);
        prop_assert!((low_w - 1) * f < w && w <= low_w * f);
        prop_assert!((low_h - 1) * f < h && h <= low_h * f);
    }

    #[test]
    fn level_selects_mode(level in 0u32..12) {
        let mode = UndersamplingSettings::with_level(level).mode();
        prop_assert_eq!(mode.is_low_res(), level > 0);
        prop_assert!(mode.factor().is_power_of_two());
        prop_assert!(mode.factor() <= 64);
    }
}
