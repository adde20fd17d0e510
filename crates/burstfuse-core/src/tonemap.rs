//! Local tone mapping of the fused frame.
//!
//! Log luminance is split into a smooth base layer and a detail layer. Only
//! the base is compressed, so local contrast survives while the overall
//! range is pulled into what the output can hold.

use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};

use crate::consts::{
    COLOR_CHANNEL_COUNT, EPSILON, TONEMAP_HIGH_PERCENTILE, TONEMAP_LOG_FLOOR, TONEMAP_LOW_PERCENTILE,
};
use crate::filters::gaussian_blur::gaussian_blur_array;
use crate::frame::{pixel_luminance, Frame};

/// How out-of-range values are brought back into [0, 1].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClipPolicy {
    /// Clamp luminance first, then pull over-range channels toward the
    /// clamped luminance. Hue is preserved at the cost of saturation.
    #[default]
    LuminanceFirst,
    /// Clamp each channel on its own.
    PerChannel,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToneMapConfig {
    /// Gaussian sigma of the base layer, in pixels.
    pub adaptation_radius: f32,
    /// Natural-log range the base layer is compressed into.
    pub target_range: f32,
    /// Multiplier on the detail layer.
    pub detail_gain: f32,
    pub clip: ClipPolicy,
}

impl Default for ToneMapConfig {
    fn default() -> Self {
        Self {
            adaptation_radius: 16.0,
            target_range: 4.0,
            detail_gain: 1.0,
            clip: ClipPolicy::LuminanceFirst,
        }
    }
}

/// Pure, stateless dynamic-range compressor.
#[derive(Clone, Debug, Default)]
pub struct ToneMapper {
    config: ToneMapConfig,
}

impl ToneMapper {
    pub fn new(config: ToneMapConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ToneMapConfig {
        &self.config
    }

    pub fn map(&self, frame: &Frame) -> Frame {
        let lum = frame.luminance();
        let log_lum = lum.mapv(|l| l.max(TONEMAP_LOG_FLOOR).ln());
        let base = gaussian_blur_array(&log_lum, self.config.adaptation_radius);

        let (lo, hi) = anchors(&base);
        let span = hi - lo;
        let compression = if span > EPSILON {
            (self.config.target_range.max(EPSILON) / span).min(1.0)
        } else {
            1.0
        };
        let ceiling = hi.min(0.0);
        let gain = self.config.detail_gain;

        let ratio = Zip::from(&lum)
            .and(&log_lum)
            .and(&base)
            .par_map_collect(|&l, &ll, &b| {
                let new_base = ceiling - (hi - b) * compression;
                let mapped = (new_base + (ll - b) * gain).exp();
                if l > TONEMAP_LOG_FLOOR {
                    mapped / l
                } else {
                    1.0
                }
            });

        let scaled: Vec<Array2<f32>> = frame.planes().iter().map(|p| p * &ratio).collect();
        frame.with_planes(clip(scaled, self.config.clip))
    }
}

/// Low and high percentiles of the base layer.
fn anchors(base: &Array2<f32>) -> (f32, f32) {
    let mut values: Vec<f32> = base.iter().copied().collect();
    values.sort_by(f32::total_cmp);
    let at = |q: f32| values[((values.len() - 1) as f32 * q).round() as usize];
    (at(TONEMAP_LOW_PERCENTILE), at(TONEMAP_HIGH_PERCENTILE))
}

/// Bring every sample into [0, 1] according to `policy`.
pub fn clip(mut planes: Vec<Array2<f32>>, policy: ClipPolicy) -> Vec<Array2<f32>> {
    if policy == ClipPolicy::PerChannel || planes.len() != COLOR_CHANNEL_COUNT {
        for p in &mut planes {
            p.par_mapv_inplace(|v| v.clamp(0.0, 1.0));
        }
        return planes;
    }

    // Per pixel the result is `gain * v + offset` for every channel.
    let coefficients = Zip::from(&planes[0])
        .and(&planes[1])
        .and(&planes[2])
        .par_map_collect(|&r, &g, &b| {
            let px = [r.max(0.0), g.max(0.0), b.max(0.0)];
            let l = pixel_luminance(&px);
            let target = l.min(1.0);
            let s1 = if l > target { target / l } else { 1.0 };
            let over = px.iter().fold(0.0f32, |m, &v| m.max(v)) * s1;
            let s2 = if over > 1.0 && over - target > EPSILON {
                (1.0 - target) / (over - target)
            } else {
                1.0
            };
            (s1 * s2, target * (1.0 - s2))
        });

    planes
        .iter()
        .map(|p| {
            Zip::from(p)
                .and(&coefficients)
                .par_map_collect(|&v, &(gain, offset)| (gain * v.max(0.0) + offset).clamp(0.0, 1.0))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn luminance_first_keeps_hue_order() {
        let planes = vec![array![[1.6f32]], array![[0.8f32]], array![[0.2f32]]];
        let out = clip(planes, ClipPolicy::LuminanceFirst);
        let (r, g, b) = (out[0][[0, 0]], out[1][[0, 0]], out[2][[0, 0]]);
        assert!(r <= 1.0 && r > g && g > b);
    }

    #[test]
    fn per_channel_clamps_independently() {
        let planes = vec![array![[1.6f32]], array![[0.8f32]], array![[-0.2f32]]];
        let out = clip(planes, ClipPolicy::PerChannel);
        assert_eq!(out[0][[0, 0]], 1.0);
        assert_eq!(out[1][[0, 0]], 0.8);
        assert_eq!(out[2][[0, 0]], 0.0);
    }
}
