use ndarray::{Array2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::align::WarpedFrame;
use crate::consts::{DEFAULT_OUTLIER_K, EPSILON};
use crate::frame::{pixel_luminance, Frame};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DenoiseParams {
    /// Samples further than `outlier_k` standard deviations from the
    /// per-pixel median are rejected before averaging.
    pub outlier_k: f32,
}

impl Default for DenoiseParams {
    fn default() -> Self {
        Self {
            outlier_k: DEFAULT_OUTLIER_K,
        }
    }
}

/// Confidence-weighted, outlier-rejecting per-pixel mean.
///
/// Rejection is decided on luminance so a frame contributes all of its
/// channels at a pixel or none of them. Weights are recomputed for every
/// channel, row by row; no frame-sized working buffers are held.
pub fn merge(layers: &[WarpedFrame], params: &DenoiseParams) -> Frame {
    let first = &layers[0].frame;
    let (h, w) = first.dim();
    let n = layers.len();
    let channels = first.planes().len();
    let confidences: Vec<f32> = layers.iter().map(|l| l.confidence.max(EPSILON)).collect();
    let k = params.outlier_k.max(0.0);

    let mut planes: Vec<Array2<f32>> = (0..channels).map(|_| Array2::zeros((h, w))).collect();
    for (ch, plane) in planes.iter_mut().enumerate() {
        plane
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(row, mut out)| {
                let mut lum = vec![0.0f32; n];
                let mut sorted = vec![0.0f32; n];
                let mut pixel = vec![0.0f32; channels];
                for col in 0..w {
                    for (i, layer) in layers.iter().enumerate() {
                        for (c, v) in pixel.iter_mut().enumerate() {
                            *v = layer.frame.plane(c)[[row, col]];
                        }
                        lum[i] = pixel_luminance(&pixel);
                    }
                    let mut acc = 0.0f32;
                    pixel_weights(&lum, &mut sorted, &confidences, k, |i, wgt| {
                        acc += wgt * layers[i].frame.plane(ch)[[row, col]];
                    });
                    out[col] = acc;
                }
            });
    }
    first.with_planes(planes)
}

/// Normalised weights for one pixel's samples, passed to `set(index, weight)`.
fn pixel_weights(
    samples: &[f32],
    sorted: &mut [f32],
    confidences: &[f32],
    k: f32,
    mut set: impl FnMut(usize, f32),
) {
    let n = samples.len();
    sorted.copy_from_slice(samples);
    sorted.sort_by(f32::total_cmp);
    let median = if n % 2 == 1 {
        sorted[n / 2]
    } else {
        0.5 * (sorted[n / 2 - 1] + sorted[n / 2])
    };
    let mean = samples.iter().sum::<f32>() / n as f32;
    let std = (samples.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / n as f32).sqrt();
    let limit = k * std;

    let keep = |v: f32| std <= EPSILON || (v - median).abs() <= limit;
    let total: f32 = samples
        .iter()
        .zip(confidences)
        .filter(|(&v, _)| keep(v))
        .map(|(_, &c)| c)
        .sum();

    if total > EPSILON {
        for (i, (&v, &c)) in samples.iter().zip(confidences).enumerate() {
            set(i, if keep(v) { c / total } else { 0.0 });
        }
    } else {
        // Nothing survived; fall back to the sample closest to the median.
        let closest = samples
            .iter()
            .enumerate()
            .min_by(|a, b| (a.1 - median).abs().total_cmp(&(b.1 - median).abs()))
            .map_or(0, |(i, _)| i);
        for i in 0..n {
            set(i, if i == closest { 1.0 } else { 0.0 });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights_of(samples: &[f32], confidences: &[f32], k: f32) -> Vec<f32> {
        let mut out = vec![0.0; samples.len()];
        let mut scratch = vec![0.0; samples.len()];
        pixel_weights(samples, &mut scratch, confidences, k, |i, w| out[i] = w);
        out
    }

    #[test]
    fn outlier_gets_zero_weight() {
        let w = weights_of(&[0.5, 0.5, 0.5, 0.5, 0.5, 0.5, 0.5, 1.0], &[1.0; 8], 2.0);
        assert_eq!(w[7], 0.0);
        assert!((w.iter().sum::<f32>() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn confidence_scales_weight() {
        let w = weights_of(&[0.4, 0.4], &[1.0, 0.5], 2.0);
        assert!((w[0] - 2.0 / 3.0).abs() < 1e-6);
        assert!((w[1] - 1.0 / 3.0).abs() < 1e-6);
    }
}
