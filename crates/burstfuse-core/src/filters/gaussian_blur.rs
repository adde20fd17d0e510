use ndarray::{Array2, Axis};
use rayon::prelude::*;

use crate::consts::PARALLEL_PIXEL_THRESHOLD;
use crate::frame::Frame;

/// Apply Gaussian blur to every plane of a frame.
pub fn gaussian_blur(frame: &Frame, sigma: f32) -> Frame {
    frame.map_planes(|p| gaussian_blur_array(p, sigma))
}

/// Apply Gaussian blur to a raw array using separable 1D convolution.
///
/// Edges replicate the border pixel. `sigma <= 0` returns a copy.
pub fn gaussian_blur_array(data: &Array2<f32>, sigma: f32) -> Array2<f32> {
    if sigma <= 0.0 {
        return data.clone();
    }
    let kernel = make_gaussian_kernel(sigma);
    let row_pass = convolve(data, &kernel, Axis(1));
    convolve(&row_pass, &kernel, Axis(0))
}

pub(crate) fn make_gaussian_kernel(sigma: f32) -> Vec<f32> {
    let radius = (sigma * 3.0).ceil().max(1.0) as usize;
    let size = 2 * radius + 1;
    let mut kernel = vec![0.0f32; size];
    let s2 = 2.0 * sigma * sigma;
    let mut sum = 0.0f32;

    for (i, k) in kernel.iter_mut().enumerate() {
        let x = i as f32 - radius as f32;
        *k = (-x * x / s2).exp();
        sum += *k;
    }

    for v in &mut kernel {
        *v /= sum;
    }

    kernel
}

/// Convolve along `axis` (Axis(1) = within rows, Axis(0) = within columns).
fn convolve(data: &Array2<f32>, kernel: &[f32], axis: Axis) -> Array2<f32> {
    let (h, w) = data.dim();
    let radius = kernel.len() as isize / 2;
    let mut result = Array2::<f32>::zeros((h, w));

    let sample = |row: usize, col: usize| -> f32 {
        let mut sum = 0.0f32;
        for (ki, &kv) in kernel.iter().enumerate() {
            let d = ki as isize - radius;
            let v = if axis == Axis(1) {
                data[[row, (col as isize + d).clamp(0, w as isize - 1) as usize]]
            } else {
                data[[(row as isize + d).clamp(0, h as isize - 1) as usize, col]]
            };
            sum += v * kv;
        }
        sum
    };

    if h * w >= PARALLEL_PIXEL_THRESHOLD {
        result
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(row, mut out)| {
                for col in 0..w {
                    out[col] = sample(row, col);
                }
            });
    } else {
        for row in 0..h {
            for col in 0..w {
                result[[row, col]] = sample(row, col);
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_is_normalized() {
        let k = make_gaussian_kernel(1.5);
        let sum: f32 = k.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert_eq!(k.len() % 2, 1);
    }

    #[test]
    fn blur_preserves_constant() {
        let data = Array2::from_elem((20, 30), 0.4f32);
        let out = gaussian_blur_array(&data, 2.0);
        for v in out.iter() {
            assert!((v - 0.4).abs() < 1e-5);
        }
    }
}
