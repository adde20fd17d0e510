//! Coarse-to-fine Gaussian pyramid registration.
//!
//! Phase correlation at the coarsest level catches large displacements; each
//! finer level only has to resolve the residual left by the level above.

use ndarray::Array2;

use crate::consts::{PYRAMID_BLUR_SIGMA, PYRAMID_MIN_SIDE};
use crate::error::Result;
use crate::filters::gaussian_blur::gaussian_blur_array;

use super::phase_correlation::{phase_correlate, PhaseShift};
use super::transform::shift_array;

/// Estimate the translation registering `target` onto `reference`.
///
/// The returned significance is the one measured at full resolution.
pub fn pyramid_shift(
    reference: &Array2<f32>,
    target: &Array2<f32>,
    levels: usize,
) -> Result<PhaseShift> {
    let levels = usable_levels(reference.dim(), levels);
    let ref_pyramid = build_pyramid(reference, levels);
    let tgt_pyramid = build_pyramid(target, levels);

    let mut shift = PhaseShift::default();
    for level in (0..=levels).rev() {
        if level < levels {
            shift.dx *= 2.0;
            shift.dy *= 2.0;
        }
        let shifted = shift_array(&tgt_pyramid[level], shift.dx, shift.dy);
        let residual = phase_correlate(&ref_pyramid[level], &shifted)?;
        shift.dx += residual.dx;
        shift.dy += residual.dy;
        shift.significance = residual.significance;
    }
    Ok(shift)
}

/// Clamp the requested level count so the coarsest level keeps a usable size.
fn usable_levels((h, w): (usize, usize), requested: usize) -> usize {
    let mut side = h.min(w);
    let mut levels = 0;
    while levels < requested && side / 2 >= PYRAMID_MIN_SIDE {
        side /= 2;
        levels += 1;
    }
    levels
}

/// Returns `levels + 1` arrays; index 0 is the input.
pub(crate) fn build_pyramid(data: &Array2<f32>, levels: usize) -> Vec<Array2<f32>> {
    let mut pyramid = Vec::with_capacity(levels + 1);
    pyramid.push(data.clone());
    for _ in 0..levels {
        let Some(prev) = pyramid.last() else { break };
        let next = downsample_2x(&gaussian_blur_array(prev, PYRAMID_BLUR_SIGMA));
        pyramid.push(next);
    }
    pyramid
}

/// Halve both dimensions by keeping every other sample.
pub(crate) fn downsample_2x(data: &Array2<f32>) -> Array2<f32> {
    let (h, w) = data.dim();
    Array2::from_shape_fn((h.div_ceil(2), w.div_ceil(2)), |(r, c)| data[[r * 2, c * 2]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_clamped_for_small_images() {
        assert_eq!(usable_levels((32, 32), 4), 1);
        assert_eq!(usable_levels((20, 200), 3), 0);
        assert_eq!(usable_levels((256, 256), 2), 2);
    }

    #[test]
    fn downsample_rounds_up() {
        let data = Array2::<f32>::zeros((5, 7));
        assert_eq!(downsample_2x(&data).dim(), (3, 4));
    }
}
