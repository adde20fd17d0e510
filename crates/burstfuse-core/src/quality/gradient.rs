use ndarray::{s, Array2, Axis};
use rayon::prelude::*;

use crate::consts::PARALLEL_PIXEL_THRESHOLD;
use crate::frame::Frame;

/// Squared Sobel gradient magnitude per pixel.
///
/// Neighbours outside the canvas replicate the nearest edge sample, so the
/// map covers every pixel including the border.
pub fn gradient_energy_map(data: &Array2<f32>) -> Array2<f32> {
    let (h, w) = data.dim();
    let mut result = Array2::<f32>::zeros((h, w));
    if h == 0 || w == 0 {
        return result;
    }
    let at = |r: isize, c: isize| -> f32 {
        let r = r.clamp(0, h as isize - 1) as usize;
        let c = c.clamp(0, w as isize - 1) as usize;
        data[[r, c]]
    };

    let fill_row = |row: usize, out: &mut ndarray::ArrayViewMut1<f32>| {
        let r = row as isize;
        for col in 0..w {
            let c = col as isize;
            let gx = -at(r - 1, c - 1) + at(r - 1, c + 1) - 2.0 * at(r, c - 1) + 2.0 * at(r, c + 1)
                - at(r + 1, c - 1)
                + at(r + 1, c + 1);
            let gy = -at(r - 1, c - 1) - 2.0 * at(r - 1, c) - at(r - 1, c + 1)
                + at(r + 1, c - 1)
                + 2.0 * at(r + 1, c)
                + at(r + 1, c + 1);
            out[col] = gx * gx + gy * gy;
        }
    };

    if h * w >= PARALLEL_PIXEL_THRESHOLD {
        result
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(row, mut out)| fill_row(row, &mut out));
    } else {
        for (row, mut out) in result.axis_iter_mut(Axis(0)).enumerate() {
            fill_row(row, &mut out);
        }
    }
    result
}

/// Mean gradient energy of a frame's luminance.
pub fn gradient_energy(frame: &Frame) -> f64 {
    gradient_score_array(&frame.luminance())
}

pub fn gradient_score_array(data: &Array2<f32>) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let map = gradient_energy_map(data);
    map.iter().map(|&v| v as f64).sum::<f64>() / map.len() as f64
}

/// Total gradient energy inside each `block_size` square tile.
///
/// Returns a `(ceil(h / block), ceil(w / block))` grid; edge tiles cover the
/// remaining partial rows and columns.
pub fn block_energy(energy: &Array2<f32>, block_size: usize) -> Array2<f64> {
    let (h, w) = energy.dim();
    let block = block_size.max(1);
    let (bh, bw) = (h.div_ceil(block), w.div_ceil(block));
    Array2::from_shape_fn((bh, bw), |(by, bx)| {
        let rows = by * block..((by + 1) * block).min(h);
        let cols = bx * block..((bx + 1) * block).min(w);
        energy
            .slice(s![rows, cols])
            .iter()
            .map(|&v| v as f64)
            .sum()
    })
}
