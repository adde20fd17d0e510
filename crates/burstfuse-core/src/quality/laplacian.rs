use ndarray::{Array2, Zip};

use crate::frame::Frame;

/// Laplacian variance of a frame's luminance; higher means sharper.
pub fn laplacian_variance(frame: &Frame) -> f64 {
    laplacian_variance_array(&frame.luminance())
}

/// Variance of the 4-neighbour Laplacian response over the interior pixels.
///
/// Arrays smaller than 3x3 have no interior and score zero.
pub fn laplacian_variance_array(data: &Array2<f32>) -> f64 {
    let (h, w) = data.dim();
    if h < 3 || w < 3 {
        return 0.0;
    }

    let (sum, sum_sq) = Zip::from(data.windows((3, 3)))
        .par_fold(
            || (0.0f64, 0.0f64),
            |(s, sq), win| {
                let lap = (win[[0, 1]] + win[[2, 1]] + win[[1, 0]] + win[[1, 2]]) as f64
                    - 4.0 * win[[1, 1]] as f64;
                (s + lap, sq + lap * lap)
            },
            |a, b| (a.0 + b.0, a.1 + b.1),
        );

    let count = ((h - 2) * (w - 2)) as f64;
    let mean = sum / count;
    (sum_sq / count - mean * mean).max(0.0)
}
