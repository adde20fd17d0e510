use ndarray::Array2;
use num_complex::Complex;
use rustfft::FftPlanner;

use crate::consts::{PEAK_SIGNIFICANCE_FLOOR, PEAK_SIGNIFICANCE_FULL};
use crate::error::{FusionError, Result};

/// Translation estimate from phase correlation.
///
/// `(dx, dy)` is the displacement that registers the target onto the
/// reference: `aligned(p) = target(p - (dx, dy))`.
#[derive(Clone, Copy, Debug, Default)]
pub struct PhaseShift {
    pub dx: f64,
    pub dy: f64,
    /// Height of the correlation peak above the surface mean, in surface
    /// standard deviations.
    pub significance: f64,
}

impl PhaseShift {
    /// Map peak significance onto a [0, 1] confidence.
    pub fn confidence(&self) -> f32 {
        significance_to_confidence(self.significance)
    }
}

pub fn significance_to_confidence(significance: f64) -> f32 {
    let t = (significance - PEAK_SIGNIFICANCE_FLOOR)
        / (PEAK_SIGNIFICANCE_FULL - PEAK_SIGNIFICANCE_FLOOR);
    t.clamp(0.0, 1.0) as f32
}

/// Estimate the translation between two equally sized arrays.
pub fn phase_correlate(reference: &Array2<f32>, target: &Array2<f32>) -> Result<PhaseShift> {
    let (h, w) = reference.dim();
    if target.dim() != (h, w) {
        let (th, tw) = target.dim();
        return Err(FusionError::InvalidInput(format!(
            "Array size mismatch: {}x{} vs {}x{}",
            w, h, tw, th
        )));
    }
    if h < 2 || w < 2 {
        return Ok(PhaseShift::default());
    }

    let mut planner = FftPlanner::new();
    let mut ref_spec = windowed_complex(reference);
    let mut tgt_spec = windowed_complex(target);
    fft2d(&mut ref_spec, h, w, &mut planner, false);
    fft2d(&mut tgt_spec, h, w, &mut planner, false);

    // Normalized cross-power spectrum, reusing the reference buffer.
    for (r, t) in ref_spec.iter_mut().zip(&tgt_spec) {
        let cross = *r * t.conj();
        let mag = cross.norm();
        *r = if mag > 1e-12 {
            cross / mag
        } else {
            Complex::new(0.0, 0.0)
        };
    }
    fft2d(&mut ref_spec, h, w, &mut planner, true);

    let scale = 1.0 / (h * w) as f64;
    let surface: Vec<f64> = ref_spec.iter().map(|c| c.re * scale).collect();

    let (peak_idx, peak_val) = surface
        .iter()
        .copied()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, v)| {
            if v > best.1 {
                (i, v)
            } else {
                best
            }
        });
    let (peak_row, peak_col) = (peak_idx / w, peak_idx % w);

    let n = surface.len() as f64;
    let mean = surface.iter().sum::<f64>() / n;
    let var = surface.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    let significance = if var > 0.0 {
        (peak_val - mean) / var.sqrt()
    } else {
        0.0
    };

    let at = |r: usize, c: usize| surface[r * w + c];
    let row_frac = parabolic_offset(
        at((peak_row + h - 1) % h, peak_col),
        peak_val,
        at((peak_row + 1) % h, peak_col),
    );
    let col_frac = parabolic_offset(
        at(peak_row, (peak_col + w - 1) % w),
        peak_val,
        at(peak_row, (peak_col + 1) % w),
    );

    Ok(PhaseShift {
        dx: wrap_signed(peak_col, w) + col_frac,
        dy: wrap_signed(peak_row, h) + row_frac,
        significance,
    })
}

/// Peak index to signed displacement, handling FFT wrap-around.
fn wrap_signed(index: usize, len: usize) -> f64 {
    if index > len / 2 {
        index as f64 - len as f64
    } else {
        index as f64
    }
}

/// Vertex of the parabola through three samples, relative to the middle one,
/// limited to half a pixel.
fn parabolic_offset(prev: f64, curr: f64, next: f64) -> f64 {
    let denom = prev - 2.0 * curr + next;
    if denom.abs() > 1e-12 {
        ((prev - next) / (2.0 * denom)).clamp(-0.5, 0.5)
    } else {
        0.0
    }
}

/// Hann-windowed copy as complex samples, row-major.
fn windowed_complex(data: &Array2<f32>) -> Vec<Complex<f64>> {
    let (h, w) = data.dim();
    let hann = |i: usize, n: usize| 0.5 * (1.0 - (std::f64::consts::TAU * i as f64 / n as f64).cos());
    let col_window: Vec<f64> = (0..w).map(|c| hann(c, w)).collect();

    let mut out = Vec::with_capacity(h * w);
    for row in 0..h {
        let wy = hann(row, h);
        for (col, wx) in col_window.iter().enumerate() {
            out.push(Complex::new(data[[row, col]] as f64 * wy * wx, 0.0));
        }
    }
    out
}

/// In-place 2-D FFT of a row-major `h x w` buffer (unnormalized).
fn fft2d(
    buf: &mut Vec<Complex<f64>>,
    h: usize,
    w: usize,
    planner: &mut FftPlanner<f64>,
    inverse: bool,
) {
    let (row_fft, col_fft) = if inverse {
        (planner.plan_fft_inverse(w), planner.plan_fft_inverse(h))
    } else {
        (planner.plan_fft_forward(w), planner.plan_fft_forward(h))
    };

    // rustfft processes every consecutive chunk of the FFT length.
    row_fft.process(buf);
    let mut columns = transpose(buf, h, w);
    col_fft.process(&mut columns);
    *buf = transpose(&columns, w, h);
}

fn transpose(buf: &[Complex<f64>], rows: usize, cols: usize) -> Vec<Complex<f64>> {
    let mut out = vec![Complex::new(0.0, 0.0); rows * cols];
    for r in 0..rows {
        for c in 0..cols {
            out[c * rows + r] = buf[r * cols + c];
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_signed_handles_negative_half() {
        assert_eq!(wrap_signed(3, 64), 3.0);
        assert_eq!(wrap_signed(61, 64), -3.0);
    }

    #[test]
    fn parabola_is_symmetric_at_peak() {
        assert_eq!(parabolic_offset(0.5, 1.0, 0.5), 0.0);
        assert!(parabolic_offset(0.8, 1.0, 0.2) < 0.0);
    }

    #[test]
    fn confidence_ramp() {
        assert_eq!(significance_to_confidence(2.0), 0.0);
        assert_eq!(significance_to_confidence(100.0), 1.0);
    }
}
