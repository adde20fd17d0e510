use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::consts::PARALLEL_PIXEL_THRESHOLD;
use crate::frame::Frame;

/// Sub-pixel tolerance when deciding whether a sample lies on the canvas.
const EDGE_TOLERANCE: f64 = 1e-3;

/// Transforms closer than this to identity are treated as identity.
const IDENTITY_TOLERANCE: f64 = 1e-6;

/// How warped pixels that fall outside the source canvas are filled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum BorderPolicy {
    /// Use the reference frame's pixel at the same location.
    #[default]
    Reference,
    /// Repeat the nearest edge pixel.
    Replicate,
    /// Fill with a fixed value.
    Constant(f32),
}

/// 2-D similarity transform mapping a frame's pixel coordinates onto the
/// reference frame's coordinates, with the registration confidence.
///
/// Coordinates are `(x, y)` = `(col, row)`. The mapping is
/// `q = [a -b; b a] * p + t`.
#[derive(Clone, Debug, PartialEq)]
pub struct AlignmentTransform {
    a: f64,
    b: f64,
    tx: f64,
    ty: f64,
    /// Registration confidence in [0, 1].
    pub confidence: f32,
}

impl AlignmentTransform {
    pub fn identity() -> Self {
        Self::translation(0.0, 0.0)
    }

    pub fn translation(dx: f64, dy: f64) -> Self {
        Self {
            a: 1.0,
            b: 0.0,
            tx: dx,
            ty: dy,
            confidence: 1.0,
        }
    }

    /// Rotation (radians, counter-clockwise in image coordinates) and
    /// uniform scale about the origin, followed by a translation.
    pub fn similarity(scale: f64, rotation: f64, dx: f64, dy: f64) -> Self {
        Self::from_parts(scale * rotation.cos(), scale * rotation.sin(), dx, dy)
    }

    pub(crate) fn from_parts(a: f64, b: f64, tx: f64, ty: f64) -> Self {
        Self {
            a,
            b,
            tx,
            ty,
            confidence: 1.0,
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn translation_part(&self) -> (f64, f64) {
        (self.tx, self.ty)
    }

    pub fn rotation(&self) -> f64 {
        self.b.atan2(self.a)
    }

    pub fn scale(&self) -> f64 {
        self.a.hypot(self.b)
    }

    pub fn is_identity(&self) -> bool {
        (self.a - 1.0).abs() < IDENTITY_TOLERANCE
            && self.b.abs() < IDENTITY_TOLERANCE
            && self.tx.abs() < IDENTITY_TOLERANCE
            && self.ty.abs() < IDENTITY_TOLERANCE
    }

    /// Map a frame point onto reference coordinates.
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x - self.b * y + self.tx,
            self.b * x + self.a * y + self.ty,
        )
    }

    /// Map a reference point back into frame coordinates.
    pub fn apply_inverse(&self, x: f64, y: f64) -> (f64, f64) {
        let det = self.a * self.a + self.b * self.b;
        let (ux, uy) = (x - self.tx, y - self.ty);
        ((self.a * ux + self.b * uy) / det, (-self.b * ux + self.a * uy) / det)
    }

    /// Scale the translation part, used when a transform estimated at a
    /// reduced working resolution is promoted to full resolution.
    pub(crate) fn scaled_translation(mut self, factor: f64) -> Self {
        self.tx *= factor;
        self.ty *= factor;
        self
    }
}

impl Default for AlignmentTransform {
    fn default() -> Self {
        Self::identity()
    }
}

/// Resample `frame` onto the reference canvas. The output has the same size
/// as the input; uncovered pixels follow `border`.
pub fn warp_frame(
    frame: &Frame,
    transform: &AlignmentTransform,
    border: BorderPolicy,
    reference: &Frame,
) -> Frame {
    if transform.is_identity() {
        return frame.clone();
    }
    let planes = frame
        .planes()
        .iter()
        .zip(reference.planes())
        .map(|(plane, ref_plane)| warp_plane(plane, transform, border, ref_plane))
        .collect();
    frame.with_planes(planes)
}

/// Resample one plane; see [`warp_frame`].
pub fn warp_plane(
    data: &Array2<f32>,
    transform: &AlignmentTransform,
    border: BorderPolicy,
    reference: &Array2<f32>,
) -> Array2<f32> {
    let (h, w) = data.dim();
    let mut result = Array2::<f32>::zeros((h, w));

    let fill_row = |row: usize, out: &mut ndarray::ArrayViewMut1<f32>| {
        for col in 0..w {
            let (sx, sy) = transform.apply_inverse(col as f64, row as f64);
            out[col] = match sample_checked(data, sy, sx) {
                Some(v) => v,
                None => match border {
                    BorderPolicy::Reference => reference[[row, col]],
                    BorderPolicy::Replicate => bilinear_sample(data, sy, sx),
                    BorderPolicy::Constant(v) => v,
                },
            };
        }
    };

    if h * w >= PARALLEL_PIXEL_THRESHOLD {
        result
            .axis_iter_mut(ndarray::Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(row, mut out)| fill_row(row, &mut out));
    } else {
        for (row, mut out) in result.axis_iter_mut(ndarray::Axis(0)).enumerate() {
            fill_row(row, &mut out);
        }
    }
    result
}

/// Bilinear sample that returns `None` when `(y, x)` is off the canvas.
fn sample_checked(data: &Array2<f32>, y: f64, x: f64) -> Option<f32> {
    let (h, w) = data.dim();
    let max_y = (h - 1) as f64;
    let max_x = (w - 1) as f64;
    if y < -EDGE_TOLERANCE
        || x < -EDGE_TOLERANCE
        || y > max_y + EDGE_TOLERANCE
        || x > max_x + EDGE_TOLERANCE
    {
        return None;
    }
    Some(bilinear_sample(data, y.clamp(0.0, max_y), x.clamp(0.0, max_x)))
}

/// Bilinear interpolation with edge replication outside the canvas.
pub fn bilinear_sample(data: &Array2<f32>, y: f64, x: f64) -> f32 {
    let (h, w) = data.dim();
    let y = y.clamp(0.0, (h - 1) as f64);
    let x = x.clamp(0.0, (w - 1) as f64);

    let y0 = y.floor() as usize;
    let x0 = x.floor() as usize;
    let y1 = (y0 + 1).min(h - 1);
    let x1 = (x0 + 1).min(w - 1);

    let fy = (y - y0 as f64) as f32;
    let fx = (x - x0 as f64) as f32;

    let top = data[[y0, x0]] * (1.0 - fx) + data[[y0, x1]] * fx;
    let bottom = data[[y1, x0]] * (1.0 - fx) + data[[y1, x1]] * fx;
    top * (1.0 - fy) + bottom * fy
}

/// Translate an array so that `out(p) = data(p - (dx, dy))`, replicating edges.
pub fn shift_array(data: &Array2<f32>, dx: f64, dy: f64) -> Array2<f32> {
    if dx == 0.0 && dy == 0.0 {
        return data.clone();
    }
    Array2::from_shape_fn(data.dim(), |(row, col)| {
        bilinear_sample(data, row as f64 - dy, col as f64 - dx)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverse_round_trips() {
        let t = AlignmentTransform::similarity(1.02, 0.05, 3.5, -2.0);
        let (x, y) = t.apply(10.0, 20.0);
        let (bx, by) = t.apply_inverse(x, y);
        assert!((bx - 10.0).abs() < 1e-9);
        assert!((by - 20.0).abs() < 1e-9);
    }

    #[test]
    fn bilinear_midpoint() {
        let mut data = Array2::<f32>::zeros((4, 4));
        data[[1, 1]] = 1.0;
        assert!((bilinear_sample(&data, 1.0, 1.0) - 1.0).abs() < 1e-6);
        assert!((bilinear_sample(&data, 1.0, 1.5) - 0.5).abs() < 1e-6);
    }
}
