//! Rotation/scale refinement from a grid of local patch registrations.
//!
//! After the global translation is known, square patches of the reference
//! are phase-correlated against the correspondingly shifted target. Every
//! patch with a significant peak yields one point correspondence, and a
//! least-squares similarity is fitted with iterative outlier rejection.

use ndarray::{s, Array2};

use crate::error::Result;

use super::phase_correlation::{phase_correlate, significance_to_confidence};
use super::transform::bilinear_sample;

/// Patches whose reference variance is below this carry no usable texture.
const MIN_PATCH_VARIANCE: f32 = 1e-5;

/// Refit rounds after the initial all-points fit.
const REJECTION_ROUNDS: usize = 3;

#[derive(Clone, Copy, Debug)]
pub(crate) struct Correspondence {
    /// Point in frame coordinates `(x, y)`.
    pub frame: (f64, f64),
    /// Matching point in reference coordinates.
    pub reference: (f64, f64),
    pub confidence: f32,
}

#[derive(Clone, Debug)]
pub(crate) struct SimilarityFit {
    pub a: f64,
    pub b: f64,
    pub tx: f64,
    pub ty: f64,
    pub inliers: usize,
    /// Patches that had enough texture to be tried.
    pub candidates: usize,
    /// Mean patch confidence of the inliers.
    pub inlier_confidence: f32,
}

impl SimilarityFit {
    pub fn inlier_ratio(&self) -> f32 {
        if self.candidates == 0 {
            0.0
        } else {
            self.inliers as f32 / self.candidates as f32
        }
    }
}

/// Register a grid of patches given a global shift `(dx, dy)`.
///
/// Returns the significant correspondences and the number of textured
/// patches that were tried.
pub(crate) fn patch_correspondences(
    reference: &Array2<f32>,
    target: &Array2<f32>,
    dx: f64,
    dy: f64,
    patch_size: usize,
) -> Result<(Vec<Correspondence>, usize)> {
    let (h, w) = reference.dim();
    let half = patch_size / 2;
    let size = half * 2;
    let mut found = Vec::new();
    let mut candidates = 0;
    if size < 8 || h < size * 2 || w < size * 2 {
        return Ok((found, candidates));
    }

    let mut cy = half;
    while cy + half <= h {
        let mut cx = half;
        while cx + half <= w {
            let ref_patch = reference
                .slice(s![cy - half..cy + half, cx - half..cx + half])
                .to_owned();
            if variance(&ref_patch) >= MIN_PATCH_VARIANCE {
                candidates += 1;
                let tgt_patch = Array2::from_shape_fn((size, size), |(r, c)| {
                    let y = (cy - half + r) as f64 - dy;
                    let x = (cx - half + c) as f64 - dx;
                    bilinear_sample(target, y, x)
                });
                let local = phase_correlate(&ref_patch, &tgt_patch)?;
                let confidence = significance_to_confidence(local.significance);
                if confidence > 0.0 {
                    let (rx, ry) = (cx as f64, cy as f64);
                    found.push(Correspondence {
                        frame: (rx - dx - local.dx, ry - dy - local.dy),
                        reference: (rx, ry),
                        confidence,
                    });
                }
            }
            cx += size;
        }
        cy += size;
    }
    Ok((found, candidates))
}

/// Least-squares similarity with iterative rejection of correspondences whose
/// residual exceeds `tolerance` pixels.
pub(crate) fn fit_similarity(
    points: &[Correspondence],
    candidates: usize,
    tolerance: f64,
) -> Option<SimilarityFit> {
    let mut active: Vec<bool> = vec![true; points.len()];
    let mut params = solve(points, &active)?;

    for _ in 0..REJECTION_ROUNDS {
        let next: Vec<bool> = points
            .iter()
            .map(|p| residual(&params, p) <= tolerance)
            .collect();
        if next == active {
            break;
        }
        active = next;
        params = solve(points, &active)?;
    }

    let inliers: Vec<&Correspondence> = points
        .iter()
        .zip(&active)
        .filter(|(_, &keep)| keep)
        .map(|(p, _)| p)
        .collect();
    if inliers.is_empty() {
        return None;
    }
    let inlier_confidence =
        inliers.iter().map(|p| p.confidence).sum::<f32>() / inliers.len() as f32;

    let (a, b, tx, ty) = params;
    Some(SimilarityFit {
        a,
        b,
        tx,
        ty,
        inliers: inliers.len(),
        candidates,
        inlier_confidence,
    })
}

fn residual(&(a, b, tx, ty): &(f64, f64, f64, f64), p: &Correspondence) -> f64 {
    let (x, y) = p.frame;
    let qx = a * x - b * y + tx;
    let qy = b * x + a * y + ty;
    (qx - p.reference.0).hypot(qy - p.reference.1)
}

/// Closed-form similarity fit over the active correspondences.
fn solve(points: &[Correspondence], active: &[bool]) -> Option<(f64, f64, f64, f64)> {
    let used: Vec<&Correspondence> = points
        .iter()
        .zip(active)
        .filter(|(_, &keep)| keep)
        .map(|(p, _)| p)
        .collect();
    if used.len() < 2 {
        return None;
    }
    let n = used.len() as f64;
    let (mut px, mut py, mut qx, mut qy) = (0.0, 0.0, 0.0, 0.0);
    for p in &used {
        px += p.frame.0;
        py += p.frame.1;
        qx += p.reference.0;
        qy += p.reference.1;
    }
    let (px, py, qx, qy) = (px / n, py / n, qx / n, qy / n);

    let (mut dot, mut cross, mut norm) = (0.0, 0.0, 0.0);
    for p in &used {
        let (ux, uy) = (p.frame.0 - px, p.frame.1 - py);
        let (vx, vy) = (p.reference.0 - qx, p.reference.1 - qy);
        dot += ux * vx + uy * vy;
        cross += ux * vy - uy * vx;
        norm += ux * ux + uy * uy;
    }
    if norm < 1e-9 {
        return None;
    }
    let a = dot / norm;
    let b = cross / norm;
    let tx = qx - (a * px - b * py);
    let ty = qy - (b * px + a * py);
    Some((a, b, tx, ty))
}

fn variance(data: &Array2<f32>) -> f32 {
    let n = data.len() as f32;
    let mean = data.sum() / n;
    data.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / n
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corr(frame: (f64, f64), reference: (f64, f64)) -> Correspondence {
        Correspondence {
            frame,
            reference,
            confidence: 1.0,
        }
    }

    #[test]
    fn recovers_pure_rotation() {
        let theta: f64 = 0.02;
        let (c, s) = (theta.cos(), theta.sin());
        let points: Vec<Correspondence> = [(10.0, 10.0), (90.0, 12.0), (15.0, 80.0), (70.0, 70.0)]
            .iter()
            .map(|&(x, y)| corr((x, y), (c * x - s * y, s * x + c * y)))
            .collect();
        let fit = fit_similarity(&points, 4, 0.5).unwrap();
        assert!((fit.b.atan2(fit.a) - theta).abs() < 1e-9);
        assert_eq!(fit.inliers, 4);
    }

    #[test]
    fn rejects_outlier() {
        let mut points: Vec<Correspondence> = [(0.0, 0.0), (50.0, 0.0), (0.0, 50.0), (50.0, 50.0)]
            .iter()
            .map(|&(x, y)| corr((x, y), (x + 2.0, y - 1.0)))
            .collect();
        points.push(corr((25.0, 25.0), (40.0, 10.0)));
        let fit = fit_similarity(&points, 5, 0.75).unwrap();
        assert_eq!(fit.inliers, 4);
        assert!((fit.tx - 2.0).abs() < 1e-9);
        assert!((fit.ty + 1.0).abs() < 1e-9);
    }
}
