pub mod gradient;
pub mod laplacian;

use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::frame::Frame;

/// Sharpness measure used to score frames.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum QualityMetric {
    #[default]
    Laplacian,
    Gradient,
}

/// Sharpness scores of one frame.
#[derive(Clone, Copy, Debug, Default)]
pub struct QualityScore {
    pub laplacian_variance: f64,
    pub gradient_energy: f64,
}

impl QualityScore {
    pub fn get(&self, metric: QualityMetric) -> f64 {
        match metric {
            QualityMetric::Laplacian => self.laplacian_variance,
            QualityMetric::Gradient => self.gradient_energy,
        }
    }
}

/// Score an array using the specified quality metric.
pub fn score_with_metric(data: &Array2<f32>, metric: QualityMetric) -> f64 {
    match metric {
        QualityMetric::Laplacian => laplacian::laplacian_variance_array(data),
        QualityMetric::Gradient => gradient::gradient_score_array(data),
    }
}

pub fn score_frame(frame: &Frame) -> QualityScore {
    let lum = frame.luminance();
    QualityScore {
        laplacian_variance: laplacian::laplacian_variance_array(&lum),
        gradient_energy: gradient::gradient_score_array(&lum),
    }
}

/// Score all frames and return `(index, score)` sorted by `metric`, sharpest first.
pub fn rank_frames(frames: &[Frame], metric: QualityMetric) -> Vec<(usize, QualityScore)> {
    let mut scores: Vec<(usize, QualityScore)> = frames
        .par_iter()
        .enumerate()
        .map(|(i, f)| (i, score_frame(f)))
        .collect();
    scores.sort_by(|a, b| b.1.get(metric).total_cmp(&a.1.get(metric)));
    scores
}
