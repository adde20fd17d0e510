mod common;

use burstfuse_core::filters::gaussian_blur::gaussian_blur;
use burstfuse_core::frame::Frame;
use burstfuse_core::quality::gradient::{block_energy, gradient_energy, gradient_energy_map};
use burstfuse_core::quality::laplacian::laplacian_variance;
use burstfuse_core::quality::{rank_frames, score_frame, score_with_metric, QualityMetric};
use ndarray::Array2;

use common::*;

#[test]
fn test_flat_frame_scores_zero() {
    let flat = Frame::gray(Array2::from_elem((32, 32), 0.4f32));
    assert_eq!(laplacian_variance(&flat), 0.0);
    assert_eq!(gradient_energy(&flat), 0.0);
}

#[test]
fn test_blur_lowers_both_metrics() {
    let sharp = Frame::gray(textured(64, 64, 11));
    let soft = gaussian_blur(&sharp, 2.0);
    assert_eq!(soft.dim(), sharp.dim());

    let (a, b) = (score_frame(&sharp), score_frame(&soft));
    assert!(a.laplacian_variance > b.laplacian_variance);
    assert!(a.gradient_energy > b.gradient_energy);
}

#[test]
fn test_score_with_metric_matches_frame_score() {
    let data = textured(48, 48, 12);
    let score = score_frame(&Frame::gray(data.clone()));
    for metric in [QualityMetric::Laplacian, QualityMetric::Gradient] {
        assert_eq!(score_with_metric(&data, metric), score.get(metric));
    }
}

#[test]
fn test_rank_frames_sharpest_first() {
    let sharp = Frame::gray(textured(64, 64, 13));
    let softer = gaussian_blur(&sharp, 1.0);
    let softest = gaussian_blur(&sharp, 3.0);
    let ranked = rank_frames(&[softer, softest, sharp], QualityMetric::Gradient);
    let order: Vec<usize> = ranked.iter().map(|(i, _)| *i).collect();
    assert_eq!(order, vec![2, 0, 1]);
}

#[test]
fn test_block_energy_grid_covers_partial_tiles() {
    let energy = gradient_energy_map(&textured(40, 70, 14));
    let blocks = block_energy(&energy, 16);
    assert_eq!(blocks.dim(), (3, 5));
    let total: f64 = energy.iter().map(|&v| v as f64).sum();
    assert!((blocks.sum() - total).abs() < 1e-3 * total.max(1.0));
}
