mod common;

use burstfuse_core::align::phase_correlation::phase_correlate;
use burstfuse_core::align::{warp_frame, AlignedStack, AlignmentTransform, BorderPolicy, FrameAligner};
use burstfuse_core::error::FusionError;
use burstfuse_core::frame::{Frame, FrameStack};
use burstfuse_core::pipeline::config::AlignmentConfig;
use ndarray::Array2;

use common::*;

// ---------------------------------------------------------------------------
// Phase correlation
// ---------------------------------------------------------------------------

#[test]
fn test_phase_correlation_identical_is_zero_shift() {
    let data = textured(64, 64, 1);
    let shift = phase_correlate(&data, &data).unwrap();
    assert!(shift.dx.abs() < 1e-6, "dx = {}", shift.dx);
    assert!(shift.dy.abs() < 1e-6, "dy = {}", shift.dy);
    assert_eq!(shift.confidence(), 1.0);
}

#[test]
fn test_phase_correlation_integer_shift() {
    let reference = textured(128, 128, 2);
    let target = translated(128, 128, 2, 4.0, -6.0);
    let shift = phase_correlate(&reference, &target).unwrap();
    // Registering the target onto the reference undoes the motion.
    assert!((shift.dx + 4.0).abs() < 0.25, "dx = {}", shift.dx);
    assert!((shift.dy - 6.0).abs() < 0.25, "dy = {}", shift.dy);
}

#[test]
fn test_phase_correlation_size_mismatch() {
    let a = Array2::<f32>::zeros((32, 32));
    let b = Array2::<f32>::zeros((32, 16));
    assert!(matches!(phase_correlate(&a, &b), Err(FusionError::InvalidInput(_))));
}

// ---------------------------------------------------------------------------
// FrameAligner
// ---------------------------------------------------------------------------

#[test]
fn test_aligner_recovers_translation() {
    let stack = shifted_stack(128, 128, 3, &[(0.0, 0.0), (5.0, -3.0), (-2.0, 7.0)]);
    let aligned = FrameAligner::new(AlignmentConfig::default()).align(&stack).unwrap();

    assert_eq!(aligned.len(), 3);
    assert!(aligned.entries()[0].transform.is_identity());
    for (entry, (sx, sy)) in aligned.entries()[1..].iter().zip([(5.0, -3.0), (-2.0, 7.0)]) {
        let (tx, ty) = entry.transform.translation_part();
        assert!((tx + sx).abs() < 0.3, "frame {}: tx = {}", entry.index, tx);
        assert!((ty + sy).abs() < 0.3, "frame {}: ty = {}", entry.index, ty);
        assert!(!entry.excluded);
        assert!(entry.transform.confidence > 0.5);
    }
}

#[test]
fn test_aligner_recovers_rotation() {
    let (h, w) = (256, 256);
    let theta: f64 = 0.02;
    let (cx, cy) = ((w - 1) as f64 / 2.0, (h - 1) as f64 / 2.0);
    let (cos, sin) = (theta.cos(), theta.sin());
    // Frame pixel p shows the scene at R(p - c) + c.
    let to_reference = move |x: f64, y: f64| {
        let (ux, uy) = (x - cx, y - cy);
        (cos * ux - sin * uy + cx, sin * ux + cos * uy + cy)
    };
    let reference = Frame::gray(textured(h, w, 4));
    let rotated = Frame::gray(render(h, w, 4, to_reference));
    let stack = FrameStack::new(vec![reference, rotated]).unwrap();

    let config = AlignmentConfig {
        min_confidence: 0.0,
        ..AlignmentConfig::default()
    };
    let aligned = FrameAligner::new(config).align(&stack).unwrap();
    let t = &aligned.entries()[1].transform;

    assert!((t.rotation() - theta).abs() < 0.005, "rotation = {}", t.rotation());
    assert!((t.scale() - 1.0).abs() < 0.01, "scale = {}", t.scale());
    for &(x, y) in &[(30.0, 30.0), (220.0, 40.0), (128.0, 200.0)] {
        let (qx, qy) = t.apply(x, y);
        let (ex, ey) = to_reference(x, y);
        assert!((qx - ex).abs() < 0.75 && (qy - ey).abs() < 0.75, "({x}, {y}) -> ({qx}, {qy})");
    }
}

#[test]
fn test_aligner_rejects_unrelated_noise() {
    let frames = (0..3)
        .map(|seed| Frame::gray(white_noise(128, 128, 100 + seed)))
        .collect();
    let stack = FrameStack::new(frames).unwrap();
    let result = FrameAligner::new(AlignmentConfig::default()).align(&stack);
    assert!(
        matches!(result, Err(FusionError::AlignmentFailed { excluded: 2 })),
        "unexpected: {:?}",
        result.map(|a| a.excluded_indices())
    );
}

#[test]
fn test_aligner_excludes_single_bad_frame() {
    let mut frames: Vec<Frame> = shifted_stack(128, 128, 5, &[(0.0, 0.0), (1.0, 2.0)])
        .frames()
        .to_vec();
    frames.push(Frame::gray(white_noise(128, 128, 77)));
    let stack = FrameStack::new(frames).unwrap();

    let aligned = FrameAligner::new(AlignmentConfig::default()).align(&stack).unwrap();
    assert_eq!(aligned.excluded_indices(), vec![2]);
    assert_eq!(aligned.included_count(), 2);
    assert_eq!(aligned.warp(BorderPolicy::Reference).len(), 2);
}

#[test]
fn test_aligner_reduced_working_resolution() {
    let stack = shifted_stack(128, 128, 6, &[(0.0, 0.0), (6.0, 4.0)]);
    let config = AlignmentConfig {
        max_working_dim: Some(64),
        ..AlignmentConfig::default()
    };
    let aligned = FrameAligner::new(config).align(&stack).unwrap();
    let (tx, ty) = aligned.entries()[1].transform.translation_part();
    // Estimated at half resolution, reported at full resolution.
    assert!((tx + 6.0).abs() < 0.75, "tx = {}", tx);
    assert!((ty + 4.0).abs() < 0.75, "ty = {}", ty);
}

#[test]
fn test_scratch_bytes_shrink_with_factor() {
    let stack = identical_stack(64, 64, 4, 7);
    assert_eq!(FrameAligner::scratch_bytes(&stack, 1), 4 * 64 * 64 * 4);
    assert_eq!(FrameAligner::scratch_bytes(&stack, 2), 4 * 32 * 32 * 4);
}

// ---------------------------------------------------------------------------
// AlignedStack and warping
// ---------------------------------------------------------------------------

#[test]
fn test_warp_undoes_translation() {
    let reference = textured(64, 64, 8);
    let moved = Frame::gray(translated(64, 64, 8, 3.0, 2.0));
    let t = AlignmentTransform::translation(-3.0, -2.0);
    let warped = warp_frame(&moved, &t, BorderPolicy::Constant(0.0), &Frame::gray(reference.clone()));

    for row in 0..61 {
        for col in 0..61 {
            let diff = (warped.plane(0)[[row, col]] - reference[[row, col]]).abs();
            assert!(diff < 1e-5, "({row}, {col}) differs by {diff}");
        }
    }
}

#[test]
fn test_border_policies() {
    let reference = Frame::gray(Array2::from_elem((16, 16), 0.25f32));
    let frame = Frame::gray(Array2::from_elem((16, 16), 0.75f32));
    let t = AlignmentTransform::translation(4.0, 0.0);

    let constant = warp_frame(&frame, &t, BorderPolicy::Constant(0.0), &reference);
    assert_eq!(constant.plane(0)[[5, 0]], 0.0);
    assert_eq!(constant.plane(0)[[5, 10]], 0.75);

    let from_reference = warp_frame(&frame, &t, BorderPolicy::Reference, &reference);
    assert_eq!(from_reference.plane(0)[[5, 0]], 0.25);

    let replicate = warp_frame(&frame, &t, BorderPolicy::Replicate, &reference);
    assert_eq!(replicate.plane(0)[[5, 0]], 0.75);
}

#[test]
fn test_without_last_included_keeps_reference() {
    let stack = identical_stack(16, 16, 3, 9);
    let aligned = AlignedStack::unaligned(stack);
    let trimmed = aligned.without_last_included();
    assert_eq!(trimmed.len(), 2);
    let trimmed = trimmed.without_last_included();
    assert_eq!(trimmed.len(), 1);
    assert_eq!(trimmed.without_last_included().len(), 1);
}

#[test]
fn test_aligned_stack_length_mismatch() {
    let stack = identical_stack(16, 16, 2, 10);
    let entries = AlignedStack::unaligned(stack.truncated(1)).entries().to_vec();
    assert!(AlignedStack::new(stack, entries).is_err());
}
