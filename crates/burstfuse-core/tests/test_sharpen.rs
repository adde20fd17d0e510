use burstfuse_core::frame::Frame;
use burstfuse_core::sharpen::{sharpen, unsharp_mask, SharpeningConfig, SharpeningStage};
use ndarray::{s, Array2};

fn step_edge() -> Array2<f32> {
    let mut data = Array2::from_elem((32, 32), 0.2f32);
    data.slice_mut(s![.., 16..]).fill(0.8);
    data
}

#[test]
fn test_flat_frame_unchanged() {
    let frame = Frame::gray(Array2::from_elem((24, 24), 0.4f32));
    let out = SharpeningStage::default().apply(&frame);
    assert!(out.plane(0).iter().all(|&v| (v - 0.4).abs() < 1e-5));
}

#[test]
fn test_edge_overshoot_is_bounded() {
    let frame = Frame::gray(step_edge());
    let config = SharpeningConfig {
        amount: 3.0,
        ..SharpeningConfig::default()
    };
    let out = SharpeningStage::new(config.clone()).apply(&frame);
    let max = out.plane(0).iter().cloned().fold(f32::MIN, f32::max);
    let min = out.plane(0).iter().cloned().fold(f32::MAX, f32::min);

    assert!(max > 0.8, "edge was not enhanced");
    assert!(max <= 0.8 + config.halo_limit + 1e-5, "overshoot {max}");
    assert!(min >= 0.2 - config.halo_limit - 1e-5, "undershoot {min}");
}

#[test]
fn test_output_stays_in_range() {
    let mut data = Array2::from_elem((16, 16), 0.0f32);
    data.slice_mut(s![4..12, 4..12]).fill(1.0);
    let out = unsharp_mask(&Frame::gray(data), 2.0, 3.0, 0.0, 1.0);
    assert!(out.plane(0).iter().all(|v| (0.0..=1.0).contains(v)));
}

#[test]
fn test_zero_amount_is_identity() {
    let frame = Frame::gray(step_edge());
    let out = sharpen(&frame, 1.5, 0.0);
    assert_eq!(out.plane(0), frame.plane(0));
}

#[test]
fn test_amount_is_clamped() {
    let frame = Frame::gray(step_edge());
    let capped = unsharp_mask(&frame, 1.0, 3.0, 0.0, 1.0);
    let excessive = unsharp_mask(&frame, 1.0, 50.0, 0.0, 1.0);
    assert_eq!(capped.plane(0), excessive.plane(0));
}

#[test]
fn test_threshold_leaves_small_detail() {
    let mut data = Array2::from_elem((16, 16), 0.5f32);
    data[[8, 8]] = 0.51;
    let frame = Frame::gray(data);
    let out = unsharp_mask(&frame, 1.0, 1.0, 0.05, 0.08);
    assert_eq!(out.plane(0), frame.plane(0));
}

#[test]
fn test_colour_channels_shift_together() {
    let base = step_edge();
    let frame = Frame::rgb(base.clone(), base.mapv(|v| v * 0.5), base.mapv(|v| v * 0.25)).unwrap();
    let out = SharpeningStage::default().apply(&frame);
    let delta = |ch: usize| out.plane(ch)[[10, 16]] - frame.plane(ch)[[10, 16]];
    assert!(delta(0).abs() > 1e-3);
    assert!((delta(0) - delta(1)).abs() < 1e-6);
    assert!((delta(1) - delta(2)).abs() < 1e-6);
}
