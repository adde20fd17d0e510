use std::sync::atomic::{AtomicUsize, Ordering};

use ndarray::Array2;
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::consts::{
    MIN_MODEL_ROTATION, MIN_MODEL_SCALE_DELTA, MIN_SIMILARITY_INLIERS, PARALLEL_FRAME_THRESHOLD,
    PYRAMID_BLUR_SIGMA,
};
use crate::error::{FusionError, Result};
use crate::filters::gaussian_blur::gaussian_blur_array;
use crate::frame::{Frame, FrameStack};
use crate::pipeline::config::AlignmentConfig;

use super::pyramid::{downsample_2x, pyramid_shift};
use super::similarity::{fit_similarity, patch_correspondences};
use super::transform::{warp_frame, AlignmentTransform, BorderPolicy};

/// Residual (working-resolution pixels) above which a patch is an outlier.
const INLIER_TOLERANCE: f64 = 1.0;

/// Registration outcome for one stack entry.
#[derive(Clone, Debug)]
pub struct AlignedFrame {
    pub index: usize,
    pub transform: AlignmentTransform,
    /// Confidence fell below the floor; the frame is kept but not fused.
    pub excluded: bool,
}

/// A frame resampled onto the reference canvas, ready for merging.
#[derive(Clone, Debug)]
pub struct WarpedFrame {
    pub index: usize,
    pub confidence: f32,
    pub frame: Frame,
}

/// A [`FrameStack`] paired one-to-one with registration transforms.
#[derive(Clone, Debug)]
pub struct AlignedStack {
    stack: FrameStack,
    entries: Vec<AlignedFrame>,
}

impl AlignedStack {
    /// Pair a stack with transforms supplied by the caller.
    pub fn new(stack: FrameStack, entries: Vec<AlignedFrame>) -> Result<Self> {
        if entries.len() != stack.len() {
            return Err(FusionError::InvalidInput(format!(
                "{} transforms for {} frames",
                entries.len(),
                stack.len()
            )));
        }
        Ok(Self { stack, entries })
    }

    /// Every frame registered with the identity transform.
    pub fn unaligned(stack: FrameStack) -> Self {
        let entries = (0..stack.len())
            .map(|index| AlignedFrame {
                index,
                transform: AlignmentTransform::identity(),
                excluded: false,
            })
            .collect();
        Self { stack, entries }
    }

    pub fn stack(&self) -> &FrameStack {
        &self.stack
    }

    pub fn entries(&self) -> &[AlignedFrame] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn included(&self) -> impl Iterator<Item = &AlignedFrame> {
        self.entries.iter().filter(|e| !e.excluded)
    }

    pub fn included_count(&self) -> usize {
        self.included().count()
    }

    pub fn excluded_indices(&self) -> Vec<usize> {
        self.entries
            .iter()
            .filter(|e| e.excluded)
            .map(|e| e.index)
            .collect()
    }

    /// The first `len` entries (at least the reference).
    pub fn truncated(&self, len: usize) -> Self {
        let stack = self.stack.truncated(len);
        let entries = self.entries[..stack.len()].to_vec();
        Self { stack, entries }
    }

    /// Drop the last included frame and everything after it. The reference
    /// is never dropped.
    pub fn without_last_included(&self) -> Self {
        let last = self
            .entries
            .iter()
            .rposition(|e| !e.excluded)
            .unwrap_or(0);
        self.truncated(last.max(1))
    }

    /// Resample every included frame onto the reference canvas.
    pub fn warp(&self, border: BorderPolicy) -> Vec<WarpedFrame> {
        let reference = self.stack.reference();
        let warp_one = |entry: &AlignedFrame| WarpedFrame {
            index: entry.index,
            confidence: entry.transform.confidence,
            frame: warp_frame(
                &self.stack.frames()[entry.index],
                &entry.transform,
                border,
                reference,
            ),
        };
        let included: Vec<&AlignedFrame> = self.included().collect();
        if included.len() >= PARALLEL_FRAME_THRESHOLD {
            included.into_par_iter().map(warp_one).collect()
        } else {
            included.into_iter().map(warp_one).collect()
        }
    }
}

/// Registers every frame of a stack onto frame 0.
#[derive(Clone, Debug)]
pub struct FrameAligner {
    config: AlignmentConfig,
}

impl FrameAligner {
    pub fn new(config: AlignmentConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AlignmentConfig {
        &self.config
    }

    /// Bytes of working luminance held while aligning `stack` at `factor`.
    pub fn scratch_bytes(stack: &FrameStack, factor: usize) -> usize {
        let (h, w) = stack.dim();
        let factor = factor.max(1);
        stack.len() * h.div_ceil(factor) * w.div_ceil(factor) * std::mem::size_of::<f32>()
    }

    pub fn align(&self, stack: &FrameStack) -> Result<AlignedStack> {
        self.align_with_progress(stack, |_| {})
    }

    /// Align all frames, calling `on_frame_done` with the running count of
    /// registered frames. Non-reference frames are registered in parallel.
    pub fn align_with_progress<F>(&self, stack: &FrameStack, on_frame_done: F) -> Result<AlignedStack>
    where
        F: Fn(usize) + Send + Sync,
    {
        let factor = working_factor(stack.dim(), self.config.max_working_dim);
        let reference = working_luminance(stack.reference(), factor);
        let counter = AtomicUsize::new(0);

        let register = |index: usize, frame: &Frame| -> Result<AlignedFrame> {
            let transform = if index == 0 {
                AlignmentTransform::identity()
            } else {
                let target = working_luminance(frame, factor);
                self.register(&reference, &target)?
                    .scaled_translation(factor as f64)
            };
            let excluded = index != 0 && transform.confidence < self.config.min_confidence;
            let done = counter.fetch_add(1, Ordering::Relaxed) + 1;
            on_frame_done(done);
            Ok(AlignedFrame {
                index,
                transform,
                excluded,
            })
        };

        let results: Vec<Result<AlignedFrame>> = if stack.len() >= PARALLEL_FRAME_THRESHOLD {
            stack
                .frames()
                .par_iter()
                .enumerate()
                .map(|(i, f)| register(i, f))
                .collect()
        } else {
            stack
                .iter()
                .enumerate()
                .map(|(i, f)| register(i, f))
                .collect()
        };
        let entries = results.into_iter().collect::<Result<Vec<_>>>()?;

        let excluded = entries.iter().filter(|e| e.excluded).count();
        if stack.len() > 1 && excluded == stack.len() - 1 {
            warn!(excluded, "No frame registered onto the reference");
            return Err(FusionError::AlignmentFailed { excluded });
        }
        debug!(
            frames = stack.len(),
            excluded,
            working_factor = factor,
            "Alignment finished"
        );
        Ok(AlignedStack {
            stack: stack.clone(),
            entries,
        })
    }

    /// Global translation, then an optional rotation/scale refinement.
    fn register(&self, reference: &Array2<f32>, target: &Array2<f32>) -> Result<AlignmentTransform> {
        let shift = pyramid_shift(reference, target, self.config.pyramid_levels)?;
        let confidence = shift.confidence();
        let translation = AlignmentTransform::translation(shift.dx, shift.dy).with_confidence(confidence);
        if !self.config.refine_rotation || confidence <= 0.0 {
            return Ok(translation);
        }

        let (points, candidates) = patch_correspondences(
            reference,
            target,
            shift.dx,
            shift.dy,
            self.config.patch_size,
        )?;
        if points.len() < MIN_SIMILARITY_INLIERS {
            return Ok(translation);
        }
        let Some(fit) = fit_similarity(&points, candidates, INLIER_TOLERANCE) else {
            return Ok(translation);
        };
        let model = AlignmentTransform::from_parts(fit.a, fit.b, fit.tx, fit.ty);
        let significant = model.rotation().abs() > MIN_MODEL_ROTATION
            || (model.scale() - 1.0).abs() > MIN_MODEL_SCALE_DELTA;
        if fit.inliers < MIN_SIMILARITY_INLIERS || !significant {
            return Ok(translation);
        }
        let refined = (fit.inlier_ratio() * fit.inlier_confidence).max(confidence);
        debug!(
            rotation = model.rotation(),
            scale = model.scale(),
            inliers = fit.inliers,
            "Similarity model accepted"
        );
        Ok(model.with_confidence(refined))
    }
}

/// Power-of-two reduction keeping the longer side within `max_dim`.
pub(crate) fn working_factor((h, w): (usize, usize), max_dim: Option<usize>) -> usize {
    let Some(max_dim) = max_dim.filter(|&d| d > 0) else {
        return 1;
    };
    let mut factor = 1;
    while h.max(w).div_ceil(factor) > max_dim {
        factor *= 2;
    }
    factor
}

fn working_luminance(frame: &Frame, factor: usize) -> Array2<f32> {
    let mut lum = frame.luminance();
    let mut f = factor;
    while f > 1 {
        lum = downsample_2x(&gaussian_blur_array(&lum, PYRAMID_BLUR_SIGMA));
        f /= 2;
    }
    lum
}
