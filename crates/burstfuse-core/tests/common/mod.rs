#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Mutex};

use ndarray::Array2;

use burstfuse_core::error::Result;
use burstfuse_core::frame::{Frame, FrameStack};
use burstfuse_core::io::{OutputDirective, OutputSink};
use burstfuse_core::pipeline::{
    BufferAllocator, CancellationToken, FrameSource, FusionWarning, PipelineState, ProgressReporter,
};

// ---------------------------------------------------------------------------
// Synthetic image content
// ---------------------------------------------------------------------------

/// Deterministic hash of an integer lattice point, in [0, 1).
pub fn lattice(ix: i64, iy: i64, seed: u64) -> f32 {
    let mut h = (ix as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (iy as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F)
        ^ seed.wrapping_mul(0x1656_67B1_9E37_79F9);
    h ^= h >> 33;
    h = h.wrapping_mul(0xFF51_AFD7_ED55_8CCD);
    h ^= h >> 33;
    (h >> 40) as f32 / (1u64 << 24) as f32
}

/// Bilinearly interpolated lattice noise with the given cell size.
fn value_noise(x: f64, y: f64, cell: f64, seed: u64) -> f32 {
    let (gx, gy) = (x / cell, y / cell);
    let (x0, y0) = (gx.floor(), gy.floor());
    let (fx, fy) = ((gx - x0) as f32, (gy - y0) as f32);
    let (ix, iy) = (x0 as i64, y0 as i64);
    let top = lattice(ix, iy, seed) * (1.0 - fx) + lattice(ix + 1, iy, seed) * fx;
    let bottom = lattice(ix, iy + 1, seed) * (1.0 - fx) + lattice(ix + 1, iy + 1, seed) * fx;
    top * (1.0 - fy) + bottom * fy
}

/// Continuous textured scene, values in [0.1, 0.9].
pub fn scene(x: f64, y: f64, seed: u64) -> f32 {
    0.1 + 0.5 * value_noise(x, y, 3.0, seed) + 0.3 * value_noise(x, y, 8.0, seed ^ 0x5EED)
}

/// Render the scene through `map`, which takes pixel `(x, y)` to scene coordinates.
pub fn render<F>(h: usize, w: usize, seed: u64, map: F) -> Array2<f32>
where
    F: Fn(f64, f64) -> (f64, f64),
{
    Array2::from_shape_fn((h, w), |(r, c)| {
        let (x, y) = map(c as f64, r as f64);
        scene(x, y, seed)
    })
}

pub fn textured(h: usize, w: usize, seed: u64) -> Array2<f32> {
    render(h, w, seed, |x, y| (x, y))
}

/// The scene moved by `(sx, sy)`: content at reference `q` appears at `q + s`.
pub fn translated(h: usize, w: usize, seed: u64, sx: f64, sy: f64) -> Array2<f32> {
    render(h, w, seed, |x, y| (x - sx, y - sy))
}

/// Independent per-pixel noise in [0, 1).
pub fn white_noise(h: usize, w: usize, seed: u64) -> Array2<f32> {
    Array2::from_shape_fn((h, w), |(r, c)| lattice(c as i64, r as i64, seed))
}

pub fn gray_textured(h: usize, w: usize, seed: u64) -> Frame {
    Frame::gray(textured(h, w, seed))
}

pub fn rgb_textured(h: usize, w: usize, seed: u64) -> Frame {
    let base = textured(h, w, seed);
    Frame::rgb(base.mapv(|v| v * 0.9), base.clone(), base.mapv(|v| v * 0.6)).unwrap()
}

/// `count` copies of the same gray scene.
pub fn identical_stack(h: usize, w: usize, count: usize, seed: u64) -> FrameStack {
    let frame = gray_textured(h, w, seed);
    FrameStack::new(vec![frame; count]).unwrap()
}

/// Gray burst where frame `i` is the scene moved by `shifts[i]`.
pub fn shifted_stack(h: usize, w: usize, seed: u64, shifts: &[(f64, f64)]) -> FrameStack {
    let frames = shifts
        .iter()
        .map(|&(sx, sy)| Frame::gray(translated(h, w, seed, sx, sy)))
        .collect();
    FrameStack::new(frames).unwrap()
}

pub fn max_abs_diff(a: &Array2<f32>, b: &Array2<f32>) -> f32 {
    a.iter()
        .zip(b.iter())
        .fold(0.0f32, |m, (x, y)| m.max((x - y).abs()))
}

// ---------------------------------------------------------------------------
// Pipeline collaborators
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct AllocCounts {
    live: usize,
    max_live: usize,
    bytes: usize,
    reservations: usize,
}

/// Unbounded allocator that counts outstanding reservations.
#[derive(Debug, Default)]
pub struct CountingAllocator {
    counts: Mutex<AllocCounts>,
}

impl CountingAllocator {
    /// Reservations not yet released.
    pub fn outstanding(&self) -> usize {
        self.counts.lock().unwrap().live
    }

    pub fn outstanding_bytes(&self) -> usize {
        self.counts.lock().unwrap().bytes
    }

    /// Most reservations ever held at once.
    pub fn max_live(&self) -> usize {
        self.counts.lock().unwrap().max_live
    }

    pub fn reservations(&self) -> usize {
        self.counts.lock().unwrap().reservations
    }
}

impl BufferAllocator for CountingAllocator {
    fn reserve(&self, bytes: usize) -> Result<()> {
        let mut c = self.counts.lock().unwrap();
        c.live += 1;
        c.reservations += 1;
        c.bytes += bytes;
        c.max_live = c.max_live.max(c.live);
        Ok(())
    }

    fn release(&self, bytes: usize) {
        let mut c = self.counts.lock().unwrap();
        c.live -= 1;
        c.bytes -= bytes;
    }
}

/// Sink that remembers what it was given.
#[derive(Debug, Default)]
pub struct CountingSink {
    calls: AtomicUsize,
    last_dim: Mutex<Option<(usize, usize)>>,
}

impl CountingSink {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_dim(&self) -> Option<(usize, usize)> {
        *self.last_dim.lock().unwrap()
    }
}

impl OutputSink for CountingSink {
    fn accept(&self, frame: &Frame, _directive: &OutputDirective) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_dim.lock().unwrap() = Some(frame.dim());
        Ok(())
    }
}

/// Records every stage and warning; optionally cancels a token as soon as a
/// chosen stage finishes.
#[derive(Default)]
pub struct RecordingReporter {
    stages: Mutex<Vec<PipelineState>>,
    warnings: Mutex<Vec<FusionWarning>>,
    cancel_after: Option<(PipelineState, CancellationToken)>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancelling_after(stage: PipelineState, token: CancellationToken) -> Self {
        Self {
            cancel_after: Some((stage, token)),
            ..Self::default()
        }
    }

    pub fn stages(&self) -> Vec<PipelineState> {
        self.stages.lock().unwrap().clone()
    }

    pub fn warnings(&self) -> Vec<FusionWarning> {
        self.warnings.lock().unwrap().clone()
    }
}

impl ProgressReporter for RecordingReporter {
    fn begin_stage(&self, stage: PipelineState, _total_items: Option<usize>) {
        self.stages.lock().unwrap().push(stage);
    }

    fn finish_stage(&self) {
        if let Some((stage, token)) = &self.cancel_after {
            if self.stages.lock().unwrap().last() == Some(stage) {
                token.cancel();
            }
        }
    }

    fn warn(&self, warning: &FusionWarning) {
        self.warnings.lock().unwrap().push(warning.clone());
    }
}

/// Source fed by the test through a channel; ends when the sender drops.
pub struct ChannelSource(pub mpsc::Receiver<Frame>);

impl FrameSource for ChannelSource {
    fn next_frame(&mut self) -> Option<Frame> {
        self.0.recv().ok()
    }
}
