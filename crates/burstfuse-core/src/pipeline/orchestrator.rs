use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::align::{working_factor, AlignedStack, FrameAligner, WarpedFrame};
use crate::consts::PYRAMID_MIN_SIDE;
use crate::error::{FusionError, Result};
use crate::frame::{DepthMask, Frame, FrameStack};
use crate::fusion::{FusionMode, FusionModeKind};
use crate::io::sink::{OutputDirective, OutputSink};
use crate::sharpen::SharpeningStage;
use crate::tonemap::ToneMapper;

use super::buffers::{BufferAllocator, BufferLease, BufferPool};
use super::cancel::CancellationToken;
use super::config::PipelineConfig;
use super::queue::{frame_channel, spawn_capture, FrameSource, Received};
use super::types::{
    FusionResult, FusionWarning, NoOpReporter, PipelineState, ProgressReporter, ResourceBudget,
    StageTimings,
};

/// How often the collector wakes to check cancellation and the deadline.
const COLLECT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Alignment working resolution is never reduced below this shorter side.
const MIN_WORKING_SIDE: usize = PYRAMID_MIN_SIDE * 2;

/// Frames to fuse: either a ready stack or a live source to collect from.
pub enum FusionInput {
    Stack {
        stack: FrameStack,
        mask: Option<DepthMask>,
    },
    Source {
        source: Box<dyn FrameSource>,
        mask: Option<DepthMask>,
    },
}

impl FusionInput {
    pub fn stack(stack: FrameStack) -> Self {
        Self::Stack { stack, mask: None }
    }

    pub fn source(source: impl FrameSource + 'static) -> Self {
        Self::Source {
            source: Box::new(source),
            mask: None,
        }
    }

    /// Attach the depth or segmentation mask used by DepthAwareBlend.
    pub fn with_mask(mut self, mask: DepthMask) -> Self {
        match &mut self {
            Self::Stack { mask: m, .. } | Self::Source { mask: m, .. } => *m = Some(mask),
        }
        self
    }
}

impl From<FrameStack> for FusionInput {
    fn from(stack: FrameStack) -> Self {
        Self::stack(stack)
    }
}

/// Runs fusion invocations on a worker thread, one at a time.
///
/// The pipeline can be reused once an invocation has finished. The buffer
/// allocator may be shared with other pipelines.
pub struct FusionPipeline {
    config: Arc<PipelineConfig>,
    allocator: Arc<dyn BufferAllocator>,
    reporter: Arc<dyn ProgressReporter>,
    budget: Option<Arc<dyn ResourceBudget>>,
    sink: Option<(Arc<dyn OutputSink>, OutputDirective)>,
    busy: Arc<AtomicBool>,
}

impl FusionPipeline {
    pub fn new(config: PipelineConfig, allocator: Arc<dyn BufferAllocator>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            allocator,
            reporter: Arc::new(NoOpReporter),
            budget: None,
            sink: None,
            busy: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Pipeline with its own [`BufferPool`] sized by `memory_budget_bytes`.
    pub fn with_default_pool(config: PipelineConfig) -> Result<Self> {
        let pool = BufferPool::shared(config.memory_budget_bytes);
        Self::new(config, pool)
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_budget(mut self, budget: Arc<dyn ResourceBudget>) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn OutputSink>, directive: OutputDirective) -> Self {
        self.sink = Some((sink, directive));
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Fuse and wait for the result.
    pub fn fuse(&self, input: impl Into<FusionInput>, mode: FusionMode) -> Result<FusionResult> {
        self.submit(input, mode)?.wait()
    }

    /// Start an invocation on a worker thread.
    pub fn submit(&self, input: impl Into<FusionInput>, mode: FusionMode) -> Result<PendingFusion> {
        self.submit_with_cancel(input, mode, CancellationToken::new())
    }

    /// Start an invocation observing a caller-created cancellation token.
    pub fn submit_with_cancel(
        &self,
        input: impl Into<FusionInput>,
        mode: FusionMode,
        cancel: CancellationToken,
    ) -> Result<PendingFusion> {
        let kind = mode.kind();
        if !self.config.is_allowed(kind) {
            return Err(FusionError::UnsupportedMode(kind.to_string()));
        }
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(FusionError::Busy);
        }
        let guard = BusyGuard(Arc::clone(&self.busy));

        let state = Arc::new(Mutex::new(PipelineState::Idle));
        let invocation = Invocation {
            config: Arc::clone(&self.config),
            allocator: Arc::clone(&self.allocator),
            reporter: Arc::clone(&self.reporter),
            budget: self.budget.clone(),
            sink: self.sink.clone(),
            cancel: cancel.clone(),
            state: Arc::clone(&state),
            deadline: self
                .config
                .deadline_ms
                .map(|ms| Instant::now() + Duration::from_millis(ms)),
            stage_started: Instant::now(),
            timings: StageTimings::default(),
            warnings: Vec::new(),
        };

        let input = input.into();
        let (tx, rx) = mpsc::channel();
        let handle = std::thread::Builder::new()
            .name("burstfuse-worker".into())
            .spawn(move || {
                let result = invocation.run(input, mode);
                drop(guard);
                let _ = tx.send(result);
            })?;

        Ok(PendingFusion {
            receiver: rx,
            cancel,
            state,
            handle: Some(handle),
        })
    }
}

struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Handle to an invocation running on the worker.
pub struct PendingFusion {
    receiver: mpsc::Receiver<Result<FusionResult>>,
    cancel: CancellationToken,
    state: Arc<Mutex<PipelineState>>,
    handle: Option<JoinHandle<()>>,
}

impl PendingFusion {
    /// Request cancellation; honoured at the next state boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// State the invocation is currently in.
    pub fn state(&self) -> PipelineState {
        *self.state.lock()
    }

    /// Block until the invocation finishes.
    pub fn wait(mut self) -> Result<FusionResult> {
        let result = self.receiver.recv().unwrap_or(Err(FusionError::WorkerLost));
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        result
    }

    /// Wait up to `timeout`; `None` means the invocation is still running.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<FusionResult>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(mpsc::RecvTimeoutError::Timeout) => None,
            Err(mpsc::RecvTimeoutError::Disconnected) => Some(Err(FusionError::WorkerLost)),
        }
    }
}

/// State of one invocation, owned by the worker thread.
struct Invocation {
    config: Arc<PipelineConfig>,
    allocator: Arc<dyn BufferAllocator>,
    reporter: Arc<dyn ProgressReporter>,
    budget: Option<Arc<dyn ResourceBudget>>,
    sink: Option<(Arc<dyn OutputSink>, OutputDirective)>,
    cancel: CancellationToken,
    state: Arc<Mutex<PipelineState>>,
    deadline: Option<Instant>,
    stage_started: Instant,
    timings: StageTimings,
    warnings: Vec<FusionWarning>,
}

impl Invocation {
    fn run(mut self, input: FusionInput, mode: FusionMode) -> Result<FusionResult> {
        let kind = mode.kind();
        info!(mode = %kind, "Fusion started");
        // Every buffer lease lives inside `execute`, so all are released by
        // the time the terminal state is published.
        let result = self.execute(input, &mode);
        match &result {
            Ok(r) => {
                self.set_state(PipelineState::Complete);
                info!(
                    mode = %kind,
                    frames = r.frames_consumed,
                    elapsed_ms = r.timings.total().as_millis() as u64,
                    "Fusion complete"
                );
            }
            Err(e) => {
                let stage = self.current();
                self.set_state(PipelineState::Failed);
                warn!(mode = %kind, %stage, error = %e, "Fusion failed");
            }
        }
        result
    }

    fn execute(&mut self, input: FusionInput, mode: &FusionMode) -> Result<FusionResult> {
        let kind = mode.kind();

        // Collecting
        self.enter(PipelineState::Collecting, Some(self.config.burst_target(kind)))?;
        let (stack, mask) = match input {
            FusionInput::Stack { stack, mask } => (stack, mask),
            FusionInput::Source { source, mask } => (self.collect(source, kind)?, mask),
        };
        self.leave();
        validate_input(kind, &stack, mask.as_ref())?;

        // Aligning
        self.enter(PipelineState::Aligning, Some(stack.len()))?;
        let aligned = self.align(&stack)?;
        let alignment = aligned.entries().to_vec();
        let excluded = aligned.excluded_indices();
        if !excluded.is_empty() {
            self.warn(FusionWarning::PartialAlignmentFailure { excluded });
        }
        let (layers, warped_lease, fused_lease) = self.warp(aligned, kind)?;
        self.leave();

        // Fusing
        self.enter(PipelineState::Fusing, Some(1))?;
        let fused = mode.merge_layers(&layers, mask.as_ref())?;
        let frames_consumed = layers.len();
        drop(layers);
        drop(warped_lease);
        self.reporter.advance(1);
        self.leave();

        let mut output = (fused, fused_lease);
        let finishing = [PipelineState::ToneMapping, PipelineState::Sharpening];
        for (i, &stage) in finishing.iter().enumerate() {
            if self.best_effort_due() {
                self.warn(FusionWarning::BestEffort {
                    skipped: finishing[i..].to_vec(),
                });
                break;
            }
            self.enter(stage, Some(1))?;
            output = match stage {
                PipelineState::ToneMapping => self.tone_map(output)?,
                _ => self.sharpen(output)?,
            };
            self.reporter.advance(1);
            self.leave();
        }

        if self.cancel.is_cancelled() {
            return Err(FusionError::Cancelled {
                stage: self.current(),
            });
        }
        if !self.config.best_effort && self.out_of_time() {
            return Err(FusionError::Timeout {
                stage: self.current(),
            });
        }

        let (frame, final_lease) = output;
        if let Some((sink, directive)) = &self.sink {
            sink.accept(&frame, directive).map_err(|e| match e {
                FusionError::Output(_) => e,
                other => FusionError::Output(other.to_string()),
            })?;
        }
        // The caller owns the frame from here on.
        drop(final_lease);

        Ok(FusionResult {
            frame,
            mode: kind,
            frames_consumed,
            timings: self.timings,
            warnings: std::mem::take(&mut self.warnings),
            alignment,
        })
    }

    fn current(&self) -> PipelineState {
        *self.state.lock()
    }

    fn set_state(&self, next: PipelineState) {
        let mut state = self.state.lock();
        debug_assert!(state.can_advance_to(next), "{} -> {}", *state, next);
        *state = next;
    }

    /// Check the boundary, then move into `next`.
    fn enter(&mut self, next: PipelineState, total: Option<usize>) -> Result<()> {
        self.checkpoint()?;
        self.set_state(next);
        self.stage_started = Instant::now();
        debug!(stage = %next, "Entering state");
        self.reporter.begin_stage(next, total);
        Ok(())
    }

    fn leave(&mut self) {
        let stage = self.current();
        self.timings.record(stage, self.stage_started.elapsed());
        self.reporter.finish_stage();
    }

    fn checkpoint(&self) -> Result<()> {
        let stage = self.current();
        if self.cancel.is_cancelled() {
            return Err(FusionError::Cancelled { stage });
        }
        if self.out_of_time() {
            return Err(FusionError::Timeout { stage });
        }
        Ok(())
    }

    fn out_of_time(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
            || self.budget.as_ref().is_some_and(|b| b.exceeded())
    }

    fn best_effort_due(&self) -> bool {
        self.config.best_effort && !self.cancel.is_cancelled() && self.out_of_time()
    }

    fn warn(&mut self, warning: FusionWarning) {
        warn!(%warning, "Fusion degraded");
        self.reporter.warn(&warning);
        self.warnings.push(warning);
    }

    /// Pull frames from `source` until the burst target, the end of capture,
    /// a frame timeout, or cancellation.
    fn collect(&mut self, source: Box<dyn FrameSource>, kind: FusionModeKind) -> Result<FrameStack> {
        let target = self.config.burst_target(kind);
        let (producer, consumer) = frame_channel(target);
        let stop = CancellationToken::new();
        let pump = spawn_capture(source, producer, stop.clone())?;
        let frame_timeout = Duration::from_millis(self.config.collect.frame_timeout_ms);

        let mut frames = Vec::with_capacity(target);
        let mut last_arrival = Instant::now();
        let outcome = loop {
            if let Err(e) = self.checkpoint() {
                break Err(e);
            }
            if frames.len() >= target {
                break Ok(());
            }
            match consumer.recv_timeout(COLLECT_POLL_INTERVAL) {
                Received::Frame(frame) => {
                    frames.push(frame);
                    last_arrival = Instant::now();
                    self.reporter.advance(frames.len());
                }
                Received::Timeout => {
                    if last_arrival.elapsed() >= frame_timeout {
                        debug!(collected = frames.len(), "Frame timeout, ending collection");
                        break Ok(());
                    }
                }
                Received::Closed => break Ok(()),
            }
        };

        stop.cancel();
        let dropped = consumer.dropped();
        drop(consumer);
        if pump.is_finished() {
            let _ = pump.join();
        }
        outcome?;

        if dropped > 0 {
            self.warn(FusionWarning::FramesDropped { count: dropped });
        }
        info!(collected = frames.len(), target, "Burst collected");
        if frames.is_empty() {
            return Err(FusionError::InsufficientFrames {
                mode: kind,
                required: kind.min_frames(),
                available: 0,
            });
        }
        FrameStack::new(frames)
    }

    /// Register the stack, coarsening the working resolution while the
    /// scratch buffers do not fit.
    fn align(&mut self, stack: &FrameStack) -> Result<AlignedStack> {
        if stack.len() == 1 {
            self.reporter.advance(1);
            return Ok(AlignedStack::unaligned(stack.clone()));
        }
        let mut config = self.config.alignment.clone();
        let (h, w) = stack.dim();
        let base = working_factor((h, w), config.max_working_dim);
        let mut factor = base;
        let scratch = loop {
            match BufferLease::acquire(&self.allocator, FrameAligner::scratch_bytes(stack, factor)) {
                Ok(lease) => break lease,
                Err(FusionError::OutOfMemory { .. })
                    if h.min(w) / (factor * 2) >= MIN_WORKING_SIDE =>
                {
                    factor *= 2;
                }
                Err(e) => return Err(e),
            }
        };
        if factor > base {
            config.max_working_dim = Some(h.max(w).div_ceil(factor));
            self.warn(FusionWarning::ReducedAlignmentResolution { factor });
        }

        let reporter = Arc::clone(&self.reporter);
        let aligned =
            FrameAligner::new(config).align_with_progress(stack, move |done| reporter.advance(done));
        drop(scratch);
        aligned
    }

    /// Reserve the warped copies together with the fused output, trimming
    /// frames from the end of the stack while the two do not fit, then warp.
    ///
    /// The fused lease also covers the merge's working buffers; it is given
    /// back when the next stage takes over.
    fn warp(
        &mut self,
        aligned: AlignedStack,
        kind: FusionModeKind,
    ) -> Result<(Vec<WarpedFrame>, BufferLease, BufferLease)> {
        let frame_bytes = aligned.stack().reference().byte_size();
        let original = aligned.included_count();
        let mut current = aligned;
        let (warped_lease, fused_lease) = loop {
            let count = current.included_count();
            let fused_bytes = frame_bytes + kind.scratch_bytes(count, current.stack().reference());
            let attempt = BufferLease::acquire(&self.allocator, count * frame_bytes)
                .and_then(|warped| {
                    let fused = BufferLease::acquire(&self.allocator, fused_bytes)?;
                    Ok((warped, fused))
                });
            match attempt {
                Ok(leases) => break leases,
                Err(FusionError::OutOfMemory { .. }) if current.included_count() > kind.min_frames() => {
                    current = current.without_last_included();
                }
                Err(e) => return Err(e),
            }
        };
        let kept = current.included_count();
        if kept < original {
            self.warn(FusionWarning::StackTrimmed {
                from: original,
                to: kept,
            });
        }
        let layers = current.warp(self.config.alignment.border);
        Ok((layers, warped_lease, fused_lease))
    }

    fn tone_map(&self, (frame, lease): (Frame, BufferLease)) -> Result<(Frame, BufferLease)> {
        let Some(config) = &self.config.tone_mapping else {
            return Ok((frame, lease));
        };
        let next = BufferLease::acquire(&self.allocator, frame.byte_size())?;
        let mapped = ToneMapper::new(config.clone()).map(&frame);
        drop(lease);
        Ok((mapped, next))
    }

    fn sharpen(&self, (frame, lease): (Frame, BufferLease)) -> Result<(Frame, BufferLease)> {
        let Some(config) = &self.config.sharpening else {
            return Ok((frame, lease));
        };
        let next = BufferLease::acquire(&self.allocator, frame.byte_size())?;
        let sharpened = SharpeningStage::new(config.clone()).apply(&frame);
        drop(lease);
        Ok((sharpened, next))
    }
}

/// Frame count and mask checks that must pass before any alignment work.
fn validate_input(kind: FusionModeKind, stack: &FrameStack, mask: Option<&DepthMask>) -> Result<()> {
    kind.check_frame_count(stack.len())?;
    if let Some(max) = kind.max_frames() {
        if stack.len() > max {
            return Err(FusionError::InvalidInput(format!(
                "{} takes at most {} frame(s), got {}",
                kind,
                max,
                stack.len()
            )));
        }
    }
    if kind.needs_mask() {
        match mask {
            None => {
                return Err(FusionError::InvalidInput(format!(
                    "{} requires a depth or segmentation mask",
                    kind
                )))
            }
            Some(m) if m.dim() != stack.dim() => {
                return Err(FusionError::InvalidInput(
                    "mask resolution differs from the frame".into(),
                ))
            }
            Some(_) => {}
        }
    }
    Ok(())
}
