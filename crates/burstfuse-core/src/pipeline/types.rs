use std::time::Duration;

use crate::align::AlignedFrame;
use crate::frame::Frame;
use crate::fusion::FusionModeKind;

/// Lifecycle of one fusion invocation.
///
/// States advance strictly in declaration order; `Complete` and `Failed`
/// are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PipelineState {
    Idle,
    Collecting,
    Aligning,
    Fusing,
    ToneMapping,
    Sharpening,
    Complete,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    /// Whether the state machine may move from `self` to `next`.
    pub fn can_advance_to(self, next: PipelineState) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == Self::Failed || next > self
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Collecting => write!(f, "Collecting frames"),
            Self::Aligning => write!(f, "Aligning"),
            Self::Fusing => write!(f, "Fusing"),
            Self::ToneMapping => write!(f, "Tone mapping"),
            Self::Sharpening => write!(f, "Sharpening"),
            Self::Complete => write!(f, "Complete"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Non-fatal conditions attached to a successful result.
#[derive(Clone, Debug, PartialEq)]
pub enum FusionWarning {
    /// Some frames registered below the confidence floor and were not fused.
    PartialAlignmentFailure { excluded: Vec<usize> },
    /// The capture queue overflowed and dropped its oldest frames.
    FramesDropped { count: usize },
    /// Frames were cut from the end of the stack to fit the memory budget.
    StackTrimmed { from: usize, to: usize },
    /// Alignment ran at a coarser working resolution to fit the memory budget.
    ReducedAlignmentResolution { factor: usize },
    /// The deadline passed after fusion; these stages did not run.
    BestEffort { skipped: Vec<PipelineState> },
}

impl std::fmt::Display for FusionWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PartialAlignmentFailure { excluded } => {
                write!(f, "{} frame(s) excluded by alignment: {:?}", excluded.len(), excluded)
            }
            Self::FramesDropped { count } => write!(f, "{} frame(s) dropped by the capture queue", count),
            Self::StackTrimmed { from, to } => {
                write!(f, "stack trimmed from {} to {} frame(s) to fit memory", from, to)
            }
            Self::ReducedAlignmentResolution { factor } => {
                write!(f, "alignment ran at 1/{} resolution", factor)
            }
            Self::BestEffort { skipped } => {
                let names: Vec<String> = skipped.iter().map(|s| s.to_string()).collect();
                write!(f, "deadline reached, skipped: {}", names.join(", "))
            }
        }
    }
}

/// Wall-clock time spent in each working state.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StageTimings {
    pub collecting: Duration,
    pub aligning: Duration,
    pub fusing: Duration,
    pub tone_mapping: Duration,
    pub sharpening: Duration,
}

impl StageTimings {
    pub fn get(&self, state: PipelineState) -> Duration {
        match state {
            PipelineState::Collecting => self.collecting,
            PipelineState::Aligning => self.aligning,
            PipelineState::Fusing => self.fusing,
            PipelineState::ToneMapping => self.tone_mapping,
            PipelineState::Sharpening => self.sharpening,
            _ => Duration::ZERO,
        }
    }

    pub(crate) fn record(&mut self, state: PipelineState, elapsed: Duration) {
        let slot = match state {
            PipelineState::Collecting => &mut self.collecting,
            PipelineState::Aligning => &mut self.aligning,
            PipelineState::Fusing => &mut self.fusing,
            PipelineState::ToneMapping => &mut self.tone_mapping,
            PipelineState::Sharpening => &mut self.sharpening,
            _ => return,
        };
        *slot += elapsed;
    }

    pub fn total(&self) -> Duration {
        self.collecting + self.aligning + self.fusing + self.tone_mapping + self.sharpening
    }
}

/// Output of a successful fusion with its provenance.
#[derive(Clone, Debug)]
pub struct FusionResult {
    pub frame: Frame,
    pub mode: FusionModeKind,
    /// Frames that actually contributed to the merge.
    pub frames_consumed: usize,
    pub timings: StageTimings,
    pub warnings: Vec<FusionWarning>,
    /// Registration of every collected frame, excluded ones included.
    pub alignment: Vec<AlignedFrame>,
}

impl FusionResult {
    pub fn width(&self) -> usize {
        self.frame.width()
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }
}

/// Thread-safe progress reporting for the pipeline.
///
/// Implementors can use this to drive progress bars, logging, or any other
/// UI feedback. All methods have default no-op implementations. Calls come
/// from the pipeline's worker thread.
pub trait ProgressReporter: Send + Sync {
    /// A new state has started. `total_items` is the number of work items in
    /// this state (e.g., frame count), if known.
    fn begin_stage(&self, _stage: PipelineState, _total_items: Option<usize>) {}

    /// Work items completed so far within the current state.
    fn advance(&self, _items_done: usize) {}

    /// The current state is finished.
    fn finish_stage(&self) {}

    /// A non-fatal condition was recorded.
    fn warn(&self, _warning: &FusionWarning) {}
}

/// Progress reporter that ignores everything.
pub struct NoOpReporter;
impl ProgressReporter for NoOpReporter {}

/// Thermal, battery or similar budget polled at every state boundary.
/// Exhaustion fails the invocation with `Timeout`.
pub trait ResourceBudget: Send + Sync {
    fn exceeded(&self) -> bool;
}

impl<F> ResourceBudget for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn exceeded(&self) -> bool {
        self()
    }
}
