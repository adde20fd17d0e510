pub mod buffers;
pub mod cancel;
pub mod config;
mod orchestrator;
pub mod queue;
mod types;

pub use buffers::{BufferAllocator, BufferLease, BufferPool};
pub use cancel::CancellationToken;
pub use config::PipelineConfig;
pub use orchestrator::{FusionInput, FusionPipeline, PendingFusion};
pub use queue::{frame_channel, spawn_capture, FrameSource};
pub use types::{
    FusionResult, FusionWarning, NoOpReporter, PipelineState, ProgressReporter, ResourceBudget,
    StageTimings,
};
