use thiserror::Error;

use crate::fusion::FusionModeKind;
use crate::pipeline::PipelineState;

#[derive(Error, Debug)]
pub enum FusionError {
    #[error("{mode} needs {required} frame(s), only {available} available")]
    InsufficientFrames {
        mode: FusionModeKind,
        required: usize,
        available: usize,
    },

    #[error("Alignment failed: all {excluded} non-reference frame(s) fell below the confidence floor")]
    AlignmentFailed { excluded: usize },

    #[error("Unsupported fusion mode: {0}")]
    UnsupportedMode(String),

    #[error("Out of memory: requested {requested} bytes, {available} available")]
    OutOfMemory { requested: usize, available: usize },

    #[error("Time budget exceeded during {stage}")]
    Timeout { stage: PipelineState },

    #[error("Cancelled during {stage}")]
    Cancelled { stage: PipelineState },

    #[error("Pipeline is busy with another fusion request")]
    Busy,

    #[error("Fusion worker stopped without a result")]
    WorkerLost,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Output sink error: {0}")]
    Output(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image format error: {0}")]
    ImageError(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, FusionError>;
