pub mod align;
pub mod consts;
pub mod error;
pub mod filters;
pub mod frame;
pub mod fusion;
pub mod io;
pub mod pipeline;
pub mod quality;
pub mod sharpen;
pub mod tonemap;

pub use error::{FusionError, Result};
pub use frame::{CaptureMetadata, DepthMask, Frame, FrameStack, MaskKind, PixelFormat};
pub use fusion::{FusionMode, FusionModeKind};
pub use pipeline::{FusionInput, FusionPipeline, FusionResult, PipelineConfig, PipelineState};
