mod aligner;
pub mod phase_correlation;
pub mod pyramid;
mod similarity;
pub mod transform;

pub(crate) use aligner::working_factor;
pub use aligner::{AlignedFrame, AlignedStack, FrameAligner, WarpedFrame};
pub use transform::{warp_frame, AlignmentTransform, BorderPolicy};
