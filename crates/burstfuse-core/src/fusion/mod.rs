//! Merge policies turning an aligned burst into one frame.
//!
//! The set of policies is closed: [`FusionMode`] selects exactly one of four
//! variants, each carrying its own parameters.

pub mod denoise;
pub mod depth_blend;
pub mod max_luminance;
pub mod sharpness;

use std::mem::size_of;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::align::{AlignedStack, BorderPolicy, WarpedFrame};
use crate::consts::BOKEH_BLUR_LEVELS;
use crate::error::{FusionError, Result};
use crate::frame::{DepthMask, Frame};

pub use denoise::DenoiseParams;
pub use depth_blend::DepthBlendParams;
pub use max_luminance::MaxLuminanceParams;
pub use sharpness::SharpnessParams;

/// Parameter-free identity of a fusion mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FusionModeKind {
    DenoiseAverage,
    MaxLuminance,
    SharpnessSelect,
    DepthAwareBlend,
}

impl FusionModeKind {
    pub const ALL: [FusionModeKind; 4] = [
        Self::DenoiseAverage,
        Self::MaxLuminance,
        Self::SharpnessSelect,
        Self::DepthAwareBlend,
    ];

    /// Fewest frames the mode accepts.
    pub fn min_frames(self) -> usize {
        match self {
            Self::DenoiseAverage | Self::MaxLuminance | Self::SharpnessSelect => 2,
            Self::DepthAwareBlend => 1,
        }
    }

    /// Most frames the mode accepts, if bounded.
    pub fn max_frames(self) -> Option<usize> {
        match self {
            Self::DepthAwareBlend => Some(1),
            _ => None,
        }
    }

    /// Default number of frames to collect for one burst.
    pub fn burst_target(self) -> usize {
        match self {
            Self::DenoiseAverage => 8,
            Self::MaxLuminance => 16,
            Self::SharpnessSelect => 6,
            Self::DepthAwareBlend => 1,
        }
    }

    pub fn needs_mask(self) -> bool {
        matches!(self, Self::DepthAwareBlend)
    }

    /// Bytes of frame-sized working buffers `merge` holds beyond its input
    /// layers and output when fusing `layers` frames shaped like `frame`.
    pub fn scratch_bytes(self, layers: usize, frame: &Frame) -> usize {
        let (h, w) = frame.dim();
        let plane = h * w * size_of::<f32>();
        match self {
            // Row-wise; per-row sample buffers only.
            Self::DenoiseAverage => 0,
            // Running maximum, the current layer's luminance and the winner map.
            Self::MaxLuminance => 2 * plane + h * w * size_of::<usize>(),
            // Luminance and energy per layer, one feathered selection map per
            // layer with its blur pass, then the per-pixel picks.
            Self::SharpnessSelect => {
                3 * layers * plane + h * w * size_of::<(usize, usize, f32)>()
            }
            // Raw and feathered distance maps with a blur pass, then the blur
            // levels of one channel, each with its own blur pass.
            Self::DepthAwareBlend => (3 + 2 * BOKEH_BLUR_LEVELS) * plane,
        }
    }

    /// Fail with `InsufficientFrames` unless `available` meets the minimum.
    pub fn check_frame_count(self, available: usize) -> Result<()> {
        let required = self.min_frames();
        if available < required {
            return Err(FusionError::InsufficientFrames {
                mode: self,
                required,
                available,
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for FusionModeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DenoiseAverage => write!(f, "DenoiseAverage"),
            Self::MaxLuminance => write!(f, "MaxLuminance"),
            Self::SharpnessSelect => write!(f, "SharpnessSelect"),
            Self::DepthAwareBlend => write!(f, "DepthAwareBlend"),
        }
    }
}

impl FromStr for FusionModeKind {
    type Err = FusionError;

    /// Accepts the variant name or its feature alias (`night`, `trails`,
    /// `focus`, `portrait`), case-insensitively.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "denoiseaverage" | "denoise" | "night" => Ok(Self::DenoiseAverage),
            "maxluminance" | "lighten" | "trails" => Ok(Self::MaxLuminance),
            "sharpnessselect" | "focus" | "focus-stack" => Ok(Self::SharpnessSelect),
            "depthawareblend" | "bokeh" | "portrait" => Ok(Self::DepthAwareBlend),
            _ => Err(FusionError::UnsupportedMode(s.to_string())),
        }
    }
}

/// A fusion mode together with its parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FusionMode {
    DenoiseAverage(DenoiseParams),
    MaxLuminance(MaxLuminanceParams),
    SharpnessSelect(SharpnessParams),
    DepthAwareBlend(DepthBlendParams),
}

impl FusionMode {
    /// The mode with default parameters.
    pub fn with_defaults(kind: FusionModeKind) -> Self {
        match kind {
            FusionModeKind::DenoiseAverage => Self::DenoiseAverage(DenoiseParams::default()),
            FusionModeKind::MaxLuminance => Self::MaxLuminance(MaxLuminanceParams::default()),
            FusionModeKind::SharpnessSelect => Self::SharpnessSelect(SharpnessParams::default()),
            FusionModeKind::DepthAwareBlend => Self::DepthAwareBlend(DepthBlendParams::default()),
        }
    }

    pub fn kind(&self) -> FusionModeKind {
        match self {
            Self::DenoiseAverage(_) => FusionModeKind::DenoiseAverage,
            Self::MaxLuminance(_) => FusionModeKind::MaxLuminance,
            Self::SharpnessSelect(_) => FusionModeKind::SharpnessSelect,
            Self::DepthAwareBlend(_) => FusionModeKind::DepthAwareBlend,
        }
    }

    /// Warp the included frames of `aligned` and merge them.
    pub fn merge(
        &self,
        aligned: &AlignedStack,
        border: BorderPolicy,
        mask: Option<&DepthMask>,
    ) -> Result<Frame> {
        self.kind().check_frame_count(aligned.included_count())?;
        let layers = aligned.warp(border);
        self.merge_layers(&layers, mask)
    }

    /// Merge frames already resampled onto the reference canvas.
    ///
    /// `layers[0]` is treated as the reference for tie-breaks and fallbacks.
    pub fn merge_layers(&self, layers: &[WarpedFrame], mask: Option<&DepthMask>) -> Result<Frame> {
        let kind = self.kind();
        if let Some(first) = layers.first() {
            let (dim, format) = (first.frame.dim(), first.frame.format());
            if layers
                .iter()
                .any(|l| l.frame.dim() != dim || l.frame.format() != format)
            {
                return Err(FusionError::InvalidInput(
                    "fusion layers differ in size or format".into(),
                ));
            }
        }
        debug!(mode = %kind, layers = layers.len(), "Merging");

        match self {
            Self::DenoiseAverage(params) => {
                if layers.len() == 1 {
                    return Ok(layers[0].frame.clone());
                }
                kind.check_frame_count(layers.len())?;
                Ok(denoise::merge(layers, params))
            }
            Self::MaxLuminance(params) => {
                kind.check_frame_count(layers.len())?;
                Ok(max_luminance::merge(layers, params))
            }
            Self::SharpnessSelect(params) => {
                kind.check_frame_count(layers.len())?;
                Ok(sharpness::merge(layers, params))
            }
            Self::DepthAwareBlend(params) => {
                kind.check_frame_count(layers.len())?;
                if layers.len() > 1 {
                    return Err(FusionError::InvalidInput(format!(
                        "{} takes exactly one frame, got {}",
                        kind,
                        layers.len()
                    )));
                }
                let mask = mask.ok_or_else(|| {
                    FusionError::InvalidInput(format!("{} requires a depth or segmentation mask", kind))
                })?;
                depth_blend::merge(&layers[0].frame, mask, params)
            }
        }
    }
}

impl std::fmt::Display for FusionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.kind().fmt(f)
    }
}
