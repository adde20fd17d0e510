pub mod unsharp_mask;

use serde::{Deserialize, Serialize};

use crate::consts::DEFAULT_HALO_LIMIT;
use crate::frame::Frame;

pub use unsharp_mask::unsharp_mask;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SharpeningConfig {
    /// Gaussian sigma of the blurred copy.
    pub radius: f32,
    /// Fraction of the high-frequency detail added back.
    pub amount: f32,
    /// Detail smaller than this is left alone, so flat noise is not boosted.
    pub threshold: f32,
    /// Largest absolute change sharpening may make to a pixel.
    pub halo_limit: f32,
}

impl Default for SharpeningConfig {
    fn default() -> Self {
        Self {
            radius: 1.2,
            amount: 0.6,
            threshold: 0.0,
            halo_limit: DEFAULT_HALO_LIMIT,
        }
    }
}

/// Final edge-enhancement stage of the pipeline.
#[derive(Clone, Debug, Default)]
pub struct SharpeningStage {
    config: SharpeningConfig,
}

impl SharpeningStage {
    pub fn new(config: SharpeningConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SharpeningConfig {
        &self.config
    }

    pub fn apply(&self, frame: &Frame) -> Frame {
        let c = &self.config;
        unsharp_mask(frame, c.radius, c.amount, c.threshold, c.halo_limit)
    }
}

/// Unsharp mask with default threshold and halo limit.
pub fn sharpen(frame: &Frame, radius: f32, amount: f32) -> Frame {
    unsharp_mask(frame, radius, amount, 0.0, DEFAULT_HALO_LIMIT)
}
