use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::align::BorderPolicy;
use crate::consts::{
    DEFAULT_COLLECT_TIMEOUT_MS, DEFAULT_MIN_CONFIDENCE, DEFAULT_PATCH_SIZE, DEFAULT_PYRAMID_LEVELS,
};
use crate::error::{FusionError, Result};
use crate::fusion::{
    DenoiseParams, DepthBlendParams, FusionMode, FusionModeKind, MaxLuminanceParams,
    SharpnessParams,
};
use crate::sharpen::SharpeningConfig;
use crate::tonemap::ToneMapConfig;

/// Everything a [`FusionPipeline`](super::FusionPipeline) needs besides the
/// frames themselves.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Upper bound on intermediate buffer bytes for the default pool.
    #[serde(default)]
    pub memory_budget_bytes: Option<usize>,
    /// Wall-clock limit for one invocation.
    #[serde(default)]
    pub deadline_ms: Option<u64>,
    /// Return the fused frame instead of `Timeout` when the deadline hits
    /// after fusion has finished.
    #[serde(default)]
    pub best_effort: bool,
    #[serde(default = "all_modes")]
    pub allowed_modes: Vec<FusionModeKind>,
    #[serde(default)]
    pub alignment: AlignmentConfig,
    #[serde(default)]
    pub collect: CollectConfig,
    #[serde(default)]
    pub modes: ModeParams,
    /// `None` passes the fused frame through unchanged.
    pub tone_mapping: Option<ToneMapConfig>,
    /// `None` passes the tone-mapped frame through unchanged.
    pub sharpening: Option<SharpeningConfig>,
}

fn all_modes() -> Vec<FusionModeKind> {
    FusionModeKind::ALL.to_vec()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            alignment: AlignmentConfig::default(),
            collect: CollectConfig::default(),
            modes: ModeParams::default(),
            tone_mapping: Some(ToneMapConfig::default()),
            sharpening: Some(SharpeningConfig::default()),
            memory_budget_bytes: None,
            deadline_ms: None,
            best_effort: false,
            allowed_modes: all_modes(),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| FusionError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| FusionError::Config(e.to_string()))
    }

    /// Reject values no stage can work with.
    pub fn validate(&self) -> Result<()> {
        let a = &self.alignment;
        if !(0.0..=1.0).contains(&a.min_confidence) {
            return Err(FusionError::Config(format!(
                "alignment.min_confidence must be in [0, 1], got {}",
                a.min_confidence
            )));
        }
        if a.patch_size < 8 {
            return Err(FusionError::Config(format!(
                "alignment.patch_size must be at least 8, got {}",
                a.patch_size
            )));
        }
        if self.modes.sharpness.block_size == 0 {
            return Err(FusionError::Config("modes.sharpness.block_size must be positive".into()));
        }
        let threshold = self.modes.depth_blend.subject_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(FusionError::Config(format!(
                "modes.depth_blend.subject_threshold must be in (0, 1], got {}",
                threshold
            )));
        }
        if self.collect.burst_length == Some(0) {
            return Err(FusionError::Config("collect.burst_length must be positive".into()));
        }
        if self.allowed_modes.is_empty() {
            return Err(FusionError::Config("allowed_modes is empty".into()));
        }
        Ok(())
    }

    pub fn is_allowed(&self, kind: FusionModeKind) -> bool {
        self.allowed_modes.contains(&kind)
    }

    /// Number of frames to collect for `kind`.
    pub fn burst_target(&self, kind: FusionModeKind) -> usize {
        let target = self.collect.burst_length.unwrap_or_else(|| kind.burst_target());
        match kind.max_frames() {
            Some(max) => target.min(max),
            None => target.max(kind.min_frames()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentConfig {
    /// Coarse-to-fine levels below full resolution.
    pub pyramid_levels: usize,
    /// Frames registering below this confidence are excluded from fusion.
    pub min_confidence: f32,
    /// Fit rotation and scale on top of the global translation.
    pub refine_rotation: bool,
    /// Side of the patches used by the rotation/scale refinement.
    pub patch_size: usize,
    pub border: BorderPolicy,
    /// Register on a power-of-two reduction whose longer side fits this.
    pub max_working_dim: Option<usize>,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            pyramid_levels: DEFAULT_PYRAMID_LEVELS,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            refine_rotation: true,
            patch_size: DEFAULT_PATCH_SIZE,
            border: BorderPolicy::Reference,
            max_working_dim: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectConfig {
    /// Give up waiting for the next frame after this long and fuse what has
    /// arrived.
    pub frame_timeout_ms: u64,
    /// Overrides the per-mode burst target.
    pub burst_length: Option<usize>,
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            frame_timeout_ms: DEFAULT_COLLECT_TIMEOUT_MS,
            burst_length: None,
        }
    }
}

/// Parameters used when a mode is requested by name.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeParams {
    pub denoise: DenoiseParams,
    pub max_luminance: MaxLuminanceParams,
    pub sharpness: SharpnessParams,
    pub depth_blend: DepthBlendParams,
}

impl ModeParams {
    pub fn mode(&self, kind: FusionModeKind) -> FusionMode {
        match kind {
            FusionModeKind::DenoiseAverage => FusionMode::DenoiseAverage(self.denoise.clone()),
            FusionModeKind::MaxLuminance => FusionMode::MaxLuminance(self.max_luminance.clone()),
            FusionModeKind::SharpnessSelect => FusionMode::SharpnessSelect(self.sharpness.clone()),
            FusionModeKind::DepthAwareBlend => FusionMode::DepthAwareBlend(self.depth_blend.clone()),
        }
    }
}
