/// Minimum pixel count (h*w) to use row-level Rayon parallelism.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Minimum frame count to use frame-level Rayon parallelism.
pub const PARALLEL_FRAME_THRESHOLD: usize = 4;

/// Small epsilon to avoid division by zero in floating-point comparisons.
pub const EPSILON: f32 = 1e-10;

/// ITU-R BT.601 luminance coefficient for the red channel.
pub const LUMINANCE_R: f32 = 0.299;

/// ITU-R BT.601 luminance coefficient for the green channel.
pub const LUMINANCE_G: f32 = 0.587;

/// ITU-R BT.601 luminance coefficient for the blue channel.
pub const LUMINANCE_B: f32 = 0.114;

/// Number of channels in an RGB frame.
pub const COLOR_CHANNEL_COUNT: usize = 3;

/// Default number of Gaussian pyramid levels for coarse-to-fine alignment.
pub const DEFAULT_PYRAMID_LEVELS: usize = 2;

/// Gaussian blur sigma used for building the alignment pyramid.
pub const PYRAMID_BLUR_SIGMA: f32 = 1.0;

/// Smallest side (in pixels) a pyramid level may have.
pub const PYRAMID_MIN_SIDE: usize = 16;

/// Correlation peak significance (in surface standard deviations) at or
/// below which a registration gets zero confidence. Unrelated content peaks
/// at roughly 4-5 sigma.
pub const PEAK_SIGNIFICANCE_FLOOR: f64 = 6.0;

/// Peak significance at which a registration reaches full confidence.
pub const PEAK_SIGNIFICANCE_FULL: f64 = 16.0;

/// Default confidence floor below which a frame is excluded from fusion.
pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.3;

/// Default side length of the square patches used for rotation/scale refinement.
pub const DEFAULT_PATCH_SIZE: usize = 32;

/// Minimum number of agreeing patches before a similarity model is trusted.
pub const MIN_SIMILARITY_INLIERS: usize = 4;

/// Rotation (radians) below which a fitted similarity collapses to a translation.
pub const MIN_MODEL_ROTATION: f64 = 1e-3;

/// Scale deviation from 1.0 below which a fitted similarity collapses to a translation.
pub const MIN_MODEL_SCALE_DELTA: f64 = 1e-3;

/// Default outlier rejection threshold for DenoiseAverage, in standard deviations.
pub const DEFAULT_OUTLIER_K: f32 = 2.0;

/// Default block size for SharpnessSelect.
pub const DEFAULT_BLOCK_SIZE: usize = 16;

/// Default feather width (Gaussian sigma, pixels) across SharpnessSelect block seams.
pub const DEFAULT_SEAM_FEATHER: f32 = 2.0;

/// Upper bound on the DepthAwareBlend background blur sigma.
pub const MAX_BOKEH_RADIUS: f32 = 32.0;

/// Number of precomputed blur levels DepthAwareBlend interpolates between.
pub const BOKEH_BLUR_LEVELS: usize = 5;

/// Segmentation confidence treated as solid subject by DepthAwareBlend.
pub const DEFAULT_SUBJECT_THRESHOLD: f32 = 0.8;

/// Sharpening radius bounds (Gaussian sigma).
pub const SHARPEN_RADIUS_MIN: f32 = 0.3;
pub const SHARPEN_RADIUS_MAX: f32 = 8.0;

/// Sharpening amount bounds.
pub const SHARPEN_AMOUNT_MAX: f32 = 3.0;

/// Default absolute cap on the high-frequency delta added back by sharpening.
pub const DEFAULT_HALO_LIMIT: f32 = 0.08;

/// Percentiles of the log-luminance base layer used as the tone mapper's
/// black and white anchors.
pub const TONEMAP_LOW_PERCENTILE: f32 = 0.005;
pub const TONEMAP_HIGH_PERCENTILE: f32 = 0.995;

/// Floor applied to luminance before taking logarithms.
pub const TONEMAP_LOG_FLOOR: f32 = 1e-4;

/// Default wait for the next frame while collecting, in milliseconds.
pub const DEFAULT_COLLECT_TIMEOUT_MS: u64 = 2_000;
