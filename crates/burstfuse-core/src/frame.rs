use std::sync::Arc;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::consts::{COLOR_CHANNEL_COUNT, LUMINANCE_B, LUMINANCE_G, LUMINANCE_R};
use crate::error::{FusionError, Result};

/// Sample layout of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Gray,
    Rgb,
}

impl PixelFormat {
    pub fn channels(self) -> usize {
        match self {
            Self::Gray => 1,
            Self::Rgb => COLOR_CHANNEL_COUNT,
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gray => write!(f, "Gray"),
            Self::Rgb => write!(f, "RGB"),
        }
    }
}

/// Sensor-side information recorded with each capture.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CaptureMetadata {
    pub timestamp_us: Option<u64>,
    pub exposure_us: Option<u64>,
    pub sensitivity_iso: Option<u32>,
    /// Focus distance in diopters (0.0 = infinity).
    pub focus_distance: Option<f32>,
}

/// A single captured image.
///
/// Samples are stored planar, one `Array2<f32>` per channel with shape
/// `(height, width)`. Nominal range is [0.0, 1.0].
#[derive(Clone, Debug)]
pub struct Frame {
    planes: Vec<Array2<f32>>,
    format: PixelFormat,
    pub metadata: CaptureMetadata,
}

impl Frame {
    pub fn gray(data: Array2<f32>) -> Self {
        Self {
            planes: vec![data],
            format: PixelFormat::Gray,
            metadata: CaptureMetadata::default(),
        }
    }

    pub fn rgb(red: Array2<f32>, green: Array2<f32>, blue: Array2<f32>) -> Result<Self> {
        Self::from_planes(vec![red, green, blue], PixelFormat::Rgb)
    }

    /// Build a frame from planes, checking the plane count and shapes.
    pub fn from_planes(planes: Vec<Array2<f32>>, format: PixelFormat) -> Result<Self> {
        if planes.len() != format.channels() {
            return Err(FusionError::InvalidInput(format!(
                "{} frame needs {} plane(s), got {}",
                format,
                format.channels(),
                planes.len()
            )));
        }
        let dim = planes[0].dim();
        if dim.0 == 0 || dim.1 == 0 {
            return Err(FusionError::InvalidInput("empty frame".into()));
        }
        if planes.iter().any(|p| p.dim() != dim) {
            return Err(FusionError::InvalidInput(
                "frame planes differ in size".into(),
            ));
        }
        Ok(Self {
            planes,
            format,
            metadata: CaptureMetadata::default(),
        })
    }

    pub fn with_metadata(mut self, metadata: CaptureMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Same format and metadata, new sample planes.
    ///
    /// Callers guarantee `planes` matches this frame's format.
    pub(crate) fn with_planes(&self, planes: Vec<Array2<f32>>) -> Self {
        debug_assert_eq!(planes.len(), self.format.channels());
        Self {
            planes,
            format: self.format,
            metadata: self.metadata.clone(),
        }
    }

    pub fn width(&self) -> usize {
        self.planes[0].ncols()
    }

    pub fn height(&self) -> usize {
        self.planes[0].nrows()
    }

    /// `(height, width)`, matching ndarray's shape order.
    pub fn dim(&self) -> (usize, usize) {
        self.planes[0].dim()
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn planes(&self) -> &[Array2<f32>] {
        &self.planes
    }

    pub fn plane(&self, channel: usize) -> &Array2<f32> {
        &self.planes[channel]
    }

    pub fn into_planes(self) -> Vec<Array2<f32>> {
        self.planes
    }

    /// All channel values at one pixel.
    pub fn pixel(&self, row: usize, col: usize) -> Vec<f32> {
        self.planes.iter().map(|p| p[[row, col]]).collect()
    }

    /// Size of the sample buffers in bytes.
    pub fn byte_size(&self) -> usize {
        let (h, w) = self.dim();
        h * w * self.planes.len() * std::mem::size_of::<f32>()
    }

    /// Luminance plane using ITU-R BT.601 weights. Gray frames return a copy.
    pub fn luminance(&self) -> Array2<f32> {
        match self.format {
            PixelFormat::Gray => self.planes[0].clone(),
            PixelFormat::Rgb => luminance_planes(&self.planes[0], &self.planes[1], &self.planes[2]),
        }
    }

    /// Apply `f` to every plane.
    pub fn map_planes<F>(&self, mut f: F) -> Self
    where
        F: FnMut(&Array2<f32>) -> Array2<f32>,
    {
        self.with_planes(self.planes.iter().map(|p| f(p)).collect())
    }
}

/// Luminance of three planes using ITU-R BT.601 weights.
pub fn luminance_planes(red: &Array2<f32>, green: &Array2<f32>, blue: &Array2<f32>) -> Array2<f32> {
    ndarray::Zip::from(red)
        .and(green)
        .and(blue)
        .map_collect(|&r, &g, &b| LUMINANCE_R * r + LUMINANCE_G * g + LUMINANCE_B * b)
}

/// Luminance of a single pixel given its channel values.
pub fn pixel_luminance(values: &[f32]) -> f32 {
    match values.len() {
        COLOR_CHANNEL_COUNT => {
            LUMINANCE_R * values[0] + LUMINANCE_G * values[1] + LUMINANCE_B * values[2]
        }
        _ => values[0],
    }
}

/// Ordered burst of frames for one fusion operation.
///
/// Index 0 is the alignment reference. The stack is immutable and cheap to
/// clone; all frames share width, height and pixel format.
#[derive(Clone, Debug)]
pub struct FrameStack {
    frames: Arc<Vec<Frame>>,
    len: usize,
}

impl FrameStack {
    pub fn new(frames: Vec<Frame>) -> Result<Self> {
        let Some(first) = frames.first() else {
            return Err(FusionError::InvalidInput("empty frame stack".into()));
        };
        let (dim, format) = (first.dim(), first.format());
        if dim.0 == 0 || dim.1 == 0 {
            return Err(FusionError::InvalidInput(format!(
                "frames are {}x{}, need at least one pixel",
                dim.1, dim.0
            )));
        }
        for (i, frame) in frames.iter().enumerate().skip(1) {
            if frame.dim() != dim || frame.format() != format {
                return Err(FusionError::InvalidInput(format!(
                    "frame {} is {}x{} {}, expected {}x{} {}",
                    i,
                    frame.width(),
                    frame.height(),
                    frame.format(),
                    dim.1,
                    dim.0,
                    format
                )));
            }
        }
        let len = frames.len();
        Ok(Self {
            frames: Arc::new(frames),
            len,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn reference(&self) -> &Frame {
        &self.frames[0]
    }

    pub fn get(&self, index: usize) -> Option<&Frame> {
        self.frames().get(index)
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames[..self.len]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Frame> {
        self.frames().iter()
    }

    pub fn dim(&self) -> (usize, usize) {
        self.reference().dim()
    }

    pub fn format(&self) -> PixelFormat {
        self.reference().format()
    }

    /// A view of the first `len` frames, sharing storage with `self`.
    pub fn truncated(&self, len: usize) -> Self {
        Self {
            frames: Arc::clone(&self.frames),
            len: len.clamp(1, self.len),
        }
    }
}

/// What the values of a [`DepthMask`] mean.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum MaskKind {
    /// Relative depth: 0.0 nearest, 1.0 farthest.
    Depth,
    /// Subject probability: 1.0 foreground, 0.0 background.
    #[default]
    Segmentation,
}

/// Single-channel per-pixel depth or segmentation mask.
#[derive(Clone, Debug)]
pub struct DepthMask {
    pub data: Array2<f32>,
    pub kind: MaskKind,
}

impl DepthMask {
    pub fn new(data: Array2<f32>, kind: MaskKind) -> Self {
        Self { data, kind }
    }

    pub fn dim(&self) -> (usize, usize) {
        self.data.dim()
    }
}
