use std::path::{Path, PathBuf};

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::frame::Frame;

use super::image_io::{save_frame, OutputFormat};

/// Display rotation applied when the frame is written, clockwise.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Orientation {
    #[default]
    Up,
    Right,
    Down,
    Left,
}

impl Orientation {
    /// Rotate a plane so it displays upright.
    pub fn apply(self, data: &Array2<f32>) -> Array2<f32> {
        let (h, w) = data.dim();
        match self {
            Self::Up => data.clone(),
            Self::Down => Array2::from_shape_fn((h, w), |(r, c)| data[[h - 1 - r, w - 1 - c]]),
            Self::Right => Array2::from_shape_fn((w, h), |(r, c)| data[[h - 1 - c, r]]),
            Self::Left => Array2::from_shape_fn((w, h), |(r, c)| data[[c, w - 1 - r]]),
        }
    }
}

/// How the final frame should be encoded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutputDirective {
    pub format: OutputFormat,
    /// Encoder quality 1..=100; only lossy formats use it.
    pub quality: u8,
    pub orientation: Orientation,
}

impl Default for OutputDirective {
    fn default() -> Self {
        Self {
            format: OutputFormat::Png,
            quality: 95,
            orientation: Orientation::Up,
        }
    }
}

/// Receives the final frame of a successful fusion.
///
/// The pipeline calls `accept` once per completed invocation and never for
/// failed or cancelled ones.
pub trait OutputSink: Send + Sync {
    fn accept(&self, frame: &Frame, directive: &OutputDirective) -> Result<()>;
}

/// Writes the frame to a fixed path.
#[derive(Clone, Debug)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl OutputSink for FileSink {
    fn accept(&self, frame: &Frame, directive: &OutputDirective) -> Result<()> {
        let oriented = if directive.orientation == Orientation::Up {
            frame.clone()
        } else {
            Frame::from_planes(
                frame
                    .planes()
                    .iter()
                    .map(|p| directive.orientation.apply(p))
                    .collect(),
                frame.format(),
            )?
            .with_metadata(frame.metadata.clone())
        };
        save_frame(&oriented, &self.path, directive.format, directive.quality)?;
        info!(
            path = %self.path.display(),
            format = ?directive.format,
            width = oriented.width(),
            height = oriented.height(),
            "Wrote fused frame"
        );
        Ok(())
    }
}
