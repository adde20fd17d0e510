use std::path::Path;

use image::{DynamicImage, ImageBuffer, ImageFormat, Luma, Rgb};
use ndarray::Array2;

use crate::error::{FusionError, Result};
use crate::frame::{DepthMask, Frame, MaskKind, PixelFormat};

/// Encoded file formats the engine can write.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum OutputFormat {
    /// 8-bit PNG.
    #[default]
    Png,
    /// 16-bit TIFF.
    Tiff,
    /// 8-bit JPEG at the directive's quality.
    Jpeg,
}

impl OutputFormat {
    /// Guess from a file extension; unknown extensions give `None`.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "png" => Some(Self::Png),
            "tif" | "tiff" => Some(Self::Tiff),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            _ => None,
        }
    }
}

fn to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn to_u16(v: f32) -> u16 {
    (v.clamp(0.0, 1.0) * 65535.0).round() as u16
}

fn buffer_error() -> FusionError {
    FusionError::Output("pixel buffer does not match frame dimensions".into())
}

/// Interleave a frame's planes into a row-major sample vector.
fn interleave<T>(frame: &Frame, convert: fn(f32) -> T) -> Vec<T> {
    let (h, w) = frame.dim();
    let planes = frame.planes();
    let mut samples = Vec::with_capacity(h * w * planes.len());
    for row in 0..h {
        for col in 0..w {
            samples.extend(planes.iter().map(|p| convert(p[[row, col]])));
        }
    }
    samples
}

fn to_dynamic_u8(frame: &Frame) -> Result<DynamicImage> {
    let (w, h) = (frame.width() as u32, frame.height() as u32);
    let samples = interleave(frame, to_u8);
    Ok(match frame.format() {
        PixelFormat::Gray => DynamicImage::ImageLuma8(
            ImageBuffer::<Luma<u8>, _>::from_raw(w, h, samples).ok_or_else(buffer_error)?,
        ),
        PixelFormat::Rgb => DynamicImage::ImageRgb8(
            ImageBuffer::<Rgb<u8>, _>::from_raw(w, h, samples).ok_or_else(buffer_error)?,
        ),
    })
}

/// Save a frame as 16-bit TIFF (grayscale or RGB).
pub fn save_tiff(frame: &Frame, path: &Path) -> Result<()> {
    let (w, h) = (frame.width() as u32, frame.height() as u32);
    let samples = interleave(frame, to_u16);
    match frame.format() {
        PixelFormat::Gray => ImageBuffer::<Luma<u16>, _>::from_raw(w, h, samples)
            .ok_or_else(buffer_error)?
            .save_with_format(path, ImageFormat::Tiff)?,
        PixelFormat::Rgb => ImageBuffer::<Rgb<u16>, _>::from_raw(w, h, samples)
            .ok_or_else(buffer_error)?
            .save_with_format(path, ImageFormat::Tiff)?,
    }
    Ok(())
}

/// Save a frame as 8-bit PNG.
pub fn save_png(frame: &Frame, path: &Path) -> Result<()> {
    to_dynamic_u8(frame)?.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}

/// Save a frame as JPEG; `quality` is clamped to 1..=100.
pub fn save_jpeg(frame: &Frame, path: &Path, quality: u8) -> Result<()> {
    let img = to_dynamic_u8(frame)?;
    let file = std::fs::File::create(path)?;
    let mut writer = std::io::BufWriter::new(file);
    let encoder =
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut writer, quality.clamp(1, 100));
    img.write_with_encoder(encoder)?;
    Ok(())
}

/// Save in an explicit format.
pub fn save_frame(frame: &Frame, path: &Path, format: OutputFormat, quality: u8) -> Result<()> {
    match format {
        OutputFormat::Png => save_png(frame, path),
        OutputFormat::Tiff => save_tiff(frame, path),
        OutputFormat::Jpeg => save_jpeg(frame, path, quality),
    }
}

/// Save frame, choosing format from file extension (TIFF when unknown).
pub fn save_image(frame: &Frame, path: &Path) -> Result<()> {
    let format = OutputFormat::from_path(path).unwrap_or(OutputFormat::Tiff);
    save_frame(frame, path, format, 95)
}

/// Load an image file into a Frame with samples normalised to [0, 1].
///
/// Images with colour become RGB frames, everything else gray. 8- and 16-bit
/// sources are both read through 16-bit buffers.
pub fn load_image(path: &Path) -> Result<Frame> {
    let img = image::open(path)?;
    if img.color().has_color() {
        let rgb = img.to_rgb16();
        let (w, h) = rgb.dimensions();
        let shape = (h as usize, w as usize);
        let mut planes = vec![Array2::<f32>::zeros(shape); 3];
        for (col, row, pixel) in rgb.enumerate_pixels() {
            for (ch, plane) in planes.iter_mut().enumerate() {
                plane[[row as usize, col as usize]] = pixel.0[ch] as f32 / 65535.0;
            }
        }
        Frame::from_planes(planes, PixelFormat::Rgb)
    } else {
        Ok(Frame::gray(load_gray(&img)))
    }
}

/// Load a single-channel mask. Colour images are reduced to luminance.
pub fn load_mask(path: &Path, kind: MaskKind) -> Result<DepthMask> {
    let img = image::open(path)?;
    Ok(DepthMask::new(load_gray(&img), kind))
}

fn load_gray(img: &DynamicImage) -> Array2<f32> {
    let gray = img.to_luma16();
    let (w, h) = gray.dimensions();
    let mut data = Array2::<f32>::zeros((h as usize, w as usize));
    for (col, row, pixel) in gray.enumerate_pixels() {
        data[[row as usize, col as usize]] = pixel.0[0] as f32 / 65535.0;
    }
    data
}
