use ndarray::Zip;

use crate::consts::{SHARPEN_AMOUNT_MAX, SHARPEN_RADIUS_MAX, SHARPEN_RADIUS_MIN};
use crate::filters::gaussian_blur::gaussian_blur_array;
use crate::frame::Frame;

/// Apply unsharp mask sharpening.
///
/// `radius`: Gaussian blur sigma for the blurred copy, clamped to
/// [`SHARPEN_RADIUS_MIN`, `SHARPEN_RADIUS_MAX`].
/// `amount`: strength of sharpening (0.5 = 50% of the difference added
/// back), clamped to [0, `SHARPEN_AMOUNT_MAX`].
/// `threshold`: minimum difference to sharpen (prevents sharpening of noise).
/// `halo_limit`: cap on the absolute delta added to any pixel.
///
/// The delta is computed on luminance and added to every channel, so colour
/// frames gain no chroma fringes.
pub fn unsharp_mask(
    frame: &Frame,
    radius: f32,
    amount: f32,
    threshold: f32,
    halo_limit: f32,
) -> Frame {
    let radius = radius.clamp(SHARPEN_RADIUS_MIN, SHARPEN_RADIUS_MAX);
    let amount = amount.clamp(0.0, SHARPEN_AMOUNT_MAX);
    let limit = halo_limit.max(0.0);

    let lum = frame.luminance();
    let blurred = gaussian_blur_array(&lum, radius);
    let delta = Zip::from(&lum)
        .and(&blurred)
        .par_map_collect(|&orig, &blur| {
            let diff = orig - blur;
            if diff.abs() > threshold {
                (diff * amount).clamp(-limit, limit)
            } else {
                0.0
            }
        });

    frame.map_planes(|plane| {
        Zip::from(plane)
            .and(&delta)
            .par_map_collect(|&v, &d| (v + d).clamp(0.0, 1.0))
    })
}
