use ndarray::{Array2, Zip};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::consts::{BOKEH_BLUR_LEVELS, DEFAULT_SUBJECT_THRESHOLD, EPSILON, MAX_BOKEH_RADIUS};
use crate::error::{FusionError, Result};
use crate::filters::gaussian_blur::gaussian_blur_array;
use crate::frame::{DepthMask, Frame, MaskKind};

/// Depth percentile taken as the subject plane when no focal depth is given.
const SUBJECT_DEPTH_PERCENTILE: f32 = 0.05;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthBlendParams {
    /// Blur sigma applied at the farthest distance from the subject.
    pub max_blur_radius: f32,
    /// Gaussian sigma used to soften the subject boundary.
    pub mask_feather: f32,
    /// Depth value of the in-focus plane for depth masks. `None` picks the
    /// nearest content.
    pub focal_depth: Option<f32>,
    /// Segmentation confidence at or above which a pixel counts as fully
    /// subject. Below it the distance ramps smoothly up to 1 at zero.
    pub subject_threshold: f32,
}

impl Default for DepthBlendParams {
    fn default() -> Self {
        Self {
            max_blur_radius: 12.0,
            mask_feather: 3.0,
            focal_depth: None,
            subject_threshold: DEFAULT_SUBJECT_THRESHOLD,
        }
    }
}

/// Synthetic shallow depth of field on a single frame.
///
/// Blur strength rises monotonically with distance from the subject; pixels
/// at distance zero keep their original value.
pub fn merge(frame: &Frame, mask: &DepthMask, params: &DepthBlendParams) -> Result<Frame> {
    if mask.dim() != frame.dim() {
        let (mh, mw) = mask.dim();
        return Err(FusionError::InvalidInput(format!(
            "mask is {}x{}, frame is {}x{}",
            mw,
            mh,
            frame.width(),
            frame.height()
        )));
    }
    let distance = gaussian_blur_array(&subject_distance(mask, params), params.mask_feather);
    let radius = params.max_blur_radius.clamp(0.0, MAX_BOKEH_RADIUS);
    if radius <= 0.0 {
        return Ok(frame.clone());
    }

    let top = (BOKEH_BLUR_LEVELS - 1) as f32;
    let planes = frame
        .planes()
        .iter()
        .map(|plane| {
            let levels: Vec<Array2<f32>> = (0..BOKEH_BLUR_LEVELS)
                .into_par_iter()
                .map(|i| gaussian_blur_array(plane, radius * i as f32 / top))
                .collect();
            Zip::indexed(&distance).par_map_collect(|(r, c), &d| {
                let s = d.clamp(0.0, 1.0) * top;
                let i = (s.floor() as usize).min(BOKEH_BLUR_LEVELS - 2);
                let t = s - i as f32;
                (1.0 - t) * levels[i][[r, c]] + t * levels[i + 1][[r, c]]
            })
        })
        .collect();
    Ok(frame.with_planes(planes))
}

/// Normalised distance from the subject in [0, 1]; 0 is the subject itself.
pub fn subject_distance(mask: &DepthMask, params: &DepthBlendParams) -> Array2<f32> {
    match mask.kind {
        MaskKind::Segmentation => {
            let threshold = params.subject_threshold.clamp(EPSILON, 1.0);
            mask.data.mapv(|m| {
                let t = ((threshold - m.clamp(0.0, 1.0)) / threshold).max(0.0);
                t * t * (3.0 - 2.0 * t)
            })
        }
        MaskKind::Depth => {
            let subject = params
                .focal_depth
                .unwrap_or_else(|| percentile(&mask.data, SUBJECT_DEPTH_PERCENTILE))
                .clamp(0.0, 1.0);
            let span = (1.0 - subject).max(EPSILON);
            mask.data
                .mapv(|d| ((d.clamp(0.0, 1.0) - subject).max(0.0) / span).min(1.0))
        }
    }
}

fn percentile(data: &Array2<f32>, q: f32) -> f32 {
    let mut values: Vec<f32> = data.iter().copied().collect();
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(f32::total_cmp);
    let idx = ((values.len() - 1) as f32 * q).round() as usize;
    values[idx.min(values.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn segmentation_distance_has_subject_dead_zone() {
        let mask = DepthMask::new(array![[1.0, 0.9], [0.0, 0.4]], MaskKind::Segmentation);
        let d = subject_distance(&mask, &DepthBlendParams::default());
        assert_eq!(d[[0, 0]], 0.0);
        assert_eq!(d[[0, 1]], 0.0);
        assert_eq!(d[[1, 0]], 1.0);
        assert!((d[[1, 1]] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn segmentation_ramp_is_monotonic() {
        let mask = DepthMask::new(
            array![[0.0, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8]],
            MaskKind::Segmentation,
        );
        let d = subject_distance(&mask, &DepthBlendParams::default());
        for pair in d.row(0).to_vec().windows(2) {
            assert!(pair[0] > pair[1], "{:?}", d);
        }
    }

    #[test]
    fn depth_in_front_of_focal_plane_is_sharp() {
        let mask = DepthMask::new(array![[0.2, 0.4, 0.7, 1.0]], MaskKind::Depth);
        let params = DepthBlendParams {
            focal_depth: Some(0.4),
            ..DepthBlendParams::default()
        };
        let d = subject_distance(&mask, &params);
        assert_eq!(d[[0, 0]], 0.0);
        assert_eq!(d[[0, 1]], 0.0);
        assert!((d[[0, 2]] - 0.5).abs() < 1e-6);
        assert!((d[[0, 3]] - 1.0).abs() < 1e-6);
    }
}
