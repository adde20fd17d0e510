use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};

use crate::align::WarpedFrame;
use crate::frame::Frame;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaxLuminanceParams {
    /// Hysteresis: the luminance margin a later frame needs over the current
    /// winner before it replaces it. The default of zero selects the plain
    /// per-pixel maximum; a small positive value keeps sensor noise from
    /// flipping flat regions between frames.
    pub min_gain: f32,
}

/// Incremental "lighten": each pixel keeps the full colour of the brightest
/// layer seen so far. Equal luminance keeps the earlier layer.
pub fn merge(layers: &[WarpedFrame], params: &MaxLuminanceParams) -> Frame {
    let first = &layers[0].frame;
    let mut best_lum = first.luminance();
    let mut winner = Array2::<usize>::zeros(first.dim());
    let gain = params.min_gain.max(0.0);

    for (i, layer) in layers.iter().enumerate().skip(1) {
        let lum = layer.frame.luminance();
        Zip::from(&mut best_lum)
            .and(&mut winner)
            .and(&lum)
            .par_for_each(|best, win, &l| {
                if l > *best + gain {
                    *best = l;
                    *win = i;
                }
            });
    }

    let planes = (0..first.planes().len())
        .map(|ch| {
            Zip::indexed(&winner)
                .par_map_collect(|(r, c), &i| layers[i].frame.plane(ch)[[r, c]])
        })
        .collect();
    first.with_planes(planes)
}
