use ndarray::{Array2, Zip};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::align::WarpedFrame;
use crate::consts::{DEFAULT_BLOCK_SIZE, DEFAULT_SEAM_FEATHER, EPSILON};
use crate::filters::gaussian_blur::gaussian_blur_array;
use crate::frame::Frame;
use crate::quality::gradient::{block_energy, gradient_energy_map};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SharpnessParams {
    /// Side of the square selection blocks, in pixels.
    pub block_size: usize,
    /// Gaussian sigma of the blend across block seams. Zero gives hard seams.
    pub seam_feather: f32,
}

impl Default for SharpnessParams {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            seam_feather: DEFAULT_SEAM_FEATHER,
        }
    }
}

/// Per-block sharpest-frame selection with feathered seams.
pub fn merge(layers: &[WarpedFrame], params: &SharpnessParams) -> Frame {
    let first = &layers[0].frame;
    let (h, w) = first.dim();
    let block = params.block_size.max(1);

    let energies: Vec<Array2<f64>> = layers
        .par_iter()
        .map(|l| block_energy(&gradient_energy_map(&l.frame.luminance()), block))
        .collect();
    let winners = block_winners(&energies);

    // Feathered one-hot selection map per layer.
    let selection: Vec<Array2<f32>> = (0..layers.len())
        .into_par_iter()
        .map(|i| {
            let hard = Array2::from_shape_fn((h, w), |(r, c)| {
                if winners[[r / block, c / block]] == i {
                    1.0
                } else {
                    0.0
                }
            });
            gaussian_blur_array(&hard, params.seam_feather)
        })
        .collect();

    // Top-2 layers per pixel and the share of the first.
    let picks = Zip::indexed(&selection[0]).par_map_collect(|(r, c), _| {
        let (mut a, mut wa, mut b, mut wb) = (0usize, f32::MIN, 0usize, f32::MIN);
        for (i, sel) in selection.iter().enumerate() {
            let v = sel[[r, c]];
            if v > wa {
                (b, wb) = (a, wa);
                (a, wa) = (i, v);
            } else if v > wb {
                (b, wb) = (i, v);
            }
        }
        let total = wa.max(0.0) + wb.max(0.0);
        let share = if total > EPSILON { wa.max(0.0) / total } else { 1.0 };
        (a, b, share)
    });

    let planes = (0..first.planes().len())
        .map(|ch| {
            Zip::indexed(&picks).par_map_collect(|(r, c), &(a, b, t)| {
                let pa = layers[a].frame.plane(ch)[[r, c]];
                if t >= 1.0 {
                    pa
                } else {
                    t * pa + (1.0 - t) * layers[b].frame.plane(ch)[[r, c]]
                }
            })
        })
        .collect();
    first.with_planes(planes)
}

/// Index of the sharpest layer per block. Ties go to the lowest index and
/// blocks with no texture in any layer go to layer 0.
fn block_winners(energies: &[Array2<f64>]) -> Array2<usize> {
    Array2::from_shape_fn(energies[0].dim(), |idx| {
        let mut best = 0;
        let mut best_energy = energies[0][idx];
        for (i, e) in energies.iter().enumerate().skip(1) {
            if e[idx] > best_energy {
                best = i;
                best_energy = e[idx];
            }
        }
        if best_energy <= EPSILON as f64 {
            0
        } else {
            best
        }
    })
}
