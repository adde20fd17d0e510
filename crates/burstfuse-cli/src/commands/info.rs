use std::path::PathBuf;

use anyhow::{Context, Result};
use burstfuse_core::frame::Frame;
use burstfuse_core::io::load_image;
use burstfuse_core::quality::{rank_frames, QualityMetric};
use clap::Args;

#[derive(Args)]
pub struct InfoArgs {
    /// Input image files
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

pub fn run(args: &InfoArgs) -> Result<()> {
    let frames: Vec<Frame> = args
        .files
        .iter()
        .map(|p| load_image(p).with_context(|| format!("Failed to load {}", p.display())))
        .collect::<Result<_>>()?;

    for (path, frame) in args.files.iter().zip(&frames) {
        println!("File:        {}", path.display());
        println!("Dimensions:  {}x{}", frame.width(), frame.height());
        println!("Format:      {}", frame.format());
        println!(
            "Data size:   {:.1} MB",
            frame.byte_size() as f64 / (1024.0 * 1024.0)
        );
        println!();
    }

    println!("Sharpness (best first):");
    for (rank, (i, score)) in rank_frames(&frames, QualityMetric::Laplacian)
        .iter()
        .enumerate()
    {
        println!(
            "  #{:<3} {}  laplacian={:.6}  gradient={:.6}",
            rank + 1,
            args.files[*i].display(),
            score.laplacian_variance,
            score.gradient_energy
        );
    }

    Ok(())
}
