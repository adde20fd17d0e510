use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use burstfuse_core::frame::{Frame, FrameStack, MaskKind};
use burstfuse_core::fusion::FusionModeKind;
use burstfuse_core::io::{load_image, load_mask, FileSink, Orientation, OutputDirective, OutputFormat};
use burstfuse_core::pipeline::{
    FusionInput, FusionPipeline, FusionWarning, PipelineConfig, PipelineState, ProgressReporter,
};
use clap::{Args, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

use crate::summary::{print_fusion_summary, print_result};

#[derive(Clone, Copy, ValueEnum)]
pub enum ModeArg {
    /// Outlier-rejecting average (DenoiseAverage)
    Night,
    /// Per-pixel brightest frame (MaxLuminance)
    Trails,
    /// Per-block sharpest frame (SharpnessSelect)
    Focus,
    /// Synthetic background blur from a mask (DepthAwareBlend)
    Portrait,
}

impl From<ModeArg> for FusionModeKind {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Night => FusionModeKind::DenoiseAverage,
            ModeArg::Trails => FusionModeKind::MaxLuminance,
            ModeArg::Focus => FusionModeKind::SharpnessSelect,
            ModeArg::Portrait => FusionModeKind::DepthAwareBlend,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OrientationArg {
    Up,
    Right,
    Down,
    Left,
}

impl From<OrientationArg> for Orientation {
    fn from(arg: OrientationArg) -> Self {
        match arg {
            OrientationArg::Up => Orientation::Up,
            OrientationArg::Right => Orientation::Right,
            OrientationArg::Down => Orientation::Down,
            OrientationArg::Left => Orientation::Left,
        }
    }
}

#[derive(Args)]
pub struct FuseArgs {
    /// Input frames in capture order; the first is the alignment reference
    #[arg(required = true)]
    pub frames: Vec<PathBuf>,

    /// Fusion mode
    #[arg(long, value_enum, default_value = "night")]
    pub mode: ModeArg,

    /// Segmentation or depth mask for portrait mode
    #[arg(long)]
    pub mask: Option<PathBuf>,

    /// Treat the mask as relative depth (0 near, 1 far) instead of a subject mask
    #[arg(long)]
    pub depth: bool,

    /// Pipeline config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Output file path; the extension picks PNG, TIFF or JPEG
    #[arg(short, long, default_value = "fused.png")]
    pub output: PathBuf,

    /// JPEG quality (1-100)
    #[arg(long, default_value = "95")]
    pub quality: u8,

    /// Rotation applied when writing the output
    #[arg(long, value_enum, default_value = "up")]
    pub orientation: OrientationArg,

    /// Disable tone mapping
    #[arg(long)]
    pub no_tonemap: bool,

    /// Disable sharpening
    #[arg(long)]
    pub no_sharpen: bool,

    /// Wall-clock limit in milliseconds
    #[arg(long)]
    pub deadline_ms: Option<u64>,

    /// Keep the fused frame if the deadline hits after fusion
    #[arg(long)]
    pub best_effort: bool,
}

/// Drives an indicatif bar from pipeline state changes.
struct BarReporter {
    pb: ProgressBar,
}

impl ProgressReporter for BarReporter {
    fn begin_stage(&self, stage: PipelineState, total_items: Option<usize>) {
        self.pb.set_message(stage.to_string());
        self.pb.set_length(total_items.unwrap_or(1) as u64);
        self.pb.set_position(0);
    }

    fn advance(&self, items_done: usize) {
        self.pb.set_position(items_done as u64);
    }

    fn finish_stage(&self) {
        if let Some(len) = self.pb.length() {
            self.pb.set_position(len);
        }
    }

    fn warn(&self, warning: &FusionWarning) {
        self.pb.println(format!("  warning: {}", warning));
    }
}

pub fn run(args: &FuseArgs) -> Result<()> {
    let mut config = match args.config {
        Some(ref path) => PipelineConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if args.no_tonemap {
        config.tone_mapping = None;
    }
    if args.no_sharpen {
        config.sharpening = None;
    }
    if args.deadline_ms.is_some() {
        config.deadline_ms = args.deadline_ms;
    }
    config.best_effort |= args.best_effort;

    let kind = FusionModeKind::from(args.mode);
    let mode = config.modes.mode(kind);
    let directive = OutputDirective {
        format: OutputFormat::from_path(&args.output).unwrap_or(OutputFormat::Png),
        quality: args.quality,
        orientation: args.orientation.into(),
    };
    print_fusion_summary(&config, &mode, &args.frames, &args.output);

    let pb = ProgressBar::new(args.frames.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg:20} [{bar:40}] {pos}/{len}")?
            .progress_chars("=> "),
    );

    pb.set_message("Reading frames");
    let mut frames: Vec<Frame> = Vec::with_capacity(args.frames.len());
    for path in &args.frames {
        frames.push(load_image(path).with_context(|| format!("Failed to load {}", path.display()))?);
        pb.inc(1);
    }
    let stack = FrameStack::new(frames).context("Frames do not form a burst")?;
    let (height, width) = stack.dim();
    debug!(frames = stack.len(), width, height, "loaded burst");

    let mut input = FusionInput::stack(stack);
    if let Some(ref path) = args.mask {
        let kind = if args.depth {
            MaskKind::Depth
        } else {
            MaskKind::Segmentation
        };
        let mask = load_mask(path, kind)
            .with_context(|| format!("Failed to load mask {}", path.display()))?;
        input = input.with_mask(mask);
    }

    let pipeline = FusionPipeline::with_default_pool(config)?
        .with_reporter(Arc::new(BarReporter { pb: pb.clone() }))
        .with_sink(Arc::new(FileSink::new(&args.output)), directive);
    let result = pipeline.fuse(input, mode);
    pb.finish_and_clear();

    let result = result.with_context(|| format!("{} fusion failed", kind))?;
    print_result(&result, &args.output);
    Ok(())
}
