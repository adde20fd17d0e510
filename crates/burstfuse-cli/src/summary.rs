use std::path::{Path, PathBuf};

use burstfuse_core::fusion::{FusionMode, FusionModeKind};
use burstfuse_core::pipeline::{FusionResult, PipelineConfig, PipelineState};
use console::Style;

struct Styles {
    title: Style,
    label: Style,
    value: Style,
    method: Style,
    disabled: Style,
    warning: Style,
    path: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            method: Style::new().green(),
            disabled: Style::new().dim().yellow(),
            warning: Style::new().yellow(),
            path: Style::new().underlined(),
        }
    }
}

pub fn print_fusion_summary(config: &PipelineConfig, mode: &FusionMode, frames: &[PathBuf], output: &Path) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("Burst Fusion"));
    println!("  {}", s.title.apply_to("\u{2550}".repeat(12)));
    println!();

    println!(
        "  {:<14}{}",
        s.label.apply_to("Frames"),
        s.value.apply_to(frames.len())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Output"),
        s.path.apply_to(output.display())
    );
    println!("  {:<14}{}", s.label.apply_to("Mode"), s.method.apply_to(mode));
    println!(
        "  {:<14}{}",
        s.label.apply_to("Min conf."),
        s.value.apply_to(config.alignment.min_confidence)
    );

    match &config.tone_mapping {
        Some(tm) => println!(
            "  {:<14}{}",
            s.label.apply_to("Tone map"),
            s.method.apply_to(format!("range {:.1}, {:?}", tm.target_range, tm.clip))
        ),
        None => println!("  {:<14}{}", s.label.apply_to("Tone map"), s.disabled.apply_to("disabled")),
    }
    match &config.sharpening {
        Some(sh) => println!(
            "  {:<14}{}",
            s.label.apply_to("Sharpen"),
            s.method.apply_to(format!("radius {:.1}, amount {:.2}", sh.radius, sh.amount))
        ),
        None => println!("  {:<14}{}", s.label.apply_to("Sharpen"), s.disabled.apply_to("disabled")),
    }
    if let Some(ms) = config.deadline_ms {
        let policy = if config.best_effort { " (best effort)" } else { "" };
        println!(
            "  {:<14}{}",
            s.label.apply_to("Deadline"),
            s.value.apply_to(format!("{} ms{}", ms, policy))
        );
    }
    println!();
}

/// List what a validated config file resolves to, one mode per line.
pub fn print_config_check(path: &Path, config: &PipelineConfig) {
    let s = Styles::new();

    println!("{} is valid", s.path.apply_to(path.display()));
    for kind in FusionModeKind::ALL {
        if config.is_allowed(kind) {
            println!(
                "  {:<18}{} (burst of {})",
                s.label.apply_to(kind),
                s.method.apply_to(config.modes.mode(kind)),
                config.burst_target(kind)
            );
        } else {
            println!("  {:<18}{}", s.label.apply_to(kind), s.disabled.apply_to("not allowed"));
        }
    }
    let budget = config
        .memory_budget_bytes
        .map(|b| format!("{:.1} MiB", b as f64 / (1024.0 * 1024.0)))
        .unwrap_or_else(|| "unbounded".into());
    println!("  {:<18}{}", s.label.apply_to("Memory budget"), s.value.apply_to(budget));
}

pub fn print_result(result: &FusionResult, output: &Path) {
    let s = Styles::new();

    println!(
        "  {:<14}{}x{} from {} frame(s)",
        s.label.apply_to("Result"),
        result.width(),
        result.height(),
        result.frames_consumed
    );
    for stage in [
        PipelineState::Collecting,
        PipelineState::Aligning,
        PipelineState::Fusing,
        PipelineState::ToneMapping,
        PipelineState::Sharpening,
    ] {
        println!(
            "  {:<14}{:.1} ms",
            s.label.apply_to(stage),
            result.timings.get(stage).as_secs_f64() * 1000.0
        );
    }
    for entry in &result.alignment {
        if entry.excluded {
            println!(
                "  {:<14}frame {} (confidence {:.2})",
                s.warning.apply_to("Excluded"),
                entry.index,
                entry.transform.confidence
            );
        }
    }
    for warning in &result.warnings {
        println!("  {:<14}{}", s.warning.apply_to("Warning"), warning);
    }
    println!();
    println!("Output saved to {}", s.path.apply_to(output.display()));
}
