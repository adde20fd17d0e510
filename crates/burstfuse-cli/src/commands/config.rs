use std::path::PathBuf;

use anyhow::{Context, Result};
use burstfuse_core::pipeline::PipelineConfig;
use clap::Args;

use crate::summary::print_config_check;

#[derive(Args)]
pub struct ConfigArgs {
    /// Write the default config to a file instead of stdout
    #[arg(short, long, conflicts_with = "check")]
    pub output: Option<PathBuf>,

    /// Validate an existing config file and show the values it resolves to
    #[arg(long)]
    pub check: Option<PathBuf>,
}

pub fn run(args: &ConfigArgs) -> Result<()> {
    if let Some(ref path) = args.check {
        let config = PipelineConfig::load(path)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        print_config_check(path, &config);
        return Ok(());
    }

    let text = PipelineConfig::default().to_toml_string()?;
    match args.output {
        Some(ref path) => {
            std::fs::write(path, &text)
                .with_context(|| format!("Failed to write config to {}", path.display()))?;
            println!("Default config saved to {}", path.display());
        }
        None => print!("{}", text),
    }
    Ok(())
}
