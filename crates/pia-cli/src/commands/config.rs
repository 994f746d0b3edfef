//! Config command

use crate::app::{ConfigAction, ConfigArgs, OutputFormat};
use anyhow::{bail, Result};
use pia_core::Config;
use std::path::Path;

pub fn run(
    args: ConfigArgs,
    config: &Config,
    path: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    match args.action {
        ConfigAction::Show => {
            let mut shown = config.clone();
            if shown.api_key.is_some() {
                shown.api_key = Some("********".to_string());
            }
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&shown)?),
                OutputFormat::Cli => print!("{}", serde_yaml::to_string(&shown)?),
            }
        }
        ConfigAction::Init { force } => {
            let path = path.map(Path::to_path_buf).unwrap_or_else(Config::default_path);
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            Config::default().save(&path)?;
            println!("Wrote {}", path.display());
        }
    }
    Ok(())
}
