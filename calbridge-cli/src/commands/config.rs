use std::path::Path;

use anyhow::Result;
use owo_colors::OwoColorize;

use crate::settings::Settings;

pub fn show(config_path: &Path) -> Result<()> {
    let status = if config_path.exists() {
        "exists".green().to_string()
    } else {
        "missing, run `calbridge config init`".yellow().to_string()
    };

    println!("{}", "Paths".bold());
    println!("  Config:  {} ({})", config_path.display(), status);

    let settings = Settings::load(config_path)?;
    let mapping = toml::to_string_pretty(&settings.mapping)?;
    println!();
    println!("{}", "Mapping".bold());
    for line in mapping.lines() {
        println!("  {line}");
    }

    Ok(())
}

pub fn init(config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        anyhow::bail!(
            "{} already exists.\n\nUse --force to overwrite it.",
            config_path.display()
        );
    }

    Settings::create_default_config(config_path)?;
    println!("{} {}", "Created".green(), config_path.display());

    Ok(())
}
