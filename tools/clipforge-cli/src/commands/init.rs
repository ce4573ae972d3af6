//! Write a default settings document.

use std::path::PathBuf;

use clipforge_common::config::{config_file_path, AppConfig};
use clipforge_edit_model::JobSettings;

pub fn run(path: PathBuf, force: bool, write_config: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }

    JobSettings::default()
        .save(&path)
        .map_err(|e| anyhow::anyhow!("Failed to write settings: {e}"))?;
    println!("Settings written to {}", path.display());
    println!("  geometry: source, fit: fit, encoder: CPU");
    println!("  Edit the file, then run: clipforge process -s {} <files>", path.display());

    if write_config {
        let config_path = config_file_path();
        if config_path.exists() {
            println!("Config already present at {}", config_path.display());
        } else {
            AppConfig::default().save()?;
            println!("Config written to {}", config_path.display());
        }
    }
    Ok(())
}
