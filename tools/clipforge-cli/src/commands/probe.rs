//! Show probed media facts.

use std::path::PathBuf;

use clipforge_common::config::AppConfig;
use clipforge_render_engine::{probe, Engine};

pub fn run(config: &AppConfig, path: PathBuf, json: bool) -> anyhow::Result<()> {
    let engine = Engine::locate(config)?;
    let info = probe(&engine, &path)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("File: {}", path.display());
    println!("  Resolution: {}x{}", info.width, info.height);
    match info.known_duration() {
        Some(duration) => println!("  Duration: {duration:.2}s"),
        None => println!("  Duration: unknown"),
    }
    println!("  Audio: {}", if info.has_audio { "yes" } else { "no" });
    if let Some(rotation) = info.rotation_degrees {
        println!("  Rotation: {rotation}° (dimensions shown as displayed)");
    }
    println!(
        "  Orientation: {}",
        if info.is_portrait() { "portrait" } else { "landscape" }
    );
    Ok(())
}
