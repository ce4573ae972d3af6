//! Check engine availability and encoders.

use std::process::Stdio;

use clipforge_common::config::{config_file_path, AppConfig};
use clipforge_render_engine::engine::thread_cap;
use clipforge_render_engine::Engine;

pub fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("Clipforge System Check");
    println!("{}", "=".repeat(50));

    let path = config_file_path();
    if path.exists() {
        println!("[OK] Config: {}", path.display());
    } else {
        println!("[--] Config: defaults ({} not found)", path.display());
    }

    let engine = match Engine::locate(config) {
        Ok(engine) => engine,
        Err(e) => {
            println!("[FAIL] Media engine: {e}");
            println!();
            println!("Install ffmpeg or point engine_path / CLIPFORGE_ENGINE at a binary.");
            return Ok(());
        }
    };

    let version = engine_output(&engine, &["-hide_banner", "-version"]);
    let first_line = version.lines().next().unwrap_or("unknown version");
    println!("[OK] Media engine: {} ({first_line})", engine.program().display());

    let encoders = engine_output(&engine, &["-hide_banner", "-encoders"]);
    for (name, label) in [("libx264", "CPU encoder"), ("h264_nvenc", "GPU encoder")] {
        if encoders.contains(name) {
            println!("[OK] {label}: {name}");
        } else {
            println!("[WARN] {label}: {name} not available");
        }
    }

    println!(
        "[OK] Workers: {} (engine threads per job: {})",
        config.worker_threads(),
        thread_cap()
    );
    println!("[OK] Poll interval: {:?}", config.poll_interval());

    println!();
    if encoders.contains("libx264") {
        println!("Clipforge is ready.");
    } else {
        println!("libx264 is required for rendering and normalization.");
    }
    Ok(())
}

fn engine_output(engine: &Engine, args: &[&str]) -> String {
    engine
        .command()
        .args(args)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .map(|out| String::from_utf8_lossy(&out.stdout).into_owned())
        .unwrap_or_default()
}
