//! Dry run: print the filter graph and the engine command for one file.

use std::path::PathBuf;

use clipforge_common::config::AppConfig;
use clipforge_edit_model::MediaInfo;
use clipforge_filter_graph::builder::output_duration;
use clipforge_filter_graph::geometry::aspect_arg;
use clipforge_filter_graph::{audio_filters, build, resolve_canvas};
use clipforge_render_engine::engine::{EncoderProfile, RenderInvocation};
use clipforge_render_engine::{probe, sanitize_assets, Engine};

use super::load_settings;

pub fn run(config: &AppConfig, path: PathBuf, settings: Option<PathBuf>) -> anyhow::Result<()> {
    let settings = load_settings(settings.as_deref())?;
    let (settings, warnings) = sanitize_assets(&settings);
    for warning in &warnings {
        println!("warning: {warning}");
    }

    let info = match Engine::locate(config).map_err(anyhow::Error::from).and_then(|engine| {
        probe(&engine, &path).map_err(anyhow::Error::from)
    }) {
        Ok(info) => info,
        Err(e) => {
            println!("warning: probe unavailable ({e}); assuming defaults");
            MediaInfo::default()
        }
    };

    let canvas = resolve_canvas(&settings, &info);
    let compiled = build(&settings, &info)?.compile()?;
    let audio = audio_filters(&settings);
    let aspect = aspect_arg(&settings, canvas);

    println!("Source: {}x{}, {:.2}s", info.width, info.height, info.duration_secs);
    println!("Canvas: {}", canvas.size_arg());
    if let Some(duration) = output_duration(&settings, &info) {
        println!("Output duration: {duration:.2}s");
    }
    println!();
    println!("Filter graph:");
    for chain in compiled.text.split(';') {
        println!("  {chain}");
    }
    if let Some(audio) = &audio {
        println!("Audio filters: {audio}");
    }

    let output = path.with_file_name("dry_run.mp4");
    let args = RenderInvocation {
        input: &path,
        output: &output,
        settings: &settings,
        graph: &compiled,
        audio_filter: audio.as_deref(),
        aspect: &aspect,
        profile: EncoderProfile::from_preference(settings.prefer_gpu),
    }
    .args();
    println!();
    println!("Engine arguments:");
    println!("  {}", args.join(" "));
    Ok(())
}
