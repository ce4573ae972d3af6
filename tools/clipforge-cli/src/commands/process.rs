//! Edit a batch of files.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clipforge_common::config::AppConfig;
use clipforge_edit_model::JobStatus;
use clipforge_render_engine::batch::OUTPUT_SUFFIX;
use clipforge_render_engine::{BatchHooks, BatchJob, BatchScheduler, Engine, ProgressSlot};

use super::load_settings;

/// File extensions picked up when a directory is given.
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "mkv", "avi", "webm", "m4v"];

pub struct ProcessOptions {
    pub inputs: Vec<PathBuf>,
    pub settings: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub threads: Option<usize>,
    pub gpu: bool,
    pub report: Option<PathBuf>,
}

pub async fn run(config: &AppConfig, options: ProcessOptions) -> anyhow::Result<()> {
    let engine = Engine::locate(config)?;
    let mut settings = load_settings(options.settings.as_deref())?;
    if options.gpu {
        settings.prefer_gpu = true;
    }

    let inputs = collect_inputs(&options.inputs)?;
    let jobs = plan_jobs(inputs, options.output, options.output_dir.as_deref())?;
    let threads = options.threads.unwrap_or_else(|| config.worker_threads());

    println!(
        "Processing {} file(s) on {} worker(s) with {}",
        jobs.len(),
        threads.max(1),
        engine.program().display()
    );

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nStopping after the current engine poll...");
            flag.store(true, Ordering::SeqCst);
        }
    });

    let slot = ProgressSlot::new();
    let per_job = Arc::new(Mutex::new(vec![0u8; jobs.len()]));
    let hooks = {
        let slot = slot.clone();
        let per_job = per_job.clone();
        let finished_jobs = per_job.clone();
        let finished_slot = slot.clone();
        BatchHooks::new()
            .with_progress(move |index, percent| {
                let overall = record_progress(&per_job, index, percent);
                slot.publish(overall);
            })
            .with_log(|message| tracing::debug!(target: "clipforge::job", "{message}"))
            .with_cancel_flag(cancel)
            .with_finished(move |index, result| {
                let overall = record_progress(&finished_jobs, index, 100);
                finished_slot.publish(overall);
                let marker = match result.status {
                    JobStatus::Completed => "[OK]",
                    JobStatus::Stopped => "[STOP]",
                    JobStatus::Failed => "[FAIL]",
                };
                println!("\r{marker} {}", result.input.display());
                if let Some(message) = &result.message {
                    println!("       {message}");
                }
                for warning in &result.warnings {
                    println!("       warning: {warning}");
                }
            })
    };

    let display_slot = slot.clone();
    let display = tokio::task::spawn_blocking(move || display_progress(&display_slot));

    let scheduler = BatchScheduler::new(engine, threads);
    let summary =
        tokio::task::spawn_blocking(move || scheduler.run(jobs, &settings, &hooks)).await?;

    slot.close();
    display.await?;

    println!();
    println!(
        "Finished: succeeded={}, failed={}, stopped={}",
        summary.succeeded, summary.failed, summary.stopped
    );

    if let Some(report) = &options.report {
        summary.write_report(report)?;
        println!("Report written to {}", report.display());
    }

    if summary.failed > 0 {
        anyhow::bail!("{} of {} file(s) failed", summary.failed, summary.completed);
    }
    Ok(())
}

/// Store one job's percentage and return the batch-wide average.
fn record_progress(per_job: &Mutex<Vec<u8>>, index: usize, percent: u8) -> u8 {
    let mut values = per_job.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(value) = values.get_mut(index) {
        *value = (*value).max(percent);
    }
    if values.is_empty() {
        return 0;
    }
    let total: usize = values.iter().map(|v| *v as usize).sum();
    (total / values.len()) as u8
}

fn display_progress(slot: &ProgressSlot) {
    loop {
        match slot.wait_timeout(Duration::from_millis(250)) {
            Some(percent) => {
                print!("\r  Progress: {percent:>3}%  ");
                let _ = std::io::stdout().flush();
            }
            None if slot.is_closed() => break,
            None => {}
        }
    }
}

/// Expand directories into the video files they directly contain, skipping
/// earlier outputs.
fn collect_inputs(paths: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let mut inputs = vec![];
    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = std::fs::read_dir(path)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_video(p) && !is_output(p))
                .collect();
            found.sort();
            if found.is_empty() {
                tracing::warn!(dir = %path.display(), "No video files found");
            }
            inputs.extend(found);
        } else {
            inputs.push(path.clone());
        }
    }
    Ok(inputs)
}

fn plan_jobs(
    inputs: Vec<PathBuf>,
    output: Option<PathBuf>,
    output_dir: Option<&Path>,
) -> anyhow::Result<Vec<BatchJob>> {
    if inputs.is_empty() {
        anyhow::bail!("no input files");
    }
    match output {
        Some(output) if inputs.len() == 1 => {
            Ok(inputs.into_iter().map(|input| BatchJob::new(input, &output)).collect())
        }
        Some(_) => anyhow::bail!("--output needs exactly one input; use --output-dir for batches"),
        None => Ok(inputs
            .into_iter()
            .map(|input| BatchJob::with_default_output(input, output_dir))
            .collect()),
    }
}

fn is_video(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
}

fn is_output(path: &Path) -> bool {
    path.file_stem()
        .is_some_and(|stem| stem.to_string_lossy().ends_with(OUTPUT_SUFFIX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_inputs_skip_outputs_and_non_video() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.mp4", "a.MOV", "a_edited.mp4", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let inputs = collect_inputs(&[dir.path().to_path_buf()]).unwrap();
        let names: Vec<String> = inputs
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.MOV", "b.mp4"]);
    }

    #[test]
    fn test_explicit_output_needs_single_input() {
        let jobs = plan_jobs(vec!["/in/a.mp4".into()], Some("/out/x.mp4".into()), None).unwrap();
        assert_eq!(jobs[0].output, PathBuf::from("/out/x.mp4"));
        assert!(plan_jobs(
            vec!["/in/a.mp4".into(), "/in/b.mp4".into()],
            Some("/out/x.mp4".into()),
            None
        )
        .is_err());
        assert!(plan_jobs(vec![], None, None).is_err());
    }

    #[test]
    fn test_record_progress_averages() {
        let per_job = Mutex::new(vec![0u8; 4]);
        assert_eq!(record_progress(&per_job, 0, 100), 25);
        assert_eq!(record_progress(&per_job, 1, 50), 37);
        // Never moves backwards for one job.
        assert_eq!(record_progress(&per_job, 0, 10), 37);
    }
}
