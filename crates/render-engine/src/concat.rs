//! Stream-copy concatenation with backup and restore.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use clipforge_common::error::{ClipforgeError, ClipforgeResult};

use crate::engine::{strings, Engine};
use crate::hooks::JobHooks;
use crate::supervisor::{supervise, RunOutcome};

/// Suffix appended to the output name for the pre-concatenation backup.
pub const BACKUP_SUFFIX: &str = ".original_backup.mp4";

const REMOVE_ATTEMPTS: u32 = 5;
const REMOVE_BACKOFF: Duration = Duration::from_millis(100);

/// Serializes the post-render stage across concurrently running jobs.
#[derive(Debug, Clone, Default)]
pub struct ConcatStage {
    lock: Arc<Mutex<()>>,
}

impl ConcatStage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold the stage for the duration of the guard.
    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Backup location for an output file.
pub fn backup_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

/// One manifest line: absolute path, forward slashes, quotes escaped.
pub fn manifest_line(segment: &Path) -> String {
    let absolute = if segment.is_absolute() {
        segment.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(segment))
            .unwrap_or_else(|_| segment.to_path_buf())
    };
    let normalized = absolute
        .to_string_lossy()
        .replace('\\', "/")
        .replace('\'', "'\\''");
    format!("file '{normalized}'")
}

/// Remove a file, retrying briefly while another process holds it.
pub fn remove_file_with_retry(path: &Path) -> bool {
    for attempt in 1..=REMOVE_ATTEMPTS {
        match std::fs::remove_file(path) {
            Ok(()) => return true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return true,
            Err(e) if attempt == REMOVE_ATTEMPTS => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove file");
            }
            Err(_) => std::thread::sleep(REMOVE_BACKOFF),
        }
    }
    false
}

/// Join `segments` in order into `output` without re-encoding.
///
/// The existing `output` is backed up first and restored if the engine
/// fails or is cancelled; without a backup nothing is attempted. The
/// caller should hold [`ConcatStage::lock`].
pub fn concatenate(
    engine: &Engine,
    segments: &[&Path],
    output: &Path,
    hooks: &JobHooks,
) -> ClipforgeResult<()> {
    if segments.is_empty() {
        return Err(ClipforgeError::concat("no segments to concatenate"));
    }

    let mut manifest = tempfile::Builder::new()
        .prefix("clipforge_concat_")
        .suffix(".txt")
        .tempfile()?;
    for segment in segments {
        writeln!(manifest, "{}", manifest_line(segment))?;
    }
    manifest.flush()?;

    let backup = backup_path(output);
    let had_output = output.exists();
    if had_output {
        std::fs::copy(output, &backup).map_err(|e| {
            ClipforgeError::concat(format!(
                "cannot back up {} before concatenation: {e}",
                output.display()
            ))
        })?;
    }

    tracing::info!(
        segments = segments.len(),
        output = %output.display(),
        "Concatenating segments"
    );

    let mut args = strings(&["-y", "-hide_banner", "-f", "concat", "-safe", "0", "-i"]);
    args.push(manifest.path().to_string_lossy().into_owned());
    args.extend(strings(&["-c", "copy"]));
    args.push(output.to_string_lossy().into_owned());

    let result = match supervise(engine, &args, None, hooks) {
        Ok(report) => match report.outcome {
            RunOutcome::Completed if non_empty(output) => Ok(()),
            RunOutcome::Completed => Err(ClipforgeError::concat("engine produced an empty file")),
            RunOutcome::Stopped => Err(ClipforgeError::Cancelled),
            failed => Err(ClipforgeError::concat(
                failed.failure_summary().unwrap_or_default(),
            )),
        },
        Err(e) => Err(e),
    };

    if result.is_err() && had_output {
        restore(&backup, output)?;
        hooks.log("Concatenation failed; original output restored");
    }
    if had_output {
        remove_file_with_retry(&backup);
    }
    result
}

fn restore(backup: &Path, output: &Path) -> ClipforgeResult<()> {
    std::fs::copy(backup, output).map_err(|e| {
        ClipforgeError::concat(format!(
            "restore from {} failed: {e}; backup kept",
            backup.display()
        ))
    })?;
    tracing::warn!(output = %output.display(), "Restored pre-concatenation output");
    Ok(())
}

fn non_empty(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}
