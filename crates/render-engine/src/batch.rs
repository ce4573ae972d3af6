//! Bounded worker pool over a list of files.

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use clipforge_common::error::ClipforgeResult;
use clipforge_edit_model::{ErrorClass, JobResult, JobSettings, JobStatus};
use serde::{Deserialize, Serialize};

use crate::engine::Engine;
use crate::hooks::{CancelFn, JobHooks, LogFn};
use crate::job::{JobRequest, JobRunner, SharedSegments};

/// Suffix of default output names: `clip.mov` becomes `clip_edited.mp4`.
pub const OUTPUT_SUFFIX: &str = "_edited";

/// One input/output pair in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchJob {
    pub input: PathBuf,
    pub output: PathBuf,
}

impl BatchJob {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
        }
    }

    /// Job writing to the default output name, next to the input or in
    /// `out_dir`.
    pub fn with_default_output(input: impl Into<PathBuf>, out_dir: Option<&Path>) -> Self {
        let input = input.into();
        let output = default_output_path(&input, out_dir);
        Self { input, output }
    }
}

/// `<dir>/<stem>_edited.mp4`
pub fn default_output_path(input: &Path, out_dir: Option<&Path>) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let dir = out_dir
        .map(Path::to_path_buf)
        .or_else(|| input.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    dir.join(format!("{stem}{OUTPUT_SUFFIX}.mp4"))
}

type BatchProgressFn = Arc<dyn Fn(usize, u8) + Send + Sync>;
type FinishedFn = Arc<dyn Fn(usize, &JobResult) + Send + Sync>;

/// Callbacks for a whole batch. Progress and completion carry the job's
/// index in the submitted list.
#[derive(Clone, Default)]
pub struct BatchHooks {
    progress: Option<BatchProgressFn>,
    log: Option<LogFn>,
    cancel: Option<CancelFn>,
    finished: Option<FinishedFn>,
}

impl fmt::Debug for BatchHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchHooks")
            .field("progress", &self.progress.is_some())
            .field("log", &self.log.is_some())
            .field("cancel", &self.cancel.is_some())
            .field("finished", &self.finished.is_some())
            .finish()
    }
}

impl BatchHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_progress(mut self, f: impl Fn(usize, u8) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(f));
        self
    }

    pub fn with_log(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.log = Some(Arc::new(f));
        self
    }

    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(Arc::new(move || flag.load(Ordering::SeqCst)));
        self
    }

    pub fn with_finished(mut self, f: impl Fn(usize, &JobResult) + Send + Sync + 'static) -> Self {
        self.finished = Some(Arc::new(f));
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|f| f())
    }

    fn log(&self, message: &str) {
        if let Some(f) = &self.log {
            f(message);
        }
    }

    /// Per-job hooks; progress is tagged with `index`.
    fn for_job(&self, index: usize) -> JobHooks {
        let progress = self.progress.clone().map(|f| {
            Arc::new(move |percent: u8| f(index, percent)) as Arc<dyn Fn(u8) + Send + Sync>
        });
        JobHooks::with_shared(progress, self.log.clone(), self.cancel.clone())
    }
}

/// Aggregate outcome of a batch, serializable as a JSON report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub completed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub stopped: usize,
    /// One result per submitted job, in submission order.
    pub results: Vec<JobResult>,
}

impl BatchSummary {
    pub fn write_report(&self, path: &Path) -> ClipforgeResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Counters {
    completed: usize,
    succeeded: usize,
    failed: usize,
    stopped: usize,
}

impl Counters {
    fn record(&mut self, status: JobStatus) {
        self.completed += 1;
        match status {
            JobStatus::Completed => self.succeeded += 1,
            JobStatus::Failed => self.failed += 1,
            JobStatus::Stopped => self.stopped += 1,
        }
    }
}

/// Runs independent jobs on a fixed number of worker threads.
#[derive(Debug, Clone)]
pub struct BatchScheduler {
    engine: Engine,
    threads: usize,
}

impl BatchScheduler {
    pub fn new(engine: Engine, threads: usize) -> Self {
        Self {
            engine,
            threads: threads.max(1),
        }
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Run every job with the same settings. Never panics because of a
    /// job: a panicking worker is recorded as a failed result and the
    /// other workers carry on.
    pub fn run(&self, jobs: Vec<BatchJob>, settings: &JobSettings, hooks: &BatchHooks) -> BatchSummary {
        let started_at = Utc::now();
        let total = jobs.len();
        tracing::info!(jobs = total, threads = self.threads, "Starting batch");

        let prep_hooks = JobHooks::with_shared(None, hooks.log.clone(), hooks.cancel.clone());
        let (shared, settings) = match SharedSegments::prepare(&self.engine, settings, &prep_hooks) {
            Ok(prepared) => prepared,
            Err(e) => {
                tracing::warn!(error = %e, "Shared segment preparation aborted");
                (SharedSegments::default(), settings.clone())
            }
        };
        let settings = Arc::new(settings);
        let runner = JobRunner::new(self.engine.clone()).with_shared_segments(shared);

        let (tx, rx) = crossbeam_channel::unbounded();
        for entry in jobs.into_iter().enumerate() {
            let _ = tx.send(entry);
        }
        drop(tx);

        let results: Mutex<Vec<Option<JobResult>>> = Mutex::new(vec![None; total]);
        let counters = Mutex::new(Counters::default());
        let workers = self.threads.min(total.max(1));

        std::thread::scope(|scope| {
            for worker in 0..workers {
                let rx = rx.clone();
                let (runner, settings, results, counters) = (&runner, &settings, &results, &counters);
                scope.spawn(move || {
                    while let Ok((index, job)) = rx.recv() {
                        let result = run_contained(runner, index, job, settings, hooks);

                        let (done, succeeded, failed) = {
                            let mut counters = counters.lock().unwrap_or_else(|e| e.into_inner());
                            counters.record(result.status);
                            (counters.completed, counters.succeeded, counters.failed)
                        };
                        tracing::info!(
                            worker,
                            done,
                            total,
                            status = ?result.status,
                            input = %result.input.display(),
                            "Job finished"
                        );
                        hooks.log(&format!(
                            "[{done}/{total}] {} ({succeeded} ok, {failed} failed)",
                            result.input.display()
                        ));
                        if let Some(f) = &hooks.finished {
                            f(index, &result);
                        }
                        results.lock().unwrap_or_else(|e| e.into_inner())[index] = Some(result);
                    }
                });
            }
        });

        let counters = counters.into_inner().unwrap_or_else(|e| e.into_inner());
        let results: Vec<JobResult> = results
            .into_inner()
            .unwrap_or_else(|e| e.into_inner())
            .into_iter()
            .flatten()
            .collect();

        tracing::info!(
            succeeded = counters.succeeded,
            failed = counters.failed,
            stopped = counters.stopped,
            "Batch finished"
        );

        BatchSummary {
            started_at,
            finished_at: Utc::now(),
            completed: counters.completed,
            succeeded: counters.succeeded,
            failed: counters.failed,
            stopped: counters.stopped,
            results,
        }
    }
}

fn run_contained(
    runner: &JobRunner,
    index: usize,
    job: BatchJob,
    settings: &Arc<JobSettings>,
    hooks: &BatchHooks,
) -> JobResult {
    if hooks.is_cancelled() {
        return JobResult::new(&job.input, &job.output).stopped();
    }
    let request = JobRequest::new(job.input.clone(), job.output.clone(), settings.clone());
    let job_hooks = hooks.for_job(index);
    match catch_unwind(AssertUnwindSafe(|| runner.submit(&request, &job_hooks))) {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(input = %job.input.display(), panic = %message, "Worker panicked");
            JobResult::new(&job.input, &job.output)
                .failed(ErrorClass::WorkerPanicked, format!("worker panicked: {message}"))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
