//! Job outcomes as reported to callers and batch reports.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Terminal state of one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Completed,
    /// Cancelled by the caller. Never retried.
    Stopped,
    Failed,
}

/// Why a job did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ErrorClass {
    EngineMissing,
    EngineFailed { exit_code: Option<i32> },
    /// The engine exited cleanly but left no usable output file.
    EmptyOutput,
    InvalidGraph,
    Io,
    /// The worker panicked; the panic was contained by the scheduler.
    WorkerPanicked,
}

/// Result of running one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub input: PathBuf,
    pub output: PathBuf,
    pub status: JobStatus,

    /// Distinct percentages reported while the main render ran, in order.
    #[serde(default)]
    pub progress_trace: Vec<u8>,

    #[serde(default)]
    pub error: Option<ErrorClass>,

    /// Human-readable failure detail.
    #[serde(default)]
    pub message: Option<String>,

    /// Engine invocations spent on the main render.
    #[serde(default)]
    pub attempts: u32,

    /// Whether the final render ran on the hardware encoder.
    #[serde(default)]
    pub used_gpu: bool,

    /// Advisory notes (skipped assets, restored backups).
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl JobResult {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            status: JobStatus::Failed,
            progress_trace: vec![],
            error: None,
            message: None,
            attempts: 0,
            used_gpu: false,
            warnings: vec![],
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Completed
    }

    pub fn completed(mut self) -> Self {
        self.status = JobStatus::Completed;
        self.error = None;
        self.message = None;
        self
    }

    pub fn stopped(mut self) -> Self {
        self.status = JobStatus::Stopped;
        self.error = None;
        self
    }

    pub fn failed(mut self, class: ErrorClass, message: impl Into<String>) -> Self {
        self.status = JobStatus::Failed;
        self.error = Some(class);
        self.message = Some(message.into());
        self
    }

    /// Record a progress value, skipping repeats.
    pub fn record_progress(&mut self, percent: u8) {
        if self.progress_trace.last() != Some(&percent) {
            self.progress_trace.push(percent);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_progress_dedupes() {
        let mut result = JobResult::new("in.mp4", "out.mp4");
        for p in [0, 0, 10, 10, 55, 100, 100] {
            result.record_progress(p);
        }
        assert_eq!(result.progress_trace, vec![0, 10, 55, 100]);
    }

    #[test]
    fn test_error_class_serialization() {
        let result = JobResult::new("in.mp4", "out.mp4").failed(
            ErrorClass::EngineFailed { exit_code: Some(1) },
            "encoder exploded",
        );
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"]["kind"], "engine_failed");
        assert_eq!(json["error"]["exit_code"], 1);
    }

    #[test]
    fn test_stopped_is_not_success() {
        let result = JobResult::new("in.mp4", "out.mp4").stopped();
        assert!(!result.is_success());
        assert!(result.error.is_none());
    }
}
