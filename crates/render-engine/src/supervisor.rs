//! Engine process supervision.
//!
//! The engine's stderr is read on a dedicated thread that pushes lines
//! into a channel. The supervising loop checks the cancellation predicate,
//! then waits on the channel for at most one poll interval, so a
//! cancellation is noticed within one interval regardless of output.

use std::collections::VecDeque;
use std::io::{BufReader, Read};
use std::process::{Child, ExitStatus, Stdio};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use clipforge_common::error::{ClipforgeError, ClipforgeResult};
use clipforge_common::timecode::{format_timecode, parse_timecode, percent_of, RateLimiter};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use regex::Regex;

use crate::engine::Engine;
use crate::hooks::JobHooks;
use crate::probe::parse_duration;

/// Engine output lines kept for failure reports.
const TAIL_LINES: usize = 20;

/// Minimum spacing between progress log lines.
const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(2);

/// How a supervised process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// Killed after the cancellation predicate turned true.
    Stopped,
    Failed {
        code: Option<i32>,
        /// Last lines of engine output.
        tail: Vec<String>,
    },
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed)
    }

    /// Short failure description built from the output tail.
    pub fn failure_summary(&self) -> Option<String> {
        match self {
            RunOutcome::Failed { code, tail } => {
                let last = tail.last().map(String::as_str).unwrap_or("no output");
                Some(match code {
                    Some(code) => format!("engine exited with code {code}: {last}"),
                    None => format!("engine terminated by signal: {last}"),
                })
            }
            _ => None,
        }
    }
}

/// Outcome plus what was learned while the process ran.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Distinct percentages reported, in order.
    pub progress_trace: Vec<u8>,
    /// Total duration used for percentages (probed or read from output).
    pub duration_secs: Option<f64>,
    pub elapsed: Duration,
}

fn time_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"time=(\d{2,}:\d{2}:\d{2}\.\d+)").ok())
        .as_ref()
}

/// Extract the `time=HH:MM:SS.ss` position from a progress line.
pub fn parse_progress_time(line: &str) -> Option<f64> {
    let caps = time_re()?.captures(line)?;
    parse_timecode(caps.get(1)?.as_str())
}

/// Run the engine with `args` until it exits or is cancelled.
///
/// `expected_duration` is the output length used for percentages; when
/// unknown it is picked up from the engine's own `Duration:` line.
/// Returns `Err` only when the process cannot be started.
pub fn supervise(
    engine: &Engine,
    args: &[String],
    expected_duration: Option<f64>,
    hooks: &JobHooks,
) -> ClipforgeResult<RunReport> {
    let started = Instant::now();
    tracing::debug!(engine = %engine.program().display(), args = ?args, "Spawning engine");

    let (mut child, rx) = spawn_engine(engine, args).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ClipforgeError::engine_missing(format!(
                "{} could not be started",
                engine.program().display()
            ))
        } else {
            ClipforgeError::engine(format!("Failed to start engine: {e}"))
        }
    })?;
    tracing::info!(pid = child.id(), args_len = args.len(), "Engine process started");

    let mut tracker = ProgressTracker::new(expected_duration);
    let poll = engine.poll_interval();

    let status: ExitStatus = loop {
        if hooks.is_cancelled() {
            let _ = child.kill();
            let _ = child.wait();
            tracing::info!(pid = child.id(), "Engine process killed on cancellation");
            hooks.log("Stopped");
            return Ok(tracker.finish(RunOutcome::Stopped, started));
        }

        match rx.recv_timeout(poll) {
            Ok(line) => {
                tracker.observe(&line, hooks);
                continue;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                // Output closed; keep polling so cancellation still works.
                if let Some(status) = try_wait(&mut child)? {
                    break status;
                }
                std::thread::sleep(poll);
                continue;
            }
        }

        if let Some(status) = try_wait(&mut child)? {
            break status;
        }
    };

    // Drain what the reader still holds; stop at EOF or after one quiet interval.
    while let Ok(line) = rx.recv_timeout(poll) {
        tracker.observe(&line, hooks);
    }

    let elapsed = started.elapsed();
    if status.success() {
        tracing::info!(
            elapsed_secs = elapsed.as_secs_f64(),
            "Engine process finished"
        );
        Ok(tracker.finish(RunOutcome::Completed, started))
    } else {
        let tail: Vec<String> = tracker.tail.iter().cloned().collect();
        tracing::warn!(
            code = ?status.code(),
            last_line = tail.last().map(String::as_str).unwrap_or(""),
            "Engine process failed"
        );
        Ok(tracker.finish(
            RunOutcome::Failed {
                code: status.code(),
                tail,
            },
            started,
        ))
    }
}

/// Start the engine with stderr delivered line by line on the returned channel.
pub(crate) fn spawn_engine(
    engine: &Engine,
    args: &[String],
) -> std::io::Result<(Child, Receiver<String>)> {
    let mut child = engine
        .command()
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()?;
    let Some(stderr) = child.stderr.take() else {
        let _ = child.kill();
        let _ = child.wait();
        return Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            "engine stderr was not captured",
        ));
    };

    let (tx, rx) = crossbeam_channel::unbounded();
    // Detached: after a kill, a grandchild may hold the pipe open.
    std::thread::spawn(move || read_lines(stderr, tx));
    Ok((child, rx))
}

fn try_wait(child: &mut Child) -> ClipforgeResult<Option<ExitStatus>> {
    child
        .try_wait()
        .map_err(|e| ClipforgeError::engine(format!("Failed to wait on engine: {e}")))
}

/// Split the stream on `\r` as well as `\n`: progress lines are
/// carriage-return terminated.
fn read_lines(stream: impl Read, tx: Sender<String>) {
    let mut reader = BufReader::new(stream);
    let mut buf = [0u8; 4096];
    let mut line: Vec<u8> = Vec::with_capacity(256);

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        for &byte in &buf[..n] {
            if byte == b'\n' || byte == b'\r' {
                if !line.is_empty() {
                    let text = String::from_utf8_lossy(&line).into_owned();
                    line.clear();
                    if tx.send(text).is_err() {
                        return;
                    }
                }
            } else {
                line.push(byte);
            }
        }
    }
    if !line.is_empty() {
        let _ = tx.send(String::from_utf8_lossy(&line).into_owned());
    }
}

struct ProgressTracker {
    duration: Option<f64>,
    last_percent: Option<u8>,
    trace: Vec<u8>,
    tail: VecDeque<String>,
    log_limiter: RateLimiter,
}

impl ProgressTracker {
    fn new(expected_duration: Option<f64>) -> Self {
        Self {
            duration: expected_duration.filter(|d| *d > 0.0),
            last_percent: None,
            trace: vec![],
            tail: VecDeque::with_capacity(TAIL_LINES),
            log_limiter: RateLimiter::new(PROGRESS_LOG_INTERVAL),
        }
    }

    fn observe(&mut self, line: &str, hooks: &JobHooks) {
        if self.tail.len() == TAIL_LINES {
            self.tail.pop_front();
        }
        self.tail.push_back(line.trim().to_string());

        if self.duration.is_none() {
            if let Some(duration) = parse_duration(line).filter(|d| *d > 0.0) {
                tracing::debug!(duration_secs = duration, "Duration read from engine output");
                self.duration = Some(duration);
            }
        }

        let Some(position) = parse_progress_time(line) else {
            return;
        };
        let Some(percent) = self.duration.and_then(|total| percent_of(position, total)) else {
            return;
        };
        if self.last_percent == Some(percent) {
            return;
        }
        self.last_percent = Some(percent);
        self.trace.push(percent);
        hooks.report_progress(percent);

        if self.log_limiter.should_emit() {
            tracing::debug!(percent, position_secs = position, "Engine progress");
            hooks.log(&format!("Progress: {percent}% ({})", format_timecode(position)));
        }
    }

    fn finish(self, outcome: RunOutcome, started: Instant) -> RunReport {
        RunReport {
            outcome,
            progress_trace: self.trace,
            duration_secs: self.duration,
            elapsed: started.elapsed(),
        }
    }
}
