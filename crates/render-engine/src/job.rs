//! The per-file job pipeline: probe, build, render (with GPU fallback),
//! then the optional normalize-and-concatenate post-pass.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clipforge_common::error::{ClipforgeError, ClipforgeResult};
use clipforge_edit_model::{
    ErrorClass, FitPolicy, JobResult, JobSettings, MediaInfo, TextStyle,
};
use clipforge_filter_graph::builder::output_duration;
use clipforge_filter_graph::geometry::aspect_arg;
use clipforge_filter_graph::{audio_filters, build, resolve_canvas, Canvas};

use crate::concat::{concatenate, remove_file_with_retry, ConcatStage};
use crate::engine::{EncoderProfile, Engine, RenderInvocation};
use crate::hooks::JobHooks;
use crate::normalize::{normalize, render_text_card, Segment};
use crate::probe::{probe_or_default, probe_with_hooks};
use crate::supervisor::{supervise, RunOutcome};

/// One file to process.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub settings: Arc<JobSettings>,
}

impl JobRequest {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>, settings: Arc<JobSettings>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            settings,
        }
    }
}

/// Intro/outro segments normalized once for a whole batch.
#[derive(Debug, Default)]
pub struct SharedSegments {
    canvas: Option<Canvas>,
    fit: FitPolicy,
    intro: Option<Segment>,
    outro: Option<Segment>,
}

impl SharedSegments {
    /// Normalize the intro and outro of `settings` once, when the canvas is
    /// known up front (named geometry). A segment that fails to normalize
    /// is disabled in the returned settings.
    pub fn prepare(
        engine: &Engine,
        settings: &JobSettings,
        hooks: &JobHooks,
    ) -> ClipforgeResult<(Self, JobSettings)> {
        let mut adjusted = settings.clone();
        let Some((w, h)) = settings.geometry.canvas() else {
            return Ok((Self::default(), adjusted));
        };
        let canvas = Canvas::new(w, h);
        let mut shared = Self {
            canvas: Some(canvas),
            fit: settings.fit,
            intro: None,
            outro: None,
        };

        for (label, source) in [("intro", &mut adjusted.intro), ("outro", &mut adjusted.outro)] {
            let Some(path) = source.active_path().map(Path::to_path_buf) else {
                continue;
            };
            match normalize(engine, &path, canvas, settings.fit, label, hooks) {
                Ok(segment) => {
                    if label == "intro" {
                        shared.intro = Some(segment);
                    } else {
                        shared.outro = Some(segment);
                    }
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    tracing::warn!(label, error = %e, "Shared segment failed to normalize; disabled");
                    hooks.log(&format!("{label} disabled: {e}"));
                    source.enabled = false;
                }
            }
        }
        Ok((shared, adjusted))
    }

    fn reusable(&self, label: &str, canvas: Canvas, fit: FitPolicy) -> Option<&Segment> {
        if self.canvas != Some(canvas) || self.fit != fit {
            return None;
        }
        match label {
            "intro" => self.intro.as_ref(),
            "outro" => self.outro.as_ref(),
            _ => None,
        }
    }
}

/// Result of one render attempt.
enum Attempt {
    Rendered { canvas: Canvas, trace: Vec<u8> },
    Stopped { trace: Vec<u8> },
    Failed {
        class: ErrorClass,
        message: String,
        retryable: bool,
        trace: Vec<u8>,
    },
}

/// Runs jobs against one engine. Shareable across worker threads.
#[derive(Debug)]
pub struct JobRunner {
    engine: Engine,
    concat: ConcatStage,
    shared: SharedSegments,
}

impl JobRunner {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            concat: ConcatStage::new(),
            shared: SharedSegments::default(),
        }
    }

    pub fn with_shared_segments(mut self, shared: SharedSegments) -> Self {
        self.shared = shared;
        self
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Run one job to completion. Never panics on engine or file errors;
    /// every failure is reported in the returned [`JobResult`].
    pub fn submit(&self, request: &JobRequest, hooks: &JobHooks) -> JobResult {
        let mut result = JobResult::new(&request.input, &request.output);
        tracing::info!(
            input = %request.input.display(),
            output = %request.output.display(),
            "Starting job"
        );

        if !request.input.is_file() {
            return result.failed(
                ErrorClass::Io,
                format!("input {} not found", request.input.display()),
            );
        }
        if absolute(&request.input) == absolute(&request.output) {
            return result.failed(
                ErrorClass::Io,
                format!("output {} would overwrite the input", request.output.display()),
            );
        }
        if let Some(parent) = request.output.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = std::fs::create_dir_all(parent) {
                return result.failed(ErrorClass::Io, format!("cannot create output directory: {e}"));
            }
        }

        let (settings, warnings) = sanitize_assets(&request.settings);
        for warning in &warnings {
            tracing::warn!(input = %request.input.display(), "{warning}");
            hooks.log(warning);
        }
        result.warnings = warnings;

        let mut profile = EncoderProfile::from_preference(settings.prefer_gpu);
        let attempt = loop {
            result.attempts += 1;
            let attempt = self.render_main(request, &settings, profile, hooks);
            match &attempt {
                Attempt::Failed {
                    retryable: true,
                    message,
                    ..
                } if profile.is_gpu() && !hooks.is_cancelled() => {
                    tracing::warn!(error = %message, "GPU render failed, retrying on CPU");
                    hooks.log("GPU encode failed; retrying on CPU");
                    profile = EncoderProfile::Cpu;
                }
                _ => break attempt,
            }
        };
        result.used_gpu = profile.is_gpu();

        let canvas = match attempt {
            Attempt::Rendered { canvas, trace } => {
                result.progress_trace = trace;
                canvas
            }
            Attempt::Stopped { trace } => {
                result.progress_trace = trace;
                tracing::info!(input = %request.input.display(), "Job stopped");
                return result.stopped();
            }
            Attempt::Failed {
                class,
                message,
                trace,
                ..
            } => {
                result.progress_trace = trace;
                tracing::error!(input = %request.input.display(), error = %message, "Job failed");
                hooks.log(&format!("Failed: {message}"));
                return result.failed(class, message);
            }
        };

        if needs_post_pass(&settings) {
            match self.attach_segments(&request.output, &settings, canvas, hooks) {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => return result.stopped(),
                Err(e) => {
                    tracing::warn!(output = %request.output.display(), error = %e, "Post-pass skipped; main render kept");
                    hooks.log(&format!("Intro/outro skipped: {e}"));
                    result.warnings.push(format!("post-pass skipped: {e}"));
                }
            }
        }

        tracing::info!(
            output = %request.output.display(),
            attempts = result.attempts,
            gpu = result.used_gpu,
            "Job completed"
        );
        hooks.log("Done");
        result.completed()
    }

    fn render_main(
        &self,
        request: &JobRequest,
        settings: &JobSettings,
        profile: EncoderProfile,
        hooks: &JobHooks,
    ) -> Attempt {
        let info: MediaInfo = probe_or_default(&self.engine, &request.input, hooks);
        let canvas = resolve_canvas(settings, &info);

        let graph = match build(settings, &info).and_then(|graph| graph.compile()) {
            Ok(graph) => graph,
            Err(e) => {
                return Attempt::Failed {
                    class: ErrorClass::InvalidGraph,
                    message: e.to_string(),
                    retryable: false,
                    trace: vec![],
                }
            }
        };
        let audio = audio_filters(settings);
        let aspect = aspect_arg(settings, canvas);
        let args = RenderInvocation {
            input: &request.input,
            output: &request.output,
            settings,
            graph: &graph,
            audio_filter: audio.as_deref(),
            aspect: &aspect,
            profile,
        }
        .args();

        hooks.log(&format!(
            "Rendering {} on {}",
            request
                .input
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            if profile.is_gpu() { "GPU" } else { "CPU" }
        ));

        // A file left by an earlier run must not pass the output check.
        if !remove_file_with_retry(&request.output) {
            return Attempt::Failed {
                class: ErrorClass::Io,
                message: format!("cannot replace existing {}", request.output.display()),
                retryable: false,
                trace: vec![],
            };
        }

        let report = match supervise(&self.engine, &args, output_duration(settings, &info), hooks) {
            Ok(report) => report,
            Err(ClipforgeError::EngineMissing { message }) => {
                return Attempt::Failed {
                    class: ErrorClass::EngineMissing,
                    message,
                    retryable: false,
                    trace: vec![],
                }
            }
            Err(e) => {
                return Attempt::Failed {
                    class: ErrorClass::EngineFailed { exit_code: None },
                    message: e.to_string(),
                    retryable: true,
                    trace: vec![],
                }
            }
        };

        let trace = report.progress_trace;
        let outcome = report.outcome;
        match outcome {
            RunOutcome::Completed if file_has_content(&request.output) => {
                Attempt::Rendered { canvas, trace }
            }
            RunOutcome::Completed => Attempt::Failed {
                class: ErrorClass::EmptyOutput,
                message: format!(
                    "engine exited cleanly but {} is missing or empty",
                    request.output.display()
                ),
                retryable: false,
                trace,
            },
            RunOutcome::Stopped => Attempt::Stopped { trace },
            RunOutcome::Failed { code, .. } => Attempt::Failed {
                class: ErrorClass::EngineFailed { exit_code: code },
                message: outcome.failure_summary().unwrap_or_default(),
                retryable: true,
                trace,
            },
        }
    }

    /// Replace `output` with intro + main + outro (+ text card), holding the
    /// concatenation stage for the whole sequence.
    fn attach_segments(
        &self,
        output: &Path,
        settings: &JobSettings,
        render_canvas: Canvas,
        hooks: &JobHooks,
    ) -> ClipforgeResult<()> {
        let _stage = self.concat.lock();
        if hooks.is_cancelled() {
            return Err(ClipforgeError::Cancelled);
        }

        // Source geometry follows the rendered file; zoom can move it off the planned canvas.
        let canvas = if settings.geometry.canvas().is_some() {
            render_canvas
        } else {
            probe_with_hooks(&self.engine, output, hooks)
                .ok()
                .filter(|info| info.width >= 2 && info.height >= 2)
                .map(|info| Canvas::new(info.width, info.height))
                .unwrap_or(render_canvas)
        };
        let fit = settings.fit;

        let mut owned: Vec<Segment> = vec![];
        let mut order: Vec<PathBuf> = vec![];

        if let Some(path) = settings.intro.active_path() {
            self.push_segment("intro", path, canvas, fit, hooks, &mut owned, &mut order)?;
        }
        let main = normalize(&self.engine, output, canvas, fit, "main", hooks)?;
        order.push(main.path().to_path_buf());
        owned.push(main);
        if let Some(path) = settings.outro.active_path() {
            self.push_segment("outro", path, canvas, fit, hooks, &mut owned, &mut order)?;
        }
        if let Some(text) = settings
            .text
            .as_ref()
            .filter(|t| t.is_active() && t.style == TextStyle::Append)
        {
            let card = render_text_card(&self.engine, text, canvas, hooks)?;
            order.push(card.path().to_path_buf());
            owned.push(card);
        }

        let paths: Vec<&Path> = order.iter().map(PathBuf::as_path).collect();
        concatenate(&self.engine, &paths, output, hooks)
    }

    #[allow(clippy::too_many_arguments)]
    fn push_segment(
        &self,
        label: &str,
        source: &Path,
        canvas: Canvas,
        fit: FitPolicy,
        hooks: &JobHooks,
        owned: &mut Vec<Segment>,
        order: &mut Vec<PathBuf>,
    ) -> ClipforgeResult<()> {
        if let Some(segment) = self.shared.reusable(label, canvas, fit) {
            order.push(segment.path().to_path_buf());
            return Ok(());
        }
        let segment = normalize(&self.engine, source, canvas, fit, label, hooks)?;
        order.push(segment.path().to_path_buf());
        owned.push(segment);
        Ok(())
    }
}

fn needs_post_pass(settings: &JobSettings) -> bool {
    settings.intro.active_path().is_some()
        || settings.outro.active_path().is_some()
        || settings
            .text
            .as_ref()
            .is_some_and(|t| t.is_active() && t.style == TextStyle::Append)
}

fn file_has_content(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}

fn absolute(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Drop or disable missing assets. Missing assets are advisory: the job
/// continues without them.
pub fn sanitize_assets(settings: &JobSettings) -> (JobSettings, Vec<String>) {
    let mut clean = settings.clone();
    let mut warnings = vec![];

    clean.overlays.retain(|overlay| {
        let present = overlay.path.is_file();
        if !present {
            warnings.push(format!("overlay {} not found; skipped", overlay.path.display()));
        }
        present
    });
    for overlay in &mut clean.overlays {
        overlay.path = absolute(&overlay.path);
    }

    if let Some(path) = clean.subtitle_file.take() {
        if path.is_file() {
            clean.subtitle_file = Some(absolute(&path));
        } else {
            warnings.push(format!("subtitle file {} not found; skipped", path.display()));
        }
    }

    for (label, source) in [("intro", &mut clean.intro), ("outro", &mut clean.outro)] {
        if !source.enabled {
            continue;
        }
        match source.path.as_deref() {
            Some(path) if path.is_file() => source.path = Some(absolute(path)),
            Some(path) => {
                warnings.push(format!("{label} {} not found; disabled", path.display()));
                source.enabled = false;
            }
            None => {
                warnings.push(format!("{label} enabled without a path; disabled"));
                source.enabled = false;
            }
        }
    }

    if let Some(text) = clean.text.as_mut() {
        let font = Path::new(&text.font);
        let is_file_font = font.extension().is_some_and(|ext| {
            matches!(
                ext.to_string_lossy().to_ascii_lowercase().as_str(),
                "ttf" | "otf" | "ttc"
            )
        });
        if is_file_font && !font.is_file() {
            warnings.push(format!("font {} not found; using Sans", text.font));
            text.font = "Sans".to_string();
        }
    }

    (clean, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipforge_edit_model::{Anchor, OverlaySpec, SegmentSource, TextOverlaySpec};

    #[test]
    fn test_sanitize_drops_missing_assets() {
        let dir = tempfile::tempdir().unwrap();
        let logo = dir.path().join("logo.png");
        std::fs::write(&logo, b"png").unwrap();

        let settings = JobSettings {
            overlays: vec![
                OverlaySpec::anchored(&logo, Anchor::TopLeft, 0.1),
                OverlaySpec::anchored(dir.path().join("missing.png"), Anchor::TopRight, 0.1),
            ],
            subtitle_file: Some(dir.path().join("missing.srt")),
            intro: SegmentSource::enabled_at(dir.path().join("missing_intro.mp4")),
            outro: SegmentSource {
                enabled: false,
                path: Some(dir.path().join("ignored.mp4")),
            },
            text: Some(TextOverlaySpec {
                content: "bye".to_string(),
                font: "/no/such/font.ttf".to_string(),
                ..TextOverlaySpec::default()
            }),
            ..JobSettings::default()
        };

        let (clean, warnings) = sanitize_assets(&settings);
        assert_eq!(clean.overlays.len(), 1);
        assert!(clean.overlays[0].path.is_absolute());
        assert!(clean.subtitle_file.is_none());
        assert!(!clean.intro.enabled);
        assert_eq!(clean.text.as_ref().unwrap().font, "Sans");
        assert_eq!(warnings.len(), 4);
    }

    #[test]
    fn test_needs_post_pass() {
        assert!(!needs_post_pass(&JobSettings::default()));
        let card = JobSettings {
            text: Some(TextOverlaySpec {
                content: "card".to_string(),
                style: TextStyle::Append,
                ..TextOverlaySpec::default()
            }),
            ..JobSettings::default()
        };
        assert!(needs_post_pass(&card));
    }

    #[test]
    fn test_missing_input_fails_without_engine() {
        let runner = JobRunner::new(Engine::at("/nonexistent/engine"));
        let request = JobRequest::new(
            "/nonexistent/input.mp4",
            "/tmp/out.mp4",
            Arc::new(JobSettings::default()),
        );
        let result = runner.submit(&request, &JobHooks::new());
        assert!(!result.is_success());
        assert_eq!(result.error, Some(ErrorClass::Io));
        assert_eq!(result.attempts, 0);
    }

    #[test]
    fn test_output_over_input_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("clip.mp4");
        std::fs::write(&input, b"source").unwrap();

        let runner = JobRunner::new(Engine::at("/nonexistent/engine"));
        let request = JobRequest::new(&input, &input, Arc::new(JobSettings::default()));
        let result = runner.submit(&request, &JobHooks::new());
        assert_eq!(result.error, Some(ErrorClass::Io));
        assert_eq!(result.attempts, 0);
        assert_eq!(std::fs::read(&input).unwrap(), b"source");
    }

    #[test]
    fn test_shared_segments_skip_source_geometry() {
        let settings = JobSettings {
            intro: SegmentSource::enabled_at("/nonexistent/intro.mp4"),
            ..JobSettings::default()
        };
        let (shared, adjusted) =
            SharedSegments::prepare(&Engine::at("/nonexistent"), &settings, &JobHooks::new())
                .unwrap();
        assert!(shared.canvas.is_none());
        assert!(adjusted.intro.enabled);
    }
}
