//! Segment normalization.
//!
//! Segments are re-encoded to one canonical shape (canvas size, 30 fps,
//! yuv420p, H.264 high@4.1, AAC stereo 44.1 kHz) so the concatenation
//! step can join them with stream copy. Encoding uses the fastest preset;
//! segments are intermediates.

use std::path::Path;

use clipforge_common::error::{ClipforgeError, ClipforgeResult};
use clipforge_edit_model::{FitPolicy, TextOverlaySpec};
use clipforge_filter_graph::color::format_number;
use clipforge_filter_graph::text::drawtext;
use clipforge_filter_graph::{Canvas, Filter};
use tempfile::TempPath;

use crate::engine::{audio_codec_args, frame_args, strings, Engine};
use crate::hooks::JobHooks;
use crate::probe::{probe_with_hooks, ProbeError};
use crate::supervisor::{supervise, RunOutcome};

/// Silent stereo source matching the segment audio format.
const SILENCE_SOURCE: &str = "anullsrc=channel_layout=stereo:sample_rate=44100";

/// A concatenation-ready temporary file, deleted on drop.
#[derive(Debug)]
pub struct Segment {
    path: TempPath,
    label: String,
}

impl Segment {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

fn segment_video_args() -> Vec<String> {
    let mut args = strings(&[
        "-c:v",
        "libx264",
        "-preset",
        "ultrafast",
        "-profile:v",
        "high",
        "-level",
        "4.1",
    ]);
    args.extend(frame_args());
    args
}

/// The canonicalizing video chain for a fit policy.
pub fn segment_filters(canvas: Canvas, fit: FitPolicy) -> String {
    let (w, h) = (canvas.width, canvas.height);
    let mut filters = match fit {
        FitPolicy::Fit => vec![
            Filter::new("scale")
                .arg(w)
                .arg(h)
                .opt("force_original_aspect_ratio", "decrease"),
            Filter::new("pad")
                .arg(w)
                .arg(h)
                .arg("(ow-iw)/2")
                .arg("(oh-ih)/2")
                .arg("black"),
        ],
        FitPolicy::Fill => vec![
            Filter::new("scale")
                .arg(w)
                .arg(h)
                .opt("force_original_aspect_ratio", "increase"),
            Filter::new("crop").arg(w).arg(h),
        ],
    };
    filters.push(Filter::new("setsar").arg(1));
    filters.push(Filter::new("fps").arg(30));
    filters.push(Filter::new("format").arg("yuv420p"));
    filters
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Engine arguments for normalizing `input` into `output`.
pub fn normalize_args(
    input: &Path,
    output: &Path,
    canvas: Canvas,
    fit: FitPolicy,
    has_audio: bool,
) -> Vec<String> {
    let vf = segment_filters(canvas, fit);
    let mut args = strings(&["-y", "-hide_banner"]);

    if has_audio {
        args.push("-i".to_string());
        args.push(input.to_string_lossy().into_owned());
        args.extend(strings(&["-map", "0:v:0", "-map", "0:a:0", "-vf"]));
        args.push(vf);
    } else {
        args.extend(strings(&["-f", "lavfi", "-i", SILENCE_SOURCE, "-i"]));
        args.push(input.to_string_lossy().into_owned());
        args.push("-filter_complex".to_string());
        args.push(format!("[1:v]{vf}[v]"));
        args.extend(strings(&["-map", "[v]", "-map", "0:a", "-shortest"]));
    }

    args.extend(segment_video_args());
    args.extend(audio_codec_args());
    args.push(output.to_string_lossy().into_owned());
    args
}

fn temp_segment(label: &str) -> ClipforgeResult<TempPath> {
    let file = tempfile::Builder::new()
        .prefix("clipforge_")
        .suffix(&format!("_{label}.mp4"))
        .tempfile()?;
    Ok(file.into_temp_path())
}

fn run_to_segment(
    engine: &Engine,
    args: &[String],
    path: TempPath,
    label: &str,
    expected_duration: Option<f64>,
    hooks: &JobHooks,
) -> ClipforgeResult<Segment> {
    // Segment progress is not the job's progress; only log and cancel pass through.
    let segment_hooks = JobHooks::with_shared(None, hooks.log_fn(), hooks.cancel_fn());
    let report = supervise(engine, args, expected_duration, &segment_hooks)?;

    match report.outcome {
        RunOutcome::Completed => {}
        RunOutcome::Stopped => return Err(ClipforgeError::Cancelled),
        failed => {
            return Err(ClipforgeError::normalize(format!(
                "{label}: {}",
                failed.failure_summary().unwrap_or_default()
            )))
        }
    }

    let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
    if size == 0 {
        return Err(ClipforgeError::normalize(format!(
            "{label}: engine produced an empty segment"
        )));
    }

    tracing::debug!(label, path = %path.display(), size, "Segment ready");
    Ok(Segment {
        path,
        label: label.to_string(),
    })
}

/// Re-encode `input` into a canonical segment of `canvas` size.
///
/// On error no segment file is left behind.
pub fn normalize(
    engine: &Engine,
    input: &Path,
    canvas: Canvas,
    fit: FitPolicy,
    label: &str,
    hooks: &JobHooks,
) -> ClipforgeResult<Segment> {
    if !input.exists() {
        return Err(ClipforgeError::FileNotFound {
            path: input.to_path_buf(),
        });
    }
    let info = probe_with_hooks(engine, input, hooks).map_err(|e| match e {
        ProbeError::Cancelled => ClipforgeError::Cancelled,
        e => ClipforgeError::normalize(format!("{label}: {e}")),
    })?;

    tracing::info!(
        label,
        input = %input.display(),
        width = canvas.width,
        height = canvas.height,
        has_audio = info.has_audio,
        "Normalizing segment"
    );

    let path = temp_segment(label)?;
    let args = normalize_args(input, &path, canvas, fit, info.has_audio);
    run_to_segment(engine, &args, path, label, info.known_duration(), hooks)
}

/// Engine arguments for a solid-color text card of `spec.duration_secs`.
pub fn text_card_args(spec: &TextOverlaySpec, canvas: Canvas, output: &Path) -> Vec<String> {
    let duration = format_number(spec.duration_secs.max(0.1));
    let source = Filter::new("color")
        .opt("c", &spec.background)
        .opt("s", canvas.size_arg())
        .opt("r", 30)
        .opt("d", &duration);
    let vf = [
        drawtext(spec, None).to_string(),
        "setsar=1".to_string(),
        "format=yuv420p".to_string(),
    ]
    .join(",");

    let mut args = strings(&["-y", "-hide_banner", "-f", "lavfi", "-i"]);
    args.push(source.to_string());
    args.extend(strings(&["-f", "lavfi", "-i", SILENCE_SOURCE, "-vf"]));
    args.push(vf);
    args.extend(strings(&["-map", "0:v", "-map", "1:a", "-t"]));
    args.push(duration);
    args.extend(segment_video_args());
    args.extend(audio_codec_args());
    args.push(output.to_string_lossy().into_owned());
    args
}

/// Render the appended closing-text screen as a segment.
pub fn render_text_card(
    engine: &Engine,
    spec: &TextOverlaySpec,
    canvas: Canvas,
    hooks: &JobHooks,
) -> ClipforgeResult<Segment> {
    tracing::info!(
        duration_secs = spec.duration_secs,
        width = canvas.width,
        height = canvas.height,
        "Rendering text card"
    );
    let path = temp_segment("text")?;
    let args = text_card_args(spec, canvas, &path);
    run_to_segment(engine, &args, path, "text", Some(spec.duration_secs), hooks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_and_fill_chains() {
        let canvas = Canvas::new(1080, 1920);
        assert_eq!(
            segment_filters(canvas, FitPolicy::Fit),
            "scale=1080:1920:force_original_aspect_ratio=decrease,\
             pad=1080:1920:(ow-iw)/2:(oh-ih)/2:black,setsar=1,fps=30,format=yuv420p"
        );
        assert_eq!(
            segment_filters(canvas, FitPolicy::Fill),
            "scale=1080:1920:force_original_aspect_ratio=increase,crop=1080:1920,\
             setsar=1,fps=30,format=yuv420p"
        );
    }

    #[test]
    fn test_silent_source_gets_injected_audio() {
        let args = normalize_args(
            Path::new("/in/intro.mp4"),
            Path::new("/tmp/seg.mp4"),
            Canvas::new(1080, 1080),
            FitPolicy::Fit,
            false,
        );
        let joined = args.join(" ");
        assert!(joined.contains("-f lavfi -i anullsrc=channel_layout=stereo:sample_rate=44100 -i /in/intro.mp4"));
        assert!(joined.contains("-map [v] -map 0:a -shortest"));
        assert!(joined.contains("-filter_complex [1:v]scale=1080:1080"));
    }

    #[test]
    fn test_audio_source_is_resampled() {
        let args = normalize_args(
            Path::new("/in/outro.mp4"),
            Path::new("/tmp/seg.mp4"),
            Canvas::new(1080, 1080),
            FitPolicy::Fill,
            true,
        );
        let joined = args.join(" ");
        assert!(joined.contains("-c:a aac -b:a 192k -ar 44100 -ac 2"));
        assert!(joined.contains("-profile:v high -level 4.1"));
        assert!(!joined.contains("anullsrc"));
        assert_eq!(args.last().map(String::as_str), Some("/tmp/seg.mp4"));
    }

    #[test]
    fn test_text_card_args() {
        let spec = TextOverlaySpec {
            content: "See you".to_string(),
            duration_secs: 3.0,
            ..TextOverlaySpec::default()
        };
        let args = text_card_args(&spec, Canvas::new(1080, 1920), Path::new("/tmp/card.mp4"));
        assert!(args.contains(&"color=c=black:s=1080x1920:r=30:d=3".to_string()));
        let vf = &args[args.iter().position(|a| a == "-vf").unwrap() + 1];
        assert!(vf.starts_with("drawtext="));
        assert!(!vf.contains("enable="));
        assert_eq!(args[args.iter().position(|a| a == "-t").unwrap() + 1], "3");
    }

    #[test]
    fn test_missing_input_is_an_error() {
        let engine = Engine::at("/nonexistent/engine");
        let err = normalize(
            &engine,
            Path::new("/nonexistent/intro.mp4"),
            Canvas::new(1080, 1920),
            FitPolicy::Fit,
            "intro",
            &JobHooks::new(),
        )
        .unwrap_err();
        assert!(matches!(err, ClipforgeError::FileNotFound { .. }));
    }
}
