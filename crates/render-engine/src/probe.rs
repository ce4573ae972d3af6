//! Media probing by parsing the engine's diagnostic output.
//!
//! The engine is run with only an input (`-hide_banner -i path`); it
//! prints the stream summary to stderr and exits with an error about the
//! missing output, which is expected and ignored.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use clipforge_common::timecode::parse_timecode;
use clipforge_edit_model::MediaInfo;
use crossbeam_channel::RecvTimeoutError;
use regex::Regex;

use crate::engine::Engine;
use crate::hooks::JobHooks;
use crate::supervisor::spawn_engine;

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("engine not found at {path}")]
    EngineMissing { path: PathBuf },

    #[error("failed to run engine: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("no video stream found in {path}")]
    NoVideoStream { path: PathBuf },

    #[error("probe cancelled")]
    Cancelled,
}

fn duration_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Duration: (\d{2,}:\d{2}:\d{2}\.\d+)").ok())
        .as_ref()
}

fn video_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Video:.*?, (\d+)x(\d+)").ok())
        .as_ref()
}

fn rotation_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"rotation of ([-+]?\d+(?:\.\d+)?) degrees").ok())
        .as_ref()
}

fn audio_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Stream #.*?: Audio:").ok())
        .as_ref()
}

/// Extract `Duration: HH:MM:SS.ss` from a line of engine output.
pub fn parse_duration(text: &str) -> Option<f64> {
    let caps = duration_re()?.captures(text)?;
    parse_timecode(caps.get(1)?.as_str())
}

/// Parse engine diagnostic text into media facts.
///
/// Returns `None` when no video stream dimensions are present. A rotation
/// of ±90° or ±270° swaps the reported width and height.
pub fn parse_probe_output(text: &str) -> Option<MediaInfo> {
    let caps = video_re()?.captures(text)?;
    let mut width: u32 = caps.get(1)?.as_str().parse().ok()?;
    let mut height: u32 = caps.get(2)?.as_str().parse().ok()?;

    let rotation_degrees = rotation_re()
        .and_then(|re| re.captures(text))
        .and_then(|caps| caps.get(1)?.as_str().parse::<f64>().ok());
    if let Some(degrees) = rotation_degrees {
        let quarter_turns = (degrees / 90.0).round() as i64;
        if quarter_turns.rem_euclid(2) == 1 {
            std::mem::swap(&mut width, &mut height);
        }
    }

    Some(MediaInfo {
        width,
        height,
        duration_secs: parse_duration(text).unwrap_or(0.0),
        has_audio: audio_re().is_some_and(|re| re.is_match(text)),
        rotation_degrees,
    })
}

/// Probe a media file.
pub fn probe(engine: &Engine, path: &Path) -> Result<MediaInfo, ProbeError> {
    probe_with_hooks(engine, path, &JobHooks::new())
}

/// Probe a media file, killing the engine if `hooks` reports cancellation.
///
/// The engine is polled like a render, so a probe stuck on an unresponsive
/// file is abandoned within one poll interval of cancellation.
pub fn probe_with_hooks(
    engine: &Engine,
    path: &Path,
    hooks: &JobHooks,
) -> Result<MediaInfo, ProbeError> {
    let args = [
        "-hide_banner".to_string(),
        "-i".to_string(),
        path.to_string_lossy().into_owned(),
    ];
    let (mut child, lines) = spawn_engine(engine, &args).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ProbeError::EngineMissing {
                path: engine.program().to_path_buf(),
            }
        } else {
            ProbeError::Spawn(e)
        }
    })?;

    let poll = engine.poll_interval();
    let mut text = String::new();
    loop {
        if hooks.is_cancelled() {
            let _ = child.kill();
            let _ = child.wait();
            tracing::debug!(path = %path.display(), "Probe killed on cancellation");
            return Err(ProbeError::Cancelled);
        }
        match lines.recv_timeout(poll) {
            Ok(line) => {
                text.push_str(&line);
                text.push('\n');
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                if child.try_wait().map_err(ProbeError::Spawn)?.is_some() {
                    break;
                }
                std::thread::sleep(poll);
            }
        }
    }

    let info = parse_probe_output(&text).ok_or_else(|| ProbeError::NoVideoStream {
        path: path.to_path_buf(),
    })?;

    tracing::debug!(
        path = %path.display(),
        width = info.width,
        height = info.height,
        duration_secs = info.duration_secs,
        has_audio = info.has_audio,
        "Probed media"
    );
    Ok(info)
}

/// Probe, degrading to [`MediaInfo::default`] on failure.
pub fn probe_or_default(engine: &Engine, path: &Path, hooks: &JobHooks) -> MediaInfo {
    match probe_with_hooks(engine, path, hooks) {
        Ok(info) => info,
        Err(ProbeError::Cancelled) => MediaInfo::default(),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "Probe failed, using defaults");
            MediaInfo::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LANDSCAPE: &str = "\
Input #0, mov,mp4,m4a,3gp,3g2,mj2, from 'clip.mp4':
  Duration: 00:01:02.50, start: 0.000000, bitrate: 4521 kb/s
  Stream #0:0[0x1](und): Video: h264 (High) (avc1 / 0x31637661), yuv420p(tv, bt709, progressive), 1920x1080 [SAR 1:1 DAR 16:9], 4387 kb/s, 29.97 fps
  Stream #0:1[0x2](und): Audio: aac (LC) (mp4a / 0x6134706D), 48000 Hz, stereo, fltp, 128 kb/s
At least one output file must be specified
";

    #[test]
    fn test_parse_landscape_with_audio() {
        let info = parse_probe_output(LANDSCAPE).unwrap();
        assert_eq!((info.width, info.height), (1920, 1080));
        assert!((info.duration_secs - 62.5).abs() < 1e-9);
        assert!(info.has_audio);
        assert_eq!(info.rotation_degrees, None);
    }

    #[test]
    fn test_rotation_swaps_dimensions() {
        let text = "\
  Duration: 00:00:10.00, start: 0.000000, bitrate: 9000 kb/s
  Stream #0:0[0x1](und): Video: hevc (Main) (hvc1 / 0x31637668), yuv420p(tv), 1920x1080, 8900 kb/s, 30 fps
    Side data:
      displaymatrix: rotation of -90.00 degrees
";
        let info = parse_probe_output(text).unwrap();
        assert_eq!((info.width, info.height), (1080, 1920));
        assert!(!info.has_audio);
        assert_eq!(info.rotation_degrees, Some(-90.0));
    }

    #[test]
    fn test_half_turn_keeps_dimensions() {
        let text = "Stream #0:0: Video: h264, yuv420p, 640x360\nrotation of 180.00 degrees";
        let info = parse_probe_output(text).unwrap();
        assert_eq!((info.width, info.height), (640, 360));

        let text = "Stream #0:0: Video: h264, yuv420p, 640x360\nrotation of 270.00 degrees";
        let info = parse_probe_output(text).unwrap();
        assert_eq!((info.width, info.height), (360, 640));
    }

    #[test]
    fn test_missing_video_stream() {
        assert!(parse_probe_output("  Duration: 00:00:03.00\n  Stream #0:0: Audio: mp3").is_none());
    }

    #[test]
    fn test_unknown_duration_is_zero() {
        let text = "Duration: N/A, bitrate: N/A\nStream #0:0: Video: png, rgba, 500x500";
        let info = parse_probe_output(text).unwrap();
        assert_eq!(info.known_duration(), None);
    }
}
