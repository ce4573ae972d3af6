//! Media engine location and invocation arguments.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use clipforge_common::config::{AppConfig, ENGINE_ENV_VAR};
use clipforge_common::error::{ClipforgeError, ClipforgeResult};
use clipforge_edit_model::JobSettings;
use clipforge_filter_graph::CompiledGraph;

/// Binary searched on `PATH` when nothing else is configured.
pub const DEFAULT_ENGINE: &str = "ffmpeg";

/// Output frame rate for every render.
pub const OUTPUT_FPS: u32 = 30;

/// Keyframe interval, in frames.
pub const OUTPUT_GOP: u32 = 60;

/// A located engine binary plus the supervision poll interval.
#[derive(Debug, Clone)]
pub struct Engine {
    program: PathBuf,
    poll_interval: Duration,
}

impl Engine {
    /// Use an explicit binary without checking it.
    pub fn at(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            poll_interval: Duration::from_millis(100),
        }
    }

    /// Find the engine: config path, then `CLIPFORGE_ENGINE`, then `ffmpeg`
    /// on `PATH`.
    pub fn locate(config: &AppConfig) -> ClipforgeResult<Self> {
        let explicit = config
            .engine_path
            .clone()
            .or_else(|| std::env::var_os(ENGINE_ENV_VAR).map(PathBuf::from));

        let program = match explicit {
            Some(path) => {
                if !path.is_file() {
                    return Err(ClipforgeError::engine_missing(format!(
                        "configured engine {} does not exist",
                        path.display()
                    )));
                }
                path
            }
            None => {
                if !command_exists(DEFAULT_ENGINE) {
                    return Err(ClipforgeError::engine_missing(format!(
                        "{DEFAULT_ENGINE} not found in PATH (set {ENGINE_ENV_VAR} or engine_path)"
                    )));
                }
                PathBuf::from(DEFAULT_ENGINE)
            }
        };

        tracing::debug!(engine = %program.display(), "Located media engine");
        Ok(Self {
            program,
            poll_interval: config.poll_interval(),
        })
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(Duration::from_millis(1));
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn command(&self) -> Command {
        Command::new(&self.program)
    }
}

fn command_exists(binary: &str) -> bool {
    Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {binary} >/dev/null 2>&1"))
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Video encoder selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderProfile {
    /// NVENC hardware encoder with hardware decode.
    Gpu,
    /// libx264 software encoder.
    Cpu,
}

impl EncoderProfile {
    pub fn from_preference(prefer_gpu: bool) -> Self {
        if prefer_gpu {
            EncoderProfile::Gpu
        } else {
            EncoderProfile::Cpu
        }
    }

    pub fn is_gpu(self) -> bool {
        self == EncoderProfile::Gpu
    }

    /// Options placed before the main input.
    pub fn decode_args(self) -> Vec<String> {
        match self {
            EncoderProfile::Gpu => strings(&["-hwaccel", "auto"]),
            EncoderProfile::Cpu => vec![],
        }
    }

    /// Video encoder and rate-control options.
    pub fn video_args(self) -> Vec<String> {
        let mut args = match self {
            EncoderProfile::Gpu => strings(&[
                "-c:v", "h264_nvenc", "-preset", "p1", "-rc", "vbr", "-b:v", "2800k", "-maxrate",
                "3500k", "-bufsize", "5000k",
            ]),
            EncoderProfile::Cpu => strings(&["-c:v", "libx264", "-preset", "faster", "-crf", "24"]),
        };
        args.extend(frame_args());
        args
    }
}

/// Frame rate, GOP, and pixel format shared by every encode.
pub(crate) fn frame_args() -> Vec<String> {
    vec![
        "-r".to_string(),
        OUTPUT_FPS.to_string(),
        "-g".to_string(),
        OUTPUT_GOP.to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
    ]
}

/// AAC stereo at 44.1 kHz, used by renders and segments alike.
pub(crate) fn audio_codec_args() -> Vec<String> {
    strings(&["-c:a", "aac", "-b:a", "192k", "-ar", "44100", "-ac", "2"])
}

/// Per-process encoder thread cap: a third of the cores, within `[2, 8]`.
pub fn thread_cap() -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);
    (cores / 3).clamp(2, 8)
}

pub(crate) fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Everything needed to assemble the main render command line.
#[derive(Debug, Clone)]
pub struct RenderInvocation<'a> {
    pub input: &'a Path,
    pub output: &'a Path,
    pub settings: &'a JobSettings,
    pub graph: &'a CompiledGraph,
    pub audio_filter: Option<&'a str>,
    pub aspect: &'a str,
    pub profile: EncoderProfile,
}

impl RenderInvocation<'_> {
    pub fn args(&self) -> Vec<String> {
        let mut args = strings(&["-y", "-hide_banner"]);
        args.extend(self.profile.decode_args());

        let trim = self.settings.trim;
        if trim.start_secs > 0.0 {
            args.push("-ss".to_string());
            args.push(format!("{:.3}", trim.start_secs));
        }
        if let Some(duration) = trim.duration_secs {
            args.push("-t".to_string());
            args.push(format!("{duration:.3}"));
        }
        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().into_owned());

        for input in &self.graph.inputs {
            if input.looped {
                args.extend(strings(&["-stream_loop", "-1"]));
            }
            args.push("-i".to_string());
            args.push(input.path.to_string_lossy().into_owned());
        }

        args.push("-filter_complex".to_string());
        args.push(self.graph.text.clone());
        args.push("-map".to_string());
        args.push(self.graph.map_arg());

        if let Some(filter) = self.audio_filter {
            args.push("-af".to_string());
            args.push(filter.to_string());
        }
        args.extend(strings(&["-map", "0:a?"]));
        args.extend(strings(&["-metadata:s:v:0", "rotate=0"]));
        args.push("-aspect".to_string());
        args.push(self.aspect.to_string());

        args.extend(self.profile.video_args());
        args.extend(audio_codec_args());
        args.push("-threads".to_string());
        args.push(thread_cap().to_string());

        args.push(self.output.to_string_lossy().into_owned());
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipforge_edit_model::{Anchor, GeometryTarget, MediaInfo, OverlaySpec};

    fn compiled(settings: &JobSettings) -> CompiledGraph {
        let info = MediaInfo {
            width: 1920,
            height: 1080,
            duration_secs: 10.0,
            has_audio: true,
            rotation_degrees: None,
        };
        clipforge_filter_graph::build(settings, &info)
            .unwrap()
            .compile()
            .unwrap()
    }

    fn position(args: &[String], flag: &str) -> usize {
        args.iter().position(|a| a == flag).unwrap()
    }

    #[test]
    fn test_gpu_and_cpu_profiles() {
        let gpu = EncoderProfile::Gpu.video_args();
        assert!(gpu.contains(&"h264_nvenc".to_string()));
        assert_eq!(EncoderProfile::Gpu.decode_args(), vec!["-hwaccel", "auto"]);

        let cpu = EncoderProfile::Cpu.video_args();
        assert!(cpu.contains(&"libx264".to_string()));
        assert!(EncoderProfile::Cpu.decode_args().is_empty());
        assert!(cpu.ends_with(&frame_args()));
    }

    #[test]
    fn test_thread_cap_bounds() {
        let cap = thread_cap();
        assert!((2..=8).contains(&cap));
    }

    #[test]
    fn test_render_args_layout() {
        let mut settings = JobSettings {
            geometry: GeometryTarget::Portrait,
            overlays: vec![OverlaySpec::anchored("/s/logo.png", Anchor::TopLeft, 0.2)],
            ..JobSettings::default()
        };
        settings.trim.start_secs = 5.0;
        settings.trim.duration_secs = Some(20.0);
        let graph = compiled(&settings);

        let args = RenderInvocation {
            input: Path::new("/in/clip.mp4"),
            output: Path::new("/out/clip_edited.mp4"),
            settings: &settings,
            graph: &graph,
            audio_filter: Some("volume=2"),
            aspect: "9:16",
            profile: EncoderProfile::Gpu,
        }
        .args();

        // Seek and trim are input options for the main source.
        assert!(position(&args, "-hwaccel") < position(&args, "-ss"));
        assert!(position(&args, "-t") < position(&args, "-i"));
        assert_eq!(args[position(&args, "-ss") + 1], "5.000");

        // Sticker bound as a looping second input.
        let loop_at = position(&args, "-stream_loop");
        assert_eq!(args[loop_at + 3], "/s/logo.png");

        assert_eq!(args[position(&args, "-map") + 1], graph.map_arg());
        assert_eq!(args[position(&args, "-af") + 1], "volume=2");
        assert!(args.contains(&"0:a?".to_string()));
        assert_eq!(args[position(&args, "-aspect") + 1], "9:16");
        assert_eq!(args.last().unwrap(), "/out/clip_edited.mp4");
    }

    #[test]
    fn test_locate_rejects_missing_explicit_engine() {
        let config = AppConfig {
            engine_path: Some(PathBuf::from("/definitely/not/here/ffmpeg")),
            ..AppConfig::default()
        };
        let err = Engine::locate(&config).unwrap_err();
        assert!(matches!(err, ClipforgeError::EngineMissing { .. }));
    }
}
