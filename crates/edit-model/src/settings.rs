//! Per-file job settings.
//!
//! `JobSettings` is the declarative description of every edit applied to
//! one source file. It is read-only once a job starts; workers share it
//! behind an `Arc`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Complete editing configuration for one job (`settings.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSettings {
    /// Trim window applied to the source.
    pub trim: TrimWindow,

    /// Output canvas target.
    pub geometry: GeometryTarget,

    /// How the source is placed on the canvas.
    pub fit: FitPolicy,

    /// Independent width/height multipliers applied to the foreground.
    pub scale: ScaleFactors,

    /// Playback speed factor (1.0 = unchanged).
    pub speed: f64,

    /// Horizontal flip.
    pub mirror: bool,

    /// Named color-grade preset.
    pub color_grade: ColorGrade,

    /// Brightness multiplier (1.0 = unchanged).
    pub brightness: f64,

    /// Blurred-background composition.
    pub blur: BackgroundBlur,

    /// Image overlays, drawn in list order (later entries on top).
    pub overlays: Vec<OverlaySpec>,

    /// Solid black bar behind burned-in subtitles.
    pub subtitle_bar: SubtitleBar,

    /// Ready-made subtitle file to burn in.
    pub subtitle_file: Option<PathBuf>,

    /// Styling for burned-in subtitles.
    pub subtitle_style: SubtitleStyle,

    /// Closing text, drawn over the video or appended as its own screen.
    pub text: Option<TextOverlaySpec>,

    /// Clip placed before the main video.
    pub intro: SegmentSource,

    /// Clip placed after the main video.
    pub outro: SegmentSource,

    /// Try the hardware encoder first; failures retry once on the CPU path.
    pub prefer_gpu: bool,

    /// Audio adjustments.
    pub audio: AudioEffects,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            trim: TrimWindow::default(),
            geometry: GeometryTarget::Source,
            fit: FitPolicy::Fit,
            scale: ScaleFactors::default(),
            speed: 1.0,
            mirror: false,
            color_grade: ColorGrade::None,
            brightness: 1.0,
            blur: BackgroundBlur::default(),
            overlays: vec![],
            subtitle_bar: SubtitleBar::default(),
            subtitle_file: None,
            subtitle_style: SubtitleStyle::default(),
            text: None,
            intro: SegmentSource::default(),
            outro: SegmentSource::default(),
            prefer_gpu: false,
            audio: AudioEffects::default(),
        }
    }
}

/// Trim window: start offset plus an optional duration (`None` = to end).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrimWindow {
    pub start_secs: f64,
    pub duration_secs: Option<f64>,
}

/// Named output canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum GeometryTarget {
    /// Keep the probed source dimensions (rounded down to even).
    #[default]
    #[serde(rename = "source")]
    Source,
    #[serde(rename = "9:16")]
    Portrait,
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "4:3")]
    Classic,
    #[serde(rename = "16:9")]
    Landscape,
    #[serde(rename = "4:5")]
    Feed,
}

impl GeometryTarget {
    /// Fixed canvas for named ratios; `None` for source mode.
    pub fn canvas(self) -> Option<(u32, u32)> {
        match self {
            GeometryTarget::Source => None,
            GeometryTarget::Portrait => Some((1080, 1920)),
            GeometryTarget::Square => Some((1080, 1080)),
            GeometryTarget::Classic => Some((1440, 1080)),
            GeometryTarget::Landscape => Some((1920, 1080)),
            GeometryTarget::Feed => Some((1080, 1350)),
        }
    }

    /// Display aspect ratio forced on the output container.
    pub fn aspect_label(self) -> Option<&'static str> {
        match self {
            GeometryTarget::Source => None,
            GeometryTarget::Portrait => Some("9:16"),
            GeometryTarget::Square => Some("1:1"),
            GeometryTarget::Classic => Some("4:3"),
            GeometryTarget::Landscape => Some("16:9"),
            GeometryTarget::Feed => Some("4:5"),
        }
    }
}

/// Canvas placement policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FitPolicy {
    /// Scale to fit inside the canvas; uncovered area is black or blurred.
    #[default]
    Fit,
    /// Scale to cover the canvas and center-crop.
    Fill,
}

/// Foreground width/height multipliers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScaleFactors {
    pub width: f64,
    pub height: f64,
}

impl Default for ScaleFactors {
    fn default() -> Self {
        Self {
            width: 1.0,
            height: 1.0,
        }
    }
}

impl ScaleFactors {
    /// True when either axis is zoomed.
    pub fn is_override(&self) -> bool {
        (self.width - 1.0).abs() > f64::EPSILON || (self.height - 1.0).abs() > f64::EPSILON
    }
}

/// Color-grade presets. Each maps to a fixed filter fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ColorGrade {
    #[default]
    None,
    BlackWhite,
    Sepia,
    Vintage,
    Cold,
    Warm,
    Vivid,
    Cinematic,
    Dreamy,
    Dramatic,
    Cyberpunk,
}

/// Blurred-background settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundBlur {
    pub enabled: bool,
    /// Box blur radius, in low-resolution background pixels.
    pub radius: u32,
}

impl Default for BackgroundBlur {
    fn default() -> Self {
        Self {
            enabled: false,
            radius: 5,
        }
    }
}

impl BackgroundBlur {
    pub fn is_active(&self) -> bool {
        self.enabled && self.radius > 0
    }
}

/// One image overlay (sticker, logo, watermark).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlaySpec {
    /// Image asset path.
    pub path: PathBuf,

    /// Where the overlay sits on the canvas.
    #[serde(default)]
    pub position: OverlayPosition,

    /// Overlay width as a fraction of canvas width.
    #[serde(default = "default_overlay_scale")]
    pub scale: f64,
}

fn default_overlay_scale() -> f64 {
    0.2
}

impl OverlaySpec {
    pub fn anchored(path: impl Into<PathBuf>, anchor: Anchor, scale: f64) -> Self {
        Self {
            path: path.into(),
            position: OverlayPosition::Anchor(anchor),
            scale,
        }
    }
}

/// Overlay placement: a named anchor or explicit canvas fractions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayPosition {
    Anchor(Anchor),
    /// Top-left corner at `(x * canvas_w, y * canvas_h)`; both in `[0, 1]`.
    Free { x: f64, y: f64 },
}

impl Default for OverlayPosition {
    fn default() -> Self {
        OverlayPosition::Anchor(Anchor::BottomRight)
    }
}

/// Named relative position on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Anchor {
    TopLeft,
    TopCenter,
    TopRight,
    CenterLeft,
    Center,
    CenterRight,
    BottomLeft,
    BottomCenter,
    #[default]
    BottomRight,
}

/// Black bar drawn across the bottom of the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubtitleBar {
    pub enabled: bool,
    pub height: u32,
}

impl Default for SubtitleBar {
    fn default() -> Self {
        Self {
            enabled: false,
            height: 80,
        }
    }
}

/// Burned-in subtitle styling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubtitleStyle {
    pub font_size: u32,
    /// Primary colour as `RRGGBB` hex.
    pub color: String,
    pub outline: u32,
}

impl Default for SubtitleStyle {
    fn default() -> Self {
        Self {
            font_size: 14,
            color: "FFFFFF".to_string(),
            outline: 3,
        }
    }
}

/// Closing text configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextOverlaySpec {
    /// Text to draw. Empty content disables the feature.
    pub content: String,

    /// Seconds, counted back from the end of the output (overlay style) or
    /// the length of the appended screen (append style).
    pub duration_secs: f64,

    /// Font family name, or a path to a `.ttf`/`.otf`/`.ttc` file.
    pub font: String,

    pub size: u32,

    pub color: String,

    /// Optional background box behind the text.
    pub text_box: Option<TextBox>,

    pub position: TextPosition,

    pub animation: TextAnimation,

    pub style: TextStyle,

    /// Screen color for the appended style.
    pub background: String,
}

impl Default for TextOverlaySpec {
    fn default() -> Self {
        Self {
            content: String::new(),
            duration_secs: 5.0,
            font: "Sans".to_string(),
            size: 60,
            color: "white".to_string(),
            text_box: None,
            position: TextPosition::Center,
            animation: TextAnimation::None,
            style: TextStyle::Overlay,
            background: "black".to_string(),
        }
    }
}

impl TextOverlaySpec {
    pub fn is_active(&self) -> bool {
        !self.content.trim().is_empty() && self.duration_secs > 0.0
    }
}

/// Box drawn behind text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextBox {
    /// Color name or hex, optionally with `@alpha`.
    pub color: String,
    pub padding: u32,
}

impl Default for TextBox {
    fn default() -> Self {
        Self {
            color: "black".to_string(),
            padding: 15,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TextPosition {
    Top,
    #[default]
    Center,
    Bottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TextAnimation {
    #[default]
    None,
    Fade,
    SlideUp,
    SlideDown,
}

/// Whether text is drawn over the last seconds of the video or appended
/// as a separate screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TextStyle {
    #[default]
    Overlay,
    Append,
}

/// Intro/outro clip reference.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentSource {
    pub enabled: bool,
    pub path: Option<PathBuf>,
}

impl SegmentSource {
    pub fn enabled_at(path: impl Into<PathBuf>) -> Self {
        Self {
            enabled: true,
            path: Some(path.into()),
        }
    }

    /// The path when the segment is switched on.
    pub fn active_path(&self) -> Option<&Path> {
        if self.enabled {
            self.path.as_deref()
        } else {
            None
        }
    }
}

/// Audio adjustments.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioEffects {
    /// Volume multiplier.
    pub volume: f64,
    /// Bass gain in dB; only positive values are applied.
    pub bass_gain: f64,
    /// Treble gain in dB; only positive values are applied.
    pub treble_gain: f64,
}

impl Default for AudioEffects {
    fn default() -> Self {
        Self {
            volume: 1.0,
            bass_gain: 0.0,
            treble_gain: 0.0,
        }
    }
}

impl JobSettings {
    /// Load settings from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EditModelError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| EditModelError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&json).map_err(|e| EditModelError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Save settings to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), EditModelError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).map_err(|e| EditModelError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        std::fs::write(path, json).map_err(|e| EditModelError::IoError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Check value ranges. Returns one message per problem.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = vec![];

        if self.trim.start_secs < 0.0 {
            errors.push("trim.start_secs must not be negative".to_string());
        }
        if let Some(duration) = self.trim.duration_secs {
            if duration <= 0.0 {
                errors.push("trim.duration_secs must be positive when set".to_string());
            }
        }
        if self.speed <= 0.0 || !self.speed.is_finite() {
            errors.push(format!("speed must be positive, got {}", self.speed));
        }
        if self.scale.width <= 0.0 || self.scale.height <= 0.0 {
            errors.push("scale factors must be positive".to_string());
        }
        if self.brightness < 0.0 {
            errors.push("brightness must not be negative".to_string());
        }
        if self.audio.volume < 0.0 {
            errors.push("audio.volume must not be negative".to_string());
        }
        for (i, overlay) in self.overlays.iter().enumerate() {
            if !(overlay.scale > 0.0 && overlay.scale <= 1.0) {
                errors.push(format!("overlays[{i}].scale must be in (0, 1]"));
            }
            if let OverlayPosition::Free { x, y } = overlay.position {
                if !(0.0..=1.0).contains(&x) || !(0.0..=1.0).contains(&y) {
                    errors.push(format!("overlays[{i}] free position must be in [0, 1]"));
                }
            }
        }
        if let Some(text) = &self.text {
            if text.size == 0 {
                errors.push("text.size must be positive".to_string());
            }
        }

        errors
    }
}

/// Errors that can occur when loading or saving settings.
#[derive(Debug, thiserror::Error)]
pub enum EditModelError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        let parsed: JobSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, JobSettings::default());
    }

    #[test]
    fn test_geometry_serde_names() {
        let parsed: JobSettings =
            serde_json::from_str(r#"{"geometry": "9:16", "fit": "fill"}"#).unwrap();
        assert_eq!(parsed.geometry, GeometryTarget::Portrait);
        assert_eq!(parsed.geometry.canvas(), Some((1080, 1920)));
        assert_eq!(parsed.fit, FitPolicy::Fill);
    }

    #[test]
    fn test_overlay_position_forms() {
        let json = r#"{
            "overlays": [
                {"path": "logo.png", "position": {"anchor": "top_left"}, "scale": 0.1},
                {"path": "sticker.png", "position": {"free": {"x": 0.25, "y": 0.75}}},
                {"path": "mark.png"}
            ]
        }"#;
        let parsed: JobSettings = serde_json::from_str(json).unwrap();
        assert_eq!(
            parsed.overlays[0].position,
            OverlayPosition::Anchor(Anchor::TopLeft)
        );
        assert_eq!(
            parsed.overlays[1].position,
            OverlayPosition::Free { x: 0.25, y: 0.75 }
        );
        assert_eq!(
            parsed.overlays[2].position,
            OverlayPosition::Anchor(Anchor::BottomRight)
        );
        assert!((parsed.overlays[2].scale - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_segment_source_requires_enable_flag() {
        let off = SegmentSource {
            enabled: false,
            path: Some(PathBuf::from("intro.mp4")),
        };
        assert!(off.active_path().is_none());
        let on = SegmentSource::enabled_at("intro.mp4");
        assert_eq!(on.active_path(), Some(Path::new("intro.mp4")));
    }

    #[test]
    fn test_validate_reports_bad_ranges() {
        let settings = JobSettings {
            speed: 0.0,
            overlays: vec![OverlaySpec {
                path: PathBuf::from("a.png"),
                position: OverlayPosition::Free { x: 1.5, y: 0.2 },
                scale: 0.3,
            }],
            ..JobSettings::default()
        };
        let errors = settings.validate();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("speed"));
        assert!(errors[1].contains("overlays[0]"));
    }

    #[test]
    fn test_settings_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let settings = JobSettings {
            geometry: GeometryTarget::Square,
            mirror: true,
            text: Some(TextOverlaySpec {
                content: "Thanks for watching".to_string(),
                ..TextOverlaySpec::default()
            }),
            ..JobSettings::default()
        };
        settings.save(&path).unwrap();

        let loaded = JobSettings::load(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_scale_override_detection() {
        assert!(!ScaleFactors::default().is_override());
        assert!(ScaleFactors {
            width: 1.1,
            height: 1.0
        }
        .is_override());
    }
}
