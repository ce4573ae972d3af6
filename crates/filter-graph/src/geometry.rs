//! Output canvas resolution.

use clipforge_edit_model::{GeometryTarget, JobSettings, MediaInfo, FALLBACK_DIMENSIONS};

/// Width of the low-resolution working frame used for background blur.
pub const BLUR_WORK_WIDTH: u32 = 64;

/// Output canvas dimensions. Always even.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: even_floor(width),
            height: even_floor(height),
        }
    }

    /// `WxH`, as used by source filters.
    pub fn size_arg(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }

    /// Height of the low-resolution blur frame, keeping the canvas aspect.
    pub fn blur_work_height(&self) -> u32 {
        let scaled = (BLUR_WORK_WIDTH as u64 * self.height as u64).div_ceil(self.width as u64);
        even_ceil(scaled as u32)
    }

    /// Clamp a blur radius to what the low-resolution frame can take.
    pub fn clamp_blur_radius(&self, radius: u32) -> u32 {
        let limit = (BLUR_WORK_WIDTH.min(self.blur_work_height()) / 4).max(1);
        radius.clamp(1, limit)
    }
}

/// Resolve the output canvas for a job.
///
/// Named ratios use fixed sizes. Source mode uses the probed size rounded
/// down to even, degrading to [`FALLBACK_DIMENSIONS`] when the probe gave
/// nothing usable.
pub fn resolve_canvas(settings: &JobSettings, info: &MediaInfo) -> Canvas {
    if let Some((w, h)) = settings.geometry.canvas() {
        return Canvas::new(w, h);
    }
    debug_assert_eq!(settings.geometry, GeometryTarget::Source);
    if info.width < 2 || info.height < 2 {
        tracing::warn!(
            width = info.width,
            height = info.height,
            "Unusable source dimensions, using fallback canvas"
        );
        return Canvas::new(FALLBACK_DIMENSIONS.0, FALLBACK_DIMENSIONS.1);
    }
    let (w, h) = info.even_dimensions();
    Canvas::new(w, h)
}

/// Value for the muxer's display aspect option.
pub fn aspect_arg(settings: &JobSettings, canvas: Canvas) -> String {
    settings
        .geometry
        .aspect_label()
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}:{}", canvas.width, canvas.height))
}

pub fn even_floor(value: u32) -> u32 {
    (value - value % 2).max(2)
}

pub fn even_ceil(value: u32) -> u32 {
    (value + value % 2).max(2)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source_info(width: u32, height: u32) -> MediaInfo {
        MediaInfo {
            width,
            height,
            ..MediaInfo::default()
        }
    }

    #[test]
    fn test_named_ratio_ignores_probe() {
        let settings = JobSettings {
            geometry: GeometryTarget::Portrait,
            ..JobSettings::default()
        };
        let canvas = resolve_canvas(&settings, &source_info(1921, 1081));
        assert_eq!(canvas, Canvas::new(1080, 1920));
        assert_eq!(aspect_arg(&settings, canvas), "9:16");
    }

    #[test]
    fn test_source_mode_rounds_to_even() {
        let settings = JobSettings::default();
        let canvas = resolve_canvas(&settings, &source_info(1921, 1081));
        assert_eq!((canvas.width, canvas.height), (1920, 1080));
        assert_eq!(aspect_arg(&settings, canvas), "1920:1080");
    }

    #[test]
    fn test_source_mode_degrades_on_bad_probe() {
        let canvas = resolve_canvas(&JobSettings::default(), &source_info(0, 0));
        assert_eq!((canvas.width, canvas.height), FALLBACK_DIMENSIONS);
    }

    #[test]
    fn test_blur_work_frame() {
        let portrait = Canvas::new(1080, 1920);
        // 64 * 1920 / 1080 = 113.8 -> 114
        assert_eq!(portrait.blur_work_height(), 114);
        let landscape = Canvas::new(1920, 1080);
        // 64 * 1080 / 1920 = 36
        assert_eq!(landscape.blur_work_height(), 36);
        assert_eq!(landscape.clamp_blur_radius(5), 5);
        assert_eq!(landscape.clamp_blur_radius(50), 9);
        assert_eq!(landscape.clamp_blur_radius(0), 1);
    }

    #[test]
    fn test_even_helpers() {
        assert_eq!(even_floor(7), 6);
        assert_eq!(even_ceil(7), 8);
        assert_eq!(even_floor(1), 2);
        assert_eq!(even_ceil(0), 2);
    }
}
