//! Probed source media facts.

use serde::{Deserialize, Serialize};

/// Canvas used when a source cannot be probed in source-geometry mode.
pub const FALLBACK_DIMENSIONS: (u32, u32) = (1280, 720);

/// What the engine reported about a source file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Display width, after rotation metadata has been applied.
    pub width: u32,
    /// Display height, after rotation metadata has been applied.
    pub height: u32,
    /// Container duration in seconds (0.0 when unknown).
    pub duration_secs: f64,
    pub has_audio: bool,
    /// Rotation side data, when the stream carries one.
    pub rotation_degrees: Option<f64>,
}

impl Default for MediaInfo {
    fn default() -> Self {
        Self {
            width: FALLBACK_DIMENSIONS.0,
            height: FALLBACK_DIMENSIONS.1,
            duration_secs: 0.0,
            has_audio: false,
            rotation_degrees: None,
        }
    }
}

impl MediaInfo {
    /// Dimensions rounded down to even values, with a floor of 2.
    pub fn even_dimensions(&self) -> (u32, u32) {
        (round_down_even(self.width), round_down_even(self.height))
    }

    pub fn is_portrait(&self) -> bool {
        self.height > self.width
    }

    /// Duration, when the probe found one.
    pub fn known_duration(&self) -> Option<f64> {
        (self.duration_secs > 0.0).then_some(self.duration_secs)
    }
}

fn round_down_even(value: u32) -> u32 {
    (value - value % 2).max(2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_even_dimensions() {
        let info = MediaInfo {
            width: 1081,
            height: 1919,
            ..MediaInfo::default()
        };
        assert_eq!(info.even_dimensions(), (1080, 1918));
        assert!(info.is_portrait());
    }

    #[test]
    fn test_unknown_duration() {
        assert_eq!(MediaInfo::default().known_duration(), None);
        let info = MediaInfo {
            duration_secs: 12.5,
            ..MediaInfo::default()
        };
        assert_eq!(info.known_duration(), Some(12.5));
    }
}
