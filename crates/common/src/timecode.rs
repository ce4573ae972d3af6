//! Timecode and rate utilities for engine progress handling.
//!
//! The media engine reports positions as `HH:MM:SS.ss` strings. This
//! module converts them to seconds and provides a small wall-clock rate
//! limiter used to throttle progress log lines.

use std::time::{Duration, Instant};

/// Parse an `HH:MM:SS.ss` timecode into seconds.
///
/// Hours may have more than two digits. Returns `None` for anything that
/// is not three colon-separated non-negative fields.
pub fn parse_timecode(raw: &str) -> Option<f64> {
    let mut parts = raw.trim().split(':');
    let hours = parts.next()?.parse::<u64>().ok()?;
    let minutes = parts.next()?.parse::<u64>().ok()?;
    let seconds = parts.next()?.parse::<f64>().ok()?;
    if parts.next().is_some() || minutes >= 60 || !(0.0..60.0).contains(&seconds) {
        return None;
    }
    Some(hours as f64 * 3600.0 + minutes as f64 * 60.0 + seconds)
}

/// Format seconds as an `HH:MM:SS.ss` timecode.
pub fn format_timecode(secs: f64) -> String {
    let total_cs = (secs.max(0.0) * 100.0).round() as u64;
    let hours = total_cs / 360_000;
    let minutes = (total_cs % 360_000) / 6_000;
    let seconds = (total_cs % 6_000) / 100;
    let centis = total_cs % 100;
    format!("{hours:02}:{minutes:02}:{seconds:02}.{centis:02}")
}

/// Convert a position into an integer percentage of `total_secs`,
/// clamped to `[0, 100]`. Returns `None` when the total is unknown.
pub fn percent_of(position_secs: f64, total_secs: f64) -> Option<u8> {
    if !(total_secs > 0.0) || !position_secs.is_finite() {
        return None;
    }
    let pct = (position_secs / total_secs * 100.0).floor();
    Some(pct.clamp(0.0, 100.0) as u8)
}

/// Wall-clock throttle: lets one event through per interval.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    last: Option<Instant>,
}

impl RateLimiter {
    /// Create a limiter that admits at most one event per `interval`.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Returns true and records the tick if enough time has passed.
    /// The first call always returns true.
    pub fn should_emit(&mut self) -> bool {
        self.should_emit_at(Instant::now())
    }

    /// Same as [`should_emit`](Self::should_emit) with an explicit clock.
    pub fn should_emit_at(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timecode() {
        assert_eq!(parse_timecode("00:00:00.00"), Some(0.0));
        assert!((parse_timecode("01:02:03.50").unwrap() - 3723.5).abs() < 1e-9);
        assert!((parse_timecode("123:00:00.00").unwrap() - 442_800.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_timecode_rejects_garbage() {
        assert_eq!(parse_timecode("N/A"), None);
        assert_eq!(parse_timecode("00:00"), None);
        assert_eq!(parse_timecode("00:61:00.00"), None);
        assert_eq!(parse_timecode("-01:00:00.00"), None);
        assert_eq!(parse_timecode("00:00:00:00"), None);
    }

    #[test]
    fn test_format_timecode() {
        assert_eq!(format_timecode(3723.5), "01:02:03.50");
        assert_eq!(format_timecode(-4.0), "00:00:00.00");
    }

    #[test]
    fn test_percent_of() {
        assert_eq!(percent_of(30.0, 120.0), Some(25));
        assert_eq!(percent_of(200.0, 120.0), Some(100));
        assert_eq!(percent_of(10.0, 0.0), None);
    }

    #[test]
    fn test_rate_limiter() {
        let start = Instant::now();
        let mut limiter = RateLimiter::new(Duration::from_secs(2));
        assert!(limiter.should_emit_at(start)); // first always fires
        assert!(!limiter.should_emit_at(start + Duration::from_millis(500)));
        assert!(limiter.should_emit_at(start + Duration::from_secs(3)));
    }
}
