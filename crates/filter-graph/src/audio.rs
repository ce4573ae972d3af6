//! Companion audio filter chain.

use clipforge_edit_model::JobSettings;

use crate::color::format_number;

/// Range a single `atempo` stage accepts.
const ATEMPO_MIN: f64 = 0.5;
const ATEMPO_MAX: f64 = 2.0;

/// Split a speed factor into `atempo` stages, each within `[0.5, 2.0]`.
pub fn atempo_factors(speed: f64) -> Vec<f64> {
    if !(speed > 0.0) || !speed.is_finite() || (speed - 1.0).abs() < 1e-6 {
        return vec![];
    }
    let mut factors = vec![];
    let mut remaining = speed;
    while remaining > ATEMPO_MAX {
        factors.push(ATEMPO_MAX);
        remaining /= ATEMPO_MAX;
    }
    while remaining < ATEMPO_MIN {
        factors.push(ATEMPO_MIN);
        remaining /= ATEMPO_MIN;
    }
    if (remaining - 1.0).abs() > 1e-6 {
        factors.push(remaining);
    }
    factors
}

/// Simple audio filter string for a job, or `None` when audio passes through.
pub fn audio_filters(settings: &JobSettings) -> Option<String> {
    let mut filters = vec![];
    let audio = &settings.audio;

    if (audio.volume - 1.0).abs() > 1e-6 && audio.volume >= 0.0 {
        filters.push(format!("volume={}", format_number(audio.volume)));
    }
    for factor in atempo_factors(settings.speed) {
        filters.push(format!("atempo={}", format_number(factor)));
    }
    if audio.bass_gain > 0.0 {
        filters.push(format!("bass=g={}", format_number(audio.bass_gain)));
    }
    if audio.treble_gain > 0.0 {
        filters.push(format!("treble=g={}", format_number(audio.treble_gain)));
    }

    if filters.is_empty() {
        None
    } else {
        Some(filters.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipforge_edit_model::AudioEffects;

    #[test]
    fn test_default_settings_pass_audio_through() {
        assert_eq!(audio_filters(&JobSettings::default()), None);
    }

    #[test]
    fn test_atempo_decomposition() {
        assert_eq!(atempo_factors(1.0), Vec::<f64>::new());
        assert_eq!(atempo_factors(1.5), vec![1.5]);
        assert_eq!(atempo_factors(4.0), vec![2.0, 2.0]);
        assert_eq!(atempo_factors(0.25), vec![0.5, 0.5]);
        let factors = atempo_factors(3.0);
        assert_eq!(factors[0], 2.0);
        assert!((factors[1] - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_full_chain_order() {
        let settings = JobSettings {
            speed: 2.0,
            audio: AudioEffects {
                volume: 1.5,
                bass_gain: 5.0,
                treble_gain: 0.0,
            },
            ..JobSettings::default()
        };
        assert_eq!(
            audio_filters(&settings).as_deref(),
            Some("volume=1.5,atempo=2,bass=g=5")
        );
    }
}
