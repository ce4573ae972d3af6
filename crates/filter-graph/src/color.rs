//! Color-grade preset fragments.

use clipforge_edit_model::ColorGrade;

use crate::graph::Filter;

/// Filter fragment for a preset; `None` contributes nothing.
pub fn grade_fragment(grade: ColorGrade) -> Option<&'static str> {
    let fragment = match grade {
        ColorGrade::None => return None,
        ColorGrade::BlackWhite => "hue=s=0",
        ColorGrade::Sepia => {
            "colorchannelmixer=.393:.769:.189:0:.349:.686:.168:0:.272:.534:.131"
        }
        ColorGrade::Vintage => {
            "eq=contrast=1.1:brightness=-0.05:saturation=0.8,colorbalance=rs=0.1:gs=-0.05:bs=-0.1"
        }
        ColorGrade::Cold => "colorbalance=rs=-0.2:gs=-0.1:bs=0.3,eq=saturation=1.2",
        ColorGrade::Warm => "colorbalance=rs=0.3:gs=-0.1:bs=-0.3,eq=saturation=1.1",
        ColorGrade::Vivid => "eq=saturation=1.5:contrast=1.1",
        ColorGrade::Cinematic => {
            "colorbalance=rs=-0.1:bs=0.2:rh=0.2:bh=-0.1,eq=contrast=1.1:saturation=1.1"
        }
        ColorGrade::Dreamy => {
            "colorbalance=rs=0.1:bs=0.1,eq=contrast=0.9:brightness=0.05:saturation=0.8"
        }
        ColorGrade::Dramatic => "eq=contrast=1.3:saturation=0.6:brightness=-0.05",
        ColorGrade::Cyberpunk => {
            "colorbalance=rs=-0.2:gs=-0.1:bs=0.4:rh=0.2:gh=-0.1:bh=0.2,eq=contrast=1.2:saturation=1.4"
        }
    };
    Some(fragment)
}

/// Preset as a graph filter.
pub fn grade_filter(grade: ColorGrade) -> Option<Filter> {
    grade_fragment(grade).map(Filter::raw)
}

/// Brightness multiplier as an additive `eq` adjustment; 1.0 is a no-op.
pub fn brightness_filter(multiplier: f64) -> Option<Filter> {
    let offset = multiplier - 1.0;
    if offset.abs() < 1e-6 {
        return None;
    }
    Some(Filter::new("eq").opt("brightness", format_number(offset)))
}

/// Compact decimal rendering without float noise (`0.3`, not `0.30000000000000004`).
pub fn format_number(value: f64) -> String {
    let text = format!("{value:.4}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text == "-0" {
        "0".to_string()
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_contributes_nothing() {
        assert!(grade_filter(ColorGrade::None).is_none());
    }

    #[test]
    fn test_fixed_fragments() {
        assert_eq!(grade_fragment(ColorGrade::BlackWhite), Some("hue=s=0"));
        assert!(grade_fragment(ColorGrade::Sepia)
            .unwrap()
            .starts_with("colorchannelmixer="));
        assert_eq!(
            grade_filter(ColorGrade::Vivid).unwrap().to_string(),
            "eq=saturation=1.5:contrast=1.1"
        );
    }

    #[test]
    fn test_brightness_offset() {
        assert!(brightness_filter(1.0).is_none());
        assert_eq!(
            brightness_filter(1.3).unwrap().to_string(),
            "eq=brightness=0.3"
        );
        assert_eq!(
            brightness_filter(0.75).unwrap().to_string(),
            "eq=brightness=-0.25"
        );
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(2.0), "2");
        assert_eq!(format_number(0.5), "0.5");
        assert_eq!(format_number(1.0 / 3.0), "0.3333");
        assert_eq!(format_number(-0.00001), "0");
    }
}
