//! Drawtext construction for closing text.

use clipforge_edit_model::{TextAnimation, TextOverlaySpec, TextPosition};

use crate::color::format_number;
use crate::escape::{escape_filter_path, escape_text};
use crate::graph::Filter;

/// Alpha applied to a text box color that does not carry its own.
pub const DEFAULT_BOX_ALPHA: &str = "0.7";

/// Vertical travel of slide animations, in pixels.
pub const SLIDE_DISTANCE: u32 = 100;

/// Longest intro animation, in seconds.
const MAX_ANIMATION_SECS: f64 = 1.0;

/// Interval of output time, in seconds, during which text is drawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextWindow {
    pub start: f64,
    pub end: f64,
}

impl TextWindow {
    /// The last `duration` seconds of an output lasting `total` seconds.
    pub fn closing(total: f64, duration: f64) -> Self {
        Self {
            start: (total - duration).max(0.0),
            end: total.max(0.0),
        }
    }

    fn animation_secs(&self) -> f64 {
        ((self.end - self.start) / 4.0).clamp(0.1, MAX_ANIMATION_SECS)
    }
}

fn is_font_file(font: &str) -> bool {
    let lower = font.to_ascii_lowercase();
    [".ttf", ".otf", ".ttc"].iter().any(|ext| lower.ends_with(ext))
}

fn base_y(position: TextPosition) -> &'static str {
    match position {
        TextPosition::Top => "h*0.2",
        TextPosition::Center => "(h-text_h)/2",
        TextPosition::Bottom => "h*0.8-text_h",
    }
}

/// Build a drawtext filter. With a window the text appears (and animates)
/// only inside it; without one it is drawn for the whole stream.
pub fn drawtext(spec: &TextOverlaySpec, window: Option<TextWindow>) -> Filter {
    let mut filter = Filter::new("drawtext");

    if let Some(text_box) = &spec.text_box {
        let color = if text_box.color.contains('@') {
            text_box.color.clone()
        } else {
            format!("{}@{DEFAULT_BOX_ALPHA}", text_box.color)
        };
        filter = filter
            .opt("box", 1)
            .opt("boxcolor", color)
            .opt("boxborderw", text_box.padding);
    }

    filter = if is_font_file(&spec.font) {
        filter.opt(
            "fontfile",
            format!("'{}'", escape_filter_path(std::path::Path::new(&spec.font))),
        )
    } else {
        filter.opt("font", format!("'{}'", escape_text(&spec.font)))
    };

    filter = filter
        .opt("text", format!("'{}'", escape_text(&spec.content)))
        .opt("fontsize", spec.size)
        .opt("fontcolor", &spec.color)
        .opt("x", "(w-text_w)/2");

    let y = base_y(spec.position);
    filter = match (window, spec.animation) {
        (Some(w), TextAnimation::SlideUp) => filter.opt(
            "y",
            format!(
                "'{y}+{SLIDE_DISTANCE}*max(0,1-(t-{})/{})'",
                format_number(w.start),
                format_number(w.animation_secs())
            ),
        ),
        (Some(w), TextAnimation::SlideDown) => filter.opt(
            "y",
            format!(
                "'{y}-{SLIDE_DISTANCE}*max(0,1-(t-{})/{})'",
                format_number(w.start),
                format_number(w.animation_secs())
            ),
        ),
        _ => filter.opt("y", y),
    };

    if let (Some(w), TextAnimation::Fade) = (window, spec.animation) {
        filter = filter.opt(
            "alpha",
            format!(
                "'min(1,max(0,(t-{})/{}))'",
                format_number(w.start),
                format_number(w.animation_secs())
            ),
        );
    }

    filter = filter
        .opt("shadowcolor", "black")
        .opt("shadowx", 2)
        .opt("shadowy", 2);

    if let Some(w) = window {
        filter = filter.opt(
            "enable",
            format!(
                "'between(t,{},{})'",
                format_number(w.start),
                format_number(w.end)
            ),
        );
    }
    filter
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipforge_edit_model::TextBox;

    fn spec(content: &str) -> TextOverlaySpec {
        TextOverlaySpec {
            content: content.to_string(),
            ..TextOverlaySpec::default()
        }
    }

    #[test]
    fn test_closing_window() {
        let w = TextWindow::closing(30.0, 5.0);
        assert_eq!((w.start, w.end), (25.0, 30.0));
        let short = TextWindow::closing(3.0, 5.0);
        assert_eq!(short.start, 0.0);
    }

    #[test]
    fn test_static_text_with_window() {
        let f = drawtext(&spec("Follow: me"), Some(TextWindow::closing(30.0, 5.0)));
        let text = f.to_string();
        assert!(text.starts_with("drawtext=font='Sans':text='Follow\\: me'"));
        assert!(text.contains(":x=(w-text_w)/2:y=(h-text_h)/2:"));
        assert!(text.ends_with(":enable='between(t,25,30)'"));
        assert!(!text.contains("alpha"));
    }

    #[test]
    fn test_apostrophe_keeps_following_options() {
        let text = drawtext(&spec("it's"), None).to_string();
        assert!(text.contains(r":text='it'\\\''s':fontsize=60:"), "{text}");
    }

    #[test]
    fn test_box_goes_first_with_default_alpha() {
        let mut s = spec("hi");
        s.text_box = Some(TextBox::default());
        let text = drawtext(&s, None).to_string();
        assert!(text.starts_with("drawtext=box=1:boxcolor=black@0.7:boxborderw=15:"));
        assert!(!text.contains("enable"));
    }

    #[test]
    fn test_font_file_and_animations() {
        let mut s = spec("bye");
        s.font = "/fonts/Bold.TTF".to_string();
        s.animation = TextAnimation::Fade;
        s.position = TextPosition::Bottom;
        let text = drawtext(&s, Some(TextWindow::closing(20.0, 4.0))).to_string();
        assert!(text.contains("fontfile='/fonts/Bold.TTF'"));
        assert!(text.contains("y=h*0.8-text_h"));
        assert!(text.contains("alpha='min(1,max(0,(t-16)/1))'"));

        s.animation = TextAnimation::SlideUp;
        let text = drawtext(&s, Some(TextWindow::closing(20.0, 2.0))).to_string();
        assert!(text.contains("y='h*0.8-text_h+100*max(0,1-(t-18)/0.5)'"));
    }
}
