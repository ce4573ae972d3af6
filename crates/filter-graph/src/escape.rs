//! Escaping for values embedded in filter arguments.

use std::path::Path;

/// Close the quote, then an apostrophe escaped for both tokenizer passes
/// (graph description, then filter options), then reopen.
const QUOTED_APOSTROPHE: &str = r"'\\\''";

/// Escape text for a single-quoted drawtext value.
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\'' => out.push_str(QUOTED_APOSTROPHE),
            ':' => out.push_str("\\:"),
            _ => out.push(c),
        }
    }
    out
}

/// Normalize a path for use inside a single-quoted filter argument:
/// forward slashes, colons escaped (they collide with the option
/// separator), apostrophes escaped as in [`escape_text`].
///
/// Callers pass absolute paths; relative ones are kept as given.
pub fn escape_filter_path(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "/")
        .replace(':', "\\:")
        .replace('\'', QUOTED_APOSTROPHE)
}

/// Convert `RRGGBB` (optionally `#`-prefixed) to an ASS `&HBBGGRR` colour.
/// Invalid input yields white.
pub fn ass_colour(rgb: &str) -> String {
    let hex = rgb.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return "&HFFFFFF".to_string();
    }
    let hex = hex.to_ascii_uppercase();
    format!("&H{}{}{}", &hex[4..6], &hex[2..4], &hex[0..2])
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One pass of the engine's tokenizer: quotes group literally,
    /// a backslash outside quotes takes the next character as is.
    fn unquote(s: &str) -> String {
        let mut out = String::new();
        let mut quoted = false;
        let mut chars = s.chars();
        while let Some(c) = chars.next() {
            match c {
                '\'' => quoted = !quoted,
                '\\' if !quoted => out.extend(chars.next()),
                _ => out.push(c),
            }
        }
        out
    }

    #[test]
    fn test_escape_text() {
        assert_eq!(escape_text("Time: 5 o'clock"), r"Time\: 5 o'\\\''clock");
        assert_eq!(escape_text("it's"), r"it'\\\''s");
        assert_eq!(escape_text("plain"), "plain");
    }

    #[test]
    fn test_quoted_text_survives_both_passes() {
        for text in ["it's", "Time: 5 o'clock", "a''b", "'quoted'"] {
            let arg = format!("'{}'", escape_text(text));
            assert_eq!(unquote(&unquote(&arg)), text, "{arg}");
        }
    }

    #[test]
    fn test_filter_path_apostrophe() {
        let escaped = escape_filter_path(Path::new("/media/it's here/subs.srt"));
        assert_eq!(escaped, r"/media/it'\\\''s here/subs.srt");
        assert_eq!(
            unquote(&unquote(&format!("'{escaped}'"))),
            "/media/it's here/subs.srt"
        );
    }

    #[test]
    fn test_escape_filter_path() {
        assert_eq!(
            escape_filter_path(Path::new("C:\\clips\\subs.srt")),
            "C\\:/clips/subs.srt"
        );
        assert_eq!(
            escape_filter_path(Path::new("/home/user/subs.srt")),
            "/home/user/subs.srt"
        );
    }

    #[test]
    fn test_ass_colour() {
        assert_eq!(ass_colour("FF8000"), "&H0080FF");
        assert_eq!(ass_colour("#00ff00"), "&H00FF00");
        assert_eq!(ass_colour("nope"), "&HFFFFFF");
    }
}
