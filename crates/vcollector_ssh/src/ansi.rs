//! ANSI/control-sequence filter (C1). Network gear running on legacy
//! terminal emulation sprinkles CSI escapes (cursor moves, color, clear
//! screen) through interactive output; they have to go before prompt
//! detection or scoring ever sees the text.

use once_cell::sync::Lazy;
use regex::Regex;

static CSI_SEQUENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\x1b\[[0-9;?]*[a-zA-Z]").unwrap());
static OSC_SEQUENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\x1b\][^\x07\x1b]*(\x07|\x1b\\)").unwrap());
static OTHER_ESCAPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\x1b[\(\)][AB012]").unwrap());

/// Strip CSI/OSC escape sequences and bare control characters (other than
/// `\n`, `\r`, `\t`) from raw terminal output.
pub fn strip_ansi(input: &str) -> String {
    let stripped = CSI_SEQUENCE.replace_all(input, "");
    let stripped = OSC_SEQUENCE.replace_all(&stripped, "");
    let stripped = OTHER_ESCAPE.replace_all(&stripped, "");

    stripped
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'))
        .collect()
}

/// Normalize CRLF/bare-CR line endings to `\n` after ANSI stripping, since
/// devices mix line-ending conventions within a single session.
pub fn normalize_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

/// Combined clean pass: strip escapes, then normalize line endings.
pub fn clean(raw: &str) -> String {
    normalize_line_endings(&strip_ansi(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_color_codes() {
        let raw = "\x1b[1;32mswitch#\x1b[0m show version";
        assert_eq!(strip_ansi(raw), "switch# show version");
    }

    #[test]
    fn strips_cursor_movement() {
        let raw = "line one\x1b[2K\x1b[1Aline two";
        assert_eq!(strip_ansi(raw), "line oneline two");
    }

    #[test]
    fn leaves_plain_text_untouched() {
        let raw = "Router#show ip int brief\nGigabitEthernet0/0 up\n";
        assert_eq!(strip_ansi(raw), raw);
    }

    #[test]
    fn normalizes_crlf() {
        assert_eq!(normalize_line_endings("a\r\nb\rc\n"), "a\nb\nc\n");
    }

    #[test]
    fn clean_combines_both_passes() {
        let raw = "\x1b[1mswitch#\x1b[0m show version\r\nCisco IOS\r\n";
        assert_eq!(clean(raw), "switch# show version\nCisco IOS\n");
    }
}
