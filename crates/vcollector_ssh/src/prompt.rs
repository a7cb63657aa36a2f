//! Prompt detection (C2): turning a chunk of raw shell output into a
//! reliable prompt string the session can match against to know a command
//! has finished producing output.
//!
//! Ported from the source's `_extract_clean_prompt` / `_is_repeated_prompt`
//! / `_extract_base_prompt` fallback chain: devices are inconsistent about
//! what they echo back, so the detector tries progressively cheaper
//! assumptions rather than committing to one regex.

const PROMPT_ENDING_CHARS: &[char] = &['#', '>', '$', '%', ':', ']', ')', '|'];
const MAX_CLEAN_PROMPT_LEN: usize = 50;

/// Best-effort extraction of a single prompt string from a buffer of
/// collected output. Returns `None` only when the buffer has no non-blank
/// lines at all.
pub fn extract_clean_prompt(buffer: &str) -> Option<String> {
    let lines: Vec<&str> = buffer
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    let last = *lines.last()?;

    if ends_with_prompt_char(last) && last.len() <= MAX_CLEAN_PROMPT_LEN && !is_repeated_prompt(last)
    {
        return Some(last.to_string());
    }

    if let Some(base) = extract_base_prompt(last) {
        return Some(base);
    }

    for line in lines.iter().rev() {
        if ends_with_prompt_char(line) {
            return Some((*line).to_string());
        }
    }

    if let Some(reconstructed) = reconstruct_from_tokens(last) {
        return Some(reconstructed);
    }

    Some(last.to_string())
}

fn ends_with_prompt_char(line: &str) -> bool {
    line.chars()
        .last()
        .map(|c| PROMPT_ENDING_CHARS.contains(&c))
        .unwrap_or(false)
}

/// A line like `switch#switch#switch#` (a device that echoed its prompt
/// multiple times into one buffered read) splits into >1 identical
/// non-empty parts on any prompt-ending character.
pub fn is_repeated_prompt(line: &str) -> bool {
    let parts: Vec<&str> = line
        .split(PROMPT_ENDING_CHARS)
        .filter(|part| !part.is_empty())
        .collect();

    if parts.len() <= 1 {
        return false;
    }
    parts.windows(2).all(|w| w[0] == w[1])
}

/// Splits on each candidate ending char in turn; if every part but the
/// last is identical, the prompt is `base + that char` (e.g.
/// `"switchswitch#"` -> `"switch#"`).
pub fn extract_base_prompt(line: &str) -> Option<String> {
    for &ending in PROMPT_ENDING_CHARS {
        let parts: Vec<&str> = line.split(ending).collect();
        if parts.len() < 2 {
            continue;
        }
        let body = &parts[..parts.len() - 1];
        if body.len() > 1 && body.iter().all(|p| *p == body[0]) && !body[0].is_empty() {
            return Some(format!("{}{}", body[0], ending));
        }
    }

    whitespace_repeated_token(line)
}

/// Fallback: a line made of one token repeated with whitespace between it,
/// e.g. `"switch# switch#"` -> `"switch#"`.
fn whitespace_repeated_token(line: &str) -> Option<String> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() > 1 && tokens.iter().all(|t| *t == tokens[0]) {
        return Some(tokens[0].to_string());
    }
    None
}

fn reconstruct_from_tokens(line: &str) -> Option<String> {
    for &ending in PROMPT_ENDING_CHARS {
        if let Some(idx) = line.rfind(ending) {
            let candidate = &line[..=idx];
            if candidate.len() <= MAX_CLEAN_PROMPT_LEN && !candidate.is_empty() {
                return Some(candidate.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_prompt_line_is_returned_as_is() {
        assert_eq!(extract_clean_prompt("switch#"), Some("switch#".to_string()));
    }

    #[test]
    fn trailing_blank_lines_are_ignored() {
        assert_eq!(
            extract_clean_prompt("Router#\n\n\n"),
            Some("Router#".to_string())
        );
    }

    #[test]
    fn repeated_prompt_is_collapsed_via_base_prompt() {
        assert_eq!(
            extract_clean_prompt("switch#switch#"),
            Some("switch#".to_string())
        );
    }

    #[test]
    fn is_repeated_prompt_detects_duplicate_parts() {
        assert!(is_repeated_prompt("switch#switch#switch#"));
        assert!(!is_repeated_prompt("switch#"));
    }

    #[test]
    fn long_noisy_line_falls_back_to_reverse_scan() {
        let buffer = "Router#\nsome long line of banner text that keeps going on\n";
        assert_eq!(extract_clean_prompt(buffer), Some("Router#".to_string()));
    }

    #[test]
    fn empty_buffer_returns_none() {
        assert_eq!(extract_clean_prompt("   \n\n"), None);
    }

    #[test]
    fn whitespace_repeated_token_is_collapsed() {
        assert_eq!(
            extract_base_prompt("switch# switch#"),
            Some("switch#".to_string())
        );
    }
}
