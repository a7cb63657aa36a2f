//! Output cleaner (C6): strips the paging-disable echo, the command-echo
//! line, and the trailing prompt from a raw shell transcript before it
//! reaches the scorer (§4.6).

use once_cell::sync::Lazy;
use regex::Regex;

static LEADING_NOISE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(terminal length|terminal width|pagination disabled|screen-length disable)")
        .unwrap()
});

static COMMAND_ECHO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\S*[#>$%:\)]\s*\S*\b(show|display|get)\b").unwrap());

static PROMPT_ONLY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^\S+[#>$\)]\s*$").unwrap());

/// Clean a raw transcript. `main_command`, if given, is used both to find
/// the command-echo line (so the paging-disable echo and banner noise
/// above it are discarded) and to decide whether cleaning applies at all:
/// if it's absent, empty, or never found in the transcript, the input is
/// returned unchanged (§4.6: "If the main command is not provided or
/// cannot be found, return the input unchanged").
pub fn clean_output(raw: &str, main_command: Option<&str>) -> String {
    let Some(main_command) = main_command.map(str::trim).filter(|c| !c.is_empty()) else {
        return raw.to_string();
    };

    let lines: Vec<&str> = raw.lines().collect();

    let mut start = 0;
    while start < lines.len() && is_skippable_leading_line(lines[start]) {
        start += 1;
    }

    let Some(echo_idx) = lines[start..]
        .iter()
        .position(|line| is_command_echo_line(line, main_command))
        .map(|offset| start + offset)
    else {
        return raw.to_string();
    };

    let mut end = lines.len();
    while end > echo_idx + 1 {
        let line = lines[end - 1];
        if line.trim().is_empty() || PROMPT_ONLY.is_match(line) {
            end -= 1;
        } else {
            break;
        }
    }

    lines[echo_idx + 1..end].join("\n")
}

fn is_skippable_leading_line(line: &str) -> bool {
    line.trim().is_empty() || LEADING_NOISE.is_match(line)
}

fn is_command_echo_line(line: &str, main_command: &str) -> bool {
    COMMAND_ECHO.is_match(line) && line.to_lowercase().contains(&first_token(main_command))
}

fn first_token(command: &str) -> String {
    command
        .split(',')
        .next()
        .unwrap_or(command)
        .trim()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_main_command_returns_input_unchanged() {
        let raw = "whatever\njunk\n";
        assert_eq!(clean_output(raw, None), raw);
    }

    #[test]
    fn strips_paging_echo_and_trailing_prompt() {
        let raw = "terminal length 0\nswitch#show run\nhostname switch\ninterface Gi0/1\nswitch#";
        let cleaned = clean_output(raw, Some("show run"));
        assert_eq!(cleaned, "hostname switch\ninterface Gi0/1");
    }

    #[test]
    fn command_not_found_returns_input_unchanged() {
        let raw = "switch#show version\nCisco IOS\nswitch#";
        assert_eq!(clean_output(raw, Some("show run")), raw);
    }

    #[test]
    fn trailing_blank_lines_are_also_trimmed() {
        let raw = "switch#show run\nhostname switch\n\n\nswitch#\n";
        let cleaned = clean_output(raw, Some("show run"));
        assert_eq!(cleaned, "hostname switch");
    }
}
