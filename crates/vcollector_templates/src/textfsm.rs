//! A TextFSM-compatible template interpreter (C5 core).
//!
//! Templates are plain text: a block of `Value` definitions, a blank line,
//! then one or more named states, each a list of `^regex -> action` rules.
//! This covers the subset of the upstream TextFSM grammar the stored
//! templates (and the scoring engine built on top of them) actually use:
//! `Required`/`Filldown`/`List` value options and the `Next`/`Continue`,
//! `Record`/`Clear`/`Clearall`, explicit-state-transition, and `Error`
//! rule actions.

use regex::Regex;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("invalid Value definition: {0}")]
    InvalidValue(String),
    #[error("invalid rule line: {0}")]
    InvalidRule(String),
    #[error("rule references undefined state '{0}'")]
    UndefinedState(String),
    #[error("duplicate value name '{0}'")]
    DuplicateValue(String),
    #[error("template defines no states")]
    NoStates,
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("template raised an error: {0}")]
    Explicit(String),
    #[error("regex engine error: {0}")]
    Regex(String),
}

#[derive(Debug, Clone, Default)]
struct ValueOptions {
    required: bool,
    filldown: bool,
    list: bool,
}

#[derive(Debug, Clone)]
struct ValueDef {
    name: String,
    pattern: Regex,
    options: ValueOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineAction {
    Next,
    Continue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordAction {
    Record,
    Clear,
    Clearall,
    NoRecord,
}

#[derive(Debug, Clone)]
struct Rule {
    pattern: Regex,
    line_action: LineAction,
    record_action: RecordAction,
    next_state: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Clone)]
struct State {
    rules: Vec<Rule>,
}

/// A parsed template, ready to run against raw text any number of times.
#[derive(Debug, Clone)]
pub struct Template {
    values: Vec<ValueDef>,
    states: HashMap<String, State>,
}

const TERMINAL_STATES: &[&str] = &["EOF", "End"];

impl Template {
    pub fn header(&self) -> Vec<String> {
        self.values.iter().map(|v| v.name.clone()).collect()
    }

    /// Run the state machine over `input`, returning one record (as a
    /// header-name -> value map) per `Record` action, mirroring
    /// `textfsm.TextFSM.ParseText`. A regex failure or explicit `Error`
    /// rule aborts parsing for the *whole* template, matching the source's
    /// try/except-around-the-whole-parse semantics (a broken template
    /// contributes a score of 0, never a partial result).
    pub fn parse_text(&self, input: &str) -> Result<Vec<HashMap<String, String>>, ParseError> {
        let mut state_name = "Start".to_string();
        let mut current: HashMap<String, String> = HashMap::new();
        let mut filldown: HashMap<String, String> = HashMap::new();
        let mut lists: HashMap<String, Vec<String>> = HashMap::new();
        let mut records = Vec::new();

        'lines: for raw_line in input.lines() {
            let mut start_idx = 0usize;

            'rematch: loop {
                if TERMINAL_STATES.contains(&state_name.as_str()) {
                    break 'lines;
                }

                let Some(state) = self.states.get(&state_name) else {
                    break 'lines;
                };

                let found = state.rules[start_idx..]
                    .iter()
                    .enumerate()
                    .find_map(|(offset, rule)| {
                        rule.pattern
                            .captures(raw_line)
                            .map(|captures| (start_idx + offset, rule.clone(), captured_fields(&self.values, &captures)))
                    });
                let Some((idx, rule, fields)) = found else {
                    continue 'lines;
                };

                if let Some(message) = &rule.error {
                    return Err(ParseError::Explicit(message.clone()));
                }

                for value in &self.values {
                    if let Some(text) = fields.get(&value.name) {
                        let text = text.clone();
                        if value.options.list {
                            lists.entry(value.name.clone()).or_default().push(text);
                        } else if value.options.filldown {
                            filldown.insert(value.name.clone(), text.clone());
                            current.insert(value.name.clone(), text);
                        } else {
                            current.insert(value.name.clone(), text);
                        }
                    }
                }

                match rule.record_action {
                    RecordAction::Record => {
                        records.push(finalize_record(&self.values, &current, &filldown, &lists));
                        current.clear();
                        lists.clear();
                    }
                    RecordAction::Clear => {
                        current.clear();
                    }
                    RecordAction::Clearall => {
                        current.clear();
                        filldown.clear();
                        lists.clear();
                    }
                    RecordAction::NoRecord => {}
                }

                let state_changed = if let Some(next) = &rule.next_state {
                    let changed = *next != state_name;
                    state_name = next.clone();
                    changed
                } else {
                    false
                };

                if rule.line_action == LineAction::Next {
                    continue 'lines;
                }

                // Continue: resume scanning after this rule against the
                // same line, within the same state, unless this rule also
                // switched state (in which case restart from the top of
                // the new state's rule list).
                if state_changed {
                    start_idx = 0;
                } else {
                    start_idx = idx + 1;
                }
                continue 'rematch;
            }
        }

        if !current.is_empty() || !lists.is_empty() {
            records.push(finalize_record(&self.values, &current, &filldown, &lists));
        }

        Ok(records)
    }
}

fn captured_fields(values: &[ValueDef], captures: &regex::Captures) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    for value in values {
        if let Some(m) = captures.name(&value.name) {
            fields.insert(value.name.clone(), m.as_str().to_string());
        }
    }
    fields
}

fn finalize_record(
    values: &[ValueDef],
    current: &HashMap<String, String>,
    filldown: &HashMap<String, String>,
    lists: &HashMap<String, Vec<String>>,
) -> HashMap<String, String> {
    let mut record = HashMap::new();
    for value in values {
        if let Some(list) = lists.get(&value.name) {
            record.insert(value.name.clone(), list.join(","));
        } else if let Some(v) = current.get(&value.name) {
            record.insert(value.name.clone(), v.clone());
        } else if let Some(v) = filldown.get(&value.name) {
            record.insert(value.name.clone(), v.clone());
        } else {
            record.insert(value.name.clone(), String::new());
        }
    }
    record
}

pub fn parse_template(source: &str) -> Result<Template, TemplateError> {
    let mut values = Vec::new();
    let mut lines = source.lines().peekable();

    while let Some(line) = lines.peek() {
        let trimmed = line.trim_end();
        if trimmed.trim().is_empty() {
            lines.next();
            break;
        }
        if trimmed.starts_with('#') {
            lines.next();
            continue;
        }
        values.push(parse_value_line(trimmed)?);
        lines.next();
    }

    let mut names_seen = std::collections::HashSet::new();
    for value in &values {
        if !names_seen.insert(value.name.clone()) {
            return Err(TemplateError::DuplicateValue(value.name.clone()));
        }
    }

    let mut states: HashMap<String, State> = HashMap::new();
    let mut current_state: Option<String> = None;

    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        if !line.starts_with(' ') && !line.starts_with('\t') {
            let name = line.trim().to_string();
            states.entry(name.clone()).or_insert(State { rules: Vec::new() });
            current_state = Some(name);
            continue;
        }

        let Some(state_name) = &current_state else {
            return Err(TemplateError::InvalidRule(format!(
                "rule line outside of any state: {line}"
            )));
        };
        let rule = parse_rule_line(line.trim())?;
        states
            .get_mut(state_name)
            .expect("state was just inserted")
            .rules
            .push(rule);
    }

    if states.is_empty() {
        return Err(TemplateError::NoStates);
    }
    if !states.contains_key("Start") {
        return Err(TemplateError::UndefinedState("Start".to_string()));
    }

    for state in states.values() {
        for rule in &state.rules {
            if let Some(next) = &rule.next_state {
                if !states.contains_key(next) && !TERMINAL_STATES.contains(&next.as_str()) {
                    return Err(TemplateError::UndefinedState(next.clone()));
                }
            }
        }
    }

    Ok(Template { values, states })
}

fn parse_value_line(line: &str) -> Result<ValueDef, TemplateError> {
    let rest = line
        .strip_prefix("Value ")
        .ok_or_else(|| TemplateError::InvalidValue(line.to_string()))?;

    let open = rest
        .find('(')
        .ok_or_else(|| TemplateError::InvalidValue(line.to_string()))?;
    let close = rest
        .rfind(')')
        .ok_or_else(|| TemplateError::InvalidValue(line.to_string()))?;
    if close < open {
        return Err(TemplateError::InvalidValue(line.to_string()));
    }

    let head = rest[..open].trim();
    let pattern_src = &rest[open + 1..close];

    let mut tokens: Vec<&str> = head.split_whitespace().collect();
    let name = tokens
        .pop()
        .ok_or_else(|| TemplateError::InvalidValue(line.to_string()))?
        .to_string();

    let mut options = ValueOptions::default();
    for token in tokens {
        for flag in token.split(',') {
            match flag {
                "Required" => options.required = true,
                "Filldown" => options.filldown = true,
                "List" => options.list = true,
                "" => {}
                other => return Err(TemplateError::InvalidValue(format!("unknown option {other}"))),
            }
        }
    }

    let named_pattern = format!("(?P<{name}>{pattern_src})");
    let pattern = Regex::new(&named_pattern)
        .map_err(|e| TemplateError::InvalidValue(format!("{name}: {e}")))?;

    Ok(ValueDef {
        name,
        pattern,
        options,
    })
}

fn parse_rule_line(line: &str) -> Result<Rule, TemplateError> {
    let rest = line
        .strip_prefix('^')
        .ok_or_else(|| TemplateError::InvalidRule(line.to_string()))?;

    let (pattern_src, action) = match rest.find("->") {
        Some(idx) => (rest[..idx].trim_end(), Some(rest[idx + 2..].trim())),
        None => (rest, None),
    };

    let pattern = Regex::new(&format!("^{pattern_src}"))
        .map_err(|e| TemplateError::InvalidRule(format!("{pattern_src}: {e}")))?;

    let mut line_action = LineAction::Next;
    let mut record_action = RecordAction::NoRecord;
    let mut next_state = None;
    let mut error = None;

    if let Some(action) = action {
        if let Some(msg) = action.strip_prefix("Error") {
            let msg = msg.trim().trim_matches('"').to_string();
            error = Some(if msg.is_empty() {
                "template rule raised Error".to_string()
            } else {
                msg
            });
        } else {
            let mut parts = action.split_whitespace();
            if let Some(verb) = parts.next() {
                let components: Vec<&str> = verb.split('.').collect();
                for component in &components {
                    match *component {
                        "Next" => line_action = LineAction::Next,
                        "Continue" => line_action = LineAction::Continue,
                        "Record" => record_action = RecordAction::Record,
                        "Clear" => record_action = RecordAction::Clear,
                        "Clearall" => record_action = RecordAction::Clearall,
                        "" => {}
                        other => {
                            return Err(TemplateError::InvalidRule(format!(
                                "unknown rule verb component '{other}'"
                            )))
                        }
                    }
                }
            }
            if let Some(state) = parts.next() {
                next_state = Some(state.to_string());
            }
        }
    }

    Ok(Rule {
        pattern,
        line_action,
        record_action,
        next_state,
        error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_template() {
        let source = "Value HOSTNAME (\\S+)\nValue VERSION (\\S+)\n\nStart\n  ^Hostname: (?P<HOSTNAME>\\S+) -> Continue\n  ^Version (?P<VERSION>\\S+) -> Record\n";
        let template = parse_template(source).unwrap();
        assert_eq!(template.header(), vec!["HOSTNAME", "VERSION"]);
    }

    #[test]
    fn simple_record_per_line() {
        let source = "Value NAME (\\S+)\n\nStart\n  ^name=(?P<NAME>\\S+) -> Record\n";
        let template = parse_template(source).unwrap();
        let records = template.parse_text("name=router1\nname=router2\n").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("NAME").unwrap(), "router1");
        assert_eq!(records[1].get("NAME").unwrap(), "router2");
    }

    #[test]
    fn filldown_persists_across_records() {
        let source = "Value Filldown HOST (\\S+)\nValue IFACE (\\S+)\n\nStart\n  ^Hostname: (?P<HOST>\\S+) -> Continue\n  ^Interface: (?P<IFACE>\\S+) -> Record\n";
        let template = parse_template(source).unwrap();
        let records = template
            .parse_text("Hostname: switch1\nInterface: Gi0/1\nInterface: Gi0/2\n")
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("HOST").unwrap(), "switch1");
        assert_eq!(records[1].get("HOST").unwrap(), "switch1");
    }

    #[test]
    fn list_values_accumulate() {
        let source = "Value List TAG (\\S+)\n\nStart\n  ^tag=(?P<TAG>\\S+) -> Continue\n  ^END -> Record\n";
        let template = parse_template(source).unwrap();
        let records = template.parse_text("tag=a\ntag=b\nEND\n").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("TAG").unwrap(), "a,b");
    }

    #[test]
    fn explicit_error_rule_aborts_parsing() {
        let source = "Value NAME (\\S+)\n\nStart\n  ^% Invalid -> Error \"bad input\"\n  ^name=(?P<NAME>\\S+) -> Record\n";
        let template = parse_template(source).unwrap();
        let err = template.parse_text("% Invalid input\n").unwrap_err();
        assert_eq!(err.to_string(), "template raised an error: bad input");
    }

    #[test]
    fn undefined_next_state_is_rejected() {
        let source = "Value NAME (\\S+)\n\nStart\n  ^name=(?P<NAME>\\S+) -> Record NoSuchState\n";
        assert_eq!(
            parse_template(source).unwrap_err(),
            TemplateError::UndefinedState("NoSuchState".to_string())
        );
    }

    #[test]
    fn rejects_template_without_start_state() {
        let source = "Value NAME (\\S+)\n\nOther\n  ^name=(?P<NAME>\\S+) -> Record\n";
        assert_eq!(
            parse_template(source).unwrap_err(),
            TemplateError::UndefinedState("Start".to_string())
        );
    }
}
