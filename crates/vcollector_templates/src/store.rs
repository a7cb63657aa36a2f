//! Template store (C5): a read-only queryable collection of parser
//! templates, with the substring-conjunction filter-hint matching of §4.5.

use crate::textfsm::{self, Template, TemplateError};
use std::collections::HashMap;

/// One stored template: `{id, command_tag, textfsm_source}` (§4.5).
#[derive(Debug, Clone)]
pub struct TemplateDefinition {
    pub id: String,
    pub command_tag: String,
    pub textfsm_source: String,
}

struct Entry {
    definition: TemplateDefinition,
    compiled: Template,
}

/// A read-only queryable collection of parser templates (§6 "Template
/// store"). The core only reads through this trait; population is out of
/// scope (spec.md Non-goals: "the TextFSM template database population
/// tool").
pub trait TemplateStore: Send + Sync {
    /// Candidate templates for a filter hint, in a stable (insertion)
    /// order. `hint` is tokenized on `_`/`-`; a template matches if every
    /// token longer than 2 characters appears as a case-insensitive
    /// substring of its `command_tag`. No hint (`None` or empty) returns
    /// every template.
    fn candidates(&self, hint: Option<&str>) -> Vec<&TemplateDefinition>;

    fn compiled(&self, id: &str) -> Option<&Template>;
}

/// In-memory template store backed by a `Vec`, preserving insertion order
/// so tie-breaks in the scorer (§4.5: "ties are broken in iteration
/// order") are deterministic.
#[derive(Default)]
pub struct InMemoryTemplateStore {
    entries: Vec<Entry>,
    by_id: HashMap<String, usize>,
}

impl InMemoryTemplateStore {
    pub fn new() -> Self {
        InMemoryTemplateStore::default()
    }

    /// Compile and register a template. Rejects sources that don't parse
    /// as a valid TextFSM template; a template that compiles but then
    /// fails to *match* a given output is a scoring-time concern (§4.5
    /// step 1), not a store concern.
    pub fn register(&mut self, definition: TemplateDefinition) -> Result<(), TemplateError> {
        let compiled = textfsm::parse_template(&definition.textfsm_source)?;
        self.by_id
            .insert(definition.id.clone(), self.entries.len());
        self.entries.push(Entry {
            definition,
            compiled,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Tokenize a filter hint on `_`/`-`, keeping only tokens longer than two
/// characters (§4.5).
fn hint_tokens(hint: &str) -> Vec<String> {
    hint.split(|c| c == '_' || c == '-')
        .filter(|token| token.len() > 2)
        .map(|token| token.to_lowercase())
        .collect()
}

impl TemplateStore for InMemoryTemplateStore {
    fn candidates(&self, hint: Option<&str>) -> Vec<&TemplateDefinition> {
        let hint = hint.map(str::trim).filter(|h| !h.is_empty());
        let Some(hint) = hint else {
            return self.entries.iter().map(|e| &e.definition).collect();
        };

        let tokens = hint_tokens(hint);
        if tokens.is_empty() {
            return self.entries.iter().map(|e| &e.definition).collect();
        }

        self.entries
            .iter()
            .filter(|entry| {
                let tag = entry.definition.command_tag.to_lowercase();
                tokens.iter().all(|token| tag.contains(token.as_str()))
            })
            .map(|e| &e.definition)
            .collect()
    }

    fn compiled(&self, id: &str) -> Option<&Template> {
        self.by_id.get(id).map(|&idx| &self.entries[idx].compiled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(tags: &[(&str, &str)]) -> InMemoryTemplateStore {
        let mut store = InMemoryTemplateStore::new();
        for (id, tag) in tags {
            store
                .register(TemplateDefinition {
                    id: (*id).to_string(),
                    command_tag: (*tag).to_string(),
                    textfsm_source: "Value NAME (\\S+)\n\nStart\n  ^name=(?P<NAME>\\S+) -> Record\n"
                        .to_string(),
                })
                .unwrap();
        }
        store
    }

    #[test]
    fn no_hint_returns_every_template() {
        let store = store_with(&[("a", "cisco_ios_show_arp"), ("b", "arista_eos_show_version")]);
        assert_eq!(store.candidates(None).len(), 2);
    }

    #[test]
    fn hint_requires_every_token_to_match() {
        let store = store_with(&[("a", "cisco_ios_show_arp"), ("b", "arista_eos_show_version")]);
        let candidates = store.candidates(Some("cisco_ios_arp"));
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, "a");
    }

    #[test]
    fn short_tokens_are_ignored() {
        let store = store_with(&[("a", "cisco_ios_show_arp")]);
        // "ip" is <= 2 chars and should be dropped, leaving only "cisco"/"show"/"arp".
        assert_eq!(store.candidates(Some("cisco-ip-arp")).len(), 1);
    }

    #[test]
    fn no_match_returns_empty() {
        let store = store_with(&[("a", "cisco_ios_show_arp")]);
        assert!(store.candidates(Some("juniper_junos_show_arp")).is_empty());
    }
}
