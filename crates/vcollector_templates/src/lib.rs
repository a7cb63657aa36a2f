//! Template store & scorer (C5) and output cleaner (C6).
//!
//! `textfsm` implements the TextFSM-compatible template interpreter itself;
//! `store` holds the queryable template collection and its filter-hint
//! tokenization (§4.5); `scorer` turns a parse attempt into the 0-100
//! quality score the job runner checks against `min_score`; `cleaner` is
//! the pre-parse transcript cleanup (§4.6).

mod cleaner;
mod scorer;
mod store;
mod textfsm;

pub use cleaner::clean_output;
pub use scorer::score_best;
pub use store::{InMemoryTemplateStore, TemplateDefinition, TemplateStore};
pub use textfsm::{parse_template, ParseError, Template, TemplateError};
