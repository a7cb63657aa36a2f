//! Scoring engine (C5): picks the best-matching template for a cleaned
//! output and computes its 0-100 quality score (§4.5).

use crate::store::{TemplateDefinition, TemplateStore};
use vcollector_model::ParseResult;

/// Score a single candidate against `output`, returning its subscore total
/// and the records it produced (empty if parsing failed).
fn score_candidate(
    tag: &str,
    template: &crate::textfsm::Template,
    output: &str,
) -> (f64, Vec<vcollector_model::TemplateRecord>) {
    let records = match template.parse_text(output) {
        Ok(records) => records,
        Err(_) => return (0.0, Vec::new()),
    };

    let header = template.header();
    let field_count = header.len();
    let record_count = records.len();

    let populated = records
        .iter()
        .flat_map(|record| header.iter().map(move |field| (record, field)))
        .filter(|(record, field)| {
            record
                .get(field.as_str())
                .map(|value| !value.is_empty())
                .unwrap_or(false)
        })
        .count();

    let score = records_subscore(tag, record_count)
        + field_richness_subscore(field_count)
        + population_subscore(populated, record_count, field_count)
        + consistency_subscore(&records, &header, record_count, field_count);

    (score.clamp(0.0, 100.0), records)
}

/// §4.5 subscore 1 (0-30). "Version"-tagged templates expect exactly one
/// record; every other template rewards more records, saturating at 10.
fn records_subscore(tag: &str, record_count: usize) -> f64 {
    let r = record_count as f64;
    if tag.to_lowercase().contains("version") {
        return if record_count == 1 {
            30.0
        } else {
            (15.0 - 5.0 * (r - 1.0)).max(0.0)
        };
    }

    if record_count >= 10 {
        30.0
    } else if record_count < 3 {
        10.0 * r
    } else {
        // Spec.md §9 flags this interpolation as an implementation detail
        // ("may vary within 1 point without regressing P1"); this ramps
        // linearly from the R=2 value (20) up to the R=10 ceiling (30).
        20.0 + (r - 2.0) * (30.0 - 20.0) / (10.0 - 2.0)
    }
}

/// §4.5 subscore 2 (0-30): richer field counts score higher, saturating
/// at F=10.
fn field_richness_subscore(field_count: usize) -> f64 {
    let f = field_count as f64;
    if field_count >= 10 {
        30.0
    } else if field_count < 3 {
        5.0 * f
    } else {
        15.0 + (f - 3.0) * (30.0 - 15.0) / (10.0 - 3.0)
    }
}

/// §4.5 subscore 3 (0-25): fraction of all record*field cells that are
/// non-empty.
fn population_subscore(populated: usize, record_count: usize, field_count: usize) -> f64 {
    let total = record_count * field_count;
    if total == 0 {
        return 0.0;
    }
    25.0 * populated as f64 / total as f64
}

/// §4.5 subscore 4 (0-15): a single record is trivially consistent;
/// otherwise reward fields that are either always or never populated
/// across every record (a field that's sometimes blank usually means a
/// mis-matched template).
fn consistency_subscore(
    records: &[vcollector_model::TemplateRecord],
    header: &[String],
    record_count: usize,
    field_count: usize,
) -> f64 {
    if record_count == 1 {
        return 15.0;
    }
    if field_count == 0 {
        return 0.0;
    }

    let consistent_fields = header
        .iter()
        .filter(|field| {
            let populated_count = records
                .iter()
                .filter(|record| {
                    record
                        .get(field.as_str())
                        .map(|value| !value.is_empty())
                        .unwrap_or(false)
                })
                .count();
            populated_count == 0 || populated_count == record_count
        })
        .count();

    15.0 * consistent_fields as f64 / field_count as f64
}

/// Parse `output` against every candidate template matching `hint` and
/// return the single highest-scoring result, with validity decided by
/// `min_score` (§4.5: "the single highest-scoring template along with its
/// parsed records"; "A threshold min_score ... decides validity"). Ties
/// are broken by the store's iteration order (P1: deterministic for a
/// fixed `(output, store)` pair).
pub fn score_best(store: &dyn TemplateStore, hint: Option<&str>, output: &str, min_score: f64) -> ParseResult {
    let candidates: Vec<&TemplateDefinition> = store.candidates(hint);

    let mut best: Option<(f64, &TemplateDefinition, Vec<vcollector_model::TemplateRecord>)> = None;

    for candidate in candidates {
        let Some(template) = store.compiled(&candidate.id) else {
            continue;
        };
        let (score, records) = score_candidate(&candidate.command_tag, template, output);

        let is_better = match &best {
            None => true,
            Some((best_score, ..)) => score > *best_score,
        };
        if is_better {
            best = Some((score, candidate, records));
        }
    }

    match best {
        None => ParseResult::invalid("no candidate template matched the filter hint"),
        Some((score, definition, records)) => ParseResult {
            is_valid: score >= min_score,
            template_id: Some(definition.id.clone()),
            records,
            score,
            error: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryTemplateStore;

    fn store_with_arp() -> InMemoryTemplateStore {
        let mut store = InMemoryTemplateStore::new();
        store
            .register(TemplateDefinition {
                id: "cisco_ios_show_arp".into(),
                command_tag: "cisco_ios_show_arp".into(),
                textfsm_source: concat!(
                    "Value ADDRESS (\\d+\\.\\d+\\.\\d+\\.\\d+)\n",
                    "Value HWADDR (\\S+)\n",
                    "Value INTERFACE (\\S+)\n\n",
                    "Start\n",
                    "  ^Internet\\s+${ADDRESS}\\s+\\S+\\s+${HWADDR}\\s+\\S+\\s+${INTERFACE} -> Record\n",
                )
                .replace("${ADDRESS}", "(?P<ADDRESS>\\d+\\.\\d+\\.\\d+\\.\\d+)")
                .replace("${HWADDR}", "(?P<HWADDR>\\S+)")
                .replace("${INTERFACE}", "(?P<INTERFACE>\\S+)"),
            })
            .unwrap();
        store
    }

    #[test]
    fn scores_deterministically_for_same_input() {
        let store = store_with_arp();
        let output = "Internet  10.0.0.1  0   aabb.ccdd.eeff  ARPA   Gi0/1\nInternet  10.0.0.2  0   aabb.ccdd.1122  ARPA   Gi0/2\n";
        let first = score_best(&store, None, output, 1.0);
        let second = score_best(&store, None, output, 1.0);
        assert_eq!(first.template_id, second.template_id);
        assert_eq!(first.score, second.score);
    }

    #[test]
    fn unmatched_output_scores_zero() {
        let store = store_with_arp();
        let result = score_best(&store, None, "nothing useful here\n", 1.0);
        assert_eq!(result.score, 0.0);
        assert!(!result.is_valid);
    }

    #[test]
    fn no_candidates_is_invalid_with_no_template_id() {
        let store = InMemoryTemplateStore::new();
        let result = score_best(&store, Some("whatever"), "output", 0.0);
        assert!(!result.is_valid);
        assert!(result.template_id.is_none());
    }

    #[test]
    fn good_match_clears_a_low_threshold() {
        let store = store_with_arp();
        let output = "Internet  10.0.0.1  0   aabb.ccdd.eeff  ARPA   Gi0/1\n";
        let result = score_best(&store, Some("cisco_ios_arp"), output, 1.0);
        assert_eq!(result.template_id.as_deref(), Some("cisco_ios_show_arp"));
        assert!(result.is_valid);
        assert_eq!(result.records.len(), 1);
    }
}
