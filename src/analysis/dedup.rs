//! Candidate deduplication.
//!
//! Candidates from different queries often describe the same location, e.g.
//! a community `locals` capture and a built-in `function` capture of one
//! definition. Each semantic group keeps a single candidate.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use tracing::debug;

use super::candidate::{Candidate, SemanticKey};

/// Preference order within a group; the smallest wins.
fn preference(candidate: &Candidate) -> (u32, bool, bool, &str) {
    (
        candidate.priority,
        candidate.source_node.is_none(),
        candidate.is_implicit(),
        candidate.id.as_str(),
    )
}

/// Keep the preferred candidate of each semantic group, in source order.
pub fn deduplicate(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let total = candidates.len();
    let mut groups: BTreeMap<SemanticKey, Candidate> = BTreeMap::new();

    for candidate in candidates {
        match groups.entry(candidate.semantic_key()) {
            Entry::Vacant(slot) => {
                slot.insert(candidate);
            }
            Entry::Occupied(mut slot) => {
                if preference(&candidate) < preference(slot.get()) {
                    slot.insert(candidate);
                }
            }
        }
    }

    let mut survivors: Vec<Candidate> = groups.into_values().collect();
    survivors.sort_by(|a, b| {
        (a.line, a.column, a.kind, &a.id).cmp(&(b.line, b.column, b.kind, &b.id))
    });

    if survivors.len() < total {
        debug!(
            before = total,
            after = survivors.len(),
            "deduplicated candidates"
        );
    }
    survivors
}

/// Drop implicit exits that control flow can never reach.
pub fn retain_reachable(candidates: &mut Vec<Candidate>) {
    candidates.retain(|c| !(c.is_implicit() && !c.reachable));
}
