//! Incremental rewriting with per-edit validation.
//!
//! Edits are applied back to front so that offsets computed against the
//! original source stay valid. After every splice the live tree is told
//! about the changed range and reparsed incrementally; an edit that leaves
//! more syntax errors than the original file had is rolled back on its own.

use std::cmp::Reverse;

use tracing::{debug, warn};
use tree_sitter::{InputEdit, Parser, Tree};

use super::resolve::ResolvedEdit;
use crate::analysis::PointKind;
use crate::syntax::count_errors;
use crate::syntax::text::point_at;

/// Result of applying a batch of edits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteOutcome {
    pub source: String,
    pub applied: usize,
    pub reverted: usize,
}

/// Position of an edit among those sharing its offset. Ascending keys give
/// the order the inserted texts read in: closings of inner constructs,
/// closings of outer constructs, then openings with the import first and
/// outer before inner. An opening whose own closing lands on the same
/// offset reads right before it.
type TextKey = (u8, u8, i64, u8);

fn text_key(edit: &ResolvedEdit, pairs_with_closing: bool) -> TextKey {
    let anchor = edit.anchor_start as i64;
    if edit.is_closing() {
        (0, 0, -anchor, 1)
    } else if pairs_with_closing {
        (0, 0, -anchor, 0)
    } else {
        let import = if edit.kind == PointKind::Import { 0 } else { 1 };
        (1, import, anchor, 0)
    }
}

/// Sort edits into application order: descending offset, and within an
/// offset the reverse of their reading order.
pub fn order_edits(edits: Vec<ResolvedEdit>) -> Vec<ResolvedEdit> {
    let closings: Vec<(usize, usize)> = edits
        .iter()
        .filter(|e| e.is_closing())
        .map(|e| (e.byte_offset, e.anchor_start))
        .collect();

    let mut keyed: Vec<(TextKey, ResolvedEdit)> = edits
        .into_iter()
        .map(|edit| {
            let pairs = !edit.is_closing()
                && closings.contains(&(edit.byte_offset, edit.anchor_start));
            (text_key(&edit, pairs), edit)
        })
        .collect();

    keyed.sort_by(|(ka, a), (kb, b)| {
        (Reverse(a.byte_offset), Reverse(*ka), &a.originating_candidate_id).cmp(&(
            Reverse(b.byte_offset),
            Reverse(*kb),
            &b.originating_candidate_id,
        ))
    });
    keyed.into_iter().map(|(_, edit)| edit).collect()
}

/// Applies edits to one file, keeping its tree in sync.
pub struct IncrementalRewriter<'p> {
    parser: &'p mut Parser,
    source: String,
    tree: Tree,
    baseline_errors: usize,
    /// `(offset, length delta)` of every accepted edit.
    applied: Vec<(usize, isize)>,
    reverted: usize,
}

impl<'p> IncrementalRewriter<'p> {
    /// `tree` must be the parse of `source` produced by `parser`.
    pub fn new(parser: &'p mut Parser, source: String, tree: Tree) -> Self {
        let baseline_errors = count_errors(&tree);
        Self {
            parser,
            source,
            tree,
            baseline_errors,
            applied: Vec::new(),
            reverted: 0,
        }
    }

    /// Order and apply every edit, returning the final buffer.
    pub fn apply(mut self, edits: Vec<ResolvedEdit>) -> RewriteOutcome {
        for edit in order_edits(edits) {
            self.apply_one(&edit);
        }

        debug!(
            applied = self.applied.len(),
            reverted = self.reverted,
            "rewrite finished"
        );
        RewriteOutcome {
            source: self.source,
            applied: self.applied.len(),
            reverted: self.reverted,
        }
    }

    fn apply_one(&mut self, edit: &ResolvedEdit) -> bool {
        let offset = edit.byte_offset.min(self.source.len());
        if !self.source.is_char_boundary(offset) {
            warn!(id = %edit.originating_candidate_id, offset, "edit offset splits a character");
            self.reverted += 1;
            return false;
        }

        let (old_end, replacement) = match edit.node_end_byte {
            Some(end) if edit.wraps() => {
                let end = self.shifted_end(offset, end);
                if !self.source.is_char_boundary(end) {
                    self.reverted += 1;
                    return false;
                }
                let original = &self.source[offset..end];
                (end, format!("{{ {} {} }}", edit.insertion_text, original))
            }
            _ => (offset, self.joined_text(offset, &edit.insertion_text)),
        };

        let start_position = point_at(&self.source, offset);
        let old_end_position = point_at(&self.source, old_end);
        let removed = self.source[offset..old_end].to_string();
        self.source.replace_range(offset..old_end, &replacement);
        let new_end = offset + replacement.len();

        let input = InputEdit {
            start_byte: offset,
            old_end_byte: old_end,
            new_end_byte: new_end,
            start_position,
            old_end_position,
            new_end_position: point_at(&self.source, new_end),
        };
        let mut edited = self.tree.clone();
        edited.edit(&input);

        match self.parser.parse(&self.source, Some(&edited)) {
            Some(tree) if count_errors(&tree) <= self.baseline_errors => {
                self.tree = tree;
                self.applied
                    .push((offset, replacement.len() as isize - removed.len() as isize));
                true
            }
            reparsed => {
                let timed_out = reparsed.is_none();
                if timed_out {
                    // A halted parse would otherwise resume on the next call.
                    self.parser.reset();
                }
                debug!(
                    id = %edit.originating_candidate_id,
                    offset,
                    timed_out,
                    "edit broke the syntax tree, reverting"
                );
                self.source.replace_range(offset..new_end, &removed);
                self.reverted += 1;
                false
            }
        }
    }

    /// Text to splice at `offset`. An inline split that ends by reopening the
    /// line (`\n` plus indentation) drops that tail when the edit applied
    /// just before, at the same offset, already starts on a new line.
    fn joined_text(&self, offset: usize, text: &str) -> String {
        let follows_split = self.applied.last().is_some_and(|(o, _)| *o == offset)
            && self.source[offset..].starts_with('\n');
        if follows_split {
            if let Some(cut) = text.rfind('\n') {
                let tail = &text[cut + 1..];
                if !tail.is_empty() && tail.chars().all(|c| c == ' ' || c == '\t') {
                    return text[..cut].to_string();
                }
            }
        }
        text.to_string()
    }

    /// `end` moved by edits already applied inside `[offset, end)`.
    fn shifted_end(&self, offset: usize, end: usize) -> usize {
        let delta: isize = self
            .applied
            .iter()
            .filter(|(o, _)| *o >= offset && *o < end)
            .map(|(_, d)| *d)
            .sum();
        let shifted = (end as isize + delta).max(offset as isize) as usize;
        shifted.min(self.source.len())
    }
}
