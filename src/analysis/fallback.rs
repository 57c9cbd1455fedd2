//! Regex fallback analyzer.
//!
//! Used when the parser times out or cannot be configured. Scans lines with
//! per-language patterns and only instruments entry points whose header
//! line ends with the block opener, since nothing else can be placed safely
//! without a tree.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, warn};

use super::candidate::{Candidate, InsertionMode, PointKind};
use super::classify::is_valid_identifier;
use crate::error::InstrumentError;
use crate::rewrite::template;
use crate::rewrite::{reindent, IndentStyle, RewriteOutcome};
use crate::rules::{BlockStyle, LanguageRules, PRIORITY_LOW};
use crate::syntax::text::{line_end, line_indent, next_line_start};

/// Keywords that the loose patterns can mistake for names.
const RESERVED: &[&str] = &[
    "if", "for", "while", "switch", "return", "sizeof", "catch", "else", "do",
];

const CAPTURE_LABEL: &str = "regex";

struct CompiledPattern {
    kind: PointKind,
    subtype: &'static str,
    regex: Regex,
}

lazy_static! {
    static ref PATTERN_CACHE: RwLock<HashMap<&'static str, Arc<Vec<CompiledPattern>>>> =
        RwLock::new(HashMap::new());
    static ref PREAMBLE_LINE: Regex =
        Regex::new(r#"^\s*(#!|#include\b|package\s|import\s|from\s+__future__\s|["']use strict["'])"#)
            .unwrap();
}

fn compiled_patterns(rules: &LanguageRules) -> Arc<Vec<CompiledPattern>> {
    if let Some(patterns) = PATTERN_CACHE
        .read()
        .ok()
        .and_then(|cache| cache.get(rules.id).cloned())
    {
        return patterns;
    }

    let compiled: Vec<CompiledPattern> = rules
        .fallback_patterns
        .iter()
        .filter_map(|p| match Regex::new(p.pattern) {
            Ok(regex) => Some(CompiledPattern {
                kind: p.kind,
                subtype: p.subtype,
                regex,
            }),
            Err(e) => {
                warn!(language = rules.id, "fallback pattern failed to compile: {}", e);
                None
            }
        })
        .collect();
    let compiled = Arc::new(compiled);

    match PATTERN_CACHE.write() {
        Ok(mut cache) => cache.entry(rules.id).or_insert(compiled).clone(),
        Err(_) => compiled,
    }
}

/// Points found by a regex scan.
#[derive(Debug, Clone)]
pub struct FallbackAnalysis {
    pub candidates: Vec<Candidate>,
    /// The scan stopped at the line limit.
    pub truncated: bool,
}

pub struct RegexAnalyzer<'a> {
    rules: &'a LanguageRules,
    enabled: &'a [PointKind],
}

impl<'a> RegexAnalyzer<'a> {
    pub fn new(rules: &'a LanguageRules, enabled: &'a [PointKind]) -> Self {
        Self { rules, enabled }
    }

    /// Scan `source` for points.
    pub fn analyze(&self, source: &str) -> Result<FallbackAnalysis, InstrumentError> {
        let patterns = compiled_patterns(self.rules);
        if patterns.is_empty() {
            return Err(InstrumentError::AnalysisFailed(format!(
                "no usable fallback patterns for {}",
                self.rules.id
            )));
        }

        let limits = &self.rules.limits;
        let comment_prefix = self.rules.templates.comment_prefix.as_str();
        let mut seen: HashSet<(PointKind, String, usize)> = HashSet::new();
        let mut candidates = Vec::new();
        let mut truncated = false;

        for (index, text) in source.lines().enumerate() {
            if index >= limits.max_lines_for_fallback {
                truncated = true;
                warn!(
                    language = self.rules.id,
                    limit = limits.max_lines_for_fallback,
                    "fallback scan stopped at line limit"
                );
                break;
            }
            let trimmed = text.trim_start();
            if trimmed.is_empty() || (!comment_prefix.is_empty() && trimmed.starts_with(comment_prefix)) {
                continue;
            }

            let Some((pattern, captures)) = patterns
                .iter()
                .find_map(|p| p.regex.captures(text).map(|c| (p, c)))
            else {
                continue;
            };
            if !self.enabled.contains(&pattern.kind) {
                continue;
            }
            // Without a tree an indented class header counts as an inner class.
            if pattern.kind == PointKind::ClassEnter
                && !self.rules.kinds.inner_class_scopes.is_empty()
                && trimmed.len() < text.len()
                && !text.split_whitespace().any(|word| word == "static")
            {
                debug!(line = index + 1, "fallback inner class skipped");
                continue;
            }

            let name = match captures.name("name") {
                Some(m) => m.as_str().to_string(),
                None => format!("{}_loop", pattern.subtype),
            };
            if RESERVED.contains(&name.as_str())
                || !is_valid_identifier(&name, limits.max_identifier_length)
            {
                debug!(line = index + 1, name = %name, "fallback match rejected");
                continue;
            }

            let line = index + 1;
            if !seen.insert((pattern.kind, name.clone(), line)) {
                continue;
            }
            let column = text.len() - trimmed.len() + 1;
            candidates.push(Candidate {
                id: Candidate::make_id(pattern.kind, &name, line, column),
                kind: pattern.kind,
                subtype: pattern.subtype.to_string(),
                target_name: name,
                source_node: None,
                insertion_mode: self.rules.insertion_rule(pattern.kind).mode,
                priority: PRIORITY_LOW,
                reachable: true,
                line,
                column,
                key_line: line,
                capture_label: CAPTURE_LABEL.to_string(),
            });
        }

        debug!(
            language = self.rules.id,
            points = candidates.len(),
            truncated,
            "fallback scan finished"
        );
        Ok(FallbackAnalysis {
            candidates,
            truncated,
        })
    }

    /// Insert entry checkpoints after header lines that open a block.
    ///
    /// Edits are applied back to front without validation.
    pub fn instrument(
        &self,
        source: &str,
        analysis: &FallbackAnalysis,
        import_statement: Option<&str>,
    ) -> RewriteOutcome {
        let style = IndentStyle::detect(source);
        let opener = match self.rules.block_style {
            BlockStyle::Indentation => ':',
            BlockStyle::Braces => '{',
        };
        let line_starts: Vec<usize> = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();

        let mut edits: Vec<(usize, String)> = Vec::new();
        for candidate in &analysis.candidates {
            if candidate.insertion_mode != InsertionMode::InsideStart {
                continue;
            }
            let Some(&start) = line_starts.get(candidate.line - 1) else {
                continue;
            };
            let header = &source[start..line_end(source, start)];
            if !header.trim_end().ends_with(opener) {
                debug!(id = %candidate.id, "header does not open a block, skipping");
                continue;
            }
            let body_start = next_line_start(source, start);
            if body_start >= source.len() {
                continue;
            }

            let header_indent = line_indent(source, start);
            let next_line = &source[body_start..line_end(source, body_start)];
            let next_indent = line_indent(source, body_start);
            let indent = if !next_line.trim().is_empty() && next_indent.len() > header_indent.len() {
                next_indent.to_string()
            } else {
                style.deeper(header_indent)
            };

            let Some(call) = template::render(
                &self.rules.templates,
                candidate.kind,
                &candidate.id,
                &candidate.target_name,
                candidate.line,
            ) else {
                continue;
            };
            edits.push((body_start, format!("{}\n", reindent(&call, &indent))));
        }

        let applied = edits.len();
        if applied > 0 {
            if let Some(statement) = import_statement.map(str::trim) {
                if !statement.is_empty() && !source.contains(statement) {
                    let offset = self.preamble_end(source);
                    edits.push((offset, format!("{}\n", statement)));
                }
            }
        }

        edits.sort_by(|a, b| b.0.cmp(&a.0));
        let mut output = source.to_string();
        for (offset, text) in edits {
            output.insert_str(offset, &text);
        }

        RewriteOutcome {
            source: output,
            applied,
            reverted: 0,
        }
    }

    /// Offset just past the leading shebang, comment, include or package lines.
    fn preamble_end(&self, source: &str) -> usize {
        let comment_prefix = self.rules.templates.comment_prefix.as_str();
        let mut offset = 0;
        let mut end = 0;
        for line in source.split_inclusive('\n') {
            let trimmed = line.trim_start();
            offset += line.len();
            if trimmed.trim().is_empty() {
                continue;
            }
            let is_comment = !comment_prefix.is_empty() && trimmed.starts_with(comment_prefix);
            if !is_comment && !PREAMBLE_LINE.is_match(line) {
                break;
            }
            end = offset;
        }
        end
    }
}
