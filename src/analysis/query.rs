//! Query-based point locator.
//!
//! Compiles each language's structural queries once per process and runs
//! them over a parse, grouping captures by label. A query that fails to
//! compile is logged and left out; the others still run.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use lazy_static::lazy_static;
use once_cell::sync::OnceCell;
use streaming_iterator::StreamingIterator;
use tracing::{debug, warn};
use tree_sitter::{Query, QueryCursor};

use crate::error::InstrumentError;
use crate::rules::{LanguageRules, QueryOrigin};
use crate::syntax::{NodeId, ParsedSource};

/// A query compiled for one language.
pub struct CompiledQuery {
    pub name: &'static str,
    pub origin: QueryOrigin,
    pub query: Query,
}

/// Every query of a language that compiled successfully.
pub struct QuerySet {
    pub language: &'static str,
    pub queries: Vec<CompiledQuery>,
    /// Queries that failed to compile.
    pub failures: Vec<InstrumentError>,
}

impl QuerySet {
    /// Compile the language's queries, preferring `<query_dir>/<language>/<name>.scm`
    /// over the embedded source for community queries.
    pub fn compile(rules: &LanguageRules, query_dir: Option<&Path>) -> Self {
        let mut queries = Vec::new();
        let mut failures = Vec::new();

        for spec in rules.queries {
            let external = match (spec.origin, query_dir) {
                (QueryOrigin::Community, Some(dir)) => {
                    read_external_query(dir, rules.id, spec.name)
                }
                _ => None,
            };
            let source = external.as_deref().unwrap_or(spec.source);

            match Query::new(&rules.language, source) {
                Ok(query) => queries.push(CompiledQuery {
                    name: spec.name,
                    origin: spec.origin,
                    query,
                }),
                Err(e) => {
                    let error = InstrumentError::Query {
                        name: spec.name.to_string(),
                        message: e.to_string(),
                    };
                    warn!(language = rules.id, "{}, skipping", error);
                    failures.push(error);
                }
            }
        }

        Self {
            language: rules.id,
            queries,
            failures,
        }
    }
}

fn read_external_query(dir: &Path, language: &str, name: &str) -> Option<String> {
    let path = dir.join(language).join(format!("{}.scm", name));
    if !path.is_file() {
        return None;
    }
    match std::fs::read_to_string(&path) {
        Ok(source) => {
            debug!(path = %path.display(), "using external query");
            Some(source)
        }
        Err(e) => {
            warn!(path = %path.display(), "cannot read external query: {}", e);
            None
        }
    }
}

type CacheKey = (String, Option<PathBuf>);

lazy_static! {
    /// Compiled queries per language. The map lock is only held to find or
    /// insert a cell; compilation happens inside the cell's one-time init.
    static ref QUERY_CACHE: RwLock<HashMap<CacheKey, Arc<OnceCell<Arc<QuerySet>>>>> =
        RwLock::new(HashMap::new());
}

/// Compiled queries for a language, compiling them on first use.
pub fn compiled_queries(rules: &LanguageRules, query_dir: Option<&Path>) -> Arc<QuerySet> {
    let key: CacheKey = (rules.id.to_string(), query_dir.map(Path::to_path_buf));

    let existing = QUERY_CACHE
        .read()
        .ok()
        .and_then(|cache| cache.get(&key).cloned());
    let cell = match existing {
        Some(cell) => cell,
        None => match QUERY_CACHE.write() {
            Ok(mut cache) => cache.entry(key).or_default().clone(),
            // A poisoned cache still yields a usable, uncached compile.
            Err(_) => Arc::new(OnceCell::new()),
        },
    };

    cell.get_or_init(|| {
        debug!(language = rules.id, "compiling queries");
        Arc::new(QuerySet::compile(rules, query_dir))
    })
    .clone()
}

/// One (node, label) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    pub label: String,
    pub node: NodeId,
}

/// Captures produced by a single query.
#[derive(Debug, Clone)]
pub struct QueryCaptures {
    pub query: &'static str,
    pub origin: QueryOrigin,
    /// Label → nodes, in capture-index order then document order.
    pub by_label: Vec<(String, Vec<NodeId>)>,
    pub truncated: bool,
}

impl QueryCaptures {
    /// Flatten into captures, label by label.
    pub fn captures(&self) -> impl Iterator<Item = Capture> + '_ {
        self.by_label.iter().flat_map(|(label, nodes)| {
            nodes.iter().map(move |node| Capture {
                label: label.clone(),
                node: *node,
            })
        })
    }

    pub fn len(&self) -> usize {
        self.by_label.iter().map(|(_, nodes)| nodes.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Runs a language's compiled queries against a parse.
pub struct PointLocator<'q> {
    queries: &'q QuerySet,
    max_captures: usize,
}

impl<'q> PointLocator<'q> {
    pub fn new(queries: &'q QuerySet, max_captures: usize) -> Self {
        Self {
            queries,
            max_captures,
        }
    }

    /// Run every query, in order.
    pub fn locate(&self, parsed: &ParsedSource, source: &str) -> Vec<QueryCaptures> {
        self.queries
            .queries
            .iter()
            .map(|compiled| self.run_query(compiled, parsed, source))
            .collect()
    }

    fn run_query(
        &self,
        compiled: &CompiledQuery,
        parsed: &ParsedSource,
        source: &str,
    ) -> QueryCaptures {
        let names = compiled.query.capture_names();
        let mut by_index: Vec<Vec<NodeId>> = vec![Vec::new(); names.len()];
        let mut seen: HashSet<(usize, usize, u32)> = HashSet::new();
        let mut unmapped = 0usize;

        let mut cursor = QueryCursor::new();
        let mut captures = cursor.captures(
            &compiled.query,
            parsed.tree.root_node(),
            source.as_bytes(),
        );
        while let Some((m, index)) = captures.next() {
            let capture = m.captures[*index];
            let node = capture.node;
            if !seen.insert((node.start_byte(), node.end_byte(), capture.index)) {
                continue;
            }
            match parsed.syntax.lookup(node) {
                Some(id) => by_index[capture.index as usize].push(id),
                None => unmapped += 1,
            }
        }

        if unmapped > 0 {
            warn!(
                language = self.queries.language,
                query = compiled.name,
                unmapped,
                "captures could not be mapped to the syntax snapshot"
            );
        }

        let mut remaining = self.max_captures;
        let mut truncated = false;
        let mut by_label = Vec::new();
        for (index, mut nodes) in by_index.into_iter().enumerate() {
            if nodes.is_empty() {
                continue;
            }
            if remaining == 0 {
                truncated = true;
                continue;
            }
            if nodes.len() > remaining {
                nodes.truncate(remaining);
                truncated = true;
            }
            remaining -= nodes.len();
            by_label.push((names[index].to_string(), nodes));
        }

        if truncated {
            warn!(
                language = self.queries.language,
                query = compiled.name,
                cap = self.max_captures,
                "capture limit reached, keeping earliest captures"
            );
        }

        QueryCaptures {
            query: compiled.name,
            origin: compiled.origin,
            by_label,
            truncated,
        }
    }
}
