//! Per-language instrumentation rules.
//!
//! Each supported language contributes one [`LanguageRules`] value: the
//! grammar, the structural queries, the node-type tables the classifier and
//! resolver consult, the checkpoint templates and the processing limits.
//! Behavior differences between languages live in these tables rather than
//! in per-language code paths.
//!
//! # Adding a New Language
//!
//! Add a module with a `rules()` constructor, register a `OnceCell` for it
//! below and map its extensions in [`EXTENSIONS`].

mod c;
mod cpp;
mod java;
mod javascript;
mod python;

use std::collections::BTreeMap;
use std::path::Path;

use once_cell::sync::{Lazy, OnceCell};
use phf::phf_map;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tree_sitter::Language;

use crate::analysis::{InsertionMode, PointKind};

/// How a language delimits statement blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStyle {
    /// `{ ... }` blocks; a statement may be wrapped in braces.
    Braces,
    /// Significant indentation; a statement may be split onto its own line.
    Indentation,
}

/// Where a query comes from, which determines the priority of its captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryOrigin {
    /// nvim-treesitter style `locals`/`highlights` query.
    Community,
    /// Query maintained alongside these rules.
    Builtin,
}

/// A named structural query.
#[derive(Debug, Clone, Copy)]
pub struct QuerySpec {
    pub name: &'static str,
    pub origin: QueryOrigin,
    pub source: &'static str,
}

/// What a capture label turns into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRule {
    pub kind: PointKind,
    pub subtype: &'static str,
    pub mode: InsertionMode,
    pub priority: u32,
}

/// Capture priorities.
pub const PRIORITY_HIGH: u32 = 1;
pub const PRIORITY_MEDIUM: u32 = 2;
/// Points found by the regex fallback.
pub const PRIORITY_LOW: u32 = 3;

/// Capture label → point kind, shared by every language.
pub static CAPTURE_MAP: phf::Map<&'static str, CaptureRule> = phf_map! {
    "local.definition.function" => CaptureRule {
        kind: PointKind::FunctionEnter,
        subtype: "function",
        mode: InsertionMode::InsideStart,
        priority: PRIORITY_HIGH,
    },
    "local.definition.method" => CaptureRule {
        kind: PointKind::FunctionEnter,
        subtype: "method",
        mode: InsertionMode::InsideStart,
        priority: PRIORITY_HIGH,
    },
    "local.definition.type" => CaptureRule {
        kind: PointKind::ClassEnter,
        subtype: "class",
        mode: InsertionMode::InsideStart,
        priority: PRIORITY_HIGH,
    },
    "keyword.return" => CaptureRule {
        kind: PointKind::FunctionExit,
        subtype: "return",
        mode: InsertionMode::Before,
        priority: PRIORITY_HIGH,
    },
    "function" => CaptureRule {
        kind: PointKind::FunctionEnter,
        subtype: "function",
        mode: InsertionMode::InsideStart,
        priority: PRIORITY_MEDIUM,
    },
    "function.method" => CaptureRule {
        kind: PointKind::FunctionEnter,
        subtype: "method",
        mode: InsertionMode::InsideStart,
        priority: PRIORITY_MEDIUM,
    },
    "type.definition" => CaptureRule {
        kind: PointKind::ClassEnter,
        subtype: "class",
        mode: InsertionMode::InsideStart,
        priority: PRIORITY_MEDIUM,
    },
    "return" => CaptureRule {
        kind: PointKind::FunctionExit,
        subtype: "return",
        mode: InsertionMode::Before,
        priority: PRIORITY_MEDIUM,
    },
    "loop.for" => CaptureRule {
        kind: PointKind::LoopStart,
        subtype: "for",
        mode: InsertionMode::Before,
        priority: PRIORITY_MEDIUM,
    },
    "loop.while" => CaptureRule {
        kind: PointKind::LoopStart,
        subtype: "while",
        mode: InsertionMode::Before,
        priority: PRIORITY_MEDIUM,
    },
    "loop.do" => CaptureRule {
        kind: PointKind::LoopStart,
        subtype: "do",
        mode: InsertionMode::Before,
        priority: PRIORITY_MEDIUM,
    },
};

/// How a point kind is placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertionRule {
    pub mode: InsertionMode,
    pub skip_docstrings: bool,
    pub skip_comments: bool,
}

/// Placement shared by all languages, keyed by point kind.
pub static DEFAULT_INSERTION: &[(PointKind, InsertionRule)] = &[
    (
        PointKind::FunctionEnter,
        InsertionRule {
            mode: InsertionMode::InsideStart,
            skip_docstrings: true,
            skip_comments: true,
        },
    ),
    (
        PointKind::FunctionExit,
        InsertionRule {
            mode: InsertionMode::InsideEnd,
            skip_docstrings: false,
            skip_comments: true,
        },
    ),
    (
        PointKind::ClassEnter,
        InsertionRule {
            mode: InsertionMode::InsideStart,
            skip_docstrings: true,
            skip_comments: true,
        },
    ),
    (
        PointKind::ClassExit,
        InsertionRule {
            mode: InsertionMode::InsideEnd,
            skip_docstrings: false,
            skip_comments: true,
        },
    ),
    (
        PointKind::LoopStart,
        InsertionRule {
            mode: InsertionMode::Before,
            skip_docstrings: false,
            skip_comments: false,
        },
    ),
    (
        PointKind::LoopExit,
        InsertionRule {
            mode: InsertionMode::After,
            skip_docstrings: false,
            skip_comments: false,
        },
    ),
    (
        PointKind::Import,
        InsertionRule {
            mode: InsertionMode::Before,
            skip_docstrings: true,
            skip_comments: true,
        },
    ),
];

/// Node-type names for the constructs the analysis understands.
#[derive(Debug, Clone, Copy)]
pub struct NodeKinds {
    /// Named function and method definitions.
    pub functions: &'static [&'static str],
    /// Anonymous functions; returns inside them are not attributed outward.
    pub closures: &'static [&'static str],
    pub classes: &'static [&'static str],
    /// Parents that make a class an inner class. Class points on an inner
    /// class are skipped unless its `modifiers` include `static`.
    pub inner_class_scopes: &'static [&'static str],
    pub loops: &'static [&'static str],
    pub bodies: &'static [&'static str],
    pub comments: &'static [&'static str],
    /// Statement kinds that hold a docstring or directive when they wrap a lone string.
    pub docstrings: &'static [&'static str],
    /// Statements that must stay first in a body.
    pub prologue: &'static [&'static str],
    /// Statements after which control never falls through.
    pub terminators: &'static [&'static str],
    pub returns: &'static [&'static str],
    pub conditionals: &'static [&'static str],
    pub else_clauses: &'static [&'static str],
    pub elif_clauses: &'static [&'static str],
    pub calls: &'static [&'static str],
    pub declarators: &'static [&'static str],
    pub identifiers: &'static [&'static str],
    /// Nodes whose children are free-standing statements.
    pub statement_containers: &'static [&'static str],
    /// Top-level nodes the runtime import goes after.
    pub preamble: &'static [&'static str],
}

/// Numeric processing limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub max_captures_per_query: usize,
    pub max_file_size_bytes: u64,
    pub max_identifier_length: usize,
    pub parser_timeout_ms: u64,
    pub max_lines_for_fallback: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_captures_per_query: 1000,
            max_file_size_bytes: 100 * 1024 * 1024,
            max_identifier_length: 50,
            parser_timeout_ms: 30_000,
            max_lines_for_fallback: 50_000,
        }
    }
}

/// Checkpoint code templates for one language.
///
/// Templates use the `{checkpoint_id}`, `{kind}`, `{name}` and `{line}`
/// placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Templates {
    pub checkpoints: BTreeMap<PointKind, String>,
    pub import_statement: Option<String>,
    pub statement_terminator: String,
    pub comment_prefix: String,
}

impl Templates {
    fn new(
        entries: &[(PointKind, &str)],
        import_statement: Option<&str>,
        statement_terminator: &str,
        comment_prefix: &str,
    ) -> Self {
        Self {
            checkpoints: entries
                .iter()
                .map(|(kind, t)| (*kind, t.to_string()))
                .collect(),
            import_statement: import_statement.map(str::to_string),
            statement_terminator: statement_terminator.to_string(),
            comment_prefix: comment_prefix.to_string(),
        }
    }

    pub fn get(&self, kind: PointKind) -> Option<&str> {
        self.checkpoints.get(&kind).map(String::as_str)
    }
}

/// A line-oriented pattern used when no syntax tree is available.
///
/// A `name` capture group supplies the target name; loops without one are
/// named after their subtype.
#[derive(Debug, Clone, Copy)]
pub struct FallbackPattern {
    pub kind: PointKind,
    pub subtype: &'static str,
    pub pattern: &'static str,
}

/// Everything the pipeline needs to know about one language.
#[derive(Clone)]
pub struct LanguageRules {
    pub id: &'static str,
    pub extensions: &'static [&'static str],
    pub language: Language,
    pub block_style: BlockStyle,
    pub kinds: NodeKinds,
    pub queries: &'static [QuerySpec],
    pub insertion: &'static [(PointKind, InsertionRule)],
    pub templates: Templates,
    pub limits: Limits,
    pub fallback_patterns: &'static [FallbackPattern],
    pub emit_class_exit: bool,
}

impl LanguageRules {
    pub fn capture_rule(&self, label: &str) -> Option<&'static CaptureRule> {
        CAPTURE_MAP.get(label)
    }

    pub fn insertion_rule(&self, kind: PointKind) -> InsertionRule {
        self.insertion
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, rule)| *rule)
            .unwrap_or(InsertionRule {
                mode: InsertionMode::Before,
                skip_docstrings: false,
                skip_comments: false,
            })
    }
}

impl std::fmt::Debug for LanguageRules {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanguageRules")
            .field("id", &self.id)
            .field("extensions", &self.extensions)
            .field("block_style", &self.block_style)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

/// Language ids in alphabetical order.
pub const SUPPORTED_LANGUAGES: &[&str] = &["c", "cpp", "java", "javascript", "python"];

/// File extension → language id.
static EXTENSIONS: phf::Map<&'static str, &'static str> = phf_map! {
    "c" => "c",
    "h" => "c",
    "cc" => "cpp",
    "cpp" => "cpp",
    "cxx" => "cpp",
    "hh" => "cpp",
    "hpp" => "cpp",
    "hxx" => "cpp",
    "java" => "java",
    "js" => "javascript",
    "mjs" => "javascript",
    "cjs" => "javascript",
    "jsx" => "javascript",
    "py" => "python",
    "pyw" => "python",
};

static C_RULES: OnceCell<LanguageRules> = OnceCell::new();
static CPP_RULES: OnceCell<LanguageRules> = OnceCell::new();
static JAVA_RULES: OnceCell<LanguageRules> = OnceCell::new();
static JAVASCRIPT_RULES: OnceCell<LanguageRules> = OnceCell::new();
static PYTHON_RULES: OnceCell<LanguageRules> = OnceCell::new();

/// Built-in rules for a language id, before configuration overrides.
pub fn base_rules(id: &str) -> Option<&'static LanguageRules> {
    match id {
        "c" => Some(C_RULES.get_or_init(c::rules)),
        "cpp" => Some(CPP_RULES.get_or_init(cpp::rules)),
        "java" => Some(JAVA_RULES.get_or_init(java::rules)),
        "javascript" => Some(JAVASCRIPT_RULES.get_or_init(javascript::rules)),
        "python" => Some(PYTHON_RULES.get_or_init(python::rules)),
        _ => None,
    }
}

/// Language id for a file extension (without the dot).
pub fn language_for_extension(ext: &str) -> Option<&'static str> {
    EXTENSIONS.get(ext.to_ascii_lowercase().as_str()).copied()
}

/// Content heuristics, tried in order when the extension is unknown.
static CONTENT_HINTS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"\A#!.*\bpython[0-9.]*\b", "python"),
        (r"\A#!.*\bnode\b", "javascript"),
        (r"(?m)^\s*package\s+[\w.]+\s*;", "java"),
        (r"(?m)^\s*(namespace\s+\w+|template\s*<|#include\s*<(iostream|vector|string)>)", "cpp"),
        (r#"(?m)^\s*#include\s*[<"]"#, "c"),
        (r"(?m)^\s*public\s+(final\s+)?class\s+\w+", "java"),
        (r#"(?m)^\s*(import\s+.+\s+from\s+['"]|const\s+\w+\s*=\s*require\()"#, "javascript"),
        (r"(?m)^\s*(def\s+\w+\s*\(.*\)\s*:|from\s+[\w.]+\s+import\s)", "python"),
    ]
    .into_iter()
    .filter_map(|(pattern, lang)| Regex::new(pattern).ok().map(|re| (re, lang)))
    .collect()
});

/// Detect the language of a file from its extension, then from its content.
pub fn detect_language(path: &Path, content: &str) -> Option<&'static str> {
    if let Some(lang) = path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(language_for_extension)
    {
        return Some(lang);
    }

    CONTENT_HINTS
        .iter()
        .find(|(re, _)| re.is_match(content))
        .map(|(_, lang)| *lang)
}
