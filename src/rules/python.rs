//! Python instrumentation rules.

use crate::analysis::PointKind;

use super::{
    BlockStyle, FallbackPattern, LanguageRules, Limits, NodeKinds, QueryOrigin, QuerySpec,
    Templates, DEFAULT_INSERTION,
};

/// Definitions in the style of nvim-treesitter's `locals.scm`.
const LOCALS_QUERY: &str = r#"
(function_definition
  name: (identifier) @local.definition.function)

(class_definition
  name: (identifier) @local.definition.type)
"#;

/// Return keywords in the style of nvim-treesitter's `highlights.scm`.
const HIGHLIGHTS_QUERY: &str = r#"
(return_statement
  "return" @keyword.return)
"#;

const FUNCTION_QUERY: &str = r#"
(function_definition
  body: (block)) @function
"#;

const CLASS_QUERY: &str = r#"
(class_definition
  body: (block)) @type.definition
"#;

const LOOP_QUERY: &str = r#"
(for_statement) @loop.for
(while_statement) @loop.while
"#;

const RETURN_QUERY: &str = r#"
(return_statement) @return
"#;

static QUERIES: &[QuerySpec] = &[
    QuerySpec {
        name: "locals",
        origin: QueryOrigin::Community,
        source: LOCALS_QUERY,
    },
    QuerySpec {
        name: "highlights",
        origin: QueryOrigin::Community,
        source: HIGHLIGHTS_QUERY,
    },
    QuerySpec {
        name: "functions",
        origin: QueryOrigin::Builtin,
        source: FUNCTION_QUERY,
    },
    QuerySpec {
        name: "classes",
        origin: QueryOrigin::Builtin,
        source: CLASS_QUERY,
    },
    QuerySpec {
        name: "loops",
        origin: QueryOrigin::Builtin,
        source: LOOP_QUERY,
    },
    QuerySpec {
        name: "returns",
        origin: QueryOrigin::Builtin,
        source: RETURN_QUERY,
    },
];

static FALLBACK_PATTERNS: &[FallbackPattern] = &[
    FallbackPattern {
        kind: PointKind::FunctionEnter,
        subtype: "function",
        pattern: r"^\s*(?:async\s+)?def\s+(?P<name>[A-Za-z_]\w*)\s*\(",
    },
    FallbackPattern {
        kind: PointKind::ClassEnter,
        subtype: "class",
        pattern: r"^\s*class\s+(?P<name>[A-Za-z_]\w*)\s*[:(]",
    },
    FallbackPattern {
        kind: PointKind::LoopStart,
        subtype: "for",
        pattern: r"^\s*(?:async\s+)?for\s+.+\s+in\s+.+:",
    },
    FallbackPattern {
        kind: PointKind::LoopStart,
        subtype: "while",
        pattern: r"^\s*while\s+.+:",
    },
];

const CHECKPOINT: &str = r#"_codegreen_rt.checkpoint("{checkpoint_id}", "{kind}", "{name}", {line})"#;

pub(super) fn rules() -> LanguageRules {
    LanguageRules {
        id: "python",
        extensions: &["py", "pyw"],
        language: tree_sitter_python::LANGUAGE.into(),
        block_style: BlockStyle::Indentation,
        kinds: NodeKinds {
            functions: &["function_definition"],
            closures: &["lambda"],
            classes: &["class_definition"],
            inner_class_scopes: &[],
            loops: &["for_statement", "while_statement"],
            bodies: &["block"],
            comments: &["comment"],
            docstrings: &["expression_statement"],
            prologue: &[],
            terminators: &[
                "return_statement",
                "raise_statement",
                "break_statement",
                "continue_statement",
            ],
            returns: &["return_statement"],
            conditionals: &["if_statement"],
            else_clauses: &["else_clause"],
            elif_clauses: &["elif_clause"],
            calls: &["call", "argument_list"],
            declarators: &[],
            identifiers: &["identifier"],
            statement_containers: &["block", "module"],
            preamble: &["comment", "future_import_statement"],
        },
        queries: QUERIES,
        insertion: DEFAULT_INSERTION,
        templates: Templates::new(
            &[
                (PointKind::FunctionEnter, CHECKPOINT),
                (PointKind::FunctionExit, CHECKPOINT),
                (PointKind::ClassEnter, CHECKPOINT),
                (PointKind::ClassExit, CHECKPOINT),
                (PointKind::LoopStart, CHECKPOINT),
                (PointKind::LoopExit, CHECKPOINT),
            ],
            Some("import codegreen_runtime as _codegreen_rt"),
            "",
            "#",
        ),
        limits: Limits::default(),
        fallback_patterns: FALLBACK_PATTERNS,
        emit_class_exit: false,
    }
}
