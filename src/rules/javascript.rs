//! JavaScript instrumentation rules.

use crate::analysis::PointKind;

use super::{
    BlockStyle, FallbackPattern, LanguageRules, Limits, NodeKinds, QueryOrigin, QuerySpec,
    Templates, DEFAULT_INSERTION,
};

const LOCALS_QUERY: &str = r#"
(function_declaration
  name: (identifier) @local.definition.function)

(generator_function_declaration
  name: (identifier) @local.definition.function)

(method_definition
  name: (property_identifier) @local.definition.method)
"#;

const HIGHLIGHTS_QUERY: &str = r#"
(return_statement
  "return" @keyword.return)
"#;

const FUNCTION_QUERY: &str = r#"
(function_declaration
  body: (statement_block)) @function

(generator_function_declaration
  body: (statement_block)) @function

(method_definition
  body: (statement_block)) @function.method
"#;

const LOOP_QUERY: &str = r#"
(for_statement) @loop.for
(for_in_statement) @loop.for
(while_statement) @loop.while
(do_statement) @loop.do
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
        pattern: r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*(?P<name>[A-Za-z_]\w*)\s*\(",
    },
    FallbackPattern {
        kind: PointKind::LoopStart,
        subtype: "for",
        pattern: r"^\s*for\s*(?:await\s*)?\(",
    },
    FallbackPattern {
        kind: PointKind::LoopStart,
        subtype: "while",
        pattern: r"^\s*while\s*\(.*\)\s*\{?\s*$",
    },
];

const CHECKPOINT: &str =
    r#"__codegreen.checkpoint("{checkpoint_id}", "{kind}", "{name}", {line})"#;

pub(super) fn rules() -> LanguageRules {
    LanguageRules {
        id: "javascript",
        extensions: &["cjs", "js", "jsx", "mjs"],
        language: tree_sitter_javascript::LANGUAGE.into(),
        block_style: BlockStyle::Braces,
        kinds: NodeKinds {
            functions: &[
                "function_declaration",
                "generator_function_declaration",
                "method_definition",
            ],
            closures: &[
                "arrow_function",
                "function_expression",
                "function",
                "generator_function",
            ],
            classes: &["class_declaration", "class"],
            inner_class_scopes: &[],
            loops: &[
                "for_statement",
                "for_in_statement",
                "while_statement",
                "do_statement",
            ],
            bodies: &["statement_block", "class_body"],
            comments: &["comment"],
            docstrings: &["expression_statement"],
            prologue: &[],
            terminators: &[
                "return_statement",
                "throw_statement",
                "break_statement",
                "continue_statement",
            ],
            returns: &["return_statement"],
            conditionals: &["if_statement"],
            else_clauses: &["else_clause"],
            elif_clauses: &[],
            calls: &["call_expression", "arguments"],
            declarators: &[],
            identifiers: &["identifier", "property_identifier"],
            statement_containers: &["statement_block", "program", "switch_case", "switch_default"],
            preamble: &["comment", "hash_bang_line", "import_statement"],
        },
        queries: QUERIES,
        insertion: DEFAULT_INSERTION,
        templates: Templates::new(
            &[
                (PointKind::FunctionEnter, CHECKPOINT),
                (PointKind::FunctionExit, CHECKPOINT),
                (PointKind::LoopStart, CHECKPOINT),
                (PointKind::LoopExit, CHECKPOINT),
            ],
            Some("const __codegreen = require(\"codegreen-runtime\");"),
            ";",
            "//",
        ),
        limits: Limits::default(),
        fallback_patterns: FALLBACK_PATTERNS,
        emit_class_exit: false,
    }
}
