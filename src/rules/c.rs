//! C instrumentation rules.

use crate::analysis::PointKind;

use super::{
    BlockStyle, FallbackPattern, LanguageRules, Limits, NodeKinds, QueryOrigin, QuerySpec,
    Templates, DEFAULT_INSERTION,
};

const LOCALS_QUERY: &str = r#"
(function_declarator
  declarator: (identifier) @local.definition.function)
"#;

const HIGHLIGHTS_QUERY: &str = r#"
(return_statement
  "return" @keyword.return)
"#;

const FUNCTION_QUERY: &str = r#"
(function_definition
  body: (compound_statement)) @function
"#;

const LOOP_QUERY: &str = r#"
(for_statement) @loop.for
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

pub(super) static FALLBACK_PATTERNS: &[FallbackPattern] = &[
    FallbackPattern {
        kind: PointKind::FunctionEnter,
        subtype: "function",
        pattern: r"^\s*(?:(?:static|inline|extern|const|unsigned|signed)\s+)*[A-Za-z_][\w]*[\s\*]+(?P<name>[A-Za-z_]\w*)\s*\([^;]*\)\s*\{?\s*$",
    },
    FallbackPattern {
        kind: PointKind::LoopStart,
        subtype: "for",
        pattern: r"^\s*for\s*\(",
    },
    FallbackPattern {
        kind: PointKind::LoopStart,
        subtype: "while",
        pattern: r"^\s*while\s*\(.*\)\s*\{?\s*$",
    },
];

pub(super) const CHECKPOINT: &str =
    r#"codegreen_checkpoint("{checkpoint_id}", "{kind}", "{name}", {line})"#;

pub(super) fn rules() -> LanguageRules {
    LanguageRules {
        id: "c",
        extensions: &["c", "h"],
        language: tree_sitter_c::LANGUAGE.into(),
        block_style: BlockStyle::Braces,
        kinds: NodeKinds {
            functions: &["function_definition"],
            closures: &[],
            classes: &[],
            inner_class_scopes: &[],
            loops: &["for_statement", "while_statement", "do_statement"],
            bodies: &["compound_statement"],
            comments: &["comment"],
            docstrings: &[],
            prologue: &[],
            terminators: &["return_statement", "break_statement", "continue_statement"],
            returns: &["return_statement"],
            conditionals: &["if_statement"],
            else_clauses: &["else_clause"],
            elif_clauses: &[],
            calls: &["call_expression", "argument_list"],
            declarators: &[
                "function_declarator",
                "pointer_declarator",
                "parenthesized_declarator",
                "array_declarator",
                "attributed_declarator",
            ],
            identifiers: &["identifier", "field_identifier"],
            statement_containers: &["compound_statement", "translation_unit", "case_statement"],
            preamble: &["comment", "preproc_include"],
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
            Some("#include \"codegreen_runtime.h\""),
            ";",
            "//",
        ),
        limits: Limits::default(),
        fallback_patterns: FALLBACK_PATTERNS,
        emit_class_exit: false,
    }
}
