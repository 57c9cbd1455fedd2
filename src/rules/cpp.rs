//! C++ instrumentation rules.
//!
//! Shares templates and fallback patterns with C. Class entry is not
//! instrumented because a class body cannot hold statements.

use crate::analysis::PointKind;

use super::c::{CHECKPOINT, FALLBACK_PATTERNS};
use super::{
    BlockStyle, LanguageRules, Limits, NodeKinds, QueryOrigin, QuerySpec, Templates,
    DEFAULT_INSERTION,
};

const LOCALS_QUERY: &str = r#"
(function_declarator
  declarator: (identifier) @local.definition.function)

(function_declarator
  declarator: (field_identifier) @local.definition.method)

(function_declarator
  declarator: (qualified_identifier
    name: (identifier) @local.definition.method))
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
(for_range_loop) @loop.for
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

pub(super) fn rules() -> LanguageRules {
    LanguageRules {
        id: "cpp",
        extensions: &["cc", "cpp", "cxx", "hh", "hpp", "hxx"],
        language: tree_sitter_cpp::LANGUAGE.into(),
        block_style: BlockStyle::Braces,
        kinds: NodeKinds {
            functions: &["function_definition"],
            closures: &["lambda_expression"],
            classes: &["class_specifier", "struct_specifier"],
            inner_class_scopes: &[],
            loops: &[
                "for_statement",
                "for_range_loop",
                "while_statement",
                "do_statement",
            ],
            bodies: &["compound_statement", "field_declaration_list"],
            comments: &["comment"],
            docstrings: &[],
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
            calls: &["call_expression", "argument_list"],
            declarators: &[
                "function_declarator",
                "pointer_declarator",
                "reference_declarator",
                "parenthesized_declarator",
                "array_declarator",
                "attributed_declarator",
                "qualified_identifier",
            ],
            identifiers: &["identifier", "field_identifier"],
            statement_containers: &[
                "compound_statement",
                "translation_unit",
                "case_statement",
                "declaration_list",
            ],
            preamble: &["comment", "preproc_include", "using_declaration"],
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
