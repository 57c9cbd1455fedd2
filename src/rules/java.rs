//! Java instrumentation rules.
//!
//! Class entry and exit are emitted as `static { ... }` initializer blocks
//! since a class body only holds member declarations.

use crate::analysis::PointKind;

use super::{
    BlockStyle, FallbackPattern, LanguageRules, Limits, NodeKinds, QueryOrigin, QuerySpec,
    Templates, DEFAULT_INSERTION,
};

const LOCALS_QUERY: &str = r#"
(method_declaration
  name: (identifier) @local.definition.method)

(constructor_declaration
  name: (identifier) @local.definition.method)

(class_declaration
  name: (identifier) @local.definition.type)
"#;

const HIGHLIGHTS_QUERY: &str = r#"
(return_statement
  "return" @keyword.return)
"#;

const FUNCTION_QUERY: &str = r#"
(method_declaration
  body: (block)) @function.method

(constructor_declaration
  body: (constructor_body)) @function.method
"#;

const CLASS_QUERY: &str = r#"
(class_declaration
  body: (class_body)) @type.definition
"#;

const LOOP_QUERY: &str = r#"
(for_statement) @loop.for
(enhanced_for_statement) @loop.for
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
        subtype: "method",
        pattern: r"^\s*(?:(?:public|private|protected|static|final|synchronized|abstract|native)\s+)*[\w<>\[\],\s]+\s+(?P<name>[A-Za-z_]\w*)\s*\([^;]*\)\s*(?:throws\s+[\w.,\s]+)?\{\s*$",
    },
    FallbackPattern {
        kind: PointKind::ClassEnter,
        subtype: "class",
        pattern: r"^\s*(?:(?:public|private|protected|static|final|abstract)\s+)*class\s+(?P<name>[A-Za-z_]\w*)",
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

const CHECKPOINT: &str =
    r#"CodeGreenRuntime.checkpoint("{checkpoint_id}", "{kind}", "{name}", {line})"#;

const STATIC_BLOCK: &str =
    r#"static { CodeGreenRuntime.checkpoint("{checkpoint_id}", "{kind}", "{name}", {line}); }"#;

pub(super) fn rules() -> LanguageRules {
    LanguageRules {
        id: "java",
        extensions: &["java"],
        language: tree_sitter_java::LANGUAGE.into(),
        block_style: BlockStyle::Braces,
        kinds: NodeKinds {
            functions: &["method_declaration", "constructor_declaration"],
            closures: &["lambda_expression"],
            classes: &["class_declaration"],
            inner_class_scopes: &["class_body", "block", "constructor_body"],
            loops: &[
                "for_statement",
                "enhanced_for_statement",
                "while_statement",
                "do_statement",
            ],
            bodies: &["block", "constructor_body", "class_body"],
            comments: &["line_comment", "block_comment"],
            docstrings: &[],
            prologue: &["explicit_constructor_invocation"],
            terminators: &[
                "return_statement",
                "throw_statement",
                "break_statement",
                "continue_statement",
            ],
            returns: &["return_statement"],
            conditionals: &["if_statement"],
            else_clauses: &[],
            elif_clauses: &[],
            calls: &["method_invocation", "argument_list"],
            declarators: &[],
            identifiers: &["identifier"],
            statement_containers: &[
                "block",
                "constructor_body",
                "switch_block_statement_group",
                "program",
            ],
            preamble: &[
                "line_comment",
                "block_comment",
                "package_declaration",
                "import_declaration",
            ],
        },
        queries: QUERIES,
        insertion: DEFAULT_INSERTION,
        templates: Templates::new(
            &[
                (PointKind::FunctionEnter, CHECKPOINT),
                (PointKind::FunctionExit, CHECKPOINT),
                (PointKind::ClassEnter, STATIC_BLOCK),
                (PointKind::ClassExit, STATIC_BLOCK),
                (PointKind::LoopStart, CHECKPOINT),
                (PointKind::LoopExit, CHECKPOINT),
            ],
            Some("import io.codegreen.runtime.CodeGreenRuntime;"),
            ";",
            "//",
        ),
        limits: Limits::default(),
        fallback_patterns: FALLBACK_PATTERNS,
        emit_class_exit: false,
    }
}
