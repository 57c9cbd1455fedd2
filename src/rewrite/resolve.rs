//! Insertion offset resolution.
//!
//! Turns a candidate into a concrete edit: the byte offset, the fully
//! indented text to splice in, and its shape. Offsets always refer to the
//! original source; the rewriter applies edits back to front so they stay
//! valid.

use tracing::debug;

use super::indent::{reindent, IndentStyle};
use super::template;
use crate::analysis::classify::body_of;
use crate::analysis::{Candidate, InsertionMode, PointKind};
use crate::rules::{BlockStyle, LanguageRules};
use crate::syntax::text::{ends_with_newline, line_after, line_end, line_indent, line_start, starts_line};
use crate::syntax::{NodeId, SyntaxTree};

/// Literal kinds a docstring or directive statement may consist of.
const STRING_KINDS: &[&str] = &["string", "concatenated_string"];

/// Id carried by the runtime import edit.
pub const IMPORT_EDIT_ID: &str = "import";

/// A text edit ready for the rewriter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEdit {
    pub byte_offset: usize,
    pub insertion_text: String,
    pub edit_shape: InsertionMode,
    pub originating_candidate_id: String,
    /// End of the statement to wrap in `{ ... }`, for brace-less bodies.
    pub node_end_byte: Option<usize>,
    pub kind: PointKind,
    pub priority: u32,
    /// Start of the construct the edit belongs to.
    pub anchor_start: usize,
}

impl ResolvedEdit {
    /// Whether the edit closes a construct.
    pub fn is_closing(&self) -> bool {
        matches!(
            self.edit_shape,
            InsertionMode::InsideEnd | InsertionMode::After
        )
    }

    /// Whether the edit wraps a statement instead of inserting before it.
    pub fn wraps(&self) -> bool {
        self.edit_shape == InsertionMode::ImmediatelyBefore && self.node_end_byte.is_some()
    }
}

struct Placement {
    offset: usize,
    text: String,
    shape: InsertionMode,
    node_end: Option<usize>,
}

impl Placement {
    fn insert(offset: usize, text: String, shape: InsertionMode) -> Self {
        Self {
            offset,
            text,
            shape,
            node_end: None,
        }
    }
}

/// Resolves candidates of one parse into edits.
pub struct OffsetResolver<'a> {
    rules: &'a LanguageRules,
    syntax: &'a SyntaxTree,
    source: &'a str,
    style: IndentStyle,
}

impl<'a> OffsetResolver<'a> {
    pub fn new(rules: &'a LanguageRules, syntax: &'a SyntaxTree, source: &'a str) -> Self {
        Self {
            rules,
            syntax,
            source,
            style: IndentStyle::detect(source),
        }
    }

    pub fn style(&self) -> IndentStyle {
        self.style
    }

    /// Resolve one candidate. `None` means the point has no safe placement
    /// or no template; such points are skipped.
    pub fn resolve(&self, candidate: &Candidate) -> Option<ResolvedEdit> {
        let node = candidate.source_node?;
        let call = template::render(
            &self.rules.templates,
            candidate.kind,
            &candidate.id,
            &candidate.target_name,
            candidate.line,
        )?;

        let placement = match candidate.insertion_mode {
            InsertionMode::InsideStart => self.inside_start(node, candidate.kind, &call),
            InsertionMode::InsideEnd => self.inside_end(node, &call),
            InsertionMode::Before | InsertionMode::ImmediatelyBefore => self.before(node, &call),
            InsertionMode::After => self.after(node, &call),
        };
        let Some(placement) = placement else {
            debug!(
                id = %candidate.id,
                mode = %candidate.insertion_mode,
                "no safe insertion point, skipping"
            );
            return None;
        };

        Some(ResolvedEdit {
            byte_offset: placement.offset.min(self.source.len()),
            insertion_text: placement.text,
            edit_shape: placement.shape,
            originating_candidate_id: candidate.id.clone(),
            node_end_byte: placement.node_end,
            kind: candidate.kind,
            priority: candidate.priority,
            anchor_start: self.syntax.node(node).start_byte,
        })
    }

    /// Edit inserting the runtime import after the file preamble, unless the
    /// statement is already present.
    pub fn resolve_import(&self, statement: &str) -> Option<ResolvedEdit> {
        let statement = statement.trim();
        if statement.is_empty() || self.source.contains(statement) {
            return None;
        }

        let root = self.syntax.root();
        let last_preamble = self
            .syntax
            .named_children(root)
            .take_while(|child| {
                self.rules.kinds.preamble.contains(&self.syntax.kind(*child))
                    || self.is_docstring(*child)
            })
            .last();

        let offset = last_preamble
            .map(|n| line_after(self.source, self.syntax.node(n).end_byte))
            .unwrap_or(0);
        Some(ResolvedEdit {
            byte_offset: offset,
            insertion_text: format!("{}{}\n", self.eof_prefix(offset), statement),
            edit_shape: InsertionMode::Before,
            originating_candidate_id: IMPORT_EDIT_ID.to_string(),
            node_end_byte: None,
            kind: PointKind::Import,
            priority: 0,
            anchor_start: offset,
        })
    }

    fn inside_start(&self, definition: NodeId, kind: PointKind, call: &str) -> Option<Placement> {
        let body = body_of(self.syntax, &self.rules.kinds, definition)?;
        let rule = self.rules.insertion_rule(kind);
        let kinds = &self.rules.kinds;

        let mut skipped = None;
        let mut first = None;
        for child in self.syntax.named_children(body) {
            let child_kind = self.syntax.kind(child);
            let skip = (rule.skip_comments && kinds.comments.contains(&child_kind))
                || (rule.skip_docstrings && self.is_docstring(child))
                || kinds.prologue.contains(&child_kind);
            if !skip {
                first = Some(child);
                break;
            }
            skipped = Some(child);
        }

        let header_indent = line_indent(self.source, self.syntax.node(definition).start_byte);
        let body_indent = self.style.deeper(header_indent);

        if let Some(statement) = first {
            let start = self.syntax.node(statement).start_byte;
            if starts_line(self.source, start) {
                let indent = line_indent(self.source, start);
                return Some(Placement::insert(
                    line_start(self.source, start),
                    format!("{}\n", reindent(call, indent)),
                    InsertionMode::InsideStart,
                ));
            }
            // The statement shares its line with the header or brace.
            let text = match self.rules.block_style {
                BlockStyle::Indentation => format!(
                    "\n{}\n{}",
                    reindent(call, &body_indent),
                    body_indent
                ),
                BlockStyle::Braces => format!("{} ", call),
            };
            return Some(Placement::insert(start, text, InsertionMode::InsideStart));
        }

        match self.rules.block_style {
            BlockStyle::Braces => {
                let body_start = self.syntax.node(body).start_byte;
                let after = match skipped {
                    Some(node) => self.syntax.node(node).end_byte,
                    None if self.source.as_bytes().get(body_start) == Some(&b'{') => body_start + 1,
                    None => return None,
                };

                let eol = line_end(self.source, after);
                if self.source[after..eol].trim().is_empty() && eol < self.source.len() {
                    let indent = match skipped {
                        Some(node) if self.node_starts_line(node) => {
                            line_indent(self.source, self.syntax.node(node).start_byte).to_string()
                        }
                        _ => body_indent,
                    };
                    Some(Placement::insert(
                        line_after(self.source, after),
                        format!("{}\n", reindent(call, &indent)),
                        InsertionMode::InsideStart,
                    ))
                } else {
                    // Keep a space before a closing brace that follows directly.
                    let gap = match self.source.as_bytes().get(after) {
                        Some(b) if !b.is_ascii_whitespace() => " ",
                        _ => "",
                    };
                    Some(Placement::insert(
                        after,
                        format!(" {}{}", call, gap),
                        InsertionMode::InsideStart,
                    ))
                }
            }
            BlockStyle::Indentation => {
                // Only a docstring or comments: go right after them.
                let skipped = skipped?;
                if !self.node_starts_line(skipped) {
                    return None;
                }
                let node = self.syntax.node(skipped);
                let indent = line_indent(self.source, node.start_byte);
                let offset = line_after(self.source, node.end_byte);
                Some(Placement::insert(
                    offset,
                    format!("{}{}\n", self.eof_prefix(offset), reindent(call, indent)),
                    InsertionMode::InsideStart,
                ))
            }
        }
    }

    fn inside_end(&self, definition: NodeId, call: &str) -> Option<Placement> {
        let body = body_of(self.syntax, &self.rules.kinds, definition)?;
        let body_node = self.syntax.node(body);

        match self.rules.block_style {
            BlockStyle::Braces => {
                let close = body_node.end_byte.checked_sub(1)?;
                if self.source.as_bytes().get(close) != Some(&b'}') {
                    return None;
                }
                if !starts_line(self.source, close) {
                    return Some(Placement::insert(
                        close,
                        format!("{} ", call),
                        InsertionMode::InsideEnd,
                    ));
                }

                let indent = self
                    .last_statement(body)
                    .filter(|s| self.node_starts_line(*s))
                    .map(|s| line_indent(self.source, self.syntax.node(s).start_byte).to_string())
                    .unwrap_or_else(|| self.style.deeper(line_indent(self.source, close)));
                Some(Placement::insert(
                    line_start(self.source, close),
                    format!("{}\n", reindent(call, &indent)),
                    InsertionMode::InsideEnd,
                ))
            }
            BlockStyle::Indentation => {
                if !starts_line(self.source, body_node.start_byte) {
                    return None;
                }
                let last = self.last_statement(body)?;
                let offset = line_after(self.source, self.syntax.node(last).end_byte);
                let indent = line_indent(self.source, body_node.start_byte);
                Some(Placement::insert(
                    offset,
                    format!("{}{}\n", self.eof_prefix(offset), reindent(call, indent)),
                    InsertionMode::InsideEnd,
                ))
            }
        }
    }

    fn before(&self, node: NodeId, call: &str) -> Option<Placement> {
        let target = self.syntax.node(node);
        let embedded = self.is_embedded(node);

        if !embedded && self.node_starts_line(node) {
            let indent = line_indent(self.source, target.start_byte);
            return Some(Placement::insert(
                line_start(self.source, target.start_byte),
                format!("{}\n", reindent(call, indent)),
                InsertionMode::Before,
            ));
        }
        if embedded && self.rules.kinds.loops.contains(&target.kind) {
            return None;
        }

        match self.rules.block_style {
            BlockStyle::Braces if embedded => Some(Placement {
                offset: target.start_byte,
                text: call.to_string(),
                shape: InsertionMode::ImmediatelyBefore,
                node_end: Some(target.end_byte),
            }),
            BlockStyle::Braces => Some(Placement::insert(
                target.start_byte,
                format!("{} ", call),
                InsertionMode::ImmediatelyBefore,
            )),
            BlockStyle::Indentation => {
                let mut indent = line_indent(self.source, target.start_byte).to_string();
                if target.parent.is_some_and(|p| self.is_inline_suite(p)) {
                    indent = self.style.deeper(&indent);
                }
                Some(Placement::insert(
                    target.start_byte,
                    format!("\n{}\n{}", reindent(call, &indent), indent),
                    InsertionMode::ImmediatelyBefore,
                ))
            }
        }
    }

    fn after(&self, node: NodeId, call: &str) -> Option<Placement> {
        if self.is_embedded(node) {
            return None;
        }
        let target = self.syntax.node(node);
        if self.rules.block_style == BlockStyle::Braces {
            // Code after the node on its line may close the enclosing block.
            let eol = line_end(self.source, target.end_byte);
            if !self.source[target.end_byte..eol].trim().is_empty() {
                return Some(Placement::insert(
                    target.end_byte,
                    format!(" {}", call),
                    InsertionMode::After,
                ));
            }
        }
        let offset = line_after(self.source, target.end_byte);
        let indent = line_indent(self.source, target.start_byte);
        Some(Placement::insert(
            offset,
            format!("{}{}\n", self.eof_prefix(offset), reindent(call, indent)),
            InsertionMode::After,
        ))
    }

    /// A statement that is the direct body of a control statement rather
    /// than a member of a block.
    fn is_embedded(&self, node: NodeId) -> bool {
        let kinds = &self.rules.kinds;
        self.syntax.parent(node).is_some_and(|parent| {
            let kind = self.syntax.kind(parent);
            !kinds.statement_containers.contains(&kind) && !kinds.bodies.contains(&kind)
        })
    }

    /// A block that continues on its header's line, like `if x: return`.
    fn is_inline_suite(&self, block: NodeId) -> bool {
        self.rules.kinds.bodies.contains(&self.syntax.kind(block))
            && !self.node_starts_line(block)
    }

    fn is_docstring(&self, node: NodeId) -> bool {
        if !self.rules.kinds.docstrings.contains(&self.syntax.kind(node)) {
            return false;
        }
        let mut children = self.syntax.named_children(node).peekable();
        children.peek().is_some()
            && children.all(|c| STRING_KINDS.contains(&self.syntax.kind(c)))
    }

    fn last_statement(&self, body: NodeId) -> Option<NodeId> {
        self.syntax.named_children(body).rev().find(|child| {
            let child = self.syntax.node(*child);
            !child.extra && !self.rules.kinds.comments.contains(&child.kind)
        })
    }

    fn node_starts_line(&self, node: NodeId) -> bool {
        starts_line(self.source, self.syntax.node(node).start_byte)
    }

    /// A newline to prepend when inserting at the end of a file that lacks one.
    fn eof_prefix(&self, offset: usize) -> &'static str {
        if offset >= self.source.len() && !ends_with_newline(self.source) {
            "\n"
        } else {
            ""
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{deduplicate, retain_reachable, Classifier, PointLocator};
    use crate::analysis::query::compiled_queries;
    use crate::rules;
    use crate::syntax::{new_parser, parse_source};

    /// Resolve every surviving candidate of `source`, in source order.
    fn resolve(lang: &str, source: &str) -> Vec<ResolvedEdit> {
        let rules = rules::base_rules(lang).unwrap();
        let mut parser = new_parser(&rules.language, 0).unwrap();
        let parsed = parse_source(&mut parser, source, 0).unwrap();
        let set = compiled_queries(rules, None);
        let classifier = Classifier::new(rules, &parsed.syntax, source, PointKind::all());

        let mut candidates: Vec<_> = PointLocator::new(&set, 1000)
            .locate(&parsed, source)
            .iter()
            .flat_map(|c| classifier.classify_all(c))
            .collect();
        retain_reachable(&mut candidates);
        let resolver = OffsetResolver::new(rules, &parsed.syntax, source);
        deduplicate(candidates)
            .iter()
            .filter_map(|c| resolver.resolve(c))
            .collect()
    }

    fn edit(edits: &[ResolvedEdit], kind: PointKind) -> &ResolvedEdit {
        edits.iter().find(|e| e.kind == kind).unwrap()
    }

    #[test]
    fn test_python_function_enter_and_exit() {
        let source = "def hello():\n    print(\"hi\")\n";
        let edits = resolve("python", source);

        let enter = edit(&edits, PointKind::FunctionEnter);
        assert_eq!(enter.byte_offset, 13);
        assert!(enter.insertion_text.starts_with("    _codegreen_rt.checkpoint("));
        assert!(enter.insertion_text.ends_with(")\n"));

        let exit = edit(&edits, PointKind::FunctionExit);
        assert_eq!(exit.byte_offset, source.len());
        assert_eq!(exit.edit_shape, InsertionMode::InsideEnd);
        assert!(exit.insertion_text.starts_with("    _codegreen_rt.checkpoint(\"function_exit_hello"));
    }

    #[test]
    fn test_python_docstring_is_skipped() {
        let source = "def f():\n    \"\"\"Doc.\"\"\"\n    x = 1\n";
        let edits = resolve("python", source);
        let enter = edit(&edits, PointKind::FunctionEnter);
        assert_eq!(enter.byte_offset, source.find("    x = 1").unwrap());
    }

    #[test]
    fn test_python_docstring_only_body() {
        let source = "def f():\n    \"\"\"Doc.\"\"\"\n";
        let edits = resolve("python", source);
        let enter = edit(&edits, PointKind::FunctionEnter);
        assert_eq!(enter.byte_offset, source.len());
    }

    #[test]
    fn test_python_inline_suite_is_split() {
        let source = "def f(): return 1\n";
        let edits = resolve("python", source);
        let enter = edit(&edits, PointKind::FunctionEnter);
        assert_eq!(enter.byte_offset, source.find("return").unwrap());
        assert!(enter.insertion_text.starts_with("\n    "));
        assert!(enter.insertion_text.ends_with("\n    "));
    }

    #[test]
    fn test_python_inline_return_in_if() {
        let source = "def f(x):\n    if x: return 1\n    return 2\n";
        let edits = resolve("python", source);
        let first_return = edits
            .iter()
            .find(|e| e.kind == PointKind::FunctionExit && e.edit_shape == InsertionMode::ImmediatelyBefore)
            .unwrap();
        assert_eq!(first_return.byte_offset, source.find("return 1").unwrap());
        assert!(first_return.insertion_text.starts_with("\n        "));
        assert!(first_return.node_end_byte.is_none());
    }

    #[test]
    fn test_loop_before_and_after() {
        let source = "def f():\n    for i in x:\n        pass\n    done()\n";
        let edits = resolve("python", source);

        let start = edit(&edits, PointKind::LoopStart);
        assert_eq!(start.byte_offset, source.find("    for").unwrap());
        assert!(start.insertion_text.starts_with("    _codegreen_rt"));

        let exit = edit(&edits, PointKind::LoopExit);
        assert_eq!(exit.byte_offset, source.find("    done").unwrap());
        assert!(exit.is_closing());
    }

    #[test]
    fn test_c_braceless_return_is_wrapped() {
        let source = "int f(int x) {\n    if (x) return 1;\n    return 0;\n}\n";
        let edits = resolve("c", source);
        let wrapped: Vec<_> = edits.iter().filter(|e| e.wraps()).collect();
        assert_eq!(wrapped.len(), 1);
        let start = source.find("return 1;").unwrap();
        assert_eq!(wrapped[0].byte_offset, start);
        assert_eq!(wrapped[0].node_end_byte, Some(start + "return 1;".len()));
        assert!(wrapped[0].insertion_text.starts_with("codegreen_checkpoint("));
    }

    #[test]
    fn test_c_closing_brace_on_own_line() {
        let source = "void f(void) {\n    work();\n}\n";
        let edits = resolve("c", source);
        let exit = edit(&edits, PointKind::FunctionExit);
        assert_eq!(exit.byte_offset, source.find('}').unwrap());
        assert!(exit.insertion_text.starts_with("    codegreen_checkpoint("));
        assert!(exit.insertion_text.ends_with(");\n"));
    }

    #[test]
    fn test_c_empty_body_inline() {
        let source = "void f(void) {}\n";
        let edits = resolve("c", source);
        let enter = edit(&edits, PointKind::FunctionEnter);
        let exit = edit(&edits, PointKind::FunctionExit);
        assert_eq!(enter.byte_offset, source.find('{').unwrap() + 1);
        assert_eq!(exit.byte_offset, source.find('}').unwrap());
        assert_eq!(enter.byte_offset, exit.byte_offset);
    }

    #[test]
    fn test_c_loop_exit_stays_inside_closing_brace() {
        let source = "void h(void) { while (g()) { } }\n";
        let edits = resolve("c", source);
        let exit = edit(&edits, PointKind::LoopExit);
        let loop_end = source.find("{ } }").unwrap() + 3;
        assert_eq!(exit.byte_offset, loop_end);
        assert!(exit.insertion_text.starts_with(" codegreen_checkpoint(\"loop_exit_"));
        assert!(exit.byte_offset < source.rfind('}').unwrap());
    }

    #[test]
    fn test_c_empty_body_keeps_space_between_calls() {
        let source = "void f(void) {}\n";
        let enter = resolve("c", source)
            .into_iter()
            .find(|e| e.kind == PointKind::FunctionEnter)
            .unwrap();
        assert!(enter.insertion_text.starts_with(' '));
        assert!(enter.insertion_text.ends_with("; "));
    }

    #[test]
    fn test_c_braceless_loop_is_skipped() {
        let source = "void f(int n) {\n    if (n) for (;;) {}\n}\n";
        let edits = resolve("c", source);
        assert!(edits
            .iter()
            .all(|e| e.kind != PointKind::LoopStart && e.kind != PointKind::LoopExit));
    }

    #[test]
    fn test_java_constructor_skips_super_call() {
        let source = "class A extends B {\n    A() {\n        super();\n        init();\n    }\n}\n";
        let edits = resolve("java", source);
        let enter = edits
            .iter()
            .find(|e| e.kind == PointKind::FunctionEnter)
            .unwrap();
        assert_eq!(enter.byte_offset, source.find("        init").unwrap());
    }

    #[test]
    fn test_import_after_preamble() {
        let rules = rules::base_rules("c").unwrap();
        let source = "#include <stdio.h>\n#include \"a.h\"\n\nint main(void) {\n    return 0;\n}\n";
        let mut parser = new_parser(&rules.language, 0).unwrap();
        let parsed = parse_source(&mut parser, source, 0).unwrap();
        let resolver = OffsetResolver::new(rules, &parsed.syntax, source);

        let import = resolver
            .resolve_import("#include \"codegreen_runtime.h\"")
            .unwrap();
        assert_eq!(import.byte_offset, source.find("\nint").unwrap());
        assert!(resolver.resolve_import("#include \"a.h\"").is_none());
    }

    #[test]
    fn test_python_import_after_docstring() {
        let rules = rules::base_rules("python").unwrap();
        let source = "\"\"\"Module.\"\"\"\nfrom __future__ import annotations\nimport os\n";
        let mut parser = new_parser(&rules.language, 0).unwrap();
        let parsed = parse_source(&mut parser, source, 0).unwrap();
        let resolver = OffsetResolver::new(rules, &parsed.syntax, source);

        let import = resolver
            .resolve_import("import codegreen_runtime as _codegreen_rt")
            .unwrap();
        assert_eq!(import.byte_offset, source.find("import os").unwrap());
    }
}
