//! Syntax tree provider.
//!
//! Wraps tree-sitter parsing and snapshots each parse into an arena of
//! [`SyntaxNode`]s addressed by [`NodeId`]. Candidates and resolvers hold
//! `NodeId`s instead of borrowing `tree_sitter::Node`, so the live tree can
//! be edited and reparsed while analysis results are still around.
//!
//! ```text
//! source ──parse──► tree_sitter::Tree ──snapshot──► SyntaxTree (arena)
//!                         │                              │
//!                         └── queries / incremental ─────┘
//!                             reparse                 classification,
//!                                                     reachability, offsets
//! ```

pub mod text;

use std::collections::HashMap;

use tree_sitter::{Language, Node, Parser, Point, Tree};

use crate::error::InstrumentError;

/// Index of a node inside a [`SyntaxTree`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One node of the arena snapshot.
#[derive(Debug, Clone)]
pub struct SyntaxNode {
    pub kind: &'static str,
    /// Field name under the parent, e.g. `body` or `declarator`.
    pub field: Option<&'static str>,
    pub named: bool,
    /// Extras such as comments that may appear anywhere.
    pub extra: bool,
    /// ERROR or MISSING node.
    pub is_error: bool,
    pub start_byte: usize,
    pub end_byte: usize,
    pub start_point: Point,
    pub end_point: Point,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

impl SyntaxNode {
    /// 1-based line of the node start.
    pub fn line(&self) -> usize {
        self.start_point.row + 1
    }

    /// 1-based column of the node start.
    pub fn column(&self) -> usize {
        self.start_point.column + 1
    }
}

/// Arena snapshot of a parsed tree.
#[derive(Debug, Clone)]
pub struct SyntaxTree {
    nodes: Vec<SyntaxNode>,
    by_ts_id: HashMap<usize, NodeId>,
    error_count: usize,
}

impl SyntaxTree {
    /// Snapshot every node of `tree` into an arena, preserving child order.
    pub fn from_tree(tree: &Tree) -> Self {
        let mut nodes: Vec<SyntaxNode> = Vec::new();
        let mut by_ts_id = HashMap::new();
        let mut error_count = 0;

        let mut cursor = tree.walk();
        let mut parents: Vec<NodeId> = Vec::new();

        loop {
            let node = cursor.node();
            let id = NodeId(nodes.len() as u32);
            let parent = parents.last().copied();

            if node.is_error() || node.is_missing() {
                error_count += 1;
            }
            nodes.push(SyntaxNode {
                kind: node.kind(),
                field: cursor.field_name(),
                named: node.is_named(),
                extra: node.is_extra(),
                is_error: node.is_error() || node.is_missing(),
                start_byte: node.start_byte(),
                end_byte: node.end_byte(),
                start_point: node.start_position(),
                end_point: node.end_position(),
                parent,
                children: Vec::new(),
            });
            by_ts_id.insert(node.id(), id);
            if let Some(parent) = parent {
                nodes[parent.index()].children.push(id);
            }

            if cursor.goto_first_child() {
                parents.push(id);
                continue;
            }

            // Climb until a sibling exists or the root is reached again.
            loop {
                if cursor.goto_next_sibling() {
                    break;
                }
                if !cursor.goto_parent() {
                    return Self {
                        nodes,
                        by_ts_id,
                        error_count,
                    };
                }
                parents.pop();
            }
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &SyntaxNode {
        &self.nodes[id.index()]
    }

    /// Number of ERROR and MISSING nodes in the snapshot.
    pub fn error_count(&self) -> usize {
        self.error_count
    }

    /// Map a live tree-sitter node of the snapshotted tree back to its arena id.
    pub fn lookup(&self, node: Node<'_>) -> Option<NodeId> {
        self.by_ts_id.get(&node.id()).copied()
    }

    pub fn kind(&self, id: NodeId) -> &'static str {
        self.node(id).kind
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn children(&self, id: NodeId) -> impl DoubleEndedIterator<Item = NodeId> + '_ {
        self.node(id).children.iter().copied()
    }

    pub fn named_children(&self, id: NodeId) -> impl DoubleEndedIterator<Item = NodeId> + '_ {
        self.children(id).filter(move |c| self.node(*c).named)
    }

    pub fn child_by_field(&self, id: NodeId, field: &str) -> Option<NodeId> {
        self.children(id).find(|c| self.node(*c).field == Some(field))
    }

    pub fn children_by_field<'a>(
        &'a self,
        id: NodeId,
        field: &'a str,
    ) -> impl Iterator<Item = NodeId> + 'a {
        self.children(id)
            .filter(move |c| self.node(*c).field == Some(field))
    }

    /// Ancestors from the parent up to the root.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |n| self.parent(*n))
    }

    /// Source text covered by a node.
    pub fn text<'s>(&self, id: NodeId, source: &'s str) -> &'s str {
        let node = self.node(id);
        source.get(node.start_byte..node.end_byte).unwrap_or("")
    }
}

/// A tree-sitter parse plus its arena snapshot.
pub struct ParsedSource {
    pub tree: Tree,
    pub syntax: SyntaxTree,
}

/// Create a parser for `language` bounded by `timeout_ms` (0 disables the bound).
pub fn new_parser(language: &Language, timeout_ms: u64) -> Result<Parser, InstrumentError> {
    let mut parser = Parser::new();
    parser
        .set_language(language)
        .map_err(|e| InstrumentError::Parser(e.to_string()))?;
    parser.set_timeout_micros(timeout_ms.saturating_mul(1000));
    Ok(parser)
}

/// Parse `source` from scratch and snapshot the result.
///
/// tree-sitter reports a timeout by returning no tree, which is mapped to
/// [`InstrumentError::ParseTimeout`].
pub fn parse_source(
    parser: &mut Parser,
    source: &str,
    timeout_ms: u64,
) -> Result<ParsedSource, InstrumentError> {
    let tree = parser
        .parse(source, None)
        .ok_or(InstrumentError::ParseTimeout(timeout_ms))?;
    let syntax = SyntaxTree::from_tree(&tree);
    Ok(ParsedSource { tree, syntax })
}

/// Count ERROR and MISSING nodes without building a snapshot.
///
/// Only subtrees that report `has_error` are descended into.
pub fn count_errors(tree: &Tree) -> usize {
    let root = tree.root_node();
    if !root.has_error() {
        return 0;
    }

    let mut count = 0;
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            count += 1;
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.has_error() || child.is_missing() {
                stack.push(child);
            }
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_python(source: &str) -> ParsedSource {
        let language: Language = tree_sitter_python::LANGUAGE.into();
        let mut parser = new_parser(&language, 0).unwrap();
        parse_source(&mut parser, source, 0).unwrap()
    }

    #[test]
    fn test_arena_mirrors_tree() {
        let parsed = parse_python("def f(x):\n    return x\n");
        let syntax = &parsed.syntax;

        assert_eq!(syntax.kind(syntax.root()), "module");
        let func = syntax.named_children(syntax.root()).next().unwrap();
        assert_eq!(syntax.kind(func), "function_definition");

        let name = syntax.child_by_field(func, "name").unwrap();
        assert_eq!(syntax.text(name, "def f(x):\n    return x\n"), "f");

        let body = syntax.child_by_field(func, "body").unwrap();
        assert_eq!(syntax.kind(body), "block");
        assert_eq!(syntax.parent(body), Some(func));
        assert_eq!(syntax.error_count(), 0);
    }

    #[test]
    fn test_parent_spans_contain_children() {
        let source = "class A:\n    def m(self):\n        for i in range(3):\n            pass\n";
        let parsed = parse_python(source);
        let syntax = &parsed.syntax;

        for index in 0..syntax.len() {
            let id = NodeId(index as u32);
            let node = syntax.node(id);
            assert!(node.start_byte <= node.end_byte);
            for child in syntax.children(id) {
                let child = syntax.node(child);
                assert!(child.start_byte >= node.start_byte);
                assert!(child.end_byte <= node.end_byte);
            }
        }
    }

    #[test]
    fn test_lookup_maps_live_nodes() {
        let parsed = parse_python("x = 1\n");
        let live = parsed.tree.root_node().named_child(0).unwrap();
        let id = parsed.syntax.lookup(live).unwrap();
        assert_eq!(parsed.syntax.kind(id), "expression_statement");
    }

    #[test]
    fn test_error_counting() {
        let parsed = parse_python("def f(:\n    pass\n");
        assert!(parsed.syntax.error_count() > 0);
        assert_eq!(count_errors(&parsed.tree), parsed.syntax.error_count());

        let clean = parse_python("def f():\n    pass\n");
        assert_eq!(count_errors(&clean.tree), 0);
    }
}
