//! Structural fall-through analysis for function bodies.
//!
//! A body terminates when its last substantive statement is a terminator
//! (`return`, `throw`/`raise`, `break`, `continue`) or a conditional whose
//! branches all terminate, including a mandatory `else`. Anything else
//! (loops, `try`, `switch`) counts as falling through.

use crate::rules::NodeKinds;
use crate::syntax::{NodeId, SyntaxTree};

pub struct ReachabilityAnalyzer<'a> {
    syntax: &'a SyntaxTree,
    kinds: &'a NodeKinds,
}

impl<'a> ReachabilityAnalyzer<'a> {
    pub fn new(syntax: &'a SyntaxTree, kinds: &'a NodeKinds) -> Self {
        Self { syntax, kinds }
    }

    /// Whether control can reach the end of `body`.
    pub fn falls_through(&self, body: NodeId) -> bool {
        !self.terminates(body)
    }

    /// Whether every path through `node` leaves the enclosing construct.
    pub fn terminates(&self, node: NodeId) -> bool {
        let kind = self.syntax.kind(node);

        if self.kinds.terminators.contains(&kind) {
            return true;
        }
        if self.kinds.bodies.contains(&kind) {
            return self
                .last_statement(node)
                .is_some_and(|last| self.terminates(last));
        }
        if self.kinds.conditionals.contains(&kind) {
            return self.conditional_terminates(node);
        }
        false
    }

    fn conditional_terminates(&self, node: NodeId) -> bool {
        match self.syntax.child_by_field(node, "consequence") {
            Some(consequence) if self.terminates(consequence) => {}
            _ => return false,
        }

        let mut has_else = false;
        for alternative in self.syntax.children_by_field(node, "alternative") {
            let kind = self.syntax.kind(alternative);

            let branch = if self.kinds.elif_clauses.contains(&kind) {
                self.syntax.child_by_field(alternative, "consequence")
            } else if self.kinds.else_clauses.contains(&kind) {
                has_else = true;
                self.syntax
                    .child_by_field(alternative, "body")
                    .or_else(|| self.last_statement(alternative))
            } else {
                // Bare `else <statement>`, including `else if`.
                has_else = true;
                Some(alternative)
            };

            if !branch.is_some_and(|b| self.terminates(b)) {
                return false;
            }
        }
        has_else
    }

    /// Last named child that is not a comment.
    fn last_statement(&self, node: NodeId) -> Option<NodeId> {
        self.syntax.named_children(node).rev().find(|child| {
            let child = self.syntax.node(*child);
            !child.extra && !self.kinds.comments.contains(&child.kind)
        })
    }
}
