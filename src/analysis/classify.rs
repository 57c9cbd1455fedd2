//! Capture classification.
//!
//! Turns a (node, label) capture into typed candidates. Definitions also
//! produce their paired exit point: an implicit function exit at the end of
//! the body, a loop exit after the loop, and optionally a class exit.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use super::candidate::{Candidate, InsertionMode, PointKind, IMPLICIT_SUBTYPE};
use super::query::{Capture, QueryCaptures};
use super::reachability::ReachabilityAnalyzer;
use crate::rules::{CaptureRule, LanguageRules, NodeKinds};
use crate::syntax::{NodeId, SyntaxTree};

/// Declarator chains deeper than this are treated as unresolvable.
const MAX_DECLARATOR_DEPTH: usize = 10;

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

/// Whether `name` can be embedded in a checkpoint identifier.
pub fn is_valid_identifier(name: &str, max_len: usize) -> bool {
    !name.is_empty() && name.len() <= max_len && IDENTIFIER.is_match(name)
}

/// Body block of a definition: its `body` field, else its first body-kind child.
pub fn body_of(syntax: &SyntaxTree, kinds: &NodeKinds, definition: NodeId) -> Option<NodeId> {
    syntax.child_by_field(definition, "body").or_else(|| {
        syntax
            .named_children(definition)
            .find(|c| kinds.bodies.contains(&syntax.kind(*c)))
    })
}

/// Classifies captures from one parse.
pub struct Classifier<'a> {
    rules: &'a LanguageRules,
    syntax: &'a SyntaxTree,
    source: &'a str,
    enabled: &'a [PointKind],
}

impl<'a> Classifier<'a> {
    pub fn new(
        rules: &'a LanguageRules,
        syntax: &'a SyntaxTree,
        source: &'a str,
        enabled: &'a [PointKind],
    ) -> Self {
        Self {
            rules,
            syntax,
            source,
            enabled,
        }
    }

    /// Classify every capture of one query.
    pub fn classify_all(&self, captures: &QueryCaptures) -> Vec<Candidate> {
        captures
            .captures()
            .flat_map(|capture| self.classify(&capture))
            .collect()
    }

    /// Classify a single capture into zero, one or two candidates.
    pub fn classify(&self, capture: &Capture) -> Vec<Candidate> {
        let Some(rule) = self.rules.capture_rule(&capture.label) else {
            return Vec::new();
        };

        let candidates = match rule.kind {
            PointKind::FunctionEnter | PointKind::ClassEnter => {
                self.classify_definition(capture, rule)
            }
            PointKind::FunctionExit => self.classify_return(capture, rule),
            PointKind::LoopStart => self.classify_loop(capture, rule),
            _ => Vec::new(),
        };

        // Class exits are governed by the language's `emit_class_exit`.
        candidates
            .into_iter()
            .filter(|c| c.kind == PointKind::ClassExit || self.enabled.contains(&c.kind))
            .collect()
    }

    fn classify_definition(&self, capture: &Capture, rule: &CaptureRule) -> Vec<Candidate> {
        let family = match rule.kind {
            PointKind::ClassEnter => self.rules.kinds.classes,
            _ => self.rules.kinds.functions,
        };

        let Some(definition) = self.definition_for(capture.node, family) else {
            self.reject(capture, "no enclosing definition");
            return Vec::new();
        };
        if self.in_call_context(definition) {
            self.reject(capture, "inside a call expression");
            return Vec::new();
        }
        if rule.kind == PointKind::ClassEnter && self.is_inner_class(definition) {
            self.reject(capture, "inner class cannot hold a static initializer");
            return Vec::new();
        }
        let Some(name) = self.resolve_name(definition) else {
            self.reject(capture, "name could not be resolved");
            return Vec::new();
        };
        if !is_valid_identifier(&name, self.rules.limits.max_identifier_length) {
            self.reject(capture, "invalid identifier");
            return Vec::new();
        }
        let Some(body) = body_of(self.syntax, &self.rules.kinds, definition) else {
            self.reject(capture, "definition has no body");
            return Vec::new();
        };

        let node = self.syntax.node(definition);
        let (line, column) = (node.line(), node.column());
        let subtype = if rule.kind == PointKind::FunctionEnter && self.is_method(definition) {
            "method"
        } else {
            rule.subtype
        };

        let enter = Candidate {
            id: Candidate::make_id(rule.kind, &name, line, column),
            kind: rule.kind,
            subtype: subtype.to_string(),
            target_name: name.clone(),
            source_node: Some(definition),
            insertion_mode: rule.mode,
            priority: rule.priority,
            reachable: true,
            line,
            column,
            key_line: line,
            capture_label: capture.label.clone(),
        };

        let exit_kind = match rule.kind {
            PointKind::FunctionEnter => PointKind::FunctionExit,
            _ if self.rules.emit_class_exit => PointKind::ClassExit,
            _ => return vec![enter],
        };

        let body_node = self.syntax.node(body);
        let end_line = body_node.end_point.row + 1;
        let end_column = body_node.end_point.column + 1;
        let (subtype, reachable) = if exit_kind == PointKind::FunctionExit {
            let reach = ReachabilityAnalyzer::new(self.syntax, &self.rules.kinds);
            (IMPLICIT_SUBTYPE.to_string(), reach.falls_through(body))
        } else {
            (rule.subtype.to_string(), true)
        };

        let exit = Candidate {
            id: Candidate::make_id(exit_kind, &name, end_line, end_column),
            kind: exit_kind,
            subtype,
            target_name: name,
            source_node: Some(definition),
            insertion_mode: InsertionMode::InsideEnd,
            priority: rule.priority,
            reachable,
            line: end_line,
            column: end_column,
            key_line: end_line + 1,
            capture_label: capture.label.clone(),
        };

        vec![enter, exit]
    }

    fn classify_return(&self, capture: &Capture, rule: &CaptureRule) -> Vec<Candidate> {
        let returns = self.rules.kinds.returns;
        let statement = if returns.contains(&self.syntax.kind(capture.node)) {
            Some(capture.node)
        } else {
            self.syntax
                .parent(capture.node)
                .filter(|p| returns.contains(&self.syntax.kind(*p)))
        };
        let Some(statement) = statement else {
            self.reject(capture, "not a return statement");
            return Vec::new();
        };

        let Some(function) = self.enclosing_function(statement) else {
            self.reject(capture, "return outside a named function");
            return Vec::new();
        };
        let Some(name) = self
            .resolve_name(function)
            .filter(|n| is_valid_identifier(n, self.rules.limits.max_identifier_length))
        else {
            self.reject(capture, "enclosing function has no valid name");
            return Vec::new();
        };

        let node = self.syntax.node(statement);
        let (line, column) = (node.line(), node.column());
        vec![Candidate {
            id: Candidate::make_id(rule.kind, &name, line, column),
            kind: rule.kind,
            subtype: rule.subtype.to_string(),
            target_name: name,
            source_node: Some(statement),
            insertion_mode: rule.mode,
            priority: rule.priority,
            reachable: true,
            line,
            column,
            key_line: line,
            capture_label: capture.label.clone(),
        }]
    }

    fn classify_loop(&self, capture: &Capture, rule: &CaptureRule) -> Vec<Candidate> {
        if !self.rules.kinds.loops.contains(&self.syntax.kind(capture.node)) {
            self.reject(capture, "not a loop statement");
            return Vec::new();
        }

        let node = self.syntax.node(capture.node);
        let (line, column) = (node.line(), node.column());
        let name = format!("{}_loop", rule.subtype);

        let start = Candidate {
            id: Candidate::make_id(PointKind::LoopStart, &name, line, column),
            kind: PointKind::LoopStart,
            subtype: rule.subtype.to_string(),
            target_name: name.clone(),
            source_node: Some(capture.node),
            insertion_mode: rule.mode,
            priority: rule.priority,
            reachable: true,
            line,
            column,
            key_line: line,
            capture_label: capture.label.clone(),
        };
        let exit = Candidate {
            id: Candidate::make_id(PointKind::LoopExit, &name, line, column),
            kind: PointKind::LoopExit,
            insertion_mode: InsertionMode::After,
            ..start.clone()
        };
        vec![start, exit]
    }

    /// The definition a capture belongs to. Name captures are walked up
    /// through declarators; anything else must be the definition itself.
    fn definition_for(&self, node: NodeId, family: &[&str]) -> Option<NodeId> {
        let kind = self.syntax.kind(node);
        if family.contains(&kind) {
            return Some(node);
        }
        if !self.rules.kinds.identifiers.contains(&kind) {
            return None;
        }

        let mut current = self.syntax.parent(node);
        for _ in 0..MAX_DECLARATOR_DEPTH {
            let parent = current?;
            let kind = self.syntax.kind(parent);
            if family.contains(&kind) {
                return Some(parent);
            }
            if !self.rules.kinds.declarators.contains(&kind) {
                return None;
            }
            current = self.syntax.parent(parent);
        }
        None
    }

    /// Whether a call expression sits between `node` and its statement container.
    fn in_call_context(&self, node: NodeId) -> bool {
        let kinds = &self.rules.kinds;
        for ancestor in self.syntax.ancestors(node) {
            let kind = self.syntax.kind(ancestor);
            if kinds.statement_containers.contains(&kind) || kinds.bodies.contains(&kind) {
                return false;
            }
            if kinds.calls.contains(&kind) {
                return true;
            }
        }
        false
    }

    /// Follow `name` fields and `declarator` chains down to an identifier.
    fn resolve_name(&self, definition: NodeId) -> Option<String> {
        let identifiers = self.rules.kinds.identifiers;
        let mut current = definition;

        for _ in 0..MAX_DECLARATOR_DEPTH {
            let next = self
                .syntax
                .child_by_field(current, "name")
                .or_else(|| self.syntax.child_by_field(current, "declarator"))?;
            if identifiers.contains(&self.syntax.kind(next)) {
                return Some(self.syntax.text(next, self.source).to_string());
            }
            current = next;
        }
        None
    }

    /// Whether a function is defined inside a class rather than another function.
    fn is_method(&self, function: NodeId) -> bool {
        let kinds = &self.rules.kinds;
        for ancestor in self.syntax.ancestors(function) {
            let kind = self.syntax.kind(ancestor);
            if kinds.classes.contains(&kind) {
                return true;
            }
            if kinds.functions.contains(&kind) || kinds.closures.contains(&kind) {
                return false;
            }
        }
        false
    }

    /// A class declared inside another class or a block without `static`.
    fn is_inner_class(&self, class: NodeId) -> bool {
        let scopes = self.rules.kinds.inner_class_scopes;
        let nested = self
            .syntax
            .parent(class)
            .is_some_and(|p| scopes.contains(&self.syntax.kind(p)));
        nested
            && !self
                .syntax
                .named_children(class)
                .filter(|c| self.syntax.kind(*c) == "modifiers")
                .flat_map(|m| self.syntax.children(m))
                .any(|c| self.syntax.kind(c) == "static")
    }

    /// Nearest named function around `node`, unless a closure comes first.
    fn enclosing_function(&self, node: NodeId) -> Option<NodeId> {
        let kinds = &self.rules.kinds;
        for ancestor in self.syntax.ancestors(node) {
            let kind = self.syntax.kind(ancestor);
            if kinds.closures.contains(&kind) {
                return None;
            }
            if kinds.functions.contains(&kind) {
                return Some(ancestor);
            }
        }
        None
    }

    fn reject(&self, capture: &Capture, reason: &str) {
        let node = self.syntax.node(capture.node);
        debug!(
            language = self.rules.id,
            label = %capture.label,
            line = node.line(),
            "capture rejected: {}",
            reason
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::query::{compiled_queries, PointLocator};
    use crate::rules;
    use crate::syntax::{new_parser, parse_source};

    /// Classify every capture of every query for `source`.
    fn classify(lang: &str, source: &str) -> Vec<Candidate> {
        let rules = rules::base_rules(lang).unwrap();
        let mut parser = new_parser(&rules.language, 0).unwrap();
        let parsed = parse_source(&mut parser, source, 0).unwrap();
        let set = compiled_queries(rules, None);
        let classifier = Classifier::new(rules, &parsed.syntax, source, PointKind::all());

        PointLocator::new(&set, 1000)
            .locate(&parsed, source)
            .iter()
            .flat_map(|captures| classifier.classify_all(captures))
            .collect()
    }

    fn find<'c>(candidates: &'c [Candidate], kind: PointKind, label: &str) -> Vec<&'c Candidate> {
        candidates
            .iter()
            .filter(|c| c.kind == kind && c.capture_label == label)
            .collect()
    }

    #[test]
    fn test_identifier_validation() {
        assert!(is_valid_identifier("hello_world2", 50));
        assert!(is_valid_identifier("_private", 50));
        assert!(!is_valid_identifier("2fast", 50));
        assert!(!is_valid_identifier("a-b", 50));
        assert!(!is_valid_identifier("", 50));
        assert!(!is_valid_identifier(&"x".repeat(51), 50));
    }

    #[test]
    fn test_function_pairs_enter_with_implicit_exit() {
        let source = "def hello():\n    print(\"hi\")\n";
        let candidates = classify("python", source);

        let enters = find(&candidates, PointKind::FunctionEnter, "local.definition.function");
        assert_eq!(enters.len(), 1);
        assert_eq!(enters[0].target_name, "hello");
        assert_eq!(enters[0].priority, 1);
        assert_eq!(enters[0].id, "function_enter_hello_1_1");

        let exits = find(&candidates, PointKind::FunctionExit, "local.definition.function");
        assert_eq!(exits.len(), 1);
        assert!(exits[0].is_implicit());
        assert!(exits[0].reachable);
        assert_eq!(exits[0].insertion_mode, InsertionMode::InsideEnd);
    }

    #[test]
    fn test_terminating_body_marks_exit_unreachable() {
        let source = "def f():\n    return 1\n";
        let candidates = classify("python", source);
        let implicit: Vec<_> = candidates
            .iter()
            .filter(|c| c.kind == PointKind::FunctionExit && c.is_implicit())
            .collect();
        assert!(!implicit.is_empty());
        assert!(implicit.iter().all(|c| !c.reachable));

        let explicit = find(&candidates, PointKind::FunctionExit, "keyword.return");
        assert_eq!(explicit.len(), 1);
        assert_eq!(explicit[0].subtype, "return");
        assert_eq!(explicit[0].line, 2);
    }

    #[test]
    fn test_method_subtype() {
        let source = "class A:\n    def m(self):\n        pass\n\ndef free():\n    pass\n";
        let candidates = classify("python", source);

        let methods: Vec<_> = find(&candidates, PointKind::FunctionEnter, "function")
            .into_iter()
            .map(|c| (c.target_name.as_str(), c.subtype.as_str()))
            .collect();
        assert_eq!(methods, vec![("m", "method"), ("free", "function")]);

        let classes = find(&candidates, PointKind::ClassEnter, "type.definition");
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].target_name, "A");
    }

    #[test]
    fn test_return_in_lambda_or_nested_function() {
        let source = "def outer():\n    def inner():\n        return 1\n    return inner\n";
        let candidates = classify("python", source);
        let mut returns: Vec<_> = find(&candidates, PointKind::FunctionExit, "return")
            .into_iter()
            .map(|c| (c.target_name.as_str(), c.line))
            .collect();
        returns.sort();
        assert_eq!(returns, vec![("inner", 3), ("outer", 4)]);
    }

    #[test]
    fn test_js_return_inside_arrow_is_rejected() {
        let source = "function f() {\n  const g = () => {\n    return 1;\n  };\n  return g;\n}\n";
        let candidates = classify("javascript", source);
        let returns = find(&candidates, PointKind::FunctionExit, "return");
        assert_eq!(returns.len(), 1);
        assert_eq!(returns[0].line, 5);
    }

    #[test]
    fn test_c_prototype_is_rejected() {
        let source = "int add(int a, int b);\n\nint add(int a, int b) {\n    return a + b;\n}\n";
        let candidates = classify("c", source);
        let enters = find(&candidates, PointKind::FunctionEnter, "local.definition.function");
        assert_eq!(enters.len(), 1);
        assert_eq!(enters[0].line, 3);
    }

    #[test]
    fn test_c_pointer_declarator_name() {
        let source = "static char *dup(const char *s) {\n    return 0;\n}\n";
        let candidates = classify("c", source);
        let enters = find(&candidates, PointKind::FunctionEnter, "function");
        assert_eq!(enters.len(), 1);
        assert_eq!(enters[0].target_name, "dup");
    }

    #[test]
    fn test_cpp_qualified_method_name() {
        let source = "void Widget::draw() {\n    paint();\n}\n";
        let candidates = classify("cpp", source);
        let enters = find(&candidates, PointKind::FunctionEnter, "local.definition.method");
        assert_eq!(enters.len(), 1);
        assert_eq!(enters[0].target_name, "draw");
    }

    #[test]
    fn test_loop_pairs_start_and_exit() {
        let source = "def f():\n    for i in range(3):\n        pass\n";
        let candidates = classify("python", source);
        let starts = find(&candidates, PointKind::LoopStart, "loop.for");
        let exits = find(&candidates, PointKind::LoopExit, "loop.for");
        assert_eq!(starts.len(), 1);
        assert_eq!(exits.len(), 1);
        assert_eq!(starts[0].target_name, "for_loop");
        assert_eq!(exits[0].insertion_mode, InsertionMode::After);
        assert_eq!(starts[0].key_line, exits[0].key_line);
    }

    #[test]
    fn test_disabled_kinds_are_dropped() {
        let rules = rules::base_rules("python").unwrap();
        let source = "def f():\n    for i in x:\n        pass\n";
        let mut parser = new_parser(&rules.language, 0).unwrap();
        let parsed = parse_source(&mut parser, source, 0).unwrap();
        let set = compiled_queries(rules, None);
        let enabled = [PointKind::FunctionEnter];
        let classifier = Classifier::new(rules, &parsed.syntax, source, &enabled);

        let candidates: Vec<_> = PointLocator::new(&set, 1000)
            .locate(&parsed, source)
            .iter()
            .flat_map(|c| classifier.classify_all(c))
            .collect();
        assert!(!candidates.is_empty());
        assert!(candidates.iter().all(|c| c.kind == PointKind::FunctionEnter));
    }

    #[test]
    fn test_java_constructor_and_class() {
        let source = "class A {\n    A() {\n        super();\n    }\n    int get() {\n        return 1;\n    }\n}\n";
        let candidates = classify("java", source);
        let mut names: Vec<_> = find(&candidates, PointKind::FunctionEnter, "function.method")
            .into_iter()
            .map(|c| c.target_name.as_str())
            .collect();
        names.sort();
        assert_eq!(names, vec!["A", "get"]);
        assert_eq!(find(&candidates, PointKind::ClassEnter, "type.definition").len(), 1);
        assert!(candidates.iter().all(|c| c.kind != PointKind::ClassExit));
    }

    #[test]
    fn test_java_inner_class_gets_no_class_enter() {
        let source = "class A {
    class B {
        void f() { }
    }
    static class C { }
    void g() {
        class D { }
    }
}
";
        let candidates = classify("java", source);
        let mut classes: Vec<_> = candidates
            .iter()
            .filter(|c| c.kind == PointKind::ClassEnter)
            .map(|c| c.target_name.as_str())
            .collect();
        classes.sort();
        classes.dedup();
        assert_eq!(classes, vec!["A", "C"]);

        let methods = find(&candidates, PointKind::FunctionEnter, "function.method");
        assert!(methods.iter().any(|c| c.target_name == "f"));
    }

    #[test]
    fn test_returns_sharing_a_line_stay_apart() {
        let source = "int g(int x) {
    if (x) return 1; else return 2;
}
";
        let candidates = classify("c", source);
        let returns = find(&candidates, PointKind::FunctionExit, "return");
        assert_eq!(returns.len(), 2);
        assert_eq!(returns[0].line, returns[1].line);
        assert_ne!(returns[0].semantic_key(), returns[1].semantic_key());
    }
}
