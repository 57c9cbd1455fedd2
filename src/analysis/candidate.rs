//! Instrumentation candidates and their semantic identity.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::syntax::NodeId;

/// Kind of checkpoint to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PointKind {
    FunctionEnter,
    FunctionExit,
    ClassEnter,
    ClassExit,
    LoopStart,
    LoopExit,
    Import,
}

impl PointKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PointKind::FunctionEnter => "function_enter",
            PointKind::FunctionExit => "function_exit",
            PointKind::ClassEnter => "class_enter",
            PointKind::ClassExit => "class_exit",
            PointKind::LoopStart => "loop_start",
            PointKind::LoopExit => "loop_exit",
            PointKind::Import => "import",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "function_enter" => Some(PointKind::FunctionEnter),
            "function_exit" => Some(PointKind::FunctionExit),
            "class_enter" => Some(PointKind::ClassEnter),
            "class_exit" => Some(PointKind::ClassExit),
            "loop_start" => Some(PointKind::LoopStart),
            "loop_exit" => Some(PointKind::LoopExit),
            "import" => Some(PointKind::Import),
            _ => None,
        }
    }

    /// Kinds that open a construct.
    pub fn is_enter(&self) -> bool {
        matches!(
            self,
            PointKind::FunctionEnter | PointKind::ClassEnter | PointKind::LoopStart
        )
    }

    /// Every checkpoint kind, in declaration order.
    pub fn all() -> &'static [PointKind] {
        &[
            PointKind::FunctionEnter,
            PointKind::FunctionExit,
            PointKind::ClassEnter,
            PointKind::ClassExit,
            PointKind::LoopStart,
            PointKind::LoopExit,
        ]
    }
}

impl fmt::Display for PointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a checkpoint goes relative to its source node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertionMode {
    Before,
    After,
    InsideStart,
    InsideEnd,
    ImmediatelyBefore,
}

impl InsertionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            InsertionMode::Before => "before",
            InsertionMode::After => "after",
            InsertionMode::InsideStart => "inside_start",
            InsertionMode::InsideEnd => "inside_end",
            InsertionMode::ImmediatelyBefore => "immediately_before",
        }
    }
}

impl fmt::Display for InsertionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subtype used for exits synthesized at the end of a body.
pub const IMPLICIT_SUBTYPE: &str = "implicit";

/// A typed instrumentation point found during analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// `{kind}_{name}_{line}_{col}`; unique only after deduplication.
    pub id: String,
    pub kind: PointKind,
    pub subtype: String,
    pub target_name: String,
    /// Positioning node. `None` for candidates found by the regex fallback.
    pub source_node: Option<NodeId>,
    pub insertion_mode: InsertionMode,
    /// Lower is preferred.
    pub priority: u32,
    pub reachable: bool,
    /// 1-based position of the anchor.
    pub line: usize,
    pub column: usize,
    /// Line that distinguishes locations sharing a kind and name.
    pub key_line: usize,
    pub capture_label: String,
}

impl Candidate {
    /// Build the checkpoint identifier for a point.
    pub fn make_id(kind: PointKind, name: &str, line: usize, column: usize) -> String {
        format!("{}_{}_{}_{}", kind.as_str(), name, line, column)
    }

    pub fn is_implicit(&self) -> bool {
        self.subtype == IMPLICIT_SUBTYPE
    }

    pub fn semantic_key(&self) -> SemanticKey {
        let explicit_exit = self.kind == PointKind::FunctionExit && !self.is_implicit();
        SemanticKey {
            kind: self.kind,
            target_name: self.target_name.clone(),
            line: self.key_line,
            column: if explicit_exit { self.column } else { 0 },
        }
    }
}

/// Identity used to decide that two candidates describe the same location.
///
/// Loops are keyed by the loop line. Function and class points are keyed by
/// their definition line so same-named methods of different classes stay
/// apart, and explicit exits by their return line and column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SemanticKey {
    pub kind: PointKind,
    pub target_name: String,
    pub line: usize,
    /// Only set for explicit exits; zero otherwise.
    pub column: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_kind_roundtrip_names() {
        for kind in PointKind::all() {
            assert_eq!(PointKind::parse(kind.as_str()), Some(*kind));
        }
        assert_eq!(PointKind::parse("nonsense"), None);
    }

    #[test]
    fn test_point_kind_serde_names() {
        let yaml = serde_yaml::to_string(&PointKind::LoopStart).unwrap();
        assert_eq!(yaml.trim(), "loop_start");
        let parsed: PointKind = serde_yaml::from_str("function_exit").unwrap();
        assert_eq!(parsed, PointKind::FunctionExit);
    }

    #[test]
    fn test_make_id() {
        assert_eq!(
            Candidate::make_id(PointKind::FunctionEnter, "hello", 3, 1),
            "function_enter_hello_3_1"
        );
    }
}
