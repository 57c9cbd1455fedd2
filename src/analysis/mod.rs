//! Instrumentation point analysis.
//!
//! Finds the places in a file where checkpoints belong. The primary path
//! runs structural queries over the syntax tree; when no tree is available
//! a line-oriented regex scan takes over.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────┐     ┌───────────────┐
//! │ ParsedSource    │────▶│ PointLocator │────▶│ Captures      │
//! └─────────────────┘     │ (queries)    │     │ (node, label) │
//!                         └──────────────┘     └───────────────┘
//!                                                      │
//!                                                      ▼
//! ┌─────────────────┐     ┌──────────────┐     ┌───────────────┐
//! │ Candidates      │◀────│ deduplicate  │◀────│ Classifier    │
//! │ (one per key)   │     │ (per query,  │     │ + reachability│
//! └─────────────────┘     │  then merged)│     └───────────────┘
//!                         └──────────────┘
//! ```
//!
//! The regex path (`fallback`) produces node-less candidates directly.

pub mod candidate;
pub mod classify;
pub mod dedup;
pub mod fallback;
pub mod query;
pub mod reachability;

pub use candidate::{Candidate, InsertionMode, PointKind, SemanticKey, IMPLICIT_SUBTYPE};
pub use classify::{is_valid_identifier, Classifier};
pub use dedup::{deduplicate, retain_reachable};
pub use fallback::{FallbackAnalysis, RegexAnalyzer};
pub use query::{compiled_queries, Capture, PointLocator, QueryCaptures, QuerySet};
pub use reachability::ReachabilityAnalyzer;
