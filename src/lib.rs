//! codegreen-instrument - energy checkpoint instrumentation.
//!
//! Inserts checkpoint calls at the entry and exit of functions, methods,
//! classes and loops in Python, C, C++, Java and JavaScript sources. The
//! calls record named events for a runtime energy backend; the rewritten
//! file must stay syntactically valid.
//!
//! # Architecture
//!
//! - `syntax`: tree-sitter parsing and an arena snapshot of the tree
//! - `rules`: per-language node kinds, queries, templates and limits
//! - `analysis`: query capture, classification, reachability, deduplication
//!   and the regex fallback
//! - `rewrite`: offset resolution and validated incremental rewriting
//! - `pipeline`: the per-file strategy chain and parallel batches
//! - `config`: YAML configuration schema and discovery
//! - `report`: Output formatting (pretty, JSON)
//!
//! # Adding a New Language
//!
//! Add a module under `src/rules/` that builds a `LanguageRules` and list it
//! in `SUPPORTED_LANGUAGES`.

pub mod analysis;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod report;
pub mod rewrite;
pub mod rules;
pub mod syntax;

pub use analysis::{Candidate, InsertionMode, PointKind};
pub use config::InstrumentConfig;
pub use error::InstrumentError;
pub use pipeline::{AnalysisMethod, FileSummary, InstrumentedFile, Pipeline, PointRecord};
pub use rewrite::ResolvedEdit;
pub use rules::{base_rules, detect_language, LanguageRules, SUPPORTED_LANGUAGES};
