//! Source rewriting.
//!
//! Candidates that survive analysis are turned into concrete text edits and
//! spliced into the source.
//!
//! ```text
//! ┌────────────┐     ┌────────────────┐     ┌────────────────────┐
//! │ Candidates │────▶│ OffsetResolver │────▶│ ResolvedEdit       │
//! └────────────┘     │ (indent,       │     │ (offset, text,     │
//!                    │  template)     │     │  shape)            │
//!                    └────────────────┘     └────────────────────┘
//!                                                     │
//!                                                     ▼
//!                                           ┌────────────────────┐
//!                                           │IncrementalRewriter │
//!                                           │ order → splice →   │
//!                                           │ reparse → validate │
//!                                           └────────────────────┘
//! ```

pub mod indent;
pub mod resolve;
pub mod rewriter;
pub mod template;

pub use indent::{reindent, IndentStyle};
pub use resolve::{OffsetResolver, ResolvedEdit, IMPORT_EDIT_ID};
pub use rewriter::{order_edits, IncrementalRewriter, RewriteOutcome};
