//! Error taxonomy for the instrumentation pipeline.

use thiserror::Error;

/// Errors that can occur while instrumenting a single file.
///
/// Only the first three variants end a file's processing outright. Parser
/// failures degrade to the regex fallback, and query or edit failures are
/// absorbed by the pipeline and surface as log lines or counters.
#[derive(Error, Debug)]
pub enum InstrumentError {
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),
    #[error("file too large: {size} bytes exceeds limit of {limit} bytes")]
    FileTooLarge { size: u64, limit: u64 },
    #[error("source is not valid UTF-8")]
    InvalidUtf8,
    #[error("parse timed out after {0} ms")]
    ParseTimeout(u64),
    #[error("parser error: {0}")]
    Parser(String),
    #[error("query `{name}` failed: {message}")]
    Query { name: String, message: String },
    #[error("analysis failed: {0}")]
    AnalysisFailed(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl InstrumentError {
    /// Whether the error should degrade the file to the regex fallback
    /// instead of failing it.
    pub fn is_parser_failure(&self) -> bool {
        matches!(self, InstrumentError::ParseTimeout(_) | InstrumentError::Parser(_))
    }
}
