//! Per-file instrumentation pipeline.
//!
//! A file is handed to an ordered chain of analysis strategies. The query
//! strategy parses the file and works on its syntax tree; when the parser
//! times out or cannot be configured the chain moves on to the regex
//! strategy. The first strategy that produces an outcome wins.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::analysis::{
    compiled_queries, deduplicate, retain_reachable, Candidate, Classifier, PointKind,
    PointLocator, RegexAnalyzer,
};
use crate::config::InstrumentConfig;
use crate::error::InstrumentError;
use crate::rewrite::{IncrementalRewriter, OffsetResolver, ResolvedEdit, RewriteOutcome};
use crate::rules::{self, LanguageRules};
use crate::syntax::{new_parser, parse_source};

/// How a file's points were found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMethod {
    Query,
    RegexFallback,
}

impl AnalysisMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisMethod::Query => "query",
            AnalysisMethod::RegexFallback => "regex_fallback",
        }
    }
}

impl std::fmt::Display for AnalysisMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One surviving instrumentation point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PointRecord {
    pub id: String,
    pub kind: PointKind,
    pub subtype: String,
    pub name: String,
    pub line: usize,
    pub column: usize,
    pub priority: u32,
}

impl From<&Candidate> for PointRecord {
    fn from(candidate: &Candidate) -> Self {
        Self {
            id: candidate.id.clone(),
            kind: candidate.kind,
            subtype: candidate.subtype.clone(),
            name: candidate.target_name.clone(),
            line: candidate.line,
            column: candidate.column,
            priority: candidate.priority,
        }
    }
}

/// Per-file summary handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSummary {
    pub language: String,
    pub applied_edit_count: usize,
    pub reverted_edit_count: usize,
    pub analysis_method: AnalysisMethod,
    pub points_found: usize,
    pub truncated: bool,
}

/// Result of processing one file.
#[derive(Debug, Clone)]
pub struct InstrumentedFile {
    /// Instrumented text, or the input unchanged for analysis-only runs.
    pub source: String,
    pub summary: FileSummary,
    pub points: Vec<PointRecord>,
}

/// Everything a strategy needs to process one file.
pub struct FileContext<'a> {
    pub source: &'a str,
    pub rules: &'a LanguageRules,
    pub config: &'a InstrumentConfig,
    /// Produce edits, not just points.
    pub rewrite: bool,
}

/// What a strategy found, plus the rewrite when one was requested.
#[derive(Debug)]
pub struct StrategyOutcome {
    pub method: AnalysisMethod,
    pub candidates: Vec<Candidate>,
    pub truncated: bool,
    pub rewrite: Option<RewriteOutcome>,
}

/// One link of the analysis chain.
///
/// `None` and parser failures pass the file to the next strategy; any other
/// error fails the file.
pub trait AnalysisStrategy: Send + Sync {
    fn method(&self) -> AnalysisMethod;

    fn run(&self, ctx: &FileContext<'_>) -> Option<Result<StrategyOutcome, InstrumentError>>;
}

/// Tree-based analysis with validated incremental rewriting.
pub struct QueryStrategy;

impl AnalysisStrategy for QueryStrategy {
    fn method(&self) -> AnalysisMethod {
        AnalysisMethod::Query
    }

    fn run(&self, ctx: &FileContext<'_>) -> Option<Result<StrategyOutcome, InstrumentError>> {
        let queries = compiled_queries(ctx.rules, ctx.config.query_dir.as_deref());
        if queries.queries.is_empty() {
            warn!(language = ctx.rules.id, "no usable queries");
            return None;
        }
        Some(self.analyze(ctx, &queries))
    }
}

impl QueryStrategy {
    fn analyze(
        &self,
        ctx: &FileContext<'_>,
        queries: &crate::analysis::QuerySet,
    ) -> Result<StrategyOutcome, InstrumentError> {
        let limits = &ctx.rules.limits;
        let mut parser = new_parser(&ctx.rules.language, limits.parser_timeout_ms)?;
        let parsed = parse_source(&mut parser, ctx.source, limits.parser_timeout_ms)?;

        let located = PointLocator::new(queries, limits.max_captures_per_query)
            .locate(&parsed, ctx.source);
        let truncated = located.iter().any(|q| q.truncated);

        let classifier = Classifier::new(
            ctx.rules,
            &parsed.syntax,
            ctx.source,
            &ctx.config.enabled_points,
        );
        let mut merged = Vec::new();
        for captures in &located {
            let mut candidates = classifier.classify_all(captures);
            retain_reachable(&mut candidates);
            let candidates = deduplicate(candidates);
            debug!(
                query = captures.query,
                captures = captures.len(),
                candidates = candidates.len(),
                "query classified"
            );
            merged.extend(candidates);
        }
        let candidates = deduplicate(merged);

        if !ctx.rewrite {
            return Ok(StrategyOutcome {
                method: AnalysisMethod::Query,
                candidates,
                truncated,
                rewrite: None,
            });
        }

        let edits = {
            let resolver = OffsetResolver::new(ctx.rules, &parsed.syntax, ctx.source);
            let mut edits: Vec<ResolvedEdit> = candidates
                .iter()
                .filter_map(|c| resolver.resolve(c))
                .collect();
            if !edits.is_empty() && ctx.config.insert_import {
                if let Some(import) = ctx
                    .rules
                    .templates
                    .import_statement
                    .as_deref()
                    .and_then(|statement| resolver.resolve_import(statement))
                {
                    edits.push(import);
                }
            }
            edits
        };

        let rewrite = IncrementalRewriter::new(&mut parser, ctx.source.to_string(), parsed.tree)
            .apply(edits);
        Ok(StrategyOutcome {
            method: AnalysisMethod::Query,
            candidates,
            truncated,
            rewrite: Some(rewrite),
        })
    }
}

/// Line-oriented fallback for files without a usable tree.
pub struct RegexStrategy;

impl AnalysisStrategy for RegexStrategy {
    fn method(&self) -> AnalysisMethod {
        AnalysisMethod::RegexFallback
    }

    fn run(&self, ctx: &FileContext<'_>) -> Option<Result<StrategyOutcome, InstrumentError>> {
        let analyzer = RegexAnalyzer::new(ctx.rules, &ctx.config.enabled_points);
        let analysis = match analyzer.analyze(ctx.source) {
            Ok(analysis) => analysis,
            Err(e) => return Some(Err(e)),
        };

        let rewrite = ctx.rewrite.then(|| {
            let import = ctx
                .rules
                .templates
                .import_statement
                .as_deref()
                .filter(|_| ctx.config.insert_import);
            analyzer.instrument(ctx.source, &analysis, import)
        });
        Some(Ok(StrategyOutcome {
            method: AnalysisMethod::RegexFallback,
            truncated: analysis.truncated,
            candidates: analysis.candidates,
            rewrite,
        }))
    }
}

/// The default chain: queries first, then the regex scan.
pub fn default_strategies() -> Vec<Box<dyn AnalysisStrategy>> {
    vec![Box::new(QueryStrategy), Box::new(RegexStrategy)]
}

/// Instruments files under one configuration snapshot.
///
/// Cheap to share across threads; every file gets its own parser.
pub struct Pipeline {
    config: Arc<InstrumentConfig>,
    rules: HashMap<&'static str, Arc<LanguageRules>>,
    strategies: Vec<Box<dyn AnalysisStrategy>>,
}

impl Pipeline {
    pub fn new(config: Arc<InstrumentConfig>) -> Result<Self, InstrumentError> {
        Self::with_strategies(config, default_strategies())
    }

    /// Build a pipeline with a custom strategy chain.
    pub fn with_strategies(
        config: Arc<InstrumentConfig>,
        strategies: Vec<Box<dyn AnalysisStrategy>>,
    ) -> Result<Self, InstrumentError> {
        let mut by_language = HashMap::new();
        for id in rules::SUPPORTED_LANGUAGES {
            by_language.insert(*id, Arc::new(config.rules_for(id)?));
        }
        Ok(Self {
            config,
            rules: by_language,
            strategies,
        })
    }

    pub fn config(&self) -> &InstrumentConfig {
        &self.config
    }

    /// Effective rules for `language`.
    pub fn rules(&self, language: &str) -> Result<&Arc<LanguageRules>, InstrumentError> {
        self.rules
            .get(language)
            .ok_or_else(|| InstrumentError::UnsupportedLanguage(language.to_string()))
    }

    /// Instrument source text in memory.
    pub fn instrument_source(
        &self,
        source: &str,
        language: &str,
    ) -> Result<InstrumentedFile, InstrumentError> {
        self.process(source, language, true)
    }

    /// Find points without rewriting; the returned source is the input.
    pub fn analyze_source(
        &self,
        source: &str,
        language: &str,
    ) -> Result<InstrumentedFile, InstrumentError> {
        self.process(source, language, false)
    }

    /// Read, check and instrument one file. `language` overrides detection.
    pub fn instrument_file(
        &self,
        path: &Path,
        language: Option<&str>,
    ) -> Result<InstrumentedFile, InstrumentError> {
        let (source, language) = self.read_source(path, language)?;
        self.process(&source, language, true)
    }

    /// Like [`Pipeline::instrument_file`] without rewriting.
    pub fn analyze_file(
        &self,
        path: &Path,
        language: Option<&str>,
    ) -> Result<InstrumentedFile, InstrumentError> {
        let (source, language) = self.read_source(path, language)?;
        self.process(&source, language, false)
    }

    /// Process many files in parallel. Results keep the order of `paths`.
    pub fn process_files(
        &self,
        paths: &[PathBuf],
        language: Option<&str>,
        rewrite: bool,
    ) -> Vec<(PathBuf, Result<InstrumentedFile, InstrumentError>)> {
        self.process_files_with(paths, language, rewrite, |_| {})
    }

    /// Like [`Pipeline::process_files`], calling `on_done` as each file finishes.
    pub fn process_files_with<F>(
        &self,
        paths: &[PathBuf],
        language: Option<&str>,
        rewrite: bool,
        on_done: F,
    ) -> Vec<(PathBuf, Result<InstrumentedFile, InstrumentError>)>
    where
        F: Fn(&Path) + Sync,
    {
        let failed = AtomicUsize::new(0);

        let results: Vec<_> = paths
            .par_iter()
            .map(|path| {
                let result = if rewrite {
                    self.instrument_file(path, language)
                } else {
                    self.analyze_file(path, language)
                };
                if let Err(e) = &result {
                    failed.fetch_add(1, Ordering::Relaxed);
                    warn!(path = %path.display(), "{}", e);
                }
                on_done(path.as_path());
                (path.clone(), result)
            })
            .collect();

        info!(
            files = results.len(),
            failed = failed.load(Ordering::Relaxed),
            "batch finished"
        );
        results
    }

    /// Load `path` as UTF-8 and settle its language.
    ///
    /// The size limit is checked before the file is read whenever the
    /// language is known up front.
    pub fn read_source(
        &self,
        path: &Path,
        language: Option<&str>,
    ) -> Result<(String, &'static str), InstrumentError> {
        let size = fs::metadata(path)?.len();
        let known = match language {
            Some(lang) => Some(self.language_id(lang)?),
            None => path
                .extension()
                .and_then(|e| e.to_str())
                .and_then(rules::language_for_extension),
        };
        if let Some(lang) = known {
            self.check_size(lang, size)?;
        }

        let bytes = fs::read(path)?;
        let source = String::from_utf8(bytes).map_err(|_| InstrumentError::InvalidUtf8)?;

        let language = match known {
            Some(lang) => lang,
            None => {
                let lang = rules::detect_language(path, &source).ok_or_else(|| {
                    InstrumentError::UnsupportedLanguage(path.display().to_string())
                })?;
                self.check_size(lang, size)?;
                lang
            }
        };
        Ok((source, language))
    }

    fn language_id(&self, language: &str) -> Result<&'static str, InstrumentError> {
        self.rules
            .get_key_value(language)
            .map(|(id, _)| *id)
            .ok_or_else(|| InstrumentError::UnsupportedLanguage(language.to_string()))
    }

    fn check_size(&self, language: &str, size: u64) -> Result<(), InstrumentError> {
        let limit = self.rules(language)?.limits.max_file_size_bytes;
        if size > limit {
            return Err(InstrumentError::FileTooLarge { size, limit });
        }
        Ok(())
    }

    fn process(
        &self,
        source: &str,
        language: &str,
        rewrite: bool,
    ) -> Result<InstrumentedFile, InstrumentError> {
        let rules = self.rules(language)?;
        self.check_size(language, source.len() as u64)?;

        let ctx = FileContext {
            source,
            rules,
            config: &self.config,
            rewrite,
        };

        for strategy in &self.strategies {
            match strategy.run(&ctx) {
                Some(Ok(outcome)) => return Ok(self.finish(rules, source, outcome)),
                Some(Err(e)) if e.is_parser_failure() => {
                    info!(
                        language = rules.id,
                        strategy = %strategy.method(),
                        "{}, trying next strategy",
                        e
                    );
                }
                Some(Err(e)) => return Err(e),
                None => debug!(language = rules.id, strategy = %strategy.method(), "strategy skipped"),
            }
        }

        Err(InstrumentError::AnalysisFailed(format!(
            "no analysis strategy succeeded for {} source",
            rules.id
        )))
    }

    fn finish(
        &self,
        rules: &LanguageRules,
        source: &str,
        outcome: StrategyOutcome,
    ) -> InstrumentedFile {
        let points: Vec<PointRecord> = outcome.candidates.iter().map(PointRecord::from).collect();
        let (source, applied, reverted) = match outcome.rewrite {
            Some(rewrite) => (rewrite.source, rewrite.applied, rewrite.reverted),
            None => (source.to_string(), 0, 0),
        };

        if reverted > 0 {
            warn!(language = rules.id, reverted, "some edits were reverted");
        }

        InstrumentedFile {
            source,
            summary: FileSummary {
                language: rules.id.to_string(),
                applied_edit_count: applied,
                reverted_edit_count: reverted,
                analysis_method: outcome.method,
                points_found: points.len(),
                truncated: outcome.truncated,
            },
            points,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline() -> Pipeline {
        Pipeline::new(Arc::new(InstrumentConfig::default())).unwrap()
    }

    struct TimedOut;

    impl AnalysisStrategy for TimedOut {
        fn method(&self) -> AnalysisMethod {
            AnalysisMethod::Query
        }

        fn run(&self, _ctx: &FileContext<'_>) -> Option<Result<StrategyOutcome, InstrumentError>> {
            Some(Err(InstrumentError::ParseTimeout(1)))
        }
    }

    struct Broken;

    impl AnalysisStrategy for Broken {
        fn method(&self) -> AnalysisMethod {
            AnalysisMethod::Query
        }

        fn run(&self, _ctx: &FileContext<'_>) -> Option<Result<StrategyOutcome, InstrumentError>> {
            Some(Err(InstrumentError::Io(std::io::Error::other("disk gone"))))
        }
    }

    #[test]
    fn test_hello_end_to_end() {
        let source = "def hello():\n    print(\"hi\")\n";
        let result = pipeline().instrument_source(source, "python").unwrap();

        let lines: Vec<_> = result.source.lines().collect();
        assert_eq!(lines[0], "import codegreen_runtime as _codegreen_rt");
        assert_eq!(lines[1], "def hello():");
        assert_eq!(
            lines[2],
            "    _codegreen_rt.checkpoint(\"function_enter_hello_1_1\", \"function_enter\", \"hello\", 1)"
        );
        assert_eq!(lines[3], "    print(\"hi\")");
        assert!(lines[4].starts_with("    _codegreen_rt.checkpoint(\"function_exit_hello_"));
        assert_eq!(lines.len(), 5);

        assert_eq!(result.summary.analysis_method, AnalysisMethod::Query);
        assert_eq!(result.summary.applied_edit_count, 3);
        assert_eq!(result.summary.reverted_edit_count, 0);
        assert_eq!(result.summary.points_found, 2);
        assert!(!result.summary.truncated);
    }

    #[test]
    fn test_analyze_leaves_source_alone() {
        let source = "def hello():\n    print(\"hi\")\n";
        let result = pipeline().analyze_source(source, "python").unwrap();
        assert_eq!(result.source, source);
        assert_eq!(result.summary.applied_edit_count, 0);
        let kinds: Vec<_> = result.points.iter().map(|p| p.kind).collect();
        assert_eq!(kinds, vec![PointKind::FunctionEnter, PointKind::FunctionExit]);
    }

    #[test]
    fn test_import_not_added_without_points() {
        let source = "x = 1\n";
        let result = pipeline().instrument_source(source, "python").unwrap();
        assert_eq!(result.source, source);
        assert_eq!(result.summary.points_found, 0);
    }

    #[test]
    fn test_unsupported_language() {
        assert!(matches!(
            pipeline().instrument_source("", "cobol"),
            Err(InstrumentError::UnsupportedLanguage(_))
        ));
    }

    #[test]
    fn test_file_too_large() {
        let config = InstrumentConfig {
            limits: crate::config::LimitsOverride {
                max_file_size_bytes: Some(4),
                ..Default::default()
            },
            ..Default::default()
        };
        let pipeline = Pipeline::new(Arc::new(config)).unwrap();
        assert!(matches!(
            pipeline.instrument_source("def f():\n    pass\n", "python"),
            Err(InstrumentError::FileTooLarge { limit: 4, .. })
        ));
    }

    #[test]
    fn test_parser_failure_falls_back_to_regex() {
        let pipeline = Pipeline::with_strategies(
            Arc::new(InstrumentConfig::default()),
            vec![Box::new(TimedOut), Box::new(RegexStrategy)],
        )
        .unwrap();
        let source = "def f():\n    return 1\n";
        let result = pipeline.instrument_source(source, "python").unwrap();
        assert_eq!(result.summary.analysis_method, AnalysisMethod::RegexFallback);
        assert_eq!(result.summary.applied_edit_count, 1);
        assert!(result.source.contains("_codegreen_rt.checkpoint(\"function_enter_f_1_1\""));
    }

    #[test]
    fn test_other_errors_fail_the_file() {
        let pipeline = Pipeline::with_strategies(
            Arc::new(InstrumentConfig::default()),
            vec![Box::new(Broken), Box::new(RegexStrategy)],
        )
        .unwrap();
        assert!(matches!(
            pipeline.instrument_source("def f():\n    pass\n", "python"),
            Err(InstrumentError::Io(_))
        ));
    }

    #[test]
    fn test_exhausted_chain_is_analysis_failure() {
        let pipeline = Pipeline::with_strategies(
            Arc::new(InstrumentConfig::default()),
            vec![Box::new(TimedOut)],
        )
        .unwrap();
        assert!(matches!(
            pipeline.instrument_source("def f():\n    pass\n", "python"),
            Err(InstrumentError::AnalysisFailed(_))
        ));
    }

    #[test]
    fn test_disabled_points_are_not_emitted() {
        let config = InstrumentConfig {
            enabled_points: vec![PointKind::FunctionEnter],
            insert_import: false,
            ..Default::default()
        };
        let pipeline = Pipeline::new(Arc::new(config)).unwrap();
        let source = "def f():\n    for i in x:\n        pass\n";
        let result = pipeline.instrument_source(source, "python").unwrap();
        assert_eq!(result.points.len(), 1);
        assert_eq!(result.summary.applied_edit_count, 1);
        assert!(!result.source.contains("import codegreen_runtime"));
    }
}
