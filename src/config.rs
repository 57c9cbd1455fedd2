//! Configuration schema for codegreen-instrument.
//!
//! Configuration is optional. Every field has a default, and per-language
//! sections override the built-in rules of that language only.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use directories::ProjectDirs;
use tracing::debug;

use crate::analysis::PointKind;
use crate::error::InstrumentError;
use crate::rules::{self, LanguageRules, Limits};

/// File names searched for in the working directory.
pub const CONFIG_FILE_NAMES: &[&str] = &["codegreen.yaml", ".codegreen.yaml"];

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InstrumentConfig {
    #[serde(default)]
    pub version: String,
    /// Point kinds to emit. Defaults to every kind except `class_exit`.
    #[serde(default = "default_enabled_points")]
    pub enabled_points: Vec<PointKind>,
    /// Insert the runtime import/include when a file gets checkpoints (default: true)
    #[serde(default = "default_true")]
    pub insert_import: bool,
    /// Overrides applied to every language's limits
    #[serde(default)]
    pub limits: LimitsOverride,
    /// Glob patterns for paths to skip when walking directories
    #[serde(default)]
    pub excluded_paths: Vec<String>,
    /// Directory of `<language>/<query>.scm` overrides for community queries
    #[serde(default)]
    pub query_dir: Option<PathBuf>,
    #[serde(default)]
    pub languages: BTreeMap<String, LanguageOverride>,
}

fn default_true() -> bool {
    true
}

fn default_enabled_points() -> Vec<PointKind> {
    PointKind::all()
        .iter()
        .copied()
        .filter(|k| *k != PointKind::ClassExit)
        .collect()
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            version: String::new(),
            enabled_points: default_enabled_points(),
            insert_import: true,
            limits: LimitsOverride::default(),
            excluded_paths: Vec::new(),
            query_dir: None,
            languages: BTreeMap::new(),
        }
    }
}

/// Partial [`Limits`]; unset fields keep the underlying value.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LimitsOverride {
    #[serde(default)]
    pub max_captures_per_query: Option<usize>,
    #[serde(default)]
    pub max_file_size_bytes: Option<u64>,
    #[serde(default)]
    pub max_identifier_length: Option<usize>,
    #[serde(default)]
    pub parser_timeout_ms: Option<u64>,
    #[serde(default)]
    pub max_lines_for_fallback: Option<usize>,
}

impl LimitsOverride {
    pub fn apply(&self, limits: &mut Limits) {
        if let Some(v) = self.max_captures_per_query {
            limits.max_captures_per_query = v;
        }
        if let Some(v) = self.max_file_size_bytes {
            limits.max_file_size_bytes = v;
        }
        if let Some(v) = self.max_identifier_length {
            limits.max_identifier_length = v;
        }
        if let Some(v) = self.parser_timeout_ms {
            limits.parser_timeout_ms = v;
        }
        if let Some(v) = self.max_lines_for_fallback {
            limits.max_lines_for_fallback = v;
        }
    }

    fn zero_fields(&self) -> Vec<&'static str> {
        let mut zero = Vec::new();
        if self.max_captures_per_query == Some(0) {
            zero.push("max_captures_per_query");
        }
        if self.max_file_size_bytes == Some(0) {
            zero.push("max_file_size_bytes");
        }
        if self.max_identifier_length == Some(0) {
            zero.push("max_identifier_length");
        }
        if self.parser_timeout_ms == Some(0) {
            zero.push("parser_timeout_ms");
        }
        if self.max_lines_for_fallback == Some(0) {
            zero.push("max_lines_for_fallback");
        }
        zero
    }
}

/// Per-language overrides.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LanguageOverride {
    /// Checkpoint templates by point kind
    #[serde(default)]
    pub templates: BTreeMap<PointKind, String>,
    /// Runtime import; an empty string disables it
    #[serde(default)]
    pub import_statement: Option<String>,
    #[serde(default)]
    pub statement_terminator: Option<String>,
    #[serde(default)]
    pub comment_prefix: Option<String>,
    #[serde(default)]
    pub limits: LimitsOverride,
    #[serde(default)]
    pub emit_class_exit: Option<bool>,
}

impl InstrumentConfig {
    /// Parse a configuration from a YAML file.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: InstrumentConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        Ok(config)
    }

    /// Load the configuration: `explicit` if given, then the working
    /// directory, then the user config directory, then built-in defaults.
    ///
    /// Returns the config and the file it came from.
    pub fn discover(explicit: Option<&Path>) -> anyhow::Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            return Ok((Self::parse_file(path)?, Some(path.to_path_buf())));
        }

        let user_config = ProjectDirs::from("", "", "codegreen")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAMES[0]));
        let candidates = CONFIG_FILE_NAMES
            .iter()
            .map(PathBuf::from)
            .chain(user_config);

        for path in candidates {
            if path.is_file() {
                debug!(path = %path.display(), "using config file");
                return Ok((Self::parse_file(&path)?, Some(path)));
            }
        }
        Ok((Self::default(), None))
    }

    pub fn is_enabled(&self, kind: PointKind) -> bool {
        self.enabled_points.contains(&kind)
    }

    /// Built-in rules of `language` with this configuration applied.
    pub fn rules_for(&self, language: &str) -> Result<LanguageRules, InstrumentError> {
        let base = rules::base_rules(language)
            .ok_or_else(|| InstrumentError::UnsupportedLanguage(language.to_string()))?;
        let mut rules = base.clone();
        self.limits.apply(&mut rules.limits);

        if let Some(overrides) = self.languages.get(language) {
            for (kind, template) in &overrides.templates {
                rules.templates.checkpoints.insert(*kind, template.clone());
            }
            if let Some(import) = &overrides.import_statement {
                rules.templates.import_statement = if import.trim().is_empty() {
                    None
                } else {
                    Some(import.clone())
                };
            }
            if let Some(terminator) = &overrides.statement_terminator {
                rules.templates.statement_terminator = terminator.clone();
            }
            if let Some(prefix) = &overrides.comment_prefix {
                rules.templates.comment_prefix = prefix.clone();
            }
            overrides.limits.apply(&mut rules.limits);
            if let Some(emit) = overrides.emit_class_exit {
                rules.emit_class_exit = emit;
            }
        }
        if self.is_enabled(PointKind::ClassExit) {
            rules.emit_class_exit = true;
        }
        Ok(rules)
    }

    /// Check if a path should be excluded based on excluded_paths patterns.
    pub fn is_path_excluded(&self, path: &Path) -> bool {
        if self.excluded_paths.is_empty() {
            return false;
        }
        match self.excluded_matcher() {
            Ok(set) => set.is_match(path),
            Err(_) => false,
        }
    }

    /// Compile `excluded_paths` into one matcher.
    pub fn excluded_matcher(&self) -> anyhow::Result<globset::GlobSet> {
        let mut builder = globset::GlobSetBuilder::new();
        for pattern in &self.excluded_paths {
            let glob = globset::Glob::new(pattern)
                .map_err(|e| anyhow::anyhow!("invalid excluded_paths pattern {:?}: {}", pattern, e))?;
            builder.add(glob);
        }
        Ok(builder.build()?)
    }
}

/// Validate a configuration for correctness.
pub fn validate(config: &InstrumentConfig) -> anyhow::Result<()> {
    config.excluded_matcher()?;

    if let Some(field) = config.limits.zero_fields().first() {
        anyhow::bail!("limits.{} must be greater than zero", field);
    }

    for (language, overrides) in &config.languages {
        if rules::base_rules(language).is_none() {
            anyhow::bail!(
                "unknown language {:?} in languages section (supported: {})",
                language,
                rules::SUPPORTED_LANGUAGES.join(", ")
            );
        }
        for (kind, template) in &overrides.templates {
            if !template.contains("{checkpoint_id}") {
                anyhow::bail!(
                    "template for {}.{} must contain {{checkpoint_id}}",
                    language,
                    kind
                );
            }
        }
        if let Some(field) = overrides.limits.zero_fields().first() {
            anyhow::bail!("languages.{}.limits.{} must be greater than zero", language, field);
        }
    }

    if let Some(dir) = &config.query_dir {
        if !dir.is_dir() {
            anyhow::bail!("query_dir {} is not a directory", dir.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let yaml = r#"
version: "1"
enabled_points: [function_enter, function_exit]
insert_import: false
limits:
  max_captures_per_query: 10
excluded_paths:
  - "**/generated/**"
languages:
  python:
    templates:
      function_enter: "probe('{checkpoint_id}')"
    import_statement: "import probe"
    limits:
      parser_timeout_ms: 500
"#;
        let config: InstrumentConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.enabled_points.len(), 2);
        assert!(!config.insert_import);
        assert!(validate(&config).is_ok());

        let rules = config.rules_for("python").unwrap();
        assert_eq!(rules.limits.max_captures_per_query, 10);
        assert_eq!(rules.limits.parser_timeout_ms, 500);
        assert_eq!(
            rules.templates.get(PointKind::FunctionEnter),
            Some("probe('{checkpoint_id}')")
        );
        assert_eq!(rules.templates.import_statement.as_deref(), Some("import probe"));

        let c_rules = config.rules_for("c").unwrap();
        assert_eq!(c_rules.limits.parser_timeout_ms, 30_000);
    }

    #[test]
    fn test_defaults() {
        let config: InstrumentConfig = serde_yaml::from_str("{}").unwrap();
        assert!(config.insert_import);
        assert!(config.is_enabled(PointKind::FunctionEnter));
        assert!(config.is_enabled(PointKind::LoopExit));
        assert!(!config.is_enabled(PointKind::ClassExit));
        assert!(!config.rules_for("java").unwrap().emit_class_exit);
    }

    #[test]
    fn test_class_exit_opt_in() {
        let config: InstrumentConfig =
            serde_yaml::from_str("languages:\n  python:\n    emit_class_exit: true\n").unwrap();
        assert!(config.rules_for("python").unwrap().emit_class_exit);
        assert!(!config.rules_for("java").unwrap().emit_class_exit);
    }

    #[test]
    fn test_unknown_language() {
        let config = InstrumentConfig::default();
        assert!(matches!(
            config.rules_for("cobol"),
            Err(InstrumentError::UnsupportedLanguage(_))
        ));

        let bad: InstrumentConfig =
            serde_yaml::from_str("languages:\n  cobol:\n    comment_prefix: '*'\n").unwrap();
        assert!(validate(&bad).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let no_id: InstrumentConfig = serde_yaml::from_str(
            "languages:\n  c:\n    templates:\n      function_enter: \"probe()\"\n",
        )
        .unwrap();
        assert!(validate(&no_id).is_err());

        let zero: InstrumentConfig =
            serde_yaml::from_str("limits:\n  max_captures_per_query: 0\n").unwrap();
        assert!(validate(&zero).is_err());

        let glob: InstrumentConfig =
            serde_yaml::from_str("excluded_paths: [\"a/[b\"]\n").unwrap();
        assert!(validate(&glob).is_err());
    }

    #[test]
    fn test_is_path_excluded() {
        let config = InstrumentConfig {
            excluded_paths: vec!["**/vendor/**".to_string(), "*.min.js".to_string()],
            ..Default::default()
        };
        assert!(config.is_path_excluded(Path::new("src/vendor/lib.c")));
        assert!(config.is_path_excluded(Path::new("app.min.js")));
        assert!(!config.is_path_excluded(Path::new("src/main.c")));
    }
}
