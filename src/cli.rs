//! Command-line interface for codegreen-instrument.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::config::{self, InstrumentConfig};
use crate::pipeline::Pipeline;
use crate::report::{self, FileResult};
use crate::rules;

/// Exit codes.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_ERROR: i32 = 2;

/// Directory names never descended into.
const SKIPPED_DIRS: &[&str] = &["vendor", "node_modules", "target", "build", "dist", "__pycache__"];

/// Insert energy checkpoint calls into source code.
///
/// Functions, methods, classes and loops are located with tree-sitter
/// queries and a checkpoint call is inserted at each entry and exit, keeping
/// the file syntactically valid.
#[derive(Parser)]
#[command(name = "codegreen-instrument")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Instrument a file or directory
    Instrument(InstrumentArgs),
    /// Report instrumentation points without rewriting
    Analyze(AnalyzeArgs),
    /// List supported languages
    Languages,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Pretty,
    Json,
}

/// Arguments shared by `instrument` and `analyze`.
#[derive(Parser)]
pub struct InputArgs {
    /// Path to process (file or directory)
    pub path: PathBuf,

    /// Path to config YAML file (default: auto-discover)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Language id, overriding detection
    #[arg(short, long)]
    pub language: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "pretty")]
    pub format: Format,
}

#[derive(Parser)]
pub struct InstrumentArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Write instrumented files under this directory, mirroring the input tree
    #[arg(short, long, conflicts_with = "in_place")]
    pub output_dir: Option<PathBuf>,

    /// Overwrite input files
    #[arg(long)]
    pub in_place: bool,
}

#[derive(Parser)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub input: InputArgs,
}

/// Load, validate and snapshot the configuration.
fn load_config(explicit: Option<&Path>) -> anyhow::Result<Arc<InstrumentConfig>> {
    let (config, source) = InstrumentConfig::discover(explicit)?;
    match &source {
        Some(path) => info!(path = %path.display(), "loaded config"),
        None => info!("using built-in defaults"),
    }
    config::validate(&config).context("invalid configuration")?;
    Ok(Arc::new(config))
}

/// Collect supported source files under `root`.
pub fn collect_files(root: &Path, config: &InstrumentConfig) -> anyhow::Result<Vec<PathBuf>> {
    let excluded = config.excluded_matcher()?;
    let mut files = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            if e.depth() == 0 || !e.file_type().is_dir() {
                return true;
            }
            let name = e.file_name().to_string_lossy();
            !name.starts_with('.') && !SKIPPED_DIRS.contains(&name.as_ref())
        })
    {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let rel = path.strip_prefix(root).unwrap_or(path);
        if excluded.is_match(rel) {
            continue;
        }
        let supported = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(rules::language_for_extension)
            .is_some();
        if supported {
            files.push(path.to_path_buf());
        }
    }

    Ok(files)
}

fn new_progress(total: usize) -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .context("Failed to set progress style")?
            .progress_chars("=> "),
    );
    Ok(pb)
}

/// Process every file under a directory with a progress bar.
fn process_dir(
    pipeline: &Pipeline,
    root: &Path,
    language: Option<&str>,
    rewrite: bool,
) -> anyhow::Result<Vec<FileResult>> {
    let files = collect_files(root, pipeline.config())?;
    if files.is_empty() {
        warn!(path = %root.display(), "no supported files found");
    }

    let pb = new_progress(files.len())?;
    let results = pipeline.process_files_with(&files, language, rewrite, |path| {
        if let Some(name) = path.file_name() {
            pb.set_message(name.to_string_lossy().to_string());
        }
        pb.inc(1);
    });
    pb.finish_and_clear();
    Ok(results)
}

fn write_report<W: Write>(
    out: &mut W,
    format: Format,
    command: &str,
    base: &Path,
    results: &[FileResult],
) -> anyhow::Result<()> {
    match format {
        Format::Json => report::write_json(out, &report::build_json(command, base, results)),
        Format::Pretty => Ok(report::write_pretty(out, command, base, results)?),
    }
}

fn exit_code(results: &[FileResult]) -> i32 {
    if results.iter().any(|(_, r)| r.is_err()) {
        EXIT_FAILED
    } else {
        EXIT_SUCCESS
    }
}

/// Write instrumented sources to their destinations.
fn write_outputs(
    results: &[FileResult],
    root: &Path,
    output_dir: Option<&Path>,
    in_place: bool,
) -> anyhow::Result<usize> {
    let mut written = 0;
    for (path, result) in results {
        let Ok(file) = result else { continue };
        let dest = match output_dir {
            Some(dir) => {
                let rel = if root.is_file() {
                    Path::new(path.file_name().unwrap_or(path.as_os_str()))
                } else {
                    path.strip_prefix(root).unwrap_or(path.as_path())
                };
                dir.join(rel)
            }
            None if in_place => {
                if file.summary.applied_edit_count == 0 {
                    continue;
                }
                path.clone()
            }
            None => continue,
        };
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        std::fs::write(&dest, &file.source)
            .with_context(|| format!("failed to write {}", dest.display()))?;
        written += 1;
    }
    Ok(written)
}

/// Single file with no destination: instrumented source to stdout, summary to stderr.
///
/// On failure the original source is echoed so the caller's build never
/// loses the file.
fn instrument_to_stdout(
    pipeline: &Pipeline,
    path: &Path,
    args: &InstrumentArgs,
) -> anyhow::Result<i32> {
    let result = pipeline.instrument_file(path, args.input.language.as_deref());
    let mut stdout = io::stdout().lock();

    match &result {
        Ok(file) => stdout.write_all(file.source.as_bytes())?,
        Err(e) => {
            eprintln!("Error: {}: {}", path.display(), e);
            if let Ok(original) = std::fs::read(path) {
                stdout.write_all(&original)?;
            }
        }
    }
    stdout.flush()?;

    let results = vec![(path.to_path_buf(), result)];
    let mut stderr = io::stderr().lock();
    match (&results[0].1, args.input.format) {
        (Ok(file), Format::Pretty) => {
            let name = path.display().to_string();
            report::write_file_line(&mut stderr, &name, file)?;
        }
        (_, Format::Json) => write_report(&mut stderr, Format::Json, "instrument", path, &results)?,
        (Err(_), Format::Pretty) => {}
    }

    Ok(exit_code(&results))
}

/// Run the instrument command.
pub fn run_instrument(args: &InstrumentArgs) -> anyhow::Result<i32> {
    let config = load_config(args.input.config.as_deref())?;
    let pipeline = Pipeline::new(config).context("failed to prepare language rules")?;

    let path = &args.input.path;
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("cannot access path {}", path.display()))?;
    let language = args.input.language.as_deref();

    if metadata.is_file() && args.output_dir.is_none() && !args.in_place {
        return instrument_to_stdout(&pipeline, path, args);
    }

    let results = if metadata.is_dir() {
        process_dir(&pipeline, path, language, true)?
    } else {
        vec![(path.clone(), pipeline.instrument_file(path, language))]
    };

    if args.output_dir.is_none() && !args.in_place {
        warn!("no --output-dir or --in-place given, nothing written");
    }
    let written = write_outputs(&results, path, args.output_dir.as_deref(), args.in_place)?;
    info!(written, "instrumented files written");

    write_report(&mut io::stdout().lock(), args.input.format, "instrument", path, &results)?;
    Ok(exit_code(&results))
}

/// Run the analyze command.
pub fn run_analyze(args: &AnalyzeArgs) -> anyhow::Result<i32> {
    let config = load_config(args.input.config.as_deref())?;
    let pipeline = Pipeline::new(config).context("failed to prepare language rules")?;

    let path = &args.input.path;
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("cannot access path {}", path.display()))?;
    let language = args.input.language.as_deref();

    let results = if metadata.is_dir() {
        process_dir(&pipeline, path, language, false)?
    } else {
        vec![(path.clone(), pipeline.analyze_file(path, language))]
    };

    write_report(&mut io::stdout().lock(), args.input.format, "analyze", path, &results)?;
    Ok(exit_code(&results))
}

/// Run the languages command.
pub fn run_languages() -> anyhow::Result<i32> {
    println!("Supported languages:");
    println!();
    for id in rules::SUPPORTED_LANGUAGES {
        let extensions = rules::base_rules(id)
            .map(|r| {
                r.extensions
                    .iter()
                    .map(|e| format!(".{}", e))
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .unwrap_or_default();
        println!("  {:<12} {}", id, extensions);
    }
    Ok(EXIT_SUCCESS)
}
