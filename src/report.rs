//! Output formatting for instrumentation results.
//!
//! Supports two output formats:
//! - Pretty: colored terminal output for human readability
//! - JSON: structured output for programmatic consumption

use colored::*;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::InstrumentError;
use crate::pipeline::{AnalysisMethod, InstrumentedFile, PointRecord};

/// Per-file outcome as produced by [`crate::pipeline::Pipeline::process_files`].
pub type FileResult = (PathBuf, Result<InstrumentedFile, InstrumentError>);

// =============================================================================
// JSON Format
// =============================================================================

#[derive(Serialize, Deserialize)]
pub struct JsonReport {
    pub version: String,
    pub path: String,
    pub command: String,
    pub files: Vec<JsonFile>,
    pub totals: Totals,
}

#[derive(Serialize, Deserialize)]
pub struct JsonFile {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_method: Option<String>,
    #[serde(default)]
    pub applied_edit_count: usize,
    #[serde(default)]
    pub reverted_edit_count: usize,
    #[serde(default)]
    pub points_found: usize,
    #[serde(default)]
    pub truncated: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub points: Vec<JsonPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct JsonPoint {
    pub id: String,
    pub kind: String,
    pub subtype: String,
    pub name: String,
    pub line: usize,
    pub column: usize,
    pub priority: u32,
}

/// Counters over a whole run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub files: usize,
    pub failed: usize,
    pub points_found: usize,
    pub applied_edit_count: usize,
    pub reverted_edit_count: usize,
    pub truncated_files: usize,
    pub fallback_files: usize,
}

impl Totals {
    pub fn from_results(results: &[FileResult]) -> Self {
        let mut totals = Totals {
            files: results.len(),
            ..Default::default()
        };
        for (_, result) in results {
            match result {
                Ok(file) => {
                    let s = &file.summary;
                    totals.points_found += s.points_found;
                    totals.applied_edit_count += s.applied_edit_count;
                    totals.reverted_edit_count += s.reverted_edit_count;
                    if s.truncated {
                        totals.truncated_files += 1;
                    }
                    if s.analysis_method == AnalysisMethod::RegexFallback {
                        totals.fallback_files += 1;
                    }
                }
                Err(_) => totals.failed += 1,
            }
        }
        totals
    }
}

fn point_to_json(p: &PointRecord) -> JsonPoint {
    JsonPoint {
        id: p.id.clone(),
        kind: p.kind.as_str().to_string(),
        subtype: p.subtype.clone(),
        name: p.name.clone(),
        line: p.line,
        column: p.column,
        priority: p.priority,
    }
}

fn file_to_json(path: &Path, base: &Path, result: &Result<InstrumentedFile, InstrumentError>, with_points: bool) -> JsonFile {
    let path = make_relative_path(path, base);
    match result {
        Ok(file) => JsonFile {
            path,
            language: Some(file.summary.language.clone()),
            analysis_method: Some(file.summary.analysis_method.as_str().to_string()),
            applied_edit_count: file.summary.applied_edit_count,
            reverted_edit_count: file.summary.reverted_edit_count,
            points_found: file.summary.points_found,
            truncated: file.summary.truncated,
            points: if with_points {
                file.points.iter().map(point_to_json).collect()
            } else {
                Vec::new()
            },
            error: None,
        },
        Err(e) => JsonFile {
            path,
            language: None,
            analysis_method: None,
            applied_edit_count: 0,
            reverted_edit_count: 0,
            points_found: 0,
            truncated: false,
            points: Vec::new(),
            error: Some(e.to_string()),
        },
    }
}

/// Build the JSON report for a run. Points are listed for `analyze` only.
pub fn build_json(command: &str, base: &Path, results: &[FileResult]) -> JsonReport {
    let with_points = command == "analyze";
    JsonReport {
        version: env!("CARGO_PKG_VERSION").to_string(),
        path: base.display().to_string(),
        command: command.to_string(),
        files: results
            .iter()
            .map(|(path, result)| file_to_json(path, base, result, with_points))
            .collect(),
        totals: Totals::from_results(results),
    }
}

pub fn write_json<W: Write>(out: &mut W, report: &JsonReport) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    writeln!(out, "{}", json)?;
    Ok(())
}

fn make_relative_path(file: &Path, base: &Path) -> String {
    let base_dir = if base.is_file() {
        base.parent().unwrap_or(base)
    } else {
        base
    };
    match file.strip_prefix(base_dir) {
        Ok(rel) if !rel.as_os_str().is_empty() => rel.display().to_string(),
        _ => file.display().to_string(),
    }
}

// =============================================================================
// Pretty Format
// =============================================================================

/// Write results in pretty (human-readable) format.
pub fn write_pretty<W: Write>(
    out: &mut W,
    command: &str,
    base: &Path,
    results: &[FileResult],
) -> io::Result<()> {
    writeln!(out)?;
    writeln!(
        out,
        "  {} v{}",
        "codegreen-instrument".cyan().bold(),
        env!("CARGO_PKG_VERSION")
    )?;
    writeln!(out)?;
    writeln!(out, "  {}{}", "Path: ".dimmed(), base.display())?;
    writeln!(out)?;

    for (path, result) in results {
        let rel = make_relative_path(path, base);
        match result {
            Ok(file) => {
                write_file_line(out, &rel, file)?;
                if command == "analyze" {
                    for point in &file.points {
                        write_point(out, point)?;
                    }
                }
            }
            Err(e) => {
                writeln!(out, "  {} {}", "✗".red(), rel.blue())?;
                writeln!(out, "      {}", e.to_string().red())?;
            }
        }
    }
    writeln!(out)?;

    write_totals(out, &Totals::from_results(results))?;
    writeln!(out)
}

/// One summary line for a single processed file.
pub fn write_file_line<W: Write>(out: &mut W, path: &str, file: &InstrumentedFile) -> io::Result<()> {
    let s = &file.summary;
    let mark = if s.reverted_edit_count > 0 {
        "!".yellow()
    } else {
        "✓".green()
    };
    write!(out, "  {} {}", mark, path.blue())?;
    write!(out, "  {}", format!("[{}]", s.language).dimmed())?;
    write!(
        out,
        "  points: {}  applied: {}",
        s.points_found, s.applied_edit_count
    )?;
    if s.reverted_edit_count > 0 {
        write!(out, "  reverted: {}", s.reverted_edit_count.to_string().yellow())?;
    }
    if s.analysis_method == AnalysisMethod::RegexFallback {
        write!(out, "  {}", "(regex fallback)".yellow())?;
    }
    if s.truncated {
        write!(out, "  {}", "(truncated)".yellow())?;
    }
    writeln!(out)
}

fn write_point<W: Write>(out: &mut W, point: &PointRecord) -> io::Result<()> {
    writeln!(
        out,
        "      {:<16} {:<24} {}",
        point.kind.as_str().dimmed(),
        point.name,
        format!("{}:{}", point.line, point.column).dimmed()
    )
}

fn write_totals<W: Write>(out: &mut W, totals: &Totals) -> io::Result<()> {
    write!(
        out,
        "  {} files, {} points, {} edits applied",
        totals.files, totals.points_found, totals.applied_edit_count
    )?;
    if totals.reverted_edit_count > 0 {
        write!(
            out,
            ", {}",
            format!("{} reverted", totals.reverted_edit_count).yellow()
        )?;
    }
    if totals.failed > 0 {
        write!(out, ", {}", format!("{} failed", totals.failed).red())?;
    } else {
        write!(out, "  {}", "OK".green())?;
    }
    writeln!(out)
}
