//! End-to-end tests for the instrumentation pipeline.
//!
//! These run the real grammars over the fixtures in `testdata/`.

use std::path::PathBuf;
use std::sync::Arc;

use codegreen_instrument::analysis::PointKind;
use codegreen_instrument::cli::collect_files;
use codegreen_instrument::config::{self, InstrumentConfig};
use codegreen_instrument::pipeline::{AnalysisMethod, Pipeline, RegexStrategy};
use codegreen_instrument::rules;
use codegreen_instrument::syntax::{count_errors, new_parser};
use codegreen_instrument::{InstrumentError, InstrumentedFile};
use tempfile::TempDir;

fn testdata_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("testdata")
}

fn default_pipeline() -> Pipeline {
    Pipeline::new(Arc::new(InstrumentConfig::default())).expect("default rules should build")
}

fn instrument_fixture(name: &str) -> InstrumentedFile {
    default_pipeline()
        .instrument_file(&testdata_path().join(name), None)
        .expect("fixture should instrument")
}

fn parse_errors(language: &str, source: &str) -> usize {
    let rules = rules::base_rules(language).unwrap();
    let mut parser = new_parser(&rules.language, 0).unwrap();
    let tree = parser.parse(source, None).expect("parse should succeed");
    count_errors(&tree)
}

fn names_of(file: &InstrumentedFile, kind: PointKind) -> Vec<&str> {
    file.points
        .iter()
        .filter(|p| p.kind == kind)
        .map(|p| p.name.as_str())
        .collect()
}

#[test]
fn test_fixtures_stay_valid() {
    for (name, language) in [
        ("sample.py", "python"),
        ("sample.c", "c"),
        ("Sample.java", "java"),
        ("sample.js", "javascript"),
    ] {
        let original = std::fs::read_to_string(testdata_path().join(name)).unwrap();
        assert_eq!(parse_errors(language, &original), 0, "{} should parse cleanly", name);

        let result = instrument_fixture(name);
        assert_eq!(result.summary.language, language);
        assert_eq!(result.summary.analysis_method, AnalysisMethod::Query);
        assert!(result.summary.applied_edit_count > 0, "{} got no edits", name);
        assert_eq!(
            parse_errors(language, &result.source),
            0,
            "{} broke after instrumentation:\n{}",
            name,
            result.source
        );
    }
}

#[test]
fn test_python_points() {
    let result = instrument_fixture("sample.py");

    let mut entered = names_of(&result, PointKind::FunctionEnter);
    entered.sort();
    assert_eq!(entered, vec!["__init__", "report", "restock", "total"]);
    assert_eq!(names_of(&result, PointKind::ClassEnter), vec!["Inventory"]);
    assert!(names_of(&result, PointKind::ClassExit).is_empty());
    assert_eq!(names_of(&result, PointKind::LoopStart).len(), 2);

    // Both paths through restock return explicitly.
    let restock_exits: Vec<_> = result
        .points
        .iter()
        .filter(|p| p.kind == PointKind::FunctionExit && p.name == "restock")
        .collect();
    assert_eq!(restock_exits.len(), 2);
    assert!(restock_exits.iter().all(|p| p.subtype != "implicit"));

    // report falls off its end.
    assert!(result
        .points
        .iter()
        .any(|p| p.kind == PointKind::FunctionExit && p.name == "report" && p.subtype == "implicit"));
}

#[test]
fn test_python_import_follows_preamble() {
    let result = instrument_fixture("sample.py");
    let lines: Vec<_> = result.source.lines().collect();
    assert_eq!(lines[0], "\"\"\"Inventory helpers.\"\"\"");
    assert_eq!(lines[1], "from __future__ import annotations");
    assert_eq!(lines[2], "import codegreen_runtime as _codegreen_rt");
}

#[test]
fn test_one_enter_per_function() {
    let result = instrument_fixture("sample.py");
    let enters: Vec<_> = result
        .points
        .iter()
        .filter(|p| p.kind == PointKind::FunctionEnter)
        .collect();
    assert_eq!(enters.len(), 4);
    // The community definition capture outranks the built-in one.
    assert!(enters.iter().all(|p| p.priority == 1));

    let checkpoints = result
        .source
        .matches("\"function_enter\"")
        .count();
    assert_eq!(checkpoints, 4);
}

#[test]
fn test_c_points() {
    let result = instrument_fixture("sample.c");

    // The prototype is not a definition.
    let mut entered = names_of(&result, PointKind::FunctionEnter);
    entered.sort();
    assert_eq!(entered, vec!["log_value", "square", "sum"]);

    assert!(result.source.contains("#include <stdio.h>\n#include \"codegreen_runtime.h\"\n"));
    // The brace-less early return is wrapped in a block.
    assert!(result.source.contains("if (v < 0)\n        { "));
}

#[test]
fn test_java_points() {
    let result = instrument_fixture("Sample.java");

    assert_eq!(names_of(&result, PointKind::ClassEnter), vec!["Sample"]);
    assert!(result.source.contains("static {"));

    let exits: Vec<_> = result
        .points
        .iter()
        .filter(|p| p.kind == PointKind::FunctionExit && p.name == "fail")
        .collect();
    assert!(exits.iter().all(|p| p.subtype != "implicit"));
    assert_eq!(names_of(&result, PointKind::LoopStart).len(), 1);
}

#[test]
fn test_javascript_points() {
    let result = instrument_fixture("sample.js");

    let mut entered = names_of(&result, PointKind::FunctionEnter);
    entered.sort();
    assert_eq!(entered, vec!["greet", "increment"]);
    assert!(result.source.starts_with("'use strict';\n"));
}

#[test]
fn test_instrumentation_is_deterministic() {
    let pipeline = default_pipeline();
    let path = testdata_path().join("sample.py");
    let first = pipeline.instrument_file(&path, None).unwrap();
    let second = pipeline.instrument_file(&path, None).unwrap();
    assert_eq!(first.source, second.source);
    assert_eq!(first.points, second.points);
    assert_eq!(first.summary, second.summary);
}

#[test]
fn test_capture_cap_truncates() {
    let mut source = String::new();
    for i in 0..2000 {
        source.push_str(&format!("def f{}():\n    pass\n", i));
    }
    let result = default_pipeline().analyze_source(&source, "python").unwrap();
    assert!(result.summary.truncated);
    assert!(result.summary.points_found > 0);
}

#[test]
fn test_regex_strategy_instruments_entries() {
    let pipeline = Pipeline::with_strategies(
        Arc::new(InstrumentConfig::default()),
        vec![Box::new(RegexStrategy)],
    )
    .unwrap();
    let source = std::fs::read_to_string(testdata_path().join("sample.py")).unwrap();
    let result = pipeline.instrument_source(&source, "python").unwrap();

    assert_eq!(result.summary.analysis_method, AnalysisMethod::RegexFallback);
    assert!(result.points.iter().all(|p| p.priority == 3));
    assert!(result.source.contains("\"function_enter_restock_20_1\""));
    assert_eq!(parse_errors("python", &result.source), 0);
}

#[test]
fn test_config_file_templates() {
    let config = InstrumentConfig::parse_file(testdata_path().join("codegreen.yaml")).unwrap();
    config::validate(&config).unwrap();
    let pipeline = Pipeline::new(Arc::new(config)).unwrap();

    let result = pipeline
        .instrument_file(&testdata_path().join("sample.py"), None)
        .unwrap();
    assert!(result.source.contains("import probe\n"));
    assert!(result.source.contains("probe.enter('function_enter_total_13_5', 'total', 13)"));
    assert!(names_of(&result, PointKind::LoopStart).is_empty());
    assert!(names_of(&result, PointKind::ClassEnter).is_empty());
}

#[test]
fn test_collect_respects_excluded_paths() {
    let config = InstrumentConfig::parse_file(testdata_path().join("codegreen.yaml")).unwrap();
    let root = testdata_path().join("src");
    let files = collect_files(&root, &config).unwrap();
    let names: Vec<_> = files
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
        .collect();
    assert_eq!(names, vec!["add.c", "helper.py"]);

    let results = default_pipeline().process_files(&files, None, true);
    assert!(results.iter().all(|(_, r)| r.is_ok()));
}

#[test]
fn test_unsupported_inputs_fail_fast() {
    let dir = TempDir::new().unwrap();

    let binary = dir.path().join("blob.py");
    std::fs::write(&binary, [0x64, 0x65, 0x66, 0xff, 0xfe]).unwrap();
    assert!(matches!(
        default_pipeline().instrument_file(&binary, None),
        Err(InstrumentError::InvalidUtf8)
    ));

    let unknown = dir.path().join("notes.txt");
    std::fs::write(&unknown, "plain words\n").unwrap();
    assert!(matches!(
        default_pipeline().instrument_file(&unknown, None),
        Err(InstrumentError::UnsupportedLanguage(_))
    ));

    let big = dir.path().join("big.c");
    std::fs::write(&big, "int x;\n".repeat(16)).unwrap();
    let config = InstrumentConfig {
        limits: config::LimitsOverride {
            max_file_size_bytes: Some(32),
            ..Default::default()
        },
        ..Default::default()
    };
    let pipeline = Pipeline::new(Arc::new(config)).unwrap();
    assert!(matches!(
        pipeline.instrument_file(&big, None),
        Err(InstrumentError::FileTooLarge { limit: 32, .. })
    ));
}

#[test]
fn test_language_detected_from_content() {
    let dir = TempDir::new().unwrap();
    let script = dir.path().join("tool");
    std::fs::write(&script, "#!/usr/bin/env python3\ndef main():\n    pass\n").unwrap();

    let result = default_pipeline().instrument_file(&script, None).unwrap();
    assert_eq!(result.summary.language, "python");
    assert!(result.source.starts_with("#!/usr/bin/env python3\n"));
    assert_eq!(names_of(&result, PointKind::FunctionEnter), vec!["main"]);
}
