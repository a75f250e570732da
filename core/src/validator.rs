//! Static code screener: parses a candidate program once and classifies
//! imports, calls, and suspicious textual patterns into a [`ValidationReport`].

use std::sync::LazyLock;

use regex_lite::Regex;
use tree_sitter::{Node, Parser, Tree};
use tree_sitter_python::LANGUAGE as PYTHON;

use crate::error::{Result, ValidationErr};
use crate::model::ValidationReport;

const BLOCKED_IMPORTS: &[&str] = &[
    "os",
    "sys",
    "subprocess",
    "socket",
    "shutil",
    "ctypes",
    "importlib",
    "multiprocessing",
    "threading",
    "signal",
    "pty",
    "pickle",
    "marshal",
    "tempfile",
    "http",
    "urllib",
    "requests",
    "telnetlib",
    "ftplib",
    "smtplib",
];

const BLOCKED_CALLS: &[&str] =
    &["eval", "exec", "compile", "__import__", "open", "input", "raw_input", "execfile", "reload"];

const SAFE_DUNDERS: &[&str] = &["__init__", "__main__", "__name__", "__file__"];

const FILE_OP_SUFFIXES: &[&str] = &["open", "write_text", "write_bytes", "read_text", "read_bytes"];

fn compile_static(pattern: &str) -> Regex {
    match Regex::new(pattern) {
        Ok(regex) => regex,
        Err(err) => unreachable!("static pattern {pattern:?} must compile: {err}"),
    }
}

static DUNDER_PATTERN: LazyLock<Regex> = LazyLock::new(|| compile_static(r"__\w+__"));
static REFLECTIVE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| compile_static(r"\b(getattr|setattr|delattr)\b"));
static SCOPE_DUMP_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| compile_static(r"\b(globals|locals|vars|dir)\("));

pub fn validate(source: &str) -> Result<ValidationReport> {
    let tree = match parse(source) {
        Some(tree) => tree,
        None => {
            let report = ValidationReport::parse_failure("could not parse source as Python".to_string());
            tracing::warn!(risk_level = ?report.risk_level, "screener could not parse candidate program");
            return Ok(report);
        }
    };
    if tree.root_node().has_error() {
        let report = ValidationReport::parse_failure("source contains one or more syntax errors".to_string());
        tracing::warn!(risk_level = ?report.risk_level, "screener found syntax errors in candidate program");
        return Ok(report);
    }

    let mut violations = Vec::new();
    let mut warnings = Vec::new();

    walk(tree.root_node(), source, &mut violations, &mut warnings);
    warnings.extend(scan_patterns(source));

    let report = ValidationReport::new(violations, warnings);
    tracing::info!(
        risk_level = ?report.risk_level,
        safe = report.safe,
        violation_count = report.violations.len(),
        warning_count = report.warnings.len(),
        "screener verdict"
    );
    Ok(report)
}

fn parse(source: &str) -> Option<Tree> {
    let lang = PYTHON.into();
    let mut parser = Parser::new();
    parser.set_language(&lang).map_err(|e| ValidationErr::Parse(e.to_string())).ok()?;
    let old_tree: Option<&Tree> = None;
    parser.parse(source, old_tree)
}

fn walk(node: Node, source: &str, violations: &mut Vec<String>, warnings: &mut Vec<String>) {
    match node.kind() {
        "import_statement" => check_import(node, source, violations),
        "import_from_statement" => check_import_from(node, source, violations),
        "call" => check_call(node, source, violations, warnings),
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk(child, source, violations, warnings);
    }
}

fn node_text<'a>(node: Node, source: &'a str) -> &'a str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

fn top_level_module(dotted_name: &str) -> &str {
    dotted_name.split('.').next().unwrap_or(dotted_name)
}

fn check_import(node: Node, source: &str, violations: &mut Vec<String>) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if matches!(child.kind(), "dotted_name" | "aliased_import") {
            let name_node = if child.kind() == "aliased_import" {
                child.child(0).unwrap_or(child)
            } else {
                child
            };
            let full_name = node_text(name_node, source);
            if BLOCKED_IMPORTS.contains(&top_level_module(full_name)) {
                violations.push(format!("Blocked import: {full_name}"));
            }
        }
    }
}

fn check_import_from(node: Node, source: &str, violations: &mut Vec<String>) {
    if let Some(module_node) = node.child_by_field_name("module_name") {
        let module = node_text(module_node, source);
        if BLOCKED_IMPORTS.contains(&top_level_module(module)) {
            violations.push(format!("Blocked import from: {module}"));
        }
    }
}

fn check_call(node: Node, source: &str, violations: &mut Vec<String>, warnings: &mut Vec<String>) {
    let Some(func_node) = node.child_by_field_name("function") else { return };
    let callee = match func_node.kind() {
        "identifier" => node_text(func_node, source),
        "attribute" => {
            let Some(attr) = func_node.child_by_field_name("attribute") else { return };
            node_text(attr, source)
        }
        _ => return,
    };

    if BLOCKED_CALLS.contains(&callee) {
        violations.push(format!("Blocked function call: {callee}()"));
    } else if FILE_OP_SUFFIXES.contains(&callee) && func_node.kind() == "attribute" {
        warnings.push(format!("file operation: Path.{callee}()"));
    }
}

fn scan_patterns(source: &str) -> Vec<String> {
    let mut warnings = Vec::new();

    let dunder_matches: Vec<&str> = DUNDER_PATTERN
        .find_iter(source)
        .map(|m| m.as_str())
        .filter(|m| !SAFE_DUNDERS.contains(m))
        .collect();
    if !dunder_matches.is_empty() {
        warnings.push(format!(
            "suspicious pattern: dunder names (matches: {:?})",
            &dunder_matches[..dunder_matches.len().min(3)]
        ));
    }

    if REFLECTIVE_PATTERN.is_match(source) {
        warnings.push("suspicious pattern: reflective attribute access".to_string());
    }
    if SCOPE_DUMP_PATTERN.is_match(source) {
        warnings.push("suspicious pattern: scope introspection".to_string());
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RiskLevel;

    #[test]
    fn safe_pandas_program_is_safe() {
        let report = validate("import pandas as pd\ndf = pd.DataFrame({'a': [1]})\nprint(df.mean())")
            .expect("validate");
        assert!(report.safe);
        assert_eq!(report.risk_level, RiskLevel::Safe);
    }

    #[test]
    fn rejects_exec_call() {
        let report = validate("exec(\"print(1)\")").expect("validate");
        assert!(!report.safe);
        assert_eq!(report.risk_level, RiskLevel::Critical);
        assert!(report.violations.iter().any(|v| v.contains("exec")));
    }

    #[test]
    fn rejects_os_import() {
        let report = validate("import os\nos.system(\"id\")").expect("validate");
        assert!(!report.safe);
        assert!(report.violations.iter().any(|v| v == "Blocked import: os"));
    }

    #[test]
    fn rejects_import_from_subprocess() {
        let report = validate("from subprocess import call\ncall(['ls'])").expect("validate");
        assert!(report.violations.iter().any(|v| v.contains("subprocess")));
    }

    #[test]
    fn syntax_error_is_critical() {
        let report = validate("def f(:\n").expect("validate");
        assert!(!report.safe);
        assert_eq!(report.risk_level, RiskLevel::Critical);
    }

    #[test]
    fn getattr_is_a_warning_not_a_violation() {
        let report = validate("x = getattr(obj, 'attr')").expect("validate");
        assert!(report.violations.is_empty());
        assert!(!report.warnings.is_empty());
    }

    #[test]
    fn validating_twice_is_equal() {
        let source = "import json\nprint(json.dumps({}))";
        let first = validate(source).expect("validate");
        let second = validate(source).expect("validate");
        assert_eq!(first.risk_level, second.risk_level);
        assert_eq!(first.violations, second.violations);
        assert_eq!(first.warnings, second.warnings);
    }
}
