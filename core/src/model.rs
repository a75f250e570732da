//! Data model shared by every stage of the analysis pipeline.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Semantic tag assigned to a column of the input table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Numeric,
    Temporal,
    Categorical,
    Other,
}

/// Summary statistics for one numeric column, mirroring a `describe()` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericSummary {
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

/// Description of the input table handed to the LLM. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataContext {
    pub columns: Vec<(String, ColumnType)>,
    pub row_count: usize,
    pub column_count: usize,
    /// First N rows rendered as text, truncated to keep the prompt small.
    pub preview: String,
    pub numeric_summaries: BTreeMap<String, NumericSummary>,
}

impl DataContext {
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }
}

/// A textual source artifact synthesized by the LLM for the sandbox image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedProgram {
    pub source: String,
    /// Hex-encoded SHA-256 of `source`, used for log correlation and as an
    /// optional cache key.
    pub fingerprint: String,
}

impl GeneratedProgram {
    pub fn new(source: String) -> Self {
        let fingerprint = fingerprint_source(&source);
        Self { source, fingerprint }
    }
}

fn fingerprint_source(source: &str) -> String {
    use std::fmt::Write as _;

    // FNV-1a keeps this dependency-free; the fingerprint is a correlation
    // token, not a security boundary (that's the screener's job).
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in source.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    let mut out = String::with_capacity(16);
    let _ = write!(out, "{hash:016x}");
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Safe,
    Low,
    Medium,
    High,
    Critical,
}

/// Verdict produced by the static code screener.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub safe: bool,
    pub risk_level: RiskLevel,
    pub violations: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    /// `safe` must always agree with `risk_level`; this constructor is the
    /// only place that is allowed to decide the pairing.
    pub fn new(violations: Vec<String>, warnings: Vec<String>) -> Self {
        let risk_level = classify_risk(&violations, &warnings);
        let safe = matches!(risk_level, RiskLevel::Safe | RiskLevel::Low);
        Self { safe, risk_level, violations, warnings }
    }

    pub fn parse_failure(message: String) -> Self {
        Self {
            safe: false,
            risk_level: RiskLevel::Critical,
            violations: vec![format!("syntax error: {message}")],
            warnings: Vec::new(),
        }
    }
}

fn classify_risk(violations: &[String], warnings: &[String]) -> RiskLevel {
    const CRITICAL_MARKERS: [&str; 4] = ["eval", "exec", "compile", "os.system"];

    if violations.iter().any(|v| CRITICAL_MARKERS.iter().any(|m| v.contains(m))) {
        RiskLevel::Critical
    } else if !violations.is_empty() {
        RiskLevel::High
    } else if warnings.len() > 5 {
        RiskLevel::Medium
    } else if !warnings.is_empty() {
        RiskLevel::Low
    } else {
        RiskLevel::Safe
    }
}

/// A filesystem triple materialized under a freshly created unique root.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub root: std::path::PathBuf,
    pub script_file: std::path::PathBuf,
    pub data_dir: std::path::PathBuf,
    pub outputs_dir: std::path::PathBuf,
}

/// Decoded, typed contents of one file found in `outputs/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Artifact {
    Image { bytes: Vec<u8>, mime: String },
    Html { text: String },
    Json { value: serde_json::Value },
    Csv { text: String },
    Text { text: String },
    Binary { bytes: Vec<u8> },
}

/// Outcome of one container invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub outputs: BTreeMap<String, Artifact>,
    pub elapsed: std::time::Duration,
    pub exit_code: i64,
    pub error: Option<String>,
    pub execution_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisualizationFormat {
    Png,
    Jpg,
    Html,
}

impl VisualizationFormat {
    pub fn label(&self) -> &'static str {
        match self {
            VisualizationFormat::Png => "PNG",
            VisualizationFormat::Jpg => "JPG",
            VisualizationFormat::Html => "HTML",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Visualization {
    #[serde(rename = "type")]
    pub kind: VisualizationKind,
    pub format: VisualizationFormat,
    pub title: String,
    pub data: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisualizationKind {
    Image,
    Html,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataOutputKind {
    Csv,
    Text,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataOutput {
    #[serde(rename = "type")]
    pub kind: DataOutputKind,
    pub text: String,
}

/// The user-facing, fully assembled outcome of one analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub success: bool,
    pub query: String,
    pub insights: String,
    pub visualizations: Vec<Visualization>,
    pub metrics: serde_json::Value,
    pub data_outputs: BTreeMap<String, DataOutput>,
    pub elapsed: std::time::Duration,
    pub error: Option<String>,
    pub raw_output: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

pub type SessionId = Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_iff_risk_level_safe_or_low() {
        let report = ValidationReport::new(vec![], vec![]);
        assert!(report.safe);
        assert_eq!(report.risk_level, RiskLevel::Safe);

        let report = ValidationReport::new(vec!["blocked import: os".to_string()], vec![]);
        assert!(!report.safe);
        assert_eq!(report.risk_level, RiskLevel::High);
    }

    #[test]
    fn eval_and_exec_violations_are_critical() {
        let report = ValidationReport::new(vec!["blocked function call: exec()".to_string()], vec![]);
        assert_eq!(report.risk_level, RiskLevel::Critical);
        assert!(!report.safe);
    }

    #[test]
    fn five_warnings_is_low_six_is_medium() {
        let five = vec!["w".to_string(); 5];
        assert_eq!(ValidationReport::new(vec![], five).risk_level, RiskLevel::Low);

        let six = vec!["w".to_string(); 6];
        assert_eq!(ValidationReport::new(vec![], six).risk_level, RiskLevel::Medium);
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let a = GeneratedProgram::new("print(1)".to_string());
        let b = GeneratedProgram::new("print(1)".to_string());
        assert_eq!(a.fingerprint, b.fingerprint);
    }
}
