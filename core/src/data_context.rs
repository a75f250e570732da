//! Abstracts the input table as a `Tabular` capability, per the data model's
//! `DataContext` (§3): an ordered column list with semantic tags, a preview,
//! and per-numeric-column summary statistics.

use std::collections::BTreeMap;

use crate::model::{ColumnType, DataContext, NumericSummary};

const PREVIEW_ROWS: usize = 5;

/// Capability a tabular dataset must expose to build a [`DataContext`] and
/// to be serialized for the container mount.
pub trait Tabular {
    fn columns(&self) -> &[String];
    fn dtype(&self, column: &str) -> ColumnType;
    fn shape(&self) -> (usize, usize);
    fn head(&self, n: usize) -> Vec<Vec<String>>;
    fn numeric_values(&self, column: &str) -> Option<Vec<f64>>;
    /// Renders the whole table in the serialization format the sandbox
    /// container expects at `/sandbox/data/data.csv`.
    fn to_csv(&self) -> String;
}

/// An in-memory, CSV-backed table. The simplest `Tabular` implementation and
/// the one the CLI and HTTP surface use when accepting a raw CSV body.
#[derive(Debug, Clone)]
pub struct CsvTable {
    columns: Vec<String>,
    column_types: BTreeMap<String, ColumnType>,
    rows: Vec<Vec<String>>,
}

impl CsvTable {
    pub fn parse(csv_text: &str) -> Self {
        let mut lines = csv_text.lines();
        let columns: Vec<String> =
            lines.next().map(|header| split_row(header)).unwrap_or_default();
        let rows: Vec<Vec<String>> = lines.map(split_row).collect();

        let column_types = columns
            .iter()
            .map(|col| {
                let idx = columns.iter().position(|c| c == col).unwrap_or(0);
                let ty = infer_column_type(&rows, idx);
                (col.clone(), ty)
            })
            .collect();

        Self { columns, column_types, rows }
    }
}

fn split_row(line: &str) -> Vec<String> {
    line.split(',').map(|field| field.trim().to_string()).collect()
}

fn infer_column_type(rows: &[Vec<String>], idx: usize) -> ColumnType {
    let mut saw_value = false;
    let mut all_numeric = true;
    let mut all_temporal = true;

    for row in rows.iter().take(200) {
        let Some(value) = row.get(idx) else { continue };
        if value.is_empty() {
            continue;
        }
        saw_value = true;
        if value.parse::<f64>().is_err() {
            all_numeric = false;
        }
        if !looks_like_date(value) {
            all_temporal = false;
        }
    }

    if !saw_value {
        ColumnType::Other
    } else if all_numeric {
        ColumnType::Numeric
    } else if all_temporal {
        ColumnType::Temporal
    } else {
        ColumnType::Categorical
    }
}

fn looks_like_date(value: &str) -> bool {
    value.len() >= 8
        && value.chars().filter(|c| *c == '-' || *c == '/').count() >= 2
        && value.chars().any(|c| c.is_ascii_digit())
}

impl Tabular for CsvTable {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn dtype(&self, column: &str) -> ColumnType {
        self.column_types.get(column).copied().unwrap_or(ColumnType::Other)
    }

    fn shape(&self) -> (usize, usize) {
        (self.rows.len(), self.columns.len())
    }

    fn head(&self, n: usize) -> Vec<Vec<String>> {
        self.rows.iter().take(n).cloned().collect()
    }

    fn numeric_values(&self, column: &str) -> Option<Vec<f64>> {
        let idx = self.columns.iter().position(|c| c == column)?;
        if self.dtype(column) != ColumnType::Numeric {
            return None;
        }
        Some(self.rows.iter().filter_map(|row| row.get(idx)?.parse::<f64>().ok()).collect())
    }

    fn to_csv(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.columns.join(","));
        out.push('\n');
        for row in &self.rows {
            out.push_str(&row.join(","));
            out.push('\n');
        }
        out
    }
}

/// Builds the immutable [`DataContext`] the LLM prompt is composed from.
pub fn build_context(table: &dyn Tabular) -> DataContext {
    let (row_count, column_count) = table.shape();
    let columns: Vec<(String, ColumnType)> =
        table.columns().iter().map(|name| (name.clone(), table.dtype(name))).collect();

    let preview = render_preview(table);
    let numeric_summaries = columns
        .iter()
        .filter(|(_, ty)| *ty == ColumnType::Numeric)
        .filter_map(|(name, _)| table.numeric_values(name).map(|values| (name.clone(), summarize(&values))))
        .collect();

    DataContext { columns, row_count, column_count, preview, numeric_summaries }
}

fn render_preview(table: &dyn Tabular) -> String {
    let mut lines = vec![table.columns().join(", ")];
    for row in table.head(PREVIEW_ROWS) {
        lines.push(row.join(", "));
    }
    lines.join("\n")
}

fn summarize(values: &[f64]) -> NumericSummary {
    if values.is_empty() {
        return NumericSummary { count: 0, mean: 0.0, std: 0.0, min: 0.0, max: 0.0 };
    }
    let count = values.len();
    let mean = values.iter().sum::<f64>() / count as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    NumericSummary { count, mean, std: variance.sqrt(), min, max }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_numeric_and_categorical_columns() {
        let table = CsvTable::parse("name,amount\nalice,10\nbob,20\n");
        assert_eq!(table.dtype("amount"), ColumnType::Numeric);
        assert_eq!(table.dtype("name"), ColumnType::Categorical);
    }

    #[test]
    fn build_context_reports_shape_and_preview() {
        let table = CsvTable::parse("a,b\n1,2\n3,4\n");
        let context = build_context(&table);
        assert_eq!((context.row_count, context.column_count), (2, 2));
        assert!(context.preview.contains("a, b"));
        assert!(context.numeric_summaries.contains_key("a"));
    }

    #[test]
    fn numeric_summary_matches_known_values() {
        let table = CsvTable::parse("x\n1\n2\n3\n");
        let context = build_context(&table);
        let summary = &context.numeric_summaries["x"];
        assert_eq!(summary.count, 3);
        assert!((summary.mean - 2.0).abs() < 1e-9);
        assert_eq!(summary.min, 1.0);
        assert_eq!(summary.max, 3.0);
    }

    #[test]
    fn to_csv_round_trips_header_and_rows() {
        let original = "a,b\n1,2\n3,4\n";
        let table = CsvTable::parse(original);
        assert_eq!(table.to_csv(), original);
    }
}
