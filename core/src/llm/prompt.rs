//! Prompt templates for code generation and result summarization.

use crate::model::{ColumnType, DataContext};

pub fn generation_prompt(query: &str, context: &DataContext, hint: Option<&str>) -> String {
    let columns = format_columns(context);
    let hint_section =
        hint.map(|h| format!("\n# Analysis Type Hint\n{h}\n")).unwrap_or_default();

    format!(
        "You are a Python data analysis code generator. Generate a complete, \
production-ready Python script that performs the requested analysis.

# User Query
{query}

# Available Data Context
The data is available as a pandas DataFrame loaded from '/sandbox/data/data.csv'.

**Shape**: {rows} rows, {cols} columns

**Columns and Types**:
{columns}

**Preview**:
```
{preview}
```

# Output Requirements

Save every artifact under `/sandbox/outputs/` using these conventions:
- Plots as `plot_*.png` or `plot_*.html`
- Metrics as `metrics.json`
- Insights as `insights.txt`
- Processed tables as `results.csv`

Use pandas, numpy, matplotlib, seaborn, plotly, scikit-learn, scipy, or \
statsmodels as needed. Wrap the analysis in try/except for robustness.
{hint_section}
Generate ONLY the Python code, no explanation before or after. The code must \
be complete and ready to execute.",
        rows = context.row_count,
        cols = context.column_count,
    )
}

fn format_columns(context: &DataContext) -> String {
    if context.columns.is_empty() {
        return "No column information available".to_string();
    }
    context
        .columns
        .iter()
        .map(|(name, ty)| format!("  - `{name}`: {}", column_type_label(*ty)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn column_type_label(ty: ColumnType) -> &'static str {
    match ty {
        ColumnType::Numeric => "numeric",
        ColumnType::Temporal => "temporal",
        ColumnType::Categorical => "categorical",
        ColumnType::Other => "other",
    }
}

pub fn summarization_prompt(
    query: &str,
    output_filenames: &[String],
    metrics_json: Option<&str>,
    stdout_tail: &str,
) -> String {
    let metrics = metrics_json.unwrap_or("No metrics generated");
    format!(
        "You are a data analyst providing insights to a user.

# User Query
{query}

# Generated Outputs
{outputs}

# Metrics
```json
{metrics}
```

# Console Output (tail)
```
{stdout_tail}
```

# Task
Provide a clear, concise summary of the analysis results in 3-5 bullet points. \
Reference actual numbers from the metrics where possible.",
        outputs = output_filenames.join(", "),
    )
}

/// Strips a single leading fenced code block delimiter (optionally
/// language-tagged) and a single trailing fence; returns the response
/// verbatim, trimmed, if no fence is present.
pub fn extract_code(response_text: &str) -> String {
    let mut code = response_text.trim();

    if let Some(rest) = code.strip_prefix("```python") {
        code = rest.trim_start();
    } else if let Some(rest) = code.strip_prefix("```") {
        code = rest.trim_start();
    }

    if let Some(rest) = code.strip_suffix("```") {
        code = rest.trim_end();
    }

    code.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_code_strips_python_fence() {
        let response = "```python\nprint(1)\n```";
        assert_eq!(extract_code(response), "print(1)");
    }

    #[test]
    fn extract_code_strips_bare_fence() {
        let response = "```\nprint(1)\n```";
        assert_eq!(extract_code(response), "print(1)");
    }

    #[test]
    fn extract_code_passes_through_unfenced_text() {
        let response = "  print(1)  ";
        assert_eq!(extract_code(response), "print(1)");
    }
}
