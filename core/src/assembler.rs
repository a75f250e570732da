//! Turns a raw [`ExecutionResult`] into the user-facing [`AnalysisResult`],
//! and renders the latter as a chat-formatted text block.

use std::collections::BTreeMap;

use base64::Engine as _;

use crate::model::{
    AnalysisResult, Artifact, DataOutput, DataOutputKind, ExecutionResult, Visualization,
    VisualizationFormat, VisualizationKind,
};

const PREFIXES: [&str; 4] = ["plot_", "chart_", "fig_", "graph_"];

pub fn assemble(query: &str, exec: &ExecutionResult, insights: Option<String>) -> AnalysisResult {
    if !exec.success {
        return AnalysisResult {
            success: false,
            query: query.to_string(),
            insights: format!("Analysis failed: {}", exec.error.as_deref().unwrap_or("unknown error")),
            visualizations: Vec::new(),
            metrics: serde_json::Value::Object(Default::default()),
            data_outputs: BTreeMap::new(),
            elapsed: exec.elapsed,
            error: exec.error.clone(),
            raw_output: Some(exec.stderr.clone()),
        };
    }

    let visualizations = extract_visualizations(&exec.outputs);
    let metrics = extract_metrics(&exec.outputs);
    let data_outputs = extract_data_outputs(&exec.outputs);
    let insights = insights.unwrap_or_else(|| extract_insights(&exec.outputs));

    AnalysisResult {
        success: true,
        query: query.to_string(),
        insights,
        visualizations,
        metrics,
        data_outputs,
        elapsed: exec.elapsed,
        error: None,
        raw_output: Some(exec.stdout.clone()),
    }
}

fn extract_visualizations(outputs: &BTreeMap<String, Artifact>) -> Vec<Visualization> {
    let mut visualizations = Vec::new();
    for (filename, artifact) in outputs {
        match artifact {
            Artifact::Image { bytes, mime } => {
                let format = if mime == "image/jpeg" { VisualizationFormat::Jpg } else { VisualizationFormat::Png };
                visualizations.push(Visualization {
                    kind: VisualizationKind::Image,
                    format,
                    title: filename_to_title(filename),
                    data: base64::engine::general_purpose::STANDARD.encode(bytes),
                });
            }
            Artifact::Html { text } => visualizations.push(Visualization {
                kind: VisualizationKind::Html,
                format: VisualizationFormat::Html,
                title: filename_to_title(filename),
                data: text.clone(),
            }),
            _ => {}
        }
    }
    visualizations
}

fn extract_metrics(outputs: &BTreeMap<String, Artifact>) -> serde_json::Value {
    let mut metrics = serde_json::Map::new();

    if let Some(Artifact::Json { value }) = outputs.get("metrics.json")
        && let serde_json::Value::Object(map) = value
    {
        metrics.extend(map.clone());
    }

    for (filename, artifact) in outputs {
        if filename == "metrics.json" {
            continue;
        }
        if let Some(stem) = filename.strip_suffix(".json")
            && let Artifact::Json { value } = artifact
        {
            metrics.insert(stem.to_string(), value.clone());
        }
    }

    serde_json::Value::Object(metrics)
}

fn extract_data_outputs(outputs: &BTreeMap<String, Artifact>) -> BTreeMap<String, DataOutput> {
    let mut data_outputs = BTreeMap::new();
    for (filename, artifact) in outputs {
        match artifact {
            Artifact::Csv { text } => {
                data_outputs.insert(filename.clone(), DataOutput { kind: DataOutputKind::Csv, text: text.clone() });
            }
            Artifact::Text { text } if filename != "insights.txt" => {
                data_outputs.insert(filename.clone(), DataOutput { kind: DataOutputKind::Text, text: text.clone() });
            }
            _ => {}
        }
    }
    data_outputs
}

fn extract_insights(outputs: &BTreeMap<String, Artifact>) -> String {
    match outputs.get("insights.txt") {
        Some(Artifact::Text { text }) => text.clone(),
        _ => "No insights generated. Check the visualizations and metrics for analysis results."
            .to_string(),
    }
}

fn filename_to_title(filename: &str) -> String {
    let stem = filename.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(filename);
    let stripped = PREFIXES
        .iter()
        .find_map(|prefix| stem.strip_prefix(prefix))
        .unwrap_or(stem);
    title_case(&stripped.replace('_', " "))
}

fn title_case(s: &str) -> String {
    s.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Renders an [`AnalysisResult`] as a chat-facing markdown-ish text block.
pub fn format_for_chat(result: &AnalysisResult) -> String {
    if !result.success {
        return format!(
            "## Analysis Failed\n\n**Error**: {}\n\n**Output**:\n```\n{}\n```\n",
            result.error.as_deref().unwrap_or("Unknown error"),
            result.raw_output.as_deref().unwrap_or(""),
        );
    }

    let mut output = format!("## Analysis Results\n\n{}\n\n", result.insights);

    if let serde_json::Value::Object(metrics) = &result.metrics
        && !metrics.is_empty()
    {
        output.push_str("### Key Metrics\n\n");
        for (key, value) in metrics {
            match value {
                serde_json::Value::Object(nested) => {
                    output.push_str(&format!("**{key}**:\n"));
                    for (k, v) in nested {
                        output.push_str(&format!("  - {k}: {}\n", format_value(v)));
                    }
                }
                other => output.push_str(&format!("- **{key}**: {}\n", format_value(other))),
            }
        }
        output.push('\n');
    }

    if !result.visualizations.is_empty() {
        output.push_str("### Visualizations\n\n");
        output.push_str(&format!("Generated {} visualization(s):\n", result.visualizations.len()));
        for (i, viz) in result.visualizations.iter().enumerate() {
            output.push_str(&format!("{}. {} ({})\n", i + 1, viz.title, viz.format.label()));
        }
        output.push('\n');
    }

    output.push_str(&format!("*Execution time: {}*\n", analysis_common::elapsed::format_duration(result.elapsed)));
    output
}

fn format_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                if f.abs() < 0.01 && f != 0.0 || f.abs() > 10_000.0 {
                    format!("{f:.2e}")
                } else if n.is_f64() {
                    format!("{f:.2}")
                } else {
                    n.to_string()
                }
            } else {
                n.to_string()
            }
        }
        serde_json::Value::Array(items) if items.len() > 5 => {
            let head: Vec<String> = items[..5].iter().map(format_value).collect();
            format!("[{}, ... ({} items)]", head.join(", "), items.len())
        }
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn success_result(outputs: BTreeMap<String, Artifact>) -> ExecutionResult {
        ExecutionResult {
            success: true,
            stdout: "done".to_string(),
            stderr: String::new(),
            outputs,
            elapsed: Duration::from_secs(1),
            exit_code: 0,
            error: None,
            execution_id: "abc".to_string(),
        }
    }

    #[test]
    fn failed_execution_short_circuits() {
        let exec = ExecutionResult {
            success: false,
            stdout: String::new(),
            stderr: "boom".to_string(),
            outputs: BTreeMap::new(),
            elapsed: Duration::from_secs(1),
            exit_code: 1,
            error: Some("timeout".to_string()),
            execution_id: "abc".to_string(),
        };
        let result = assemble("q", &exec, None);
        assert!(!result.success);
        assert!(result.visualizations.is_empty());
        assert_eq!(result.insights, "Analysis failed: timeout");
    }

    #[test]
    fn title_strips_plot_prefix_and_title_cases() {
        assert_eq!(filename_to_title("plot_revenue_growth.png"), "Revenue Growth");
    }

    #[test]
    fn metrics_json_merges_with_other_json_files() {
        let mut outputs = BTreeMap::new();
        outputs.insert(
            "metrics.json".to_string(),
            Artifact::Json { value: serde_json::json!({"x": 1.5}) },
        );
        outputs.insert(
            "extra.json".to_string(),
            Artifact::Json { value: serde_json::json!({"y": 2}) },
        );
        let result = assemble("q", &success_result(outputs), None);
        assert_eq!(result.metrics["x"], 1.5);
        assert_eq!(result.metrics["extra"]["y"], 2);
    }

    #[test]
    fn explicit_insights_argument_wins_over_insights_txt() {
        let mut outputs = BTreeMap::new();
        outputs.insert("insights.txt".to_string(), Artifact::Text { text: String::new() });
        let result = assemble("q", &success_result(outputs), Some("generated".to_string()));
        assert_eq!(result.insights, "generated");
    }

    #[test]
    fn empty_insights_txt_still_wins_when_no_explicit_argument() {
        let mut outputs = BTreeMap::new();
        outputs.insert("insights.txt".to_string(), Artifact::Text { text: String::new() });
        let result = assemble("q", &success_result(outputs), None);
        assert_eq!(result.insights, "");
    }
}
