//! The state machine that drives a request through code generation,
//! validation, execution, and result assembly, plus the bounded-concurrency
//! batch entry point.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::data_context::{build_context, Tabular};
use crate::llm::LlmClient;
use crate::model::{AnalysisResult, Artifact};
use crate::sandbox::{ContainerRuntimeDriver, ResourceLimits};
use crate::{assembler, validator, workspace};

pub struct AnalysisOrchestrator {
    llm: Arc<LlmClient>,
    sandbox: Arc<ContainerRuntimeDriver>,
    limits: ResourceLimits,
}

impl AnalysisOrchestrator {
    pub fn new(llm: Arc<LlmClient>, sandbox: Arc<ContainerRuntimeDriver>, limits: ResourceLimits) -> Self {
        Self { llm, sandbox, limits }
    }

    /// Runs the full pipeline for one query. Any error at any step is
    /// converted into a failure [`AnalysisResult`] rather than propagated —
    /// the orchestrator is the boundary where infrastructure errors become
    /// user-facing results.
    pub async fn analyze(
        &self,
        query: &str,
        data: &dyn Tabular,
        hint: Option<&str>,
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> AnalysisResult {
        match self.analyze_inner(query, data, hint, deadline, cancel).await {
            Ok(result) => result,
            Err(err) => failure_result(query, &err.to_string()),
        }
    }

    async fn analyze_inner(
        &self,
        query: &str,
        data: &dyn Tabular,
        hint: Option<&str>,
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> crate::error::Result<AnalysisResult> {
        let context = build_context(data);

        tracing::info!(query, "generating candidate program");
        let program = self.llm.generate_program(query, &context, hint).await?;

        let report = validator::validate(&program.source)?;
        if !report.safe {
            tracing::warn!(query, risk_level = ?report.risk_level, "candidate program rejected by screener");
            let bullets = report.violations.iter().map(|v| format!("- {v}")).collect::<Vec<_>>().join("\n");
            return Ok(failure_result(query, &format!("Code validation failed:\n{bullets}")));
        }

        let workspace = workspace::prepare(&program.source, &data.to_csv()).await?;
        let exec_result = self
            .sandbox
            .execute(&workspace, &self.limits, deadline, cancel)
            .await;
        workspace::destroy(&workspace).await.ok();
        let exec_result = exec_result?;

        tracing::info!(
            query,
            execution_id = %exec_result.execution_id,
            risk_level = ?report.risk_level,
            success = exec_result.success,
            "sandbox run complete"
        );

        let insights = if exec_result.success {
            Some(self.generate_insights(query, &exec_result).await)
        } else {
            None
        };

        Ok(assembler::assemble(query, &exec_result, insights))
    }

    async fn generate_insights(&self, query: &str, exec: &crate::model::ExecutionResult) -> String {
        // Explicit-over-implicit: an insights.txt the program wrote, even
        // empty, wins over a generated summary.
        if let Some(Artifact::Text { text }) = exec.outputs.get("insights.txt") {
            return text.clone();
        }

        let metrics_json = match exec.outputs.get("metrics.json") {
            Some(Artifact::Json { value }) => serde_json::to_string_pretty(value).ok(),
            _ => None,
        };
        let filenames: Vec<String> = exec.outputs.keys().cloned().collect();
        self.llm.summarize_result(query, &filenames, exec, metrics_json.as_deref()).await
    }

    /// Runs `queries` against `data` with at most `max_concurrent` in
    /// flight. One query's failure never cancels its peers; output order
    /// always matches input order regardless of completion order.
    pub async fn batch_analyze(
        &self,
        queries: &[String],
        data: &(dyn Tabular + Sync),
        max_concurrent: usize,
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> Vec<AnalysisResult> {
        let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
        let mut handles = Vec::with_capacity(queries.len());

        for query in queries {
            let semaphore = Arc::clone(&semaphore);
            let query = query.clone();
            let cancel = cancel.clone();
            handles.push(async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => unreachable!("semaphore is never closed"),
                };
                self.analyze(&query, data, None, deadline, &cancel).await
            });
        }

        tracing::info!(query_count = queries.len(), max_concurrent, "starting batch analysis");
        futures::future::join_all(handles).await
    }
}

fn failure_result(query: &str, message: &str) -> AnalysisResult {
    AnalysisResult {
        success: false,
        query: query.to_string(),
        insights: message.to_string(),
        visualizations: Vec::new(),
        metrics: serde_json::Value::Object(Default::default()),
        data_outputs: Default::default(),
        elapsed: Duration::default(),
        error: Some(message.to_string()),
        raw_output: None,
    }
}
