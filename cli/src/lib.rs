//! Single-shot CLI: parse arguments, load configuration, run one analysis
//! query end to end, print the result, exit with a matching status code.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use analysis_common::Config;
use analysis_core::data_context::{CsvTable, Tabular};
use analysis_core::llm::{LlmClient, LlmConfig};
use analysis_core::sandbox::{ContainerRuntimeDriver, ResourceLimits, SandboxConfig};
use analysis_core::{assembler, AnalysisOrchestrator};
use clap::Parser;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Parser)]
#[command(name = "analysis", version, about = "Run one natural-language analysis query against a dataset")]
pub struct Cli {
    /// Natural-language question to ask of the dataset.
    pub query: String,

    /// Path to a CSV file holding the dataset to analyze.
    #[arg(long, value_name = "FILE")]
    pub data: PathBuf,

    /// Optional steering hint passed alongside the query.
    #[arg(long)]
    pub hint: Option<String>,

    /// Overrides `sandbox.timeout_secs` from the loaded configuration.
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Emit the full result as JSON instead of the chat-formatted summary.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    #[command(flatten)]
    pub config_args: analysis_common::CommandLineArgs,
}

pub async fn run_main(cli: Cli) -> anyhow::Result<()> {
    let Cli { query, data, hint, timeout_secs, json, config_args } = cli;

    let config = Config::load_with_args(&config_args)?;

    let default_level = "error";
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new(&config.logging.level))
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .try_init();

    let csv_text = std::fs::read_to_string(&data)
        .map_err(|source| anyhow::anyhow!("failed to read dataset {}: {source}", data.display()))?;
    let table = CsvTable::parse(&csv_text);

    let llm = LlmClient::new(LlmConfig {
        api_base: config.llm.api_base.clone(),
        api_key: std::env::var("ANALYSIS_LLM_API_KEY").ok(),
        model: config.llm.model.clone(),
        timeout: Duration::from_millis(config.llm.timeout_ms),
        max_retries: config.llm.max_retries,
    })?;

    let sandbox = ContainerRuntimeDriver::connect(SandboxConfig {
        image: config.sandbox.image.clone(),
        build_on_init: config.sandbox.build_on_init,
        build_context: PathBuf::from("sandbox"),
    })?;
    sandbox.ensure_image().await?;

    let limits = ResourceLimits {
        memory_mb: config.sandbox.max_memory_mb,
        cpu_cores: config.sandbox.cpu_limit,
        timeout_secs: timeout_secs.unwrap_or(config.sandbox.timeout_secs),
        ..ResourceLimits::default()
    };
    let deadline = Duration::from_secs(limits.timeout_secs);

    let orchestrator = AnalysisOrchestrator::new(Arc::new(llm), Arc::new(sandbox), limits);
    let cancel = CancellationToken::new();

    tracing::info!(query = %query, data = %data.display(), "running analysis");
    let result = orchestrator.analyze(&query, &table as &dyn Tabular, hint.as_deref(), deadline, &cancel).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", assembler::format_for_chat(&result));
    }

    if result.success {
        Ok(())
    } else {
        std::process::exit(1);
    }
}
