use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

#[cfg(feature = "cli")]
use clap::Parser;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub sandbox: SandboxConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Reload/watch mode. Unused outside the server binary; kept so a single
    /// `[server]` TOML table covers both binaries.
    pub reload: bool,
    /// Origins allowed to make credentialed cross-origin requests (chat UI
    /// dev servers). `tower_http` rejects pairing a wildcard origin with
    /// `Allow-Credentials`, so this must be an explicit list.
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_base: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_ms: u64,
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub image: String,
    pub build_on_init: bool,
    pub timeout_secs: u64,
    pub max_memory_mb: u64,
    pub cpu_limit: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// "json" or "text", matching the original service's two supported
    /// log formats.
    pub format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            llm: LlmConfig::default(),
            sandbox: SandboxConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            reload: false,
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(),
            ],
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.anthropic.com/v1".to_string(),
            model: "claude-sonnet".to_string(),
            max_tokens: 4096,
            temperature: 0.2,
            timeout_ms: 120_000,
            max_retries: 3,
        }
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            image: "python-analysis-sandbox:latest".to_string(),
            build_on_init: false,
            timeout_secs: 300,
            max_memory_mb: 2048,
            cpu_limit: 2.0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "text".to_string() }
    }
}

/// Command line overrides, layered on top of the config file and
/// environment variables. Only present when the `cli` feature is enabled,
/// so a pure-library consumer (e.g. a websocket task) never pulls in clap.
#[cfg(feature = "cli")]
#[derive(Parser, Debug, Clone)]
#[command(name = "analysis")]
pub struct CommandLineArgs {
    /// Path to a TOML configuration file.
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    #[arg(long, value_name = "HOST")]
    pub host: Option<String>,

    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,

    #[arg(long, value_name = "MODEL")]
    pub llm_model: Option<String>,

    #[arg(long, value_name = "IMAGE")]
    pub sandbox_image: Option<String>,

    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,
}

impl Config {
    /// Loads configuration with the usual precedence, highest wins:
    /// 1. CLI flags (when the `cli` feature is enabled)
    /// 2. Environment variables (`ANALYSIS_*`)
    /// 3. TOML config file (`--config`, or one of the conventional paths)
    /// 4. Built-in defaults
    #[cfg(feature = "cli")]
    pub fn load() -> Result<Self, ConfigError> {
        let cli_args = CommandLineArgs::parse();
        Self::load_from(cli_args.config.clone(), Some(&cli_args))
    }

    /// Same as [`Config::load`], but for a binary that flattens
    /// [`CommandLineArgs`] into its own top-level `clap::Parser` struct and
    /// has already parsed it once.
    #[cfg(feature = "cli")]
    pub fn load_with_args(cli_args: &CommandLineArgs) -> Result<Self, ConfigError> {
        Self::load_from(cli_args.config.clone(), Some(cli_args))
    }

    /// Same loading precedence as [`Config::load`], minus the CLI layer;
    /// used by library/test callers that have no `clap::Parser` of their own.
    pub fn load_without_cli() -> Result<Self, ConfigError> {
        Self::load_from(None, None)
    }

    #[cfg(not(feature = "cli"))]
    fn load_from(config_path: Option<String>, _cli_args: Option<&()>) -> Result<Self, ConfigError> {
        let config_path = config_path.or_else(Self::find_config_file);
        let mut config = match config_path {
            Some(path) => Self::from_toml(&path)?,
            None => Config::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    #[cfg(feature = "cli")]
    fn load_from(
        config_path: Option<String>,
        cli_args: Option<&CommandLineArgs>,
    ) -> Result<Self, ConfigError> {
        let config_path = config_path.or_else(Self::find_config_file);
        let mut config = match config_path {
            Some(path) => Self::from_toml(&path)?,
            None => Config::default(),
        };
        config.apply_env_overrides();
        if let Some(cli_args) = cli_args {
            config.apply_cli_overrides(cli_args);
        }
        config.validate()?;
        Ok(config)
    }

    fn find_config_file() -> Option<String> {
        let candidates = ["analysis.toml", "config/analysis.toml", "./analysis.toml"];
        candidates.iter().find(|path| Path::new(path).exists()).map(|s| s.to_string())
    }

    fn from_toml(path: &str) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|source| ConfigError::Read { path: path.to_string(), source })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse { path: path.to_string(), source })
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("ANALYSIS_API_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("ANALYSIS_API_PORT")
            && let Ok(port) = port.parse()
        {
            self.server.port = port;
        }
        if let Ok(reload) = std::env::var("ANALYSIS_API_RELOAD")
            && let Ok(reload) = reload.parse()
        {
            self.server.reload = reload;
        }
        if let Ok(model) = std::env::var("ANALYSIS_LLM_MODEL") {
            self.llm.model = model;
        }
        if let Ok(base) = std::env::var("ANALYSIS_LLM_API_BASE") {
            self.llm.api_base = base;
        }
        if let Ok(image) = std::env::var("ANALYSIS_SANDBOX_IMAGE") {
            self.sandbox.image = image;
        }
        if let Ok(timeout) = std::env::var("ANALYSIS_SANDBOX_TIMEOUT_SECS")
            && let Ok(timeout) = timeout.parse()
        {
            self.sandbox.timeout_secs = timeout;
        }
        if let Ok(mem) = std::env::var("ANALYSIS_SANDBOX_MAX_MEMORY_MB")
            && let Ok(mem) = mem.parse()
        {
            self.sandbox.max_memory_mb = mem;
        }
        if let Ok(level) = std::env::var("ANALYSIS_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("ANALYSIS_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    #[cfg(feature = "cli")]
    fn apply_cli_overrides(&mut self, args: &CommandLineArgs) {
        if let Some(host) = &args.host {
            self.server.host = host.clone();
        }
        if let Some(port) = args.port {
            self.server.port = port;
        }
        if let Some(model) = &args.llm_model {
            self.llm.model = model.clone();
        }
        if let Some(image) = &args.sandbox_image {
            self.sandbox.image = image.clone();
        }
        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server.port cannot be 0".to_string()));
        }
        if self.llm.max_tokens == 0 {
            return Err(ConfigError::Invalid("llm.max_tokens must be > 0".to_string()));
        }
        if self.sandbox.timeout_secs == 0 {
            return Err(ConfigError::Invalid("sandbox.timeout_secs must be > 0".to_string()));
        }
        if self.sandbox.max_memory_mb == 0 {
            return Err(ConfigError::Invalid("sandbox.max_memory_mb must be > 0".to_string()));
        }
        if self.logging.format != "json" && self.logging.format != "text" {
            return Err(ConfigError::Invalid(format!(
                "logging.format must be \"json\" or \"text\", got {:?}",
                self.logging.format
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        Config::default().validate().expect("defaults must be valid");
    }

    #[test]
    fn rejects_zero_port() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_unknown_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn from_toml_overlays_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("analysis.toml");
        fs::write(&path, "[server]\nport = 9001\n").expect("write config");
        let config = Config::from_toml(path.to_str().expect("utf8 path")).expect("parse config");
        assert_eq!(config.server.port, 9001);
        assert_eq!(config.server.host, "0.0.0.0");
    }
}
