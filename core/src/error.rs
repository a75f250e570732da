use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

/// Error surfaced by the static code screener.
#[derive(Error, Debug)]
pub enum ValidationErr {
    #[error("program could not be parsed as Python: {0}")]
    Parse(String),
}

/// Error surfaced while provisioning or driving a sandbox container.
#[derive(Error, Debug)]
pub enum SandboxErr {
    #[error("docker daemon unreachable: {0}")]
    DaemonUnreachable(#[source] bollard::errors::Error),

    #[error("sandbox image {0} not found and build_on_init is disabled")]
    ImageMissing(String),

    #[error("failed to build sandbox image {image}: {source}")]
    ImageBuild {
        image: String,
        #[source]
        source: bollard::errors::Error,
    },

    #[error("container operation failed: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("execution exceeded the {0}s deadline and was killed")]
    Timeout(u64),

    #[error("container exited with non-zero status {0}")]
    NonZeroExit(i64),
}

/// Error surfaced by the LLM client.
#[derive(Error, Debug)]
pub enum LlmErr {
    #[error("request to the language model timed out")]
    Timeout,

    #[error("rate limited, retry after {0:?}")]
    RateLimited(Option<std::time::Duration>),

    #[error("unexpected response status {0}: {1}")]
    UnexpectedStatus(reqwest::StatusCode, String),

    #[error("retry limit exceeded, last status: {0}")]
    RetryLimit(reqwest::StatusCode),

    #[error("response contained no usable code block")]
    NoCodeBlock,

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
}

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("no session with id: {0}")]
    SessionNotFound(uuid::Uuid),

    #[error("no dataset loaded for session: {0}")]
    NoDataset(uuid::Uuid),

    #[error("generated program rejected by static analysis: {0}")]
    ValidationRejected(String),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationErr),

    #[error("sandbox error: {0}")]
    Sandbox(#[from] SandboxErr),

    #[error("llm error: {0}")]
    Llm(#[from] LlmErr),

    #[error("analysis was cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    TokioJoin(#[from] tokio::task::JoinError),
}
