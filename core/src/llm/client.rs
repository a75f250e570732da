//! HTTP client for the remote language model. The wire shape is a generic
//! messages API (role/content message list, `max_tokens`, `temperature`,
//! plain-text content in the first response block) rather than any one
//! vendor's SDK, so the core stays usable against any provider that speaks
//! this shape.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::{LlmErr, Result};
use crate::llm::prompt;
use crate::model::{DataContext, ExecutionResult, GeneratedProgram};

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
    pub max_retries: u32,
}

pub struct LlmClient {
    http: Client,
    config: LlmConfig,
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<MessageIn>,
}

#[derive(Debug, Serialize)]
struct MessageIn {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: String,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let http = Client::builder().timeout(config.timeout).build().map_err(LlmErr::Reqwest)?;
        Ok(Self { http, config })
    }

    pub async fn generate_program(
        &self,
        query: &str,
        context: &DataContext,
        hint: Option<&str>,
    ) -> Result<GeneratedProgram> {
        let prompt = prompt::generation_prompt(query, context, hint);
        let text = self.complete(&prompt, 4096, 0.2).await?;
        Ok(GeneratedProgram::new(prompt::extract_code(&text)))
    }

    /// Prefers an explicit `insights.txt` artifact (checked by the caller);
    /// this method is only reached when one was not produced, matching the
    /// "explicit over implicit" rule.
    pub async fn summarize_result(
        &self,
        query: &str,
        outputs: &[String],
        exec_result: &ExecutionResult,
        metrics_json: Option<&str>,
    ) -> String {
        let stdout_tail: String = exec_result.stdout.chars().rev().take(1000).collect();
        let stdout_tail: String = stdout_tail.chars().rev().collect();
        let prompt = prompt::summarization_prompt(query, outputs, metrics_json, &stdout_tail);

        match self.complete(&prompt, 1024, 0.3).await {
            Ok(text) => text.trim().to_string(),
            Err(_) => "Could not generate insights from the analysis results.".to_string(),
        }
    }

    async fn complete(&self, prompt: &str, max_tokens: u32, temperature: f32) -> Result<String> {
        let request = MessagesRequest {
            model: self.config.model.clone(),
            max_tokens,
            temperature,
            messages: vec![MessageIn { role: "user", content: prompt.to_string() }],
        };

        let url = format!("{}/messages", self.config.api_base.trim_end_matches('/'));

        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut request_builder = self.http.post(&url).json(&request);
            if let Some(api_key) = &self.config.api_key {
                request_builder = request_builder.header("x-api-key", api_key);
            }

            let response = request_builder.send().await.map_err(|err| {
                if err.is_timeout() {
                    LlmErr::Timeout
                } else {
                    LlmErr::Reqwest(err)
                }
            })?;

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(Duration::from_secs);
                if attempt > self.config.max_retries {
                    tracing::warn!(attempt, max_retries = self.config.max_retries, "llm call rate limited, giving up");
                    return Err(LlmErr::RateLimited(retry_after).into());
                }
                tracing::warn!(attempt, ?retry_after, "llm call rate limited, retrying");
                tokio::time::sleep(retry_after.unwrap_or(Duration::from_secs(1))).await;
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                tracing::warn!(%status, "llm call returned an error status");
                return Err(LlmErr::UnexpectedStatus(status, body).into());
            }

            let body: MessagesResponse = response.json().await.map_err(LlmErr::Reqwest)?;
            let text = body
                .content
                .into_iter()
                .next()
                .map(|block| block.text)
                .ok_or(LlmErr::NoCodeBlock)?;
            return Ok(text);
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::error::CoreError;

    fn config(api_base: String) -> LlmConfig {
        LlmConfig {
            api_base,
            api_key: Some("test-key".to_string()),
            model: "test-model".to_string(),
            timeout: Duration::from_secs(5),
            max_retries: 2,
        }
    }

    #[tokio::test]
    async fn extracts_text_from_the_first_content_block() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [{"text": "```python\nprint(1)\n```"}]
            })))
            .mount(&server)
            .await;

        let client = LlmClient::new(config(server.uri())).expect("client");
        let text = client.complete("hello", 100, 0.0).await.expect("complete");
        assert!(text.contains("print(1)"));
    }

    struct FlakyOnceResponder {
        calls: std::sync::atomic::AtomicU32,
    }

    impl wiremock::Respond for FlakyOnceResponder {
        fn respond(&self, _request: &wiremock::Request) -> ResponseTemplate {
            let call = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if call == 0 {
                ResponseTemplate::new(429).insert_header("retry-after", "0")
            } else {
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "content": [{"text": "ok"}] }))
            }
        }
    }

    #[tokio::test]
    async fn retries_after_a_429_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(FlakyOnceResponder { calls: std::sync::atomic::AtomicU32::new(0) })
            .mount(&server)
            .await;

        let client = LlmClient::new(config(server.uri())).expect("client");
        let text = client.complete("hello", 100, 0.0).await.expect("complete");
        assert_eq!(text, "ok");
    }

    #[tokio::test]
    async fn gives_up_after_exhausting_retries_on_persistent_429() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
            .mount(&server)
            .await;

        let client = LlmClient::new(config(server.uri())).expect("client");
        let err = client.complete("hello", 100, 0.0).await.expect_err("should fail");
        assert!(matches!(err, CoreError::Llm(LlmErr::RateLimited(_))));
    }

    #[tokio::test]
    async fn unexpected_status_is_surfaced_as_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
            .mount(&server)
            .await;

        let client = LlmClient::new(config(server.uri())).expect("client");
        let err = client.complete("hello", 100, 0.0).await.expect_err("should fail");
        assert!(matches!(err, CoreError::Llm(LlmErr::UnexpectedStatus(_, _))));
    }

    #[tokio::test]
    async fn empty_content_is_reported_as_no_code_block() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "content": [] })))
            .mount(&server)
            .await;

        let client = LlmClient::new(config(server.uri())).expect("client");
        let err = client.complete("hello", 100, 0.0).await.expect_err("should fail");
        assert!(matches!(err, CoreError::Llm(LlmErr::NoCodeBlock)));
    }
}
