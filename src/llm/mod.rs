//! LLM clients.
//!
//! The orchestrator only sees [`LlmClient`]; concrete providers are chosen by
//! configuration and injected as `Arc<dyn LlmClient>`.

mod mock;
mod ollama;
mod openai;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::AnalysisRequestError;

pub use mock::ScriptedClient;
pub use ollama::OllamaClient;
pub use openai::OpenAiClient;

/// Longest error body kept in an [`AnalysisRequestError`].
const MAX_ERROR_BODY: usize = 500;

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Provider name for logs and report metadata.
    fn provider(&self) -> &str;

    fn model(&self) -> &str;

    /// One chat completion. Returns the assistant text unparsed.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, AnalysisRequestError>;
}

fn http_client(timeout: Duration) -> Result<reqwest::Client, AnalysisRequestError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AnalysisRequestError::Configuration(format!("cannot build HTTP client: {e}")))
}

fn classify_send_error(err: reqwest::Error, url: &str, timeout: Duration) -> AnalysisRequestError {
    if err.is_timeout() {
        AnalysisRequestError::Timeout(timeout.as_secs())
    } else if err.is_connect() {
        AnalysisRequestError::Unreachable {
            url: url.to_string(),
        }
    } else if err.is_builder() {
        AnalysisRequestError::Configuration(err.to_string())
    } else {
        AnalysisRequestError::Transport(err.to_string())
    }
}

/// Read the body, turning non-success statuses into classified errors.
async fn read_body(response: reqwest::Response) -> Result<String, AnalysisRequestError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| AnalysisRequestError::Transport(format!("failed to read response: {e}")))?;

    if !status.is_success() {
        let body: String = body.chars().take(MAX_ERROR_BODY).collect();
        return Err(AnalysisRequestError::from_status(status.as_u16(), body));
    }
    Ok(body)
}

fn endpoint(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_slashes() {
        assert_eq!(
            endpoint("http://localhost:11434/", "/api/chat"),
            "http://localhost:11434/api/chat"
        );
        assert_eq!(
            endpoint("http://localhost:8080", "v1/chat/completions"),
            "http://localhost:8080/v1/chat/completions"
        );
    }
}
