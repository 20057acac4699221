//! OpenAI-compatible `/v1/chat/completions` client.
//!
//! Works against OpenAI itself and the many local servers that mirror its
//! API, so the API key is optional.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::{classify_send_error, endpoint, http_client, read_body, CompletionRequest, LlmClient};
use crate::error::AnalysisRequestError;

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Value,
}

impl OpenAiClient {
    pub fn new(
        url: &str,
        model: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AnalysisRequestError> {
        if url.trim().is_empty() {
            return Err(AnalysisRequestError::Configuration(
                "OpenAI URL is empty".to_string(),
            ));
        }
        Ok(Self {
            http: http_client(timeout)?,
            url: url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            timeout,
        })
    }

    fn payload<'a>(&'a self, request: &'a CompletionRequest) -> ChatCompletionRequest<'a> {
        ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user_prompt,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        }
    }
}

/// Content is a plain string, or an array of parts with `text` fields.
fn extract_message_content(content: &Value) -> Option<String> {
    if let Some(text) = content.as_str() {
        return Some(text.to_owned());
    }

    let joined = content
        .as_array()?
        .iter()
        .filter_map(|item| item.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("");

    (!joined.is_empty()).then_some(joined)
}

fn parse_envelope(body: &str) -> Result<String, AnalysisRequestError> {
    let response: ChatCompletionResponse = serde_json::from_str(body)
        .map_err(|e| AnalysisRequestError::InvalidEnvelope(format!("chat completion: {e}")))?;

    response
        .choices
        .first()
        .and_then(|choice| extract_message_content(&choice.message.content))
        .ok_or_else(|| AnalysisRequestError::InvalidEnvelope("model returned no choices".to_string()))
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn provider(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, AnalysisRequestError> {
        let url = endpoint(&self.url, "v1/chat/completions");
        debug!("Sending chat completion request to {}", url);

        let mut builder = self.http.post(&url).json(&self.payload(request));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| classify_send_error(e, &self.url, self.timeout))?;

        let body = read_body(response).await?;
        parse_envelope(&body)
    }
}
