//! Ollama `/api/chat` client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{classify_send_error, endpoint, http_client, read_body, CompletionRequest, LlmClient};
use crate::error::AnalysisRequestError;

#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    url: String,
    model: String,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

impl OllamaClient {
    pub fn new(url: &str, model: &str, timeout: Duration) -> Result<Self, AnalysisRequestError> {
        if url.trim().is_empty() {
            return Err(AnalysisRequestError::Configuration(
                "Ollama URL is empty".to_string(),
            ));
        }
        Ok(Self {
            http: http_client(timeout)?,
            url: url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            timeout,
        })
    }

    fn payload<'a>(&'a self, request: &'a CompletionRequest) -> ChatRequest<'a> {
        ChatRequest {
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
            stream: false,
            options: ChatOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        }
    }
}

fn parse_envelope(body: &str) -> Result<String, AnalysisRequestError> {
    serde_json::from_str::<ChatResponse>(body)
        .map(|r| r.message.content)
        .map_err(|e| AnalysisRequestError::InvalidEnvelope(format!("Ollama response: {e}")))
}

#[async_trait]
impl LlmClient for OllamaClient {
    fn provider(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, AnalysisRequestError> {
        let url = endpoint(&self.url, "api/chat");
        debug!(
            "Sending Ollama request to {} (temperature {}, max tokens {})",
            url, request.temperature, request.max_tokens
        );

        let response = self
            .http
            .post(&url)
            .json(&self.payload(request))
            .send()
            .await
            .map_err(|e| classify_send_error(e, &self.url, self.timeout))?;

        let body = read_body(response).await?;
        parse_envelope(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CompletionRequest {
        CompletionRequest {
            system_prompt: "system".to_string(),
            user_prompt: "user".to_string(),
            temperature: 0.2,
            max_tokens: 1500,
        }
    }

    #[test]
    fn test_payload_shape() {
        let client = OllamaClient::new("http://localhost:11434/", "llama3.2:latest", Duration::from_secs(5)).unwrap();
        let request = request();
        let json = serde_json::to_value(client.payload(&request)).unwrap();

        assert_eq!(json["model"], "llama3.2:latest");
        assert_eq!(json["stream"], false);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "user");
        assert_eq!(json["options"]["num_predict"], 1500);
        assert!((json["options"]["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_parse_envelope() {
        let body = r#"{"model":"m","message":{"role":"assistant","content":"{\"summary\":\"ok\"}"},"done":true}"#;
        assert_eq!(parse_envelope(body).unwrap(), r#"{"summary":"ok"}"#);
        assert!(matches!(
            parse_envelope("<html>"),
            Err(AnalysisRequestError::InvalidEnvelope(_))
        ));
    }

    #[test]
    fn test_empty_url_is_configuration_error() {
        assert!(matches!(
            OllamaClient::new(" ", "m", Duration::from_secs(1)),
            Err(AnalysisRequestError::Configuration(_))
        ));
    }

    #[test]
    fn test_closed_port_is_unreachable() {
        let client = OllamaClient::new("http://127.0.0.1:1", "m", Duration::from_secs(5)).unwrap();
        let result = tokio_test::block_on(client.complete(&request()));
        assert!(matches!(result, Err(AnalysisRequestError::Unreachable { .. })));
    }
}
