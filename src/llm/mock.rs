//! Deterministic client for tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use super::{CompletionRequest, LlmClient};
use crate::error::AnalysisRequestError;

type Responder = Box<dyn Fn(&CompletionRequest) -> Result<String, AnalysisRequestError> + Send + Sync>;

/// Replays queued replies in order, then falls back to a responder
/// function, or fails with a transport error once both are exhausted.
/// Every request is recorded.
pub struct ScriptedClient {
    replies: Mutex<VecDeque<Result<String, AnalysisRequestError>>>,
    responder: Option<Responder>,
    delay: Option<Duration>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl Default for ScriptedClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            responder: None,
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer every request with a function of the request.
    pub fn from_fn<F>(responder: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Result<String, AnalysisRequestError> + Send + Sync + 'static,
    {
        Self {
            responder: Some(Box::new(responder)),
            ..Self::new()
        }
    }

    pub fn with_reply(self, reply: impl Into<String>) -> Self {
        self.push(Ok(reply.into()));
        self
    }

    pub fn with_error(self, error: AnalysisRequestError) -> Self {
        self.push(Err(error));
        self
    }

    /// Sleep before answering, for timeout and cancellation tests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn push(&self, reply: Result<String, AnalysisRequestError>) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(reply);
        }
    }

    /// Requests received so far, in arrival order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    fn provider(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, AnalysisRequestError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let queued = self.replies.lock().ok().and_then(|mut r| r.pop_front());
        match (queued, &self.responder) {
            (Some(reply), _) => reply,
            (None, Some(responder)) => responder(request),
            (None, None) => Err(AnalysisRequestError::Transport(
                "no scripted reply left".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(prompt: &str) -> CompletionRequest {
        CompletionRequest {
            system_prompt: String::new(),
            user_prompt: prompt.to_string(),
            temperature: 0.5,
            max_tokens: 10,
        }
    }

    #[test]
    fn test_replays_in_order_then_fails() {
        let client = ScriptedClient::new()
            .with_reply("first")
            .with_error(AnalysisRequestError::Timeout(3));

        tokio_test::block_on(async {
            assert_eq!(client.complete(&request("a")).await.unwrap(), "first");
            assert_eq!(
                client.complete(&request("b")).await,
                Err(AnalysisRequestError::Timeout(3))
            );
            assert!(matches!(
                client.complete(&request("c")).await,
                Err(AnalysisRequestError::Transport(_))
            ));
        });

        let prompts: Vec<String> = client.requests().into_iter().map(|r| r.user_prompt).collect();
        assert_eq!(prompts, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_responder_sees_request() {
        let client = ScriptedClient::from_fn(|r| Ok(r.user_prompt.to_uppercase()));
        let reply = tokio_test::block_on(client.complete(&request("hi")));
        assert_eq!(reply.unwrap(), "HI");
    }
}
