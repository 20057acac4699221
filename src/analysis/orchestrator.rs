//! Runs analysis variants against an LLM client.
//!
//! One generic pipeline serves every variant: prepare the payload, compose
//! the prompts, invoke the client with timeout and retries, then parse or
//! fall back. Only fatal request errors reach the caller; everything else
//! ends in a result flagged `is_fallback`.

use futures::future::{join_all, AbortHandle, AbortRegistration, Abortable};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::context::AnalysisContext;
use super::parser::{fallback_result, parse_response, ConfidencePolicy};
use super::variants::variant;
use crate::error::AnalysisRequestError;
use crate::llm::{CompletionRequest, LlmClient};
use crate::models::{AnalysisResult, AnalysisType};

/// Upper bound on the wait between two attempts.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Exponential backoff, capped at [`MAX_RETRY_DELAY`].
fn retry_delay(base: Duration, attempt: u32) -> Duration {
    base.checked_mul(2u32.saturating_pow(attempt))
        .map_or(MAX_RETRY_DELAY, |delay| delay.min(MAX_RETRY_DELAY))
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorSettings {
    /// Overrides every variant's temperature when set.
    pub temperature: Option<f32>,
    /// Per-attempt limit on one completion call.
    pub timeout: Duration,
    /// Extra attempts after a retryable failure.
    pub retries: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub retry_backoff: Duration,
    pub confidence: ConfidencePolicy,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            temperature: None,
            timeout: Duration::from_secs(120),
            retries: 2,
            retry_backoff: Duration::from_millis(500),
            confidence: ConfidencePolicy::default(),
        }
    }
}

#[derive(Default)]
struct CancelState {
    cancelled: AtomicBool,
    handles: Mutex<Vec<AbortHandle>>,
}

/// Cancels every in-flight request of a run. Clones share state.
///
/// Requests registered after [`Cancellation::cancel`] are aborted at once.
#[derive(Clone, Default)]
pub struct Cancellation {
    inner: Arc<CancelState>,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        if let Ok(handles) = self.inner.handles.lock() {
            handles.iter().for_each(AbortHandle::abort);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    fn register(&self) -> AbortRegistration {
        let (handle, registration) = AbortHandle::new_pair();
        if let Ok(mut handles) = self.inner.handles.lock() {
            handles.push(handle.clone());
        }
        if self.is_cancelled() {
            handle.abort();
        }
        registration
    }
}

pub struct AnalysisOrchestrator {
    client: Arc<dyn LlmClient>,
    settings: OrchestratorSettings,
}

impl AnalysisOrchestrator {
    pub fn new(client: Arc<dyn LlmClient>, settings: OrchestratorSettings) -> Self {
        Self { client, settings }
    }

    pub fn client(&self) -> &dyn LlmClient {
        self.client.as_ref()
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Run one variant.
    pub async fn run(
        &self,
        kind: AnalysisType,
        ctx: &AnalysisContext,
    ) -> Result<AnalysisResult, AnalysisRequestError> {
        self.run_with(kind, ctx, None).await
    }

    /// Run one variant; aborting `registration` yields a fallback result.
    pub async fn run_cancellable(
        &self,
        kind: AnalysisType,
        ctx: &AnalysisContext,
        registration: AbortRegistration,
    ) -> Result<AnalysisResult, AnalysisRequestError> {
        self.run_with(kind, ctx, Some(registration)).await
    }

    /// Run several variants concurrently over one shared context.
    ///
    /// Results keep the order of `kinds`. The first fatal error is returned
    /// once every variant has finished.
    pub async fn run_all(
        &self,
        kinds: &[AnalysisType],
        ctx: &AnalysisContext,
        cancel: Option<&Cancellation>,
    ) -> Result<Vec<AnalysisResult>, AnalysisRequestError> {
        info!("Running {} analyses with {}", kinds.len(), self.client.model());
        let runs = kinds
            .iter()
            .map(|&kind| self.run_with(kind, ctx, cancel.map(Cancellation::register)));
        join_all(runs).await.into_iter().collect()
    }

    async fn run_with(
        &self,
        kind: AnalysisType,
        ctx: &AnalysisContext,
        registration: Option<AbortRegistration>,
    ) -> Result<AnalysisResult, AnalysisRequestError> {
        let request = variant(kind).request(ctx, self.settings.temperature);
        debug!(
            "Composed {} request: {} + {} prompt chars",
            kind,
            request.system_prompt.len(),
            request.user_prompt.len()
        );

        let outcome = match registration {
            Some(registration) => Abortable::new(self.invoke(kind, &request), registration)
                .await
                .unwrap_or(Err(AnalysisRequestError::Cancelled)),
            None => self.invoke(kind, &request).await,
        };

        match outcome {
            Ok(text) => Ok(parse_response(kind, &text, ctx, &self.settings.confidence)),
            Err(e) if e.is_fatal() => {
                error!("{} analysis failed: {}", kind, e);
                Err(e)
            }
            Err(e) => {
                warn!("{} analysis unavailable ({}), using local statistics", kind, e);
                Ok(fallback_result(kind, ctx, &self.settings.confidence))
            }
        }
    }

    /// One completion with per-attempt timeout and exponential backoff.
    async fn invoke(
        &self,
        kind: AnalysisType,
        request: &CompletionRequest,
    ) -> Result<String, AnalysisRequestError> {
        let mut attempt = 0u32;
        loop {
            let outcome = tokio::time::timeout(self.settings.timeout, self.client.complete(request))
                .await
                .unwrap_or(Err(AnalysisRequestError::Timeout(
                    self.settings.timeout.as_secs(),
                )));

            match outcome {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt < self.settings.retries => {
                    let delay = retry_delay(self.settings.retry_backoff, attempt);
                    attempt += 1;
                    warn!(
                        "{} request failed ({}), retry {}/{} in {:?}",
                        kind, e, attempt, self.settings.retries, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::context::ContextSettings;
    use crate::analysis::test_support::sample_dataset;
    use crate::analysis::variants::FALLBACK_SUMMARY;
    use crate::llm::ScriptedClient;
    use crate::models::{AnalysisDepth, Dataset};

    const REPLY: &str = r#"```json
{"summary": "The team is healthy.", "keyFindings": ["Balanced load"], "confidenceScore": 0.9}
```"#;

    fn context() -> AnalysisContext {
        AnalysisContext::build(&sample_dataset(), &ContextSettings::default())
    }

    fn fast_settings() -> OrchestratorSettings {
        OrchestratorSettings {
            timeout: Duration::from_secs(5),
            retries: 0,
            retry_backoff: Duration::from_millis(1),
            ..OrchestratorSettings::default()
        }
    }

    fn orchestrator(client: ScriptedClient, settings: OrchestratorSettings) -> (AnalysisOrchestrator, Arc<ScriptedClient>) {
        let client = Arc::new(client);
        (AnalysisOrchestrator::new(client.clone(), settings), client)
    }

    #[test]
    fn test_network_error_falls_back() {
        let (orch, _) = orchestrator(
            ScriptedClient::new().with_error(AnalysisRequestError::Unreachable {
                url: "http://localhost:11434".to_string(),
            }),
            fast_settings(),
        );
        let ctx = context();
        let result = tokio_test::block_on(orch.run(AnalysisType::Comprehensive, &ctx)).unwrap();

        assert!(result.is_fallback);
        assert_eq!(result.metrics.confidence_score, 75);
        assert_eq!(result.metrics.analysis_depth, AnalysisDepth::Limited);
        assert!(result.insights.summary.starts_with(FALLBACK_SUMMARY));
        assert!(!result.insights.summary.contains("localhost"));
    }

    #[test]
    fn test_successful_reply_is_parsed() {
        let (orch, client) = orchestrator(ScriptedClient::new().with_reply(REPLY), fast_settings());
        let ctx = context();
        let result = tokio_test::block_on(orch.run(AnalysisType::Burnout, &ctx)).unwrap();

        assert!(!result.is_fallback);
        assert_eq!(result.insights.summary, "The team is healthy.");
        assert_eq!(result.metrics.confidence_score, 90);

        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].temperature, 0.2);
        assert_eq!(requests[0].max_tokens, 1500);
    }

    #[test]
    fn test_temperature_override_reaches_client() {
        let settings = OrchestratorSettings {
            temperature: Some(0.95),
            ..fast_settings()
        };
        let (orch, client) = orchestrator(ScriptedClient::new().with_reply(REPLY), settings);
        let ctx = context();
        tokio_test::block_on(orch.run(AnalysisType::Productivity, &ctx)).unwrap();
        assert_eq!(client.requests()[0].temperature, 0.95);
    }

    #[test]
    fn test_rejected_request_is_fatal() {
        let (orch, client) = orchestrator(
            ScriptedClient::new().with_error(AnalysisRequestError::Rejected {
                status: 401,
                body: "bad key".to_string(),
            }),
            OrchestratorSettings {
                retries: 3,
                ..fast_settings()
            },
        );
        let ctx = context();
        let result = tokio_test::block_on(orch.run(AnalysisType::Comprehensive, &ctx));

        assert!(matches!(result, Err(AnalysisRequestError::Rejected { status: 401, .. })));
        assert_eq!(client.requests().len(), 1);
    }

    #[test]
    fn test_retries_retryable_errors() {
        let (orch, client) = orchestrator(
            ScriptedClient::new()
                .with_error(AnalysisRequestError::Provider {
                    status: 503,
                    body: String::new(),
                })
                .with_error(AnalysisRequestError::Transport("reset".to_string()))
                .with_reply(REPLY),
            OrchestratorSettings {
                retries: 2,
                ..fast_settings()
            },
        );
        let ctx = context();
        let result = tokio_test::block_on(orch.run(AnalysisType::Communication, &ctx)).unwrap();

        assert!(!result.is_fallback);
        assert_eq!(client.requests().len(), 3);
    }

    #[test]
    fn test_retries_exhausted_fall_back() {
        let (orch, client) = orchestrator(
            ScriptedClient::new()
                .with_error(AnalysisRequestError::Timeout(1))
                .with_error(AnalysisRequestError::Timeout(1)),
            OrchestratorSettings {
                retries: 1,
                ..fast_settings()
            },
        );
        let ctx = context();
        let result = tokio_test::block_on(orch.run(AnalysisType::TeamDynamics, &ctx)).unwrap();

        assert!(result.is_fallback);
        assert_eq!(client.requests().len(), 2);
    }

    #[test]
    fn test_slow_client_times_out() {
        let (orch, _) = orchestrator(
            ScriptedClient::new()
                .with_reply(REPLY)
                .with_delay(Duration::from_secs(5)),
            OrchestratorSettings {
                timeout: Duration::from_millis(20),
                ..fast_settings()
            },
        );
        let ctx = context();
        let result = tokio_test::block_on(orch.run(AnalysisType::Burnout, &ctx)).unwrap();
        assert!(result.is_fallback);
    }

    #[test]
    fn test_unparseable_reply_falls_back() {
        let (orch, _) = orchestrator(
            ScriptedClient::new().with_reply("Sorry, I can't produce JSON today."),
            fast_settings(),
        );
        let ctx = context();
        let result = tokio_test::block_on(orch.run(AnalysisType::Productivity, &ctx)).unwrap();
        assert!(result.is_fallback);
    }

    #[test]
    fn test_run_all_keeps_order() {
        let (orch, client) = orchestrator(ScriptedClient::from_fn(|_| Ok(REPLY.to_string())), fast_settings());
        let ctx = context();
        let results =
            tokio_test::block_on(orch.run_all(&AnalysisType::ALL, &ctx, None)).unwrap();

        let kinds: Vec<AnalysisType> = results.iter().map(|r| r.kind).collect();
        assert_eq!(kinds, AnalysisType::ALL.to_vec());
        assert!(results.iter().all(|r| !r.is_fallback));
        assert_eq!(client.requests().len(), 5);
    }

    #[test]
    fn test_run_all_on_empty_dataset() {
        let (orch, _) = orchestrator(ScriptedClient::from_fn(|_| Ok(REPLY.to_string())), fast_settings());
        let ctx = AnalysisContext::build(&Dataset::default(), &ContextSettings::default());
        let results =
            tokio_test::block_on(orch.run_all(&[AnalysisType::Comprehensive], &ctx, None)).unwrap();
        assert_eq!(results[0].metrics.analysis_depth, AnalysisDepth::Limited);
        assert_eq!(results[0].data_source.message_count, 0);
    }

    #[test]
    fn test_cancellation_yields_fallbacks() {
        let (orch, _) = orchestrator(
            ScriptedClient::from_fn(|_| Ok(REPLY.to_string())).with_delay(Duration::from_secs(30)),
            fast_settings(),
        );
        let ctx = context();
        let cancel = Cancellation::new();

        let results = tokio_test::block_on(async {
            let (results, _) = tokio::join!(
                orch.run_all(&[AnalysisType::Comprehensive, AnalysisType::Burnout], &ctx, Some(&cancel)),
                async {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    cancel.cancel();
                }
            );
            results
        })
        .unwrap();

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.is_fallback));
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn test_cancelled_before_start() {
        let (orch, client) = orchestrator(ScriptedClient::new().with_reply(REPLY), fast_settings());
        let ctx = context();
        let (handle, registration) = AbortHandle::new_pair();
        handle.abort();

        let result =
            tokio_test::block_on(orch.run_cancellable(AnalysisType::Comprehensive, &ctx, registration))
                .unwrap();
        assert!(result.is_fallback);
        assert!(client.requests().is_empty());
    }

    #[test]
    fn test_retry_delay_doubles_and_caps() {
        let base = Duration::from_millis(500);
        assert_eq!(retry_delay(base, 0), Duration::from_millis(500));
        assert_eq!(retry_delay(base, 2), Duration::from_secs(2));
        assert_eq!(retry_delay(base, 40), MAX_RETRY_DELAY);
        assert_eq!(retry_delay(Duration::from_millis(u64::MAX), 3), MAX_RETRY_DELAY);
    }
}
