//! Error types.
//!
//! Normalization errors mean an input record could not be mapped and are
//! surfaced to the caller. Request errors describe a failed LLM call; only
//! the fatal ones reach the caller, the rest are recovered with a fallback
//! analysis. Parse errors never leave the crate.

use thiserror::Error;

use crate::models::{RecordKind, ServiceType};

/// Failure to map a raw service payload into the unified model.
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("unknown service `{0}`")]
    UnknownService(String),

    #[error("no {kind} adapter for service `{service}`")]
    UnsupportedService {
        service: ServiceType,
        kind: RecordKind,
    },

    #[error("malformed {service} {kind} payload: {source}")]
    MalformedPayload {
        service: ServiceType,
        kind: RecordKind,
        #[source]
        source: serde_json::Error,
    },

    #[error("{service} {kind} payload is missing `{field}`")]
    MissingField {
        service: ServiceType,
        kind: RecordKind,
        field: &'static str,
    },

    #[error("invalid timestamp `{value}` in {service} payload")]
    InvalidTimestamp { service: ServiceType, value: String },

    #[error("{service} meeting `{id}` ends before it starts")]
    InvalidTimeRange { service: ServiceType, id: String },
}

/// Failure to obtain a completion from the LLM endpoint.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AnalysisRequestError {
    #[error("cannot connect to LLM endpoint at {url}")]
    Unreachable { url: String },

    #[error("LLM request timed out after {0}s")]
    Timeout(u64),

    #[error("LLM endpoint rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("LLM provider error ({status}): {body}")]
    Provider { status: u16, body: String },

    #[error("LLM response envelope could not be decoded: {0}")]
    InvalidEnvelope(String),

    #[error("LLM request failed: {0}")]
    Transport(String),

    #[error("LLM client is misconfigured: {0}")]
    Configuration(String),

    #[error("LLM request was cancelled")]
    Cancelled,
}

impl AnalysisRequestError {
    /// Classify an HTTP error status returned by the endpoint.
    pub fn from_status(status: u16, body: String) -> Self {
        if status == 429 || status >= 500 {
            AnalysisRequestError::Provider { status, body }
        } else {
            AnalysisRequestError::Rejected { status, body }
        }
    }

    /// Whether repeating the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AnalysisRequestError::Unreachable { .. }
                | AnalysisRequestError::Timeout(_)
                | AnalysisRequestError::Provider { .. }
                | AnalysisRequestError::InvalidEnvelope(_)
                | AnalysisRequestError::Transport(_)
        )
    }

    /// Whether the error must reach the caller instead of producing a
    /// fallback analysis.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AnalysisRequestError::Rejected { .. } | AnalysisRequestError::Configuration(_)
        )
    }
}

/// The model answered, but not with a usable analysis.
#[derive(Debug, Error)]
pub(crate) enum AnalysisParseError {
    #[error("response contains no JSON object")]
    NoJson,

    #[error("response JSON is invalid: {0}")]
    Json(#[from] serde_json::Error),

    #[error("response JSON has unexpected shape: {0}")]
    Shape(&'static str),
}
