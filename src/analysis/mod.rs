//! Statistics, alerts and LLM-backed analysis.
//!
//! The aggregator and pattern modules are pure. [`AnalysisContext`] bundles
//! their output once per run, and the orchestrator runs any number of
//! variants against it.

pub mod aggregator;
pub mod alerts;
pub mod context;
pub mod orchestrator;
pub mod parser;
pub mod patterns;
pub mod prompts;
pub mod variants;

#[cfg(test)]
pub(crate) mod test_support;

pub use aggregator::*;
pub use alerts::{evaluate_alerts, Alert, AlertKind, AlertThresholds};
pub use context::{AnalysisContext, ContextSettings, StatisticsBundle};
pub use orchestrator::{AnalysisOrchestrator, Cancellation, OrchestratorSettings};
pub use parser::{fallback_result, parse_response, ConfidencePolicy, DEFAULT_CONFIDENCE};
pub use patterns::{analyze_patterns, CommunicationPatterns, PatternSummary, WorkSchedule};
pub use variants::{variant, AnalysisVariant, FALLBACK_SUMMARY};
