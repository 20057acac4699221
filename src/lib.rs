//! TeamPulse: cross-service team health analysis.
//!
//! Raw exports from chat and meeting services are normalized into unified
//! records, aggregated into statistics, and handed to an LLM for
//! interpretation. When the model is unavailable the analysis degrades to
//! results built from the statistics alone.

pub mod analysis;
pub mod cli;
pub mod config;
pub mod error;
pub mod llm;
pub mod models;
pub mod normalize;
pub mod report;
