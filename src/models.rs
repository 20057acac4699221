//! Unified data model.
//!
//! Every collaboration service is normalized into the record types defined
//! here, and every later stage (aggregation, analysis, reporting) speaks only
//! this vocabulary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::NormalizeError;

/// A supported collaboration service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceType {
    Slack,
    Discord,
    Teams,
    Google,
    Chatwork,
    LineWorks,
}

impl ServiceType {
    /// All services, in declaration order.
    pub const ALL: [ServiceType; 6] = [
        ServiceType::Slack,
        ServiceType::Discord,
        ServiceType::Teams,
        ServiceType::Google,
        ServiceType::Chatwork,
        ServiceType::LineWorks,
    ];

    /// Canonical wire name of the service.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Slack => "slack",
            ServiceType::Discord => "discord",
            ServiceType::Teams => "teams",
            ServiceType::Google => "google",
            ServiceType::Chatwork => "chatwork",
            ServiceType::LineWorks => "line-works",
        }
    }

    /// Human-readable product name.
    pub fn display_name(&self) -> &'static str {
        match self {
            ServiceType::Slack => "Slack",
            ServiceType::Discord => "Discord",
            ServiceType::Teams => "Microsoft Teams",
            ServiceType::Google => "Google Workspace",
            ServiceType::Chatwork => "Chatwork",
            ServiceType::LineWorks => "LINE WORKS",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceType {
    type Err = NormalizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "slack" => Ok(ServiceType::Slack),
            "discord" => Ok(ServiceType::Discord),
            "teams" | "microsoft-teams" => Ok(ServiceType::Teams),
            "google" => Ok(ServiceType::Google),
            "chatwork" => Ok(ServiceType::Chatwork),
            "line-works" | "line_works" | "lineworks" => Ok(ServiceType::LineWorks),
            _ => Err(NormalizeError::UnknownService(s.to_string())),
        }
    }
}

/// The kind of unified record an adapter produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Message,
    Meeting,
    Activity,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Message => write!(f, "message"),
            RecordKind::Meeting => write!(f, "meeting"),
            RecordKind::Activity => write!(f, "activity"),
        }
    }
}

/// Traceability data attached to every unified record.
///
/// `original_data` keeps the raw payload as received. It is ignored by
/// equality and never read by any statistic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMetadata {
    #[serde(default)]
    pub original_data: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RecordMetadata {
    pub fn from_raw(raw: &Value) -> Self {
        Self {
            original_data: raw.clone(),
            extra: Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }
}

impl PartialEq for RecordMetadata {
    fn eq(&self, other: &Self) -> bool {
        self.extra == other.extra
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadRef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    pub emoji: String,
    pub count: u32,
    #[serde(default)]
    pub users: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    pub name: String,
}

/// A chat message from any service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedMessage {
    pub id: String,
    pub service: ServiceType,
    pub timestamp: DateTime<Utc>,
    pub author: Author,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<ChannelRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<ThreadRef>,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub metadata: RecordMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leave_time: Option<DateTime<Utc>>,
    /// Speaking time in seconds, when the service reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaking_time: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organizer {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Recording length in minutes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
}

/// A meeting from any service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedMeeting {
    pub id: String,
    pub service: ServiceType,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Whole minutes between `start_time` and `end_time`.
    pub duration: i64,
    #[serde(default)]
    pub participants: Vec<Participant>,
    pub organizer: Organizer,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recording: Option<Recording>,
    #[serde(default)]
    pub metadata: RecordMetadata,
}

/// Any other event: file shares, reactions, status changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedActivity {
    pub id: String,
    pub service: ServiceType,
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: DateTime<Utc>,
    pub user: Author,
    #[serde(default)]
    pub details: Value,
    #[serde(default)]
    pub metadata: RecordMetadata,
}

/// Normalized records of one input bundle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub messages: Vec<UnifiedMessage>,
    #[serde(default)]
    pub meetings: Vec<UnifiedMeeting>,
    #[serde(default)]
    pub activities: Vec<UnifiedActivity>,
}

impl Dataset {
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.meetings.is_empty() && self.activities.is_empty()
    }

    /// Services that contributed at least one record, in canonical order.
    pub fn services(&self) -> Vec<ServiceType> {
        let mut services: Vec<ServiceType> = self
            .messages
            .iter()
            .map(|m| m.service)
            .chain(self.meetings.iter().map(|m| m.service))
            .chain(self.activities.iter().map(|a| a.service))
            .collect();
        services.sort();
        services.dedup();
        services
    }
}

/// Severity level of a risk factor or alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Worth knowing, no action needed yet
    Low,
    /// Should be addressed in the normal planning cycle
    Medium,
    /// Needs attention soon
    High,
    /// Needs attention now
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "Low"),
            Severity::Medium => write!(f, "Medium"),
            Severity::High => write!(f, "High"),
            Severity::Critical => write!(f, "Critical"),
        }
    }
}

impl Severity {
    /// Returns an emoji representation of the severity.
    pub fn emoji(&self) -> &'static str {
        match self {
            Severity::Low => "🟢",
            Severity::Medium => "🟡",
            Severity::High => "🟠",
            Severity::Critical => "🔴",
        }
    }

    /// Lenient parse used on LLM output. Unknown labels map to `Medium`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "critical" | "severe" | "very high" => Severity::Critical,
            "high" => Severity::High,
            "low" | "minor" => Severity::Low,
            _ => Severity::Medium,
        }
    }
}

/// The analysis variants the orchestrator can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    Comprehensive,
    Productivity,
    Burnout,
    TeamDynamics,
    Communication,
}

impl AnalysisType {
    pub const ALL: [AnalysisType; 5] = [
        AnalysisType::Comprehensive,
        AnalysisType::Productivity,
        AnalysisType::Burnout,
        AnalysisType::TeamDynamics,
        AnalysisType::Communication,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisType::Comprehensive => "comprehensive",
            AnalysisType::Productivity => "productivity",
            AnalysisType::Burnout => "burnout",
            AnalysisType::TeamDynamics => "team_dynamics",
            AnalysisType::Communication => "communication",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            AnalysisType::Comprehensive => "Comprehensive Team Health",
            AnalysisType::Productivity => "Productivity",
            AnalysisType::Burnout => "Burnout Risk",
            AnalysisType::TeamDynamics => "Team Dynamics",
            AnalysisType::Communication => "Communication Patterns",
        }
    }
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskFactor {
    pub factor: String,
    pub severity: Severity,
    pub impact: String,
    pub mitigation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Opportunity {
    pub area: String,
    pub potential: String,
    pub implementation: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Insights {
    pub summary: String,
    #[serde(default)]
    pub key_findings: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub risk_factors: Vec<RiskFactor>,
    #[serde(default)]
    pub opportunities: Vec<Opportunity>,
}

/// How much data backed an analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisDepth {
    Limited,
    Standard,
    Deep,
}

impl fmt::Display for AnalysisDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisDepth::Limited => write!(f, "limited"),
            AnalysisDepth::Standard => write!(f, "standard"),
            AnalysisDepth::Deep => write!(f, "deep"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisMetrics {
    /// Confidence asserted by the model, or the configured default.
    pub confidence_score: u32,
    /// Completeness of the input records, always computed locally.
    pub data_quality_score: u32,
    pub analysis_depth: AnalysisDepth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSource {
    pub services: Vec<ServiceType>,
    pub message_count: usize,
    pub meeting_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
}

/// Structured result of one analysis variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: AnalysisType,
    pub insights: Insights,
    pub metrics: AnalysisMetrics,
    /// Variant-specific scores reported by the model, clamped to 0..=100.
    #[serde(default)]
    pub scores: BTreeMap<String, u32>,
    /// True when the result was synthesized locally instead of by the model.
    #[serde(default)]
    pub is_fallback: bool,
    pub generated_at: DateTime<Utc>,
    pub data_source: DataSource,
}

impl AnalysisResult {
    /// Highest risk severity in the result, if any risk was reported.
    pub fn max_severity(&self) -> Option<Severity> {
        self.insights.risk_factors.iter().map(|r| r.severity).max()
    }
}

/// Metadata about a generated report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetadata {
    /// Date and time the report was generated.
    pub generated_at: DateTime<Utc>,
    /// LLM provider used, or "none" for dry runs.
    pub provider: String,
    /// Name of the LLM model used.
    #[serde(rename = "model")]
    pub model_used: String,
    /// Services present in the input.
    pub services: Vec<ServiceType>,
    /// Duration of the whole run in seconds.
    pub duration_seconds: f64,
}

/// The complete team health report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub metadata: ReportMetadata,
    pub statistics: crate::analysis::StatisticsBundle,
    pub alerts: Vec<crate::analysis::Alert>,
    pub analyses: Vec<AnalysisResult>,
}

impl Report {
    /// Highest severity across alerts and reported risks.
    pub fn max_severity(&self) -> Option<Severity> {
        let alerts = self.alerts.iter().map(|a| a.severity);
        let risks = self.analyses.iter().filter_map(|a| a.max_severity());
        alerts.chain(risks).max()
    }

    /// Number of analyses that had to fall back to local statistics.
    pub fn fallback_count(&self) -> usize {
        self.analyses.iter().filter(|a| a.is_fallback).count()
    }
}
