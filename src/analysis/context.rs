//! Everything the analysis variants read, computed once per run.

use serde::{Deserialize, Serialize};

use super::aggregator::{
    self, ActivityStats, CrossServiceAnalysis, DataQuality, MeetingStats, MessageStats,
};
use super::alerts::{evaluate_alerts, Alert, AlertThresholds};
use super::patterns::{analyze_patterns, CommunicationPatterns, PatternSummary, WorkSchedule};
use crate::models::{AnalysisDepth, DataSource, Dataset, ServiceType, TimeRange};

/// Below this many records a result is marked as limited.
const LIMITED_RECORDS: usize = 50;
/// At or above this many records a result is marked as deep.
const DEEP_RECORDS: usize = 500;

#[derive(Debug, Clone, PartialEq)]
pub struct ContextSettings {
    pub top_channels: usize,
    pub peak_hours: usize,
    pub top_users: usize,
    pub schedule: WorkSchedule,
    pub thresholds: AlertThresholds,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            top_channels: 5,
            peak_hours: 3,
            top_users: 5,
            schedule: WorkSchedule::default(),
            thresholds: AlertThresholds::default(),
        }
    }
}

/// Rounded statistics as they appear in reports and prompts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsBundle {
    pub messages: MessageStats,
    pub meetings: MeetingStats,
    pub activities: ActivityStats,
    pub cross_service: CrossServiceAnalysis,
    pub data_quality: DataQuality,
    pub patterns: PatternSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
}

/// Owned statistics for one dataset. Holds no references into the records.
#[derive(Debug, Clone)]
pub struct AnalysisContext {
    pub statistics: StatisticsBundle,
    pub patterns: CommunicationPatterns,
    pub quality_raw: f64,
    pub collaboration_raw: f64,
    pub average_meeting_minutes_raw: f64,
    pub services: Vec<ServiceType>,
    pub alerts: Vec<Alert>,
}

impl AnalysisContext {
    pub fn build(dataset: &Dataset, settings: &ContextSettings) -> Self {
        let messages = &dataset.messages;
        let meetings = &dataset.meetings;

        let patterns = analyze_patterns(messages, meetings, &settings.schedule, settings.peak_hours);
        let users = aggregator::services_by_user(messages, meetings);

        let statistics = StatisticsBundle {
            messages: aggregator::calculate_message_stats(messages, settings.top_channels),
            meetings: aggregator::calculate_meeting_stats(meetings),
            activities: aggregator::calculate_activity_stats(&dataset.activities),
            cross_service: aggregator::calculate_cross_service_analysis(messages, meetings),
            data_quality: aggregator::calculate_data_quality(messages, meetings),
            patterns: patterns.summary(settings.top_users),
            time_range: aggregator::time_range(messages, meetings, &dataset.activities),
        };

        let mut ctx = Self {
            statistics,
            quality_raw: aggregator::data_quality_raw(messages, meetings),
            collaboration_raw: aggregator::collaboration_score_raw(&users),
            average_meeting_minutes_raw: aggregator::average_meeting_duration_raw(meetings),
            services: dataset.services(),
            patterns,
            alerts: Vec::new(),
        };
        ctx.alerts = evaluate_alerts(&ctx, &settings.thresholds);
        ctx
    }

    pub fn record_count(&self) -> usize {
        self.statistics.messages.total + self.statistics.meetings.total
    }

    pub fn data_source(&self) -> DataSource {
        DataSource {
            services: self.services.clone(),
            message_count: self.statistics.messages.total,
            meeting_count: self.statistics.meetings.total,
            time_range: self.statistics.time_range,
        }
    }

    /// Depth a model-backed result can claim for this much data.
    pub fn depth(&self) -> AnalysisDepth {
        match self.record_count() {
            n if n < LIMITED_RECORDS => AnalysisDepth::Limited,
            n if n < DEEP_RECORDS => AnalysisDepth::Standard,
            _ => AnalysisDepth::Deep,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::test_support::sample_dataset;

    #[test]
    fn test_build_from_sample() {
        let ctx = AnalysisContext::build(&sample_dataset(), &ContextSettings::default());

        assert_eq!(ctx.record_count(), 130);
        assert_eq!(ctx.depth(), AnalysisDepth::Standard);
        assert_eq!(ctx.services, vec![ServiceType::Slack, ServiceType::Teams]);
        assert_eq!(ctx.statistics.cross_service.collaboration_score, 100);
        assert_eq!(ctx.statistics.messages.top_channels.len(), 3);

        let source = ctx.data_source();
        assert_eq!(source.message_count, 120);
        assert_eq!(source.meeting_count, 10);
        assert!(source.time_range.is_some());
    }

    #[test]
    fn test_build_from_empty() {
        let ctx = AnalysisContext::build(&Dataset::default(), &ContextSettings::default());
        assert_eq!(ctx.record_count(), 0);
        assert_eq!(ctx.depth(), AnalysisDepth::Limited);
        assert_eq!(ctx.statistics.data_quality.overall, 100);
        assert!(ctx.data_source().time_range.is_none());
    }

    #[test]
    fn test_statistics_serialize_camel_case() {
        let ctx = AnalysisContext::build(&sample_dataset(), &ContextSettings::default());
        let json = serde_json::to_value(&ctx.statistics).unwrap();
        assert!(json["crossService"]["collaborationScore"].is_number());
        assert!(json["dataQuality"]["overall"].is_number());
        assert!(json["patterns"]["afterHoursPercent"].is_number());
    }

    #[test]
    fn test_build_from_fixture_bundle() {
        let bundle: crate::normalize::RawBundle =
            serde_json::from_str(include_str!("../../fixtures/sample_bundle.json")).unwrap();
        let dataset = crate::normalize::normalize_bundle(&bundle).unwrap();
        let ctx = AnalysisContext::build(&dataset, &ContextSettings::default());

        assert_eq!(ctx.statistics.messages.total, 7);
        assert_eq!(ctx.statistics.meetings.total, 2);
        assert_eq!(ctx.services.len(), 5);
        // ada, ben and cho chat on Slack and meet on Google and Teams
        assert_eq!(ctx.statistics.cross_service.total_users, 5);
        assert_eq!(ctx.statistics.cross_service.multi_service_users, 3);
        assert_eq!(ctx.statistics.cross_service.collaboration_score, 60);
        assert_eq!(ctx.depth(), AnalysisDepth::Limited);

        let ben = ctx
            .patterns
            .workloads
            .iter()
            .find(|w| w.user == "ben@example.com")
            .unwrap();
        assert_eq!(ben.after_hours_messages, 1);
    }
}
