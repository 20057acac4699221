//! Threshold alerts over the aggregated statistics.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::context::AnalysisContext;
use crate::models::Severity;

pub const DEFAULT_QUALITY_THRESHOLD: f64 = 70.0;
pub const DEFAULT_AFTER_HOURS_RATIO: f64 = 0.25;
pub const DEFAULT_WEEKEND_RATIO: f64 = 0.10;
pub const DEFAULT_COLLABORATION_THRESHOLD: f64 = 30.0;
pub const DEFAULT_LONG_MEETING_MINUTES: f64 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    LowDataQuality,
    AfterHoursWork,
    WeekendWork,
    LowCollaboration,
    LongMeetings,
}

impl AlertKind {
    pub fn title(&self) -> &'static str {
        match self {
            AlertKind::LowDataQuality => "Low data quality",
            AlertKind::AfterHoursWork => "After-hours communication",
            AlertKind::WeekendWork => "Weekend work",
            AlertKind::LowCollaboration => "Low cross-service collaboration",
            AlertKind::LongMeetings => "Long meetings",
        }
    }

    pub fn mitigation(&self) -> &'static str {
        match self {
            AlertKind::LowDataQuality => {
                "Check the export settings of each service so messages keep their authors, channels and content."
            }
            AlertKind::AfterHoursWork => {
                "Agree on core hours and use scheduled sending for non-urgent messages."
            }
            AlertKind::WeekendWork => {
                "Review weekend workload and rotate any on-call duty explicitly."
            }
            AlertKind::LowCollaboration => {
                "Consolidate discussion channels or add shared rituals that span tools."
            }
            AlertKind::LongMeetings => {
                "Default to 30-minute meetings and send agendas ahead of time."
            }
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub severity: Severity,
    pub message: String,
}

/// Limits above (or below) which an alert fires.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertThresholds {
    pub min_data_quality: f64,
    pub max_after_hours_ratio: f64,
    pub max_weekend_ratio: f64,
    pub min_collaboration: f64,
    pub max_average_meeting_minutes: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            min_data_quality: DEFAULT_QUALITY_THRESHOLD,
            max_after_hours_ratio: DEFAULT_AFTER_HOURS_RATIO,
            max_weekend_ratio: DEFAULT_WEEKEND_RATIO,
            min_collaboration: DEFAULT_COLLABORATION_THRESHOLD,
            max_average_meeting_minutes: DEFAULT_LONG_MEETING_MINUTES,
        }
    }
}

/// Compare the unrounded context figures against the thresholds.
///
/// Alerts come back most severe first.
pub fn evaluate_alerts(ctx: &AnalysisContext, thresholds: &AlertThresholds) -> Vec<Alert> {
    let mut alerts = Vec::new();
    let messages = ctx.statistics.messages.total;
    let meetings = ctx.statistics.meetings.total;

    if messages + meetings > 0 && ctx.quality_raw < thresholds.min_data_quality {
        alerts.push(Alert {
            kind: AlertKind::LowDataQuality,
            severity: Severity::High,
            message: format!(
                "Data quality is {:.0}%, below the {:.0}% needed for reliable conclusions",
                ctx.quality_raw, thresholds.min_data_quality
            ),
        });
    }

    if messages > 0 && ctx.patterns.after_hours_ratio > thresholds.max_after_hours_ratio {
        alerts.push(Alert {
            kind: AlertKind::AfterHoursWork,
            severity: Severity::High,
            message: format!(
                "{:.0}% of messages were sent outside working hours",
                ctx.patterns.after_hours_ratio * 100.0
            ),
        });
    }

    if messages > 0 && ctx.patterns.weekend_ratio > thresholds.max_weekend_ratio {
        alerts.push(Alert {
            kind: AlertKind::WeekendWork,
            severity: Severity::Medium,
            message: format!(
                "{:.0}% of messages were sent on weekends",
                ctx.patterns.weekend_ratio * 100.0
            ),
        });
    }

    if ctx.services.len() >= 2 && ctx.collaboration_raw < thresholds.min_collaboration {
        alerts.push(Alert {
            kind: AlertKind::LowCollaboration,
            severity: Severity::Medium,
            message: format!(
                "Only {:.0}% of people are active on more than one of {} services",
                ctx.collaboration_raw,
                ctx.services.len()
            ),
        });
    }

    if meetings > 0 && ctx.average_meeting_minutes_raw > thresholds.max_average_meeting_minutes {
        alerts.push(Alert {
            kind: AlertKind::LongMeetings,
            severity: Severity::Low,
            message: format!(
                "Meetings average {:.0} minutes",
                ctx.average_meeting_minutes_raw
            ),
        });
    }

    alerts.sort_by_key(|a| std::cmp::Reverse(a.severity));
    alerts
}
