//! Analysis variant descriptors.
//!
//! Each [`AnalysisType`] maps to one static [`AnalysisVariant`] holding its
//! prompt, generation budget, score fields, payload builder and the local
//! findings used when the model cannot answer. The orchestrator is generic
//! over these descriptors.

use serde_json::{json, Value};
use std::collections::BTreeMap;

use super::aggregator::balance_score;
use super::alerts::AlertKind;
use super::context::AnalysisContext;
use super::prompts::{
    BURNOUT_PROMPT, COMMUNICATION_PROMPT, COMPREHENSIVE_PROMPT, PRODUCTIVITY_PROMPT,
    RESPONSE_FORMAT, TEAM_DYNAMICS_PROMPT,
};
use crate::llm::CompletionRequest;
use crate::models::{AnalysisType, Insights, RiskFactor};

/// Opening of every fallback summary.
pub const FALLBACK_SUMMARY: &str =
    "Limited-data analysis: the AI analysis was unavailable, so this summary was generated from local statistics only.";

pub struct AnalysisVariant {
    pub kind: AnalysisType,
    pub system_prompt: &'static str,
    /// Instruction placed before the data in the user prompt.
    pub task: &'static str,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Score keys the model is asked for and the parser reads back.
    pub score_fields: &'static [&'static str],
    /// Alerts that become risk factors in a fallback result.
    pub alert_kinds: &'static [AlertKind],
    pub prepare: fn(&AnalysisContext) -> Value,
    pub fallback_findings: fn(&AnalysisContext) -> Vec<String>,
}

static COMPREHENSIVE: AnalysisVariant = AnalysisVariant {
    kind: AnalysisType::Comprehensive,
    system_prompt: COMPREHENSIVE_PROMPT,
    task: "Assess the overall health of this team from the statistics below.",
    temperature: 0.7,
    max_tokens: 2500,
    score_fields: &[
        "overallHealthScore",
        "productivityScore",
        "wellbeingScore",
        "collaborationScore",
    ],
    alert_kinds: &[
        AlertKind::LowDataQuality,
        AlertKind::AfterHoursWork,
        AlertKind::WeekendWork,
        AlertKind::LowCollaboration,
        AlertKind::LongMeetings,
    ],
    prepare: prepare_comprehensive,
    fallback_findings: comprehensive_findings,
};

static PRODUCTIVITY: AnalysisVariant = AnalysisVariant {
    kind: AnalysisType::Productivity,
    system_prompt: PRODUCTIVITY_PROMPT,
    task: "Analyse how this team spends its time and what fragments its focus.",
    temperature: 0.3,
    max_tokens: 1500,
    score_fields: &["productivityScore", "focusTimeScore", "meetingEfficiencyScore"],
    alert_kinds: &[AlertKind::LongMeetings, AlertKind::LowDataQuality],
    prepare: prepare_productivity,
    fallback_findings: productivity_findings,
};

static BURNOUT: AnalysisVariant = AnalysisVariant {
    kind: AnalysisType::Burnout,
    system_prompt: BURNOUT_PROMPT,
    task: "Assess the burnout risk of this team from its activity timing and workload.",
    temperature: 0.2,
    max_tokens: 1500,
    score_fields: &["burnoutRiskScore", "workLifeBalanceScore"],
    alert_kinds: &[
        AlertKind::AfterHoursWork,
        AlertKind::WeekendWork,
        AlertKind::LongMeetings,
    ],
    prepare: prepare_burnout,
    fallback_findings: burnout_findings,
};

static TEAM_DYNAMICS: AnalysisVariant = AnalysisVariant {
    kind: AnalysisType::TeamDynamics,
    system_prompt: TEAM_DYNAMICS_PROMPT,
    task: "Describe the collaboration structure of this team.",
    temperature: 0.5,
    max_tokens: 1800,
    score_fields: &["collaborationScore", "cohesionScore", "inclusionScore"],
    alert_kinds: &[AlertKind::LowCollaboration],
    prepare: prepare_team_dynamics,
    fallback_findings: team_dynamics_findings,
};

static COMMUNICATION: AnalysisVariant = AnalysisVariant {
    kind: AnalysisType::Communication,
    system_prompt: COMMUNICATION_PROMPT,
    task: "Review how this team uses its messaging and meeting tools.",
    temperature: 0.5,
    max_tokens: 1800,
    score_fields: &["communicationScore", "responsivenessScore", "channelHealthScore"],
    alert_kinds: &[AlertKind::LowCollaboration, AlertKind::AfterHoursWork],
    prepare: prepare_communication,
    fallback_findings: communication_findings,
};

pub fn variant(kind: AnalysisType) -> &'static AnalysisVariant {
    match kind {
        AnalysisType::Comprehensive => &COMPREHENSIVE,
        AnalysisType::Productivity => &PRODUCTIVITY,
        AnalysisType::Burnout => &BURNOUT,
        AnalysisType::TeamDynamics => &TEAM_DYNAMICS,
        AnalysisType::Communication => &COMMUNICATION,
    }
}

impl AnalysisVariant {
    pub fn system_message(&self) -> String {
        let scores = self
            .score_fields
            .iter()
            .map(|f| format!("\"{f}\": 0-100"))
            .collect::<Vec<_>>()
            .join(",\n  ");
        format!(
            "{}\n\n{}",
            self.system_prompt,
            RESPONSE_FORMAT.replace("{scores}", &scores)
        )
    }

    pub fn user_message(&self, ctx: &AnalysisContext) -> String {
        let payload = (self.prepare)(ctx);
        let data = serde_json::to_string_pretty(&payload).unwrap_or_else(|_| payload.to_string());
        format!(
            "{}\n\nTeam communication statistics:\n```json\n{}\n```\n\nRespond with the JSON object only.",
            self.task, data
        )
    }

    /// Full request for this variant. `temperature` overrides the
    /// variant's own setting when present.
    pub fn request(&self, ctx: &AnalysisContext, temperature: Option<f32>) -> CompletionRequest {
        CompletionRequest {
            system_prompt: self.system_message(),
            user_prompt: self.user_message(ctx),
            temperature: temperature.unwrap_or(self.temperature),
            max_tokens: self.max_tokens,
        }
    }

    /// Insights built from local statistics alone.
    pub fn fallback_insights(&self, ctx: &AnalysisContext) -> Insights {
        let risk_factors: Vec<RiskFactor> = ctx
            .alerts
            .iter()
            .filter(|a| self.alert_kinds.contains(&a.kind))
            .map(|a| RiskFactor {
                factor: a.kind.title().to_string(),
                severity: a.severity,
                impact: a.message.clone(),
                mitigation: a.kind.mitigation().to_string(),
            })
            .collect();

        let mut recommendations: Vec<String> =
            risk_factors.iter().map(|r| r.mitigation.clone()).collect();
        recommendations
            .push("Re-run this analysis once the AI service is reachable for deeper insights.".to_string());

        Insights {
            summary: format!(
                "{} It covers {} messages and {} meetings from {} service(s).",
                FALLBACK_SUMMARY,
                ctx.statistics.messages.total,
                ctx.statistics.meetings.total,
                ctx.services.len()
            ),
            key_findings: (self.fallback_findings)(ctx),
            recommendations,
            risk_factors,
            opportunities: Vec::new(),
        }
    }

    /// Scores that can be computed without the model.
    pub fn local_scores(&self, ctx: &AnalysisContext) -> BTreeMap<String, u32> {
        self.score_fields
            .iter()
            .filter(|f| **f == "collaborationScore")
            .map(|f| {
                (
                    f.to_string(),
                    ctx.statistics.cross_service.collaboration_score,
                )
            })
            .collect()
    }
}

fn percent_of(part: usize, whole: usize) -> u32 {
    if whole == 0 {
        0
    } else {
        (100.0 * part as f64 / whole as f64).round() as u32
    }
}

fn period(ctx: &AnalysisContext) -> Value {
    let range = ctx.statistics.time_range;
    json!({
        "start": range.map(|r| r.start),
        "end": range.map(|r| r.end),
        "services": ctx.services,
        "messages": ctx.statistics.messages.total,
        "meetings": ctx.statistics.meetings.total,
        "dataQuality": ctx.statistics.data_quality.overall,
    })
}

fn prepare_comprehensive(ctx: &AnalysisContext) -> Value {
    json!({
        "period": period(ctx),
        "statistics": ctx.statistics,
        "alerts": ctx.alerts,
    })
}

fn prepare_productivity(ctx: &AnalysisContext) -> Value {
    let messages = &ctx.statistics.messages;
    let meetings = &ctx.statistics.meetings;
    let patterns = &ctx.statistics.patterns;
    json!({
        "period": period(ctx),
        "messages": {
            "total": messages.total,
            "byService": messages.by_service,
            "byWeekday": messages.by_weekday,
            "averageLength": messages.average_length,
            "threadedPercent": percent_of(messages.threaded, messages.total),
            "topChannels": messages.top_channels,
        },
        "meetings": {
            "total": meetings.total,
            "totalMinutes": meetings.total_duration,
            "averageMinutes": meetings.average_duration,
            "averageParticipants": meetings.average_participants,
            "longest": meetings.longest,
        },
        "focus": {
            "hourlyActivity": messages.by_hour,
            "peakHours": patterns.peak_hours,
            "platformSwitchPercent": patterns.platform_switch_percent,
        },
        "topWorkloads": patterns.top_workloads,
    })
}

fn prepare_burnout(ctx: &AnalysisContext) -> Value {
    let messages = &ctx.statistics.messages;
    let meetings = &ctx.statistics.meetings;
    let patterns = &ctx.statistics.patterns;
    let alerts: Vec<_> = ctx
        .alerts
        .iter()
        .filter(|a| BURNOUT.alert_kinds.contains(&a.kind))
        .collect();
    json!({
        "period": period(ctx),
        "afterHoursPercent": patterns.after_hours_percent,
        "weekendPercent": patterns.weekend_percent,
        "hourlyActivity": messages.by_hour,
        "weekdayActivity": messages.by_weekday,
        "topWorkloads": patterns.top_workloads,
        "meetings": {
            "total": meetings.total,
            "totalMinutes": meetings.total_duration,
            "averageMinutes": meetings.average_duration,
            "longest": meetings.longest,
        },
        "alerts": alerts,
    })
}

fn prepare_team_dynamics(ctx: &AnalysisContext) -> Value {
    let cross = &ctx.statistics.cross_service;
    let patterns = &ctx.statistics.patterns;

    let mut services_per_user: BTreeMap<usize, usize> = BTreeMap::new();
    for services in cross.services_by_user.values() {
        *services_per_user.entry(services.len()).or_default() += 1;
    }
    let participation: Vec<usize> = ctx.statistics.messages.by_user.values().copied().collect();

    json!({
        "period": period(ctx),
        "totalUsers": cross.total_users,
        "multiServiceUsers": cross.multi_service_users,
        "collaborationScore": cross.collaboration_score,
        "servicesPerUser": services_per_user,
        "participationBalance": balance_score(&participation),
        "topInteractions": patterns.top_interactions,
        "isolatedUsers": patterns.isolated_users.len(),
        "averageResponseMinutes": patterns.average_response_minutes,
    })
}

fn prepare_communication(ctx: &AnalysisContext) -> Value {
    let messages = &ctx.statistics.messages;
    let cross = &ctx.statistics.cross_service;
    let patterns = &ctx.statistics.patterns;
    json!({
        "period": period(ctx),
        "messagesByService": cross.messages_by_service,
        "meetingsByService": cross.meetings_by_service,
        "serviceBalance": cross.service_balance,
        "topChannels": messages.top_channels,
        "threadedPercent": percent_of(messages.threaded, messages.total),
        "reactions": messages.reactions,
        "messagesWithAttachments": messages.with_attachments,
        "averageLength": messages.average_length,
        "averageResponseMinutes": patterns.average_response_minutes,
        "peakHours": patterns.peak_hours,
    })
}

fn comprehensive_findings(ctx: &AnalysisContext) -> Vec<String> {
    let stats = &ctx.statistics;
    let mut findings = vec![
        format!(
            "{} messages and {} meetings were recorded across {} service(s).",
            stats.messages.total,
            stats.meetings.total,
            ctx.services.len()
        ),
        format!(
            "{}% of people are active on more than one service.",
            stats.cross_service.collaboration_score
        ),
        format!("Data quality is {}%.", stats.data_quality.overall),
    ];
    findings.extend(burnout_findings(ctx).into_iter().take(1));
    findings
}

fn productivity_findings(ctx: &AnalysisContext) -> Vec<String> {
    let stats = &ctx.statistics;
    let mut findings = Vec::new();
    if stats.meetings.total > 0 {
        findings.push(format!(
            "{} meetings took {} minutes in total, {} minutes on average.",
            stats.meetings.total, stats.meetings.total_duration, stats.meetings.average_duration
        ));
    }
    if !stats.patterns.peak_hours.is_empty() {
        let hours: Vec<String> = stats
            .patterns
            .peak_hours
            .iter()
            .map(|h| format!("{h:02}:00"))
            .collect();
        findings.push(format!("Activity peaks at {}.", hours.join(", ")));
    }
    findings.push(format!(
        "{}% of consecutive actions switched to a different service.",
        stats.patterns.platform_switch_percent
    ));
    findings
}

fn burnout_findings(ctx: &AnalysisContext) -> Vec<String> {
    let patterns = &ctx.statistics.patterns;
    let mut findings = vec![format!(
        "{}% of messages were sent outside working hours and {}% on weekends.",
        patterns.after_hours_percent, patterns.weekend_percent
    )];
    if let Some(top) = patterns.top_workloads.first() {
        findings.push(format!(
            "The busiest person sent {} messages and spent {} minutes in meetings.",
            top.messages, top.meeting_minutes
        ));
    }
    findings
}

fn team_dynamics_findings(ctx: &AnalysisContext) -> Vec<String> {
    let cross = &ctx.statistics.cross_service;
    let patterns = &ctx.statistics.patterns;
    let mut findings = vec![format!(
        "{} of {} people use more than one service.",
        cross.multi_service_users, cross.total_users
    )];
    if !patterns.isolated_users.is_empty() {
        findings.push(format!(
            "{} people had no recorded interactions with colleagues.",
            patterns.isolated_users.len()
        ));
    }
    findings
}

fn communication_findings(ctx: &AnalysisContext) -> Vec<String> {
    let stats = &ctx.statistics;
    let mut findings = vec![format!(
        "Service balance is {} out of 100.",
        stats.cross_service.service_balance
    )];
    if let Some(minutes) = stats.patterns.average_response_minutes {
        findings.push(format!("Thread replies arrive after {minutes} minutes on average."));
    }
    if let Some(channel) = stats.messages.top_channels.first() {
        findings.push(format!(
            "The busiest channel is {} with {} messages.",
            channel.name, channel.message_count
        ));
    }
    findings
}
