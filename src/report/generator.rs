//! Markdown and JSON report generation.
//!
//! This module renders the team health [`Report`] assembled by the CLI.

use crate::analysis::{Alert, StatisticsBundle};
use crate::cli::OutputFormat;
use crate::config::ReportConfig;
use crate::models::{AnalysisResult, Report, ReportMetadata, RiskFactor, Severity};
use anyhow::{Context, Result};
use std::path::Path;

const LIMITED_DATA_NOTICE: &str = "> ⚠️ **Limited data:** the language model was unavailable or \
its reply could not be used, so this section was derived from local statistics only.\n\n";

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &Report, options: &ReportConfig) -> String {
    let mut output = String::new();

    output.push_str("# Team Health Report\n\n");

    output.push_str(&generate_metadata_section(&report.metadata));

    output.push_str(&generate_table_of_contents(report, options));

    if options.include_alerts {
        output.push_str(&generate_alerts_section(&report.alerts));
    }

    if options.include_statistics {
        output.push_str(&generate_statistics_section(&report.statistics));
    }

    output.push_str(&generate_analyses_section(&report.analyses, options));

    output.push_str(&generate_footer());

    output
}

fn anchor(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == ' ' || *c == '-')
        .map(|c| if c == ' ' { '-' } else { c })
        .collect()
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    let services: Vec<&str> = metadata.services.iter().map(|s| s.display_name()).collect();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Provider:** {}\n", metadata.provider));
    section.push_str(&format!("- **Model Used:** `{}`\n", metadata.model_used));
    if services.is_empty() {
        section.push_str("- **Services:** none\n");
    } else {
        section.push_str(&format!("- **Services:** {}\n", services.join(", ")));
    }
    section.push_str(&format!(
        "- **Run Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

/// Generate the table of contents.
fn generate_table_of_contents(report: &Report, options: &ReportConfig) -> String {
    let mut toc = String::new();

    toc.push_str("## Table of Contents\n\n");
    toc.push_str("- [Metadata](#metadata)\n");

    if options.include_alerts {
        toc.push_str("- [Alerts](#alerts)\n");
    }
    if options.include_statistics {
        toc.push_str("- [Statistics](#statistics)\n");
    }

    if !report.analyses.is_empty() {
        toc.push_str("- [Analyses](#analyses)\n");
        for analysis in &report.analyses {
            let title = analysis.kind.title();
            toc.push_str(&format!("  - [{}](#{})\n", title, anchor(title)));
        }
    }

    toc.push('\n');

    toc
}

/// Generate the alerts section.
fn generate_alerts_section(alerts: &[Alert]) -> String {
    let mut section = String::new();

    section.push_str("## Alerts\n\n");

    if alerts.is_empty() {
        section.push_str("No statistic crossed an alert threshold. 🎉\n\n");
        return section;
    }

    section.push_str("| Severity | Alert | Details |\n");
    section.push_str("|:---|:---|:---|\n");
    for alert in alerts {
        section.push_str(&format!(
            "| {} {} | {} | {} |\n",
            alert.severity.emoji(),
            alert.severity,
            alert.kind.title(),
            alert.message
        ));
    }
    section.push('\n');

    section
}

/// Generate the statistics section.
fn generate_statistics_section(stats: &StatisticsBundle) -> String {
    let mut section = String::new();

    section.push_str("## Statistics\n\n");

    section.push_str("### Overview\n\n");
    section.push_str("| Metric | Value |\n");
    section.push_str("|:---|:---:|\n");
    section.push_str(&format!("| Messages | {} |\n", stats.messages.total));
    section.push_str(&format!("| Meetings | {} |\n", stats.meetings.total));
    section.push_str(&format!("| Activities | {} |\n", stats.activities.total));
    section.push_str(&format!(
        "| People | {} ({} on several services) |\n",
        stats.cross_service.total_users, stats.cross_service.multi_service_users
    ));
    section.push_str(&format!(
        "| Collaboration Score | {} |\n",
        stats.cross_service.collaboration_score
    ));
    section.push_str(&format!(
        "| Service Balance | {} |\n",
        stats.cross_service.service_balance
    ));
    section.push_str(&format!(
        "| Data Quality | {} |\n",
        stats.data_quality.overall
    ));
    if let Some(range) = stats.time_range {
        section.push_str(&format!(
            "| Period | {} to {} |\n",
            range.start.format("%Y-%m-%d"),
            range.end.format("%Y-%m-%d")
        ));
    }
    section.push('\n');

    if !stats.cross_service.activity_by_service.is_empty() {
        section.push_str("### Activity by Service\n\n");
        section.push_str("| Service | Messages | Meetings |\n");
        section.push_str("|:---|:---:|:---:|\n");
        for service in stats.cross_service.activity_by_service.keys() {
            section.push_str(&format!(
                "| {} | {} | {} |\n",
                service.display_name(),
                stats.cross_service.messages_by_service.get(service).unwrap_or(&0),
                stats.cross_service.meetings_by_service.get(service).unwrap_or(&0)
            ));
        }
        section.push('\n');
    }

    if stats.meetings.total > 0 {
        section.push_str("### Meetings\n\n");
        section.push_str(&format!(
            "- **Total time:** {} minutes\n",
            stats.meetings.total_duration
        ));
        section.push_str(&format!(
            "- **Average length:** {} minutes\n",
            stats.meetings.average_duration
        ));
        section.push_str(&format!(
            "- **Average attendance:** {}\n\n",
            stats.meetings.average_participants
        ));
    }

    let patterns = &stats.patterns;
    section.push_str("### Communication Patterns\n\n");
    section.push_str(&format!(
        "- **After-hours messages:** {}%\n",
        patterns.after_hours_percent
    ));
    section.push_str(&format!(
        "- **Weekend messages:** {}%\n",
        patterns.weekend_percent
    ));
    section.push_str(&format!(
        "- **Platform switches:** {}%\n",
        patterns.platform_switch_percent
    ));
    if !patterns.peak_hours.is_empty() {
        let hours: Vec<String> = patterns
            .peak_hours
            .iter()
            .map(|h| format!("{:02}:00", h))
            .collect();
        section.push_str(&format!("- **Peak hours:** {}\n", hours.join(", ")));
    }
    if let Some(minutes) = patterns.average_response_minutes {
        section.push_str(&format!(
            "- **Average thread response:** {} minutes\n",
            minutes
        ));
    }
    if !patterns.isolated_users.is_empty() {
        section.push_str(&format!(
            "- **Isolated people:** {}\n",
            patterns.isolated_users.join(", ")
        ));
    }
    section.push('\n');

    if !stats.messages.top_channels.is_empty() {
        section.push_str("### Busiest Channels\n\n");
        section.push_str("| Channel | Service | Messages |\n");
        section.push_str("|:---|:---|:---:|\n");
        for channel in &stats.messages.top_channels {
            section.push_str(&format!(
                "| {} | {} | {} |\n",
                channel.name,
                channel.service.display_name(),
                channel.message_count
            ));
        }
        section.push('\n');
    }

    if !patterns.top_workloads.is_empty() {
        section.push_str("### Heaviest Workloads\n\n");
        section.push_str("| Person | Messages | After Hours | Weekend | Meeting Minutes |\n");
        section.push_str("|:---|:---:|:---:|:---:|:---:|\n");
        for load in &patterns.top_workloads {
            section.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                load.user,
                load.messages,
                load.after_hours_messages,
                load.weekend_messages,
                load.meeting_minutes
            ));
        }
        section.push('\n');
    }

    section
}

/// Generate the analyses section.
fn generate_analyses_section(analyses: &[AnalysisResult], options: &ReportConfig) -> String {
    if analyses.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Analyses\n\n");
    for analysis in analyses {
        section.push_str(&generate_analysis_block(analysis, options));
    }

    section
}

/// Generate the block for one analysis result.
fn generate_analysis_block(analysis: &AnalysisResult, options: &ReportConfig) -> String {
    let mut block = String::new();
    let insights = &analysis.insights;

    block.push_str(&format!("### {}\n\n", analysis.kind.title()));

    if analysis.is_fallback {
        block.push_str(LIMITED_DATA_NOTICE);
    }

    block.push_str(&format!(
        "*Confidence: {} | Data quality: {} | Depth: {}*\n\n",
        analysis.metrics.confidence_score,
        analysis.metrics.data_quality_score,
        analysis.metrics.analysis_depth
    ));

    if !insights.summary.is_empty() {
        block.push_str(&insights.summary);
        block.push_str("\n\n");
    }

    if options.include_scores && !analysis.scores.is_empty() {
        block.push_str("| Score | Value |\n");
        block.push_str("|:---|:---:|\n");
        for (name, value) in &analysis.scores {
            block.push_str(&format!("| {} | {} |\n", name, value));
        }
        block.push('\n');
    }

    if !insights.key_findings.is_empty() {
        block.push_str("#### Key Findings\n\n");
        for finding in &insights.key_findings {
            block.push_str(&format!("- {}\n", finding));
        }
        block.push('\n');
    }

    if !insights.risk_factors.is_empty() {
        block.push_str("#### Risk Factors\n\n");
        let mut risks = insights.risk_factors.clone();
        risks.sort_by(|a, b| b.severity.cmp(&a.severity));
        for risk in &risks {
            block.push_str(&generate_risk_block(risk));
        }
    }

    if !insights.recommendations.is_empty() {
        block.push_str("#### Recommendations\n\n");
        for (i, rec) in insights.recommendations.iter().enumerate() {
            block.push_str(&format!("{}. {}\n", i + 1, rec));
        }
        block.push('\n');
    }

    if !insights.opportunities.is_empty() {
        block.push_str("#### Opportunities\n\n");
        for opportunity in &insights.opportunities {
            block.push_str(&format!(
                "- **{}** ({}): {}\n",
                opportunity.area, opportunity.potential, opportunity.implementation
            ));
        }
        block.push('\n');
    }

    block.push_str("---\n\n");

    block
}

/// Generate a single risk block.
fn generate_risk_block(risk: &RiskFactor) -> String {
    let mut block = String::new();

    let badge = match risk.severity {
        Severity::Critical => "🔴 **CRITICAL**",
        Severity::High => "🟠 **HIGH**",
        Severity::Medium => "🟡 **MEDIUM**",
        Severity::Low => "🟢 **LOW**",
    };

    block.push_str(&format!("- {} {}\n", badge, risk.factor));
    if !risk.impact.is_empty() {
        block.push_str(&format!("  - **Impact:** {}\n", risk.impact));
    }
    if !risk.mitigation.is_empty() {
        block.push_str(&format!("  - 💡 **Mitigation:** {}\n", risk.mitigation));
    }
    block.push('\n');

    block
}

/// Generate the report footer.
fn generate_footer() -> String {
    "---\n\n*Report generated by TeamPulse*\n".to_string()
}

/// Generate a JSON report.
pub fn generate_json_report(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// Render the report in `format` and write it to `path`.
pub fn write_report(
    report: &Report,
    path: &Path,
    format: OutputFormat,
    options: &ReportConfig,
) -> Result<()> {
    let content = match format {
        OutputFormat::Json => generate_json_report(report)?,
        OutputFormat::Markdown => generate_markdown_report(report, options),
    };

    std::fs::write(path, content)
        .with_context(|| format!("Failed to write report to {}", path.display()))
}
