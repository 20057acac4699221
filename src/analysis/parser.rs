//! Lenient parsing of model responses into [`AnalysisResult`]s.
//!
//! Models wrap JSON in prose or code fences, rename fields, return lists of
//! objects where strings were asked for and report confidence as a
//! fraction. The parser accepts all of that; anything it cannot use turns
//! into a locally built fallback result.

use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use super::context::AnalysisContext;
use super::variants::variant;
use crate::error::AnalysisParseError;
use crate::models::{
    AnalysisDepth, AnalysisMetrics, AnalysisResult, AnalysisType, Insights, Opportunity,
    RiskFactor, Severity,
};

pub const DEFAULT_CONFIDENCE: u32 = 75;

/// Cap on `{` positions tried before giving up on a response.
const MAX_CANDIDATES: usize = 32;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Confidence assigned when the model gives none, and to fallback results.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidencePolicy {
    pub default_confidence: u32,
    pub fallback_confidence: u32,
}

impl Default for ConfidencePolicy {
    fn default() -> Self {
        Self {
            default_confidence: DEFAULT_CONFIDENCE,
            fallback_confidence: DEFAULT_CONFIDENCE,
        }
    }
}

#[derive(Debug)]
pub(crate) struct ParsedAnalysis {
    pub insights: Insights,
    pub confidence: Option<u32>,
    pub scores: BTreeMap<String, u32>,
}

/// Byte offset just past the brace that closes the object opened at `start`.
fn balanced_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(start + offset + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// First balanced `{...}` in `text` that parses as a JSON object.
pub(crate) fn extract_json_object(text: &str) -> Result<Map<String, Value>, AnalysisParseError> {
    let mut last_error = None;

    for (start, _) in text.match_indices('{').take(MAX_CANDIDATES) {
        let Some(end) = balanced_end(text, start) else {
            continue;
        };
        match serde_json::from_str::<Value>(&text[start..end]) {
            Ok(Value::Object(map)) => return Ok(map),
            Ok(_) => {}
            Err(e) => last_error = Some(e),
        }
    }

    Err(last_error.map_or(AnalysisParseError::NoJson, AnalysisParseError::Json))
}

fn first<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| obj.get(*k)).filter(|v| !v.is_null())
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn text_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| obj.get(*k).and_then(text_of))
}

/// Strings, or objects carrying their text under a common key.
fn string_list(value: Option<&Value>) -> Vec<String> {
    const TEXT_KEYS: &[&str] = &[
        "text",
        "finding",
        "recommendation",
        "description",
        "title",
        "action",
    ];
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::Object(obj) => text_field(obj, TEXT_KEYS),
                other => text_of(other),
            })
            .collect(),
        Some(other) => text_of(other).into_iter().collect(),
        None => Vec::new(),
    }
}

fn severity_of(value: Option<&Value>) -> Severity {
    value
        .and_then(Value::as_str)
        .map(Severity::from_label)
        .unwrap_or(Severity::Medium)
}

fn risk_list(value: Option<&Value>) -> Vec<RiskFactor> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::Object(obj) => Some(RiskFactor {
                factor: text_field(obj, &["factor", "risk", "title", "name"])?,
                severity: severity_of(first(obj, &["severity", "level", "priority"])),
                impact: text_field(obj, &["impact", "description"]).unwrap_or_default(),
                mitigation: text_field(obj, &["mitigation", "recommendation", "action"])
                    .unwrap_or_default(),
            }),
            other => text_of(other).map(|factor| RiskFactor {
                factor,
                severity: Severity::Medium,
                impact: String::new(),
                mitigation: String::new(),
            }),
        })
        .collect()
}

fn opportunity_list(value: Option<&Value>) -> Vec<Opportunity> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::Object(obj) => Some(Opportunity {
                area: text_field(obj, &["area", "title", "name", "opportunity"])?,
                potential: text_field(obj, &["potential", "impact", "benefit"]).unwrap_or_default(),
                implementation: text_field(obj, &["implementation", "action", "nextStep"])
                    .unwrap_or_default(),
            }),
            other => text_of(other).map(|area| Opportunity {
                area,
                potential: String::new(),
                implementation: String::new(),
            }),
        })
        .collect()
}

fn number_of(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn clamp_score(n: f64) -> u32 {
    n.round().clamp(0.0, 100.0) as u32
}

/// Fractions in `(0, 1]` are read as proportions.
fn confidence_of(value: &Value) -> Option<u32> {
    let n = number_of(value)?;
    Some(clamp_score(if n > 0.0 && n <= 1.0 { n * 100.0 } else { n }))
}

/// Look a key up at the top level, then in the nested sections models use.
fn lookup<'a>(
    root: &'a Map<String, Value>,
    body: &'a Map<String, Value>,
    sections: &[&str],
    keys: &[&str],
) -> Option<&'a Value> {
    first(root, keys)
        .or_else(|| first(body, keys))
        .or_else(|| {
            sections
                .iter()
                .filter_map(|s| root.get(*s).and_then(Value::as_object))
                .find_map(|section| first(section, keys))
        })
}

pub(crate) fn parse_analysis(
    text: &str,
    score_fields: &[&str],
) -> Result<ParsedAnalysis, AnalysisParseError> {
    let root = extract_json_object(text)?;
    let body = root
        .get("insights")
        .and_then(Value::as_object)
        .unwrap_or(&root);

    let summary = text_field(body, &["summary", "executiveSummary", "overview"])
        .or_else(|| text_field(&root, &["summary", "executiveSummary", "overview"]))
        .ok_or(AnalysisParseError::Shape("missing or empty summary"))?;

    let insights = Insights {
        summary,
        key_findings: string_list(first(body, &["keyFindings", "key_findings", "findings"])),
        recommendations: string_list(first(body, &["recommendations", "actions"])),
        risk_factors: risk_list(first(body, &["riskFactors", "risk_factors", "risks"])),
        opportunities: opportunity_list(first(body, &["opportunities"])),
    };

    let confidence = lookup(
        &root,
        body,
        &["metrics"],
        &["confidenceScore", "confidence_score", "confidence"],
    )
    .and_then(confidence_of);

    let scores = score_fields
        .iter()
        .filter_map(|field| {
            let value = lookup(&root, body, &["scores", "metrics"], &[*field])?;
            Some((field.to_string(), clamp_score(number_of(value)?)))
        })
        .collect();

    Ok(ParsedAnalysis {
        insights,
        confidence,
        scores,
    })
}

fn assemble(
    kind: AnalysisType,
    insights: Insights,
    confidence: u32,
    scores: BTreeMap<String, u32>,
    depth: AnalysisDepth,
    is_fallback: bool,
    ctx: &AnalysisContext,
) -> AnalysisResult {
    let generated_at = Utc::now();
    AnalysisResult {
        id: format!(
            "{}-{}-{}",
            kind,
            generated_at.format("%Y%m%d%H%M%S"),
            NEXT_ID.fetch_add(1, Ordering::Relaxed)
        ),
        kind,
        insights,
        metrics: AnalysisMetrics {
            confidence_score: confidence.min(100),
            data_quality_score: ctx.statistics.data_quality.overall,
            analysis_depth: depth,
        },
        scores,
        is_fallback,
        generated_at,
        data_source: ctx.data_source(),
    }
}

/// Result built from local statistics, flagged as a fallback.
pub fn fallback_result(
    kind: AnalysisType,
    ctx: &AnalysisContext,
    policy: &ConfidencePolicy,
) -> AnalysisResult {
    let variant = variant(kind);
    assemble(
        kind,
        variant.fallback_insights(ctx),
        policy.fallback_confidence,
        variant.local_scores(ctx),
        AnalysisDepth::Limited,
        true,
        ctx,
    )
}

/// Turn raw model text into a result. Never fails: unusable text yields
/// [`fallback_result`].
pub fn parse_response(
    kind: AnalysisType,
    text: &str,
    ctx: &AnalysisContext,
    policy: &ConfidencePolicy,
) -> AnalysisResult {
    match parse_analysis(text, variant(kind).score_fields) {
        Ok(parsed) => {
            debug!(
                "Parsed {} response: {} findings, {} risks",
                kind,
                parsed.insights.key_findings.len(),
                parsed.insights.risk_factors.len()
            );
            assemble(
                kind,
                parsed.insights,
                parsed.confidence.unwrap_or(policy.default_confidence),
                parsed.scores,
                ctx.depth(),
                false,
                ctx,
            )
        }
        Err(e) => {
            warn!("Unusable {} response ({}), using local statistics", kind, e);
            fallback_result(kind, ctx, policy)
        }
    }
}
