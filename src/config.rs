//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.teampulse.toml` files. Every threshold the analysis uses has a named
//! default here and can be overridden per team.

use crate::analysis::{
    AlertThresholds, ConfidencePolicy, ContextSettings, OrchestratorSettings, WorkSchedule,
    DEFAULT_CONFIDENCE,
};
use crate::analysis::alerts::{
    DEFAULT_AFTER_HOURS_RATIO, DEFAULT_COLLABORATION_THRESHOLD, DEFAULT_LONG_MEETING_MINUTES,
    DEFAULT_QUALITY_THRESHOLD, DEFAULT_WEEKEND_RATIO,
};
use crate::models::AnalysisType;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE: &str = ".teampulse.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Model settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Statistics and alert settings.
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default output file path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Analyses run when none are given on the command line.
    #[serde(default = "default_analyses")]
    pub analyses: Vec<AnalysisType>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            verbose: false,
            analyses: default_analyses(),
        }
    }
}

fn default_output() -> String {
    "team_health_report.md".to_string()
}

fn default_analyses() -> Vec<AnalysisType> {
    vec![AnalysisType::Comprehensive]
}

/// Which API family the model is served by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Local Ollama server (default)
    #[default]
    Ollama,
    /// OpenAI or any OpenAI-compatible endpoint
    #[value(name = "openai")]
    #[serde(rename = "openai")]
    OpenAi,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Ollama => "ollama",
            Provider::OpenAi => "openai",
        }
    }

    pub fn default_url(&self) -> &'static str {
        match self {
            Provider::Ollama => "http://localhost:11434",
            Provider::OpenAi => "https://api.openai.com",
        }
    }
}

/// LLM model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub provider: Provider,

    /// Default model name.
    #[serde(default = "default_model")]
    pub name: String,

    /// API URL. Falls back to the provider's usual endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Environment variable holding the API key (OpenAI only).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Overrides the per-analysis temperature when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Number of retries on transient failure.
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Delay before the first retry, doubled on each further one.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            name: default_model(),
            url: None,
            api_key_env: default_api_key_env(),
            temperature: None,
            timeout_seconds: default_timeout(),
            retries: default_retries(),
            retry_backoff_ms: default_retry_backoff(),
        }
    }
}

fn default_model() -> String {
    "llama3.2:latest".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_timeout() -> u64 {
    120
}

fn default_retries() -> u32 {
    2
}

fn default_retry_backoff() -> u64 {
    500
}

impl ModelConfig {
    pub fn effective_url(&self) -> &str {
        self.url
            .as_deref()
            .unwrap_or_else(|| self.provider.default_url())
    }

    /// API key read from `api_key_env`, if set and non-blank.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Statistics, alert and confidence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Confidence used when the model reports none.
    #[serde(default = "default_confidence")]
    pub default_confidence: u32,

    /// Confidence given to locally synthesized results.
    #[serde(default = "default_confidence")]
    pub fallback_confidence: u32,

    /// Data quality (0-100) below which an alert fires.
    #[serde(default = "default_quality_threshold")]
    pub quality_alert_threshold: f64,

    /// Share of after-hours messages above which an alert fires.
    #[serde(default = "default_after_hours_ratio")]
    pub after_hours_risk_ratio: f64,

    /// Share of weekend messages above which an alert fires.
    #[serde(default = "default_weekend_ratio")]
    pub weekend_risk_ratio: f64,

    /// Collaboration score below which an alert fires.
    #[serde(default = "default_collaboration_threshold")]
    pub low_collaboration_threshold: f64,

    /// Average meeting length in minutes above which an alert fires.
    #[serde(default = "default_long_meeting_minutes")]
    pub long_meeting_minutes: f64,

    #[serde(default = "default_top_channels")]
    pub top_channels: usize,

    #[serde(default = "default_peak_hours")]
    pub peak_hours: usize,

    #[serde(default = "default_top_users")]
    pub top_users: usize,

    /// First working hour (local time).
    #[serde(default = "default_work_day_start")]
    pub work_day_start: u32,

    /// Hour the working day ends (local time, exclusive).
    #[serde(default = "default_work_day_end")]
    pub work_day_end: u32,

    /// Team time zone as a whole-hour offset from UTC.
    #[serde(default)]
    pub utc_offset_hours: i32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            default_confidence: default_confidence(),
            fallback_confidence: default_confidence(),
            quality_alert_threshold: default_quality_threshold(),
            after_hours_risk_ratio: default_after_hours_ratio(),
            weekend_risk_ratio: default_weekend_ratio(),
            low_collaboration_threshold: default_collaboration_threshold(),
            long_meeting_minutes: default_long_meeting_minutes(),
            top_channels: default_top_channels(),
            peak_hours: default_peak_hours(),
            top_users: default_top_users(),
            work_day_start: default_work_day_start(),
            work_day_end: default_work_day_end(),
            utc_offset_hours: 0,
        }
    }
}

fn default_confidence() -> u32 {
    DEFAULT_CONFIDENCE
}

fn default_quality_threshold() -> f64 {
    DEFAULT_QUALITY_THRESHOLD
}

fn default_after_hours_ratio() -> f64 {
    DEFAULT_AFTER_HOURS_RATIO
}

fn default_weekend_ratio() -> f64 {
    DEFAULT_WEEKEND_RATIO
}

fn default_collaboration_threshold() -> f64 {
    DEFAULT_COLLABORATION_THRESHOLD
}

fn default_long_meeting_minutes() -> f64 {
    DEFAULT_LONG_MEETING_MINUTES
}

fn default_top_channels() -> usize {
    5
}

fn default_peak_hours() -> usize {
    3
}

fn default_top_users() -> usize {
    5
}

fn default_work_day_start() -> u32 {
    9
}

fn default_work_day_end() -> u32 {
    18
}

impl AnalysisConfig {
    pub fn thresholds(&self) -> AlertThresholds {
        AlertThresholds {
            min_data_quality: self.quality_alert_threshold,
            max_after_hours_ratio: self.after_hours_risk_ratio,
            max_weekend_ratio: self.weekend_risk_ratio,
            min_collaboration: self.low_collaboration_threshold,
            max_average_meeting_minutes: self.long_meeting_minutes,
        }
    }

    pub fn schedule(&self) -> WorkSchedule {
        WorkSchedule {
            day_start_hour: self.work_day_start,
            day_end_hour: self.work_day_end,
            utc_offset_hours: self.utc_offset_hours,
        }
    }

    pub fn context_settings(&self) -> ContextSettings {
        ContextSettings {
            top_channels: self.top_channels,
            peak_hours: self.peak_hours,
            top_users: self.top_users,
            schedule: self.schedule(),
            thresholds: self.thresholds(),
        }
    }

    pub fn confidence_policy(&self) -> ConfidencePolicy {
        ConfidencePolicy {
            default_confidence: self.default_confidence.min(100),
            fallback_confidence: self.fallback_confidence.min(100),
        }
    }
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Include the statistics section.
    #[serde(default = "default_true")]
    pub include_statistics: bool,

    /// Include the alerts section.
    #[serde(default = "default_true")]
    pub include_alerts: bool,

    /// Include per-analysis score tables.
    #[serde(default = "default_true")]
    pub include_scores: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            include_statistics: true,
            include_alerts: true,
            include_scores: true,
        }
    }
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        Self::load_from_dir(Path::new("."))
    }

    /// Try to load `.teampulse.toml` from a directory.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let config_path = dir.join(CONFIG_FILE);

        if config_path.exists() {
            Ok(Some(Self::load(&config_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// This method only overrides config when CLI provides explicit values.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(provider) = args.provider {
            // A URL configured for another provider makes no sense anymore
            if provider != self.model.provider && args.llm_url.is_none() {
                self.model.url = None;
            }
            self.model.provider = provider;
        }
        if let Some(ref model) = args.model {
            self.model.name = model.clone();
        }
        if let Some(ref url) = args.llm_url {
            self.model.url = Some(url.clone());
        }
        if args.temperature.is_some() {
            self.model.temperature = args.temperature;
        }
        if let Some(timeout) = args.timeout {
            self.model.timeout_seconds = timeout;
        }
        if let Some(retries) = args.retries {
            self.model.retries = retries;
        }

        if let Some(analyses) = args.analyses() {
            self.general.analyses = analyses;
        }
        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }

        // Flags always override
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Reject settings the analysis cannot work with.
    pub fn validate(&self) -> Result<()> {
        let analysis = &self.analysis;

        if self.general.analyses.is_empty() {
            bail!("general.analyses must name at least one analysis");
        }
        if self.model.timeout_seconds == 0 {
            bail!("model.timeout_seconds must be at least 1");
        }
        if let Some(temperature) = self.model.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                bail!("model.temperature must be between 0.0 and 2.0");
            }
        }
        if analysis.work_day_start >= analysis.work_day_end || analysis.work_day_end > 24 {
            bail!(
                "analysis.work_day_start ({}) must be before analysis.work_day_end ({}) within 0-24",
                analysis.work_day_start,
                analysis.work_day_end
            );
        }
        if !(-23..=23).contains(&analysis.utc_offset_hours) {
            bail!("analysis.utc_offset_hours must be between -23 and 23");
        }
        for (name, ratio) in [
            ("after_hours_risk_ratio", analysis.after_hours_risk_ratio),
            ("weekend_risk_ratio", analysis.weekend_risk_ratio),
        ] {
            if !(0.0..=1.0).contains(&ratio) {
                bail!("analysis.{} must be between 0.0 and 1.0", name);
            }
        }

        Ok(())
    }

    /// Orchestrator settings derived from the model and analysis sections.
    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            temperature: self.model.temperature,
            timeout: self.model.timeout(),
            retries: self.model.retries,
            retry_backoff: Duration::from_millis(self.model.retry_backoff_ms),
            confidence: self.analysis.confidence_policy(),
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{AnalysisArg, Args};
    use clap::Parser;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.model.name, "llama3.2:latest");
        assert_eq!(config.model.provider, Provider::Ollama);
        assert_eq!(config.model.effective_url(), "http://localhost:11434");
        assert_eq!(config.analysis.fallback_confidence, 75);
        assert_eq!(config.analysis.quality_alert_threshold, 70.0);
        assert_eq!(config.general.analyses, vec![AnalysisType::Comprehensive]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
output = "custom_report.md"
verbose = true
analyses = ["burnout", "team_dynamics"]

[model]
provider = "openai"
name = "gpt-4o-mini"
temperature = 0.2

[analysis]
fallback_confidence = 60
utc_offset_hours = 9
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.general.output, "custom_report.md");
        assert!(config.general.verbose);
        assert_eq!(
            config.general.analyses,
            vec![AnalysisType::Burnout, AnalysisType::TeamDynamics]
        );
        assert_eq!(config.model.provider, Provider::OpenAi);
        assert_eq!(config.model.effective_url(), "https://api.openai.com");
        assert_eq!(config.model.temperature, Some(0.2));
        assert_eq!(config.analysis.confidence_policy().fallback_confidence, 60);
        assert_eq!(config.analysis.confidence_policy().default_confidence, 75);
        assert_eq!(config.analysis.schedule().utc_offset_hours, 9);
        assert_eq!(config.model.retries, 2);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[analysis]\nlong_meeting_minutes = 45.0").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.analysis.thresholds().max_average_meeting_minutes, 45.0);
        assert_eq!(config.analysis.context_settings().top_channels, 5);
    }

    #[test]
    fn test_load_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load_from_dir(dir.path()).unwrap().is_none());

        std::fs::write(dir.path().join(CONFIG_FILE), "[model]\nretries = 5\n").unwrap();
        let config = Config::load_from_dir(dir.path()).unwrap().unwrap();
        assert_eq!(config.model.retries, 5);

        std::fs::write(dir.path().join(CONFIG_FILE), "[model\n").unwrap();
        assert!(Config::load_from_dir(dir.path()).is_err());
    }

    #[test]
    fn test_merge_with_args() {
        let mut config = Config::default();
        config.model.url = Some("http://gpu-box:11434".to_string());

        let mut args = Args::try_parse_from(["teampulse", "--input", "in.json"]).unwrap();
        args.provider = Some(Provider::OpenAi);
        args.model = Some("gpt-4o".to_string());
        args.retries = Some(0);
        args.analysis = Some(vec![AnalysisArg::All]);
        config.merge_with_args(&args);

        assert_eq!(config.model.provider, Provider::OpenAi);
        assert_eq!(config.model.effective_url(), "https://api.openai.com");
        assert_eq!(config.model.name, "gpt-4o");
        assert_eq!(config.model.retries, 0);
        assert_eq!(config.general.analyses.len(), 5);
        assert_eq!(config.model.timeout_seconds, 120);
    }

    #[test]
    fn test_validate_rejects_bad_schedule() {
        let mut config = Config::default();
        config.analysis.work_day_start = 18;
        config.analysis.work_day_end = 9;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.analysis.weekend_risk_ratio = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_orchestrator_settings() {
        let mut config = Config::default();
        config.model.retry_backoff_ms = 250;
        let settings = config.orchestrator_settings();
        assert_eq!(settings.timeout, Duration::from_secs(120));
        assert_eq!(settings.retry_backoff, Duration::from_millis(250));
        assert_eq!(settings.temperature, None);
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[model]"));
        assert!(toml_str.contains("[analysis]"));
        assert!(toml_str.contains("[report]"));

        let reparsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(reparsed.analysis.peak_hours, 3);
    }
}
