//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::config::Provider;
use crate::models::{AnalysisType, Severity};
use clap::Parser;
use std::path::PathBuf;

/// TeamPulse - cross-service team health analysis
///
/// Normalizes exports from Slack, Discord, Teams, Google Workspace,
/// Chatwork and LINE WORKS, computes team statistics and asks an LLM to
/// interpret them. Markdown/JSON reports.
///
/// Examples:
///   teampulse --input export.json
///   teampulse --input export.json --analysis burnout,team_dynamics
///   teampulse --input export.json --analysis all --format json -o report.json
///   teampulse --input export.json --provider openai --model gpt-4o-mini
///   teampulse --input export.json --dry-run
///   teampulse --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Raw bundle JSON file with messages, meetings and activities
    #[arg(short, long, value_name = "FILE", required_unless_present = "init_config")]
    pub input: Option<PathBuf>,

    /// Analyses to run (comma-separated)
    ///
    /// Values: comprehensive, productivity, burnout, team-dynamics,
    /// communication, all. Default: from config or comprehensive.
    #[arg(short, long, value_name = "KINDS", value_delimiter = ',')]
    pub analysis: Option<Vec<AnalysisArg>>,

    /// LLM provider
    #[arg(long, value_name = "PROVIDER")]
    pub provider: Option<Provider>,

    /// Model to use for analysis
    ///
    /// Can also be set via TEAMPULSE_MODEL env var or .teampulse.toml config.
    #[arg(short, long, env = "TEAMPULSE_MODEL")]
    pub model: Option<String>,

    /// LLM API endpoint URL
    ///
    /// Defaults to http://localhost:11434 for Ollama and
    /// https://api.openai.com for OpenAI-compatible providers.
    #[arg(long, value_name = "URL", env = "TEAMPULSE_LLM_URL")]
    pub llm_url: Option<String>,

    /// Output file path for the report
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Temperature override for every analysis (0.0 - 2.0)
    ///
    /// Without it each analysis uses its own tuned temperature.
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Retries after a transient LLM failure
    #[arg(long, value_name = "COUNT")]
    pub retries: Option<u32>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .teampulse.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Fail if an alert or risk at or above this severity is found
    ///
    /// Useful for CI pipelines. Exit code 2 when threshold is exceeded.
    /// Values: critical, high, medium, low
    #[arg(long, value_name = "LEVEL")]
    pub fail_on: Option<FailOnLevel>,

    /// Dry run: normalize and aggregate without calling the LLM
    ///
    /// Writes a statistics-only report.
    #[arg(long)]
    pub dry_run: bool,

    /// Generate a default .teampulse.toml configuration file
    #[arg(long)]
    pub init_config: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

/// Severity level for --fail-on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, clap::ValueEnum)]
pub enum FailOnLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl From<FailOnLevel> for Severity {
    fn from(level: FailOnLevel) -> Self {
        match level {
            FailOnLevel::Low => Severity::Low,
            FailOnLevel::Medium => Severity::Medium,
            FailOnLevel::High => Severity::High,
            FailOnLevel::Critical => Severity::Critical,
        }
    }
}

/// Analysis selector for --analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum AnalysisArg {
    Comprehensive,
    Productivity,
    Burnout,
    #[value(alias = "team_dynamics")]
    TeamDynamics,
    Communication,
    /// Every analysis
    All,
}

impl AnalysisArg {
    fn kinds(self) -> &'static [AnalysisType] {
        match self {
            AnalysisArg::Comprehensive => &[AnalysisType::Comprehensive],
            AnalysisArg::Productivity => &[AnalysisType::Productivity],
            AnalysisArg::Burnout => &[AnalysisType::Burnout],
            AnalysisArg::TeamDynamics => &[AnalysisType::TeamDynamics],
            AnalysisArg::Communication => &[AnalysisType::Communication],
            AnalysisArg::All => &AnalysisType::ALL,
        }
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        match self.input {
            None => return Err("An input file is required (--input)".to_string()),
            Some(ref input) if !input.is_file() => {
                return Err(format!("Input file does not exist: {}", input.display()));
            }
            Some(_) => {}
        }

        // Validate LLM URL format (not needed for dry-run)
        if !self.dry_run {
            if let Some(ref url) = self.llm_url {
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    return Err("LLM URL must start with 'http://' or 'https://'".to_string());
                }
            }
        }

        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err("Temperature must be between 0.0 and 2.0".to_string());
            }
        }

        if matches!(self.analysis, Some(ref kinds) if kinds.is_empty()) {
            return Err("At least one analysis must be selected".to_string());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// Exit code for a finished run: 1 when interrupted, 2 when the most
    /// severe finding reaches --fail-on, otherwise 0.
    pub fn exit_code(&self, max_severity: Option<Severity>, interrupted: bool) -> i32 {
        if interrupted {
            return 1;
        }
        match (self.fail_on, max_severity) {
            (Some(level), Some(max)) if max >= Severity::from(level) => 2,
            _ => 0,
        }
    }

    /// Requested analyses in command-line order, duplicates removed.
    /// `None` when --analysis was not given.
    pub fn analyses(&self) -> Option<Vec<AnalysisType>> {
        let selected = self.analysis.as_ref()?;
        let mut kinds: Vec<AnalysisType> = Vec::new();
        for kind in selected.iter().flat_map(|arg| arg.kinds()) {
            if !kinds.contains(kind) {
                kinds.push(*kind);
            }
        }
        Some(kinds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            input: None,
            analysis: None,
            provider: None,
            model: None,
            llm_url: None,
            output: None,
            format: OutputFormat::Markdown,
            temperature: None,
            timeout: None,
            retries: None,
            config: None,
            fail_on: None,
            dry_run: false,
            init_config: false,
            verbose: false,
            quiet: false,
        }
    }

    fn with_input() -> (tempfile::NamedTempFile, Args) {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut args = make_args();
        args.input = Some(file.path().to_path_buf());
        (file, args)
    }

    #[test]
    fn test_validation_accepts_existing_input() {
        let (_file, args) = with_input();
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_missing_input() {
        let mut args = make_args();
        args.input = Some(PathBuf::from("/definitely/not/here.json"));
        assert!(args.validate().unwrap_err().contains("does not exist"));
    }

    #[test]
    fn test_init_config_skips_validation() {
        let mut args = make_args();
        args.init_config = true;
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_invalid_url() {
        let (_file, mut args) = with_input();
        args.llm_url = Some("localhost:11434".to_string());
        assert!(args.validate().is_err());

        args.dry_run = true;
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_temperature_range() {
        let (_file, mut args) = with_input();
        args.temperature = Some(2.5);
        assert!(args.validate().is_err());
        args.temperature = Some(0.0);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let (_file, mut args) = with_input();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }

    #[test]
    fn test_analyses_expand_all_and_dedup() {
        let mut args = make_args();
        assert_eq!(args.analyses(), None);

        args.analysis = Some(vec![AnalysisArg::Burnout, AnalysisArg::All]);
        let kinds = args.analyses().unwrap();
        assert_eq!(kinds.len(), 5);
        assert_eq!(kinds[0], AnalysisType::Burnout);
        assert_eq!(kinds[1], AnalysisType::Comprehensive);
    }

    #[test]
    fn test_parse_from_command_line() {
        let args = Args::try_parse_from([
            "teampulse",
            "--input",
            "export.json",
            "--analysis",
            "burnout,team-dynamics",
            "--provider",
            "openai",
            "--fail-on",
            "high",
        ])
        .unwrap();

        assert_eq!(
            args.analyses().unwrap(),
            vec![AnalysisType::Burnout, AnalysisType::TeamDynamics]
        );
        assert_eq!(args.provider, Some(Provider::OpenAi));
        assert_eq!(Severity::from(args.fail_on.unwrap()), Severity::High);
    }

    #[test]
    fn test_input_required_without_init_config() {
        assert!(Args::try_parse_from(["teampulse"]).is_err());
        assert!(Args::try_parse_from(["teampulse", "--init-config"]).is_ok());
    }

    #[test]
    fn test_exit_code() {
        let mut args = make_args();
        assert_eq!(args.exit_code(Some(Severity::Critical), false), 0);
        assert_eq!(args.exit_code(None, true), 1);

        args.fail_on = Some(FailOnLevel::High);
        assert_eq!(args.exit_code(Some(Severity::Medium), false), 0);
        assert_eq!(args.exit_code(Some(Severity::High), false), 2);
        assert_eq!(args.exit_code(None, false), 0);
        // an interrupted run still writes its report but never passes
        assert_eq!(args.exit_code(Some(Severity::Critical), true), 1);
    }
}
