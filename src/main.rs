//! TeamPulse - cross-service team health analysis
//!
//! Reads a bundle of raw service exports, normalizes and aggregates it, and
//! asks an LLM to interpret the statistics.
//!
//! Exit codes:
//!   0 - Success (nothing above threshold, or no --fail-on set)
//!   1 - Runtime error (unreadable input, malformed record, rejected request, etc.)
//!   2 - Alert or risk found at or above the --fail-on threshold

use anyhow::{Context, Result};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use teampulse::analysis::{AnalysisContext, AnalysisOrchestrator, Cancellation};
use teampulse::cli::{Args, OutputFormat};
use teampulse::config::{Config, Provider, CONFIG_FILE};
use teampulse::llm::{LlmClient, OllamaClient, OpenAiClient};
use teampulse::models::{Report, ReportMetadata};
use teampulse::normalize::{normalize_bundle, RawBundle};
use teampulse::report;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args);

    info!("TeamPulse v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Analysis failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .teampulse.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to customize the model, thresholds and working hours.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Run the complete workflow. Returns the exit code.
async fn run(args: Args) -> Result<i32> {
    let start_time = Instant::now();

    // Load configuration
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);
    config.validate()?;

    // Step 1: Read and normalize the input
    let input = args
        .input
        .as_deref()
        .context("An input file is required (--input)")?;
    println!("📥 Reading input: {}", input.display());

    let bundle = load_bundle(input)?;
    let dataset = normalize_bundle(&bundle).context("Failed to normalize input records")?;
    if dataset.is_empty() {
        warn!("Input contains no records; every analysis will use local statistics only");
    }

    // Step 2: Aggregate
    println!("📊 Computing statistics...");
    let ctx = AnalysisContext::build(&dataset, &config.analysis.context_settings());
    drop(dataset);

    // Step 3: Run the analyses (skipped for --dry-run)
    let mut interrupted = false;
    let analyses = if args.dry_run {
        println!("\n🔍 Dry run: no LLM calls will be made.");
        Vec::new()
    } else {
        let client = build_client(&config)?;

        println!("🤖 Initializing LLM client...");
        println!("   Provider: {}", client.provider());
        println!("   Model: {}", client.model());
        println!("   Endpoint: {}", config.model.effective_url());
        println!("   Timeout: {}s", config.model.timeout_seconds);

        let orchestrator = AnalysisOrchestrator::new(client, config.orchestrator_settings());
        let kinds = config.general.analyses.clone();

        let cancel = Cancellation::new();
        let ctrl_c = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, cancelling in-flight requests");
                    cancel.cancel();
                }
            })
        };

        let spinner = make_spinner(args.quiet, kinds.len());
        let result = orchestrator.run_all(&kinds, &ctx, Some(&cancel)).await;
        spinner.finish_and_clear();
        ctrl_c.abort();

        // Cancelled analyses come back as fallbacks; keep them in the report.
        interrupted = cancel.is_cancelled();
        result.context("LLM request failed")?
    };

    // Step 4: Build the report
    println!("\n📝 Generating report...");

    let duration = start_time.elapsed().as_secs_f64();
    let (provider, model_used) = if args.dry_run {
        ("none".to_string(), "none".to_string())
    } else {
        (
            config.model.provider.as_str().to_string(),
            config.model.name.clone(),
        )
    };

    let report = Report {
        metadata: ReportMetadata {
            generated_at: Utc::now(),
            provider,
            model_used,
            services: ctx.services.clone(),
            duration_seconds: duration,
        },
        statistics: ctx.statistics.clone(),
        alerts: ctx.alerts.clone(),
        analyses,
    };

    let mut output = PathBuf::from(&config.general.output);
    if args.output.is_none() && args.format == OutputFormat::Json {
        output.set_extension("json");
    }
    report::write_report(&report, &output, args.format, &config.report)?;

    // Print summary
    println!("\n📋 Summary:");
    println!(
        "   Records: {} messages | {} meetings",
        report.statistics.messages.total, report.statistics.meetings.total
    );
    println!(
        "   Collaboration: {} | Data quality: {}",
        report.statistics.cross_service.collaboration_score,
        report.statistics.data_quality.overall
    );
    println!("   Alerts: {}", report.alerts.len());
    for alert in &report.alerts {
        println!("     {} {}", alert.severity.emoji(), alert.message);
    }
    if !report.analyses.is_empty() {
        println!(
            "   Analyses: {} ({} from local statistics only)",
            report.analyses.len(),
            report.fallback_count()
        );
    }
    println!("   Duration: {:.1}s", duration);
    println!("\n✅ Report saved to: {}", output.display());

    let exit_code = args.exit_code(report.max_severity(), interrupted);
    match exit_code {
        1 => eprintln!("\n⚠️  Interrupted: unfinished analyses fell back to local statistics."),
        2 => {
            if let Some(level) = args.fail_on {
                eprintln!(
                    "\n⛔ Findings at or above {:?} severity. Failing (exit code 2).",
                    level
                );
            }
        }
        _ => {}
    }

    Ok(exit_code)
}

/// Read the raw bundle JSON file.
fn load_bundle(path: &Path) -> Result<RawBundle> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read input file: {}", path.display()))?;

    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse input file: {}", path.display()))
}

/// Build the LLM client for the configured provider.
fn build_client(config: &Config) -> Result<Arc<dyn LlmClient>> {
    let model = &config.model;
    let url = model.effective_url();

    let client: Arc<dyn LlmClient> = match model.provider {
        Provider::Ollama => Arc::new(OllamaClient::new(url, &model.name, model.timeout())?),
        Provider::OpenAi => {
            let api_key = model.api_key();
            if api_key.is_none() {
                warn!(
                    "{} is not set; sending requests without an API key",
                    model.api_key_env
                );
            }
            Arc::new(OpenAiClient::new(url, &model.name, api_key, model.timeout())?)
        }
    };

    Ok(client)
}

fn make_spinner(quiet: bool, count: usize) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}") {
        pb.set_style(style);
    }
    pb.set_message(format!("Running {} analyses...", count));
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
