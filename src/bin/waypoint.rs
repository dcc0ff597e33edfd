//! waypoint CLI - runs the place CRUD sequence and writes reports.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::exit;
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, EnvFilter};
use waypoint::{
    ApiClient, FixtureProvider, PlaceSteps, ReporterKind, SequenceReport, SequenceRunner,
    StepOutcome, SuiteConfig, PLACE_CRUD,
};

/// Run the add / update / get / delete sequence against the place API.
#[derive(Parser, Debug)]
#[command(name = "waypoint", version, about)]
struct Cli {
    /// Suite config file (YAML). Defaults to ./waypoint.yaml if present.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Base URL override.
    #[arg(short = 'b', long = "base-url", env = "WAYPOINT_BASE_URL")]
    base_url: Option<String>,

    /// API key sent as the `key` query parameter.
    #[arg(long = "api-key", env = "WAYPOINT_API_KEY")]
    api_key: Option<String>,

    /// Address written by the update step.
    #[arg(long = "new-address")]
    new_address: Option<String>,

    /// Directory holding payload fixtures.
    #[arg(long = "fixture-dir")]
    fixture_dir: Option<PathBuf>,

    /// Directory to write reports into.
    #[arg(short = 'r', long = "report-dir")]
    report_dir: Option<PathBuf>,

    /// Reporting backend; repeat to enable several.
    #[arg(long = "reporter", value_enum)]
    reporters: Vec<ReporterKind>,

    /// Per-request timeout in seconds.
    #[arg(short = 't', long = "timeout")]
    timeout: Option<u64>,

    /// Enable verbose logging.
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    if std::env::var_os("RUST_LOG").is_none() {
        let level = if verbose { "debug" } else { "info" };
        std::env::set_var("RUST_LOG", level);
    }

    if tracing::dispatcher::has_been_set() {
        return;
    }

    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .try_init();
}

fn apply_overrides(config: &mut SuiteConfig, args: Cli) {
    if let Some(base_url) = args.base_url {
        config.base_url = base_url;
    }
    if let Some(api_key) = args.api_key {
        config.api_key = api_key;
    }
    if let Some(new_address) = args.new_address {
        config.new_address = new_address;
    }
    if let Some(dir) = args.fixture_dir {
        config.fixture_dir = dir;
    }
    if let Some(dir) = args.report_dir {
        config.report_dir = dir;
    }
    if !args.reporters.is_empty() {
        config.reporters = args.reporters;
    }
    if args.timeout.is_some() {
        config.timeout_secs = args.timeout;
    }
}

fn print_report(report: &SequenceReport, verbose: bool) {
    let status = if report.success() {
        "\x1b[32mPASS\x1b[0m"
    } else {
        "\x1b[31mFAIL\x1b[0m"
    };
    info!("{} sequence: {} ({} ms)", status, report.name, report.duration_ms);

    for (i, step) in report.steps.iter().enumerate() {
        let mark = match step.outcome {
            StepOutcome::Passed => "\x1b[32m✓\x1b[0m",
            StepOutcome::Failed => "\x1b[31m✗\x1b[0m",
            StepOutcome::Skipped => "\x1b[33m-\x1b[0m",
        };
        info!("  {}. {} {} ({} ms)", i + 1, mark, step.title, step.duration_ms);

        match step.outcome {
            StepOutcome::Failed => error!("     \x1b[31m{}\x1b[0m", step.message),
            StepOutcome::Skipped => info!("     {}", step.message),
            StepOutcome::Passed => debug!("     {}", step.message),
        }

        if verbose {
            for artifact in &step.artifacts {
                let text = artifact.as_text().unwrap_or("[binary]");
                let truncated = if text.chars().count() > 500 {
                    let head: String = text.chars().take(500).collect();
                    format!("{}...(truncated)", head)
                } else {
                    text.to_string()
                };
                debug!("     {}: {}", artifact.label, truncated);
            }
        }
    }

    info!("Summary:");
    info!("  Total: {}", report.steps.len());
    info!("  \x1b[32mPassed: {}\x1b[0m", report.count(StepOutcome::Passed));
    info!("  \x1b[31mFailed: {}\x1b[0m", report.count(StepOutcome::Failed));
    info!("  \x1b[33mSkipped: {}\x1b[0m", report.count(StepOutcome::Skipped));

    match (&report.report_path, &report.report_error) {
        (_, Some(err)) => error!("Failed to save report: {}", err),
        (Some(path), None) => info!("Report saved: {}", path.display()),
        (None, None) => {}
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.verbose);
    let verbose = args.verbose;

    let mut config = SuiteConfig::load_or_default(args.config.as_deref())?;
    apply_overrides(&mut config, args);

    let client =
        ApiClient::new(config.request_spec()).context("Failed to build HTTP client")?;
    let fixtures = FixtureProvider::new(&config.fixture_dir);
    let executor = PlaceSteps::new(client, fixtures, config.place_settings());

    let mut runner = config.environment().into_iter().fold(
        SequenceRunner::new(&config.name, &PLACE_CRUD, config.build_reporter())
            .context("Invalid step sequence")?,
        |runner, (key, value)| runner.with_environment(key, value),
    );

    let report = runner.run(&executor).await;
    print_report(&report, verbose);

    if report.exit_code() != 0 {
        exit(report.exit_code());
    }

    Ok(())
}
