//! labelfetch - compliance label acquisition and verification
//!
//! Usage:
//!   labelfetch run <input.tsv>          Fetch, verify and save labels for every row
//!   labelfetch check-config             Validate the configuration and print it
//!   labelfetch verify-text <file>       Check a rendered label text offline

mod telemetry;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use labelfetch_core::{
    create_ledger_system, load_config, metrics, native_backend, read_parsed_input,
    validate_config, AcquisitionOrchestrator, BatchReport, CancelFlag, CdpNavigator, Config,
    ContentVerifier, ItemStatus, LedgerStore, OrchestratorError, ProductionKeyResolver,
    SanitizedConfig, ShipmentItem, SqliteLedgerStore, StaticCredentials, TripRoutedPaths,
    VerifierConfig, WebNavigator, WindowController,
};

/// Default location of the production-number export, under the output root.
const EXPORT_FILE_NAME: &str = "production_numbers.csv";

#[derive(Parser)]
#[command(name = "labelfetch")]
#[command(author, version, about = "Compliance label acquisition and verification")]
struct Cli {
    /// Configuration file
    #[arg(short, long, env = "LABELFETCH_CONFIG", default_value = "labelfetch.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, verify and save the label of every item in a parsed input file
    Run {
        /// Tab-separated input (trip, tracking_number, item_name, lot, production_number)
        input: PathBuf,
    },

    /// Validate the configuration and print it with secrets redacted
    CheckConfig,

    /// Check a rendered label text for an item and lot without touching the portal
    VerifyText {
        /// Text file to check, `-` for stdin
        file: PathBuf,

        #[arg(long)]
        item: String,

        #[arg(long)]
        lot: String,

        /// Regulatory marker (defaults to the built-in marker)
        #[arg(long)]
        marker: Option<String>,

        /// Fold dashes and OCR digit confusions before matching
        #[arg(long)]
        ocr_cleanup: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run { ref input } => run(&cli.config, input).await,
        Commands::CheckConfig => check_config(&cli.config),
        Commands::VerifyText {
            ref file,
            ref item,
            ref lot,
            ref marker,
            ocr_cleanup,
        } => verify_text(file, item, lot, marker.as_deref(), ocr_cleanup),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!("Fatal error: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn load(config_path: &Path) -> Result<Config> {
    let config = load_config(config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;
    Ok(config)
}

fn check_config(config_path: &Path) -> Result<ExitCode> {
    let config = load(config_path)?;
    let sanitized = SanitizedConfig::from(&config);
    println!("{}", serde_json::to_string_pretty(&sanitized)?);
    println!("config hash: {}", sanitized.hash());
    Ok(ExitCode::SUCCESS)
}

fn verify_text(
    file: &Path,
    item: &str,
    lot: &str,
    marker: Option<&str>,
    ocr_cleanup: bool,
) -> Result<ExitCode> {
    let text = if file == Path::new("-") {
        std::io::read_to_string(std::io::stdin()).context("Failed to read stdin")?
    } else {
        std::fs::read_to_string(file).with_context(|| format!("Failed to read {:?}", file))?
    };

    let mut verifier_config = VerifierConfig {
        ocr_cleanup,
        ..VerifierConfig::default()
    };
    if let Some(marker) = marker {
        verifier_config.regulatory_marker = marker.to_string();
    }
    let report = ContentVerifier::from_config(&verifier_config).inspect(&text, item, lot);

    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.passed() {
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("missing: {}", report.missing().join(", "));
        Ok(ExitCode::from(2))
    }
}

async fn run(config_path: &Path, input: &Path) -> Result<ExitCode> {
    let config = load(config_path)?;
    telemetry::init(&config.logging)?;

    let sanitized = SanitizedConfig::from(&config);
    let config_hash = sanitized.hash();
    info!(
        config = %serde_json::to_string(&sanitized).unwrap_or_default(),
        hash = %config_hash,
        "Configuration loaded"
    );

    let rows = read_parsed_input(input)
        .with_context(|| format!("Failed to read input from {:?}", input))?;
    let items: Vec<ShipmentItem> = rows.iter().map(ShipmentItem::from).collect();
    if items.is_empty() {
        warn!(input = ?input, "Input has no items, nothing to do");
        return Ok(ExitCode::SUCCESS);
    }

    let mut paths = TripRoutedPaths::new(&config.output);
    for item in &items {
        paths.register(&item.item_key, &item.lot_key, &item.trip);
    }

    let store: Arc<dyn LedgerStore> = Arc::new(
        SqliteLedgerStore::new(&config.ledger.database_path)
            .context("Failed to open verification ledger")?,
    );
    let (ledger, writer) = create_ledger_system(store, config.orchestrator.ledger_buffer);
    let writer_handle = tokio::spawn(writer.run());

    let navigator: Arc<dyn WebNavigator> = Arc::new(
        CdpNavigator::launch(
            config.portal.clone(),
            &config.browser,
            config.locators.clone(),
            config.stages.clone(),
        )
        .context("Failed to start browser")?,
    );
    let backend = native_backend().context("Failed to start desktop automation")?;
    let resolver = ProductionKeyResolver::from_config(&config.production_key)
        .context("Invalid production key pattern")?;

    let cancel = CancelFlag::new();
    let controller = Arc::new(
        WindowController::new(backend, config.desktop.clone(), config.stages.clone())
            .with_cancel_flag(cancel.clone()),
    );
    let orchestrator = AcquisitionOrchestrator::new(
        config.orchestrator.clone(),
        navigator,
        controller,
        ContentVerifier::from_config(&config.verifier),
        resolver,
        Arc::new(paths),
    )
    .with_ledger(ledger)
    .with_cancel_flag(cancel.clone())
    .with_config_hash(config_hash);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current step");
            cancel.cancel();
        }
    });

    let credentials = StaticCredentials::new(
        config.portal.username.clone(),
        config.portal.password.clone(),
    );
    let outcome = orchestrator.run_batch(&credentials, items).await;

    // The writer stops once the last handle, held by the orchestrator, is gone.
    drop(orchestrator);
    match writer_handle.await {
        Ok(summary) if summary.failed > 0 => warn!(
            written = summary.written,
            failed = summary.failed,
            "Some ledger records were not stored"
        ),
        Ok(summary) => info!(written = summary.written, "Ledger flushed"),
        Err(e) => error!(error = %e, "Ledger writer task failed"),
    }

    let (report, code) = match outcome {
        Ok(report) => {
            let code = if report.cancelled {
                ExitCode::from(130)
            } else {
                ExitCode::SUCCESS
            };
            (report, code)
        }
        Err(OrchestratorError::SessionLost { source, report }) => {
            error!(error = %source, "Run aborted after losing the portal session");
            (*report, ExitCode::FAILURE)
        }
        Err(e) => return Err(e).context("Run failed"),
    };

    write_outputs(&config, &report)?;
    print_summary(&report);
    Ok(code)
}

fn write_outputs(config: &Config, report: &BatchReport) -> Result<()> {
    let export_path = config
        .ledger
        .csv_export_path
        .clone()
        .unwrap_or_else(|| config.output.root.join(EXPORT_FILE_NAME));
    labelfetch_core::ledger::write_export_file(&export_path, &report.export_rows())
        .with_context(|| format!("Failed to write export to {:?}", export_path))?;
    info!(path = ?export_path, "Production numbers exported");

    if let Some(ref path) = config.metrics.textfile_path {
        let text = metrics::render().context("Failed to render metrics")?;
        std::fs::write(path, text)
            .with_context(|| format!("Failed to write metrics to {:?}", path))?;
    }
    Ok(())
}

fn print_summary(report: &BatchReport) {
    println!(
        "run {}: {} saved, {} exhausted, {} failed",
        report.run_id,
        report.count(ItemStatus::Saved),
        report.count(ItemStatus::VerificationExhausted),
        report.count(ItemStatus::Failed),
    );
    for outcome in &report.outcomes {
        let detail = match (&outcome.result.output_path, &outcome.result.failure_reason) {
            (Some(path), _) => path.display().to_string(),
            (None, Some(reason)) => reason.clone(),
            (None, None) => String::new(),
        };
        println!(
            "  {:<24} {:<12} {:<24} {}",
            outcome.item.reference(),
            outcome.item.status.as_str(),
            outcome.result.production_key.as_deref().unwrap_or("-"),
            detail
        );
    }
    for (stage, count) in report.errors.summary() {
        println!("  {} failure(s) at {}", count, stage);
    }
}
