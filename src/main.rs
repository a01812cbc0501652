//! MediGuard - staged patient fraud and discharge-readiness analysis
//!
//! A CLI client for the MediGuard analysis service. One request runs the
//! three agents (identity & claims, billing, discharge) remotely; the
//! client reveals their findings one stage at a time and writes a report.
//!
//! Exit codes:
//!   0 - Analysis complete
//!   1 - Runtime error, or the analysis failed
//!   2 - Analysis returned an incomplete result (not every agent reported)

mod cli;
mod config;
mod error;
mod gateway;
mod models;
mod report;
mod workflow;

use anyhow::{Context, Result};
use cli::{Args, OutputFormat};
use config::{Config, CONFIG_FILE_NAME};
use gateway::{AnalysisGateway, HttpGateway};
use report::{AnalysisReport, ProgressView};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;
use workflow::{Orchestrator, Stage, WorkflowState};

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

    // The log level depends on the merged config, so it is loaded first
    // and its source is reported once logging is up.
    let (mut config, source) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    init_logging(config.log_level(args.quiet));

    info!("MediGuard v{}", env!("CARGO_PKG_VERSION"));
    source.log();
    debug!("Arguments: {:?}", args);

    match run(args, config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Run failed: {}", e);
            eprintln!("\n❌ Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .mediguard.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!("⚠️  {} already exists. Remove it first or edit it manually.", CONFIG_FILE_NAME);
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE_NAME);
    println!("   Edit it to customize the service URL, pacing, and report options.");
    Ok(())
}

/// Initialize logging on stderr; stdout is reserved for the report.
fn init_logging(level: tracing::Level) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

async fn run(args: Args, config: Config) -> Result<i32> {
    let gateway = HttpGateway::new(config.gateway_config())?;

    if args.health {
        return handle_health(&gateway).await;
    }

    if args.samples {
        let ids = gateway.list_sample_ids().await;
        print!("{}", report::render_sample_ids(&ids, config.report.max_samples));
        return Ok(0);
    }

    run_analysis(&args, &config, gateway).await
}

/// Handle --health: query the service health endpoint.
async fn handle_health(gateway: &HttpGateway) -> Result<i32> {
    match gateway.health().await {
        Ok(true) => {
            println!("✅ Analysis service at {} is healthy", gateway.api_url());
            Ok(0)
        }
        Ok(false) => {
            println!("⚠️  Analysis service at {} reports unhealthy", gateway.api_url());
            Ok(1)
        }
        Err(e) => {
            eprintln!("❌ Health check failed ({}): {}", e.status(), e);
            Ok(1)
        }
    }
}

/// Run one staged analysis and write the report.
async fn run_analysis(args: &Args, config: &Config, gateway: HttpGateway) -> Result<i32> {
    let start_time = Instant::now();
    let api_url = gateway.api_url().to_string();
    let orchestrator = Orchestrator::new(Arc::new(gateway), config.workflow_config());

    let state = if args.quiet {
        orchestrator.run(args.patient_id()).await
    } else {
        eprintln!("🔬 Analyzing patient {} ...", args.patient_id().trim());
        follow_run(&orchestrator, args.patient_id()).await
    };

    debug!("Revealed sections: {:?}", state.revealed.keys());

    let duration = start_time.elapsed().as_secs_f64();
    let analysis = AnalysisReport::new(state.clone(), &api_url, duration);

    let output = match config.output_format() {
        OutputFormat::Json => report::generate_json_report(&analysis)?,
        OutputFormat::Markdown => {
            report::generate_markdown_report(&analysis, config.report.include_raw)
        }
    };

    match args.output {
        Some(ref path) => {
            std::fs::write(path, &output)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            eprintln!("📝 Report saved to: {}", path.display());
        }
        None => print!("{}", output),
    }

    Ok(exit_code(&state))
}

/// Start a run and draw each transition until its task ends.
async fn follow_run(orchestrator: &Orchestrator, patient_id: &str) -> WorkflowState {
    let progress = ProgressView::new();
    let mut transitions = orchestrator.transitions();

    orchestrator.start(patient_id);

    let task = orchestrator.join();
    tokio::pin!(task);

    let state = loop {
        tokio::select! {
            biased;
            received = transitions.recv() => match received {
                Ok(snapshot) => {
                    progress.update(&snapshot);
                    if !snapshot.loading {
                        break snapshot;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!("Progress view skipped {} transitions", skipped);
                }
                Err(RecvError::Closed) => break orchestrator.snapshot(),
            },
            joined = &mut task => {
                if let Err(e) = joined {
                    error!("Analysis task ended unexpectedly: {}", e);
                }
                break orchestrator.snapshot();
            }
        }
    };

    progress.finish(&state);
    state
}

fn exit_code(state: &WorkflowState) -> i32 {
    match state.stage {
        Stage::Complete => 0,
        Stage::Failed => {
            eprintln!(
                "❌ Analysis failed: {}",
                state.error.as_deref().unwrap_or("unknown error")
            );
            1
        }
        _ if state.is_incomplete() => {
            eprintln!("⚠️  Analysis returned an incomplete result.");
            2
        }
        _ => 1,
    }
}

/// Where the effective configuration came from.
enum ConfigSource {
    Explicit(PathBuf),
    DefaultFile,
    Builtin,
    /// The default file exists but could not be loaded.
    Fallback(String),
}

impl ConfigSource {
    fn log(&self) {
        match self {
            ConfigSource::Explicit(path) => info!("Loaded config from: {}", path.display()),
            ConfigSource::DefaultFile => info!("Loaded default config from {}", CONFIG_FILE_NAME),
            ConfigSource::Builtin => debug!("No config file found, using defaults"),
            ConfigSource::Fallback(reason) => warn!("Failed to load config: {}", reason),
        }
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<(Config, ConfigSource)> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        let config = Config::load(config_path)?;
        return Ok((config, ConfigSource::Explicit(config_path.clone())));
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok((config, ConfigSource::DefaultFile)),
        Ok(None) => Ok((Config::default(), ConfigSource::Builtin)),
        Err(e) => Ok((Config::default(), ConfigSource::Fallback(format!("{:#}", e)))),
    }
}
