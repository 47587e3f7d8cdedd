use std::fs::{self, File};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use log::{info, warn};
use simplelog::{ColorChoice, CombinedLogger, Config, TermLogger, TerminalMode, WriteLogger};

use dfir_agent::cli::Args;
use dfir_agent::collectors::builtin::default_registry;
use dfir_agent::collectors::dispatcher::{DispatchOptions, DispatchReport, Dispatcher};
use dfir_agent::collectors::module::ModuleParams;
use dfir_agent::collectors::registry::ModuleRegistry;
use dfir_agent::collectors::status::StatusReporter;
use dfir_agent::config::{load_config, CollectionConfig};
use dfir_agent::constants::{AGENT_LOG_FILE, STATUS_REPORT_INTERVAL};
use dfir_agent::models::Verbosity;
use dfir_agent::utils::{compress, summary};

fn main() -> Result<()> {
    let args = Args::parse();
    let registry = default_registry();

    if args.list {
        for (name, description) in registry.descriptions() {
            println!("{:<20} {}", name, description);
        }
        return Ok(());
    }

    let config = load_config(args.config.as_deref(), args.overrides())?;

    let hostname = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown-host".to_string());
    let params = build_params(&config, &hostname)?;

    initialize_logging(&params.logs_dir, config.verbosity)?;
    info!("Starting collection on {} into {}", hostname, params.logs_dir.display());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create Tokio runtime")?;
    let report = runtime.block_on(run_batch(registry, &config, Arc::clone(&params)));

    if let Err(e) = summary::write_collection_summary(&hostname, &params, &report) {
        warn!("Failed to write collection summary: {:#}", e);
    }

    if config.archive {
        match compress::compress_logs_dir(
            &params.logs_dir,
            &params.output_dir,
            &hostname,
            &params.file_timestamp,
        ) {
            Ok(path) => info!("Results archive: {}", path.display()),
            Err(e) => warn!("Failed to package results: {:#}", e),
        }
    }

    info!("Collection finished");
    Ok(())
}

/// Fix the run's timestamps and create `<output>/<hostname>.<stamp>`.
fn build_params(config: &CollectionConfig, hostname: &str) -> Result<Arc<ModuleParams>> {
    let params = ModuleParams::starting_at(config.export_format, &config.output_dir, Utc::now())
        .with_input_dir(&config.input_dir)
        .with_verbosity(config.verbosity);

    let logs_dir: PathBuf = config
        .output_dir
        .join(format!("{}.{}", hostname, params.file_timestamp));
    fs::create_dir_all(&logs_dir)
        .with_context(|| format!("Failed to create logs directory {}", logs_dir.display()))?;

    Ok(Arc::new(params.with_logs_dir(logs_dir)))
}

/// Log to the terminal and to `<logs_dir>/agent.log`.
fn initialize_logging(logs_dir: &std::path::Path, verbosity: Verbosity) -> Result<()> {
    let level = verbosity.level_filter();
    let log_file =
        File::create(logs_dir.join(AGENT_LOG_FILE)).context("Failed to create agent log file")?;

    CombinedLogger::init(vec![
        TermLogger::new(level, Config::default(), TerminalMode::Mixed, ColorChoice::Auto),
        WriteLogger::new(level, Config::default(), log_file),
    ])
    .context("Failed to initialize logger")?;
    Ok(())
}

async fn run_batch(
    registry: ModuleRegistry,
    config: &CollectionConfig,
    params: Arc<ModuleParams>,
) -> DispatchReport {
    let names = registry.expand_selection(&config.modules);
    for name in names.iter().filter(|n| !registry.contains(n)) {
        warn!("Requested module '{}' is not registered", name);
    }

    let dispatcher = Dispatcher::new(Arc::new(registry));
    let reporter = StatusReporter::to_stderr(
        dispatcher.board().clone(),
        STATUS_REPORT_INTERVAL,
        config.timeout(),
    )
    .spawn();

    let options = DispatchOptions::new(config.parallelism, config.timeout());
    let report = dispatcher.dispatch(&names, params, options).await;

    reporter.stop().await;
    report
}
