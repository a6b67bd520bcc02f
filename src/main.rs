//! Persona Engine - persona-assignment rule engine service
//!
//! This is the main entry point for the persona-engine binary.
//! The service evaluates customer profiles against a configurable rule
//! set, persists persona assignments transactionally, records an audit
//! trail, and serves the assignment/configuration/compliance endpoints
//! over HTTP.

mod aggregate;
mod audit;
mod cli;
mod config;
mod engine;
mod error;
mod logging;
mod monitor;
mod server;
mod store;
mod version;

use clap::Parser;
use tracing::info;

use crate::cli::{Cli, Commands, ConfigSubcommand};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::logging::LogGuards;
use crate::store::Database;

fn main() -> Result<()> {
    // Parse CLI arguments first (before logging, so we know verbosity)
    let cli = Cli::parse();

    // For commands that don't need full logging, use simple setup
    match &cli.command {
        Commands::Version => {
            version::print_version();
            return Ok(());
        }
        Commands::Config { subcommand } => {
            logging::init_simple(tracing::Level::WARN)?;
            return handle_config_command(subcommand.clone());
        }
        _ => {}
    }

    let (config_path, bind_override) = match &cli.command {
        Commands::Run { config, bind } => (config.clone(), bind.clone()),
        _ => (None, None),
    };

    // Load config (or use defaults)
    let mut config = match EngineConfig::load(config_path.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}", e.format_for_log());
            std::process::exit(e.exit_code());
        }
    };
    if let Some(bind) = bind_override {
        config.server.bind_addr = bind;
    }

    // Initialize logging with config settings
    // The guards must be kept alive for the lifetime of the program
    let _log_guards: LogGuards = logging::init_logging(&config.logging, cli.verbose, cli.quiet)?;

    // Log version info at startup
    let build = version::build_info();
    info!(
        version = %build.full_version(),
        target = %build.target,
        profile = %build.profile,
        host = %monitor::get_hostname(),
        "Starting Persona Engine"
    );

    match cli.command {
        Commands::Run { .. } => run_service(config),
        Commands::Version | Commands::Config { .. } => unreachable!(),
    }
}

/// Run the HTTP service until interrupted
fn run_service(config: EngineConfig) -> Result<()> {
    info!(
        bind_addr = %config.server.bind_addr,
        database = %config.database.path,
        "Configuration loaded"
    );

    let db = Database::open(config.database_path(), config.database.busy_timeout_ms)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::Internal(format!("Failed to create runtime: {}", e)))?;

    runtime.block_on(server::serve(&config, db))
}

/// Handle configuration subcommands
fn handle_config_command(subcommand: ConfigSubcommand) -> Result<()> {
    match subcommand {
        ConfigSubcommand::Show { config } => {
            let cfg = EngineConfig::load(config.as_deref())?;
            let rendered = toml::to_string_pretty(&cfg)
                .map_err(|e| Error::Internal(format!("Failed to render config: {}", e)))?;
            println!("{}", rendered);
        }
        ConfigSubcommand::Init { path, force } => {
            config::init_config(path.as_deref(), force)?;
        }
        ConfigSubcommand::Validate { config } => {
            match EngineConfig::load(config.as_deref()) {
                Ok(_) => {
                    println!("Configuration is valid.");
                }
                Err(e) => {
                    eprintln!("{}", e.format_for_log());
                    std::process::exit(e.exit_code());
                }
            }
        }
    }

    Ok(())
}
