//! CLI argument parsing using clap v4
//!
//! Defines the command-line interface for the persona engine.

use clap::{Parser, Subcommand};

/// Persona Engine - persona-assignment rule engine service
///
/// Classifies customer profiles into named personas using configurable
/// thresholds, lists, and lookup maps, records the classification durably,
/// and exposes the assignment, audit, and compliance endpoints over HTTP.
#[derive(Parser, Debug)]
#[command(name = "persona-engine")]
#[command(author, version, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for the engine
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP service (serves until interrupted)
    Run {
        /// Path to configuration file
        #[arg(short, long, env = "PERSONA_ENGINE_CONFIG")]
        config: Option<String>,

        /// Override the listen address for this run (e.g. 127.0.0.1:8080)
        #[arg(long, env = "PERSONA_ENGINE_BIND")]
        bind: Option<String>,
    },

    /// Display version and build information
    Version,

    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigSubcommand {
    /// Display the current configuration
    Show {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Initialize a new configuration file
    Init {
        /// Path where to create the config file
        #[arg(short, long)]
        path: Option<String>,

        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Validate a configuration file
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        config: Option<String>,
    },
}
