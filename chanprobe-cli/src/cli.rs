//! CLI argument parsing using clap derive API
//!
//! This module defines the command-line interface structure using clap's derive macros.
//! It is purely declarative with no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// chanprobe -- channel conformance matrix runner.
///
/// Use `chanprobe <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "chanprobe", version, about, long_about = None)]
pub struct Cli {
    /// Path to the chanprobe.toml configuration file.
    ///
    /// Without this flag `./chanprobe.toml` is used when present, otherwise built-in defaults.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the configured matrix against the in-memory reference cluster.
    Run(RunArgs),

    /// List matrix cells and their generated resource names without running them.
    Matrix(MatrixArgs),

    /// Manage configuration.
    Config(ConfigArgs),
}

// ---- shared selection ----

/// Narrow or adjust the configured matrix.
#[derive(Args, Debug, Default, Clone)]
pub struct SelectionArgs {
    /// Only include channels of this kind (repeatable).
    #[arg(long = "channel", value_name = "KIND")]
    pub channels: Vec<String>,

    /// Event encoding (binary, structured).
    #[arg(long)]
    pub encoding: Option<String>,

    /// Subscription target API version override ("native" keeps each channel's own).
    #[arg(long)]
    pub api_version: Option<String>,
}

// ---- run ----

/// Run the matrix.
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Maximum number of scenarios running at once.
    #[arg(long)]
    pub max_parallel: Option<usize>,
}

// ---- matrix ----

/// List matrix cells.
#[derive(Args, Debug)]
pub struct MatrixArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,
}

// ---- config ----

/// Manage chanprobe configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only a specific section (general, matrix, readiness, delivery, memory).
        #[arg(long)]
        section: Option<String>,
    },
}
