//! chanprobe -- channel conformance matrix runner
//!
//! # Module Structure
//!
//! - [`cli`]: clap argument definitions
//! - [`commands`]: one handler per subcommand
//! - [`output`]: text / JSON rendering
//! - [`logging`]: tracing subscriber setup
//! - [`error`]: CLI errors and exit codes

mod cli;
mod commands;
mod error;
mod logging;
mod output;

use clap::Parser;

use chanprobe_core::config::{ChanprobeConfig, GeneralConfig};

use crate::cli::{Cli, Commands};
use crate::commands::ConfigSource;
use crate::error::CliError;
use crate::output::OutputWriter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("error: {e}");
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let writer = OutputWriter::new(cli.output);
    let source = ConfigSource::resolve(cli.config.as_deref());
    let level = cli.log_level.as_deref();

    match cli.command {
        // `config` reports load errors itself, so logging starts from defaults
        Commands::Config(args) => {
            init_logging(GeneralConfig::default(), level)?;
            commands::config::execute(args, &source, &writer).await
        }
        Commands::Run(args) => {
            let config = load(&source, level).await?;
            commands::run::execute(args, &config, &writer).await
        }
        Commands::Matrix(args) => {
            let config = load(&source, level).await?;
            commands::matrix::execute(args, &config, &writer).await
        }
    }
}

async fn load(source: &ConfigSource, level: Option<&str>) -> Result<ChanprobeConfig, CliError> {
    let config = source.load().await?;
    init_logging(config.general.clone(), level)?;
    tracing::debug!(source = %source.label(), "configuration loaded");
    Ok(config)
}

fn init_logging(mut general: GeneralConfig, level_override: Option<&str>) -> Result<(), CliError> {
    if let Some(level) = level_override {
        general.log_level = level.to_owned();
    }
    logging::init_tracing(&general).map_err(|e| CliError::Command(e.to_string()))
}
