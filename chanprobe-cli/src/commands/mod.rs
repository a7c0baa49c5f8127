//! Command handlers -- one module per subcommand

pub mod config;
pub mod matrix;
pub mod run;

use std::path::{Path, PathBuf};

use tracing::debug;

use chanprobe_core::config::ChanprobeConfig;
use chanprobe_core::types::{ApiVersionPolicy, ChannelDescriptor, SubscriptionVersion};
use chanprobe_harness::RunOptions;

use crate::cli::SelectionArgs;
use crate::error::CliError;

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "chanprobe.toml";

/// Where the effective configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Loaded from a file
    File(PathBuf),
    /// Built-in defaults with environment overrides
    Defaults,
}

impl ConfigSource {
    /// Resolve the configuration source for an optional `--config` path.
    pub fn resolve(path: Option<&Path>) -> Self {
        match path {
            Some(path) => Self::File(path.to_path_buf()),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Self::File(default.to_path_buf())
                } else {
                    Self::Defaults
                }
            }
        }
    }

    /// Load and validate the configuration, applying `CHANPROBE_*` overrides.
    pub async fn load(&self) -> Result<ChanprobeConfig, CliError> {
        match self {
            Self::File(path) => {
                debug!(path = %path.display(), "loading configuration file");
                Ok(ChanprobeConfig::load(path).await?)
            }
            Self::Defaults => {
                debug!("no configuration file, using built-in defaults");
                let mut config = ChanprobeConfig::default();
                config.apply_env_overrides();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Label used in command output.
    pub fn label(&self) -> String {
        match self {
            Self::File(path) => path.display().to_string(),
            Self::Defaults => "<defaults>".to_owned(),
        }
    }
}

/// The part of the matrix a command operates on.
#[derive(Debug, Clone)]
pub struct Selection {
    /// Channel implementations under test
    pub channels: Vec<ChannelDescriptor>,
    /// Subscription revisions
    pub versions: Vec<SubscriptionVersion>,
    /// Run options after CLI overrides
    pub options: RunOptions,
}

/// Apply `--channel`, `--encoding` and `--api-version` to the configured matrix.
///
/// # Errors
///
/// - `CliError::Command` if `--channel` matches no configured channel
/// - `CliError::Config` if an override value is malformed
pub fn select(config: &ChanprobeConfig, args: &SelectionArgs) -> Result<Selection, CliError> {
    let mut options = RunOptions::from_core(config)?;

    if let Some(encoding) = &args.encoding {
        options.encoding = encoding
            .parse()
            .map_err(|reason: String| CliError::Config(format!("--encoding: {reason}")))?;
    }
    if let Some(api_version) = &args.api_version {
        options.api_version = ApiVersionPolicy::from_setting(api_version);
    }
    options.validate()?;

    let channels: Vec<ChannelDescriptor> = if args.channels.is_empty() {
        config.matrix.channels.clone()
    } else {
        config
            .matrix
            .channels
            .iter()
            .filter(|c| args.channels.iter().any(|k| k == &c.kind))
            .cloned()
            .collect()
    };
    if channels.is_empty() {
        return Err(CliError::Command(format!(
            "no configured channel matches {}",
            args.channels.join(", ")
        )));
    }

    Ok(Selection {
        channels,
        versions: config.matrix.subscription_versions()?,
        options,
    })
}
