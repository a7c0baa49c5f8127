//! CLI-specific error types and exit code mapping

use chanprobe_core::error::{ChanprobeError, ConfigError};

/// CLI-specific error type.
///
/// The `exit_code()` method maps errors to process exit codes so CI jobs can
/// tell a misconfigured run apart from a channel that failed the matrix.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// The matrix ran to completion but some cells failed.
    #[error("{failed} of {total} matrix cells failed")]
    ScenarioFailures {
        /// Number of failed cells
        failed: usize,
        /// Number of cells in the matrix
        total: usize,
    },

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from chanprobe-core.
    #[error("{0}")]
    Core(#[from] ChanprobeError),
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::Core(ChanprobeError::Config(e))
    }
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                         |
    /// |------|---------------------------------|
    /// | 0    | Success                         |
    /// | 1    | General / command error         |
    /// | 2    | Configuration error             |
    /// | 5    | One or more matrix cells failed |
    /// | 10   | IO error                        |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Core(ChanprobeError::Config(_)) => 2,
            Self::ScenarioFailures { .. } => 5,
            Self::Io(_) | Self::Core(ChanprobeError::Io(_)) => 10,
            Self::JsonSerialize(_) | Self::Command(_) | Self::Core(_) => 1,
        }
    }
}
