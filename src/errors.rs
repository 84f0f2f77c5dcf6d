//! CLI-level error type. Grounded in the teacher's `errors.rs`, reshaped
//! around `thiserror` directly instead of `soulbase-errors` (see
//! DESIGN.md for that substitution) since nothing downstream of the CLI
//! boundary needs an HTTP-status/retry-class envelope.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("failed to read script file {path}: {source}")]
    ScriptRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to load configuration from {path}: {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: config::ConfigError,
    },

    #[error("invalid log level {0:?}")]
    InvalidLogLevel(String),

    #[error("task failed: {0}")]
    TaskFailed(String),

    #[error("task did not complete within its step budget")]
    OutOfSteps,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type CliResult<T> = Result<T, CliError>;
