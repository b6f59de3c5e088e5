//! Application error type.

use databank_core::{BankError, FilterError};
use thiserror::Error;

/// Errors surfaced by the CLI.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Bank(#[from] BankError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error("Config error in {path}: {message}")]
    Config { path: String, message: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Output error: {0}")]
    Output(#[from] serde_json::Error),

    /// The command line named something that does not exist.
    #[error("{0}")]
    Usage(String),
}
