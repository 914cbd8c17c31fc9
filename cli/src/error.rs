//! CLI error types.

use thiserror::Error;

/// Errors surfaced by `magnum` subcommands.
#[derive(Debug, Error)]
pub enum CliError {
    /// Transport or API failure; `{:#}` includes the server's debug info.
    #[error(transparent)]
    Magnum(#[from] magnum_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CliError>;
