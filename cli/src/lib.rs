//! `magnum` command-line client.
//!
//! Subcommands map one to one onto the resource managers of
//! [`magnum_core::MagnumClient`]; results are printed as pretty JSON.

pub mod cli;
pub mod commands;
pub mod error;

pub use error::{CliError, Result};
