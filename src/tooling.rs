//! Tooling
//!
//! The `strata` command line and its output formatting.

pub mod cli;
pub mod format;

pub use cli::{Cli, CliContext, Commands};
