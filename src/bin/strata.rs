//! Strata CLI Binary
//!
//! Command-line interface for the strata document store.

use anyhow::Context;
use clap::Parser;
use strata::logging::init_logging;
use strata::tooling::cli::{Cli, CliContext};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let context = CliContext::new(cli.data_dir.clone(), cli.config.clone(), cli.color.enabled())
        .context("Error loading configuration")?;

    let logging = cli.logging_config(&context.config().logging);
    if let Err(e) = init_logging(Some(&logging)) {
        eprintln!("Warning: logging disabled: {}", e);
    }

    let output = context
        .execute(&cli.command)
        .context("Command failed")?;
    if !output.is_empty() {
        print!("{}", output);
        if !output.ends_with('\n') {
            println!();
        }
    }
    Ok(())
}
