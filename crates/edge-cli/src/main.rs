mod bootstrap_helpers;
mod cli_args;
mod commands;

use anyhow::{Context, Result};
use clap::Parser;

use crate::bootstrap_helpers::init_tracing;
use crate::cli_args::{Cli, CliCommand};
use crate::commands::{run_measure, run_train};

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let report = match &cli.command {
        CliCommand::Train(args) => run_train(args)?,
        CliCommand::Measure(args) => run_measure(args)?,
    };
    let rendered = serde_json::to_string_pretty(&report).context("render command output")?;
    println!("{rendered}");
    Ok(())
}
