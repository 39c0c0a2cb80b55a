use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "edge",
    about = "Learn and inspect safety measures of discrete dynamical systems",
    version
)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub(crate) enum CliCommand {
    /// Train a safety learner on the hovership and save its measure.
    Train(TrainArgs),
    /// Print the measure of every state of a saved model.
    Measure(MeasureArgs),
}

#[derive(Debug, Args)]
pub(crate) struct TrainArgs {
    #[arg(
        long,
        env = "EDGE_CONFIG",
        help = "Learner configuration JSON file"
    )]
    pub(crate) config: PathBuf,

    #[arg(long, help = "Folder receiving the trained model")]
    pub(crate) output: PathBuf,

    #[arg(long, help = "Override the configured number of episodes")]
    pub(crate) episodes: Option<usize>,

    #[arg(long, help = "Override the configured random seed")]
    pub(crate) seed: Option<u64>,
}

#[derive(Debug, Args)]
pub(crate) struct MeasureArgs {
    #[arg(long, help = "Model folder written by `edge train`")]
    pub(crate) model: PathBuf,

    #[arg(
        long,
        help = "Probability threshold overriding the saved gamma_measure"
    )]
    pub(crate) gamma: Option<f64>,
}
