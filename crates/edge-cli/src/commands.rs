use anyhow::{Context, Result};
use edge_envs::{DiscreteHovership, Environment};
use edge_safety::{MaternSafety, StateQuery};
use edge_trainer::{
    build_hovership_learner, load_run_manifest, save_run_manifest, LearnerConfig, RunManifest,
};
use serde_json::{json, Value};
use tracing::info;

use crate::cli_args::{MeasureArgs, TrainArgs};

pub(crate) fn run_train(args: &TrainArgs) -> Result<Value> {
    let raw = std::fs::read_to_string(&args.config)
        .with_context(|| format!("read learner config {}", args.config.display()))?;
    let value: Value = serde_json::from_str(&raw)
        .with_context(|| format!("parse learner config JSON {}", args.config.display()))?;
    let mut config = LearnerConfig::from_json(&value)?;
    if let Some(episodes) = args.episodes {
        config.episodes = episodes;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }

    let mut learner = build_hovership_learner(&config)?;
    let summary = learner.run_episodes(config.episodes)?;
    learner.checkpoint(&args.output)?;
    save_run_manifest(&args.output, &RunManifest::new(config, summary))?;
    info!(
        output = %args.output.display(),
        episodes = summary.episodes,
        failures = summary.failures,
        "training finished"
    );

    Ok(json!({
        "output": args.output.display().to_string(),
        "summary": serde_json::to_value(summary).context("serialize run summary")?,
    }))
}

pub(crate) fn run_measure(args: &MeasureArgs) -> Result<Value> {
    let manifest = load_run_manifest(&args.model)?;
    let env = DiscreteHovership::new(manifest.config.hovership.clone())?;
    let space = env.stateaction_space().clone();
    let safety = MaternSafety::load(&args.model, space, args.gamma, None)
        .with_context(|| format!("load safety measure from {}", args.model.display()))?;
    let measure = safety.measure(StateQuery::All, 0.0, None)?;
    let states = safety.space().state_space().values();

    Ok(json!({
        "gamma_measure": safety.gamma_measure(),
        "states": states.outer_iter().map(|state| state.to_vec()).collect::<Vec<_>>(),
        "measure": measure.to_vec(),
    }))
}
