use edge_envs::{DiscreteHovership, Environment, HovershipParameters};
use edge_inference::Regressor;
use edge_safety::{MaternSafety, StateQuery};
use edge_trainer::{
    build_hovership_learner, load_run_manifest, save_run_manifest, LearnerConfig,
    QLearningConfig, RunManifest, Q_MODEL_DIR,
};
use edge_value::MaternGpQLearning;

fn learner_config() -> LearnerConfig {
    LearnerConfig {
        episodes: 4,
        max_episode_steps: 6,
        seed: 11,
        q_learning: Some(QLearningConfig::default()),
        ..LearnerConfig::default()
    }
}

#[test]
fn integration_trained_measure_survives_checkpoint_and_reload() {
    let temp = tempfile::tempdir().expect("tempdir");
    let folder = temp.path().join("run");
    let config = learner_config();

    let mut learner = build_hovership_learner(&config).expect("learner");
    let summary = learner.run_episodes(config.episodes).expect("train");
    assert_eq!(summary.episodes, 4);
    assert!(learner.safety().gp().train_y().len() > 2);
    learner.checkpoint(&folder).expect("checkpoint");
    save_run_manifest(&folder, &RunManifest::new(config.clone(), summary)).expect("manifest");

    let manifest = load_run_manifest(&folder).expect("load manifest");
    assert_eq!(manifest.config, config);
    assert_eq!(manifest.summary, summary);

    let env = DiscreteHovership::new(manifest.config.hovership.clone()).expect("env");
    let space = env.stateaction_space().clone();
    let loaded = MaternSafety::load(&folder, space.clone(), None, None).expect("load measure");
    assert_eq!(loaded.gamma_measure(), config.gamma_measure);
    assert_eq!(loaded.gp().train_y(), learner.safety().gp().train_y());
    for lambda in [0.0, 0.5] {
        assert_eq!(
            loaded.measure(StateQuery::All, lambda, None).expect("loaded"),
            learner
                .safety()
                .measure(StateQuery::All, lambda, None)
                .expect("trained"),
        );
    }

    let q_model = MaternGpQLearning::load(&folder.join(Q_MODEL_DIR), space, None).expect("q");
    assert_eq!(
        q_model.gp().train_y(),
        learner.q_model().expect("q model").gp().train_y()
    );
}

#[test]
fn integration_gamma_override_tightens_the_measure() {
    let temp = tempfile::tempdir().expect("tempdir");
    let folder = temp.path().join("run");
    let config = learner_config();
    let mut learner = build_hovership_learner(&config).expect("learner");
    learner.run_episodes(config.episodes).expect("train");
    learner.checkpoint(&folder).expect("checkpoint");

    let space = DiscreteHovership::new(HovershipParameters::default())
        .expect("env")
        .stateaction_space()
        .clone();
    let saved = MaternSafety::load(&folder, space.clone(), None, None).expect("saved gamma");
    let strict = MaternSafety::load(&folder, space, Some(0.99), None).expect("override");
    assert_eq!(strict.gamma_measure(), 0.99);

    let relaxed = saved.measure(StateQuery::All, 0.0, None).expect("saved");
    let tightened = strict.measure(StateQuery::All, 0.0, None).expect("strict");
    assert_eq!(relaxed.len(), 11);
    for (loose, tight) in relaxed.iter().zip(tightened.iter()) {
        assert!(tight <= loose);
    }
}
