use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value};
use tempfile::tempdir;

fn binary_command() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("edge"))
}

fn write_config(path: &std::path::Path, config: Value) {
    fs::write(path, format!("{config}\n")).expect("write learner config");
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

#[test]
fn help_lists_train_and_measure() {
    binary_command()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("train"))
        .stdout(predicate::str::contains("measure"));
}

#[test]
fn functional_train_then_measure_reports_every_state() {
    let temp = tempdir().expect("tempdir");
    let config_path = temp.path().join("config.json");
    let model_dir = temp.path().join("model");
    write_config(
        &config_path,
        json!({
            "episodes": 5,
            "max_episode_steps": 5,
            "hovership": {"max_altitude": 6, "max_thrust": 3,
                          "minimum_gravity_altitude": 5, "maximum_gravity_altitude": 2}
        }),
    );

    let train = binary_command()
        .args(["train", "--config"])
        .arg(&config_path)
        .arg("--output")
        .arg(&model_dir)
        .args(["--episodes", "2", "--seed", "3"])
        .assert()
        .success();
    let report = stdout_json(train.get_output());
    assert_eq!(report["summary"]["episodes"], json!(2));
    assert!(model_dir.join("gp_save.json").is_file());
    assert!(model_dir.join("model.json").is_file());
    assert!(model_dir.join("run.json").is_file());

    let measure = binary_command()
        .arg("measure")
        .arg("--model")
        .arg(&model_dir)
        .assert()
        .success();
    let report = stdout_json(measure.get_output());
    assert_eq!(report["gamma_measure"], json!(0.6));
    let values = report["measure"].as_array().expect("measure array");
    assert_eq!(values.len(), 7);
    assert_eq!(report["states"].as_array().expect("states").len(), 7);
    for value in values {
        let value = value.as_f64().expect("numeric measure");
        assert!((0.0..=1.0).contains(&value));
    }
}

#[test]
fn functional_gamma_override_is_reported() {
    let temp = tempdir().expect("tempdir");
    let config_path = temp.path().join("config.json");
    let model_dir = temp.path().join("model");
    write_config(&config_path, json!({"episodes": 1, "max_episode_steps": 3}));

    binary_command()
        .args(["train", "--config"])
        .arg(&config_path)
        .arg("--output")
        .arg(&model_dir)
        .assert()
        .success();

    let measure = binary_command()
        .arg("measure")
        .arg("--model")
        .arg(&model_dir)
        .args(["--gamma", "0.9"])
        .assert()
        .success();
    let report = stdout_json(measure.get_output());
    assert_eq!(report["gamma_measure"], json!(0.9));
    assert_eq!(report["measure"].as_array().expect("measure").len(), 11);
}

#[test]
fn regression_measure_without_model_folder_fails() {
    let temp = tempdir().expect("tempdir");
    binary_command()
        .arg("measure")
        .arg("--model")
        .arg(temp.path().join("missing"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("run.json"));
}

#[test]
fn regression_invalid_config_is_rejected() {
    let temp = tempdir().expect("tempdir");
    let config_path = temp.path().join("config.json");
    write_config(&config_path, json!({"gamma_measure": "high"}));
    binary_command()
        .args(["train", "--config"])
        .arg(&config_path)
        .arg("--output")
        .arg(temp.path().join("model"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("gamma_measure"));
}
