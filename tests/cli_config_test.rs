//! Integration tests for `sw config` and config precedence.

mod common;

use common::TestEnv;
use predicates::prelude::*;
use std::fs;

#[test]
fn test_get_default() {
    let env = TestEnv::new();
    let value = env.json(&["config", "get", "standup-time"]);
    assert_eq!(value["value"], "09:00");
    assert_eq!(value["source"], "default");
}

#[test]
fn test_set_writes_workspace_config() {
    let env = TestEnv::new();
    let set = env.json(&["config", "set", "relation-ratio", "0.25"]);
    assert_eq!(set["key"], "relation-ratio");
    assert!(env.data_path().join("config.kdl").exists());

    let value = env.json(&["config", "get", "relation-ratio"]);
    assert_eq!(value["value"], "0.25");
    assert_eq!(value["source"], "workspace");
}

#[test]
fn test_set_rejects_out_of_range() {
    let env = TestEnv::new();
    env.sw()
        .args(["config", "set", "max-events-per-day", "6"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("max-events-per-day"));
    assert!(!env.data_path().join("config.kdl").exists());
}

#[test]
fn test_unknown_key() {
    let env = TestEnv::new();
    env.sw()
        .args(["config", "get", "favourite-colour"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown config key"));
}

#[test]
fn test_workspace_overrides_system() {
    let env = TestEnv::new();
    fs::write(env.config_dir.path().join("config.kdl"), "seed 7\nbuffer-minutes 45\n").unwrap();
    env.json(&["config", "set", "seed", "99"]);

    let seed = env.json(&["config", "get", "seed"]);
    assert_eq!(seed["value"], "99");
    assert_eq!(seed["source"], "workspace");

    let buffer = env.json(&["config", "get", "buffer-minutes"]);
    assert_eq!(buffer["value"], "45");
    assert_eq!(buffer["source"], "system");
}

#[test]
fn test_output_format_from_config() {
    let env = TestEnv::init();
    env.json(&["config", "set", "output-format", "human"]);
    env.sw()
        .args(["system", "info"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Database:"));
}

#[test]
fn test_broken_config_file_is_reported() {
    let env = TestEnv::new();
    fs::write(env.data_path().join("config.kdl"), "seed {{{").unwrap();
    env.sw()
        .args(["config", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Config error"));
}

#[test]
fn test_show_human() {
    let env = TestEnv::new();
    env.sw()
        .args(["-H", "config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("window-days-ahead"))
        .stdout(predicate::str::contains("default"));
}
