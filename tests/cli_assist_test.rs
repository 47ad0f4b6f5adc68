//! Integration tests for `sw assist`.

mod common;

use common::TestEnv;
use predicates::prelude::*;

fn empty_process(env: &TestEnv) -> String {
    let created = env.json(&["process", "create", "Sprint Planning", "--owner", "alice"]);
    created["id"].as_i64().unwrap().to_string()
}

#[test]
fn test_offline_suggestions_without_apply() {
    let env = TestEnv::init();
    let id = empty_process(&env);

    let result = env.json(&["assist", &id, "How do I start?"]);
    assert_eq!(result["assistant"], "offline");
    let operations = result["operations"].as_array().unwrap();
    assert!(!operations.is_empty());
    assert!(operations.iter().all(|op| op["op"] == "add_step"));
    assert!(result.get("applied").is_none());

    let process = env.json(&["process", "show", &id]);
    assert!(process["steps"].as_array().unwrap().is_empty());
}

#[test]
fn test_apply_then_complete_next_step() {
    let env = TestEnv::init();
    let id = empty_process(&env);

    let applied = env.json(&["assist", &id, "Set it up", "--apply"]);
    let count = applied["applied"].as_array().unwrap().len();
    assert!(count > 0);
    let process = env.json(&["process", "show", &id]);
    assert_eq!(process["steps"].as_array().unwrap().len(), count);

    let next = env.json(&["assist", &id, "What next?", "--apply"]);
    assert_eq!(next["operations"][0]["op"], "complete_step");
    assert_eq!(next["applied"][0]["changed"], true);
    let process = env.json(&["process", "show", &id]);
    assert_eq!(process["progress"]["completed"], 1);
}

#[test]
fn test_unreachable_endpoint_fails_unless_offline() {
    let env = TestEnv::init();
    let id = empty_process(&env);
    env.json(&["config", "set", "assistant-endpoint", "http://127.0.0.1:9/chat"]);
    env.json(&["config", "set", "assistant-timeout-secs", "2"]);

    env.sw()
        .args(["assist", &id, "hello"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Assistant error"));

    let offline = env.json(&["assist", &id, "hello", "--offline"]);
    assert_eq!(offline["assistant"], "offline");
}

#[test]
fn test_missing_process() {
    let env = TestEnv::init();
    env.sw()
        .args(["assist", "404", "hello"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}
