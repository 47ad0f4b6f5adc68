//! Integration tests for `sw schedule` and `sw event` commands.

mod common;

use common::TestEnv;
use predicates::prelude::*;
use serde_json::Value;
use std::collections::BTreeMap;

fn seed_templates(env: &TestEnv) {
    for title in ["Team Standup", "Code Review", "Sprint Planning", "Design Critique"] {
        let created = env.json(&["process", "create", title, "--owner", "lead", "--template"]);
        let id = created["id"].as_i64().unwrap().to_string();
        env.json(&["step", "add", &id, "Prepare"]);
    }
}

fn schedule(env: &TestEnv) -> Value {
    env.json(&[
        "schedule", "--owner", "alice", "--role", "dev", "--from", "2026-03-09", "--to",
        "2026-03-22", "--seed", "11",
    ])
}

fn events(env: &TestEnv) -> Vec<Value> {
    env.json(&["event", "list", "--owner", "alice"])["events"]
        .as_array()
        .unwrap()
        .clone()
}

#[test]
fn test_schedule_fills_weekdays_with_standups() {
    let env = TestEnv::init();
    seed_templates(&env);

    let result = schedule(&env);
    assert_eq!(result["window_start"], "2026-03-09");
    assert_eq!(result["window_end"], "2026-03-22");
    assert!(!result["created"].as_array().unwrap().is_empty());

    let events = events(&env);
    let mut standups: BTreeMap<String, usize> = BTreeMap::new();
    for event in &events {
        assert!(event["process_id"].is_i64(), "event without process: {}", event);
        assert!(event["start_time"].as_str().unwrap() < event["end_time"].as_str().unwrap());
        if event["title"] == "Daily Standup" || event["title"] == "Team Standup" {
            *standups.entry(event["date"].as_str().unwrap().to_string()).or_default() += 1;
        }
    }
    for day in ["09", "10", "11", "12", "13", "16", "17", "18", "19", "20"] {
        let date = format!("2026-03-{}", day);
        assert_eq!(standups.get(&date), Some(&1), "standups on {}", date);
    }
}

#[test]
fn test_schedule_rerun_creates_nothing() {
    let env = TestEnv::init();
    seed_templates(&env);

    let first = schedule(&env);
    let count = events(&env).len();
    assert_eq!(first["created"].as_array().unwrap().len(), count);

    let second = schedule(&env);
    assert!(second["created"].as_array().unwrap().is_empty());
    assert_eq!(events(&env).len(), count);
}

#[test]
fn test_statuses_follow_as_of() {
    let env = TestEnv::init();
    seed_templates(&env);
    schedule(&env);

    for event in events(&env) {
        let date = event["date"].as_str().unwrap();
        let expected = match date.cmp("2026-03-16") {
            std::cmp::Ordering::Less => "done",
            std::cmp::Ordering::Equal => "execution",
            std::cmp::Ordering::Greater => "pending",
        };
        assert_eq!(event["status"], expected, "event on {}", date);
    }

    // A week later, the middle of the window is in the past
    let refreshed = env.json_at("2026-03-23", &["event", "refresh", "--owner", "alice"]);
    assert!(refreshed["changed"].as_u64().unwrap() > 0);

    for event in events(&env) {
        let date = event["date"].as_str().unwrap();
        if date < "2026-03-23" {
            assert_eq!(event["status"], "done", "event on {}", date);
        } else if date == "2026-03-23" {
            assert_eq!(event["status"], "execution", "event on {}", date);
        }
    }

    let again = env.json_at("2026-03-23", &["event", "refresh", "--owner", "alice"]);
    assert_eq!(again["changed"], 0);
}

#[test]
fn test_list_filters_by_date() {
    let env = TestEnv::init();
    seed_templates(&env);
    schedule(&env);

    let monday = env.json(&[
        "event", "list", "--owner", "alice", "--from", "2026-03-16", "--to", "2026-03-16",
    ]);
    let monday = monday["events"].as_array().unwrap();
    assert!(!monday.is_empty());
    assert!(monday.iter().all(|e| e["date"] == "2026-03-16"));
}

#[test]
fn test_relate_links_symmetrically() {
    let env = TestEnv::init();
    seed_templates(&env);
    schedule(&env);

    let related = env.json(&["event", "relate", "--owner", "alice", "--ratio", "1", "--seed", "2"]);
    assert_eq!(related["symmetric"], true);

    let again = env.json(&["event", "relate", "--owner", "alice", "--ratio", "1", "--seed", "2"]);
    assert_eq!(again["links"], 0);
}

#[test]
fn test_repair_is_idempotent() {
    let env = TestEnv::init();
    seed_templates(&env);
    schedule(&env);

    let first = env.json(&["event", "repair", "--owner", "alice"]);
    assert_eq!(first["repaired"], 0);
    let all = env.json(&["event", "repair"]);
    assert_eq!(all["repaired"], 0);
}

#[test]
fn test_inverted_window_fails() {
    let env = TestEnv::init();
    env.sw()
        .args(["schedule", "--owner", "alice", "--from", "2026-03-22", "--to", "2026-03-09"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("before it starts"));
}
