//! Common test utilities for Stepwise integration tests.
//!
//! Provides `TestEnv` for isolated test environments that don't touch the
//! user's data or config directories.

#![allow(dead_code)]

use assert_cmd::Command;
pub use tempfile::TempDir;

/// The date every CLI test treats as today (a Monday).
pub const AS_OF: &str = "2026-03-16";

/// A test environment with isolated data and config directories.
///
/// The `sw()` method returns a `Command` that sets `SW_DATA_DIR` and
/// `SW_CONFIG_DIR` per invocation, making tests parallel-safe.
pub struct TestEnv {
    pub data_dir: TempDir,
    pub config_dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            data_dir: TempDir::new().unwrap(),
            config_dir: TempDir::new().unwrap(),
        }
    }

    /// Create a new test environment and initialize the database.
    pub fn init() -> Self {
        let env = Self::new();
        env.sw().args(["system", "init"]).assert().success();
        env
    }

    /// Get a Command for the sw binary with isolated directories, dated `AS_OF`.
    pub fn sw(&self) -> Command {
        self.sw_at(AS_OF)
    }

    /// Like `sw()`, but treating `date` as today.
    pub fn sw_at(&self, date: &str) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_sw"));
        cmd.env("SW_DATA_DIR", self.data_dir.path());
        cmd.env("SW_CONFIG_DIR", self.config_dir.path());
        cmd.env_remove("SW_DB");
        cmd.env_remove("SW_ASSISTANT_API_KEY");
        cmd.args(["--as-of", date]);
        cmd
    }

    /// Run a command that must succeed and parse its JSON output.
    pub fn json(&self, args: &[&str]) -> serde_json::Value {
        self.json_at(AS_OF, args)
    }

    /// Like `json()`, but treating `date` as today.
    pub fn json_at(&self, date: &str, args: &[&str]) -> serde_json::Value {
        let output = self.sw_at(date).args(args).output().unwrap();
        assert!(
            output.status.success(),
            "sw {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).unwrap()
    }

    pub fn data_path(&self) -> &std::path::Path {
        self.data_dir.path()
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}
