//! Stepwise - process checklists, template forking and calendar scheduling.
//!
//! This library provides the core functionality for the `sw` CLI tool:
//! the Directory/Process/Step/SubStep/Event hierarchy store, template forking,
//! the completion cascade, the time-slot scheduler and the workspace
//! synthesis pipeline that seeds a new account.

pub mod assistant;
pub mod cascade;
pub mod cli;
pub mod commands;
pub mod config;
pub mod forking;
pub mod models;
pub mod scheduler;
pub mod storage;
pub mod synthesis;

/// Test utilities for isolated test environments.
#[cfg(test)]
pub(crate) mod test_utils {
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};
    use std::path::Path;
    use tempfile::TempDir;

    use crate::storage::Storage;

    /// Test environment with isolated storage using dependency injection.
    pub struct TestEnv {
        /// Isolated data storage directory
        pub data_dir: TempDir,
    }

    impl TestEnv {
        /// Create a new test environment with an isolated data directory.
        pub fn new() -> Self {
            Self {
                data_dir: TempDir::new().unwrap(),
            }
        }

        /// Get the path to the isolated data directory.
        pub fn data_path(&self) -> &Path {
            self.data_dir.path()
        }

        /// Initialize storage for this test environment.
        pub fn init_storage(&self) -> Storage {
            Storage::init_with_data_dir(self.data_path()).unwrap()
        }
    }

    impl Default for TestEnv {
        fn default() -> Self {
            Self::new()
        }
    }

    /// A fixed "now" used by tests: Monday 2026-03-16 12:00 UTC.
    pub fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 16, 12, 0, 0).unwrap()
    }

    /// Shorthand for building dates in assertions.
    pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }
}

/// Library-level error type for Stepwise operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Not initialized: run `sw system init` first")]
    NotInitialized,

    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Cycle detected in directory tree")]
    CycleDetected,

    #[error("Assistant error: {0}")]
    Assistant(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for Stepwise operations.
pub type Result<T> = std::result::Result<T, Error>;
