//! Command implementations for the Stepwise CLI.
//!
//! Each command returns a result type implementing [`Output`], which the
//! binary prints as JSON or human-readable text. Commands are organized by
//! area:
//! - `system` - init and info
//! - `hierarchy` - directories, processes, steps, substeps, forking, reconcile
//! - `calendar` - scheduling, events, workspace synthesis
//! - `assist` - chat assistant
//! - `config` - config.kdl get/set/show

mod assist;
mod calendar;
mod config;
mod hierarchy;
mod system;

pub use assist::*;
pub use calendar::*;
pub use config::*;
pub use hierarchy::*;
pub use system::*;

use crate::config::ResolvedConfig;
use crate::storage::{self, DB_FILE, Storage};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Command results that can be serialized to JSON or formatted for humans.
pub trait Output: Serialize {
    /// Serialize to a JSON string.
    fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }).to_string())
    }

    /// Format for human-readable output.
    fn to_human(&self) -> String;
}

/// Where the database lives.
#[derive(Debug, Clone, Default)]
pub struct Location {
    /// Explicit database file (`--db`); otherwise `<data dir>/stepwise.db`
    pub db_path: Option<PathBuf>,
}

impl Location {
    pub fn new(db_path: Option<PathBuf>) -> Self {
        Self { db_path }
    }

    pub fn db_file(&self) -> Result<PathBuf> {
        match self.db_path {
            Some(ref path) => Ok(path.clone()),
            None => Ok(storage::get_data_dir()?.join(DB_FILE)),
        }
    }

    /// Directory holding the database and the workspace config.kdl.
    pub fn root(&self) -> Result<PathBuf> {
        let db = self.db_file()?;
        Ok(match db.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        })
    }

    pub fn config_path(&self) -> Result<PathBuf> {
        Ok(self.root()?.join("config.kdl"))
    }

    pub fn is_initialized(&self) -> Result<bool> {
        Ok(self.db_file()?.exists())
    }

    /// Open an initialized store.
    pub fn open(&self) -> Result<Storage> {
        let db = self.db_file()?;
        if !db.exists() {
            return Err(Error::NotInitialized);
        }
        Storage::open_at(&db)
    }

    /// Create the store if needed and open it.
    pub fn init(&self) -> Result<Storage> {
        Storage::open_at(&self.db_file()?)
    }
}

/// Everything a command needs from the environment.
#[derive(Debug)]
pub struct Context {
    pub storage: Storage,
    pub config: ResolvedConfig,
    /// "Now" for statuses, windows and completion timestamps
    pub as_of: DateTime<Utc>,
}

impl Context {
    pub fn new(storage: Storage, config: ResolvedConfig, as_of: DateTime<Utc>) -> Self {
        Self {
            storage,
            config,
            as_of,
        }
    }
}

/// Generic acknowledgement for updates and deletes.
#[derive(Debug, Clone, Serialize)]
pub struct Ack {
    pub action: &'static str,
    pub kind: &'static str,
    pub id: i64,
}

impl Ack {
    pub fn new(action: &'static str, kind: &'static str, id: i64) -> Self {
        Self { action, kind, id }
    }
}

impl Output for Ack {
    fn to_human(&self) -> String {
        format!("{} {} {}", capitalize(self.action), self.kind, self.id)
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn check(done: bool) -> &'static str {
    if done { "[x]" } else { "[ ]" }
}

fn display_path(path: &Path) -> String {
    path.display().to_string()
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_location_with_explicit_db() {
        let dir = TempDir::new().unwrap();
        let location = Location::new(Some(dir.path().join("work").join("my.db")));

        assert!(!location.is_initialized().unwrap());
        assert!(matches!(location.open(), Err(Error::NotInitialized)));

        location.init().unwrap();
        assert!(location.is_initialized().unwrap());
        assert_eq!(location.root().unwrap(), dir.path().join("work"));
        assert_eq!(location.config_path().unwrap(), dir.path().join("work").join("config.kdl"));
        location.open().unwrap();
    }

    #[test]
    fn test_bare_file_name_uses_current_dir() {
        let location = Location::new(Some(PathBuf::from("local.db")));
        assert_eq!(location.root().unwrap(), PathBuf::from("."));
    }

    #[test]
    fn test_ack_output() {
        let ack = Ack::new("deleted", "step", 4);
        assert_eq!(ack.to_human(), "Deleted step 4");
        assert_eq!(ack.to_json(), r#"{"action":"deleted","kind":"step","id":4}"#);
    }
}
