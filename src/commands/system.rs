//! `sw system` commands.

use super::{Location, Output, display_path};
use crate::Result;
use crate::storage::content::StoreTotals;
use crate::storage::fmt_ts;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Store metadata key recording when the database was first created.
const INITIALIZED_AT_KEY: &str = "initialized_at";

#[derive(Serialize)]
pub struct InitResult {
    pub initialized: bool,
    pub db_path: String,
    pub initialized_at: String,
}

impl Output for InitResult {
    fn to_human(&self) -> String {
        if self.initialized {
            format!("Initialized Stepwise database at {}", self.db_path)
        } else {
            format!(
                "Stepwise database already initialized at {} (since {})",
                self.db_path, self.initialized_at
            )
        }
    }
}

/// Create the database if it is missing. Re-running is a no-op.
pub fn system_init(location: &Location, as_of: DateTime<Utc>) -> Result<InitResult> {
    let existed = location.is_initialized()?;
    let storage = location.init()?;

    let initialized_at = match storage.get_config(INITIALIZED_AT_KEY)? {
        Some(at) => at,
        None => {
            let at = fmt_ts(as_of);
            storage.set_config(INITIALIZED_AT_KEY, &at)?;
            at
        }
    };

    tracing::info!(db = %location.db_file()?.display(), existed, "system init");
    Ok(InitResult {
        initialized: !existed,
        db_path: display_path(&location.db_file()?),
        initialized_at,
    })
}

#[derive(Serialize)]
pub struct InfoResult {
    pub version: &'static str,
    pub build_timestamp: &'static str,
    pub commit: &'static str,
    pub db_path: String,
    pub config_path: String,
    pub initialized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initialized_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub totals: Option<StoreTotals>,
}

impl Output for InfoResult {
    fn to_human(&self) -> String {
        let mut lines = vec![
            format!("sw {} ({} built {})", self.version, self.commit, self.build_timestamp),
            format!("Database: {}", self.db_path),
            format!("Config:   {}", self.config_path),
        ];
        match (&self.totals, &self.initialized_at) {
            (Some(totals), at) => {
                if let Some(at) = at {
                    lines.push(format!("Initialized: {}", at));
                }
                lines.push(String::new());
                lines.push(format!("  users:       {}", totals.users));
                lines.push(format!("  directories: {}", totals.directories));
                lines.push(format!("  templates:   {}", totals.templates));
                lines.push(format!("  processes:   {}", totals.processes));
                lines.push(format!("  steps:       {}", totals.steps));
                lines.push(format!("  events:      {}", totals.events));
            }
            (None, _) => lines.push("Not initialized. Run `sw system init`.".to_string()),
        }
        lines.join("\n")
    }
}

/// Build information plus store totals when the database exists.
pub fn system_info(location: &Location) -> Result<InfoResult> {
    let initialized = location.is_initialized()?;
    let (initialized_at, totals) = if initialized {
        let storage = location.open()?;
        (storage.get_config(INITIALIZED_AT_KEY)?, Some(storage.store_totals()?))
    } else {
        (None, None)
    };

    Ok(InfoResult {
        version: env!("CARGO_PKG_VERSION"),
        build_timestamp: env!("SW_BUILD_TIMESTAMP"),
        commit: env!("SW_GIT_COMMIT"),
        db_path: display_path(&location.db_file()?),
        config_path: display_path(&location.config_path()?),
        initialized,
        initialized_at,
        totals,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::as_of;
    use tempfile::TempDir;

    #[test]
    fn test_init_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let location = Location::new(Some(dir.path().join("stepwise.db")));

        let first = system_init(&location, as_of()).unwrap();
        assert!(first.initialized);
        assert_eq!(first.initialized_at, fmt_ts(as_of()));

        let second = system_init(&location, Utc::now()).unwrap();
        assert!(!second.initialized);
        assert_eq!(second.initialized_at, first.initialized_at);
    }

    #[test]
    fn test_info_before_and_after_init() {
        let dir = TempDir::new().unwrap();
        let location = Location::new(Some(dir.path().join("stepwise.db")));

        let info = system_info(&location).unwrap();
        assert!(!info.initialized);
        assert!(info.totals.is_none());
        assert!(info.to_human().contains("Not initialized"));

        system_init(&location, as_of()).unwrap();
        let info = system_info(&location).unwrap();
        assert!(info.initialized);
        assert_eq!(info.totals, Some(StoreTotals::default()));
        assert_eq!(info.version, env!("CARGO_PKG_VERSION"));
    }
}
