//! Configuration for Stepwise.
//!
//! ## config.kdl
//!
//! Located at:
//! - System: `~/.config/stepwise/config.kdl` (or `$SW_CONFIG_DIR/config.kdl`)
//! - Workspace: next to the database, `<data dir>/config.kdl`
//!
//! See [`schema::StepwiseConfig`] for the keys.
//!
//! ## Precedence
//!
//! CLI flag > workspace config > system config > defaults
//!
//! The assistant API key is never read from a file, only from
//! `SW_ASSISTANT_API_KEY`.
//!
//! Use the [`resolver`] module for precedence resolution.

pub mod resolver;
pub mod schema;

pub use resolver::{
    ASSISTANT_API_KEY_ENV, ConfigOverrides, Resolved, ResolvedConfig, ValueSource, resolve_api_key,
    resolve_config, resolve_config_at,
};
pub use schema::{CONFIG_KEYS, OutputFormat, StepwiseConfig};

use crate::{Error, Result};
use kdl::KdlDocument;
use std::fs;
use std::path::{Path, PathBuf};

/// Overrides the system config directory.
pub const CONFIG_DIR_ENV: &str = "SW_CONFIG_DIR";

/// Path of the system-wide config.kdl, if a config directory is known.
pub fn system_config_path() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
        if !dir.is_empty() {
            return Some(PathBuf::from(dir).join("config.kdl"));
        }
    }
    dirs::config_dir().map(|d| d.join("stepwise").join("config.kdl"))
}

/// Read a config.kdl. A missing file reads as an empty config.
pub fn read_config_file(path: &Path) -> Result<StepwiseConfig> {
    if !path.exists() {
        return Ok(StepwiseConfig::default());
    }
    let text = fs::read_to_string(path)?;
    let doc: KdlDocument = text
        .parse()
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
    let config = StepwiseConfig::from_kdl(&doc);
    config
        .validate()
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
    Ok(config)
}

/// Write a config.kdl, creating its directory if needed.
pub fn write_config_file(path: &Path, config: &StepwiseConfig) -> Result<()> {
    config.validate().map_err(Error::Config)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut doc = config.to_kdl();
    doc.autoformat();
    fs::write(path, doc.to_string())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let config = read_config_file(&dir.path().join("config.kdl")).unwrap();
        assert_eq!(config, StepwiseConfig::default());
    }

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.kdl");
        let config = StepwiseConfig {
            role_tag: Some("design".to_string()),
            buffer_minutes: Some(20),
            ..Default::default()
        };
        write_config_file(&path, &config).unwrap();
        assert_eq!(read_config_file(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.kdl");
        fs::write(&path, "max-events-per-day 40\n").unwrap();
        assert!(matches!(read_config_file(&path), Err(Error::Config(_))));

        fs::write(&path, "seed {\n").unwrap();
        assert!(matches!(read_config_file(&path), Err(Error::Config(_))));
    }
}
