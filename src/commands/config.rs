//! `sw config` commands.

use super::{Location, Output, display_path};
use crate::config::resolver::mask_secret;
use crate::config::{
    ASSISTANT_API_KEY_ENV, CONFIG_KEYS, ResolvedConfig, read_config_file, resolve_api_key,
    write_config_file,
};
use crate::{Error, Result};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ConfigValue {
    pub key: String,
    pub value: Option<String>,
    pub source: String,
}

impl Output for ConfigValue {
    fn to_human(&self) -> String {
        match self.value {
            Some(ref value) => format!("{} = {} ({})", self.key, value, self.source),
            None => format!("{} is not set", self.key),
        }
    }
}

fn check_key(key: &str) -> Result<()> {
    if CONFIG_KEYS.contains(&key) {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "Unknown config key '{}'. Valid keys: {}",
            key,
            CONFIG_KEYS.join(", ")
        )))
    }
}

/// The resolved value of one key and where it came from.
pub fn config_get(config: &ResolvedConfig, key: &str) -> Result<ConfigValue> {
    check_key(key)?;
    let (key, value, source) = config
        .entries()
        .into_iter()
        .find(|(k, _, _)| *k == key)
        .ok_or_else(|| Error::InvalidInput(format!("Unknown config key '{}'", key)))?;
    Ok(ConfigValue {
        key: key.to_string(),
        value,
        source,
    })
}

#[derive(Debug, Serialize)]
pub struct ConfigSet {
    pub key: String,
    pub value: String,
    pub path: String,
}

impl Output for ConfigSet {
    fn to_human(&self) -> String {
        format!("Set {} = {} in {}", self.key, self.value, self.path)
    }
}

/// Validate and store one key in the workspace config.kdl.
pub fn config_set(location: &Location, key: &str, value: &str) -> Result<ConfigSet> {
    check_key(key)?;
    let path = location.config_path()?;
    let mut config = read_config_file(&path)?;
    config.set(key, value).map_err(Error::InvalidInput)?;
    write_config_file(&path, &config)?;
    tracing::info!(key, path = %path.display(), "config updated");

    Ok(ConfigSet {
        key: key.to_string(),
        value: config.get(key).unwrap_or_else(|| value.to_string()),
        path: display_path(&path),
    })
}

#[derive(Debug, Serialize)]
pub struct ConfigShow {
    pub entries: Vec<ConfigValue>,
}

impl Output for ConfigShow {
    fn to_human(&self) -> String {
        let width = self.entries.iter().map(|e| e.key.len()).max().unwrap_or(0);
        self.entries
            .iter()
            .map(|e| {
                format!(
                    "{:<width$}  {:<24} {}",
                    e.key,
                    e.value.as_deref().unwrap_or("-"),
                    e.source,
                    width = width
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Every key with its resolved value. The assistant API key is shown
/// masked, and only when set.
pub fn config_show(config: &ResolvedConfig) -> ConfigShow {
    let mut entries: Vec<ConfigValue> = config
        .entries()
        .into_iter()
        .map(|(key, value, source)| ConfigValue {
            key: key.to_string(),
            value,
            source,
        })
        .collect();
    if let Some(key) = resolve_api_key() {
        entries.push(ConfigValue {
            key: ASSISTANT_API_KEY_ENV.to_string(),
            value: Some(mask_secret(&key.value)),
            source: key.source.to_string(),
        });
    }
    ConfigShow { entries }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigOverrides, resolve_config_at};
    use tempfile::TempDir;

    fn location(dir: &TempDir) -> Location {
        Location::new(Some(dir.path().join("stepwise.db")))
    }

    fn resolved(location: &Location) -> ResolvedConfig {
        resolve_config_at(&location.config_path().unwrap(), None, &ConfigOverrides::new()).unwrap()
    }

    #[test]
    fn test_set_then_get() {
        let dir = TempDir::new().unwrap();
        let location = location(&dir);

        let before = config_get(&resolved(&location), "seed").unwrap();
        assert_eq!(before.source, "default");

        config_set(&location, "seed", "42").unwrap();
        let after = config_get(&resolved(&location), "seed").unwrap();
        assert_eq!(after.value.as_deref(), Some("42"));
        assert_eq!(after.source, "workspace");
    }

    #[test]
    fn test_invalid_value_leaves_file_untouched() {
        let dir = TempDir::new().unwrap();
        let location = location(&dir);
        config_set(&location, "buffer-minutes", "15").unwrap();

        let err = config_set(&location, "buffer-minutes", "9999").unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        let value = config_get(&resolved(&location), "buffer-minutes").unwrap();
        assert_eq!(value.value.as_deref(), Some("15"));
    }

    #[test]
    fn test_unknown_key() {
        let dir = TempDir::new().unwrap();
        let location = location(&dir);
        assert!(matches!(
            config_get(&resolved(&location), "colour"),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            config_set(&location, "colour", "red"),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_show_lists_every_key() {
        let show = config_show(&ResolvedConfig::default());
        for key in CONFIG_KEYS {
            assert!(show.entries.iter().any(|e| e.key == *key), "missing {}", key);
        }
        assert!(show.to_human().contains("relation-ratio"));
    }
}
