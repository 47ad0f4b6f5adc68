//! Precedence resolution for configuration.
//!
//! ## Config Precedence (highest to lowest)
//!
//! 1. CLI flags (passed at runtime)
//! 2. Workspace config.kdl (`<data dir>/config.kdl`)
//! 3. System config.kdl (`~/.config/stepwise/config.kdl`)
//! 4. Built-in defaults
//!
//! ## API key
//!
//! Only the `SW_ASSISTANT_API_KEY` environment variable.

use super::schema::{OutputFormat, StepwiseConfig};
use super::{read_config_file, system_config_path};
use crate::Result;
use crate::scheduler::timing::parse_clock;
use crate::scheduler::{
    DEFAULT_DAYS_AHEAD, DEFAULT_DAYS_BACK, MAX_EVENTS_PER_DAY, ScheduleSettings,
};
use crate::synthesis::SynthesisOptions;
use crate::synthesis::relations::DEFAULT_RELATION_RATIO;
use chrono::{DateTime, Utc};
use std::path::Path;

/// Environment variable holding the hosted assistant's API key.
pub const ASSISTANT_API_KEY_ENV: &str = "SW_ASSISTANT_API_KEY";

pub const DEFAULT_ASSISTANT_TIMEOUT_SECS: u64 = 10;

/// Tracks where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    /// Value from environment variable
    EnvVar(String),
    /// Value from the workspace config.kdl
    Workspace,
    /// Value from the system config.kdl
    System,
    /// Value from CLI flag
    CliFlag,
    /// Built-in default value
    Default,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::EnvVar(name) => write!(f, "env:{}", name),
            ValueSource::Workspace => write!(f, "workspace"),
            ValueSource::System => write!(f, "system"),
            ValueSource::CliFlag => write!(f, "cli"),
            ValueSource::Default => write!(f, "default"),
        }
    }
}

/// A resolved value with its source.
#[derive(Debug, Clone)]
pub struct Resolved<T> {
    pub value: T,
    pub source: ValueSource,
}

impl<T> Resolved<T> {
    pub fn new(value: T, source: ValueSource) -> Self {
        Self { value, source }
    }
}

/// CLI > workspace > system, else `default`.
fn pick<T: Clone>(cli: Option<&T>, workspace: Option<&T>, system: Option<&T>, default: T) -> Resolved<T> {
    if let Some(v) = cli {
        Resolved::new(v.clone(), ValueSource::CliFlag)
    } else if let Some(v) = workspace {
        Resolved::new(v.clone(), ValueSource::Workspace)
    } else if let Some(v) = system {
        Resolved::new(v.clone(), ValueSource::System)
    } else {
        Resolved::new(default, ValueSource::Default)
    }
}

/// Like [`pick`] for keys without a default.
fn pick_opt<T: Clone>(cli: Option<&T>, workspace: Option<&T>, system: Option<&T>) -> Option<Resolved<T>> {
    if let Some(v) = cli {
        Some(Resolved::new(v.clone(), ValueSource::CliFlag))
    } else if let Some(v) = workspace {
        Some(Resolved::new(v.clone(), ValueSource::Workspace))
    } else {
        system.map(|v| Resolved::new(v.clone(), ValueSource::System))
    }
}

/// Fully resolved configuration with source tracking.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub output_format: Resolved<OutputFormat>,
    pub role_tag: Option<Resolved<String>>,
    pub window_days_back: Resolved<i64>,
    pub window_days_ahead: Resolved<i64>,
    pub standup_time: Resolved<String>,
    pub max_events_per_day: Resolved<u32>,
    pub buffer_minutes: Resolved<i64>,
    pub relation_ratio: Resolved<f64>,
    pub seed: Resolved<u64>,
    pub assistant_endpoint: Option<Resolved<String>>,
    pub assistant_timeout_secs: Resolved<u64>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        let empty = StepwiseConfig::default();
        Self::layered(&empty, &empty, &empty)
    }
}

impl ResolvedConfig {
    fn layered(cli: &StepwiseConfig, workspace: &StepwiseConfig, system: &StepwiseConfig) -> Self {
        Self {
            output_format: pick(
                cli.output_format.as_ref(),
                workspace.output_format.as_ref(),
                system.output_format.as_ref(),
                OutputFormat::Json,
            ),
            role_tag: pick_opt(
                cli.role_tag.as_ref(),
                workspace.role_tag.as_ref(),
                system.role_tag.as_ref(),
            ),
            window_days_back: pick(
                cli.window_days_back.as_ref(),
                workspace.window_days_back.as_ref(),
                system.window_days_back.as_ref(),
                DEFAULT_DAYS_BACK,
            ),
            window_days_ahead: pick(
                cli.window_days_ahead.as_ref(),
                workspace.window_days_ahead.as_ref(),
                system.window_days_ahead.as_ref(),
                DEFAULT_DAYS_AHEAD,
            ),
            standup_time: pick(
                cli.standup_time.as_ref(),
                workspace.standup_time.as_ref(),
                system.standup_time.as_ref(),
                "09:00".to_string(),
            ),
            max_events_per_day: pick(
                cli.max_events_per_day.as_ref(),
                workspace.max_events_per_day.as_ref(),
                system.max_events_per_day.as_ref(),
                5,
            ),
            buffer_minutes: pick(
                cli.buffer_minutes.as_ref(),
                workspace.buffer_minutes.as_ref(),
                system.buffer_minutes.as_ref(),
                30,
            ),
            relation_ratio: pick(
                cli.relation_ratio.as_ref(),
                workspace.relation_ratio.as_ref(),
                system.relation_ratio.as_ref(),
                DEFAULT_RELATION_RATIO,
            ),
            seed: pick(cli.seed.as_ref(), workspace.seed.as_ref(), system.seed.as_ref(), 0),
            assistant_endpoint: pick_opt(
                cli.assistant_endpoint.as_ref(),
                workspace.assistant_endpoint.as_ref(),
                system.assistant_endpoint.as_ref(),
            ),
            assistant_timeout_secs: pick(
                cli.assistant_timeout_secs.as_ref(),
                workspace.assistant_timeout_secs.as_ref(),
                system.assistant_timeout_secs.as_ref(),
                DEFAULT_ASSISTANT_TIMEOUT_SECS,
            ),
        }
    }

    pub fn output_format(&self) -> OutputFormat {
        self.output_format.value
    }

    pub fn role_tag(&self) -> Option<&str> {
        self.role_tag.as_ref().map(|r| r.value.as_str())
    }

    /// Scheduler tunables from the resolved values.
    pub fn schedule_settings(&self) -> ScheduleSettings {
        let defaults = ScheduleSettings::default();
        let max = (self.max_events_per_day.value as usize).min(MAX_EVENTS_PER_DAY);
        ScheduleSettings {
            standup_time: parse_clock(&self.standup_time.value).unwrap_or(defaults.standup_time),
            max_events_per_day: max,
            buffer_minutes: self.buffer_minutes.value,
            weekend_standup_probability: defaults.weekend_standup_probability,
            max_extra_per_day: max.saturating_sub(1).min(defaults.max_extra_per_day),
        }
    }

    /// Synthesis options for a run at `as_of`.
    pub fn synthesis_options(&self, as_of: DateTime<Utc>) -> SynthesisOptions {
        SynthesisOptions {
            as_of,
            seed: self.seed.value,
            days_back: self.window_days_back.value,
            days_ahead: self.window_days_ahead.value,
            relation_ratio: self.relation_ratio.value,
            schedule: self.schedule_settings(),
        }
    }

    /// `(key, value, source)` rows for `sw config show`.
    pub fn entries(&self) -> Vec<(&'static str, Option<String>, String)> {
        fn row<T: ToString>(key: &'static str, r: &Resolved<T>) -> (&'static str, Option<String>, String) {
            (key, Some(r.value.to_string()), r.source.to_string())
        }
        fn opt_row(key: &'static str, r: &Option<Resolved<String>>) -> (&'static str, Option<String>, String) {
            match r {
                Some(r) => (key, Some(r.value.clone()), r.source.to_string()),
                None => (key, None, ValueSource::Default.to_string()),
            }
        }
        vec![
            row("output-format", &self.output_format),
            opt_row("role-tag", &self.role_tag),
            row("window-days-back", &self.window_days_back),
            row("window-days-ahead", &self.window_days_ahead),
            row("standup-time", &self.standup_time),
            row("max-events-per-day", &self.max_events_per_day),
            row("buffer-minutes", &self.buffer_minutes),
            row("relation-ratio", &self.relation_ratio),
            row("seed", &self.seed),
            opt_row("assistant-endpoint", &self.assistant_endpoint),
            row("assistant-timeout-secs", &self.assistant_timeout_secs),
        ]
    }
}

/// CLI overrides for configuration resolution.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config: StepwiseConfig,
}

impl ConfigOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.config.output_format = Some(format);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }
}

/// Resolve configuration for the workspace whose config.kdl is at
/// `workspace_path`, layered over the system config.
///
/// Precedence (highest to lowest):
/// 1. CLI flags (from `overrides`)
/// 2. Workspace config.kdl
/// 3. System config.kdl
/// 4. Built-in defaults
pub fn resolve_config(workspace_path: &Path, overrides: &ConfigOverrides) -> Result<ResolvedConfig> {
    resolve_config_at(workspace_path, system_config_path().as_deref(), overrides)
}

/// [`resolve_config`] with explicit file locations.
pub fn resolve_config_at(
    workspace_path: &Path,
    system_path: Option<&Path>,
    overrides: &ConfigOverrides,
) -> Result<ResolvedConfig> {
    let system = match system_path {
        Some(path) => read_config_file(path)?,
        None => StepwiseConfig::default(),
    };
    let workspace = read_config_file(workspace_path)?;
    Ok(ResolvedConfig::layered(&overrides.config, &workspace, &system))
}

/// The assistant API key, from the environment only.
pub fn resolve_api_key() -> Option<Resolved<String>> {
    std::env::var(ASSISTANT_API_KEY_ENV)
        .ok()
        .filter(|key| !key.is_empty())
        .map(|key| Resolved::new(key, ValueSource::EnvVar(ASSISTANT_API_KEY_ENV.to_string())))
}

/// Mask a secret for display, keeping the first and last four characters.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 12 {
        let head: String = chars.iter().take(4).collect();
        format!("{}...", head)
    } else {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::write_config_file;
    use chrono::NaiveTime;
    use tempfile::TempDir;

    struct Paths {
        _dir: TempDir,
        workspace: std::path::PathBuf,
        system: std::path::PathBuf,
    }

    fn paths() -> Paths {
        let dir = TempDir::new().unwrap();
        Paths {
            workspace: dir.path().join("workspace").join("config.kdl"),
            system: dir.path().join("system").join("config.kdl"),
            _dir: dir,
        }
    }

    #[test]
    fn test_value_source_display() {
        assert_eq!(format!("{}", ValueSource::EnvVar("FOO".to_string())), "env:FOO");
        assert_eq!(format!("{}", ValueSource::Workspace), "workspace");
        assert_eq!(format!("{}", ValueSource::System), "system");
        assert_eq!(format!("{}", ValueSource::CliFlag), "cli");
        assert_eq!(format!("{}", ValueSource::Default), "default");
    }

    #[test]
    fn test_resolve_config_defaults() {
        let p = paths();
        let config = resolve_config_at(&p.workspace, Some(&p.system), &ConfigOverrides::default()).unwrap();

        assert_eq!(config.output_format(), OutputFormat::Json);
        assert_eq!(config.output_format.source, ValueSource::Default);
        assert!(config.role_tag.is_none());
        assert_eq!(config.window_days_back.value, 30);
        assert_eq!(config.window_days_ahead.value, 90);
        assert_eq!(config.schedule_settings(), ScheduleSettings::default());
        assert_eq!(config.assistant_timeout_secs.value, 10);
    }

    #[test]
    fn test_workspace_overrides_system() {
        let p = paths();
        write_config_file(
            &p.system,
            &StepwiseConfig {
                role_tag: Some("pm".to_string()),
                seed: Some(3),
                ..Default::default()
            },
        )
        .unwrap();
        write_config_file(
            &p.workspace,
            &StepwiseConfig {
                role_tag: Some("dev".to_string()),
                ..Default::default()
            },
        )
        .unwrap();

        let config = resolve_config_at(&p.workspace, Some(&p.system), &ConfigOverrides::default()).unwrap();
        assert_eq!(config.role_tag(), Some("dev"));
        assert_eq!(config.role_tag.as_ref().unwrap().source, ValueSource::Workspace);
        assert_eq!(config.seed.value, 3);
        assert_eq!(config.seed.source, ValueSource::System);
    }

    #[test]
    fn test_cli_overrides_workspace() {
        let p = paths();
        write_config_file(
            &p.workspace,
            &StepwiseConfig {
                output_format: Some(OutputFormat::Json),
                seed: Some(1),
                ..Default::default()
            },
        )
        .unwrap();

        let overrides = ConfigOverrides::new()
            .with_output_format(OutputFormat::Human)
            .with_seed(99);
        let config = resolve_config_at(&p.workspace, None, &overrides).unwrap();
        assert_eq!(config.output_format(), OutputFormat::Human);
        assert_eq!(config.output_format.source, ValueSource::CliFlag);
        assert_eq!(config.seed.value, 99);
    }

    #[test]
    fn test_schedule_settings_from_config() {
        let p = paths();
        write_config_file(
            &p.workspace,
            &StepwiseConfig {
                standup_time: Some("08:30".to_string()),
                max_events_per_day: Some(3),
                buffer_minutes: Some(15),
                ..Default::default()
            },
        )
        .unwrap();

        let config = resolve_config_at(&p.workspace, None, &ConfigOverrides::default()).unwrap();
        let settings = config.schedule_settings();
        assert_eq!(settings.standup_time, NaiveTime::from_hms_opt(8, 30, 0).unwrap());
        assert_eq!(settings.max_events_per_day, 3);
        assert_eq!(settings.max_extra_per_day, 2);
        assert_eq!(settings.buffer_minutes, 15);
    }

    #[test]
    fn test_entries_cover_every_key() {
        let config = ResolvedConfig::default();
        let keys: Vec<&str> = config.entries().iter().map(|e| e.0).collect();
        assert_eq!(keys, crate::config::CONFIG_KEYS);
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret("sk-abcdefghijklmnop"), "sk-a...mnop");
        assert_eq!(mask_secret("short"), "shor...");
    }
}
