//! KDL schema for config.kdl.
//!
//! This module provides:
//! - the [`StepwiseConfig`] struct mirroring the file
//! - conversion to and from KDL documents
//! - validation and per-key get/set for `sw config`

use crate::scheduler::MAX_EVENTS_PER_DAY;
use crate::scheduler::timing::parse_clock;
use kdl::{KdlDocument, KdlEntry, KdlNode, KdlValue};
use serde::{Deserialize, Serialize};

/// Output format preference for CLI commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JSON output (default, machine-readable)
    #[default]
    Json,
    /// Human-readable output
    Human,
}

impl OutputFormat {
    /// Parse from string, case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(OutputFormat::Json),
            "human" => Some(OutputFormat::Human),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Human => "human",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Every key config.kdl understands, in display order.
pub const CONFIG_KEYS: &[&str] = &[
    "output-format",
    "role-tag",
    "window-days-back",
    "window-days-ahead",
    "standup-time",
    "max-events-per-day",
    "buffer-minutes",
    "relation-ratio",
    "seed",
    "assistant-endpoint",
    "assistant-timeout-secs",
];

/// Preferences stored in config.kdl.
///
/// # KDL Schema
///
/// ```kdl
/// output-format "human"
/// role-tag "dev"
/// window-days-back 30
/// window-days-ahead 90
/// standup-time "09:00"
/// max-events-per-day 5
/// buffer-minutes 30
/// relation-ratio 0.7
/// seed 42
/// assistant-endpoint "https://assistant.example.com/v1/chat"
/// assistant-timeout-secs 10
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepwiseConfig {
    pub output_format: Option<OutputFormat>,
    /// Role used for template weighting and the synthesis catalog
    pub role_tag: Option<String>,
    pub window_days_back: Option<i64>,
    pub window_days_ahead: Option<i64>,
    /// Standup start time, `HH:MM`
    pub standup_time: Option<String>,
    pub max_events_per_day: Option<u32>,
    pub buffer_minutes: Option<i64>,
    /// Share of generated events that get relations (0.0-1.0)
    pub relation_ratio: Option<f64>,
    pub seed: Option<u64>,
    pub assistant_endpoint: Option<String>,
    pub assistant_timeout_secs: Option<u64>,
}

fn first_value<'a>(doc: &'a KdlDocument, name: &str) -> Option<&'a KdlValue> {
    doc.get(name)
        .and_then(|node| node.entries().first())
        .map(|entry| entry.value())
}

fn string_arg(doc: &KdlDocument, name: &str) -> Option<String> {
    first_value(doc, name)
        .and_then(|v| v.as_string())
        .map(str::to_string)
}

fn int_arg(doc: &KdlDocument, name: &str) -> Option<i128> {
    first_value(doc, name).and_then(|v| v.as_integer())
}

fn float_arg(doc: &KdlDocument, name: &str) -> Option<f64> {
    let value = first_value(doc, name)?;
    value
        .as_float()
        .or_else(|| value.as_integer().map(|i| i as f64))
}

fn push_node(doc: &mut KdlDocument, name: &str, value: KdlValue) {
    let mut node = KdlNode::new(name);
    node.push(KdlEntry::new(value));
    doc.nodes_mut().push(node);
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, String> {
    raw.trim()
        .parse()
        .map_err(|_| format!("{} expects a number, got '{}'", key, raw))
}

impl StepwiseConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the config values.
    ///
    /// Returns an error message naming the first invalid key.
    pub fn validate(&self) -> Result<(), String> {
        for (key, days) in [
            ("window-days-back", self.window_days_back),
            ("window-days-ahead", self.window_days_ahead),
        ] {
            if let Some(days) = days {
                if !(0..=365).contains(&days) {
                    return Err(format!("{} must be 0-365, got {}", key, days));
                }
            }
        }
        if let Some(ref time) = self.standup_time {
            if parse_clock(time).is_none() {
                return Err(format!("standup-time must be HH:MM, got '{}'", time));
            }
        }
        if let Some(max) = self.max_events_per_day {
            if max == 0 || max as usize > MAX_EVENTS_PER_DAY {
                return Err(format!(
                    "max-events-per-day must be 1-{}, got {}",
                    MAX_EVENTS_PER_DAY, max
                ));
            }
        }
        if let Some(buffer) = self.buffer_minutes {
            if !(0..=240).contains(&buffer) {
                return Err(format!("buffer-minutes must be 0-240, got {}", buffer));
            }
        }
        if let Some(ratio) = self.relation_ratio {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(format!("relation-ratio must be 0.0-1.0, got {}", ratio));
            }
        }
        if let Some(timeout) = self.assistant_timeout_secs {
            if !(1..=300).contains(&timeout) {
                return Err(format!("assistant-timeout-secs must be 1-300, got {}", timeout));
            }
        }
        Ok(())
    }

    /// Parse config from a KDL document. Unknown nodes and values of the
    /// wrong type are ignored.
    pub fn from_kdl(doc: &KdlDocument) -> Self {
        Self {
            output_format: string_arg(doc, "output-format").and_then(|s| OutputFormat::parse(&s)),
            role_tag: string_arg(doc, "role-tag"),
            window_days_back: int_arg(doc, "window-days-back").and_then(|i| i64::try_from(i).ok()),
            window_days_ahead: int_arg(doc, "window-days-ahead").and_then(|i| i64::try_from(i).ok()),
            standup_time: string_arg(doc, "standup-time"),
            max_events_per_day: int_arg(doc, "max-events-per-day").and_then(|i| u32::try_from(i).ok()),
            buffer_minutes: int_arg(doc, "buffer-minutes").and_then(|i| i64::try_from(i).ok()),
            relation_ratio: float_arg(doc, "relation-ratio"),
            seed: int_arg(doc, "seed").and_then(|i| u64::try_from(i).ok()),
            assistant_endpoint: string_arg(doc, "assistant-endpoint"),
            assistant_timeout_secs: int_arg(doc, "assistant-timeout-secs").and_then(|i| u64::try_from(i).ok()),
        }
    }

    /// Convert config to a KDL document.
    pub fn to_kdl(&self) -> KdlDocument {
        let mut doc = KdlDocument::new();

        if let Some(format) = self.output_format {
            push_node(&mut doc, "output-format", KdlValue::String(format.as_str().to_string()));
        }
        if let Some(ref role) = self.role_tag {
            push_node(&mut doc, "role-tag", KdlValue::String(role.clone()));
        }
        if let Some(days) = self.window_days_back {
            push_node(&mut doc, "window-days-back", KdlValue::Integer(days as i128));
        }
        if let Some(days) = self.window_days_ahead {
            push_node(&mut doc, "window-days-ahead", KdlValue::Integer(days as i128));
        }
        if let Some(ref time) = self.standup_time {
            push_node(&mut doc, "standup-time", KdlValue::String(time.clone()));
        }
        if let Some(max) = self.max_events_per_day {
            push_node(&mut doc, "max-events-per-day", KdlValue::Integer(max as i128));
        }
        if let Some(buffer) = self.buffer_minutes {
            push_node(&mut doc, "buffer-minutes", KdlValue::Integer(buffer as i128));
        }
        if let Some(ratio) = self.relation_ratio {
            push_node(&mut doc, "relation-ratio", KdlValue::Float(ratio));
        }
        if let Some(seed) = self.seed {
            push_node(&mut doc, "seed", KdlValue::Integer(seed as i128));
        }
        if let Some(ref endpoint) = self.assistant_endpoint {
            push_node(&mut doc, "assistant-endpoint", KdlValue::String(endpoint.clone()));
        }
        if let Some(timeout) = self.assistant_timeout_secs {
            push_node(&mut doc, "assistant-timeout-secs", KdlValue::Integer(timeout as i128));
        }

        doc
    }

    /// Merge another config into this one.
    /// Values from `other` override values in `self` if they are Some.
    pub fn merge(&mut self, other: &StepwiseConfig) {
        if other.output_format.is_some() {
            self.output_format = other.output_format;
        }
        if other.role_tag.is_some() {
            self.role_tag = other.role_tag.clone();
        }
        if other.window_days_back.is_some() {
            self.window_days_back = other.window_days_back;
        }
        if other.window_days_ahead.is_some() {
            self.window_days_ahead = other.window_days_ahead;
        }
        if other.standup_time.is_some() {
            self.standup_time = other.standup_time.clone();
        }
        if other.max_events_per_day.is_some() {
            self.max_events_per_day = other.max_events_per_day;
        }
        if other.buffer_minutes.is_some() {
            self.buffer_minutes = other.buffer_minutes;
        }
        if other.relation_ratio.is_some() {
            self.relation_ratio = other.relation_ratio;
        }
        if other.seed.is_some() {
            self.seed = other.seed;
        }
        if other.assistant_endpoint.is_some() {
            self.assistant_endpoint = other.assistant_endpoint.clone();
        }
        if other.assistant_timeout_secs.is_some() {
            self.assistant_timeout_secs = other.assistant_timeout_secs;
        }
    }

    /// The value of `key` as a string, if set.
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "output-format" => self.output_format.map(|f| f.as_str().to_string()),
            "role-tag" => self.role_tag.clone(),
            "window-days-back" => self.window_days_back.map(|v| v.to_string()),
            "window-days-ahead" => self.window_days_ahead.map(|v| v.to_string()),
            "standup-time" => self.standup_time.clone(),
            "max-events-per-day" => self.max_events_per_day.map(|v| v.to_string()),
            "buffer-minutes" => self.buffer_minutes.map(|v| v.to_string()),
            "relation-ratio" => self.relation_ratio.map(|v| v.to_string()),
            "seed" => self.seed.map(|v| v.to_string()),
            "assistant-endpoint" => self.assistant_endpoint.clone(),
            "assistant-timeout-secs" => self.assistant_timeout_secs.map(|v| v.to_string()),
            _ => None,
        }
    }

    /// Set `key` from its string form, then validate.
    pub fn set(&mut self, key: &str, raw: &str) -> Result<(), String> {
        let mut next = self.clone();
        match key {
            "output-format" => {
                next.output_format = Some(
                    OutputFormat::parse(raw)
                        .ok_or_else(|| format!("output-format must be json or human, got '{}'", raw))?,
                )
            }
            "role-tag" => next.role_tag = Some(raw.trim().to_string()),
            "window-days-back" => next.window_days_back = Some(parse_number(key, raw)?),
            "window-days-ahead" => next.window_days_ahead = Some(parse_number(key, raw)?),
            "standup-time" => next.standup_time = Some(raw.trim().to_string()),
            "max-events-per-day" => next.max_events_per_day = Some(parse_number(key, raw)?),
            "buffer-minutes" => next.buffer_minutes = Some(parse_number(key, raw)?),
            "relation-ratio" => next.relation_ratio = Some(parse_number(key, raw)?),
            "seed" => next.seed = Some(parse_number(key, raw)?),
            "assistant-endpoint" => next.assistant_endpoint = Some(raw.trim().to_string()),
            "assistant-timeout-secs" => next.assistant_timeout_secs = Some(parse_number(key, raw)?),
            _ => {
                return Err(format!(
                    "Unknown config key '{}'. Valid keys: {}",
                    key,
                    CONFIG_KEYS.join(", ")
                ));
            }
        }
        next.validate()?;
        *self = next;
        Ok(())
    }
}
