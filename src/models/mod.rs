//! Data models for Stepwise entities.
//!
//! This module defines the core data structures:
//! - `Directory` - Folder tree that groups processes
//! - `Process` - A checklist, either a reusable template or a per-owner instance
//! - `Step` / `SubStep` - Ordered checklist items with completion state
//! - `Event` - A calendar slot linked to at most one process instance
//! - `User`, `Topic`, `Post`, `Notification`, `CrossReference`, `InsightReport` -
//!   the surrounding account content produced by workspace synthesis

pub mod complexity;
pub mod graph;

pub use complexity::{Complexity, MeetingKind};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Free-form metadata attached to directories, processes, events and posts.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Metadata key holding the symmetric list of related event ids.
pub const RELATED_EVENTS_KEY: &str = "related_events";

/// Metadata key marking an event as produced by the scheduler.
pub const GENERATED_KEY: &str = "generated";

/// A folder in an owner's directory tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Directory {
    /// Store-assigned identifier (0 until inserted)
    pub id: i64,

    /// Display name, unique per owner
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    /// Owning user id
    pub owner: String,

    /// Parent directory; `None` for top-level directories
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<i64>,

    /// Optional collection this directory belongs to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,

    #[serde(default)]
    pub is_template: bool,

    #[serde(default)]
    pub metadata: Metadata,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Directory {
    /// Create a new, not yet persisted, top-level directory.
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            name: name.into(),
            description: None,
            color: None,
            icon: None,
            owner: owner.into(),
            parent_id: None,
            collection: None,
            is_template: false,
            metadata: Metadata::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// A checklist definition or instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Process {
    /// Store-assigned identifier (0 until inserted)
    pub id: i64,

    pub title: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// Owning user id
    pub owner: String,

    /// Containing directory, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory_id: Option<i64>,

    /// Only templates may be favorited; the store clears this on instances
    #[serde(default)]
    pub favorite: bool,

    #[serde(default)]
    pub is_template: bool,

    /// Template this instance was forked from (never set on templates)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_id: Option<i64>,

    #[serde(default)]
    pub metadata: Metadata,

    pub created_at: DateTime<Utc>,

    /// Bumped on every write to the process or its steps
    pub last_updated: DateTime<Utc>,
}

impl Process {
    /// Create a new, not yet persisted, plain (non-template) process.
    pub fn new(owner: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            title: title.into(),
            description: None,
            color: None,
            category: None,
            owner: owner.into(),
            directory_id: None,
            favorite: false,
            is_template: false,
            template_id: None,
            metadata: Metadata::new(),
            created_at: now,
            last_updated: now,
        }
    }

    /// Create a new, not yet persisted, template.
    pub fn template(owner: impl Into<String>, title: impl Into<String>) -> Self {
        let mut process = Self::new(owner, title);
        process.is_template = true;
        process
    }

    /// Returns true if this process was forked from a template.
    pub fn is_instance(&self) -> bool {
        !self.is_template && self.template_id.is_some()
    }
}

/// An ordered item in a process checklist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: i64,

    /// Owning process
    pub process_id: i64,

    pub content: String,

    /// Dense 1-based order within the process
    pub position: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,

    #[serde(default)]
    pub completed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// An ordered item under a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubStep {
    pub id: i64,

    /// Owning step
    pub step_id: i64,

    pub content: String,

    /// Dense 1-based order within the step
    pub position: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,

    #[serde(default)]
    pub completed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// A step together with its substeps, as returned by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepTree {
    #[serde(flatten)]
    pub step: Step,
    pub sub_steps: Vec<SubStep>,
}

/// Progress statistics for a process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessProgress {
    /// Total number of steps
    pub total: usize,
    /// Number of completed steps
    pub completed: usize,
    /// Completion percentage (0-100)
    pub percentage: f64,
}

impl ProcessProgress {
    /// Create new progress stats.
    pub fn new(total: usize, completed: usize) -> Self {
        let percentage = if total > 0 {
            (completed as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        Self {
            total,
            completed,
            percentage,
        }
    }

    /// Completed fraction in `0.0..=1.0`.
    pub fn ratio(&self) -> f64 {
        self.percentage / 100.0
    }
}

/// Event lifecycle status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    #[default]
    Pending,
    Planning,
    Execution,
    Review,
    Administrative,
    Done,
}

impl EventStatus {
    /// Derive the status of an event from its date relative to `today`.
    ///
    /// Past dates are `Done`, today is `Execution`, future dates are `Pending`.
    pub fn derive(date: NaiveDate, today: NaiveDate) -> Self {
        match date.cmp(&today) {
            std::cmp::Ordering::Less => EventStatus::Done,
            std::cmp::Ordering::Equal => EventStatus::Execution,
            std::cmp::Ordering::Greater => EventStatus::Pending,
        }
    }

    /// Get all statuses.
    pub fn all() -> &'static [EventStatus] {
        &[
            EventStatus::Pending,
            EventStatus::Planning,
            EventStatus::Execution,
            EventStatus::Review,
            EventStatus::Administrative,
            EventStatus::Done,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Pending => "pending",
            EventStatus::Planning => "planning",
            EventStatus::Execution => "execution",
            EventStatus::Review => "review",
            EventStatus::Administrative => "administrative",
            EventStatus::Done => "done",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EventStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(EventStatus::Pending),
            "planning" => Ok(EventStatus::Planning),
            "execution" => Ok(EventStatus::Execution),
            "review" => Ok(EventStatus::Review),
            "administrative" => Ok(EventStatus::Administrative),
            "done" => Ok(EventStatus::Done),
            _ => Err(format!("Unknown event status: {}", s)),
        }
    }
}

/// A scheduled calendar event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,

    /// Owning user id
    pub owner: String,

    pub title: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Authoritative start (always strictly before `end_time`)
    pub start_time: DateTime<Utc>,

    /// Authoritative end
    pub end_time: DateTime<Utc>,

    /// Legacy calendar date, `YYYY-MM-DD`
    pub date: String,

    /// Legacy start time, `HH:MM`
    pub time: String,

    /// Legacy duration in minutes
    pub duration: String,

    #[serde(default)]
    pub status: EventStatus,

    #[serde(default)]
    pub complexity: Complexity,

    /// Linked process instance
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_id: Option<i64>,

    #[serde(default)]
    pub metadata: Metadata,

    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Ids listed in the `related_events` metadata entry.
    pub fn related_events(&self) -> Vec<i64> {
        self.metadata
            .get(RELATED_EVENTS_KEY)
            .and_then(|v| v.as_array())
            .map(|items| items.iter().filter_map(|v| v.as_i64()).collect())
            .unwrap_or_default()
    }

    /// Append `other` to `related_events` unless it is already listed.
    ///
    /// Returns true if the list changed.
    pub fn add_related(&mut self, other: i64) -> bool {
        if other == self.id {
            return false;
        }
        let mut related = self.related_events();
        if related.contains(&other) {
            return false;
        }
        related.push(other);
        self.metadata.insert(
            RELATED_EVENTS_KEY.to_string(),
            serde_json::Value::from(related),
        );
        true
    }

    /// Returns true if the event was produced by the scheduler.
    pub fn is_generated(&self) -> bool {
        self.metadata
            .get(GENERATED_KEY)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Calendar date of the event, parsed from the legacy date string,
    /// falling back to the start time's date.
    pub fn calendar_date(&self) -> NaiveDate {
        NaiveDate::parse_from_str(&self.date, "%Y-%m-%d")
            .unwrap_or_else(|_| self.start_time.date_naive())
    }
}

/// An account in the workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Opaque owner id supplied by the identity layer
    pub id: String,
    /// Unique handle
    pub handle: String,
    /// Unique email
    pub email: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_tag: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A discussion topic for feed posts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub id: i64,
    /// Unique name
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A feed post in an owner's workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub owner: String,
    /// Handle of the user who wrote the post
    pub author: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic_id: Option<i64>,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

/// Kind of an owner notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// An event is coming up soon
    UpcomingEvent,
    /// A process instance still has open steps
    OpenSteps,
    /// A teammate posted in the feed
    FeedActivity,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NotificationKind::UpcomingEvent => "upcoming_event",
            NotificationKind::OpenSteps => "open_steps",
            NotificationKind::FeedActivity => "feed_activity",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "upcoming_event" => Ok(NotificationKind::UpcomingEvent),
            "open_steps" => Ok(NotificationKind::OpenSteps),
            "feed_activity" => Ok(NotificationKind::FeedActivity),
            _ => Err(format!("Unknown notification kind: {}", s)),
        }
    }
}

/// A notification addressed to an owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub owner: String,
    pub kind: NotificationKind,
    /// Reference to the subject entity, e.g. `event:42`
    pub subject: String,
    pub message: String,
    #[serde(default)]
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Kinds of entity that can take part in a cross-reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Directory,
    Process,
    Event,
    Post,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntityKind::Directory => "directory",
            EntityKind::Process => "process",
            EntityKind::Event => "event",
            EntityKind::Post => "post",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "directory" => Ok(EntityKind::Directory),
            "process" => Ok(EntityKind::Process),
            "event" => Ok(EntityKind::Event),
            "post" => Ok(EntityKind::Post),
            _ => Err(format!("Unknown entity kind: {}", s)),
        }
    }
}

/// A directed reference between two entities of one owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossReference {
    pub owner: String,
    pub source_kind: EntityKind,
    pub source_id: i64,
    pub target_kind: EntityKind,
    pub target_id: i64,
}

/// Per-owner metrics snapshot for a reporting period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightReport {
    pub owner: String,
    /// Period label, e.g. `2026-03`
    pub period: String,
    pub metrics: serde_json::Value,
    pub generated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::date;

    #[test]
    fn test_process_serialization_roundtrip() {
        let process = Process::template("alice", "Release checklist");
        let json = serde_json::to_string(&process).unwrap();
        let deserialized: Process = serde_json::from_str(&json).unwrap();
        assert_eq!(process, deserialized);
        assert!(deserialized.is_template);
    }

    #[test]
    fn test_process_is_instance() {
        let mut process = Process::new("alice", "Standup");
        assert!(!process.is_instance());
        process.template_id = Some(7);
        assert!(process.is_instance());
    }

    #[test]
    fn test_event_status_serialization() {
        let json = serde_json::to_string(&EventStatus::Execution).unwrap();
        assert_eq!(json, r#""execution""#);
        let parsed: EventStatus = serde_json::from_str(r#""administrative""#).unwrap();
        assert_eq!(parsed, EventStatus::Administrative);
    }

    #[test]
    fn test_event_status_from_str() {
        assert_eq!("Done".parse::<EventStatus>().unwrap(), EventStatus::Done);
        assert_eq!(
            "planning".parse::<EventStatus>().unwrap(),
            EventStatus::Planning
        );
        assert!("later".parse::<EventStatus>().is_err());
        assert_eq!(EventStatus::all().len(), 6);
    }

    #[test]
    fn test_event_status_derive() {
        let today = date(2026, 3, 16);
        assert_eq!(EventStatus::derive(date(2026, 3, 15), today), EventStatus::Done);
        assert_eq!(
            EventStatus::derive(date(2026, 3, 16), today),
            EventStatus::Execution
        );
        assert_eq!(
            EventStatus::derive(date(2026, 3, 17), today),
            EventStatus::Pending
        );
    }

    #[test]
    fn test_process_progress_calculation() {
        assert_eq!(ProcessProgress::new(0, 0).percentage, 0.0);
        assert_eq!(ProcessProgress::new(5, 3).percentage, 60.0);
        assert_eq!(ProcessProgress::new(4, 4).ratio(), 1.0);
    }

    fn sample_event(id: i64) -> Event {
        let now = Utc::now();
        Event {
            id,
            owner: "alice".to_string(),
            title: "Sync".to_string(),
            description: None,
            start_time: now,
            end_time: now + chrono::Duration::minutes(30),
            date: "2026-03-16".to_string(),
            time: "10:00".to_string(),
            duration: "30".to_string(),
            status: EventStatus::Pending,
            complexity: Complexity::default(),
            process_id: None,
            metadata: Metadata::new(),
            created_at: now,
        }
    }

    #[test]
    fn test_add_related_is_idempotent() {
        let mut event = sample_event(1);
        assert!(event.add_related(2));
        assert!(!event.add_related(2));
        assert!(!event.add_related(1), "an event never relates to itself");
        assert!(event.add_related(3));
        assert_eq!(event.related_events(), vec![2, 3]);
    }

    #[test]
    fn test_calendar_date_falls_back_to_start_time() {
        let mut event = sample_event(1);
        assert_eq!(event.calendar_date(), date(2026, 3, 16));
        event.date = "garbage".to_string();
        assert_eq!(event.calendar_date(), event.start_time.date_naive());
    }

    #[test]
    fn test_notification_kind_roundtrip() {
        for kind in [
            NotificationKind::UpcomingEvent,
            NotificationKind::OpenSteps,
            NotificationKind::FeedActivity,
        ] {
            assert_eq!(kind.to_string().parse::<NotificationKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_entity_kind_from_str() {
        assert_eq!("event".parse::<EntityKind>().unwrap(), EntityKind::Event);
        assert!("task".parse::<EntityKind>().is_err());
    }
}
