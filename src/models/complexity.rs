//! Event complexity levels and meeting-kind heuristics.
//!
//! Complexity is a 1-5 scale that fixes an event's duration. The meeting kind
//! is inferred from an event or process title and decides which starter step
//! set a process receives when it has none.
//!
//! # Example
//!
//! ```
//! use stepwise::models::complexity::{Complexity, MeetingKind};
//!
//! assert_eq!(Complexity::new(5).duration_minutes(), 120);
//! assert_eq!(MeetingKind::infer("Daily Standup"), MeetingKind::Standup);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Duration in minutes for each complexity level, indexed by `level - 1`.
pub const DURATION_MINUTES: [i64; 5] = [30, 45, 60, 90, 120];

/// Event complexity on a 1-5 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Complexity(u8);

impl Complexity {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    /// Create a complexity, clamping out-of-range values into 1-5.
    pub fn new(level: u8) -> Self {
        Self(level.clamp(Self::MIN, Self::MAX))
    }

    /// Strict constructor for user input.
    pub fn try_new(level: u8) -> Result<Self, String> {
        if (Self::MIN..=Self::MAX).contains(&level) {
            Ok(Self(level))
        } else {
            Err(format!("complexity must be 1-5, got {}", level))
        }
    }

    pub fn level(&self) -> u8 {
        self.0
    }

    /// Fixed duration for this complexity level.
    pub fn duration_minutes(&self) -> i64 {
        DURATION_MINUTES[(self.0 - 1) as usize]
    }

    /// Smallest complexity whose duration covers `minutes`.
    pub fn from_duration_minutes(minutes: i64) -> Self {
        let level = DURATION_MINUTES
            .iter()
            .position(|&d| minutes <= d)
            .map(|idx| idx as u8 + 1)
            .unwrap_or(Self::MAX);
        Self(level)
    }
}

impl Default for Complexity {
    fn default() -> Self {
        Self(3)
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Broad kind of meeting an event or process represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingKind {
    Standup,
    Review,
    Planning,
    Workshop,
    Meeting,
}

/// Keyword lists checked in order; the first kind with a hit wins.
const KIND_KEYWORDS: &[(MeetingKind, &[&str])] = &[
    (MeetingKind::Standup, &["standup", "stand-up", "daily sync", "check-in"]),
    (
        MeetingKind::Review,
        &["review", "retro", "retrospective", "postmortem", "audit", "demo"],
    ),
    (
        MeetingKind::Planning,
        &["planning", "plan", "roadmap", "kickoff", "grooming", "refinement"],
    ),
    (
        MeetingKind::Workshop,
        &["workshop", "training", "onboarding", "brainstorm", "hackathon"],
    ),
];

impl MeetingKind {
    /// Infer the meeting kind from a title, falling back to a generic meeting.
    pub fn infer(title: &str) -> Self {
        let lower = title.to_lowercase();
        KIND_KEYWORDS
            .iter()
            .find(|(_, words)| words.iter().any(|w| lower.contains(w)))
            .map(|(kind, _)| *kind)
            .unwrap_or(MeetingKind::Meeting)
    }

    /// Typical complexity for this kind of meeting.
    pub fn typical_complexity(&self) -> Complexity {
        match self {
            MeetingKind::Standup => Complexity::new(1),
            MeetingKind::Meeting => Complexity::new(2),
            MeetingKind::Review => Complexity::new(3),
            MeetingKind::Planning => Complexity::new(4),
            MeetingKind::Workshop => Complexity::new(5),
        }
    }

    /// Starter steps for a process of this kind that has none, as
    /// `(step, substeps)` pairs.
    pub fn starter_steps(&self) -> &'static [(&'static str, &'static [&'static str])] {
        match self {
            MeetingKind::Standup => &[
                ("Share yesterday's progress", &[]),
                ("Share today's plan", &[]),
                ("Raise blockers", &["Assign an owner to each blocker"]),
            ],
            MeetingKind::Review => &[
                ("Collect material to review", &["Gather links", "Circulate agenda"]),
                ("Walk through findings", &[]),
                ("Record action items", &["Assign owners", "Set due dates"]),
            ],
            MeetingKind::Planning => &[
                ("Review goals and constraints", &[]),
                ("Estimate candidate work", &["Size each item", "Flag risks"]),
                ("Commit to a plan", &[]),
                ("Share the plan", &[]),
            ],
            MeetingKind::Workshop => &[
                ("Prepare materials", &["Book the room", "Send pre-reading"]),
                ("Run the exercises", &[]),
                ("Capture outcomes", &["Photograph whiteboards", "Write summary"]),
            ],
            MeetingKind::Meeting => &[
                ("Share the agenda", &[]),
                ("Discuss agenda items", &[]),
                ("Send follow-up notes", &[]),
            ],
        }
    }
}

impl fmt::Display for MeetingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MeetingKind::Standup => "standup",
            MeetingKind::Review => "review",
            MeetingKind::Planning => "planning",
            MeetingKind::Workshop => "workshop",
            MeetingKind::Meeting => "meeting",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_map() {
        let durations: Vec<i64> = (1..=5).map(|l| Complexity::new(l).duration_minutes()).collect();
        assert_eq!(durations, vec![30, 45, 60, 90, 120]);
    }

    #[test]
    fn test_new_clamps() {
        assert_eq!(Complexity::new(0).level(), 1);
        assert_eq!(Complexity::new(9).level(), 5);
        assert!(Complexity::try_new(6).is_err());
        assert_eq!(Complexity::try_new(4).unwrap().level(), 4);
    }

    #[test]
    fn test_from_duration_minutes() {
        assert_eq!(Complexity::from_duration_minutes(15).level(), 1);
        assert_eq!(Complexity::from_duration_minutes(45).level(), 2);
        assert_eq!(Complexity::from_duration_minutes(61).level(), 4);
        assert_eq!(Complexity::from_duration_minutes(500).level(), 5);
    }

    #[test]
    fn test_complexity_serializes_as_number() {
        assert_eq!(serde_json::to_string(&Complexity::new(4)).unwrap(), "4");
        let parsed: Complexity = serde_json::from_str("2").unwrap();
        assert_eq!(parsed.level(), 2);
    }

    #[test]
    fn test_infer_meeting_kind() {
        assert_eq!(MeetingKind::infer("Daily Standup"), MeetingKind::Standup);
        assert_eq!(MeetingKind::infer("Sprint Retrospective"), MeetingKind::Review);
        assert_eq!(MeetingKind::infer("Q3 Roadmap Planning"), MeetingKind::Planning);
        assert_eq!(MeetingKind::infer("Onboarding workshop"), MeetingKind::Workshop);
        assert_eq!(MeetingKind::infer("Coffee with Sam"), MeetingKind::Meeting);
    }

    #[test]
    fn test_first_matching_kind_wins() {
        // "standup" is checked before "review"
        assert_eq!(MeetingKind::infer("Standup review"), MeetingKind::Standup);
    }

    #[test]
    fn test_starter_steps_are_non_empty() {
        for kind in [
            MeetingKind::Standup,
            MeetingKind::Review,
            MeetingKind::Planning,
            MeetingKind::Workshop,
            MeetingKind::Meeting,
        ] {
            assert!(!kind.starter_steps().is_empty(), "{} has no steps", kind);
        }
    }
}
