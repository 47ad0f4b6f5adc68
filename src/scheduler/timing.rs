//! Event start/end computation.
//!
//! Start and end are always computed together from one source, so they can
//! never disagree with each other or with the legacy `date`/`time`/`duration`
//! strings derived from them.

use crate::models::{Complexity, Event};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};

/// Fallback length when a duration cannot be read.
pub const DEFAULT_DURATION_MINUTES: i64 = 60;

/// A consistent start/end pair plus the legacy string fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTiming {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub date: String,
    pub time: String,
    pub duration: String,
}

impl EventTiming {
    /// Build from an authoritative start and length. Lengths below one
    /// minute are replaced by the default so that start < end holds.
    pub fn from_start(start: DateTime<Utc>, minutes: i64) -> Self {
        let minutes = if minutes > 0 {
            minutes
        } else {
            DEFAULT_DURATION_MINUTES
        };
        let end = start + Duration::minutes(minutes);
        Self {
            start,
            end,
            date: start.format("%Y-%m-%d").to_string(),
            time: start.format("%H:%M").to_string(),
            duration: minutes.to_string(),
        }
    }

    /// Timing for an event of `complexity` starting at `time` on `date`.
    pub fn for_complexity(date: NaiveDate, time: NaiveTime, complexity: Complexity) -> Self {
        Self::from_start(date.and_time(time).and_utc(), complexity.duration_minutes())
    }

    /// Parse legacy strings. Anything unreadable falls back to `as_of` and a
    /// 60 minute length, logged at warn level.
    pub fn parse_legacy(date: &str, time: &str, duration: &str, as_of: DateTime<Utc>) -> Self {
        let parsed_date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d");
        let parsed_time = parse_clock(time);

        let start = match (parsed_date, parsed_time) {
            (Ok(d), Some(t)) => d.and_time(t).and_utc(),
            _ => {
                tracing::warn!(date, time, "unreadable event start, using as-of time");
                as_of
            }
        };

        let minutes = match duration.trim().parse::<i64>() {
            Ok(m) if m > 0 => m,
            _ => {
                tracing::warn!(duration, "unreadable event duration, using default");
                DEFAULT_DURATION_MINUTES
            }
        };

        Self::from_start(start, minutes)
    }

    /// Length in whole minutes.
    pub fn minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    /// Write this timing into an event.
    pub fn apply(&self, event: &mut Event) {
        event.start_time = self.start;
        event.end_time = self.end;
        event.date = self.date.clone();
        event.time = self.time.clone();
        event.duration = self.duration.clone();
    }
}

/// Accept `HH:MM` or `HH:MM:SS`.
pub fn parse_clock(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .ok()
}

/// Re-derive an event's timing from its own fields.
///
/// The authoritative pair wins when it is valid; otherwise the legacy
/// strings are parsed with the `as_of` fallback. Returns true if anything
/// changed.
pub fn normalize(event: &mut Event, as_of: DateTime<Utc>) -> bool {
    let timing = if event.start_time < event.end_time {
        EventTiming::from_start(event.start_time, (event.end_time - event.start_time).num_minutes())
    } else {
        tracing::warn!(event_id = event.id, "event ends before it starts, re-deriving timing");
        EventTiming::parse_legacy(&event.date, &event.time, &event.duration, as_of)
    };

    let changed = timing.start != event.start_time
        || timing.end != event.end_time
        || timing.date != event.date
        || timing.time != event.time
        || timing.duration != event.duration;
    timing.apply(event);
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{as_of, date};

    #[test]
    fn test_complexity_sets_end() {
        let t = EventTiming::for_complexity(
            date(2026, 3, 16),
            NaiveTime::from_hms_opt(10, 30, 0).unwrap(),
            Complexity::new(4),
        );
        assert_eq!(t.minutes(), 90);
        assert_eq!(t.date, "2026-03-16");
        assert_eq!(t.time, "10:30");
        assert_eq!(t.duration, "90");
    }

    #[test]
    fn test_legacy_strings_parse() {
        let t = EventTiming::parse_legacy("2026-03-20", "14:00", "45", as_of());
        assert_eq!(t.start, date(2026, 3, 20).and_hms_opt(14, 0, 0).unwrap().and_utc());
        assert_eq!(t.minutes(), 45);
    }

    #[test]
    fn test_bad_input_defaults_to_as_of() {
        let t = EventTiming::parse_legacy("someday", "noon", "forever", as_of());
        assert_eq!(t.start, as_of());
        assert_eq!(t.end, as_of() + Duration::minutes(60));
    }

    #[test]
    fn test_non_positive_duration_is_corrected() {
        let t = EventTiming::parse_legacy("2026-03-20", "14:00", "-15", as_of());
        assert!(t.start < t.end);
        assert_eq!(t.minutes(), 60);
        assert!(EventTiming::from_start(as_of(), 0).start < EventTiming::from_start(as_of(), 0).end);
    }

    #[test]
    fn test_normalize_repairs_inverted_event() {
        let start = date(2026, 3, 18).and_hms_opt(11, 0, 0).unwrap().and_utc();
        let mut event = Event {
            id: 7,
            owner: "alice".to_string(),
            title: "Broken".to_string(),
            description: None,
            start_time: start,
            end_time: start,
            date: "2026-03-18".to_string(),
            time: "11:00".to_string(),
            duration: "30".to_string(),
            status: Default::default(),
            complexity: Complexity::new(1),
            process_id: None,
            metadata: Default::default(),
            created_at: as_of(),
        };
        assert!(normalize(&mut event, as_of()));
        assert_eq!(event.start_time, start);
        assert_eq!(event.end_time, start + Duration::minutes(30));
        assert!(!normalize(&mut event, as_of()));
    }

    #[test]
    fn test_parse_clock_accepts_seconds() {
        assert_eq!(parse_clock("09:00"), NaiveTime::from_hms_opt(9, 0, 0));
        assert_eq!(parse_clock("09:00:30"), NaiveTime::from_hms_opt(9, 0, 30));
        assert_eq!(parse_clock("9am"), None);
    }
}
