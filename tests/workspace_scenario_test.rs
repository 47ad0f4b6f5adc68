//! End-to-end scenario: seed a developer workspace through the library API
//! and check the calendar it produces.

use chrono::{Datelike, Duration, TimeZone, Utc, Weekday};
use std::collections::HashSet;
use stepwise::scheduler::STANDUP_TITLE;
use stepwise::storage::Storage;
use stepwise::synthesis::{Phase, PhaseStatus, SynthesisOptions, synthesize_workspace};
use tempfile::TempDir;

fn options() -> SynthesisOptions {
    let mut options = SynthesisOptions::new(Utc.with_ymd_and_hms(2026, 3, 16, 12, 0, 0).unwrap());
    options.seed = 21;
    options
}

#[test]
fn test_developer_workspace() {
    let dir = TempDir::new().unwrap();
    let storage = Storage::open_at(&dir.path().join("stepwise.db")).unwrap();
    let options = options();

    let report = synthesize_workspace(&storage, "dev@example.com", Some("dev"), &options).unwrap();
    assert!(report.succeeded(), "failed phases: {:?}", report.phases);

    let today = options.as_of.date_naive();
    let start = today - Duration::days(options.days_back);
    let end = today + Duration::days(options.days_ahead);
    let events = storage.list_events("dev@example.com", None, None).unwrap();
    assert!(!events.is_empty());

    let mut standup_days = HashSet::new();
    for event in &events {
        let date = event.calendar_date();
        assert!(date >= start && date <= end, "event {} outside window", event.id);
        assert!(event.start_time < event.end_time);
        assert!(!event.time.is_empty() && !event.duration.is_empty());

        let process_id = event.process_id.expect("every event links a process");
        assert!(storage.count_steps(process_id).unwrap() > 0);
        if event.title == STANDUP_TITLE {
            assert!(standup_days.insert(date), "two standups on {}", date);
        }
    }

    let mut day = start;
    while day <= end {
        if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            assert!(standup_days.contains(&day), "no standup on {}", day);
        }
        day += Duration::days(1);
    }
}

#[test]
fn test_rerun_converges() {
    let dir = TempDir::new().unwrap();
    let storage = Storage::open_at(&dir.path().join("stepwise.db")).unwrap();
    let options = options();

    let first = synthesize_workspace(&storage, "pat", Some("dev"), &options).unwrap();
    let events_before = storage.list_events("pat", None, None).unwrap();
    let second = synthesize_workspace(&storage, "pat", Some("dev"), &options).unwrap();
    let events_after = storage.list_events("pat", None, None).unwrap();

    assert_eq!(first.counts, second.counts);
    assert_eq!(events_before, events_after);
    for outcome in &second.phases {
        assert_eq!(outcome.status, PhaseStatus::Succeeded);
        assert_eq!(outcome.changed, 0, "{} changed on re-run", outcome.phase);
    }
    assert!(second.outcome(Phase::Insights).is_some());
}

#[test]
fn test_window_can_be_narrowed() {
    let dir = TempDir::new().unwrap();
    let storage = Storage::open_at(&dir.path().join("stepwise.db")).unwrap();
    let mut options = options();
    options.days_back = 0;
    options.days_ahead = 4;

    let report = synthesize_workspace(&storage, "sam", None, &options).unwrap();
    assert!(report.succeeded());
    let events = storage.list_events("sam", None, None).unwrap();
    let dates: HashSet<_> = events.iter().map(|e| e.calendar_date()).collect();
    assert!(dates.iter().all(|d| {
        *d >= options.as_of.date_naive() && *d <= options.as_of.date_naive() + Duration::days(4)
    }));
    // Monday through Friday each have a standup
    assert_eq!(
        events.iter().filter(|e| e.title == STANDUP_TITLE).count(),
        5,
        "{:?}",
        dates
    );
}
