//! Monthly insight reports.

use super::relations::relation_graph;
use crate::Result;
use crate::models::{EventStatus, InsightReport};
use crate::storage::Storage;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use serde_json::json;

/// Period label for a timestamp, e.g. `2026-03`.
pub fn period_of(at: DateTime<Utc>) -> String {
    at.format("%Y-%m").to_string()
}

/// First and last day of the month containing `day`.
fn month_bounds(day: NaiveDate) -> (NaiveDate, NaiveDate) {
    let first = day.with_day(1).unwrap_or(day);
    let next = if first.month() == 12 {
        NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
    };
    let last = next.map(|n| n - Duration::days(1)).unwrap_or(first);
    (first, last)
}

fn is_weekday(day: NaiveDate) -> bool {
    !matches!(day.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Compute the metrics for the month containing `as_of`.
pub fn compute_metrics(storage: &Storage, owner: &str, as_of: DateTime<Utc>) -> Result<serde_json::Value> {
    let (first, last) = month_bounds(as_of.date_naive());
    let events = storage.list_events(owner, Some(first), Some(last))?;

    let mut by_status = serde_json::Map::new();
    for status in EventStatus::all() {
        let n = events.iter().filter(|e| e.status == *status).count();
        by_status.insert(status.as_str().to_string(), n.into());
    }

    let mut per_weekday = [0usize; 7];
    for event in &events {
        per_weekday[event.calendar_date().weekday().num_days_from_monday() as usize] += 1;
    }
    let busiest = per_weekday
        .iter()
        .enumerate()
        .filter(|(_, n)| **n > 0)
        // max_by_key keeps the last maximum, so reverse for the earliest day
        .rev()
        .max_by_key(|(_, n)| **n)
        .map(|(i, _)| Weekday::try_from(i as u8).map(|d| d.to_string()).unwrap_or_default());

    let weekday_dates = first
        .iter_days()
        .take_while(|d| *d <= last)
        .filter(|d| is_weekday(*d))
        .count();
    let weekday_events: usize = per_weekday[..5].iter().sum();
    let avg_per_weekday = if weekday_dates == 0 {
        0.0
    } else {
        weekday_events as f64 / weekday_dates as f64
    };

    let mut total_steps = 0;
    let mut completed_steps = 0;
    for process in storage.list_processes(Some(owner), Some(false))? {
        let progress = storage.process_progress(process.id)?;
        total_steps += progress.total;
        completed_steps += progress.completed;
    }
    let completion_ratio = if total_steps == 0 {
        0.0
    } else {
        completed_steps as f64 / total_steps as f64
    };

    let clusters = relation_graph(storage, owner)?.clusters().len();

    Ok(json!({
        "total_events": events.len(),
        "events_by_status": by_status,
        "completion_ratio": (completion_ratio * 1000.0).round() / 1000.0,
        "busiest_weekday": busiest,
        "avg_events_per_weekday": (avg_per_weekday * 100.0).round() / 100.0,
        "relation_clusters": clusters,
    }))
}

/// Store the report for the current period. Returns true when the stored
/// metrics changed.
pub fn record_insights(storage: &Storage, owner: &str, as_of: DateTime<Utc>) -> Result<bool> {
    let period = period_of(as_of);
    let metrics = compute_metrics(storage, owner, as_of)?;
    if let Some(existing) = storage.get_insight_report(owner, &period)? {
        if existing.metrics == metrics {
            return Ok(false);
        }
    }
    storage.upsert_insight_report(&InsightReport {
        owner: owner.to_string(),
        period,
        metrics,
        generated_at: as_of,
    })?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Process;
    use crate::scheduler::{ScheduleRequest, generate_events};
    use crate::test_utils::{TestEnv, as_of, date};

    #[test]
    fn test_month_bounds() {
        assert_eq!(month_bounds(date(2026, 3, 16)), (date(2026, 3, 1), date(2026, 3, 31)));
        assert_eq!(month_bounds(date(2026, 12, 5)), (date(2026, 12, 1), date(2026, 12, 31)));
        assert_eq!(month_bounds(date(2028, 2, 10)), (date(2028, 2, 1), date(2028, 2, 29)));
    }

    #[test]
    fn test_empty_owner_metrics() {
        let env = TestEnv::new();
        let storage = env.init_storage();
        let metrics = compute_metrics(&storage, "nobody", as_of()).unwrap();
        assert_eq!(metrics["total_events"], 0);
        assert!(metrics["busiest_weekday"].is_null());
        assert_eq!(metrics["completion_ratio"], 0.0);
    }

    #[test]
    fn test_record_is_stable() {
        let env = TestEnv::new();
        let storage = env.init_storage();
        let template = storage.insert_process(&Process::template("alice", "Team Standup")).unwrap();
        storage.add_step(template, "Share", None).unwrap();
        let request = ScheduleRequest::new("alice", as_of())
            .with_window(date(2026, 3, 1), date(2026, 3, 31))
            .with_seed(4);
        generate_events(&storage, &request).unwrap();

        assert!(record_insights(&storage, "alice", as_of()).unwrap());
        assert!(!record_insights(&storage, "alice", as_of()).unwrap());

        let report = storage.get_insight_report("alice", "2026-03").unwrap().unwrap();
        let total = report.metrics["total_events"].as_u64().unwrap();
        assert_eq!(total as usize, storage.list_events("alice", None, None).unwrap().len());
        assert_eq!(report.metrics["events_by_status"]["done"].as_u64().unwrap() > 0, true);
        assert!(report.metrics["avg_events_per_weekday"].as_f64().unwrap() >= 1.0);
    }
}
