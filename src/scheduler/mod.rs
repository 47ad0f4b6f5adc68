//! Time-slot scheduler.
//!
//! [`generate_events`] fills an owner's calendar over a date window:
//!
//! - one standup per weekday (weekends only occasionally) at a fixed time
//! - up to four more events per weekday on a half-hour palette
//! - at most five events per day, each at least 30 minutes from the next
//! - every event linked to its own forked process instance
//!
//! Each day is planned from an RNG seeded by `(seed, owner, date)` and the
//! owner's hand-made events only, then written by natural key. Re-running
//! over the same window therefore re-plans the same day and finds every
//! event it already wrote.

pub mod selection;
pub mod slots;
pub mod steps;
pub mod timing;

use crate::forking;
use crate::models::{Complexity, Event, EventStatus, GENERATED_KEY, Metadata, MeetingKind, Process};
use crate::storage::Storage;
use crate::{Error, Result};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use selection::Candidate;
use serde_json::Value;
use sha2::{Digest, Sha256};
use slots::{DayBook, Interval};
use std::collections::{HashMap, HashSet};
use timing::EventTiming;

pub const DEFAULT_DAYS_BACK: i64 = 30;
pub const DEFAULT_DAYS_AHEAD: i64 = 90;

/// Title of generated standups.
pub const STANDUP_TITLE: &str = "Daily Standup";

/// Hard cap on events per calendar day.
pub const MAX_EVENTS_PER_DAY: usize = 5;

/// Tunables for the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleSettings {
    /// Start time of the daily standup
    pub standup_time: NaiveTime,
    /// Cap on events per day, hand-made ones included (at most [`MAX_EVENTS_PER_DAY`])
    pub max_events_per_day: usize,
    /// Minimum gap between two events on the same day
    pub buffer_minutes: i64,
    /// Chance that a weekend day gets a standup
    pub weekend_standup_probability: f64,
    /// Upper bound on non-standup events per weekday
    pub max_extra_per_day: usize,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            standup_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
            max_events_per_day: MAX_EVENTS_PER_DAY,
            buffer_minutes: 30,
            weekend_standup_probability: 0.1,
            max_extra_per_day: 4,
        }
    }
}

/// What to schedule, for whom, and when.
#[derive(Debug, Clone)]
pub struct ScheduleRequest {
    pub owner: String,
    pub role_tag: Option<String>,
    /// First day of the window (inclusive)
    pub window_start: NaiveDate,
    /// Last day of the window (inclusive)
    pub window_end: NaiveDate,
    /// Process ids to schedule from; empty means the default pool
    pub template_pool: Vec<i64>,
    /// "Now" for status derivation
    pub as_of: DateTime<Utc>,
    pub seed: u64,
    pub settings: ScheduleSettings,
}

impl ScheduleRequest {
    /// A request over the default window around `as_of`.
    pub fn new(owner: impl Into<String>, as_of: DateTime<Utc>) -> Self {
        let today = as_of.date_naive();
        Self {
            owner: owner.into(),
            role_tag: None,
            window_start: today - Duration::days(DEFAULT_DAYS_BACK),
            window_end: today + Duration::days(DEFAULT_DAYS_AHEAD),
            template_pool: Vec::new(),
            as_of,
            seed: 0,
            settings: ScheduleSettings::default(),
        }
    }

    pub fn with_window(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.window_start = start;
        self.window_end = end;
        self
    }

    /// Window of `back` days before and `ahead` days after `as_of`.
    pub fn with_days(mut self, back: i64, ahead: i64) -> Self {
        let today = self.as_of.date_naive();
        self.window_start = today - Duration::days(back);
        self.window_end = today + Duration::days(ahead);
        self
    }

    pub fn with_role(mut self, role_tag: Option<String>) -> Self {
        self.role_tag = role_tag;
        self
    }

    pub fn with_pool(mut self, pool: Vec<i64>) -> Self {
        self.template_pool = pool;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_settings(mut self, settings: ScheduleSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Every date in the window.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.window_start
            .iter_days()
            .take_while(move |d| *d <= self.window_end)
    }
}

/// A deterministic RNG for `scope`, derived from `seed`.
pub fn seeded_rng(seed: u64, scope: &str) -> StdRng {
    let mut hasher = Sha256::new();
    hasher.update(seed.to_le_bytes());
    hasher.update(scope.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&digest);
    StdRng::from_seed(bytes)
}

fn day_rng(seed: u64, owner: &str, date: NaiveDate) -> StdRng {
    seeded_rng(seed, &format!("day:{}:{}", owner, date.format("%Y-%m-%d")))
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Where a planned event gets its process from.
#[derive(Debug, Clone, Copy)]
enum Source<'a> {
    Candidate(&'a Candidate),
    /// The owner's plain standup process, used when no standup template exists
    PlainStandup,
}

impl Source<'_> {
    fn key(&self) -> Option<i64> {
        match self {
            Source::Candidate(c) => Some(c.process.id),
            Source::PlainStandup => None,
        }
    }

    fn title(&self) -> &str {
        match self {
            Source::Candidate(c) => &c.process.title,
            Source::PlainStandup => STANDUP_TITLE,
        }
    }
}

struct Planned<'a> {
    title: String,
    source: Source<'a>,
    timing: EventTiming,
    complexity: Complexity,
}

/// Fill the owner's calendar. Returns the ids of newly created events.
pub fn generate_events(storage: &Storage, request: &ScheduleRequest) -> Result<Vec<i64>> {
    if request.window_end < request.window_start {
        return Err(Error::InvalidInput(format!(
            "Window ends ({}) before it starts ({})",
            request.window_end, request.window_start
        )));
    }

    let candidates = selection::build_pool(
        storage,
        &request.owner,
        request.role_tag.as_deref(),
        &request.template_pool,
    )?;
    let (standups, others): (Vec<&Candidate>, Vec<&Candidate>) = candidates
        .iter()
        .partition(|c| c.kind() == MeetingKind::Standup);

    // Prefer a standup template; fall back to the owner's plain process
    let standup_source = standups
        .iter()
        .copied()
        .filter(|c| c.process.is_template)
        .max_by(|a, b| a.weight.total_cmp(&b.weight).then(b.process.id.cmp(&a.process.id)))
        .map(Source::Candidate)
        .unwrap_or(Source::PlainStandup);

    let mut links: HashMap<Option<i64>, i64> = HashMap::new();
    let mut created = Vec::new();
    for date in request.days() {
        storage.with_transaction(|s| {
            let plan = plan_day(s, request, date, &others, standup_source)?;
            commit_day(s, request, date, plan, &mut links, &mut created)
        })?;
    }

    tracing::info!(
        owner = %request.owner,
        start = %request.window_start,
        end = %request.window_end,
        created = created.len(),
        "scheduled events"
    );
    Ok(created)
}

/// Decide one day's events. Only the owner's hand-made events constrain the
/// plan, so it comes out the same no matter what earlier runs wrote.
fn plan_day<'a>(
    storage: &Storage,
    request: &ScheduleRequest,
    date: NaiveDate,
    pool: &[&'a Candidate],
    standup: Source<'a>,
) -> Result<Vec<Planned<'a>>> {
    let settings = &request.settings;
    let mut rng = day_rng(request.seed, &request.owner, date);
    let weekend = is_weekend(date);
    let weekend_roll = rng.random_bool(settings.weekend_standup_probability.clamp(0.0, 1.0));
    let extra = if weekend {
        0
    } else {
        rng.random_range(0..=settings.max_extra_per_day)
    };
    let mut order = slots::palette();
    order.shuffle(&mut rng);

    let fixed: Vec<Event> = storage
        .events_on(&request.owner, date)?
        .into_iter()
        .filter(|e| !e.is_generated())
        .collect();
    let mut book = DayBook::new(date, settings.max_events_per_day, settings.buffer_minutes);
    for e in &fixed {
        book.record(Interval::new(e.start_time, e.end_time));
    }
    let mut titles: HashSet<String> = fixed.iter().map(|e| e.title.clone()).collect();
    let mut planned = Vec::new();

    let has_standup = fixed.iter().any(|e| e.title.to_lowercase().contains("standup"));
    if (!weekend || weekend_roll) && !has_standup && !titles.contains(STANDUP_TITLE) {
        let complexity = MeetingKind::Standup.typical_complexity();
        let timing = EventTiming::for_complexity(date, settings.standup_time, complexity);
        if book.book(Interval::new(timing.start, timing.end)) {
            titles.insert(STANDUP_TITLE.to_string());
            planned.push(Planned {
                title: STANDUP_TITLE.to_string(),
                source: standup,
                timing,
                complexity,
            });
        }
    }

    for _ in 0..extra {
        if book.is_full() {
            break;
        }
        let available: Vec<&Candidate> = pool
            .iter()
            .filter(|c| !titles.contains(&c.process.title))
            .copied()
            .collect();
        let Some(candidate) = selection::choose(&available, &mut rng) else {
            break;
        };
        let complexity = candidate.kind().typical_complexity();
        let Some(slot) = book.find_slot(&order, complexity.duration_minutes()) else {
            tracing::debug!(%date, "no slot clears the buffer, day closed");
            break;
        };
        book.book(slot);
        titles.insert(candidate.process.title.clone());
        planned.push(Planned {
            title: candidate.process.title.clone(),
            source: Source::Candidate(candidate),
            timing: EventTiming::from_start(slot.start, complexity.duration_minutes()),
            complexity,
        });
    }

    Ok(planned)
}

/// Write a day's plan, skipping events that already exist and anything the
/// current state of the day can no longer hold.
fn commit_day(
    storage: &Storage,
    request: &ScheduleRequest,
    date: NaiveDate,
    plan: Vec<Planned<'_>>,
    links: &mut HashMap<Option<i64>, i64>,
    created: &mut Vec<i64>,
) -> Result<()> {
    let settings = &request.settings;
    let mut book = DayBook::new(date, settings.max_events_per_day, settings.buffer_minutes);
    for e in storage.events_on(&request.owner, date)? {
        book.record(Interval::new(e.start_time, e.end_time));
    }

    for planned in plan {
        if storage
            .find_event(&request.owner, &planned.title, &planned.timing.date)?
            .is_some()
        {
            continue;
        }
        if !book.book(Interval::new(planned.timing.start, planned.timing.end)) {
            tracing::debug!(%date, title = %planned.title, "day no longer has room, skipping");
            continue;
        }

        let process_id = link_process(storage, request, planned.source, links)?;

        let mut metadata = Metadata::new();
        metadata.insert(GENERATED_KEY.to_string(), Value::Bool(true));
        metadata.insert(
            "kind".to_string(),
            Value::from(MeetingKind::infer(&planned.title).to_string()),
        );

        let mut event = Event {
            id: 0,
            owner: request.owner.clone(),
            title: planned.title.clone(),
            description: Some(format!("Scheduled from {}", planned.source.title())),
            start_time: planned.timing.start,
            end_time: planned.timing.end,
            date: String::new(),
            time: String::new(),
            duration: String::new(),
            status: EventStatus::derive(date, request.as_of.date_naive()),
            complexity: planned.complexity,
            process_id,
            metadata,
            created_at: request.as_of,
        };
        planned.timing.apply(&mut event);

        let (stored, was_created) = storage.find_or_create_event(&event)?;
        if was_created {
            created.push(stored.id);
        }
    }
    Ok(())
}

/// The process a new event links to: the owner's fork of a template, or the
/// owner's own plain process. Either way it ends up with steps.
fn link_process(
    storage: &Storage,
    request: &ScheduleRequest,
    source: Source<'_>,
    links: &mut HashMap<Option<i64>, i64>,
) -> Result<Option<i64>> {
    let owner = request.owner.as_str();
    if let Some(&id) = links.get(&source.key()) {
        return Ok(Some(id));
    }

    let process_id = match source {
        Source::Candidate(c) if c.process.is_template => {
            match forking::fork(storage, c.process.id, owner, request.as_of)? {
                Some(outcome) => {
                    if !outcome.complete {
                        tracing::warn!(
                            instance_id = outcome.instance_id,
                            "linking event to a partially copied instance"
                        );
                    }
                    outcome.instance_id
                }
                None => return Ok(None),
            }
        }
        Source::Candidate(c) => c.process.id,
        Source::PlainStandup => {
            storage
                .find_or_create_process(&Process::new(owner, STANDUP_TITLE))?
                .0
                .id
        }
    };

    steps::ensure_steps(storage, process_id, source.title())?;
    links.insert(source.key(), process_id);
    Ok(Some(process_id))
}

/// Re-derive the status of an owner's generated events against `as_of`.
/// Returns the number of events whose status changed.
pub fn refresh_statuses(storage: &Storage, owner: &str, as_of: DateTime<Utc>) -> Result<usize> {
    let today = as_of.date_naive();
    storage.with_transaction(|s| {
        let mut changed = 0;
        for event in s.list_events(owner, None, None)? {
            if !event.is_generated() {
                continue;
            }
            let status = EventStatus::derive(event.calendar_date(), today);
            if s.set_event_status(event.id, status)? {
                changed += 1;
            }
        }
        Ok(changed)
    })
}
