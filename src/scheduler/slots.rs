//! Per-day slot booking with a spacing buffer.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};

/// Start times offered to non-standup events, on the half hour.
pub const SLOT_PALETTE: [(u32, u32); 12] = [
    (10, 0),
    (10, 30),
    (11, 0),
    (11, 30),
    (13, 0),
    (13, 30),
    (14, 0),
    (14, 30),
    (15, 0),
    (15, 30),
    (16, 0),
    (16, 30),
];

/// The palette as clock times.
pub fn palette() -> Vec<NaiveTime> {
    SLOT_PALETTE
        .iter()
        .filter_map(|&(h, m)| NaiveTime::from_hms_opt(h, m, 0))
        .collect()
}

/// A half-open `[start, end)` interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Interval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// True if the two intervals are at least `buffer` apart.
    pub fn clear_of(&self, other: &Interval, buffer: Duration) -> bool {
        self.start >= other.end + buffer || self.end + buffer <= other.start
    }
}

/// Bookings for one calendar day.
#[derive(Debug, Clone)]
pub struct DayBook {
    pub date: NaiveDate,
    used: Vec<Interval>,
    max_events: usize,
    buffer: Duration,
}

impl DayBook {
    pub fn new(date: NaiveDate, max_events: usize, buffer_minutes: i64) -> Self {
        Self {
            date,
            used: Vec::new(),
            max_events,
            buffer: Duration::minutes(buffer_minutes),
        }
    }

    pub fn count(&self) -> usize {
        self.used.len()
    }

    pub fn is_full(&self) -> bool {
        self.used.len() >= self.max_events
    }

    /// True if `interval` can be booked: the day has room and the interval
    /// keeps the buffer to every existing booking.
    pub fn accepts(&self, interval: &Interval) -> bool {
        !self.is_full() && self.used.iter().all(|u| interval.clear_of(u, self.buffer))
    }

    /// Record a booking without checking it (existing events).
    pub fn record(&mut self, interval: Interval) {
        self.used.push(interval);
    }

    /// Book `interval` if accepted. Returns whether it was booked.
    pub fn book(&mut self, interval: Interval) -> bool {
        if self.accepts(&interval) {
            self.used.push(interval);
            true
        } else {
            false
        }
    }

    /// First start time in `order` whose `minutes`-long interval is accepted.
    pub fn find_slot(&self, order: &[NaiveTime], minutes: i64) -> Option<Interval> {
        order
            .iter()
            .map(|&t| {
                let start = self.date.and_time(t).and_utc();
                Interval::new(start, start + Duration::minutes(minutes))
            })
            .find(|iv| iv.end.date_naive() == self.date && self.accepts(iv))
    }
}
