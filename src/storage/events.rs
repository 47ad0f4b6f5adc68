//! Calendar event persistence.

use super::{Storage, fmt_ts, parse_enum, parse_metadata, parse_ts};
use crate::models::{Complexity, Event, EventStatus, Metadata, RELATED_EVENTS_KEY};
use crate::{Error, Result};
use chrono::NaiveDate;
use rusqlite::{OptionalExtension, Row, ToSql, params};

const EVENT_COLUMNS: &str = "id, owner, title, description, start_time, end_time, date, time, \
     duration, status, complexity, process_id, metadata, created_at";

fn row_to_event(row: &Row) -> rusqlite::Result<Event> {
    let start_time: String = row.get(4)?;
    let end_time: String = row.get(5)?;
    let status: String = row.get(9)?;
    let complexity: u8 = row.get(10)?;
    let metadata: String = row.get(12)?;
    let created_at: String = row.get(13)?;
    Ok(Event {
        id: row.get(0)?,
        owner: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        start_time: parse_ts(4, &start_time)?,
        end_time: parse_ts(5, &end_time)?,
        date: row.get(6)?,
        time: row.get(7)?,
        duration: row.get(8)?,
        status: parse_enum::<EventStatus>(9, &status)?,
        complexity: Complexity::new(complexity),
        process_id: row.get(11)?,
        metadata: parse_metadata(12, &metadata)?,
        created_at: parse_ts(13, &created_at)?,
    })
}

fn fmt_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn validate_event(event: &Event) -> Result<()> {
    if event.title.trim().is_empty() {
        return Err(Error::InvalidInput("Event title cannot be empty".to_string()));
    }
    if event.start_time >= event.end_time {
        return Err(Error::InvalidInput(format!(
            "Event '{}' must start before it ends",
            event.title
        )));
    }
    Ok(())
}

impl Storage {
    fn write_event(&self, event: &Event, on_conflict: &str) -> Result<usize> {
        validate_event(event)?;
        let sql = format!(
            "INSERT INTO events
             (owner, title, description, start_time, end_time, date, time, duration, status,
              complexity, process_id, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13) {}",
            on_conflict
        );
        let changed = self.conn().execute(
            &sql,
            params![
                event.owner,
                event.title,
                event.description,
                fmt_ts(event.start_time),
                fmt_ts(event.end_time),
                event.date,
                event.time,
                event.duration,
                event.status.as_str(),
                event.complexity.level(),
                event.process_id,
                serde_json::to_string(&event.metadata)?,
                fmt_ts(event.created_at),
            ],
        )?;
        Ok(changed)
    }

    /// Insert an event, failing if `(owner, title, date)` is taken.
    pub fn insert_event(&self, event: &Event) -> Result<i64> {
        self.write_event(event, "")?;
        Ok(self.conn().last_insert_rowid())
    }

    /// Find an event by `(owner, title, date)` or create it.
    pub fn find_or_create_event(&self, event: &Event) -> Result<(Event, bool)> {
        let created = self.write_event(event, "ON CONFLICT DO NOTHING")? > 0;
        let stored = self
            .find_event(&event.owner, &event.title, &event.date)?
            .ok_or_else(|| Error::NotFound(format!("Event not found: {}", event.title)))?;
        if created {
            tracing::debug!(id = stored.id, title = %stored.title, date = %stored.date, "created event");
        }
        Ok((stored, created))
    }

    fn query_events(&self, where_clause: &str, args: &[&dyn ToSql]) -> Result<Vec<Event>> {
        let sql = format!(
            "SELECT {} FROM events WHERE {} ORDER BY start_time, id",
            EVENT_COLUMNS, where_clause
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let events = stmt
            .query_map(args, row_to_event)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(events)
    }

    pub fn get_event(&self, id: i64) -> Result<Option<Event>> {
        let sql = format!("SELECT {} FROM events WHERE id = ?1", EVENT_COLUMNS);
        let event = self.conn().query_row(&sql, [id], row_to_event).optional()?;
        Ok(event)
    }

    pub fn require_event(&self, id: i64) -> Result<Event> {
        self.get_event(id)?
            .ok_or_else(|| Error::NotFound(format!("Event not found: {}", id)))
    }

    pub fn find_event(&self, owner: &str, title: &str, date: &str) -> Result<Option<Event>> {
        let sql = format!(
            "SELECT {} FROM events WHERE owner = ?1 AND title = ?2 AND date = ?3",
            EVENT_COLUMNS
        );
        let event = self
            .conn()
            .query_row(&sql, params![owner, title, date], row_to_event)
            .optional()?;
        Ok(event)
    }

    /// An owner's events ordered by start, optionally bounded by date (inclusive).
    pub fn list_events(
        &self,
        owner: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<Event>> {
        let from = from.map(fmt_date);
        let to = to.map(fmt_date);
        self.query_events(
            "owner = ?1 AND (?2 IS NULL OR date >= ?2) AND (?3 IS NULL OR date <= ?3)",
            &[&owner, &from, &to],
        )
    }

    /// An owner's events on one calendar date.
    pub fn events_on(&self, owner: &str, date: NaiveDate) -> Result<Vec<Event>> {
        let date = fmt_date(date);
        self.query_events("owner = ?1 AND date = ?2", &[&owner, &date])
    }

    /// Events linked to a process.
    pub fn events_for_process(&self, process_id: i64) -> Result<Vec<Event>> {
        self.query_events("process_id = ?1", &[&process_id])
    }

    /// Events with no linked process, for one owner or all owners.
    pub fn events_without_process(&self, owner: Option<&str>) -> Result<Vec<Event>> {
        self.query_events(
            "process_id IS NULL AND (?1 IS NULL OR owner = ?1)",
            &[&owner],
        )
    }

    /// Processes linked from events that have no steps, as `(id, title)`.
    pub fn linked_processes_without_steps(&self, owner: Option<&str>) -> Result<Vec<(i64, String)>> {
        let mut stmt = self.conn().prepare(
            "SELECT DISTINCT p.id, p.title FROM processes p
             JOIN events e ON e.process_id = p.id
             WHERE NOT EXISTS (SELECT 1 FROM steps s WHERE s.process_id = p.id)
               AND (?1 IS NULL OR e.owner = ?1)
             ORDER BY p.id",
        )?;
        let rows = stmt
            .query_map([owner], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<(i64, String)>>>()?;
        Ok(rows)
    }

    /// Distinct owners that have events.
    pub fn event_owners(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT DISTINCT owner FROM events ORDER BY owner")?;
        let owners = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(owners)
    }

    /// Rewrite an event's mutable fields.
    pub fn update_event(&self, event: &Event) -> Result<()> {
        validate_event(event)?;
        let changed = self.conn().execute(
            "UPDATE events SET title = ?1, description = ?2, start_time = ?3, end_time = ?4,
             date = ?5, time = ?6, duration = ?7, status = ?8, complexity = ?9,
             process_id = ?10, metadata = ?11
             WHERE id = ?12",
            params![
                event.title,
                event.description,
                fmt_ts(event.start_time),
                fmt_ts(event.end_time),
                event.date,
                event.time,
                event.duration,
                event.status.as_str(),
                event.complexity.level(),
                event.process_id,
                serde_json::to_string(&event.metadata)?,
                event.id,
            ],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(format!("Event not found: {}", event.id)));
        }
        Ok(())
    }

    pub fn set_event_process(&self, id: i64, process_id: Option<i64>) -> Result<()> {
        self.conn().execute(
            "UPDATE events SET process_id = ?1 WHERE id = ?2",
            params![process_id, id],
        )?;
        Ok(())
    }

    pub fn set_event_metadata(&self, id: i64, metadata: &Metadata) -> Result<()> {
        self.conn().execute(
            "UPDATE events SET metadata = ?1 WHERE id = ?2",
            params![serde_json::to_string(metadata)?, id],
        )?;
        Ok(())
    }

    /// Set an event's status. Returns true if it changed.
    pub fn set_event_status(&self, id: i64, status: EventStatus) -> Result<bool> {
        let changed = self.conn().execute(
            "UPDATE events SET status = ?1 WHERE id = ?2 AND status != ?1",
            params![status.as_str(), id],
        )?;
        Ok(changed > 0)
    }

    /// Delete an event and drop it from every other event's related list.
    pub fn delete_event(&self, id: i64) -> Result<()> {
        let event = self.require_event(id)?;
        self.with_transaction(|s| {
            for other_id in event.related_events() {
                if let Some(mut other) = s.get_event(other_id)? {
                    let kept: Vec<i64> = other
                        .related_events()
                        .into_iter()
                        .filter(|&x| x != id)
                        .collect();
                    other
                        .metadata
                        .insert(RELATED_EVENTS_KEY.to_string(), serde_json::Value::from(kept));
                    s.set_event_metadata(other.id, &other.metadata)?;
                }
            }
            s.conn().execute("DELETE FROM events WHERE id = ?1", [id])?;
            Ok(())
        })
    }
}
