//! Storage layer for Stepwise data.
//!
//! A single SQLite database (`stepwise.db`) holds every owner's hierarchy:
//! directories, processes, steps, substeps and events, plus the account
//! content produced by workspace synthesis.
//!
//! ## Natural keys
//!
//! Idempotent find-or-create relies on unique indexes rather than
//! check-then-insert, so two writers racing on the same key converge:
//!
//! - users: `handle`, `email`
//! - directories: `(owner, name)`
//! - templates: `(owner, title)` where `is_template = 1`
//! - plain processes: `(owner, title)` where not a template and never forked
//!   (`forked_from` keeps provenance after a template is deleted, so detached
//!   instances stay outside this key)
//! - instances: `(owner, template_id)`
//! - events: `(owner, title, date)`
//!
//! Writers insert with `ON CONFLICT DO NOTHING` and then read the row back
//! by its natural key.
//!
//! ## Units of work
//!
//! [`Storage::with_transaction`] runs a closure inside a savepoint. Savepoints
//! nest, so a forked process (one unit) can be written inside a synthesis
//! phase (another unit) and each rolls back independently.

pub mod content;
pub mod events;
pub mod hierarchy;

use crate::models::Metadata;
use crate::{Error, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{Connection, params};
use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};

/// Database file name inside the data directory.
pub const DB_FILE: &str = "stepwise.db";

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "SW_DATA_DIR";

/// Storage manager backed by one SQLite connection.
pub struct Storage {
    root: PathBuf,
    conn: Connection,
    savepoint_depth: Cell<u32>,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage").field("root", &self.root).finish()
    }
}

impl Storage {
    /// Open existing storage in an explicit data directory.
    pub fn open_with_data_dir(data_dir: &Path) -> Result<Self> {
        let db_path = data_dir.join(DB_FILE);
        if !db_path.exists() {
            return Err(Error::NotInitialized);
        }
        Self::open_at(&db_path)
    }

    /// Initialize (or reopen) storage in an explicit data directory.
    pub fn init_with_data_dir(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir)?;
        Self::open_at(&data_dir.join(DB_FILE))
    }

    /// Open a database file directly, creating the schema if needed.
    pub fn open_at(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path)?;
        let root = db_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::from_connection(conn, root)
    }

    fn from_connection(conn: Connection, root: PathBuf) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Self::init_schema(&conn)?;
        Ok(Self {
            root,
            conn,
            savepoint_depth: Cell::new(0),
        })
    }

    /// Get the storage root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Initialize the SQLite schema.
    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                handle TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL UNIQUE,
                display_name TEXT NOT NULL,
                role_tag TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS topics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                description TEXT
            );

            CREATE TABLE IF NOT EXISTS directories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT,
                color TEXT,
                icon TEXT,
                parent_id INTEGER REFERENCES directories(id) ON DELETE SET NULL,
                is_template INTEGER NOT NULL DEFAULT 0,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (owner, name)
            );

            CREATE INDEX IF NOT EXISTS idx_directories_parent ON directories(parent_id);

            CREATE TABLE IF NOT EXISTS processes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                color TEXT,
                category TEXT,
                directory_id INTEGER REFERENCES directories(id) ON DELETE SET NULL,
                favorite INTEGER NOT NULL DEFAULT 0,
                is_template INTEGER NOT NULL DEFAULT 0,
                template_id INTEGER REFERENCES processes(id) ON DELETE SET NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                last_updated TEXT NOT NULL,
                CHECK (favorite = 0 OR is_template = 1),
                CHECK (is_template = 0 OR template_id IS NULL)
            );

            CREATE UNIQUE INDEX IF NOT EXISTS ux_processes_template_title
                ON processes(owner, title) WHERE is_template = 1;
            CREATE UNIQUE INDEX IF NOT EXISTS ux_processes_instance
                ON processes(owner, template_id) WHERE template_id IS NOT NULL;
            CREATE INDEX IF NOT EXISTS idx_processes_directory ON processes(directory_id);

            CREATE TABLE IF NOT EXISTS steps (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                process_id INTEGER NOT NULL REFERENCES processes(id) ON DELETE CASCADE,
                content TEXT NOT NULL,
                position INTEGER NOT NULL,
                due_date TEXT,
                completed INTEGER NOT NULL DEFAULT 0,
                completed_at TEXT,
                CHECK ((completed = 0 AND completed_at IS NULL)
                    OR (completed = 1 AND completed_at IS NOT NULL))
            );

            CREATE INDEX IF NOT EXISTS idx_steps_process ON steps(process_id, position);

            CREATE TABLE IF NOT EXISTS sub_steps (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                step_id INTEGER NOT NULL REFERENCES steps(id) ON DELETE CASCADE,
                content TEXT NOT NULL,
                position INTEGER NOT NULL,
                due_date TEXT,
                completed INTEGER NOT NULL DEFAULT 0,
                completed_at TEXT,
                CHECK ((completed = 0 AND completed_at IS NULL)
                    OR (completed = 1 AND completed_at IS NOT NULL))
            );

            CREATE INDEX IF NOT EXISTS idx_sub_steps_step ON sub_steps(step_id, position);

            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                start_time TEXT NOT NULL,
                end_time TEXT NOT NULL,
                date TEXT NOT NULL,
                time TEXT NOT NULL,
                duration TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                complexity INTEGER NOT NULL DEFAULT 3 CHECK (complexity BETWEEN 1 AND 5),
                process_id INTEGER REFERENCES processes(id) ON DELETE SET NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                CHECK (start_time < end_time),
                UNIQUE (owner, title, date)
            );

            CREATE INDEX IF NOT EXISTS idx_events_owner_date ON events(owner, date);
            CREATE INDEX IF NOT EXISTS idx_events_process ON events(process_id);

            CREATE TABLE IF NOT EXISTS posts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner TEXT NOT NULL,
                author TEXT NOT NULL,
                topic_id INTEGER REFERENCES topics(id) ON DELETE SET NULL,
                title TEXT NOT NULL,
                body TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                UNIQUE (owner, title)
            );

            CREATE TABLE IF NOT EXISTS preferences (
                owner TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (owner, key)
            );

            CREATE TABLE IF NOT EXISTS notifications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner TEXT NOT NULL,
                kind TEXT NOT NULL,
                subject TEXT NOT NULL,
                message TEXT NOT NULL,
                read INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                UNIQUE (owner, kind, subject)
            );

            CREATE TABLE IF NOT EXISTS cross_refs (
                owner TEXT NOT NULL,
                source_kind TEXT NOT NULL,
                source_id INTEGER NOT NULL,
                target_kind TEXT NOT NULL,
                target_id INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (owner, source_kind, source_id, target_kind, target_id)
            );

            CREATE TABLE IF NOT EXISTS insight_reports (
                owner TEXT NOT NULL,
                period TEXT NOT NULL,
                metrics TEXT NOT NULL,
                generated_at TEXT NOT NULL,
                PRIMARY KEY (owner, period)
            );

            -- Configuration table
            CREATE TABLE IF NOT EXISTS config (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;

        // Run migrations for schema changes
        Self::run_migrations(conn)?;

        Ok(())
    }

    /// Run database migrations for schema changes.
    /// This handles adding new columns to existing databases.
    fn run_migrations(conn: &Connection) -> Result<()> {
        // Migration: directories gained collection membership after the first release
        let has_collection: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM pragma_table_info('directories') WHERE name = 'collection'",
                [],
                |row| row.get(0),
            )
            .unwrap_or(false);

        if !has_collection {
            conn.execute("ALTER TABLE directories ADD COLUMN collection TEXT", [])?;
        }

        // Migration: instances remember their template after it is deleted, and
        // the plain-title key only covers processes that were never forked
        let has_forked_from: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM pragma_table_info('processes') WHERE name = 'forked_from'",
                [],
                |row| row.get(0),
            )
            .unwrap_or(false);

        if !has_forked_from {
            conn.execute_batch(
                "ALTER TABLE processes ADD COLUMN forked_from INTEGER;
                 UPDATE processes SET forked_from = template_id WHERE template_id IS NOT NULL;
                 DROP INDEX IF EXISTS ux_processes_plain_title;",
            )?;
        }
        conn.execute_batch(
            "CREATE UNIQUE INDEX IF NOT EXISTS ux_processes_standalone_title
                 ON processes(owner, title) WHERE is_template = 0 AND forked_from IS NULL;",
        )?;

        Ok(())
    }

    // === Units of work ===

    /// Run `f` inside a savepoint.
    ///
    /// Commits (releases) on `Ok`, rolls back to the savepoint on `Err`.
    /// Nested calls create nested savepoints; an inner rollback leaves the
    /// outer unit's earlier writes intact.
    pub fn with_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T>,
    {
        let depth = self.savepoint_depth.get();
        let name = format!("sw_unit_{}", depth);
        self.conn.execute_batch(&format!("SAVEPOINT {}", name))?;
        self.savepoint_depth.set(depth + 1);

        let result = f(self);
        self.savepoint_depth.set(depth);

        match result {
            Ok(value) => {
                self.conn.execute_batch(&format!("RELEASE {}", name))?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = self
                    .conn
                    .execute_batch(&format!("ROLLBACK TO {0}; RELEASE {0}", name))
                {
                    tracing::warn!(error = %rollback_err, savepoint = %name, "rollback failed");
                }
                Err(e)
            }
        }
    }

    // === Config Operations ===

    /// Get a configuration value.
    pub fn get_config(&self, key: &str) -> Result<Option<String>> {
        use rusqlite::OptionalExtension;
        let value = self
            .conn
            .query_row("SELECT value FROM config WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Set a configuration value.
    pub fn set_config(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO config (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}

/// Get the data directory: `SW_DATA_DIR` if set, else `<data dir>/stepwise`.
pub fn get_data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        if !dir.is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    let data_dir = dirs::data_dir()
        .ok_or_else(|| Error::Other("Could not determine data directory".to_string()))?;
    Ok(data_dir.join("stepwise"))
}

// === Column codecs ===

/// Canonical timestamp text. Fixed width, so stored values compare correctly
/// as strings (the `start_time < end_time` check relies on this).
pub fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub(crate) fn conversion_err<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

pub(crate) fn parse_ts(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, e))
}

pub(crate) fn parse_opt_ts(idx: usize, s: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    s.map(|s| parse_ts(idx, &s)).transpose()
}

pub(crate) fn parse_opt_date(idx: usize, s: Option<String>) -> rusqlite::Result<Option<NaiveDate>> {
    s.map(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").map_err(|e| conversion_err(idx, e)))
        .transpose()
}

pub(crate) fn parse_metadata(idx: usize, s: &str) -> rusqlite::Result<Metadata> {
    serde_json::from_str(s).map_err(|e| conversion_err(idx, e))
}

pub(crate) fn parse_enum<T: std::str::FromStr<Err = String>>(idx: usize, s: &str) -> rusqlite::Result<T> {
    s.parse::<T>()
        .map_err(|e| conversion_err(idx, std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
}
