//! Directory, process, step and substep persistence.

use super::{Storage, fmt_ts, parse_metadata, parse_opt_date, parse_opt_ts, parse_ts};
use crate::models::graph;
use crate::models::{Directory, Process, ProcessProgress, Step, StepTree, SubStep};
use crate::{Error, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{OptionalExtension, Row, ToSql, params};
use std::collections::HashMap;

const DIRECTORY_COLUMNS: &str = "id, owner, name, description, color, icon, parent_id, collection, \
     is_template, metadata, created_at, updated_at";

const PROCESS_COLUMNS: &str = "id, owner, title, description, color, category, directory_id, \
     favorite, is_template, template_id, metadata, created_at, last_updated";

const ITEM_COLUMNS: &str = "id, parent, content, position, due_date, completed, completed_at";

fn row_to_directory(row: &Row) -> rusqlite::Result<Directory> {
    let metadata: String = row.get(9)?;
    let created_at: String = row.get(10)?;
    let updated_at: String = row.get(11)?;
    Ok(Directory {
        id: row.get(0)?,
        owner: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        color: row.get(4)?,
        icon: row.get(5)?,
        parent_id: row.get(6)?,
        collection: row.get(7)?,
        is_template: row.get(8)?,
        metadata: parse_metadata(9, &metadata)?,
        created_at: parse_ts(10, &created_at)?,
        updated_at: parse_ts(11, &updated_at)?,
    })
}

fn row_to_process(row: &Row) -> rusqlite::Result<Process> {
    let metadata: String = row.get(10)?;
    let created_at: String = row.get(11)?;
    let last_updated: String = row.get(12)?;
    Ok(Process {
        id: row.get(0)?,
        owner: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        color: row.get(4)?,
        category: row.get(5)?,
        directory_id: row.get(6)?,
        favorite: row.get(7)?,
        is_template: row.get(8)?,
        template_id: row.get(9)?,
        metadata: parse_metadata(10, &metadata)?,
        created_at: parse_ts(11, &created_at)?,
        last_updated: parse_ts(12, &last_updated)?,
    })
}

fn row_to_step(row: &Row) -> rusqlite::Result<Step> {
    Ok(Step {
        id: row.get(0)?,
        process_id: row.get(1)?,
        content: row.get(2)?,
        position: row.get(3)?,
        due_date: parse_opt_date(4, row.get(4)?)?,
        completed: row.get(5)?,
        completed_at: parse_opt_ts(6, row.get(6)?)?,
    })
}

fn row_to_sub_step(row: &Row) -> rusqlite::Result<SubStep> {
    Ok(SubStep {
        id: row.get(0)?,
        step_id: row.get(1)?,
        content: row.get(2)?,
        position: row.get(3)?,
        due_date: parse_opt_date(4, row.get(4)?)?,
        completed: row.get(5)?,
        completed_at: parse_opt_ts(6, row.get(6)?)?,
    })
}

fn fmt_date(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format("%Y-%m-%d").to_string())
}

/// Ordered child tables: steps under processes, substeps under steps.
#[derive(Debug, Clone, Copy)]
enum ItemTable {
    Steps,
    SubSteps,
}

impl ItemTable {
    fn table(self) -> &'static str {
        match self {
            ItemTable::Steps => "steps",
            ItemTable::SubSteps => "sub_steps",
        }
    }

    fn parent_column(self) -> &'static str {
        match self {
            ItemTable::Steps => "process_id",
            ItemTable::SubSteps => "step_id",
        }
    }

    fn select(self) -> String {
        ITEM_COLUMNS
            .replace("parent", self.parent_column())
            .to_string()
    }
}

impl Storage {
    // === Directory Operations ===

    fn check_directory_parent(&self, owner: &str, parent_id: Option<i64>) -> Result<()> {
        if let Some(parent_id) = parent_id {
            let parent = self
                .get_directory(parent_id)?
                .ok_or_else(|| Error::NotFound(format!("Directory not found: {}", parent_id)))?;
            if parent.owner != owner {
                return Err(Error::InvalidInput(format!(
                    "Directory {} belongs to another owner",
                    parent_id
                )));
            }
        }
        Ok(())
    }

    fn write_directory(&self, dir: &Directory, on_conflict: &str) -> Result<usize> {
        if dir.name.trim().is_empty() {
            return Err(Error::InvalidInput("Directory name cannot be empty".to_string()));
        }
        self.check_directory_parent(&dir.owner, dir.parent_id)?;
        let sql = format!(
            "INSERT INTO directories
             (owner, name, description, color, icon, parent_id, collection, is_template,
              metadata, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11) {}",
            on_conflict
        );
        let changed = self.conn().execute(
            &sql,
            params![
                dir.owner,
                dir.name,
                dir.description,
                dir.color,
                dir.icon,
                dir.parent_id,
                dir.collection,
                dir.is_template,
                serde_json::to_string(&dir.metadata)?,
                fmt_ts(dir.created_at),
                fmt_ts(dir.updated_at),
            ],
        )?;
        Ok(changed)
    }

    /// Insert a directory, failing if `(owner, name)` is taken.
    pub fn insert_directory(&self, dir: &Directory) -> Result<i64> {
        self.write_directory(dir, "")?;
        Ok(self.conn().last_insert_rowid())
    }

    /// Find a directory by `(owner, name)` or create it.
    ///
    /// Returns the stored directory and whether it was created.
    pub fn find_or_create_directory(&self, dir: &Directory) -> Result<(Directory, bool)> {
        let created = self.write_directory(dir, "ON CONFLICT DO NOTHING")? > 0;
        let stored = self
            .find_directory_by_name(&dir.owner, &dir.name)?
            .ok_or_else(|| Error::NotFound(format!("Directory not found: {}", dir.name)))?;
        if created {
            tracing::debug!(id = stored.id, name = %stored.name, "created directory");
        }
        Ok((stored, created))
    }

    pub fn get_directory(&self, id: i64) -> Result<Option<Directory>> {
        let sql = format!("SELECT {} FROM directories WHERE id = ?1", DIRECTORY_COLUMNS);
        let dir = self
            .conn()
            .query_row(&sql, [id], row_to_directory)
            .optional()?;
        Ok(dir)
    }

    pub fn find_directory_by_name(&self, owner: &str, name: &str) -> Result<Option<Directory>> {
        let sql = format!(
            "SELECT {} FROM directories WHERE owner = ?1 AND name = ?2",
            DIRECTORY_COLUMNS
        );
        let dir = self
            .conn()
            .query_row(&sql, params![owner, name], row_to_directory)
            .optional()?;
        Ok(dir)
    }

    /// List an owner's directories ordered by name.
    pub fn list_directories(&self, owner: &str) -> Result<Vec<Directory>> {
        let sql = format!(
            "SELECT {} FROM directories WHERE owner = ?1 ORDER BY name, id",
            DIRECTORY_COLUMNS
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let dirs = stmt
            .query_map([owner], row_to_directory)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(dirs)
    }

    /// Parent map of an owner's directory tree.
    pub fn directory_parents(&self, owner: &str) -> Result<HashMap<i64, Option<i64>>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT id, parent_id FROM directories WHERE owner = ?1")?;
        let parents = stmt
            .query_map([owner], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<HashMap<i64, Option<i64>>>>()?;
        Ok(parents)
    }

    /// Reparent a directory. Moving into itself or a descendant is rejected.
    pub fn move_directory(&self, id: i64, new_parent: Option<i64>) -> Result<()> {
        let dir = self
            .get_directory(id)?
            .ok_or_else(|| Error::NotFound(format!("Directory not found: {}", id)))?;

        if let Some(parent_id) = new_parent {
            self.check_directory_parent(&dir.owner, Some(parent_id))?;
            let parents = self.directory_parents(&dir.owner)?;
            if graph::would_create_cycle(&parents, id, parent_id) {
                return Err(Error::CycleDetected);
            }
        }

        self.conn().execute(
            "UPDATE directories SET parent_id = ?1, updated_at = ?2 WHERE id = ?3",
            params![new_parent, fmt_ts(Utc::now()), id],
        )?;
        Ok(())
    }

    /// Delete a directory without deleting its content.
    ///
    /// Processes move to the deleted directory's parent and direct
    /// subdirectories become top-level.
    pub fn delete_directory(&self, id: i64) -> Result<()> {
        let dir = self
            .get_directory(id)?
            .ok_or_else(|| Error::NotFound(format!("Directory not found: {}", id)))?;

        self.with_transaction(|s| {
            s.conn().execute(
                "UPDATE processes SET directory_id = ?1 WHERE directory_id = ?2",
                params![dir.parent_id, id],
            )?;
            s.conn().execute(
                "UPDATE directories SET parent_id = NULL WHERE parent_id = ?1",
                [id],
            )?;
            s.conn().execute("DELETE FROM directories WHERE id = ?1", [id])?;
            Ok(())
        })
    }

    // === Process Operations ===

    fn validate_process(&self, process: &Process) -> Result<()> {
        if process.title.trim().is_empty() {
            return Err(Error::InvalidInput("Process title cannot be empty".to_string()));
        }
        if process.is_template && process.template_id.is_some() {
            return Err(Error::InvalidInput(
                "A template cannot itself be forked from a template".to_string(),
            ));
        }
        if let Some(directory_id) = process.directory_id {
            let dir = self.get_directory(directory_id)?.ok_or_else(|| {
                Error::NotFound(format!("Directory not found: {}", directory_id))
            })?;
            if dir.owner != process.owner {
                return Err(Error::InvalidInput(format!(
                    "Directory {} belongs to another owner",
                    directory_id
                )));
            }
        }
        Ok(())
    }

    fn write_process(&self, process: &Process, on_conflict: &str) -> Result<usize> {
        self.validate_process(process)?;
        if process.favorite && !process.is_template {
            tracing::debug!(title = %process.title, "ignoring favorite flag on non-template");
        }
        let sql = format!(
            "INSERT INTO processes
             (owner, title, description, color, category, directory_id, favorite, is_template,
              template_id, forked_from, metadata, created_at, last_updated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9, ?10, ?11, ?12) {}",
            on_conflict
        );
        let changed = self.conn().execute(
            &sql,
            params![
                process.owner,
                process.title,
                process.description,
                process.color,
                process.category,
                process.directory_id,
                process.favorite && process.is_template,
                process.is_template,
                process.template_id,
                serde_json::to_string(&process.metadata)?,
                fmt_ts(process.created_at),
                fmt_ts(process.last_updated),
            ],
        )?;
        Ok(changed)
    }

    /// Insert a process, failing if its natural key is taken.
    pub fn insert_process(&self, process: &Process) -> Result<i64> {
        self.write_process(process, "")?;
        Ok(self.conn().last_insert_rowid())
    }

    /// Find a process by its natural key or create it.
    ///
    /// Templates are keyed by `(owner, title)`, instances by
    /// `(owner, template_id)`, plain processes by `(owner, title)`.
    pub fn find_or_create_process(&self, process: &Process) -> Result<(Process, bool)> {
        let created = self.write_process(process, "ON CONFLICT DO NOTHING")? > 0;
        let stored = self
            .find_process_by_key(process)?
            .ok_or_else(|| Error::NotFound(format!("Process not found: {}", process.title)))?;
        if created {
            tracing::debug!(id = stored.id, title = %stored.title, "created process");
        }
        Ok((stored, created))
    }

    /// Look up the stored process sharing `process`'s natural key.
    pub fn find_process_by_key(&self, process: &Process) -> Result<Option<Process>> {
        if process.is_template {
            self.find_template(&process.owner, &process.title)
        } else if let Some(template_id) = process.template_id {
            self.find_instance(template_id, &process.owner)
        } else {
            self.find_plain_process(&process.owner, &process.title)
        }
    }

    fn query_process(&self, where_clause: &str, args: &[&dyn ToSql]) -> Result<Option<Process>> {
        let sql = format!("SELECT {} FROM processes WHERE {}", PROCESS_COLUMNS, where_clause);
        let process = self
            .conn()
            .query_row(&sql, args, row_to_process)
            .optional()?;
        Ok(process)
    }

    pub fn get_process(&self, id: i64) -> Result<Option<Process>> {
        self.query_process("id = ?1", &[&id])
    }

    /// Get a process or fail with `NotFound`.
    pub fn require_process(&self, id: i64) -> Result<Process> {
        self.get_process(id)?
            .ok_or_else(|| Error::NotFound(format!("Process not found: {}", id)))
    }

    pub fn find_template(&self, owner: &str, title: &str) -> Result<Option<Process>> {
        self.query_process("owner = ?1 AND title = ?2 AND is_template = 1", &[&owner, &title])
    }

    pub fn find_plain_process(&self, owner: &str, title: &str) -> Result<Option<Process>> {
        self.query_process(
            "owner = ?1 AND title = ?2 AND is_template = 0 AND forked_from IS NULL",
            &[&owner, &title],
        )
    }

    /// The owner's instance of a template, if one was forked.
    pub fn find_instance(&self, template_id: i64, owner: &str) -> Result<Option<Process>> {
        self.query_process("owner = ?1 AND template_id = ?2", &[&owner, &template_id])
    }

    /// List processes with optional owner and template filters.
    pub fn list_processes(
        &self,
        owner: Option<&str>,
        is_template: Option<bool>,
    ) -> Result<Vec<Process>> {
        let mut sql = format!("SELECT {} FROM processes WHERE 1=1", PROCESS_COLUMNS);
        let mut params_vec: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(owner) = owner {
            sql.push_str(" AND owner = ?");
            params_vec.push(Box::new(owner.to_string()));
        }
        if let Some(is_template) = is_template {
            sql.push_str(" AND is_template = ?");
            params_vec.push(Box::new(is_template));
        }
        sql.push_str(" ORDER BY id");

        let mut stmt = self.conn().prepare(&sql)?;
        let params_refs: Vec<&dyn ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
        let processes = stmt
            .query_map(params_refs.as_slice(), row_to_process)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(processes)
    }

    /// Instances forked from a template.
    pub fn list_instances(&self, template_id: i64) -> Result<Vec<Process>> {
        let sql = format!(
            "SELECT {} FROM processes WHERE template_id = ?1 ORDER BY id",
            PROCESS_COLUMNS
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let processes = stmt
            .query_map([template_id], row_to_process)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(processes)
    }

    /// Update a process's editable fields.
    ///
    /// Template-ness and provenance are fixed at creation. A favorite flag on
    /// a non-template is dropped.
    pub fn update_process(&self, process: &Process) -> Result<()> {
        let existing = self.require_process(process.id)?;
        let mut process = process.clone();
        process.is_template = existing.is_template;
        process.template_id = existing.template_id;
        self.validate_process(&process)?;

        self.conn().execute(
            "UPDATE processes SET title = ?1, description = ?2, color = ?3, category = ?4,
             directory_id = ?5, favorite = ?6, metadata = ?7, last_updated = ?8
             WHERE id = ?9",
            params![
                process.title,
                process.description,
                process.color,
                process.category,
                process.directory_id,
                process.favorite && process.is_template,
                serde_json::to_string(&process.metadata)?,
                fmt_ts(Utc::now()),
                process.id,
            ],
        )?;
        Ok(())
    }

    /// Toggle the favorite flag. Only templates may be favorited.
    pub fn set_favorite(&self, id: i64, favorite: bool) -> Result<()> {
        let process = self.require_process(id)?;
        if favorite && !process.is_template {
            return Err(Error::InvalidInput(format!(
                "Only templates can be favorited (process {} is not a template)",
                id
            )));
        }
        self.conn().execute(
            "UPDATE processes SET favorite = ?1, last_updated = ?2 WHERE id = ?3",
            params![favorite, fmt_ts(Utc::now()), id],
        )?;
        Ok(())
    }

    /// Move a process into a directory (or out of all directories).
    pub fn move_process(&self, id: i64, directory_id: Option<i64>) -> Result<()> {
        let mut process = self.require_process(id)?;
        process.directory_id = directory_id;
        self.update_process(&process)
    }

    /// Delete a process with its steps and substeps.
    ///
    /// Instances of a deleted template become standalone; linked events lose
    /// their process link.
    pub fn delete_process(&self, id: i64) -> Result<()> {
        self.require_process(id)?;
        self.with_transaction(|s| {
            s.conn().execute(
                "UPDATE processes SET template_id = NULL WHERE template_id = ?1",
                [id],
            )?;
            s.conn()
                .execute("UPDATE events SET process_id = NULL WHERE process_id = ?1", [id])?;
            s.conn().execute("DELETE FROM processes WHERE id = ?1", [id])?;
            Ok(())
        })
    }

    fn touch_process(&self, process_id: i64) -> Result<()> {
        self.conn().execute(
            "UPDATE processes SET last_updated = ?1 WHERE id = ?2",
            params![fmt_ts(Utc::now()), process_id],
        )?;
        Ok(())
    }

    fn touch_process_of_step(&self, step_id: i64) -> Result<()> {
        self.conn().execute(
            "UPDATE processes SET last_updated = ?1
             WHERE id = (SELECT process_id FROM steps WHERE id = ?2)",
            params![fmt_ts(Utc::now()), step_id],
        )?;
        Ok(())
    }

    /// Completed and total step counts for a process.
    pub fn process_progress(&self, process_id: i64) -> Result<ProcessProgress> {
        let (total, completed): (i64, i64) = self.conn().query_row(
            "SELECT COUNT(*), COALESCE(SUM(completed), 0) FROM steps WHERE process_id = ?1",
            [process_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(ProcessProgress::new(total as usize, completed as usize))
    }

    // === Ordered items (steps and substeps) ===

    fn next_position(&self, table: ItemTable, parent_id: i64) -> Result<u32> {
        let sql = format!(
            "SELECT COALESCE(MAX(position), 0) + 1 FROM {} WHERE {} = ?1",
            table.table(),
            table.parent_column()
        );
        let position: u32 = self.conn().query_row(&sql, [parent_id], |row| row.get(0))?;
        Ok(position)
    }

    fn ordered_ids(&self, table: ItemTable, parent_id: i64) -> Result<Vec<i64>> {
        let sql = format!(
            "SELECT id FROM {} WHERE {} = ?1 ORDER BY position, id",
            table.table(),
            table.parent_column()
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let ids = stmt
            .query_map([parent_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }

    /// Rewrite positions as `1..=n` in the given order.
    fn write_positions(&self, table: ItemTable, ids: &[i64]) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET position = ?1 WHERE id = ?2 AND position != ?1",
            table.table()
        );
        for (idx, id) in ids.iter().enumerate() {
            self.conn().execute(&sql, params![idx as u32 + 1, id])?;
        }
        Ok(())
    }

    fn move_item(&self, table: ItemTable, parent_id: i64, id: i64, position: u32) -> Result<()> {
        let mut ids = self.ordered_ids(table, parent_id)?;
        let Some(current) = ids.iter().position(|&x| x == id) else {
            return Err(Error::NotFound(format!("Item not found: {}", id)));
        };
        ids.remove(current);
        let target = (position.max(1) as usize - 1).min(ids.len());
        ids.insert(target, id);
        self.write_positions(table, &ids)
    }

    fn delete_item(&self, table: ItemTable, parent_id: i64, id: i64) -> Result<()> {
        self.with_transaction(|s| {
            let sql = format!("DELETE FROM {} WHERE id = ?1", table.table());
            s.conn().execute(&sql, [id])?;
            let ids = s.ordered_ids(table, parent_id)?;
            s.write_positions(table, &ids)
        })
    }

    // === Step Operations ===

    /// Append a step to a process.
    pub fn add_step(
        &self,
        process_id: i64,
        content: &str,
        due_date: Option<NaiveDate>,
    ) -> Result<Step> {
        self.require_process(process_id)?;
        if content.trim().is_empty() {
            return Err(Error::InvalidInput("Step content cannot be empty".to_string()));
        }
        let position = self.next_position(ItemTable::Steps, process_id)?;
        self.conn().execute(
            "INSERT INTO steps (process_id, content, position, due_date) VALUES (?1, ?2, ?3, ?4)",
            params![process_id, content, position, fmt_date(due_date)],
        )?;
        let id = self.conn().last_insert_rowid();
        self.touch_process(process_id)?;
        self.require_step(id)
    }

    /// Insert a fully specified step, keeping its position.
    pub fn insert_step(&self, step: &Step) -> Result<i64> {
        self.conn().execute(
            "INSERT INTO steps (process_id, content, position, due_date, completed, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                step.process_id,
                step.content,
                step.position,
                fmt_date(step.due_date),
                step.completed,
                step.completed_at.map(fmt_ts),
            ],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    pub fn get_step(&self, id: i64) -> Result<Option<Step>> {
        let sql = format!("SELECT {} FROM steps WHERE id = ?1", ItemTable::Steps.select());
        let step = self.conn().query_row(&sql, [id], row_to_step).optional()?;
        Ok(step)
    }

    pub fn require_step(&self, id: i64) -> Result<Step> {
        self.get_step(id)?
            .ok_or_else(|| Error::NotFound(format!("Step not found: {}", id)))
    }

    /// Steps of a process in position order.
    pub fn list_steps(&self, process_id: i64) -> Result<Vec<Step>> {
        let sql = format!(
            "SELECT {} FROM steps WHERE process_id = ?1 ORDER BY position, id",
            ItemTable::Steps.select()
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let steps = stmt
            .query_map([process_id], row_to_step)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(steps)
    }

    pub fn count_steps(&self, process_id: i64) -> Result<usize> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM steps WHERE process_id = ?1",
            [process_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Steps of a process with their substeps.
    pub fn step_tree(&self, process_id: i64) -> Result<Vec<StepTree>> {
        self.list_steps(process_id)?
            .into_iter()
            .map(|step| {
                let sub_steps = self.list_sub_steps(step.id)?;
                Ok(StepTree { step, sub_steps })
            })
            .collect()
    }

    /// Set a step's completion state. `completed_at` is `Some` to complete,
    /// `None` to clear. Returns the number of rows that changed.
    pub fn set_step_completion(&self, id: i64, completed_at: Option<DateTime<Utc>>) -> Result<usize> {
        let changed = self.conn().execute(
            "UPDATE steps SET completed = ?1, completed_at = ?2 WHERE id = ?3 AND completed != ?1",
            params![completed_at.is_some(), completed_at.map(fmt_ts), id],
        )?;
        if changed > 0 {
            self.touch_process_of_step(id)?;
        }
        Ok(changed)
    }

    /// Move a step to a 1-based position, clamped into range.
    pub fn move_step(&self, id: i64, position: u32) -> Result<()> {
        let step = self.require_step(id)?;
        self.with_transaction(|s| s.move_item(ItemTable::Steps, step.process_id, id, position))?;
        self.touch_process(step.process_id)
    }

    /// Close any gaps in a process's step positions.
    pub fn renumber_steps(&self, process_id: i64) -> Result<()> {
        let ids = self.ordered_ids(ItemTable::Steps, process_id)?;
        self.write_positions(ItemTable::Steps, &ids)
    }

    /// Delete a step with its substeps and close the position gap.
    pub fn delete_step(&self, id: i64) -> Result<()> {
        let step = self.require_step(id)?;
        self.delete_item(ItemTable::Steps, step.process_id, id)?;
        self.touch_process(step.process_id)
    }

    // === SubStep Operations ===

    /// Append a substep to a step.
    ///
    /// The new substep is open, so a completed step is reopened with it.
    pub fn add_sub_step(
        &self,
        step_id: i64,
        content: &str,
        due_date: Option<NaiveDate>,
    ) -> Result<SubStep> {
        let step = self.require_step(step_id)?;
        if content.trim().is_empty() {
            return Err(Error::InvalidInput("Substep content cannot be empty".to_string()));
        }
        let id = self.with_transaction(|s| {
            let position = s.next_position(ItemTable::SubSteps, step_id)?;
            s.conn().execute(
                "INSERT INTO sub_steps (step_id, content, position, due_date) VALUES (?1, ?2, ?3, ?4)",
                params![step_id, content, position, fmt_date(due_date)],
            )?;
            let id = s.conn().last_insert_rowid();
            if step.completed {
                tracing::debug!(step_id, "reopening completed step for new substep");
                s.set_step_completion(step_id, None)?;
            }
            s.touch_process_of_step(step_id)?;
            Ok(id)
        })?;
        self.require_sub_step(id)
    }

    /// Insert a fully specified substep, keeping its position.
    pub fn insert_sub_step(&self, sub_step: &SubStep) -> Result<i64> {
        self.conn().execute(
            "INSERT INTO sub_steps (step_id, content, position, due_date, completed, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                sub_step.step_id,
                sub_step.content,
                sub_step.position,
                fmt_date(sub_step.due_date),
                sub_step.completed,
                sub_step.completed_at.map(fmt_ts),
            ],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    pub fn get_sub_step(&self, id: i64) -> Result<Option<SubStep>> {
        let sql = format!(
            "SELECT {} FROM sub_steps WHERE id = ?1",
            ItemTable::SubSteps.select()
        );
        let sub_step = self
            .conn()
            .query_row(&sql, [id], row_to_sub_step)
            .optional()?;
        Ok(sub_step)
    }

    pub fn require_sub_step(&self, id: i64) -> Result<SubStep> {
        self.get_sub_step(id)?
            .ok_or_else(|| Error::NotFound(format!("Substep not found: {}", id)))
    }

    pub fn list_sub_steps(&self, step_id: i64) -> Result<Vec<SubStep>> {
        let sql = format!(
            "SELECT {} FROM sub_steps WHERE step_id = ?1 ORDER BY position, id",
            ItemTable::SubSteps.select()
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let sub_steps = stmt
            .query_map([step_id], row_to_sub_step)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(sub_steps)
    }

    /// Set one substep's completion state. Returns the rows changed.
    pub fn set_sub_step_completion(
        &self,
        id: i64,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<usize> {
        let sub_step = self.require_sub_step(id)?;
        let changed = self.conn().execute(
            "UPDATE sub_steps SET completed = ?1, completed_at = ?2
             WHERE id = ?3 AND completed != ?1",
            params![completed_at.is_some(), completed_at.map(fmt_ts), id],
        )?;
        if changed > 0 {
            self.touch_process_of_step(sub_step.step_id)?;
        }
        Ok(changed)
    }

    /// Complete every open substep of a step. Returns the rows changed.
    pub fn complete_open_sub_steps(&self, step_id: i64, at: DateTime<Utc>) -> Result<usize> {
        let changed = self.conn().execute(
            "UPDATE sub_steps SET completed = 1, completed_at = ?1
             WHERE step_id = ?2 AND completed = 0",
            params![fmt_ts(at), step_id],
        )?;
        if changed > 0 {
            self.touch_process_of_step(step_id)?;
        }
        Ok(changed)
    }

    /// Clear completion on every substep of a step. Returns the rows changed.
    pub fn clear_sub_steps(&self, step_id: i64) -> Result<usize> {
        let changed = self.conn().execute(
            "UPDATE sub_steps SET completed = 0, completed_at = NULL
             WHERE step_id = ?1 AND completed = 1",
            [step_id],
        )?;
        if changed > 0 {
            self.touch_process_of_step(step_id)?;
        }
        Ok(changed)
    }

    pub fn move_sub_step(&self, id: i64, position: u32) -> Result<()> {
        let sub_step = self.require_sub_step(id)?;
        self.with_transaction(|s| {
            s.move_item(ItemTable::SubSteps, sub_step.step_id, id, position)
        })?;
        self.touch_process_of_step(sub_step.step_id)
    }

    pub fn delete_sub_step(&self, id: i64) -> Result<()> {
        let sub_step = self.require_sub_step(id)?;
        self.delete_item(ItemTable::SubSteps, sub_step.step_id, id)?;
        self.touch_process_of_step(sub_step.step_id)
    }

    /// Ids of completed steps that still have an open substep.
    pub fn steps_with_open_sub_steps(&self, process_id: Option<i64>) -> Result<Vec<i64>> {
        let mut sql = "SELECT DISTINCT s.id FROM steps s
             JOIN sub_steps ss ON ss.step_id = s.id
             WHERE s.completed = 1 AND ss.completed = 0"
            .to_string();
        let mut params_vec: Vec<Box<dyn ToSql>> = Vec::new();
        if let Some(process_id) = process_id {
            sql.push_str(" AND s.process_id = ?");
            params_vec.push(Box::new(process_id));
        }
        sql.push_str(" ORDER BY s.id");

        let mut stmt = self.conn().prepare(&sql)?;
        let params_refs: Vec<&dyn ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
        let ids = stmt
            .query_map(params_refs.as_slice(), |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }
}
