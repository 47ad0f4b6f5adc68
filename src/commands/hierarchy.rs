//! Directory, process, step and substep commands, plus forking and reconcile.

use super::{Ack, Context, Output, check};
use crate::cascade::{self, CascadeOptions, CascadeResult};
use crate::forking;
use crate::models::{Directory, Process, ProcessProgress, Step, StepTree, SubStep};
use crate::{Error, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;

// === Directories ===

#[derive(Serialize)]
pub struct DirectoryResult {
    pub created: bool,
    #[serde(flatten)]
    pub directory: Directory,
}

impl Output for DirectoryResult {
    fn to_human(&self) -> String {
        let verb = if self.created { "Created" } else { "Found existing" };
        format!("{} directory {} \"{}\"", verb, self.directory.id, self.directory.name)
    }
}

/// Options for `sw dir create`.
#[derive(Debug, Default)]
pub struct NewDirectory {
    pub name: String,
    pub owner: String,
    pub parent: Option<i64>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
}

/// Create a directory, or return the owner's directory of the same name.
pub fn dir_create(ctx: &Context, new: NewDirectory) -> Result<DirectoryResult> {
    let mut dir = Directory::new(new.owner, new.name);
    dir.parent_id = new.parent;
    dir.description = new.description;
    dir.color = new.color;
    dir.icon = new.icon;

    let (directory, created) = ctx.storage.find_or_create_directory(&dir)?;
    Ok(DirectoryResult { created, directory })
}

#[derive(Serialize)]
pub struct DirectoryList {
    pub directories: Vec<Directory>,
}

impl Output for DirectoryList {
    fn to_human(&self) -> String {
        if self.directories.is_empty() {
            return "No directories.".to_string();
        }
        // Children are printed under their parent, depth-first.
        let mut children: HashMap<Option<i64>, Vec<&Directory>> = HashMap::new();
        for dir in &self.directories {
            children.entry(dir.parent_id).or_default().push(dir);
        }
        let mut lines = Vec::new();
        let mut stack: Vec<(&Directory, usize)> = children
            .get(&None)
            .map(|roots| roots.iter().rev().map(|d| (*d, 0)).collect())
            .unwrap_or_default();
        while let Some((dir, depth)) = stack.pop() {
            lines.push(format!("{}[{}] {}", "  ".repeat(depth), dir.id, dir.name));
            if let Some(kids) = children.get(&Some(dir.id)) {
                stack.extend(kids.iter().rev().map(|d| (*d, depth + 1)));
            }
        }
        lines.join("\n")
    }
}

pub fn dir_list(ctx: &Context, owner: &str) -> Result<DirectoryList> {
    Ok(DirectoryList {
        directories: ctx.storage.list_directories(owner)?,
    })
}

pub fn dir_move(ctx: &Context, id: i64, parent: Option<i64>) -> Result<Ack> {
    ctx.storage.move_directory(id, parent)?;
    Ok(Ack::new("moved", "directory", id))
}

/// Delete a directory; its processes and subdirectories are kept.
pub fn dir_delete(ctx: &Context, id: i64) -> Result<Ack> {
    ctx.storage.delete_directory(id)?;
    Ok(Ack::new("deleted", "directory", id))
}

// === Processes ===

/// Options for `sw process create`.
#[derive(Debug, Default)]
pub struct NewProcess {
    pub title: String,
    pub owner: String,
    pub template: bool,
    pub directory_id: Option<i64>,
    pub description: Option<String>,
    pub category: Option<String>,
}

#[derive(Serialize)]
pub struct ProcessCreated {
    pub created: bool,
    #[serde(flatten)]
    pub process: Process,
}

impl Output for ProcessCreated {
    fn to_human(&self) -> String {
        let kind = if self.process.is_template { "template" } else { "process" };
        let verb = if self.created { "Created" } else { "Found existing" };
        format!("{} {} {} \"{}\"", verb, kind, self.process.id, self.process.title)
    }
}

/// Create a template or plain process. An existing one with the same title
/// for the same owner is returned instead.
pub fn process_create(ctx: &Context, new: NewProcess) -> Result<ProcessCreated> {
    let mut process = if new.template {
        Process::template(new.owner, new.title)
    } else {
        Process::new(new.owner, new.title)
    };
    process.directory_id = new.directory_id;
    process.description = new.description;
    process.category = new.category;

    let (process, created) = ctx.storage.find_or_create_process(&process)?;
    Ok(ProcessCreated { created, process })
}

#[derive(Serialize)]
pub struct ProcessDetail {
    #[serde(flatten)]
    pub process: Process,
    pub steps: Vec<StepTree>,
    pub progress: ProcessProgress,
    /// Ids of processes forked from this template
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub instances: Vec<i64>,
}

impl Output for ProcessDetail {
    fn to_human(&self) -> String {
        let p = &self.process;
        let mut lines = Vec::new();
        let kind = if p.is_template {
            "template".to_string()
        } else if let Some(template_id) = p.template_id {
            format!("instance of {}", template_id)
        } else {
            "process".to_string()
        };
        let star = if p.favorite { " *" } else { "" };
        lines.push(format!("[{}] {}{} ({}, owner {})", p.id, p.title, star, kind, p.owner));
        if let Some(ref description) = p.description {
            lines.push(format!("  {}", description));
        }
        lines.push(format!(
            "  {}/{} steps complete ({:.0}%)",
            self.progress.completed, self.progress.total, self.progress.percentage
        ));
        if !self.instances.is_empty() {
            let ids: Vec<String> = self.instances.iter().map(|id| id.to_string()).collect();
            lines.push(format!("  forked as {}", ids.join(", ")));
        }
        for tree in &self.steps {
            let step = &tree.step;
            let due = step
                .due_date
                .map(|d| format!(" (due {})", d))
                .unwrap_or_default();
            lines.push(format!(
                "  {} {}. {}{} [{}]",
                check(step.completed),
                step.position,
                step.content,
                due,
                step.id
            ));
            for sub in &tree.sub_steps {
                lines.push(format!(
                    "      {} {}. {} [{}]",
                    check(sub.completed),
                    sub.position,
                    sub.content,
                    sub.id
                ));
            }
        }
        lines.join("\n")
    }
}

pub fn process_show(ctx: &Context, id: i64) -> Result<ProcessDetail> {
    let process = ctx.storage.require_process(id)?;
    let instances = if process.is_template {
        ctx.storage.list_instances(id)?.into_iter().map(|p| p.id).collect()
    } else {
        Vec::new()
    };
    Ok(ProcessDetail {
        steps: ctx.storage.step_tree(id)?,
        progress: ctx.storage.process_progress(id)?,
        instances,
        process,
    })
}

#[derive(Serialize)]
pub struct ProcessSummary {
    #[serde(flatten)]
    pub process: Process,
    pub progress: ProcessProgress,
}

#[derive(Serialize)]
pub struct ProcessList {
    pub processes: Vec<ProcessSummary>,
}

impl Output for ProcessList {
    fn to_human(&self) -> String {
        if self.processes.is_empty() {
            return "No processes.".to_string();
        }
        self.processes
            .iter()
            .map(|s| {
                let p = &s.process;
                let tag = if p.is_template { "T" } else if p.is_instance() { "I" } else { " " };
                format!(
                    "{} [{}] {} ({}) {}/{}",
                    tag, p.id, p.title, p.owner, s.progress.completed, s.progress.total
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub fn process_list(ctx: &Context, owner: Option<&str>, is_template: Option<bool>) -> Result<ProcessList> {
    let processes = ctx
        .storage
        .list_processes(owner, is_template)?
        .into_iter()
        .map(|process| {
            let progress = ctx.storage.process_progress(process.id)?;
            Ok(ProcessSummary { process, progress })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(ProcessList { processes })
}

pub fn process_move(ctx: &Context, id: i64, directory_id: Option<i64>) -> Result<Ack> {
    ctx.storage.move_process(id, directory_id)?;
    Ok(Ack::new("moved", "process", id))
}

/// Set or clear a template's favorite flag.
pub fn process_favorite(ctx: &Context, id: i64, favorite: bool) -> Result<Ack> {
    ctx.storage.set_favorite(id, favorite)?;
    let action = if favorite { "favorited" } else { "unfavorited" };
    Ok(Ack::new(action, "process", id))
}

pub fn process_delete(ctx: &Context, id: i64) -> Result<Ack> {
    ctx.storage.delete_process(id)?;
    Ok(Ack::new("deleted", "process", id))
}

// === Steps ===

#[derive(Serialize)]
pub struct StepResult {
    #[serde(flatten)]
    pub step: Step,
}

impl Output for StepResult {
    fn to_human(&self) -> String {
        format!(
            "Added step {} to process {} at position {}",
            self.step.id, self.step.process_id, self.step.position
        )
    }
}

pub fn step_add(ctx: &Context, process_id: i64, content: &str, due: Option<NaiveDate>) -> Result<StepResult> {
    let step = ctx.storage.add_step(process_id, content, due)?;
    Ok(StepResult { step })
}

#[derive(Serialize)]
pub struct StepCompletion {
    pub id: i64,
    pub completed: bool,
    #[serde(flatten)]
    pub cascade: CascadeResult,
}

impl Output for StepCompletion {
    fn to_human(&self) -> String {
        let verb = if self.completed { "Completed" } else { "Reopened" };
        let mut out = format!("{} step {}", verb, self.id);
        if !self.cascade.step_changed {
            out.push_str(" (unchanged)");
        }
        if self.cascade.sub_steps_changed > 0 {
            out.push_str(&format!(", {} substeps updated", self.cascade.sub_steps_changed));
        }
        out
    }
}

/// Complete or reopen a step, cascading to its substeps.
pub fn step_set_completed(ctx: &Context, id: i64, completed: bool, cascade_on_uncomplete: bool) -> Result<StepCompletion> {
    let options = CascadeOptions { cascade_on_uncomplete };
    let cascade = cascade::set_step_completed(&ctx.storage, id, completed, options, ctx.as_of)?;
    Ok(StepCompletion { id, completed, cascade })
}

pub fn step_move(ctx: &Context, id: i64, position: u32) -> Result<Ack> {
    check_position(position)?;
    ctx.storage.move_step(id, position)?;
    Ok(Ack::new("moved", "step", id))
}

pub fn step_delete(ctx: &Context, id: i64) -> Result<Ack> {
    ctx.storage.delete_step(id)?;
    Ok(Ack::new("deleted", "step", id))
}

// === Substeps ===

#[derive(Serialize)]
pub struct SubStepResult {
    #[serde(flatten)]
    pub sub_step: SubStep,
}

impl Output for SubStepResult {
    fn to_human(&self) -> String {
        format!(
            "Added substep {} to step {} at position {}",
            self.sub_step.id, self.sub_step.step_id, self.sub_step.position
        )
    }
}

pub fn substep_add(ctx: &Context, step_id: i64, content: &str, due: Option<NaiveDate>) -> Result<SubStepResult> {
    let sub_step = ctx.storage.add_sub_step(step_id, content, due)?;
    Ok(SubStepResult { sub_step })
}

#[derive(Serialize)]
pub struct SubStepCompletion {
    pub id: i64,
    pub completed: bool,
    /// Rows changed, including a reopened parent step
    pub changed: usize,
}

impl Output for SubStepCompletion {
    fn to_human(&self) -> String {
        let verb = if self.completed { "Completed" } else { "Reopened" };
        format!("{} substep {} ({} rows changed)", verb, self.id, self.changed)
    }
}

pub fn substep_set_completed(ctx: &Context, id: i64, completed: bool) -> Result<SubStepCompletion> {
    let changed = cascade::set_sub_step_completed(&ctx.storage, id, completed, ctx.as_of)?;
    Ok(SubStepCompletion { id, completed, changed })
}

pub fn substep_move(ctx: &Context, id: i64, position: u32) -> Result<Ack> {
    check_position(position)?;
    ctx.storage.move_sub_step(id, position)?;
    Ok(Ack::new("moved", "substep", id))
}

pub fn substep_delete(ctx: &Context, id: i64) -> Result<Ack> {
    ctx.storage.delete_sub_step(id)?;
    Ok(Ack::new("deleted", "substep", id))
}

fn check_position(position: u32) -> Result<()> {
    if position == 0 {
        return Err(Error::InvalidInput("Positions start at 1".to_string()));
    }
    Ok(())
}

// === Forking and repair ===

#[derive(Serialize)]
pub struct ForkResult {
    pub template_id: i64,
    pub owner: String,
    #[serde(flatten)]
    pub outcome: forking::ForkOutcome,
}

impl Output for ForkResult {
    fn to_human(&self) -> String {
        let mut out = if self.outcome.created {
            format!(
                "Forked template {} into process {} for {}",
                self.template_id, self.outcome.instance_id, self.owner
            )
        } else {
            format!(
                "{} already has process {} from template {}",
                self.owner, self.outcome.instance_id, self.template_id
            )
        };
        if !self.outcome.complete {
            out.push_str(" (some steps could not be copied)");
        }
        out
    }
}

/// Fork a template for an owner.
pub fn fork(ctx: &Context, template_id: i64, owner: &str) -> Result<ForkResult> {
    let outcome = forking::fork(&ctx.storage, template_id, owner, ctx.as_of)?
        .ok_or_else(|| Error::NotFound(format!("Template not found: {}", template_id)))?;
    Ok(ForkResult {
        template_id,
        owner: owner.to_string(),
        outcome,
    })
}

#[derive(Serialize)]
pub struct ReconcileResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_id: Option<i64>,
    pub sub_steps_completed: usize,
}

impl Output for ReconcileResult {
    fn to_human(&self) -> String {
        let scope = match self.process_id {
            Some(id) => format!("process {}", id),
            None => "all processes".to_string(),
        };
        format!("Reconciled {}: {} substeps completed", scope, self.sub_steps_completed)
    }
}

/// Complete open substeps under completed steps, for one process or all.
pub fn reconcile(ctx: &Context, process_id: Option<i64>) -> Result<ReconcileResult> {
    let sub_steps_completed = match process_id {
        Some(id) => cascade::reconcile(&ctx.storage, id, ctx.as_of)?,
        None => cascade::reconcile_all(&ctx.storage, ctx.as_of)?,
    };
    Ok(ReconcileResult {
        process_id,
        sub_steps_completed,
    })
}
