//! Workspace synthesis.
//!
//! [`synthesize_workspace`] seeds an owner's account in a fixed phase order.
//! Every phase finds or creates by natural key inside its own savepoint, so
//! a failed phase rolls back alone and a re-run picks up where a crashed run
//! stopped. Only a failed `users` phase ends the run early.

pub mod catalog;
pub mod content;
pub mod insights;
pub mod relations;
pub mod repair;

use crate::cascade::{self, CascadeOptions};
use crate::forking;
use crate::models::{Directory, Process, User};
use crate::scheduler::{self, ScheduleRequest, ScheduleSettings};
use crate::storage::Storage;
use crate::storage::content::OwnerCounts;
use crate::{Error, Result};
use catalog::{Catalog, TemplateSpec};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Knobs for a synthesis run.
#[derive(Debug, Clone)]
pub struct SynthesisOptions {
    pub as_of: DateTime<Utc>,
    pub seed: u64,
    pub days_back: i64,
    pub days_ahead: i64,
    /// Share of generated events that get related events
    pub relation_ratio: f64,
    pub schedule: ScheduleSettings,
}

impl SynthesisOptions {
    pub fn new(as_of: DateTime<Utc>) -> Self {
        Self {
            as_of,
            seed: 0,
            days_back: scheduler::DEFAULT_DAYS_BACK,
            days_ahead: scheduler::DEFAULT_DAYS_AHEAD,
            relation_ratio: relations::DEFAULT_RELATION_RATIO,
            schedule: ScheduleSettings::default(),
        }
    }
}

/// Pipeline phases, in run order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Users,
    Topics,
    Directories,
    Processes,
    Events,
    OrphanRepair,
    Relationships,
    Posts,
    Preferences,
    Notifications,
    CrossReferences,
    Insights,
}

impl Phase {
    pub fn all() -> &'static [Phase] {
        &[
            Phase::Users,
            Phase::Topics,
            Phase::Directories,
            Phase::Processes,
            Phase::Events,
            Phase::OrphanRepair,
            Phase::Relationships,
            Phase::Posts,
            Phase::Preferences,
            Phase::Notifications,
            Phase::CrossReferences,
            Phase::Insights,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Users => "users",
            Phase::Topics => "topics",
            Phase::Directories => "directories",
            Phase::Processes => "processes",
            Phase::Events => "events",
            Phase::OrphanRepair => "orphan_repair",
            Phase::Relationships => "relationships",
            Phase::Posts => "posts",
            Phase::Preferences => "preferences",
            Phase::Notifications => "notifications",
            Phase::CrossReferences => "cross_references",
            Phase::Insights => "insights",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Succeeded,
    Failed,
    Skipped,
}

/// How one phase went.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseOutcome {
    pub phase: Phase,
    pub status: PhaseStatus,
    /// Rows created or changed by the phase
    pub changed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary of a synthesis run.
#[derive(Debug, Clone, Serialize)]
pub struct SynthesisReport {
    pub run_id: String,
    pub owner: String,
    pub phases: Vec<PhaseOutcome>,
    pub counts: OwnerCounts,
}

impl SynthesisReport {
    pub fn succeeded(&self) -> bool {
        self.phases.iter().all(|p| p.status == PhaseStatus::Succeeded)
    }

    pub fn outcome(&self, phase: Phase) -> Option<&PhaseOutcome> {
        self.phases.iter().find(|p| p.phase == phase)
    }
}

/// Seed `owner`'s workspace for `role_tag`.
pub fn synthesize_workspace(
    storage: &Storage,
    owner: &str,
    role_tag: Option<&str>,
    options: &SynthesisOptions,
) -> Result<SynthesisReport> {
    if owner.trim().is_empty() {
        return Err(Error::InvalidInput("Owner must not be empty".to_string()));
    }

    let run_id = uuid::Uuid::new_v4().to_string();
    let catalog = catalog::for_role(role_tag);
    let mut phases = Vec::new();
    let mut aborted = false;

    tracing::info!(%run_id, owner, ?role_tag, "synthesis started");

    for &phase in Phase::all() {
        if aborted {
            phases.push(PhaseOutcome {
                phase,
                status: PhaseStatus::Skipped,
                changed: 0,
                error: None,
            });
            continue;
        }

        let result = storage.with_transaction(|s| run_phase(s, phase, owner, role_tag, &catalog, options));
        let outcome = match result {
            Ok(changed) => {
                tracing::info!(%run_id, %phase, changed, "phase succeeded");
                PhaseOutcome {
                    phase,
                    status: PhaseStatus::Succeeded,
                    changed,
                    error: None,
                }
            }
            Err(e) => {
                tracing::error!(%run_id, %phase, error = %e, "phase failed");
                aborted = phase == Phase::Users;
                PhaseOutcome {
                    phase,
                    status: PhaseStatus::Failed,
                    changed: 0,
                    error: Some(e.to_string()),
                }
            }
        };
        phases.push(outcome);
    }

    let counts = storage.owner_counts(owner)?;
    tracing::info!(%run_id, owner, events = counts.events, "synthesis finished");

    Ok(SynthesisReport {
        run_id,
        owner: owner.to_string(),
        phases,
        counts,
    })
}

fn run_phase(
    s: &Storage,
    phase: Phase,
    owner: &str,
    role_tag: Option<&str>,
    catalog: &Catalog,
    options: &SynthesisOptions,
) -> Result<usize> {
    match phase {
        Phase::Users => create_users(s, owner, role_tag, catalog, options.as_of),
        Phase::Topics => {
            let mut created = 0;
            for (name, description) in &catalog.topics {
                if s.find_or_create_topic(name, Some(*description))?.1 {
                    created += 1;
                }
            }
            Ok(created)
        }
        Phase::Directories => create_directories(s, owner, catalog),
        Phase::Processes => {
            let mut changed = 0;
            for spec in &catalog.templates {
                changed += create_template(s, owner, spec, options.as_of)?;
            }
            Ok(changed)
        }
        Phase::Events => {
            let mut pool = Vec::new();
            for spec in &catalog.templates {
                if let Some(template) = s.find_template(owner, spec.title)? {
                    pool.push(template.id);
                }
            }
            let request = ScheduleRequest::new(owner, options.as_of)
                .with_days(options.days_back, options.days_ahead)
                .with_role(role_tag.map(str::to_string))
                .with_pool(pool)
                .with_seed(options.seed)
                .with_settings(options.schedule.clone());
            let created = scheduler::generate_events(s, &request)?.len();
            let refreshed = scheduler::refresh_statuses(s, owner, options.as_of)?;
            Ok(created + refreshed)
        }
        Phase::OrphanRepair => repair::repair_orphans(s, Some(owner), options.as_of),
        Phase::Relationships => {
            relations::wire_relationships(s, owner, options.relation_ratio, options.seed)
        }
        Phase::Posts => content::create_posts(s, owner, catalog, options.as_of),
        Phase::Preferences => content::apply_preferences(s, owner, catalog),
        Phase::Notifications => content::create_notifications(s, owner, options.as_of),
        Phase::CrossReferences => content::create_cross_references(s, owner),
        Phase::Insights => Ok(insights::record_insights(s, owner, options.as_of)? as usize),
    }
}

fn create_users(
    s: &Storage,
    owner: &str,
    role_tag: Option<&str>,
    catalog: &Catalog,
    as_of: DateTime<Utc>,
) -> Result<usize> {
    let slug = content::owner_slug(owner);
    let mut users = vec![User {
        id: owner.to_string(),
        handle: slug.clone(),
        email: format!("{}@stepwise.local", slug),
        display_name: owner.to_string(),
        role_tag: role_tag.map(str::to_string),
        created_at: as_of,
    }];
    for mate in &catalog.teammates {
        let handle = content::teammate_handle(owner, mate.handle);
        users.push(User {
            id: format!("{}/{}", owner, mate.handle),
            email: format!("{}@stepwise.local", handle),
            handle,
            display_name: mate.display_name.to_string(),
            role_tag: None,
            created_at: as_of,
        });
    }

    let mut created = 0;
    for user in &users {
        if s.find_or_create_user(user)?.1 {
            created += 1;
        }
    }
    Ok(created)
}

fn create_directories(s: &Storage, owner: &str, catalog: &Catalog) -> Result<usize> {
    let mut created = 0;
    // Parents come first in the catalog, so they resolve by name
    for spec in &catalog.directories {
        let parent_id = match spec.parent {
            Some(name) => Some(
                s.find_directory_by_name(owner, name)?
                    .ok_or_else(|| Error::NotFound(format!("Directory not found: {}", name)))?
                    .id,
            ),
            None => None,
        };
        let mut dir = Directory::new(owner, spec.name);
        dir.parent_id = parent_id;
        dir.description = Some(spec.description.to_string());
        dir.color = Some(spec.color.to_string());
        dir.icon = Some(spec.icon.to_string());
        if s.find_or_create_directory(&dir)?.1 {
            created += 1;
        }
    }
    Ok(created)
}

/// Create one template with its steps, fork it if asked and mark the
/// instance's leading steps done.
fn create_template(s: &Storage, owner: &str, spec: &TemplateSpec, as_of: DateTime<Utc>) -> Result<usize> {
    let mut changed = 0;
    let mut template = Process::template(owner, spec.title);
    template.category = Some(spec.category.to_string());
    template.description = Some(spec.description.to_string());
    template.directory_id = s.find_directory_by_name(owner, spec.directory)?.map(|d| d.id);

    let (template, created) = s.find_or_create_process(&template)?;
    if created {
        changed += 1;
        for (content, sub_steps) in spec.steps {
            let step = s.add_step(template.id, content, None)?;
            for sub in sub_steps.iter() {
                s.add_sub_step(step.id, sub, None)?;
            }
        }
        tracing::debug!(template_id = template.id, title = spec.title, "created template");
    }

    if spec.favorite && !template.favorite {
        s.set_favorite(template.id, true)?;
        changed += 1;
    }

    if spec.fork {
        if let Some(outcome) = forking::fork(s, template.id, owner, as_of)? {
            if outcome.created {
                changed += 1;
                for step in s.list_steps(outcome.instance_id)?.iter().take(spec.progress) {
                    cascade::set_step_completed(s, step.id, true, CascadeOptions::default(), as_of)?;
                }
            }
        }
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{TestEnv, as_of};

    fn options() -> SynthesisOptions {
        let mut options = SynthesisOptions::new(as_of());
        options.seed = 11;
        options.days_back = 7;
        options.days_ahead = 14;
        options
    }

    #[test]
    fn test_all_phases_succeed_in_order() {
        let env = TestEnv::new();
        let storage = env.init_storage();
        let report = synthesize_workspace(&storage, "alice", Some("dev"), &options()).unwrap();

        assert!(report.succeeded(), "{:?}", report.phases);
        let order: Vec<Phase> = report.phases.iter().map(|p| p.phase).collect();
        assert_eq!(order, Phase::all());
        assert!(report.counts.events > 0);
        assert!(report.counts.processes > 0);
        assert!(report.counts.reports == 1);
    }

    #[test]
    fn test_rerun_changes_nothing() {
        let env = TestEnv::new();
        let storage = env.init_storage();
        let first = synthesize_workspace(&storage, "alice", Some("dev"), &options()).unwrap();
        let second = synthesize_workspace(&storage, "alice", Some("dev"), &options()).unwrap();

        assert_ne!(first.run_id, second.run_id);
        assert_eq!(
            serde_json::to_value(&first.counts).unwrap(),
            serde_json::to_value(&second.counts).unwrap()
        );
        for outcome in &second.phases {
            assert_eq!(outcome.changed, 0, "{} changed on re-run", outcome.phase);
        }
    }

    #[test]
    fn test_account_content_matches_catalog() {
        let env = TestEnv::new();
        let storage = env.init_storage();
        synthesize_workspace(&storage, "alice", Some("dev"), &options()).unwrap();
        let catalog = catalog::for_role(Some("dev"));

        let topics: Vec<String> = storage.list_topics().unwrap().into_iter().map(|t| t.name).collect();
        for (name, _) in &catalog.topics {
            assert!(topics.iter().any(|t| t == name), "missing topic {}", name);
        }

        let prefs = storage.list_preferences("alice").unwrap();
        assert_eq!(prefs.len(), catalog.preferences.len());

        let reports = storage.list_insight_reports("alice").unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].period, "2026-03");
    }

    #[test]
    fn test_instances_have_progress_and_favorites_are_templates() {
        let env = TestEnv::new();
        let storage = env.init_storage();
        synthesize_workspace(&storage, "alice", Some("dev"), &options()).unwrap();

        let review = storage.find_template("alice", "Code Review").unwrap().unwrap();
        assert!(review.favorite);
        let instance = storage.find_instance(review.id, "alice").unwrap().unwrap();
        assert_eq!(storage.process_progress(instance.id).unwrap().completed, 2);
        // Template progress is untouched by the instance
        assert_eq!(storage.process_progress(review.id).unwrap().completed, 0);

        for process in storage.list_processes(Some("alice"), None).unwrap() {
            if process.favorite {
                assert!(process.is_template);
            }
        }
    }

    #[test]
    fn test_every_event_has_a_process_with_steps() {
        let env = TestEnv::new();
        let storage = env.init_storage();
        synthesize_workspace(&storage, "alice", Some("dev"), &options()).unwrap();

        for event in storage.list_events("alice", None, None).unwrap() {
            assert!(event.start_time < event.end_time);
            let process_id = event.process_id.expect("event without process");
            assert!(storage.count_steps(process_id).unwrap() > 0, "{}", event.title);
        }
    }

    #[test]
    fn test_failed_users_phase_aborts() {
        let env = TestEnv::new();
        let storage = env.init_storage();
        // Someone else already holds the handle
        storage
            .find_or_create_user(&User {
                id: "other".to_string(),
                handle: "alice".to_string(),
                email: "x@example.com".to_string(),
                display_name: "Other".to_string(),
                role_tag: None,
                created_at: as_of(),
            })
            .unwrap();

        let report = synthesize_workspace(&storage, "alice", None, &options()).unwrap();
        assert_eq!(report.outcome(Phase::Users).unwrap().status, PhaseStatus::Failed);
        assert!(report.phases[1..].iter().all(|p| p.status == PhaseStatus::Skipped));
        assert_eq!(report.counts.processes, 0);
    }

    #[test]
    fn test_failed_phase_rolls_back_alone() {
        let env = TestEnv::new();
        let storage = env.init_storage();
        storage
            .conn()
            .execute_batch(
                "CREATE TRIGGER refuse_posts BEFORE INSERT ON posts
                 BEGIN SELECT RAISE(ABORT, 'posts disabled'); END;",
            )
            .unwrap();

        let report = synthesize_workspace(&storage, "alice", Some("dev"), &options()).unwrap();
        let posts = report.outcome(Phase::Posts).unwrap();
        assert_eq!(posts.status, PhaseStatus::Failed);
        assert!(posts.error.as_deref().unwrap().contains("posts disabled"));
        assert_eq!(report.counts.posts, 0);
        assert_eq!(
            report.outcome(Phase::Insights).unwrap().status,
            PhaseStatus::Succeeded
        );
    }

    #[test]
    fn test_empty_owner_is_rejected() {
        let env = TestEnv::new();
        let storage = env.init_storage();
        assert!(matches!(
            synthesize_workspace(&storage, " ", None, &options()),
            Err(Error::InvalidInput(_))
        ));
    }
}
