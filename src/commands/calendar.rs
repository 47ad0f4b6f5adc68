//! Scheduling, event and synthesis commands.

use super::{Context, Output};
use crate::models::{Event, EventStatus};
use crate::scheduler::{self, ScheduleRequest};
use crate::synthesis::relations;
use crate::synthesis::repair;
use crate::synthesis::{self, PhaseStatus, SynthesisReport};
use crate::{Error, Result};
use chrono::{Duration, NaiveDate};
use serde::Serialize;

/// Options for `sw schedule`.
#[derive(Debug, Default)]
pub struct ScheduleArgs {
    pub owner: String,
    pub role: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub pool: Vec<i64>,
    pub seed: Option<u64>,
}

#[derive(Serialize)]
pub struct ScheduleResult {
    pub owner: String,
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    /// Ids of events created by this run
    pub created: Vec<i64>,
    pub statuses_refreshed: usize,
}

impl Output for ScheduleResult {
    fn to_human(&self) -> String {
        format!(
            "Scheduled {} new events for {} between {} and {} ({} statuses refreshed)",
            self.created.len(),
            self.owner,
            self.window_start,
            self.window_end,
            self.statuses_refreshed
        )
    }
}

/// Fill an owner's calendar over a window, then refresh event statuses.
///
/// Unset window bounds, seed and role come from the resolved config.
pub fn schedule(ctx: &Context, args: ScheduleArgs) -> Result<ScheduleResult> {
    if args.owner.trim().is_empty() {
        return Err(Error::InvalidInput("Owner must not be empty".to_string()));
    }
    let today = ctx.as_of.date_naive();
    let start = args
        .from
        .unwrap_or(today - Duration::days(ctx.config.window_days_back.value));
    let end = args
        .to
        .unwrap_or(today + Duration::days(ctx.config.window_days_ahead.value));
    let role = args.role.or_else(|| ctx.config.role_tag().map(str::to_string));

    let request = ScheduleRequest::new(&args.owner, ctx.as_of)
        .with_window(start, end)
        .with_role(role)
        .with_pool(args.pool)
        .with_seed(args.seed.unwrap_or(ctx.config.seed.value))
        .with_settings(ctx.config.schedule_settings());

    let created = scheduler::generate_events(&ctx.storage, &request)?;
    let statuses_refreshed = scheduler::refresh_statuses(&ctx.storage, &args.owner, ctx.as_of)?;

    Ok(ScheduleResult {
        owner: args.owner,
        window_start: start,
        window_end: end,
        created,
        statuses_refreshed,
    })
}

#[derive(Serialize)]
pub struct EventList {
    pub events: Vec<Event>,
}

impl Output for EventList {
    fn to_human(&self) -> String {
        if self.events.is_empty() {
            return "No events.".to_string();
        }
        let mut lines: Vec<String> = self
            .events
            .iter()
            .map(|e| {
                let process = e
                    .process_id
                    .map(|id| format!(" -> process {}", id))
                    .unwrap_or_default();
                format!(
                    "[{}] {} {}-{} {} ({}){}",
                    e.id,
                    e.date,
                    e.start_time.format("%H:%M"),
                    e.end_time.format("%H:%M"),
                    e.title,
                    e.status,
                    process
                )
            })
            .collect();
        let summary = status_counts(&self.events)
            .into_iter()
            .map(|(status, n)| format!("{} {}", n, status))
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(format!("{} events: {}", self.events.len(), summary));
        lines.join("\n")
    }
}

pub fn event_list(
    ctx: &Context,
    owner: &str,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<EventList> {
    Ok(EventList {
        events: ctx.storage.list_events(owner, from, to)?,
    })
}

#[derive(Serialize)]
pub struct RepairResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    pub repaired: usize,
}

impl Output for RepairResult {
    fn to_human(&self) -> String {
        match self.owner {
            Some(ref owner) => format!("Repaired {} events for {}", self.repaired, owner),
            None => format!("Repaired {} events", self.repaired),
        }
    }
}

/// Link orphan events to processes and fix broken timings.
pub fn event_repair(ctx: &Context, owner: Option<&str>) -> Result<RepairResult> {
    let repaired = repair::repair_orphans(&ctx.storage, owner, ctx.as_of)?;
    Ok(RepairResult {
        owner: owner.map(str::to_string),
        repaired,
    })
}

#[derive(Serialize)]
pub struct RelateResult {
    pub owner: String,
    pub links: usize,
    /// Whether every relation is listed on both events
    pub symmetric: bool,
    pub clusters: usize,
}

impl Output for RelateResult {
    fn to_human(&self) -> String {
        format!(
            "Added {} relations for {} ({} clusters{})",
            self.links,
            self.owner,
            self.clusters,
            if self.symmetric { "" } else { ", asymmetric" }
        )
    }
}

/// Wire relations between an owner's generated events.
pub fn event_relate(ctx: &Context, owner: &str, ratio: Option<f64>, seed: Option<u64>) -> Result<RelateResult> {
    let ratio = ratio.unwrap_or(ctx.config.relation_ratio.value);
    if !(0.0..=1.0).contains(&ratio) {
        return Err(Error::InvalidInput(format!(
            "Relation ratio must be between 0 and 1, got {}",
            ratio
        )));
    }
    let seed = seed.unwrap_or(ctx.config.seed.value);
    let links = relations::wire_relationships(&ctx.storage, owner, ratio, seed)?;
    let graph = relations::relation_graph(&ctx.storage, owner)?;
    Ok(RelateResult {
        owner: owner.to_string(),
        links,
        symmetric: graph.is_symmetric(),
        clusters: graph.clusters().len(),
    })
}

#[derive(Serialize)]
pub struct RefreshResult {
    pub owner: String,
    pub changed: usize,
}

impl Output for RefreshResult {
    fn to_human(&self) -> String {
        format!("Refreshed {} event statuses for {}", self.changed, self.owner)
    }
}

pub fn event_refresh(ctx: &Context, owner: &str) -> Result<RefreshResult> {
    Ok(RefreshResult {
        owner: owner.to_string(),
        changed: scheduler::refresh_statuses(&ctx.storage, owner, ctx.as_of)?,
    })
}

impl Output for SynthesisReport {
    fn to_human(&self) -> String {
        let mut lines = vec![format!("Synthesis run {} for {}", self.run_id, self.owner)];
        for outcome in &self.phases {
            let status = match outcome.status {
                PhaseStatus::Succeeded => format!("ok, {} changed", outcome.changed),
                PhaseStatus::Failed => format!(
                    "FAILED: {}",
                    outcome.error.as_deref().unwrap_or("unknown error")
                ),
                PhaseStatus::Skipped => "skipped".to_string(),
            };
            lines.push(format!("  {:<17} {}", outcome.phase.as_str(), status));
        }
        let c = &self.counts;
        lines.push(format!(
            "Totals: {} directories, {} processes, {} events, {} posts, {} notifications, {} reports",
            c.directories, c.processes, c.events, c.posts, c.notifications, c.reports
        ));
        lines.join("\n")
    }
}

/// Seed an owner's workspace.
pub fn synthesize(ctx: &Context, owner: &str, role: Option<&str>, seed: Option<u64>) -> Result<SynthesisReport> {
    let mut options = ctx.config.synthesis_options(ctx.as_of);
    if let Some(seed) = seed {
        options.seed = seed;
    }
    let role = role.or_else(|| ctx.config.role_tag());
    synthesis::synthesize_workspace(&ctx.storage, owner, role, &options)
}

/// Count of events per status, for human summaries.
pub fn status_counts(events: &[Event]) -> Vec<(EventStatus, usize)> {
    EventStatus::all()
        .iter()
        .map(|status| (*status, events.iter().filter(|e| e.status == *status).count()))
        .filter(|(_, n)| *n > 0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::context;
    use crate::models::Process;
    use crate::test_utils::{TestEnv, date};

    fn seed_templates(ctx: &Context) {
        for title in ["Team Standup", "Code Review", "Sprint Planning"] {
            let id = ctx.storage.insert_process(&Process::template("lead", title)).unwrap();
            ctx.storage.add_step(id, "Prepare", None).unwrap();
        }
    }

    fn two_weeks(owner: &str) -> ScheduleArgs {
        ScheduleArgs {
            owner: owner.to_string(),
            role: Some("dev".to_string()),
            from: Some(date(2026, 3, 9)),
            to: Some(date(2026, 3, 22)),
            seed: Some(7),
            ..Default::default()
        }
    }

    #[test]
    fn test_schedule_converges() {
        let env = TestEnv::new();
        let ctx = context(&env);
        seed_templates(&ctx);

        let first = schedule(&ctx, two_weeks("alice")).unwrap();
        assert!(!first.created.is_empty());
        assert_eq!(first.window_start, date(2026, 3, 9));

        let second = schedule(&ctx, two_weeks("alice")).unwrap();
        assert!(second.created.is_empty());
        assert_eq!(second.statuses_refreshed, 0);

        let events = event_list(&ctx, "alice", None, None).unwrap();
        assert_eq!(events.events.len(), first.created.len());
        assert!(events.events.iter().all(|e| e.process_id.is_some()));
    }

    #[test]
    fn test_schedule_rejects_inverted_window() {
        let env = TestEnv::new();
        let ctx = context(&env);
        let mut args = two_weeks("alice");
        args.from = Some(date(2026, 3, 22));
        args.to = Some(date(2026, 3, 9));
        assert!(matches!(schedule(&ctx, args), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_schedule_defaults_window_from_config() {
        let env = TestEnv::new();
        let ctx = context(&env);
        seed_templates(&ctx);
        let result = schedule(
            &ctx,
            ScheduleArgs {
                owner: "bob".to_string(),
                ..Default::default()
            },
        )
        .unwrap();
        let today = ctx.as_of.date_naive();
        assert_eq!(result.window_start, today - Duration::days(scheduler::DEFAULT_DAYS_BACK));
        assert_eq!(result.window_end, today + Duration::days(scheduler::DEFAULT_DAYS_AHEAD));
    }

    #[test]
    fn test_relate_is_symmetric_and_stable() {
        let env = TestEnv::new();
        let ctx = context(&env);
        seed_templates(&ctx);
        schedule(&ctx, two_weeks("alice")).unwrap();

        let first = event_relate(&ctx, "alice", Some(1.0), Some(3)).unwrap();
        assert!(first.symmetric);
        let second = event_relate(&ctx, "alice", Some(1.0), Some(3)).unwrap();
        assert_eq!(second.links, 0);
        assert_eq!(second.clusters, first.clusters);

        assert!(matches!(
            event_relate(&ctx, "alice", Some(1.5), None),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_repair_and_refresh_on_clean_calendar() {
        let env = TestEnv::new();
        let ctx = context(&env);
        seed_templates(&ctx);
        schedule(&ctx, two_weeks("alice")).unwrap();

        assert_eq!(event_repair(&ctx, Some("alice")).unwrap().repaired, 0);
        assert_eq!(event_refresh(&ctx, "alice").unwrap().changed, 0);
    }

    #[test]
    fn test_status_counts_follow_as_of() {
        let env = TestEnv::new();
        let ctx = context(&env);
        seed_templates(&ctx);
        schedule(&ctx, two_weeks("alice")).unwrap();

        let events = event_list(&ctx, "alice", None, None).unwrap().events;
        let counts = status_counts(&events);
        let done = counts
            .iter()
            .find(|(s, _)| *s == EventStatus::Done)
            .map(|(_, n)| *n)
            .unwrap_or(0);
        let past = events
            .iter()
            .filter(|e| e.calendar_date() < ctx.as_of.date_naive())
            .count();
        assert_eq!(done, past);
    }

    #[test]
    fn test_synthesize_report_output() {
        let env = TestEnv::new();
        let ctx = context(&env);
        let report = synthesize(&ctx, "dana", Some("design"), Some(5)).unwrap();
        assert!(report.succeeded());
        let human = report.to_human();
        assert!(human.contains("users"));
        assert!(human.contains("insights"));
        assert!(report.to_json().contains("\"run_id\""));
    }
}
