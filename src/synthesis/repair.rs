//! Orphan repair: every event resolves to a process with at least one step.

use crate::Result;
use crate::models::Process;
use crate::scheduler::{steps, timing};
use crate::storage::Storage;
use chrono::{DateTime, Utc};

/// Repair events and their processes for one owner, or for everyone.
///
/// - an event with no process gets the owner's plain process named after
///   the event (created if needed)
/// - a linked process with no steps gets starter steps
/// - an event whose stored timing disagrees with itself is re-derived
///
/// Returns the number of events and processes changed; a second pass
/// returns 0.
pub fn repair_orphans(storage: &Storage, owner: Option<&str>, as_of: DateTime<Utc>) -> Result<usize> {
    storage.with_transaction(|s| {
        let mut changed = 0;

        for event in s.events_without_process(owner)? {
            let (process, created) =
                s.find_or_create_process(&Process::new(&event.owner, &event.title))?;
            steps::ensure_steps(s, process.id, &event.title)?;
            s.set_event_process(event.id, Some(process.id))?;
            tracing::debug!(
                event_id = event.id,
                process_id = process.id,
                created,
                "linked orphan event"
            );
            changed += 1;
        }

        for (process_id, title) in s.linked_processes_without_steps(owner)? {
            if steps::ensure_steps(s, process_id, &title)? > 0 {
                changed += 1;
            }
        }

        let owners = match owner {
            Some(o) => vec![o.to_string()],
            None => s.event_owners()?,
        };
        for o in owners {
            for mut event in s.list_events(&o, None, None)? {
                if timing::normalize(&mut event, as_of) {
                    s.update_event(&event)?;
                    changed += 1;
                }
            }
        }

        if changed > 0 {
            tracing::info!(?owner, changed, "repaired events");
        }
        Ok(changed)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Complexity, Event, EventStatus, Metadata};
    use crate::test_utils::{TestEnv, as_of, date};
    use chrono::Duration;

    fn orphan(storage: &Storage, owner: &str, title: &str) -> i64 {
        let start = date(2026, 3, 17).and_hms_opt(10, 0, 0).unwrap().and_utc();
        storage
            .insert_event(&Event {
                id: 0,
                owner: owner.to_string(),
                title: title.to_string(),
                description: None,
                start_time: start,
                end_time: start + Duration::minutes(45),
                date: "2026-03-17".to_string(),
                time: "10:00".to_string(),
                duration: "45".to_string(),
                status: EventStatus::Pending,
                complexity: Complexity::new(2),
                process_id: None,
                metadata: Metadata::new(),
                created_at: as_of(),
            })
            .unwrap()
    }

    #[test]
    fn test_orphans_get_processes_with_steps() {
        let env = TestEnv::new();
        let storage = env.init_storage();
        let a = orphan(&storage, "alice", "Quarterly review");
        let b = orphan(&storage, "alice", "Lunch with Sam");

        assert_eq!(repair_orphans(&storage, Some("alice"), as_of()).unwrap(), 2);
        assert!(storage.events_without_process(Some("alice")).unwrap().is_empty());

        for id in [a, b] {
            let process_id = storage.require_event(id).unwrap().process_id.unwrap();
            let process = storage.require_process(process_id).unwrap();
            assert!(!process.is_template);
            assert!(storage.count_steps(process_id).unwrap() > 0);
        }
    }

    #[test]
    fn test_repair_converges() {
        let env = TestEnv::new();
        let storage = env.init_storage();
        orphan(&storage, "alice", "Quarterly review");
        orphan(&storage, "bob", "Quarterly review");

        assert_eq!(repair_orphans(&storage, None, as_of()).unwrap(), 2);
        assert_eq!(repair_orphans(&storage, None, as_of()).unwrap(), 0);
    }

    #[test]
    fn test_repair_is_scoped_to_owner() {
        let env = TestEnv::new();
        let storage = env.init_storage();
        orphan(&storage, "alice", "Sync");
        orphan(&storage, "bob", "Sync");

        repair_orphans(&storage, Some("alice"), as_of()).unwrap();
        assert_eq!(storage.events_without_process(Some("bob")).unwrap().len(), 1);
    }

    #[test]
    fn test_step_less_linked_process_gets_steps() {
        let env = TestEnv::new();
        let storage = env.init_storage();
        let event = orphan(&storage, "alice", "Design review");
        let process = storage.insert_process(&Process::new("alice", "Empty")).unwrap();
        storage.set_event_process(event, Some(process)).unwrap();

        assert_eq!(repair_orphans(&storage, Some("alice"), as_of()).unwrap(), 1);
        assert!(storage.count_steps(process).unwrap() > 0);
    }

    #[test]
    fn test_inconsistent_legacy_fields_are_rederived() {
        let env = TestEnv::new();
        let storage = env.init_storage();
        let id = orphan(&storage, "alice", "Sync");
        repair_orphans(&storage, Some("alice"), as_of()).unwrap();

        let mut event = storage.require_event(id).unwrap();
        event.duration = "999".to_string();
        storage.update_event(&event).unwrap();

        assert_eq!(repair_orphans(&storage, Some("alice"), as_of()).unwrap(), 1);
        assert_eq!(storage.require_event(id).unwrap().duration, "45");
    }
}
