//! Starter steps for processes that have none.

use crate::Result;
use crate::models::MeetingKind;
use crate::storage::Storage;

/// Give a step-less process the starter steps for its meeting kind.
///
/// The kind is inferred from `title`. Processes that already have steps are
/// left alone, so this is safe to call repeatedly. Returns the number of
/// steps added.
pub fn ensure_steps(storage: &Storage, process_id: i64, title: &str) -> Result<usize> {
    if storage.count_steps(process_id)? > 0 {
        return Ok(0);
    }

    let kind = MeetingKind::infer(title);
    storage.with_transaction(|s| {
        let starters = kind.starter_steps();
        for (content, sub_steps) in starters {
            let step = s.add_step(process_id, content, None)?;
            for sub in *sub_steps {
                s.add_sub_step(step.id, sub, None)?;
            }
        }
        tracing::debug!(process_id, %kind, steps = starters.len(), "added starter steps");
        Ok(starters.len())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Process;
    use crate::test_utils::TestEnv;

    #[test]
    fn test_starter_steps_follow_title() {
        let env = TestEnv::new();
        let storage = env.init_storage();
        let process = storage
            .insert_process(&Process::new("alice", "Sprint planning"))
            .unwrap();

        let added = ensure_steps(&storage, process, "Sprint planning").unwrap();
        assert_eq!(added, MeetingKind::Planning.starter_steps().len());

        let tree = storage.step_tree(process).unwrap();
        assert_eq!(tree[0].step.content, "Review goals and constraints");
        assert_eq!(tree[1].sub_steps.len(), 2);
    }

    #[test]
    fn test_ensure_steps_runs_once() {
        let env = TestEnv::new();
        let storage = env.init_storage();
        let process = storage.insert_process(&Process::new("alice", "Coffee")).unwrap();

        assert!(ensure_steps(&storage, process, "Coffee").unwrap() > 0);
        let count = storage.count_steps(process).unwrap();
        assert_eq!(ensure_steps(&storage, process, "Coffee").unwrap(), 0);
        assert_eq!(storage.count_steps(process).unwrap(), count);
    }

    #[test]
    fn test_existing_steps_are_kept() {
        let env = TestEnv::new();
        let storage = env.init_storage();
        let process = storage.insert_process(&Process::new("alice", "Standup")).unwrap();
        storage.add_step(process, "Custom", None).unwrap();

        assert_eq!(ensure_steps(&storage, process, "Standup").unwrap(), 0);
        assert_eq!(storage.list_steps(process).unwrap()[0].content, "Custom");
    }
}
