//! Completion cascade.
//!
//! Keeps "a completed step has only completed substeps" true, both when a
//! step is toggled ([`set_step_completed`]) and as a repair scan over stored
//! data ([`reconcile`], [`reconcile_all`]).

use crate::Result;
use crate::storage::Storage;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Options for [`set_step_completed`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CascadeOptions {
    /// Clear substeps too when a step is un-completed. Defaults to false:
    /// substep progress survives reopening a step.
    pub cascade_on_uncomplete: bool,
}

/// Rows touched by one cascade.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CascadeResult {
    pub step_changed: bool,
    pub sub_steps_changed: usize,
}

/// Set a step's completion state and cascade to its substeps.
///
/// Completing marks every open substep completed at `as_of`. Un-completing
/// leaves substeps alone unless `options.cascade_on_uncomplete` is set.
pub fn set_step_completed(
    storage: &Storage,
    step_id: i64,
    completed: bool,
    options: CascadeOptions,
    as_of: DateTime<Utc>,
) -> Result<CascadeResult> {
    storage.with_transaction(|s| {
        s.require_step(step_id)?;
        let step_changed = s.set_step_completion(step_id, completed.then_some(as_of))? > 0;

        let sub_steps_changed = if completed {
            s.complete_open_sub_steps(step_id, as_of)?
        } else if options.cascade_on_uncomplete {
            s.clear_sub_steps(step_id)?
        } else {
            0
        };

        tracing::debug!(step_id, completed, sub_steps_changed, "step completion set");
        Ok(CascadeResult {
            step_changed,
            sub_steps_changed,
        })
    })
}

/// Set a substep's completion state.
///
/// Reopening a substep under a completed step reopens the step as well.
/// Returns the number of rows changed.
pub fn set_sub_step_completed(
    storage: &Storage,
    sub_step_id: i64,
    completed: bool,
    as_of: DateTime<Utc>,
) -> Result<usize> {
    storage.with_transaction(|s| {
        let sub_step = s.require_sub_step(sub_step_id)?;
        let mut changed = s.set_sub_step_completion(sub_step_id, completed.then_some(as_of))?;
        if !completed {
            changed += s.set_step_completion(sub_step.step_id, None)?;
        }
        Ok(changed)
    })
}

/// Repair one process: complete every open substep under a completed step.
///
/// Never un-completes anything. Returns the number of substeps changed, so
/// a second call returns 0. A missing process is a no-op.
pub fn reconcile(storage: &Storage, process_id: i64, as_of: DateTime<Utc>) -> Result<usize> {
    if storage.get_process(process_id)?.is_none() {
        tracing::debug!(process_id, "reconcile skipped: process not found");
        return Ok(0);
    }
    repair_steps(storage, Some(process_id), as_of)
}

/// Repair every process in the store.
pub fn reconcile_all(storage: &Storage, as_of: DateTime<Utc>) -> Result<usize> {
    repair_steps(storage, None, as_of)
}

fn repair_steps(storage: &Storage, process_id: Option<i64>, as_of: DateTime<Utc>) -> Result<usize> {
    storage.with_transaction(|s| {
        let mut changed = 0;
        for step_id in s.steps_with_open_sub_steps(process_id)? {
            changed += s.complete_open_sub_steps(step_id, as_of)?;
        }
        if changed > 0 {
            tracing::info!(?process_id, changed, "reconciled substeps");
        }
        Ok(changed)
    })
}
