//! Template forking.
//!
//! [`fork`] deep-copies a template process with its steps and substeps into
//! an owner's instance. Each owner holds at most one instance per template,
//! so forking twice returns the instance created the first time.

use crate::models::{Metadata, Process, Step, StepTree, SubStep};
use crate::storage::Storage;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// Result of forking a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ForkOutcome {
    /// The owner's instance of the template
    pub instance_id: i64,
    /// False if the instance already existed
    pub created: bool,
    /// False if some steps failed to copy; the instance is usable but partial
    pub complete: bool,
}

/// Fork `template_id` for `owner`, stamping the new instance with `as_of`.
///
/// Returns `Ok(None)` if the template does not exist and `InvalidInput` if
/// the process is not a template. The template itself is never modified.
pub fn fork(
    storage: &Storage,
    template_id: i64,
    owner: &str,
    as_of: DateTime<Utc>,
) -> Result<Option<ForkOutcome>> {
    let Some(template) = storage.get_process(template_id)? else {
        tracing::debug!(template_id, "fork skipped: template not found");
        return Ok(None);
    };
    if !template.is_template {
        return Err(Error::InvalidInput(format!(
            "Process {} is not a template",
            template_id
        )));
    }

    if let Some(existing) = storage.find_instance(template_id, owner)? {
        return Ok(Some(ForkOutcome {
            instance_id: existing.id,
            created: false,
            complete: true,
        }));
    }

    let outcome = storage.with_transaction(|s| {
        let (instance, created) = s.find_or_create_process(&instance_of(&template, owner, as_of))?;
        if !created {
            // Another writer forked between the lookup and the insert
            return Ok(ForkOutcome {
                instance_id: instance.id,
                created: false,
                complete: true,
            });
        }

        let mut complete = true;
        for tree in s.step_tree(template.id)? {
            if let Err(e) = s.with_transaction(|s| clone_step(s, &tree, instance.id)) {
                tracing::warn!(
                    template_id,
                    instance_id = instance.id,
                    step = %tree.step.content,
                    error = %e,
                    "failed to copy step into instance"
                );
                complete = false;
            }
        }
        if !complete {
            s.renumber_steps(instance.id)?;
        }

        tracing::debug!(template_id, instance_id = instance.id, owner, "forked template");
        Ok(ForkOutcome {
            instance_id: instance.id,
            created: true,
            complete,
        })
    })?;

    Ok(Some(outcome))
}

/// The unsaved instance record for `owner`'s copy of `template`.
fn instance_of(template: &Process, owner: &str, as_of: DateTime<Utc>) -> Process {
    let mut metadata = Metadata::new();
    metadata.insert("template_id".to_string(), Value::from(template.id));
    metadata.insert(
        "template_title".to_string(),
        Value::from(template.title.clone()),
    );

    Process {
        id: 0,
        title: template.title.clone(),
        description: template.description.clone(),
        color: template.color.clone(),
        category: template.category.clone(),
        owner: owner.to_string(),
        // A directory belongs to one owner; only keep it for self-forks
        directory_id: template.directory_id.filter(|_| template.owner == owner),
        favorite: false,
        is_template: false,
        template_id: Some(template.id),
        metadata,
        created_at: as_of,
        last_updated: as_of,
    }
}

/// Copy one step and its substeps under `instance_id`, completion reset.
fn clone_step(storage: &Storage, tree: &StepTree, instance_id: i64) -> Result<i64> {
    let step = Step {
        id: 0,
        process_id: instance_id,
        content: tree.step.content.clone(),
        position: tree.step.position,
        due_date: tree.step.due_date,
        completed: false,
        completed_at: None,
    };
    let step_id = storage.insert_step(&step)?;

    for sub in &tree.sub_steps {
        storage.insert_sub_step(&SubStep {
            id: 0,
            step_id,
            content: sub.content.clone(),
            position: sub.position,
            due_date: sub.due_date,
            completed: false,
            completed_at: None,
        })?;
    }
    Ok(step_id)
}
