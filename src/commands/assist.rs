//! `sw assist`: one chat turn about a process.

use super::{Context, Output};
use crate::Result;
use crate::assistant::{
    AppliedOperation, ChatAssistant, ChatMessage, HostedAssistant, OfflineAssistant, ProcessContext,
    SuggestedOperation, apply_operations,
};
use crate::config::resolve_api_key;
use serde::Serialize;
use std::time::Duration;

#[derive(Serialize)]
pub struct AssistResult {
    pub process_id: i64,
    /// "hosted" or "offline"
    pub assistant: &'static str,
    pub reply: String,
    pub operations: Vec<SuggestedOperation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied: Option<Vec<AppliedOperation>>,
}

impl Output for AssistResult {
    fn to_human(&self) -> String {
        let mut lines = vec![self.reply.clone()];
        match self.applied {
            Some(ref applied) => {
                for a in applied {
                    let mark = if a.changed { "applied" } else { "no change" };
                    lines.push(format!("  {} ({})", describe(&a.operation), mark));
                }
            }
            None => {
                for op in &self.operations {
                    lines.push(format!("  suggested: {}", describe(op)));
                }
                if !self.operations.is_empty() {
                    lines.push("Re-run with --apply to make these changes.".to_string());
                }
            }
        }
        lines.join("\n")
    }
}

fn describe(op: &SuggestedOperation) -> String {
    match op {
        SuggestedOperation::AddStep { content, .. } => format!("add step \"{}\"", content),
        SuggestedOperation::AddSubStep { step_id, content } => {
            format!("add substep \"{}\" to step {}", content, step_id)
        }
        SuggestedOperation::CompleteStep { step_id } => format!("complete step {}", step_id),
        SuggestedOperation::RenameProcess { title } => format!("rename to \"{}\"", title),
    }
}

/// Ask the configured assistant about a process, optionally applying what
/// it suggests.
///
/// The hosted assistant is used when `assistant-endpoint` is configured and
/// `offline` is false.
pub fn assist(ctx: &Context, process_id: i64, message: &str, apply: bool, offline: bool) -> Result<AssistResult> {
    let context = ProcessContext::load(&ctx.storage, process_id)?;
    let history = [ChatMessage::user(message)];

    let (assistant, reply) = match ctx.config.assistant_endpoint {
        Some(ref endpoint) if !offline => {
            let timeout = Duration::from_secs(ctx.config.assistant_timeout_secs.value);
            let api_key = resolve_api_key().map(|k| k.value);
            let hosted = HostedAssistant::new(&endpoint.value, api_key, timeout);
            ("hosted", hosted.ask(&history, &context)?)
        }
        _ => ("offline", OfflineAssistant.ask(&history, &context)?),
    };

    let applied = if apply {
        Some(apply_operations(&ctx.storage, process_id, &reply.operations, ctx.as_of)?)
    } else {
        None
    };
    tracing::info!(process_id, assistant, suggested = reply.operations.len(), apply, "assist turn");

    Ok(AssistResult {
        process_id,
        assistant,
        reply: reply.reply,
        operations: reply.operations,
        applied,
    })
}
