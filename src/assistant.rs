//! Chat assistant for process checklists.
//!
//! The assistant answers a chat turn about one process and may suggest
//! operations on it. [`HostedAssistant`] forwards the turn to an HTTP
//! endpoint; [`OfflineAssistant`] answers locally from the process state.
//! Suggested operations only touch the store through [`apply_operations`],
//! which goes through the same store and cascade calls as the CLI.

use crate::cascade::{self, CascadeOptions};
use crate::models::{MeetingKind, Process, ProcessProgress, StepTree};
use crate::storage::Storage;
use crate::{Error, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const USER_AGENT: &str = concat!("stepwise/", env!("CARGO_PKG_VERSION"));

/// Who wrote a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// The process a conversation is about.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessContext {
    pub process: Process,
    pub steps: Vec<StepTree>,
    pub progress: ProcessProgress,
}

impl ProcessContext {
    pub fn load(storage: &Storage, process_id: i64) -> Result<Self> {
        Ok(Self {
            process: storage.require_process(process_id)?,
            steps: storage.step_tree(process_id)?,
            progress: storage.process_progress(process_id)?,
        })
    }
}

/// A change the assistant proposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SuggestedOperation {
    AddStep {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        due_date: Option<NaiveDate>,
    },
    AddSubStep {
        step_id: i64,
        content: String,
    },
    CompleteStep {
        step_id: i64,
    },
    RenameProcess {
        title: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub reply: String,
    #[serde(default)]
    pub operations: Vec<SuggestedOperation>,
}

pub trait ChatAssistant {
    fn ask(&self, history: &[ChatMessage], context: &ProcessContext) -> Result<ChatReply>;
}

/// Forwards chat turns to a hosted model over HTTP.
pub struct HostedAssistant {
    endpoint: String,
    api_key: Option<String>,
    agent: ureq::Agent,
}

impl HostedAssistant {
    /// `timeout` bounds the whole request, so a slow endpoint fails fast.
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key,
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }
}

impl ChatAssistant for HostedAssistant {
    fn ask(&self, history: &[ChatMessage], context: &ProcessContext) -> Result<ChatReply> {
        let mut request = self
            .agent
            .post(&self.endpoint)
            .set("Accept", "application/json")
            .set("User-Agent", USER_AGENT);
        if let Some(ref key) = self.api_key {
            request = request.set("Authorization", &format!("Bearer {}", key));
        }

        let body = serde_json::json!({
            "messages": history,
            "context": context,
        });
        tracing::debug!(endpoint = %self.endpoint, turns = history.len(), "asking hosted assistant");

        match request.send_json(body) {
            Ok(resp) => resp
                .into_json::<ChatReply>()
                .map_err(|e| Error::Assistant(format!("Malformed reply: {}", e))),
            Err(ureq::Error::Status(code, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                Err(Error::Assistant(format!("HTTP {}: {}", code, body)))
            }
            Err(e) => Err(Error::Assistant(e.to_string())),
        }
    }
}

/// Answers without a network: suggests starter steps for an empty process,
/// otherwise points at the next open step.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineAssistant;

impl ChatAssistant for OfflineAssistant {
    fn ask(&self, _history: &[ChatMessage], context: &ProcessContext) -> Result<ChatReply> {
        if context.steps.is_empty() {
            let kind = MeetingKind::infer(&context.process.title);
            let operations = kind
                .starter_steps()
                .iter()
                .map(|(content, _)| SuggestedOperation::AddStep {
                    content: content.to_string(),
                    due_date: None,
                })
                .collect::<Vec<_>>();
            return Ok(ChatReply {
                reply: format!(
                    "\"{}\" has no steps yet. Here is a starting {} checklist.",
                    context.process.title, kind
                ),
                operations,
            });
        }

        match context.steps.iter().find(|t| !t.step.completed) {
            Some(next) => Ok(ChatReply {
                reply: format!(
                    "{} of {} steps done. Next up: \"{}\".",
                    context.progress.completed, context.progress.total, next.step.content
                ),
                operations: vec![SuggestedOperation::CompleteStep {
                    step_id: next.step.id,
                }],
            }),
            None => Ok(ChatReply {
                reply: format!("Every step of \"{}\" is done.", context.process.title),
                operations: Vec::new(),
            }),
        }
    }
}

/// An operation after it was applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedOperation {
    #[serde(flatten)]
    pub operation: SuggestedOperation,
    /// False when the operation was already in effect
    pub changed: bool,
}

/// Apply suggested operations to `process_id` in one transaction.
///
/// Every step an operation names must belong to the process; otherwise
/// nothing is applied.
pub fn apply_operations(
    storage: &Storage,
    process_id: i64,
    operations: &[SuggestedOperation],
    as_of: DateTime<Utc>,
) -> Result<Vec<AppliedOperation>> {
    storage.with_transaction(|s| {
        let mut process = s.require_process(process_id)?;
        let mut applied = Vec::with_capacity(operations.len());

        for op in operations {
            let changed = match op {
                SuggestedOperation::AddStep { content, due_date } => {
                    s.add_step(process_id, content, *due_date)?;
                    true
                }
                SuggestedOperation::AddSubStep { step_id, content } => {
                    require_own_step(s, process_id, *step_id)?;
                    s.add_sub_step(*step_id, content, None)?;
                    true
                }
                SuggestedOperation::CompleteStep { step_id } => {
                    require_own_step(s, process_id, *step_id)?;
                    let result =
                        cascade::set_step_completed(s, *step_id, true, CascadeOptions::default(), as_of)?;
                    result.step_changed || result.sub_steps_changed > 0
                }
                SuggestedOperation::RenameProcess { title } => {
                    let title = title.trim();
                    if title.is_empty() {
                        return Err(Error::InvalidInput("Process title cannot be empty".to_string()));
                    }
                    if process.title == title {
                        false
                    } else {
                        process.title = title.to_string();
                        s.update_process(&process)?;
                        true
                    }
                }
            };
            applied.push(AppliedOperation {
                operation: op.clone(),
                changed,
            });
        }

        tracing::info!(process_id, applied = applied.len(), "applied assistant operations");
        Ok(applied)
    })
}

fn require_own_step(s: &Storage, process_id: i64, step_id: i64) -> Result<()> {
    let step = s.require_step(step_id)?;
    if step.process_id != process_id {
        return Err(Error::InvalidInput(format!(
            "Step {} does not belong to process {}",
            step_id, process_id
        )));
    }
    Ok(())
}
