//! Typed error hierarchy for the taskdeck engine.
//!
//! Two top-level enums cover the two policy-bearing subsystems:
//! - `WorkflowError` — local state-machine and validation rejections,
//!   plus remote failures surfaced by task mutations
//! - `SessionError` — OAuth callback and session lifecycle failures
//!
//! Local policy violations (`InvalidTransition`, `TransitionInProgress`,
//! `Validation`) are raised before any remote call is made and never
//! reach the transport.

use thiserror::Error;

use crate::models::TaskStatus;
use crate::transport::RemoteFailure;

/// Errors from the task workflow engine.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum WorkflowError {
    #[error("invalid transition {from} -> {attempted}{}", permitted_hint(.permitted))]
    InvalidTransition {
        from: TaskStatus,
        attempted: TaskStatus,
        permitted: Option<TaskStatus>,
    },

    #[error("a status transition for task {task_id} is already in flight")]
    TransitionInProgress { task_id: i64 },

    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error(transparent)]
    Remote(#[from] RemoteFailure),
}

fn permitted_hint(permitted: &Option<TaskStatus>) -> String {
    match permitted {
        Some(next) => format!(" (permitted: {next})"),
        None => " (status is terminal)".to_string(),
    }
}

/// Errors from the session authority.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SessionError {
    /// OAuth redirect arrived with neither a code nor an error: an
    /// ambiguous terminal state, reported distinctly rather than retried.
    #[error("authorization callback carried neither a code nor an error")]
    IndeterminateCallback,

    /// The provider redirected back with an explicit error payload.
    #[error("authorization provider returned an error: {}", .description.as_deref().unwrap_or(.error.as_str()))]
    Provider {
        error: String,
        description: Option<String>,
    },

    #[error(transparent)]
    Remote(#[from] RemoteFailure),
}
