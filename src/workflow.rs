//! Task workflow engine — enforces the status state machine and the
//! branch-responsibility assignment rule before anything reaches the
//! server (which stays authoritative).
//!
//! Transition policy: each status has a single permitted successor
//! (`new → in_progress → done → closed`); `closed` and unrecognized
//! statuses accept nothing. While a transition for a task is in flight,
//! a second one for the same task is rejected instead of racing it.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::api::ApiClient;
use crate::cache::{Mutation, SyncCache};
use crate::errors::WorkflowError;
use crate::models::{Task, TaskDraft, TaskPatch, TaskStatus};

struct WorkflowInner {
    api: Arc<ApiClient>,
    cache: Arc<SyncCache>,
    in_flight: Mutex<HashSet<i64>>,
}

impl WorkflowInner {
    fn in_flight(&self) -> MutexGuard<'_, HashSet<i64>> {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases the per-task transition slot when dropped, so an abandoned
/// caller cannot wedge a task in the "transition in progress" state.
struct TransitionGuard {
    inner: Arc<WorkflowInner>,
    task_id: i64,
}

impl TransitionGuard {
    fn claim(inner: &Arc<WorkflowInner>, task_id: i64) -> Result<Self, WorkflowError> {
        if !inner.in_flight().insert(task_id) {
            return Err(WorkflowError::TransitionInProgress { task_id });
        }
        Ok(Self {
            inner: inner.clone(),
            task_id,
        })
    }
}

impl Drop for TransitionGuard {
    fn drop(&mut self) {
        self.inner.in_flight().remove(&self.task_id);
    }
}

pub struct WorkflowEngine {
    inner: Arc<WorkflowInner>,
}

impl WorkflowEngine {
    pub fn new(api: Arc<ApiClient>, cache: Arc<SyncCache>) -> Self {
        Self {
            inner: Arc::new(WorkflowInner {
                api,
                cache,
                in_flight: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// Validate a status transition locally, then issue a status-only
    /// update. On confirmation the returned task replaces the cached
    /// detail entry and the statistics snapshot goes stale.
    pub async fn propose_transition(
        &self,
        task: &Task,
        target: TaskStatus,
    ) -> Result<Task, WorkflowError> {
        let permitted = task.status.successor();
        if permitted.as_ref() != Some(&target) {
            return Err(WorkflowError::InvalidTransition {
                from: task.status.clone(),
                attempted: target,
                permitted,
            });
        }

        let _guard = TransitionGuard::claim(&self.inner, task.id)?;
        debug!(task_id = task.id, from = %task.status, to = %target, "proposing transition");

        let patch = TaskPatch {
            status: Some(target),
            ..TaskPatch::default()
        };
        let updated = self.inner.api.tasks.update(task.id, &patch).await?;
        self.inner
            .cache
            .apply_mutation(Mutation::TaskTransitioned(updated.clone()));
        Ok(updated)
    }

    /// Assign the identity accountable for the task's git branch. This is
    /// independent of the status machine; branch history stays
    /// meaningful after a task is closed, so any status is acceptable.
    pub async fn assign_branch_responsible(
        &self,
        task: &Task,
        login: &str,
    ) -> Result<Task, WorkflowError> {
        let login = login.trim();
        if login.is_empty() {
            return Err(WorkflowError::Validation {
                field: "branch assignee",
                reason: "login must not be empty".into(),
            });
        }

        let updated = self.inner.api.tasks.assign_branch(task.id, login).await?;
        self.inner
            .cache
            .apply_mutation(Mutation::BranchAssigned(updated.clone()));
        Ok(updated)
    }

    /// Create a task. Title and assignee are required; everything else
    /// defaults to empty. A new task changes both the collection and the
    /// statistics, so both go stale on success.
    pub async fn create_task(&self, draft: TaskDraft) -> Result<Task, WorkflowError> {
        let title = draft.title.trim();
        if title.is_empty() {
            return Err(WorkflowError::Validation {
                field: "title",
                reason: "must not be empty".into(),
            });
        }
        let assignee = draft.assignee.trim();
        if assignee.is_empty() {
            return Err(WorkflowError::Validation {
                field: "assignee",
                reason: "must not be empty".into(),
            });
        }

        let draft = TaskDraft {
            title: title.to_string(),
            assignee: assignee.to_string(),
            ..draft
        };
        let created = self.inner.api.tasks.create(&draft).await?;
        debug!(task_id = created.id, "task created");
        self.inner
            .cache
            .apply_mutation(Mutation::TaskCreated(created.clone()));
        Ok(created)
    }

    /// General field update. `id` and `points` are not expressible on a
    /// [`TaskPatch`]; a status carried on the patch is held to the same
    /// transition table as [`propose_transition`].
    pub async fn update_task(&self, task: &Task, patch: TaskPatch) -> Result<Task, WorkflowError> {
        if patch.is_empty() {
            return Err(WorkflowError::Validation {
                field: "patch",
                reason: "no fields to update".into(),
            });
        }
        if let Some(title) = &patch.title {
            if title.trim().is_empty() {
                return Err(WorkflowError::Validation {
                    field: "title",
                    reason: "must not be empty".into(),
                });
            }
        }
        if let Some(target) = &patch.status {
            if *target != task.status && task.status.successor().as_ref() != Some(target) {
                return Err(WorkflowError::InvalidTransition {
                    from: task.status.clone(),
                    attempted: target.clone(),
                    permitted: task.status.successor(),
                });
            }
        }

        let stats_affected = patch.touches_stats();
        let updated = self.inner.api.tasks.update(task.id, &patch).await?;
        self.inner.cache.apply_mutation(Mutation::TaskUpdated {
            task: updated.clone(),
            stats_affected,
        });
        Ok(updated)
    }
}
