//! Task service endpoints: collection, detail, create, partial update,
//! branch-assignee update, statistics snapshot.

use std::sync::Arc;

use crate::models::{StatsSnapshot, Task, TaskDraft, TaskPatch};
use crate::transport::{ApiRequest, RemoteFailure, Transport};

use super::decode;

pub struct TasksApi {
    transport: Arc<dyn Transport>,
}

impl TasksApi {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub async fn list(&self) -> Result<Vec<Task>, RemoteFailure> {
        decode(self.transport.execute(ApiRequest::get("/tasks/")).await?)
    }

    pub async fn get(&self, id: i64) -> Result<Task, RemoteFailure> {
        decode(
            self.transport
                .execute(ApiRequest::get(format!("/tasks/{id}")))
                .await?,
        )
    }

    pub async fn create(&self, draft: &TaskDraft) -> Result<Task, RemoteFailure> {
        let body = encode(draft)?;
        decode(
            self.transport
                .execute(ApiRequest::post("/tasks/", body))
                .await?,
        )
    }

    /// Partial update. Only the fields set on the patch go over the wire;
    /// `id` and `points` cannot appear by construction.
    pub async fn update(&self, id: i64, patch: &TaskPatch) -> Result<Task, RemoteFailure> {
        let body = encode(patch)?;
        decode(
            self.transport
                .execute(ApiRequest::patch(format!("/tasks/{id}"), body))
                .await?,
        )
    }

    pub async fn assign_branch(&self, id: i64, login: &str) -> Result<Task, RemoteFailure> {
        let body = serde_json::json!({ "branch_assignee_github_login": login });
        decode(
            self.transport
                .execute(ApiRequest::patch(format!("/tasks/{id}/assign_branch"), body))
                .await?,
        )
    }

    pub async fn stats(&self) -> Result<StatsSnapshot, RemoteFailure> {
        decode(
            self.transport
                .execute(ApiRequest::get("/tasks/stats"))
                .await?,
        )
    }
}

fn encode<T: serde::Serialize>(payload: &T) -> Result<serde_json::Value, RemoteFailure> {
    serde_json::to_value(payload)
        .map_err(|e| RemoteFailure::transport(format!("failed to encode request payload: {e}")))
}
