//! Typed wrappers over the tracker's HTTP surface.
//!
//! | Module    | Endpoints                                               |
//! |-----------|---------------------------------------------------------|
//! | `auth`    | `/auth/github`, `/auth/github/callback`, `/auth/me`, `/auth/logout` |
//! | `tasks`   | `/tasks/`, `/tasks/{id}`, `/tasks/{id}/assign_branch`, `/tasks/stats` |
//! | `uploads` | `/uploads/`                                             |
//!
//! [`ApiClient`] bundles the three and implements the cache's
//! [`EntityFetcher`], so the synchronization cache resolves each entity
//! family through the same wrappers the mutation paths use.

pub mod auth;
pub mod tasks;
pub mod uploads;

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::cache::{CacheKey, CacheValue, EntityFetcher};
use crate::transport::{RemoteFailure, Transport};

pub use auth::AuthApi;
pub use tasks::TasksApi;
pub use uploads::UploadsApi;

/// Decode a success payload, reporting a shape mismatch as a transport
/// failure rather than panicking on a misbehaving server.
pub(crate) fn decode<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, RemoteFailure> {
    serde_json::from_value(value)
        .map_err(|e| RemoteFailure::transport(format!("unexpected response payload: {e}")))
}

pub struct ApiClient {
    pub auth: AuthApi,
    pub tasks: TasksApi,
    pub uploads: UploadsApi,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn Transport>, base_url: &str) -> Self {
        Self {
            auth: AuthApi::new(transport.clone(), base_url),
            tasks: TasksApi::new(transport.clone()),
            uploads: UploadsApi::new(transport),
        }
    }
}

#[async_trait]
impl EntityFetcher for ApiClient {
    async fn fetch(&self, key: &CacheKey) -> Result<CacheValue, RemoteFailure> {
        match key {
            CacheKey::CurrentUser => self.auth.current_user().await.map(CacheValue::User),
            CacheKey::TaskDetail(id) => self.tasks.get(*id).await.map(CacheValue::Task),
            CacheKey::TaskCollection => self.tasks.list().await.map(CacheValue::Tasks),
            CacheKey::Stats => self.tasks.stats().await.map(CacheValue::Stats),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::RecordingTransport;
    use super::*;

    #[tokio::test]
    async fn test_fetcher_dispatches_task_detail_to_task_endpoint() {
        let transport = Arc::new(RecordingTransport::returning(serde_json::json!({
            "id": 42, "title": "T", "status": "new", "assignee": "a", "points": 0
        })));
        let client = ApiClient::new(transport.clone(), "http://localhost:8000");

        let value = client.fetch(&CacheKey::TaskDetail(42)).await.unwrap();
        assert!(matches!(value, CacheValue::Task(t) if t.id == 42));
        assert_eq!(transport.recorded()[0].path, "/tasks/42");
    }

    #[test]
    fn test_decode_reports_shape_mismatch() {
        let err = decode::<crate::models::User>(serde_json::json!({"bogus": true})).unwrap_err();
        assert!(err.status.is_none());
        assert!(err.message.contains("unexpected response payload"));
    }
}
