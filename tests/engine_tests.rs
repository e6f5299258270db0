//! Integration tests for the taskdeck engine.
//!
//! A scripted mock transport stands in for the tracker backend; every
//! test builds a fresh `Engine` over it, so tests are fully isolated.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use taskdeck::cache::{CacheKey, CacheValue, EntryState};
use taskdeck::errors::{SessionError, WorkflowError};
use taskdeck::events::EngineEvent;
use taskdeck::models::{TaskDraft, TaskPatch, TaskStatus};
use taskdeck::session::{CallbackParams, SessionState};
use taskdeck::transport::{ApiRequest, RemoteFailure, Transport};
use taskdeck::{Engine, EngineConfig};

// =============================================================================
// Mock transport
// =============================================================================

/// Scripted transport. Responses are registered per `"METHOD path"` key;
/// a queue is consumed front-first, repeating its last entry forever.
struct MockTransport {
    routes: Mutex<HashMap<String, VecDeque<Result<Value, RemoteFailure>>>>,
    log: Mutex<Vec<(String, Option<Value>)>>,
    delay: Option<Duration>,
}

impl MockTransport {
    fn new() -> Self {
        Self {
            routes: Mutex::new(HashMap::new()),
            log: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new()
        }
    }

    fn on(&self, key: &str, response: Result<Value, RemoteFailure>) -> &Self {
        self.routes
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .push_back(response);
        self
    }

    fn calls(&self, key: &str) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| k == key)
            .count()
    }

    fn body_of(&self, key: &str) -> Option<Value> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, body)| body.clone())
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, req: ApiRequest) -> Result<Value, RemoteFailure> {
        let key = format!("{} {}", req.method.as_str(), req.path);
        self.log.lock().unwrap().push((key.clone(), req.body));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mut routes = self.routes.lock().unwrap();
        let queue = routes
            .get_mut(&key)
            .unwrap_or_else(|| panic!("no scripted response for {key}"));
        if queue.len() > 1 {
            queue.pop_front().expect("queue checked non-empty")
        } else {
            queue.front().cloned().expect("scripted route is empty")
        }
    }

    async fn upload(&self, filename: &str, _bytes: Vec<u8>) -> Result<Value, RemoteFailure> {
        let key = format!("POST /uploads/{filename}");
        self.log.lock().unwrap().push((key.clone(), None));
        Ok(json!({"url": format!("http://files/{filename}")}))
    }
}

fn task_json(id: i64, status: &str) -> Value {
    json!({
        "id": id,
        "title": format!("Task {id}"),
        "status": status,
        "assignee": "alice",
        "points": 0,
        "watchers": [],
        "reviewers": [],
        "image_urls": []
    })
}

fn user_json() -> Value {
    json!({
        "id": 12345,
        "login": "octocat",
        "name": "Octo Cat",
        "avatar_url": "https://avatars.githubusercontent.com/u/1"
    })
}

fn stats_json() -> Value {
    json!({
        "statuses": {"new": 2, "closed": 1},
        "points_leaders": [{"assignee": "alice", "points": 10}]
    })
}

fn engine_over(transport: Arc<MockTransport>) -> Engine {
    Engine::with_transport(EngineConfig::default(), transport)
}

// =============================================================================
// Session authority
// =============================================================================

mod session {
    use super::*;

    fn auth_routes(transport: &MockTransport) {
        transport.on(
            "GET /auth/github/callback",
            Ok(json!({"message": "cookie set"})),
        );
        transport.on("GET /auth/me", Ok(user_json()));
    }

    #[tokio::test]
    async fn test_exchange_is_submitted_exactly_once_per_code() {
        let transport = Arc::new(MockTransport::new());
        auth_routes(&transport);
        let engine = engine_over(transport.clone());

        let first = engine.session().complete_exchange("abc123").await.unwrap();
        let second = engine.session().complete_exchange("abc123").await.unwrap();

        assert_eq!(transport.calls("GET /auth/github/callback"), 1);
        assert_eq!(first.state, SessionState::Authenticated);
        assert_eq!(second.state, SessionState::Authenticated);
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_exchange_coalesces() {
        let transport = Arc::new(MockTransport::with_delay(Duration::from_millis(20)));
        auth_routes(&transport);
        let engine = engine_over(transport.clone());

        let (a, b) = tokio::join!(
            engine.session().complete_exchange("abc123"),
            engine.session().complete_exchange("abc123"),
        );

        assert_eq!(transport.calls("GET /auth/github/callback"), 1);
        assert_eq!(a.unwrap().user, b.unwrap().user);
    }

    #[tokio::test]
    async fn test_failed_exchange_is_not_retried_on_duplicate_delivery() {
        let transport = Arc::new(MockTransport::new());
        transport.on(
            "GET /auth/github/callback",
            Err(RemoteFailure::status(500, "bad_verification_code")),
        );
        let engine = engine_over(transport.clone());

        let first = engine.session().complete_exchange("dead").await.unwrap_err();
        let second = engine.session().complete_exchange("dead").await.unwrap_err();

        assert_eq!(transport.calls("GET /auth/github/callback"), 1);
        assert_eq!(first, second);
        assert_eq!(engine.session().current_session().state, SessionState::Failed);
    }

    #[tokio::test]
    async fn test_distinct_codes_are_distinct_submissions() {
        let transport = Arc::new(MockTransport::new());
        auth_routes(&transport);
        let engine = engine_over(transport.clone());

        engine.session().complete_exchange("one").await.unwrap();
        engine.session().complete_exchange("two").await.unwrap();

        assert_eq!(transport.calls("GET /auth/github/callback"), 2);
    }

    #[tokio::test]
    async fn test_session_events_are_published_in_order() {
        let transport = Arc::new(MockTransport::new());
        auth_routes(&transport);
        let engine = engine_over(transport);
        let mut rx = engine.subscribe();

        engine.session().complete_exchange("abc123").await.unwrap();

        let mut states = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let EngineEvent::SessionChanged { state } = event {
                states.push(state);
            }
        }
        assert_eq!(
            states,
            vec![SessionState::Exchanging, SessionState::Authenticated]
        );
    }

    #[tokio::test]
    async fn test_callback_with_provider_error_never_reaches_remote() {
        let transport = Arc::new(MockTransport::new());
        let engine = engine_over(transport.clone());

        let err = engine
            .session()
            .handle_callback(CallbackParams {
                code: None,
                error: Some("access_denied".into()),
                error_description: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::Provider { .. }));
        assert_eq!(transport.calls("GET /auth/github/callback"), 0);
    }

    #[tokio::test]
    async fn test_logout_always_clears_local_session() {
        let transport = Arc::new(MockTransport::new());
        auth_routes(&transport);
        transport.on(
            "POST /auth/logout",
            Err(RemoteFailure::transport("connection refused")),
        );
        let engine = engine_over(transport);
        engine.session().complete_exchange("abc123").await.unwrap();

        let result = engine.session().logout().await;

        assert!(result.is_err());
        let session = engine.session().current_session();
        assert_eq!(session.state, SessionState::Anonymous);
        assert!(session.user.is_none());
    }

    #[tokio::test]
    async fn test_successful_exchange_stales_cached_current_user() {
        let transport = Arc::new(MockTransport::new());
        auth_routes(&transport);
        let engine = engine_over(transport.clone());

        engine.current_user().await.unwrap();
        assert_eq!(
            engine.cache().entry_state(&CacheKey::CurrentUser),
            EntryState::Fresh
        );

        engine.session().complete_exchange("abc123").await.unwrap();
        assert_eq!(
            engine.cache().entry_state(&CacheKey::CurrentUser),
            EntryState::Stale
        );
    }
}

// =============================================================================
// Synchronization cache
// =============================================================================

mod cache {
    use super::*;

    #[tokio::test]
    async fn test_concurrent_detail_reads_fetch_once() {
        let transport = Arc::new(MockTransport::with_delay(Duration::from_millis(20)));
        transport.on("GET /tasks/42", Ok(task_json(42, "new")));
        let engine = engine_over(transport.clone());

        let (a, b) = tokio::join!(engine.task(42), engine.task(42));

        assert_eq!(transport.calls("GET /tasks/42"), 1);
        assert_eq!(a.unwrap(), b.unwrap());
    }

    #[tokio::test]
    async fn test_write_then_read_skips_the_network() {
        let transport = Arc::new(MockTransport::new());
        let engine = engine_over(transport.clone());

        engine.cache().write(
            CacheKey::TaskDetail(7),
            CacheValue::Task(serde_json::from_value(task_json(7, "new")).unwrap()),
        );

        let task = engine.task(7).await.unwrap();
        assert_eq!(task.id, 7);
        assert_eq!(transport.calls("GET /tasks/7"), 0);
    }

    #[tokio::test]
    async fn test_errored_entry_is_not_served_and_refetches() {
        let transport = Arc::new(MockTransport::new());
        transport.on(
            "GET /tasks/stats",
            Err(RemoteFailure::status(500, "aggregation failed")),
        );
        transport.on("GET /tasks/stats", Ok(stats_json()));
        let engine = engine_over(transport.clone());

        let err = engine.stats().await.unwrap_err();
        assert_eq!(err.status, Some(500));
        assert_eq!(
            engine.cache().entry_state(&CacheKey::Stats),
            EntryState::Errored
        );

        let stats = engine.stats().await.unwrap();
        assert_eq!(stats.statuses.get("new"), Some(&2));
        assert_eq!(transport.calls("GET /tasks/stats"), 2);
    }
}

// =============================================================================
// Task workflow
// =============================================================================

mod workflow {
    use super::*;

    #[tokio::test]
    async fn test_transition_round_trip_updates_detail_and_stales_stats() {
        let transport = Arc::new(MockTransport::new());
        transport.on("GET /tasks/42", Ok(task_json(42, "new")));
        transport.on("PATCH /tasks/42", Ok(task_json(42, "in_progress")));
        transport.on("GET /tasks/stats", Ok(stats_json()));
        let engine = engine_over(transport.clone());

        engine.stats().await.unwrap();
        let task = engine.task(42).await.unwrap();
        let updated = engine
            .workflow()
            .propose_transition(&task, TaskStatus::InProgress)
            .await
            .unwrap();

        // Status-only payload over the wire.
        assert_eq!(
            transport.body_of("PATCH /tasks/42").unwrap(),
            json!({"status": "in_progress"})
        );
        assert_eq!(updated.status, TaskStatus::InProgress);

        // The response replaced the cached detail; no second GET.
        assert_eq!(engine.task(42).await.unwrap().status, TaskStatus::InProgress);
        assert_eq!(transport.calls("GET /tasks/42"), 1);

        assert_eq!(
            engine.cache().entry_state(&CacheKey::Stats),
            EntryState::Stale
        );
    }

    #[tokio::test]
    async fn test_invalid_transition_never_reaches_the_server() {
        let transport = Arc::new(MockTransport::new());
        transport.on("GET /tasks/42", Ok(task_json(42, "new")));
        let engine = engine_over(transport.clone());

        let task = engine.task(42).await.unwrap();
        let err = engine
            .workflow()
            .propose_transition(&task, TaskStatus::Closed)
            .await
            .unwrap_err();

        assert!(matches!(err, WorkflowError::InvalidTransition { .. }));
        assert_eq!(transport.calls("PATCH /tasks/42"), 0);
    }

    #[tokio::test]
    async fn test_create_task_invalidation_propagation() {
        let transport = Arc::new(MockTransport::new());
        transport.on("GET /tasks/", Ok(json!([task_json(1, "new")])));
        transport.on("GET /tasks/stats", Ok(stats_json()));
        transport.on("GET /auth/me", Ok(user_json()));
        transport.on("POST /tasks/", Ok(task_json(2, "new")));
        let engine = engine_over(transport.clone());

        engine.tasks().await.unwrap();
        engine.stats().await.unwrap();
        engine.current_user().await.unwrap();

        engine
            .workflow()
            .create_task(TaskDraft::new("T", "alice"))
            .await
            .unwrap();

        // Collection and stats went stale; the identity did not.
        assert_eq!(
            engine.cache().entry_state(&CacheKey::TaskCollection),
            EntryState::Empty
        );
        assert_eq!(
            engine.cache().entry_state(&CacheKey::Stats),
            EntryState::Stale
        );
        assert_eq!(
            engine.cache().entry_state(&CacheKey::CurrentUser),
            EntryState::Fresh
        );

        engine.tasks().await.unwrap();
        engine.stats().await.unwrap();
        engine.current_user().await.unwrap();
        assert_eq!(transport.calls("GET /tasks/"), 2);
        assert_eq!(transport.calls("GET /tasks/stats"), 2);
        assert_eq!(transport.calls("GET /auth/me"), 1);
    }

    #[tokio::test]
    async fn test_assign_branch_sends_only_the_branch_field() {
        let transport = Arc::new(MockTransport::new());
        transport.on("GET /tasks/9", Ok(task_json(9, "closed")));
        transport.on(
            "PATCH /tasks/9/assign_branch",
            Ok(task_json(9, "closed")),
        );
        let engine = engine_over(transport.clone());

        // Branch responsibility is assignable even on a closed task.
        let task = engine.task(9).await.unwrap();
        engine
            .workflow()
            .assign_branch_responsible(&task, "bob")
            .await
            .unwrap();

        assert_eq!(
            transport.body_of("PATCH /tasks/9/assign_branch").unwrap(),
            json!({"branch_assignee_github_login": "bob"})
        );
    }

    #[tokio::test]
    async fn test_update_without_stats_fields_leaves_stats_fresh() {
        let transport = Arc::new(MockTransport::new());
        transport.on("GET /tasks/5", Ok(task_json(5, "new")));
        transport.on("PATCH /tasks/5", Ok(task_json(5, "new")));
        transport.on("GET /tasks/stats", Ok(stats_json()));
        let engine = engine_over(transport);

        engine.stats().await.unwrap();
        let task = engine.task(5).await.unwrap();
        let patch = TaskPatch {
            description: Some("reworded".into()),
            ..TaskPatch::default()
        };
        engine.workflow().update_task(&task, patch).await.unwrap();

        assert_eq!(
            engine.cache().entry_state(&CacheKey::Stats),
            EntryState::Fresh
        );
        assert_eq!(
            engine.cache().entry_state(&CacheKey::TaskCollection),
            EntryState::Empty
        );
    }

    #[tokio::test]
    async fn test_upload_returns_reference_url() {
        let transport = Arc::new(MockTransport::new());
        let engine = engine_over(transport);

        let attachment = engine.upload("shot.png", vec![0xFF]).await.unwrap();
        assert_eq!(attachment.url, "http://files/shot.png");
    }
}
