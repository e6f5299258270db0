//! Engine facade — the explicitly owned container wiring transport,
//! API client, cache, session authority, and workflow engine together.
//!
//! There is no ambient global: construct one `Engine` at process start
//! (or a fresh one per test, usually via [`Engine::with_transport`] and
//! a scripted transport) and hand out references.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::api::ApiClient;
use crate::cache::SyncCache;
use crate::config::EngineConfig;
use crate::events::{self, EngineEvent, EventSender};
use crate::models::{Attachment, StatsSnapshot, Task, User};
use crate::session::SessionAuthority;
use crate::transport::{HttpTransport, RemoteFailure, Transport};
use crate::workflow::WorkflowEngine;

pub struct Engine {
    config: EngineConfig,
    api: Arc<ApiClient>,
    cache: Arc<SyncCache>,
    session: SessionAuthority,
    workflow: WorkflowEngine,
    events: EventSender,
}

impl Engine {
    /// Production constructor: HTTP transport against the configured
    /// base URL.
    pub fn new(config: EngineConfig) -> anyhow::Result<Self> {
        let transport = Arc::new(HttpTransport::new(
            &config.api_base_url,
            config.request_timeout,
        )?);
        Ok(Self::with_transport(config, transport))
    }

    /// Construct over any transport; this is the seam tests use.
    pub fn with_transport(config: EngineConfig, transport: Arc<dyn Transport>) -> Self {
        let events = events::channel();
        let api = Arc::new(ApiClient::new(transport, &config.api_base_url));
        let cache = Arc::new(SyncCache::new(api.clone(), events.clone()));
        let session = SessionAuthority::new(api.clone(), cache.clone(), events.clone());
        let workflow = WorkflowEngine::new(api.clone(), cache.clone());
        Self {
            config,
            api,
            cache,
            session,
            workflow,
            events,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionAuthority {
        &self.session
    }

    pub fn workflow(&self) -> &WorkflowEngine {
        &self.workflow
    }

    pub fn cache(&self) -> &SyncCache {
        &self.cache
    }

    /// Observer registration: the receiver yields session and cache
    /// transitions until the engine is dropped.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    // ── Cached reads ─────────────────────────────────────────────────

    pub async fn current_user(&self) -> Result<User, RemoteFailure> {
        self.cache.current_user().await
    }

    pub async fn tasks(&self) -> Result<Vec<Task>, RemoteFailure> {
        self.cache.tasks().await
    }

    pub async fn task(&self, id: i64) -> Result<Task, RemoteFailure> {
        self.cache.task(id).await
    }

    pub async fn stats(&self) -> Result<StatsSnapshot, RemoteFailure> {
        self.cache.stats().await
    }

    /// Upload collaborator passthrough; the returned URL belongs in a
    /// task's `image_urls`.
    pub async fn upload(&self, filename: &str, bytes: Vec<u8>) -> Result<Attachment, RemoteFailure> {
        self.api.uploads.upload(filename, bytes).await
    }
}
