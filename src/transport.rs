//! Transport seam between the engine and the tracker backend.
//!
//! The engine core never talks HTTP directly: every remote call goes
//! through the [`Transport`] trait so tests can substitute a scripted
//! transport. [`HttpTransport`] is the production implementation: reqwest
//! with a shared cookie jar, so the server-issued session cookie rides
//! along on every request.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Url;
use reqwest::cookie::{CookieStore, Jar};
use thiserror::Error;
use tracing::{debug, warn};

/// A remote call that did not produce a success payload: either the
/// server rejected it (carrying its status code) or the transport itself
/// failed (no status). The core treats both identically.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("remote call failed{}: {message}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
pub struct RemoteFailure {
    pub status: Option<u16>,
    pub message: String,
}

impl RemoteFailure {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Patch,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Patch => "PATCH",
        }
    }
}

/// One HTTP-style request: method, path relative to the API base, query
/// pairs, and an optional JSON body.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    /// POST with no request body (bare action endpoints like logout).
    pub fn post_empty(path: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn patch(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::Patch,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }
}

/// Credentialed request execution. Success is the parsed JSON payload;
/// failure is a structured [`RemoteFailure`]. Timeouts are this layer's
/// concern; the core sees them as ordinary failures.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, req: ApiRequest) -> Result<serde_json::Value, RemoteFailure>;

    /// Upload collaborator: ship a binary attachment, get back a JSON
    /// payload carrying its reference URL.
    async fn upload(
        &self,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<serde_json::Value, RemoteFailure>;
}

/// Pull a human-readable reason out of an error response body.
/// The backend reports failures as `{"detail": "..."}`; `error` and
/// `message` cover other producers behind the same base URL.
fn error_message(status: u16, body: &serde_json::Value) -> String {
    for key in ["detail", "error", "message"] {
        if let Some(msg) = body.get(key).and_then(|v| v.as_str()) {
            return msg.to_string();
        }
    }
    format!("request failed with status {status}")
}

/// Production transport: reqwest client with a shared cookie jar.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
    jar: Arc<Jar>,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let base_url: Url = base_url
            .parse()
            .with_context(|| format!("Invalid API base URL: {base_url}"))?;
        let jar = Arc::new(Jar::default());
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .cookie_provider(jar.clone())
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url,
            jar,
        })
    }

    /// The cookie header currently held for the API origin, if any.
    /// Used by the CLI to persist the session across invocations.
    pub fn session_cookie(&self) -> Option<String> {
        self.jar
            .cookies(&self.base_url)
            .and_then(|v| v.to_str().map(str::to_string).ok())
    }

    /// Seed the jar with a previously persisted cookie string.
    pub fn restore_session_cookie(&self, cookie: &str) {
        self.jar.add_cookie_str(cookie, &self.base_url);
    }

    fn endpoint(&self, path: &str) -> Result<Url, RemoteFailure> {
        let raw = format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        raw.parse()
            .map_err(|e| RemoteFailure::transport(format!("invalid request path {path}: {e}")))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, req: ApiRequest) -> Result<serde_json::Value, RemoteFailure> {
        let url = self.endpoint(&req.path)?;
        debug!(method = req.method.as_str(), path = %req.path, "api request");

        let mut builder = match req.method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
            Method::Patch => self.client.patch(url),
        };
        if !req.query.is_empty() {
            builder = builder.query(&req.query);
        }
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| RemoteFailure::transport(e.to_string()))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| RemoteFailure::transport(e.to_string()))?;
        // Empty bodies (204s, bare acknowledgements) read as null.
        let body: serde_json::Value =
            serde_json::from_str(&text).unwrap_or(serde_json::Value::Null);

        if (200..300).contains(&status) {
            Ok(body)
        } else {
            let message = error_message(status, &body);
            warn!(status, path = %req.path, %message, "api request rejected");
            Err(RemoteFailure::status(status, message))
        }
    }

    async fn upload(
        &self,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<serde_json::Value, RemoteFailure> {
        let url = self.endpoint("/uploads/")?;
        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| RemoteFailure::transport(e.to_string()))?;
        let status = response.status().as_u16();
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RemoteFailure::transport(e.to_string()))?;

        if (200..300).contains(&status) {
            Ok(body)
        } else {
            Err(RemoteFailure::status(status, error_message(status, &body)))
        }
    }
}
