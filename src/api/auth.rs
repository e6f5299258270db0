//! Auth service endpoints: provider redirect URL, one-shot code
//! exchange, current identity, logout.
//!
//! The exchange endpoint sets the session cookie as a side effect; its
//! body is only an acknowledgement, so the caller follows up with
//! `current_user` for the authoritative identity.

use std::sync::Arc;

use crate::models::User;
use crate::transport::{ApiRequest, RemoteFailure, Transport};

use super::decode;

pub struct AuthApi {
    transport: Arc<dyn Transport>,
    base_url: String,
}

impl AuthApi {
    pub fn new(transport: Arc<dyn Transport>, base_url: &str) -> Self {
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// The provider authorization URL. Building it is purely local; the
    /// navigation away is the caller's business.
    pub fn login_url(&self) -> String {
        format!("{}/auth/github", self.base_url)
    }

    /// Exchange an authorization code for a server session. The cookie
    /// arrives via the transport's jar.
    pub async fn exchange_code(&self, code: &str) -> Result<(), RemoteFailure> {
        self.transport
            .execute(ApiRequest::get("/auth/github/callback").query("code", code))
            .await?;
        Ok(())
    }

    pub async fn current_user(&self) -> Result<User, RemoteFailure> {
        decode(self.transport.execute(ApiRequest::get("/auth/me")).await?)
    }

    pub async fn logout(&self) -> Result<(), RemoteFailure> {
        self.transport
            .execute(ApiRequest::post_empty("/auth/logout"))
            .await?;
        Ok(())
    }
}
