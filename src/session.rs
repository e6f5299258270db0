//! Session authority — owns the authentication session lifecycle and the
//! one-shot OAuth code exchange.
//!
//! The exchange is guarded by an idempotency map keyed on the code
//! string: a redirect callback re-firing (page re-render, replayed
//! navigation) coalesces onto the first submission instead of spending
//! the one-time code twice. The guard lives here, not in any UI layer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::api::ApiClient;
use crate::cache::{Mutation, SyncCache};
use crate::errors::SessionError;
use crate::events::{EngineEvent, EventSender, publish};
use crate::models::User;
use crate::transport::RemoteFailure;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    Exchanging,
    Authenticated,
    Failed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::Exchanging => "exchanging",
            Self::Authenticated => "authenticated",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process-wide session value. `user` is present iff the state is
/// `Authenticated`.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub state: SessionState,
    pub user: Option<User>,
    pub last_error: Option<String>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self {
            state: SessionState::Anonymous,
            user: None,
            last_error: None,
        }
    }
}

/// Query parameters of the OAuth redirect, as delivered by the provider.
#[derive(Debug, Clone, Default)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

type ExchangeOutcome = Result<User, RemoteFailure>;

enum ExchangeSlot {
    InFlight(broadcast::Sender<ExchangeOutcome>),
    Done(ExchangeOutcome),
}

struct SessionInner {
    api: Arc<ApiClient>,
    cache: Arc<SyncCache>,
    events: EventSender,
    session: Mutex<Session>,
    exchanges: Mutex<HashMap<String, ExchangeSlot>>,
}

impl SessionInner {
    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn exchanges(&self) -> MutexGuard<'_, HashMap<String, ExchangeSlot>> {
        self.exchanges
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn set_session(&self, apply: impl FnOnce(&mut Session)) {
        let state = {
            let mut session = self.session();
            apply(&mut session);
            session.state
        };
        publish(&self.events, EngineEvent::SessionChanged { state });
    }

    /// Record the outcome and wake every coalesced caller. Waiters
    /// subscribe under the same lock the send happens under, so none can
    /// miss it.
    fn settle_exchange(&self, code: &str, outcome: ExchangeOutcome) {
        let mut exchanges = self.exchanges();
        if let Some(slot) = exchanges.insert(code.to_string(), ExchangeSlot::Done(outcome.clone()))
        {
            if let ExchangeSlot::InFlight(tx) = slot {
                let _ = tx.send(outcome);
            }
        }
    }
}

pub struct SessionAuthority {
    inner: Arc<SessionInner>,
}

impl SessionAuthority {
    pub fn new(api: Arc<ApiClient>, cache: Arc<SyncCache>, events: EventSender) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                api,
                cache,
                events,
                session: Mutex::new(Session::anonymous()),
                exchanges: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Synchronous snapshot of the current session. Never blocks on the
    /// network and never triggers a fetch.
    pub fn current_session(&self) -> Session {
        self.inner.session().clone()
    }

    /// The provider authorization URL for the caller to navigate to.
    pub fn login_url(&self) -> String {
        self.inner.api.auth.login_url()
    }

    /// Dispatch an OAuth redirect: a code starts (or joins) the exchange,
    /// a provider error terminates as `Failed`, and a redirect carrying
    /// neither is reported as indeterminate rather than retried.
    pub async fn handle_callback(&self, params: CallbackParams) -> Result<Session, SessionError> {
        if let Some(code) = &params.code {
            return self.complete_exchange(code).await;
        }
        if let Some(error) = params.error {
            let err = SessionError::Provider {
                error,
                description: params.error_description,
            };
            let message = err.to_string();
            warn!(%message, "authorization callback returned a provider error");
            self.inner.set_session(|s| {
                s.state = SessionState::Failed;
                s.user = None;
                s.last_error = Some(message);
            });
            return Err(err);
        }
        let err = SessionError::IndeterminateCallback;
        let message = err.to_string();
        self.inner.set_session(|s| {
            s.state = SessionState::Failed;
            s.user = None;
            s.last_error = Some(message);
        });
        Err(err)
    }

    /// Exchange an authorization code for an authenticated session,
    /// exactly once per code value. A duplicate call returns the first
    /// call's outcome (joining it if it is still in flight) without a
    /// second remote submission.
    pub async fn complete_exchange(&self, code: &str) -> Result<Session, SessionError> {
        let (claimed, mut rx) = {
            let mut exchanges = self.inner.exchanges();
            match exchanges.get(code) {
                Some(ExchangeSlot::Done(outcome)) => {
                    debug!("duplicate exchange for an already settled code");
                    return self.outcome_to_result(outcome.clone());
                }
                Some(ExchangeSlot::InFlight(tx)) => {
                    debug!("duplicate exchange joined the in-flight submission");
                    (false, tx.subscribe())
                }
                None => {
                    let (tx, rx) = broadcast::channel(1);
                    exchanges.insert(code.to_string(), ExchangeSlot::InFlight(tx));
                    (true, rx)
                }
            }
        };

        if claimed {
            self.inner.set_session(|s| {
                s.state = SessionState::Exchanging;
                s.user = None;
                s.last_error = None;
            });
            self.spawn_exchange(code.to_string());
        }

        let outcome = match rx.recv().await {
            Ok(outcome) => outcome,
            Err(_) => Err(RemoteFailure::transport("code exchange was abandoned")),
        };
        self.outcome_to_result(outcome)
    }

    /// Run the exchange detached so its result settles into the session
    /// and the idempotency map even if the initiating caller goes away.
    fn spawn_exchange(&self, code: String) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let outcome = match inner.api.auth.exchange_code(&code).await {
                // The exchange body is a bare acknowledgement; the
                // identity endpoint is authoritative for `user`.
                Ok(()) => inner.api.auth.current_user().await,
                Err(e) => Err(e),
            };
            match &outcome {
                Ok(user) => {
                    debug!(login = %user.login, "code exchange succeeded");
                    let user = user.clone();
                    inner.set_session(|s| {
                        s.state = SessionState::Authenticated;
                        s.user = Some(user);
                        s.last_error = None;
                    });
                    inner.cache.apply_mutation(Mutation::SessionEstablished);
                }
                Err(failure) => {
                    warn!(%failure, "code exchange failed");
                    let message = failure.to_string();
                    inner.set_session(|s| {
                        s.state = SessionState::Failed;
                        s.user = None;
                        s.last_error = Some(message);
                    });
                }
            }
            inner.settle_exchange(&code, outcome);
        });
    }

    fn outcome_to_result(&self, outcome: ExchangeOutcome) -> Result<Session, SessionError> {
        match outcome {
            Ok(_) => Ok(self.current_session()),
            Err(failure) => Err(SessionError::Remote(failure)),
        }
    }

    /// Request server-side termination, then reset the local session
    /// unconditionally; the user's intent to leave must hold even when
    /// the network does not.
    pub async fn logout(&self) -> Result<(), SessionError> {
        let result = self.inner.api.auth.logout().await;
        if let Err(failure) = &result {
            warn!(%failure, "remote logout failed; resetting local session anyway");
        }
        self.inner.set_session(|s| {
            s.state = SessionState::Anonymous;
            s.user = None;
            s.last_error = None;
        });
        self.inner.cache.apply_mutation(Mutation::SessionCleared);
        result.map_err(SessionError::Remote)
    }
}
