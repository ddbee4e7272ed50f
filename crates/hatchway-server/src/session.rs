//! Session Gate
//!
//! Ensures the scope's session status is resolved before dependent page
//! logic runs, without ever issuing more than one session fetch per
//! request.
//!
//! # Resolution policy
//!
//! - backend answers with a user: `authenticated`
//! - backend answers without a user, or with 401: `anonymous`
//! - any other failure: the prior session value is kept unchanged and the
//!   request proceeds (stale-but-valid policy; a non-auth error must not
//!   deny service)
//!
//! Concurrent gate calls on one scope join the single in-flight fetch via
//! the scope's session barrier, so N concurrent `require_authenticated`
//! calls still trigger exactly one backend request.

use std::sync::Arc;

use hatchway_client::{BackendClient, BackendRequest};
use hatchway_common::scope::RequestScope;
use hatchway_common::session::{Session, SessionUser};

const SESSION_PATH: &str = "/session";

/// Redirect destinations used by the gate helpers.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Where `require_authenticated` sends anonymous requesters
    pub stopped_path: String,
    /// Where `require_anonymous` sends authenticated requesters
    pub home_path: String,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            stopped_path: "/login".to_string(),
            home_path: "/".to_string(),
        }
    }
}

/// Outcome of a gate helper: either the caller may proceed, or the event
/// is dropped and a redirect has been signaled on the scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Allowed,
    Redirected(String),
}

pub struct SessionGate {
    client: Arc<dyn BackendClient>,
    config: GateConfig,
}

impl SessionGate {
    pub fn new(client: Arc<dyn BackendClient>, config: GateConfig) -> Self {
        Self { client, config }
    }

    /// Resolves the scope's session, joining any fetch already in flight.
    ///
    /// Returns immediately if the session is already resolved for this
    /// scope.
    pub async fn ensure_resolved(&self, scope: &Arc<RequestScope>) {
        if scope.session().is_resolved() {
            return;
        }
        scope
            .session_barrier()
            .get_or_init(|| self.resolve(scope))
            .await;
    }

    async fn resolve(&self, scope: &Arc<RequestScope>) {
        let request = BackendRequest::get(SESSION_PATH).with_cookies(scope.request_cookies());
        match self.client.fetch(request).await {
            Ok(answer) => {
                for cookie in &answer.set_cookie {
                    scope.push_response_cookie(cookie.clone());
                }
                if answer.ok {
                    match serde_json::from_value::<SessionUser>(answer.body["user"].clone()) {
                        Ok(user) => scope.set_session(Session::authenticated(user)),
                        Err(_) => scope.set_session(Session::anonymous()),
                    }
                } else if answer.is_unauthorized() {
                    // Expected for signed-out visitors, not an error.
                    scope.set_session(Session::anonymous());
                } else {
                    tracing::warn!(
                        status = answer.status,
                        "session fetch failed; keeping prior session"
                    );
                }
            }
            Err(error) => {
                tracing::warn!(%error, "session fetch failed; keeping prior session");
            }
        }
    }

    /// Passes only if the requester is authenticated once gating resolves;
    /// otherwise signals a redirect to the stopped destination and drops
    /// the event.
    pub async fn require_authenticated(&self, scope: &Arc<RequestScope>) -> GateDecision {
        self.ensure_resolved(scope).await;
        if scope.session().is_authenticated() {
            GateDecision::Allowed
        } else {
            scope.signal_redirect(&self.config.stopped_path);
            GateDecision::Redirected(self.config.stopped_path.clone())
        }
    }

    /// Passes only if the requester is anonymous once gating resolves;
    /// otherwise signals a redirect to the home destination.
    pub async fn require_anonymous(&self, scope: &Arc<RequestScope>) -> GateDecision {
        self.ensure_resolved(scope).await;
        if scope.session().is_authenticated() {
            scope.signal_redirect(&self.config.home_path);
            GateDecision::Redirected(self.config.home_path.clone())
        } else {
            GateDecision::Allowed
        }
    }
}
