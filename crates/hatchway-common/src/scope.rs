//! Request Scope
//!
//! This module provides the per-request state container and the immutable
//! template it is forked from.
//!
//! # Architecture
//!
//! A [`ScopeTemplate`] holds the default value of every store the
//! application declares. It is built once at startup, validated, and never
//! mutated afterwards. At the start of each request the pipeline calls
//! [`ScopeTemplate::fork`], which structurally clones the defaults into a
//! fresh [`RequestScope`] and seeds it with the request's cookie header
//! before any downstream consumer can observe the scope.
//!
//! The scope is the *only* mutable per-request resource in the system.
//! Values that used to live in ambient globals in comparable designs (the
//! current cookie header, the pending redirect target) are plain fields
//! here, threaded explicitly through the pipeline.
//!
//! # Snapshot policy
//!
//! [`RequestScope::serialize`] produces the hydration snapshot embedded in
//! the streamed document. It contains only values that changed from their
//! template defaults, and never contains the inbound or outbound cookie
//! state: cookies are transport-layer, not hydratable UI state.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use serde_json::{Map, Value};
use tokio::sync::OnceCell;

use crate::error::{HatchwayError, Result};
use crate::routes::PageId;
use crate::session::Session;

/// Reserved store key for the raw inbound cookie header.
pub const INBOUND_COOKIES_KEY: &str = "cookiesForRequest";
/// Reserved store key for raw outbound `Set-Cookie` values.
pub const OUTBOUND_COOKIES_KEY: &str = "cookiesFromResponse";
/// Store key under which the resolved session appears in the snapshot.
pub const SESSION_KEY: &str = "session";

/// Immutable state-graph template shared by all requests.
#[derive(Debug, Default)]
pub struct ScopeTemplate {
    defaults: Map<String, Value>,
}

impl ScopeTemplate {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a template from store defaults.
    ///
    /// # Errors
    ///
    /// Returns [`HatchwayError::TemplateCorrupted`] if the defaults claim
    /// one of the reserved cookie keys. A corrupted template is a startup
    /// error, not a per-request one: forking itself cannot fail.
    pub fn new(defaults: Map<String, Value>) -> Result<Self> {
        for reserved in [INBOUND_COOKIES_KEY, OUTBOUND_COOKIES_KEY] {
            if defaults.contains_key(reserved) {
                return Err(HatchwayError::TemplateCorrupted(format!(
                    "reserved store key in template defaults: {reserved}"
                )));
            }
        }
        Ok(Self { defaults })
    }

    pub fn defaults(&self) -> &Map<String, Value> {
        &self.defaults
    }

    /// Forks a fresh, isolated scope for one request.
    ///
    /// The inbound cookie header is injected atomically at fork time;
    /// writes to the fork never propagate back to the template or to any
    /// other fork.
    pub fn fork(self: &Arc<Self>, request_cookies: impl Into<String>) -> Arc<RequestScope> {
        Arc::new(RequestScope {
            template: Arc::clone(self),
            values: RwLock::new(self.defaults.clone()),
            session: RwLock::new(Session::pending()),
            request_cookies: request_cookies.into(),
            response_cookies: RwLock::new(Vec::new()),
            redirect_to: RwLock::new(None),
            open_pages: RwLock::new(HashSet::new()),
            session_barrier: OnceCell::new(),
        })
    }
}

/// Isolated state container for exactly one request.
///
/// Owned by the request's pipeline instance for the request's entire
/// duration and destroyed when the response finishes sending. No two
/// concurrent requests ever reference the same scope, so the interior
/// locks only arbitrate between tasks spawned *within* one request (hatch
/// loads, the session fetch, the stream pump).
pub struct RequestScope {
    template: Arc<ScopeTemplate>,
    values: RwLock<Map<String, Value>>,
    session: RwLock<Session>,
    request_cookies: String,
    response_cookies: RwLock<Vec<String>>,
    redirect_to: RwLock<Option<String>>,
    open_pages: RwLock<HashSet<PageId>>,
    session_barrier: OnceCell<()>,
}

impl RequestScope {
    /// Raw cookie header the request arrived with.
    pub fn request_cookies(&self) -> &str {
        &self.request_cookies
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.values
            .read()
            .expect("scope store lock poisoned")
            .get(key)
            .cloned()
    }

    pub fn insert(&self, key: impl Into<String>, value: Value) {
        self.values
            .write()
            .expect("scope store lock poisoned")
            .insert(key.into(), value);
    }

    pub fn session(&self) -> Session {
        self.session
            .read()
            .expect("scope session lock poisoned")
            .clone()
    }

    pub fn set_session(&self, session: Session) {
        *self.session.write().expect("scope session lock poisoned") = session;
    }

    /// Single-flight barrier for session resolution.
    ///
    /// Concurrent gate calls on one scope join the same initialization, so
    /// at most one session fetch ever runs per request.
    pub fn session_barrier(&self) -> &OnceCell<()> {
        &self.session_barrier
    }

    /// Records a `Set-Cookie` value produced during this request.
    ///
    /// Captured cookies are attached to the outgoing response headers
    /// regardless of which terminal state the pipeline reaches.
    pub fn push_response_cookie(&self, cookie: impl Into<String>) {
        self.response_cookies
            .write()
            .expect("scope cookie lock poisoned")
            .push(cookie.into());
    }

    pub fn response_cookies(&self) -> Vec<String> {
        self.response_cookies
            .read()
            .expect("scope cookie lock poisoned")
            .clone()
    }

    /// Signals a redirect discovered mid-render. First signal wins.
    pub fn signal_redirect(&self, location: impl Into<String>) {
        let mut slot = self
            .redirect_to
            .write()
            .expect("scope redirect lock poisoned");
        if slot.is_none() {
            *slot = Some(location.into());
        }
    }

    pub fn redirect_target(&self) -> Option<String> {
        self.redirect_to
            .read()
            .expect("scope redirect lock poisoned")
            .clone()
    }

    /// Marks a page's hatch open in this scope.
    ///
    /// Returns `false` if the hatch was already open, in which case `enter`
    /// must not be driven again without an intervening `exit`.
    pub fn mark_open(&self, page_id: &str) -> bool {
        self.open_pages
            .write()
            .expect("scope hatch lock poisoned")
            .insert(page_id.to_string())
    }

    /// Marks a page's hatch closed. Returns `false` if it was not open.
    pub fn mark_closed(&self, page_id: &str) -> bool {
        self.open_pages
            .write()
            .expect("scope hatch lock poisoned")
            .remove(page_id)
    }

    pub fn is_open(&self, page_id: &str) -> bool {
        self.open_pages
            .read()
            .expect("scope hatch lock poisoned")
            .contains(page_id)
    }

    pub fn open_pages(&self) -> Vec<PageId> {
        self.open_pages
            .read()
            .expect("scope hatch lock poisoned")
            .iter()
            .cloned()
            .collect()
    }

    /// Serializes the hydration snapshot.
    ///
    /// Only values that differ from the template defaults are included
    /// ("only changes" policy), the reserved cookie keys are always
    /// excluded, and the session appears under [`SESSION_KEY`] once it has
    /// resolved.
    pub fn serialize(&self) -> Map<String, Value> {
        let defaults = self.template.defaults();
        let values = self.values.read().expect("scope store lock poisoned");

        let mut out = Map::new();
        for (key, value) in values.iter() {
            if key == INBOUND_COOKIES_KEY || key == OUTBOUND_COOKIES_KEY {
                continue;
            }
            if defaults.get(key) == Some(value) {
                continue;
            }
            out.insert(key.clone(), value.clone());
        }

        let session = self.session();
        if session.is_resolved() {
            if let Ok(value) = serde_json::to_value(&session) {
                out.insert(SESSION_KEY.to_string(), value);
            }
        }

        out
    }
}

impl std::fmt::Debug for RequestScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestScope")
            .field("session", &self.session())
            .field("redirect_to", &self.redirect_target())
            .field("open_pages", &self.open_pages())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionUser;
    use serde_json::json;

    fn template() -> Arc<ScopeTemplate> {
        let mut defaults = Map::new();
        defaults.insert("pageTitle".to_string(), json!(""));
        defaults.insert("currentCard".to_string(), Value::Null);
        Arc::new(ScopeTemplate::new(defaults).unwrap())
    }

    #[test]
    fn test_template_rejects_reserved_keys() {
        let mut defaults = Map::new();
        defaults.insert(INBOUND_COOKIES_KEY.to_string(), json!(""));
        let err = ScopeTemplate::new(defaults).unwrap_err();
        assert!(matches!(err, HatchwayError::TemplateCorrupted(_)));
    }

    #[test]
    fn test_fork_seeds_cookies_and_defaults() {
        let scope = template().fork("sid=abc");
        assert_eq!(scope.request_cookies(), "sid=abc");
        assert_eq!(scope.get("pageTitle"), Some(json!("")));
        assert!(!scope.session().is_resolved());
    }

    #[test]
    fn test_forks_are_isolated() {
        let template = template();
        let a = template.fork("a=1");
        let b = template.fork("b=2");

        a.insert("pageTitle", json!("Card 42"));
        a.set_session(Session::authenticated(SessionUser {
            id: "u-1".into(),
            username: "sova".into(),
            avatar: None,
        }));

        assert_eq!(b.get("pageTitle"), Some(json!("")));
        assert!(!b.session().is_resolved());
        assert!(template.defaults()["pageTitle"] == json!(""));
    }

    #[test]
    fn test_concurrent_forks_never_share_session() {
        let template = template();
        let a = template.fork("");
        let b = template.fork("");

        let writer = {
            let a = Arc::clone(&a);
            std::thread::spawn(move || {
                for i in 0..500 {
                    a.insert("counter", json!(i));
                    a.set_session(Session::anonymous());
                }
            })
        };
        for _ in 0..500 {
            assert!(!b.session().is_resolved());
            assert_eq!(b.get("counter"), None);
        }
        writer.join().unwrap();
    }

    #[test]
    fn test_serialize_only_changes() {
        let scope = template().fork("");
        scope.insert("pageTitle", json!("Card 42"));

        let snapshot = scope.serialize();
        assert_eq!(snapshot.get("pageTitle"), Some(&json!("Card 42")));
        // Unchanged default stays out of the payload.
        assert!(!snapshot.contains_key("currentCard"));
    }

    #[test]
    fn test_serialize_excludes_cookie_keys() {
        let scope = template().fork("sid=abc");
        // Even a misbehaving loader writing cookie state into the store
        // must not leak it into the snapshot.
        scope.insert(INBOUND_COOKIES_KEY, json!("sid=abc"));
        scope.insert(OUTBOUND_COOKIES_KEY, json!("sid=def"));
        scope.push_response_cookie("sid=def; HttpOnly");

        let snapshot = scope.serialize();
        assert!(!snapshot.contains_key(INBOUND_COOKIES_KEY));
        assert!(!snapshot.contains_key(OUTBOUND_COOKIES_KEY));
    }

    #[test]
    fn test_serialize_includes_resolved_session() {
        let scope = template().fork("");
        assert!(!scope.serialize().contains_key(SESSION_KEY));

        scope.set_session(Session::anonymous());
        let snapshot = scope.serialize();
        assert_eq!(snapshot[SESSION_KEY]["status"], json!("anonymous"));
    }

    #[test]
    fn test_redirect_first_signal_wins() {
        let scope = template().fork("");
        assert_eq!(scope.redirect_target(), None);
        scope.signal_redirect("/login");
        scope.signal_redirect("/elsewhere");
        assert_eq!(scope.redirect_target(), Some("/login".to_string()));
    }

    #[test]
    fn test_hatch_open_state_transitions() {
        let scope = template().fork("");
        assert!(!scope.is_open("user-view"));
        assert!(scope.mark_open("user-view"));
        // Re-opening without an exit is refused.
        assert!(!scope.mark_open("user-view"));
        assert!(scope.is_open("user-view"));
        assert!(scope.mark_closed("user-view"));
        assert!(!scope.mark_closed("user-view"));
    }

    #[test]
    fn test_response_cookie_capture() {
        let scope = template().fork("");
        scope.push_response_cookie("sid=def; Path=/");
        scope.push_response_cookie("theme=dark");
        assert_eq!(
            scope.response_cookies(),
            vec!["sid=def; Path=/".to_string(), "theme=dark".to_string()]
        );
    }
}
